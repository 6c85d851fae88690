use thiserror::Error;

use crate::dialect::DialectError;
use crate::type_registry::TypeRegistryError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TranslatorError {
    #[error("Function `{function}` expects {expected} argument(s), got {actual}")]
    Arity {
        function: String,
        expected: String,
        actual: usize,
    },
    #[error("Unsupported operation: {operation}")]
    UnsupportedOperation { operation: String },
    #[error("Translation failed at {context}: {source}")]
    Translation {
        context: String,
        #[source]
        source: TranslationCause,
    },
}

/// Underlying failure of a [`TranslatorError::Translation`]
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TranslationCause {
    #[error(transparent)]
    Registry(#[from] TypeRegistryError),
    #[error(transparent)]
    Dialect(#[from] DialectError),
    #[error("{0}")]
    Invalid(String),
}

pub type TranslatorResult<T> = Result<T, TranslatorError>;

impl TranslatorError {
    pub fn arity(function: &str, min: usize, max: usize, actual: usize) -> Self {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{} to {}", min, max)
        };
        TranslatorError::Arity {
            function: function.to_string(),
            expected,
            actual,
        }
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        TranslatorError::UnsupportedOperation {
            operation: operation.into(),
        }
    }

    pub fn registry_with_context(context: impl Into<String>, error: TypeRegistryError) -> Self {
        TranslatorError::Translation {
            context: context.into(),
            source: TranslationCause::Registry(error),
        }
    }

    pub fn dialect_with_context(context: impl Into<String>, error: DialectError) -> Self {
        TranslatorError::Translation {
            context: context.into(),
            source: TranslationCause::Dialect(error),
        }
    }

    pub fn invalid_with_context(context: impl Into<String>, message: impl Into<String>) -> Self {
        TranslatorError::Translation {
            context: context.into(),
            source: TranslationCause::Invalid(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_message() {
        let err = TranslatorError::arity("substring", 1, 2, 3);
        assert_eq!(
            err.to_string(),
            "Function `substring` expects 1 to 2 argument(s), got 3"
        );
    }

    #[test]
    fn test_translation_keeps_source() {
        let err = TranslatorError::registry_with_context(
            "type_op `x is Foo`",
            TypeRegistryError::UnknownType {
                name: "Foo".to_string(),
            },
        );
        assert!(err.to_string().contains("type_op `x is Foo`"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
