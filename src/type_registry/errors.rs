//! # Type Registry Error Types
//!
//! Errors raised while loading schema-definition documents and while answering
//! type queries during translation.
//!
//! - **Lookup errors** (`UnknownType`, `UnknownElement`) are per-query and are
//!   wrapped by the translator into a translation error with node context.
//! - **Load errors** (`ConfigReadError`, `ConfigParseError`, `InvalidDefinition`,
//!   `HierarchyCycle`) are fatal at startup.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TypeRegistryError {
    #[error("Unknown type `{name}`")]
    UnknownType { name: String },
    #[error("Unknown element `{path}`")]
    UnknownElement { path: String },
    #[error("Failed to read schema definition: {error}")]
    ConfigReadError { error: String },
    #[error("Failed to parse schema definition: {error}")]
    ConfigParseError { error: String },
    #[error("Invalid schema definition: {message}")]
    InvalidDefinition { message: String },
    #[error("Type hierarchy contains a cycle through `{type_name}`")]
    HierarchyCycle { type_name: String },
}

impl TypeRegistryError {
    /// Create an UnknownType error with context information
    ///
    /// # Example
    /// ```ignore
    /// TypeRegistryError::unknown_type_with_context("Quantiy", "In ofType() target")
    /// ```
    pub fn unknown_type_with_context(name: impl Into<String>, context: impl Into<String>) -> Self {
        TypeRegistryError::UnknownType {
            name: format!("{}\n  Context: {}", name.into(), context.into()),
        }
    }

    /// Create an InvalidDefinition error naming the offending type
    pub fn invalid_type_definition(type_name: &str, message: impl Into<String>) -> Self {
        TypeRegistryError::InvalidDefinition {
            message: format!("type `{}`: {}", type_name, message.into()),
        }
    }

    /// True for errors that can only happen while loading a schema.
    pub fn is_load_error(&self) -> bool {
        !matches!(
            self,
            TypeRegistryError::UnknownType { .. } | TypeRegistryError::UnknownElement { .. }
        )
    }
}
