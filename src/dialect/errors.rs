use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DialectError {
    #[error("{dialect} dialect does not implement `{method}`")]
    NotImplemented {
        dialect: &'static str,
        method: String,
    },
    #[error("Unknown SQL dialect `{name}` (expected `duckdb` or `postgresql`)")]
    UnknownDialect { name: String },
}

impl DialectError {
    pub fn not_implemented(dialect: &'static str, method: impl Into<String>) -> Self {
        DialectError::NotImplemented {
            dialect,
            method: method.into(),
        }
    }
}
