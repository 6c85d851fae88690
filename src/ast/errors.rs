use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdapterError {
    #[error("Unrecognized parser node `{node_type}`")]
    UnrecognizedNode { node_type: String },
    #[error("Malformed `{node_type}` node: {reason}")]
    MalformedNode { node_type: String, reason: String },
    #[error("Invalid literal `{literal}`: {reason}")]
    InvalidLiteral { literal: String, reason: String },
    #[error("Expression nesting exceeds the maximum depth of {max_depth}")]
    TooDeep { max_depth: usize },
    #[error("Parser output is not valid JSON: {error}")]
    InvalidJson { error: String },
}

impl AdapterError {
    pub fn malformed(node_type: &str, reason: impl Into<String>) -> Self {
        AdapterError::MalformedNode {
            node_type: node_type.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_literal(literal: &str, reason: impl Into<String>) -> Self {
        AdapterError::InvalidLiteral {
            literal: literal.to_string(),
            reason: reason.into(),
        }
    }
}
