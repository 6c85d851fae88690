use thiserror::Error;

/// Name reported for fragments that never received one
pub const UNNAMED: &str = "<unnamed>";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CteError {
    #[error("Invalid fragment `{cte}`: {reason}")]
    InvalidFragment { cte: String, reason: String },
    #[error("Cannot assemble query: {reason}")]
    Assembly { reason: String },
}

impl CteError {
    pub fn invalid_fragment_with_context(cte: &str, reason: impl Into<String>) -> Self {
        CteError::InvalidFragment {
            cte: cte.to_string(),
            reason: reason.into(),
        }
    }

    pub fn assembly(reason: impl Into<String>) -> Self {
        CteError::Assembly {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_cte_name() {
        let err = CteError::invalid_fragment_with_context("cte_2", "empty source table");
        assert_eq!(err.to_string(), "Invalid fragment `cte_2`: empty source table");
        let err = CteError::assembly("no CTEs");
        assert_eq!(err.to_string(), "Cannot assemble query: no CTEs");
    }
}
