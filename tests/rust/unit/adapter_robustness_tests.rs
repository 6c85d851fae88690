//! Unit tests for malformed parser output and error handling
//!
//! Malformed or hostile ASTs must produce adapter errors, never panics.

#[cfg(test)]
mod adapter_robustness_tests {
    use std::sync::Arc;

    use fhirpath_sql::ast::{AdapterError, AstAdapter, RawNode};
    use fhirpath_sql::type_registry::TypeRegistry;
    use test_case::test_case;

    fn adapter() -> AstAdapter {
        AstAdapter::new(Arc::new(TypeRegistry::builtin().unwrap()))
    }

    #[test_case("" ; "empty input")]
    #[test_case("[]" ; "array")]
    #[test_case("{\"children\": []}" ; "missing type")]
    #[test_case("{\"type\": 42}" ; "numeric type")]
    #[test_case("{\"type\": \"EntireExpression\", \"children\": {}}" ; "children object")]
    fn test_invalid_json_is_rejected(json: &str) {
        assert!(matches!(
            adapter().adapt_json(json),
            Err(AdapterError::InvalidJson { .. })
        ));
    }

    #[test]
    fn test_unknown_node_type() {
        let raw = RawNode::entire(RawNode::new("LambdaExpression"));
        assert_eq!(
            adapter().adapt(&raw).unwrap_err(),
            AdapterError::UnrecognizedNode {
                node_type: "LambdaExpression".to_string()
            }
        );
    }

    #[test]
    fn test_wrapper_without_child_is_malformed() {
        let raw = RawNode::new("EntireExpression");
        assert!(matches!(
            adapter().adapt(&raw),
            Err(AdapterError::MalformedNode { .. })
        ));
    }

    #[test_case("DateLiteral", "@2021-02-30" ; "impossible date")]
    #[test_case("DateLiteral", "@20210101" ; "compact date")]
    #[test_case("TimeLiteral", "@T25:00" ; "hour out of range")]
    #[test_case("DateTimeLiteral", "@2021-01-01T10:61:00" ; "minute out of range")]
    fn test_invalid_temporal_literal(literal_type: &str, text: &str) {
        let raw = RawNode::entire(RawNode::literal(literal_type, text));
        assert!(matches!(
            adapter().adapt(&raw),
            Err(AdapterError::InvalidLiteral { .. })
        ));
    }

    #[test]
    fn test_nesting_beyond_limit_is_rejected() {
        let mut raw = RawNode::member("Patient");
        for _ in 0..50 {
            raw = RawNode::parenthesized(raw);
        }
        let shallow = adapter().with_max_depth(20);
        assert_eq!(
            shallow.adapt(&RawNode::entire(raw.clone())).unwrap_err(),
            AdapterError::TooDeep { max_depth: 20 }
        );
        assert!(adapter().adapt(&RawNode::entire(raw)).is_ok());
    }

    #[test]
    fn test_binary_node_missing_operand() {
        let raw = RawNode::entire(
            RawNode::new("AdditiveExpression")
                .with_terminal("+")
                .with_children(vec![RawNode::number("1")]),
        );
        assert!(adapter().adapt(&raw).is_err());
    }
}
