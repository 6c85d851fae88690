//! Parser output as emitted by ANTLR-based FHIRPath parsers.
//!
//! Each node carries the grammar rule name in `type`, the matched source in
//! `text`, the rule's own terminal tokens (operators, keywords) in
//! `terminalNodeText`, and its sub-rules in `children`:
//!
//! ```json
//! {"type": "EntireExpression", "children": [
//!   {"type": "InvocationExpression", "terminalNodeText": ["."], "children": [
//!     {"type": "TermExpression", "children": [{"type": "InvocationTerm", "children": [
//!       {"type": "MemberInvocation", "children": [{"type": "Identifier", "text": "Patient"}]}]}]},
//!     {"type": "MemberInvocation", "children": [{"type": "Identifier", "text": "name"}]}]}]}
//! ```
//!
//! The constructors below build the same shapes programmatically.

use serde::{Deserialize, Serialize};

use super::errors::AdapterError;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawNode {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(
        default,
        rename = "terminalNodeText",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub terminal_node_text: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RawNode>,
}

impl RawNode {
    pub fn new(node_type: &str) -> Self {
        Self {
            node_type: node_type.to_string(),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, AdapterError> {
        serde_json::from_str(json).map_err(|e| AdapterError::InvalidJson {
            error: e.to_string(),
        })
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn with_terminal(mut self, token: &str) -> Self {
        self.terminal_node_text.push(token.to_string());
        self
    }

    pub fn with_children(mut self, children: Vec<RawNode>) -> Self {
        self.children = children;
        self
    }

    /// First terminal token, falling back to the node text
    pub fn token(&self) -> Option<&str> {
        self.terminal_node_text
            .first()
            .map(String::as_str)
            .or(self.text.as_deref())
    }

    // ===== BUILDERS =====

    pub fn entire(expression: RawNode) -> Self {
        Self::new("EntireExpression").with_children(vec![expression])
    }

    fn identifier(name: &str) -> Self {
        Self::new("Identifier").with_text(name)
    }

    pub fn member_invocation(name: &str) -> Self {
        Self::new("MemberInvocation")
            .with_text(name)
            .with_children(vec![Self::identifier(name)])
    }

    pub fn function_invocation(name: &str, args: Vec<RawNode>) -> Self {
        let mut function_children = vec![Self::identifier(name)];
        if !args.is_empty() {
            function_children.push(Self::new("ParamList").with_children(args));
        }
        Self::new("FunctionInvocation")
            .with_children(vec![Self::new("Function").with_children(function_children)])
    }

    fn term(invocation: RawNode) -> Self {
        Self::new("TermExpression")
            .with_children(vec![Self::new("InvocationTerm").with_children(vec![invocation])])
    }

    /// Leading identifier term
    pub fn member(name: &str) -> Self {
        Self::term(Self::member_invocation(name))
    }

    /// Leading function term (`exists()` with no target)
    pub fn function(name: &str, args: Vec<RawNode>) -> Self {
        Self::term(Self::function_invocation(name, args))
    }

    pub fn this() -> Self {
        Self::term(Self::new("ThisInvocation").with_text("$this"))
    }

    pub fn index() -> Self {
        Self::term(Self::new("IndexInvocation").with_text("$index"))
    }

    pub fn total() -> Self {
        Self::term(Self::new("TotalInvocation").with_text("$total"))
    }

    /// `target.invocation`
    pub fn invoke(target: RawNode, invocation: RawNode) -> Self {
        Self::new("InvocationExpression")
            .with_terminal(".")
            .with_children(vec![target, invocation])
    }

    /// `a.b.c`
    pub fn path(segments: &[&str]) -> Self {
        let mut iter = segments.iter();
        let first = Self::member(iter.next().copied().unwrap_or_default());
        iter.fold(first, |target, name| {
            Self::invoke(target, Self::member_invocation(name))
        })
    }

    /// `target.name(args)`
    pub fn call(target: RawNode, name: &str, args: Vec<RawNode>) -> Self {
        Self::invoke(target, Self::function_invocation(name, args))
    }

    /// Literal term; `literal_type` is the grammar rule (`StringLiteral`, `NumberLiteral`, ...)
    pub fn literal(literal_type: &str, text: &str) -> Self {
        Self::new("TermExpression").with_children(vec![Self::new("LiteralTerm")
            .with_children(vec![Self::new(literal_type).with_text(text)])])
    }

    pub fn string(value: &str) -> Self {
        Self::literal(
            "StringLiteral",
            &format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'")),
        )
    }

    pub fn number(text: &str) -> Self {
        Self::literal("NumberLiteral", text)
    }

    pub fn boolean(value: bool) -> Self {
        Self::literal("BooleanLiteral", if value { "true" } else { "false" })
    }

    pub fn quantity(value: &str, unit: &str) -> Self {
        Self::new("TermExpression").with_children(vec![Self::new("LiteralTerm").with_children(
            vec![Self::new("QuantityLiteral").with_children(vec![Self::new("Quantity")
                .with_terminal(value)
                .with_children(vec![Self::new("Unit").with_text(unit)])])],
        )])
    }

    pub fn external(name: &str) -> Self {
        Self::new("TermExpression").with_children(vec![Self::new("ExternalConstantTerm")
            .with_children(vec![
                Self::new("ExternalConstant").with_text(&format!("%{}", name))
            ])])
    }

    pub fn parenthesized(expression: RawNode) -> Self {
        Self::new("TermExpression")
            .with_children(vec![Self::new("ParenthesizedTerm").with_children(vec![expression])])
    }

    /// Binary operator node; `node_type` is the grammar rule (`UnionExpression`, ...)
    pub fn binary(node_type: &str, op: &str, left: RawNode, right: RawNode) -> Self {
        Self::new(node_type)
            .with_terminal(op)
            .with_children(vec![left, right])
    }

    /// `expression is Type` / `expression as Type`
    pub fn type_expression(op: &str, expression: RawNode, type_name: &str) -> Self {
        let identifiers = type_name.split('.').map(Self::identifier).collect();
        let specifier = Self::new("TypeSpecifier")
            .with_text(type_name)
            .with_children(vec![Self::new("QualifiedIdentifier")
                .with_text(type_name)
                .with_children(identifiers)]);
        Self::new("TypeExpression")
            .with_terminal(op)
            .with_children(vec![expression, specifier])
    }

    pub fn indexer(target: RawNode, index: RawNode) -> Self {
        Self::new("IndexerExpression").with_children(vec![target, index])
    }

    pub fn polarity(op: &str, operand: RawNode) -> Self {
        Self::new("PolarityExpression")
            .with_terminal(op)
            .with_children(vec![operand])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_parser_output() {
        let json = r#"{"type": "EntireExpression", "text": "Patient", "children": [
            {"type": "TermExpression", "children": [{"type": "InvocationTerm", "children": [
                {"type": "MemberInvocation", "children": [{"type": "Identifier", "text": "Patient", "terminalNodeText": ["Patient"]}]}
            ]}]}
        ]}"#;
        let node = RawNode::from_json(json).unwrap();
        assert_eq!(node.node_type, "EntireExpression");
        assert_eq!(node.text.as_deref(), Some("Patient"));
        let identifier = &node.children[0].children[0].children[0].children[0];
        assert_eq!(identifier.node_type, "Identifier");
        assert_eq!(identifier.token(), Some("Patient"));
    }

    #[test]
    fn test_invalid_json_is_adapter_error() {
        assert!(matches!(
            RawNode::from_json("{not json"),
            Err(AdapterError::InvalidJson { .. })
        ));
    }

    #[test]
    fn test_serialize_uses_parser_field_names() {
        let node = RawNode::binary("UnionExpression", "|", RawNode::number("1"), RawNode::number("2"));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "UnionExpression");
        assert_eq!(json["terminalNodeText"][0], "|");
    }
}
