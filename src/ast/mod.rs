//! Internal expression tree.
//!
//! The parser is an external collaborator; its output ([`raw::RawNode`]) is
//! normalized by [`adapter::AstAdapter`] into the closed [`NodeKind`] union
//! below. Nodes are immutable once built.

pub mod adapter;
pub mod errors;
pub mod raw;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use adapter::AstAdapter;
pub use errors::AdapterError;
pub use raw::RawNode;

use crate::type_registry::Cardinality;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstNode {
    pub kind: NodeKind,
    #[serde(default)]
    pub metadata: NodeMetadata,
}

/// Facts the adapter resolved about a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Canonical type of the node's items, when the schema determines it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
    /// Schema path (`Patient.name.given`) of a property access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<Cardinality>,
    /// Property whose concrete type varies by record (`value[x]`)
    #[serde(default)]
    pub polymorphic: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choice_types: Vec<String>,
    /// Leading identifier naming a resource type (`Patient` in `Patient.name`)
    #[serde(default)]
    pub type_root: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Literal(Literal),
    /// Property access; `target` is `None` for the leading path segment
    Identifier {
        target: Option<Box<AstNode>>,
        name: String,
    },
    FunctionCall {
        target: Option<Box<AstNode>>,
        name: String,
        args: Vec<AstNode>,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<AstNode>,
        right: Box<AstNode>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<AstNode>,
    },
    TypeOp {
        op: TypeOperator,
        operand: Box<AstNode>,
        type_name: String,
    },
    Variable(Variable),
    /// `target[index]`
    Index {
        target: Box<AstNode>,
        index: Box<AstNode>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Literal {
    /// The empty collection `{}`
    Null,
    Boolean(bool),
    String(String),
    Integer(i64),
    /// Decimal text, kept verbatim to avoid float rounding
    Decimal(String),
    Date(String),
    DateTime(String),
    Time(String),
    Quantity { value: String, unit: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    This,
    Index,
    Total,
    /// `%name` environment variable
    External(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperator {
    Multiply,
    Divide,
    Div,
    Mod,
    Add,
    Subtract,
    Concat,
    Union,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Equal,
    NotEqual,
    Equivalent,
    NotEquivalent,
    In,
    Contains,
    And,
    Or,
    Xor,
    Implies,
}

impl BinaryOperator {
    pub fn from_token(token: &str) -> Option<Self> {
        let op = match token.trim() {
            "*" => BinaryOperator::Multiply,
            "/" => BinaryOperator::Divide,
            "div" => BinaryOperator::Div,
            "mod" => BinaryOperator::Mod,
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Subtract,
            "&" => BinaryOperator::Concat,
            "|" => BinaryOperator::Union,
            "<" => BinaryOperator::LessThan,
            "<=" => BinaryOperator::LessOrEqual,
            ">" => BinaryOperator::GreaterThan,
            ">=" => BinaryOperator::GreaterOrEqual,
            "=" => BinaryOperator::Equal,
            "!=" => BinaryOperator::NotEqual,
            "~" => BinaryOperator::Equivalent,
            "!~" => BinaryOperator::NotEquivalent,
            "in" => BinaryOperator::In,
            "contains" => BinaryOperator::Contains,
            "and" => BinaryOperator::And,
            "or" => BinaryOperator::Or,
            "xor" => BinaryOperator::Xor,
            "implies" => BinaryOperator::Implies,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Div => "div",
            BinaryOperator::Mod => "mod",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Concat => "&",
            BinaryOperator::Union => "|",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterOrEqual => ">=",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::Equivalent => "~",
            BinaryOperator::NotEquivalent => "!~",
            BinaryOperator::In => "in",
            BinaryOperator::Contains => "contains",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::Xor => "xor",
            BinaryOperator::Implies => "implies",
        }
    }

    pub fn is_logical(&self) -> bool {
        matches!(
            self,
            BinaryOperator::And | BinaryOperator::Or | BinaryOperator::Xor | BinaryOperator::Implies
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::LessThan
                | BinaryOperator::LessOrEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterOrEqual
        )
    }

    pub fn is_equality(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::Equivalent
                | BinaryOperator::NotEquivalent
        )
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::Div
                | BinaryOperator::Mod
                | BinaryOperator::Add
                | BinaryOperator::Subtract
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOperator {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeOperator {
    Is,
    As,
}

impl TypeOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeOperator::Is => "is",
            TypeOperator::As => "as",
        }
    }
}

impl AstNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            metadata: NodeMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: NodeMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn literal(literal: Literal) -> Self {
        Self::new(NodeKind::Literal(literal))
    }

    pub fn integer(value: i64) -> Self {
        Self::literal(Literal::Integer(value))
    }

    pub fn boolean(value: bool) -> Self {
        Self::literal(Literal::Boolean(value))
    }

    pub fn string(value: &str) -> Self {
        Self::literal(Literal::String(value.to_string()))
    }

    pub fn identifier(name: &str) -> Self {
        Self::new(NodeKind::Identifier {
            target: None,
            name: name.to_string(),
        })
    }

    /// `a.b.c` as a chain of property accesses
    pub fn path(segments: &[&str]) -> Self {
        let mut iter = segments.iter();
        let first = iter.next().copied().unwrap_or_default();
        iter.fold(Self::identifier(first), |target, name| target.member(name))
    }

    pub fn member(self, name: &str) -> Self {
        Self::new(NodeKind::Identifier {
            target: Some(Box::new(self)),
            name: name.to_string(),
        })
    }

    pub fn call(self, name: &str, args: Vec<AstNode>) -> Self {
        Self::new(NodeKind::FunctionCall {
            target: Some(Box::new(self)),
            name: name.to_string(),
            args,
        })
    }

    /// Function call without an explicit target
    pub fn function(name: &str, args: Vec<AstNode>) -> Self {
        Self::new(NodeKind::FunctionCall {
            target: None,
            name: name.to_string(),
            args,
        })
    }

    pub fn binary(op: BinaryOperator, left: AstNode, right: AstNode) -> Self {
        Self::new(NodeKind::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn type_op(op: TypeOperator, operand: AstNode, type_name: &str) -> Self {
        Self::new(NodeKind::TypeOp {
            op,
            operand: Box::new(operand),
            type_name: type_name.to_string(),
        })
    }

    pub fn variable(variable: Variable) -> Self {
        Self::new(NodeKind::Variable(variable))
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Literal(_) => "literal",
            NodeKind::Identifier { .. } => "identifier",
            NodeKind::FunctionCall { .. } => "function_call",
            NodeKind::BinaryOp { .. } => "binary_op",
            NodeKind::UnaryOp { .. } => "unary_op",
            NodeKind::TypeOp { .. } => "type_op",
            NodeKind::Variable(_) => "variable",
            NodeKind::Index { .. } => "index",
        }
    }

    pub fn children(&self) -> Vec<&AstNode> {
        match &self.kind {
            NodeKind::Literal(_) | NodeKind::Variable(_) => Vec::new(),
            NodeKind::Identifier { target, .. } => target.iter().map(Box::as_ref).collect(),
            NodeKind::FunctionCall { target, args, .. } => target
                .iter()
                .map(Box::as_ref)
                .chain(args.iter())
                .collect(),
            NodeKind::BinaryOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            NodeKind::UnaryOp { operand, .. } | NodeKind::TypeOp { operand, .. } => {
                vec![operand.as_ref()]
            }
            NodeKind::Index { target, index } => vec![target.as_ref(), index.as_ref()],
        }
    }

    /// Depth of the tree, counting this node
    pub fn depth(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(AstNode::depth)
            .max()
            .unwrap_or(0)
    }

    /// A type specifier written as an expression (`string`, `FHIR.Patient`).
    pub fn as_type_name(&self) -> Option<String> {
        match &self.kind {
            NodeKind::Identifier { target: None, name } => Some(name.clone()),
            NodeKind::Identifier {
                target: Some(target),
                name,
            } => target
                .as_type_name()
                .map(|prefix| format!("{}.{}", prefix, name)),
            NodeKind::Literal(Literal::String(name)) => Some(name.clone()),
            _ => None,
        }
    }

    pub fn is_variable(&self, variable: &Variable) -> bool {
        matches!(&self.kind, NodeKind::Variable(v) if v == variable)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "{{}}"),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Decimal(d) => write!(f, "{}", d),
            Literal::Date(d) | Literal::DateTime(d) => write!(f, "@{}", d),
            Literal::Time(t) => write!(f, "@T{}", t),
            Literal::Quantity { value, unit } => write!(f, "{} '{}'", value, unit),
        }
    }
}

/// Renders the node back to FHIRPath text (used in error context and logs).
impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Literal(literal) => write!(f, "{}", literal),
            NodeKind::Identifier { target: None, name } => write!(f, "{}", name),
            NodeKind::Identifier {
                target: Some(target),
                name,
            } => write!(f, "{}.{}", target, name),
            NodeKind::FunctionCall { target, name, args } => {
                if let Some(target) = target {
                    write!(f, "{}.", target)?;
                }
                let rendered: Vec<String> = args.iter().map(ToString::to_string).collect();
                write!(f, "{}({})", name, rendered.join(", "))
            }
            NodeKind::BinaryOp { op, left, right } => {
                write!(f, "({} {} {})", left, op.as_str(), right)
            }
            NodeKind::UnaryOp { op, operand } => match op {
                UnaryOperator::Plus => write!(f, "+{}", operand),
                UnaryOperator::Minus => write!(f, "-{}", operand),
            },
            NodeKind::TypeOp {
                op,
                operand,
                type_name,
            } => write!(f, "({} {} {})", operand, op.as_str(), type_name),
            NodeKind::Variable(Variable::This) => write!(f, "$this"),
            NodeKind::Variable(Variable::Index) => write!(f, "$index"),
            NodeKind::Variable(Variable::Total) => write!(f, "$total"),
            NodeKind::Variable(Variable::External(name)) => write!(f, "%{}", name),
            NodeKind::Index { target, index } => write!(f, "{}[{}]", target, index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_builder_and_display() {
        let node = AstNode::path(&["Patient", "name", "given"]).call("first", vec![]);
        assert_eq!(node.to_string(), "Patient.name.given.first()");
        assert_eq!(node.depth(), 4);
    }

    #[test]
    fn test_children_order() {
        let node = AstNode::path(&["Patient", "name"])
            .call("where", vec![AstNode::identifier("use").member("x")]);
        let children = node.children();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].to_string(), "Patient.name");
    }

    #[test]
    fn test_operator_tokens() {
        for token in ["*", "div", "&", "|", "!~", "implies", "contains"] {
            let op = BinaryOperator::from_token(token).unwrap();
            assert_eq!(op.as_str(), token);
        }
        assert!(BinaryOperator::from_token("**").is_none());
    }

    #[test]
    fn test_type_name_from_expression() {
        assert_eq!(
            AstNode::path(&["FHIR", "Patient"]).as_type_name().as_deref(),
            Some("FHIR.Patient")
        );
        assert_eq!(AstNode::integer(1).as_type_name(), None);
    }
}
