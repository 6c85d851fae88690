//! Raw parser nodes -> [`AstNode`].
//!
//! Besides reshaping the grammar-level tree into the closed node union, the
//! adapter resolves what the schema can tell about each property access: its
//! type, its cardinality, and, for choice (`value[x]`) elements, the set of
//! concrete types. Type knowledge flows left to right along invocation chains
//! and into the lambda arguments of `where`, `select` and friends.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};

use super::errors::AdapterError;
use super::raw::RawNode;
use super::{
    AstNode, BinaryOperator, Literal, NodeKind, NodeMetadata, TypeOperator, UnaryOperator,
    Variable,
};
use crate::type_registry::{ElementInfo, TypeRegistry};

pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Functions whose arguments are evaluated once per input item.
const LAMBDA_FUNCTIONS: &[&str] = &["where", "select", "all", "exists", "repeat", "aggregate"];

/// Functions whose single argument is a type specifier.
const TYPE_FUNCTIONS: &[&str] = &["ofType", "is", "as"];

#[derive(Debug, Clone)]
pub struct AstAdapter {
    registry: Arc<TypeRegistry>,
    context_type: Option<String>,
    max_depth: usize,
}

impl AstAdapter {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            context_type: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Type of the evaluation context, used to resolve leading identifiers
    /// that are properties rather than resource types.
    pub fn with_context_type(mut self, context_type: Option<String>) -> Self {
        self.context_type = context_type;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn adapt(&self, raw: &RawNode) -> Result<AstNode, AdapterError> {
        let context = self
            .context_type
            .as_deref()
            .and_then(|name| self.registry.canonicalize(name).ok());
        let node = self.visit(raw, context.as_deref(), 0)?;
        log::trace!("Adapted expression: {}", node);
        Ok(node)
    }

    pub fn adapt_json(&self, json: &str) -> Result<AstNode, AdapterError> {
        let raw = RawNode::from_json(json)?;
        self.adapt(&raw)
    }

    fn visit(
        &self,
        raw: &RawNode,
        context: Option<&str>,
        depth: usize,
    ) -> Result<AstNode, AdapterError> {
        if depth > self.max_depth {
            return Err(AdapterError::TooDeep {
                max_depth: self.max_depth,
            });
        }
        let next = depth + 1;

        match raw.node_type.as_str() {
            "EntireExpression" | "TermExpression" | "InvocationTerm" | "LiteralTerm"
            | "ExternalConstantTerm" | "ParenthesizedTerm" => {
                self.visit(single_child(raw)?, context, next)
            }
            "InvocationExpression" => {
                let [target, invocation] = two_children(raw)?;
                let target = self.visit(target, context, next)?;
                self.visit_invocation(invocation, Some(target), context, next)
            }
            "MemberInvocation" | "FunctionInvocation" | "ThisInvocation" | "IndexInvocation"
            | "TotalInvocation" => self.visit_invocation(raw, None, context, next),
            "IndexerExpression" => {
                let [target, index] = two_children(raw)?;
                let target = self.visit(target, context, next)?;
                let index = self.visit(index, context, next)?;
                let metadata = NodeMetadata {
                    type_hint: target.metadata.type_hint.clone(),
                    path: target.metadata.path.clone(),
                    ..Default::default()
                };
                Ok(AstNode::new(NodeKind::Index {
                    target: Box::new(target),
                    index: Box::new(index),
                })
                .with_metadata(metadata))
            }
            "PolarityExpression" => {
                let operand = self.visit(single_child(raw)?, context, next)?;
                self.visit_polarity(raw, operand)
            }
            "MultiplicativeExpression" | "AdditiveExpression" | "UnionExpression"
            | "InequalityExpression" | "EqualityExpression" | "MembershipExpression"
            | "AndExpression" | "OrExpression" | "ImpliesExpression" => {
                let token = raw
                    .terminal_node_text
                    .first()
                    .ok_or_else(|| AdapterError::malformed(&raw.node_type, "missing operator"))?;
                let op = BinaryOperator::from_token(token).ok_or_else(|| {
                    AdapterError::malformed(&raw.node_type, format!("unknown operator `{}`", token))
                })?;
                let [left, right] = two_children(raw)?;
                let left = self.visit(left, context, next)?;
                let right = self.visit(right, context, next)?;
                let metadata = binary_metadata(op, &left, &right);
                Ok(AstNode::binary(op, left, right).with_metadata(metadata))
            }
            "TypeExpression" => {
                let op = match raw.terminal_node_text.first().map(String::as_str) {
                    Some("is") => TypeOperator::Is,
                    Some("as") => TypeOperator::As,
                    other => {
                        return Err(AdapterError::malformed(
                            "TypeExpression",
                            format!("unknown type operator {:?}", other),
                        ))
                    }
                };
                let [operand, specifier] = two_children(raw)?;
                let operand = self.visit(operand, context, next)?;
                let type_name = type_specifier_name(specifier)?;
                let metadata = NodeMetadata {
                    type_hint: match op {
                        TypeOperator::Is => Some("boolean".to_string()),
                        TypeOperator::As => self.registry.canonicalize(&type_name).ok(),
                    },
                    ..Default::default()
                };
                Ok(AstNode::type_op(op, operand, &type_name).with_metadata(metadata))
            }
            "ExternalConstant" => {
                let name = external_constant_name(raw)?;
                Ok(AstNode::variable(Variable::External(name)))
            }
            "NullLiteral" | "BooleanLiteral" | "StringLiteral" | "NumberLiteral"
            | "DateLiteral" | "DateTimeLiteral" | "TimeLiteral" | "QuantityLiteral" => {
                let literal = adapt_literal(raw)?;
                let metadata = NodeMetadata {
                    type_hint: literal_type(&literal).map(str::to_string),
                    ..Default::default()
                };
                Ok(AstNode::literal(literal).with_metadata(metadata))
            }
            other => Err(AdapterError::UnrecognizedNode {
                node_type: other.to_string(),
            }),
        }
    }

    fn visit_invocation(
        &self,
        raw: &RawNode,
        target: Option<AstNode>,
        context: Option<&str>,
        depth: usize,
    ) -> Result<AstNode, AdapterError> {
        match raw.node_type.as_str() {
            "MemberInvocation" => {
                let name = identifier_name(single_child(raw)?)?;
                let metadata = match &target {
                    Some(target) => self.member_metadata(&target.metadata, &name),
                    None => self.root_metadata(&name, context),
                };
                Ok(AstNode::new(NodeKind::Identifier {
                    target: target.map(Box::new),
                    name,
                })
                .with_metadata(metadata))
            }
            "FunctionInvocation" => {
                let function = single_child(raw)?;
                if function.node_type != "Function" || function.children.is_empty() {
                    return Err(AdapterError::malformed(
                        "FunctionInvocation",
                        "expected a Function node with an identifier",
                    ));
                }
                let name = identifier_name(&function.children[0])?;
                let raw_args: &[RawNode] = match function.children.get(1) {
                    Some(params) if params.node_type == "ParamList" => &params.children,
                    Some(other) => {
                        return Err(AdapterError::malformed(
                            "Function",
                            format!("expected ParamList, found `{}`", other.node_type),
                        ))
                    }
                    None => &[],
                };

                // Inside a lambda `$this` is an item of the invocation target;
                // a call without target iterates the current context.
                let item_type = match &target {
                    Some(target) => target.metadata.type_hint.clone(),
                    None => context.map(str::to_string),
                };
                let arg_context = if LAMBDA_FUNCTIONS.contains(&name.as_str()) {
                    item_type.as_deref()
                } else {
                    context
                };

                let args = if TYPE_FUNCTIONS.contains(&name.as_str()) {
                    raw_args
                        .iter()
                        .map(|arg| Ok(type_name_node(&type_specifier_name(arg)?)))
                        .collect::<Result<Vec<_>, AdapterError>>()?
                } else {
                    raw_args
                        .iter()
                        .map(|arg| self.visit(arg, arg_context, depth + 1))
                        .collect::<Result<Vec<_>, AdapterError>>()?
                };

                let metadata = self.function_metadata(&name, item_type.as_deref(), &target, &args);
                Ok(AstNode::new(NodeKind::FunctionCall {
                    target: target.map(Box::new),
                    name,
                    args,
                })
                .with_metadata(metadata))
            }
            "ThisInvocation" | "IndexInvocation" | "TotalInvocation" => {
                if target.is_some() {
                    return Err(AdapterError::malformed(
                        &raw.node_type,
                        "cannot be invoked on a target",
                    ));
                }
                let (variable, hint) = match raw.node_type.as_str() {
                    "ThisInvocation" => (Variable::This, context.map(str::to_string)),
                    "IndexInvocation" => (Variable::Index, Some("integer".to_string())),
                    _ => (Variable::Total, None),
                };
                Ok(AstNode::variable(variable).with_metadata(NodeMetadata {
                    type_hint: hint,
                    ..Default::default()
                }))
            }
            other => Err(AdapterError::UnrecognizedNode {
                node_type: other.to_string(),
            }),
        }
    }

    fn visit_polarity(&self, raw: &RawNode, operand: AstNode) -> Result<AstNode, AdapterError> {
        let op = match raw.token() {
            Some("-") => UnaryOperator::Minus,
            Some("+") => UnaryOperator::Plus,
            other => {
                return Err(AdapterError::malformed(
                    "PolarityExpression",
                    format!("unknown sign {:?}", other),
                ))
            }
        };
        // Fold signs into numeric literals.
        let folded = match (op, &operand.kind) {
            (UnaryOperator::Minus, NodeKind::Literal(Literal::Integer(i))) => {
                Some(Literal::Integer(-*i))
            }
            (UnaryOperator::Minus, NodeKind::Literal(Literal::Decimal(d))) => {
                Some(Literal::Decimal(format!("-{}", d)))
            }
            (UnaryOperator::Plus, NodeKind::Literal(literal @ Literal::Integer(_)))
            | (UnaryOperator::Plus, NodeKind::Literal(literal @ Literal::Decimal(_))) => {
                Some(literal.clone())
            }
            _ => None,
        };
        match folded {
            Some(literal) => Ok(AstNode::literal(literal).with_metadata(operand.metadata)),
            None => {
                let metadata = NodeMetadata {
                    type_hint: operand.metadata.type_hint.clone(),
                    ..Default::default()
                };
                Ok(AstNode::new(NodeKind::UnaryOp {
                    op,
                    operand: Box::new(operand),
                })
                .with_metadata(metadata))
            }
        }
    }

    /// Leading identifier: a property of the context type, else a type name.
    fn root_metadata(&self, name: &str, context: Option<&str>) -> NodeMetadata {
        if let Some(context_type) = context {
            if let Ok(element) = self.registry.element(context_type, name) {
                return element_metadata(context_type, &element);
            }
        }
        if self.registry.is_resource(name) {
            if let Ok(canonical) = self.registry.canonicalize(name) {
                return NodeMetadata {
                    type_hint: Some(canonical.clone()),
                    path: Some(canonical),
                    type_root: true,
                    ..Default::default()
                };
            }
        }
        NodeMetadata::default()
    }

    fn member_metadata(&self, parent: &NodeMetadata, name: &str) -> NodeMetadata {
        let Some(parent_type) = parent.type_hint.as_deref() else {
            return NodeMetadata::default();
        };
        match self.registry.element(parent_type, name) {
            Ok(element) => {
                let mut metadata = element_metadata(parent_type, &element);
                if let Some(parent_path) = &parent.path {
                    metadata.path = Some(format!("{}.{}", parent_path, name));
                }
                metadata
            }
            Err(_) => {
                log::debug!("No schema element `{}` on `{}`", name, parent_type);
                NodeMetadata::default()
            }
        }
    }

    fn function_metadata(
        &self,
        name: &str,
        item_type: Option<&str>,
        target: &Option<AstNode>,
        args: &[AstNode],
    ) -> NodeMetadata {
        let path = target.as_ref().and_then(|t| t.metadata.path.clone());
        let type_hint = match name {
            "where" | "first" | "last" | "tail" | "skip" | "take" | "single" | "distinct"
            | "intersect" | "exclude" | "union" | "combine" | "repeat" | "sum" | "min"
            | "max" | "abs" | "ceiling" | "floor" | "truncate" | "round" => {
                item_type.map(str::to_string)
            }
            "select" => args.first().and_then(|a| a.metadata.type_hint.clone()),
            "iif" => args.get(1).and_then(|a| a.metadata.type_hint.clone()),
            "ofType" | "as" => args
                .first()
                .and_then(AstNode::as_type_name)
                .and_then(|t| self.registry.canonicalize(&t).ok()),
            "exists" | "empty" | "all" | "allTrue" | "anyTrue" | "allFalse" | "anyFalse"
            | "subsetOf" | "supersetOf" | "isDistinct" | "hasValue" | "not" | "is"
            | "startsWith" | "endsWith" | "contains" | "matches" | "toBoolean" => {
                Some("boolean".to_string())
            }
            n if n.starts_with("convertsTo") => Some("boolean".to_string()),
            "count" | "length" | "indexOf" | "toInteger" | "duration" | "difference" => {
                Some("integer".to_string())
            }
            "toString" | "upper" | "lower" | "substring" | "replace" | "replaceMatches"
            | "trim" | "join" | "split" | "toChars" | "encode" | "decode" => {
                Some("string".to_string())
            }
            "toDecimal" | "avg" | "sqrt" | "ln" | "log" | "exp" | "power" => {
                Some("decimal".to_string())
            }
            "toDate" | "today" => Some("date".to_string()),
            "toDateTime" | "now" => Some("dateTime".to_string()),
            "toTime" | "timeOfDay" => Some("time".to_string()),
            _ => None,
        };
        let keeps_path = matches!(
            name,
            "where" | "first" | "last" | "tail" | "skip" | "take" | "single" | "distinct"
        );
        NodeMetadata {
            type_hint,
            path: if keeps_path { path } else { None },
            ..Default::default()
        }
    }
}

fn element_metadata(owner: &str, element: &ElementInfo) -> NodeMetadata {
    NodeMetadata {
        type_hint: element.single_type().map(str::to_string),
        path: Some(format!("{}.{}", owner, element.name)),
        cardinality: Some(element.cardinality),
        polymorphic: element.is_choice,
        choice_types: if element.is_choice {
            element.type_codes.clone()
        } else {
            Vec::new()
        },
        type_root: false,
    }
}

fn binary_metadata(op: BinaryOperator, left: &AstNode, right: &AstNode) -> NodeMetadata {
    let type_hint = if op.is_logical() || op.is_comparison() || op.is_equality() {
        Some("boolean".to_string())
    } else {
        match op {
            BinaryOperator::In | BinaryOperator::Contains => Some("boolean".to_string()),
            BinaryOperator::Concat => Some("string".to_string()),
            BinaryOperator::Divide => Some("decimal".to_string()),
            BinaryOperator::Div | BinaryOperator::Mod => Some("integer".to_string()),
            _ => match (&left.metadata.type_hint, &right.metadata.type_hint) {
                (Some(l), Some(r)) if l == r => Some(l.clone()),
                _ => None,
            },
        }
    };
    NodeMetadata {
        type_hint,
        ..Default::default()
    }
}

fn single_child(raw: &RawNode) -> Result<&RawNode, AdapterError> {
    match raw.children.as_slice() {
        [only] => Ok(only),
        children => Err(AdapterError::malformed(
            &raw.node_type,
            format!("expected 1 child, found {}", children.len()),
        )),
    }
}

fn two_children(raw: &RawNode) -> Result<[&RawNode; 2], AdapterError> {
    match raw.children.as_slice() {
        [first, second] => Ok([first, second]),
        children => Err(AdapterError::malformed(
            &raw.node_type,
            format!("expected 2 children, found {}", children.len()),
        )),
    }
}

fn identifier_name(raw: &RawNode) -> Result<String, AdapterError> {
    if raw.node_type != "Identifier" {
        return Err(AdapterError::malformed(
            &raw.node_type,
            "expected an Identifier",
        ));
    }
    let text = raw
        .token()
        .ok_or_else(|| AdapterError::malformed("Identifier", "missing text"))?;
    Ok(unquote_identifier(text))
}

/// Strip backtick delimiters (`` `div` ``)
fn unquote_identifier(text: &str) -> String {
    let trimmed = text.trim();
    trimmed
        .strip_prefix('`')
        .and_then(|s| s.strip_suffix('`'))
        .unwrap_or(trimmed)
        .to_string()
}

/// Name written in a TypeSpecifier, a qualified identifier, or an expression
/// standing in for one (`ofType(FHIR.Patient)`).
fn type_specifier_name(raw: &RawNode) -> Result<String, AdapterError> {
    match raw.node_type.as_str() {
        "Identifier" => identifier_name(raw),
        "TypeSpecifier" | "QualifiedIdentifier" if !raw.children.is_empty() => {
            let parts = raw
                .children
                .iter()
                .map(type_specifier_name)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(parts.join("."))
        }
        "TypeSpecifier" | "QualifiedIdentifier" => raw
            .text
            .as_deref()
            .map(unquote_identifier)
            .ok_or_else(|| AdapterError::malformed(&raw.node_type, "missing type name")),
        "TermExpression" | "InvocationTerm" | "MemberInvocation" | "ParenthesizedTerm" => {
            type_specifier_name(single_child(raw)?)
        }
        "InvocationExpression" => {
            let [prefix, member] = two_children(raw)?;
            Ok(format!(
                "{}.{}",
                type_specifier_name(prefix)?,
                type_specifier_name(member)?
            ))
        }
        other => Err(AdapterError::malformed(
            other,
            "expected a type specifier",
        )),
    }
}

fn type_name_node(type_name: &str) -> AstNode {
    let segments: Vec<&str> = type_name.split('.').collect();
    AstNode::path(&segments)
}

fn external_constant_name(raw: &RawNode) -> Result<String, AdapterError> {
    let text = match raw.children.first() {
        Some(child) => child.token().map(str::to_string),
        None => raw.token().map(str::to_string),
    }
    .ok_or_else(|| AdapterError::malformed("ExternalConstant", "missing name"))?;
    let name = text.trim().trim_start_matches('%');
    let name = name
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .map(str::to_string)
        .unwrap_or_else(|| unquote_identifier(name));
    if name.is_empty() {
        return Err(AdapterError::malformed("ExternalConstant", "empty name"));
    }
    Ok(name)
}

fn literal_text(raw: &RawNode) -> Result<&str, AdapterError> {
    raw.text
        .as_deref()
        .or_else(|| raw.terminal_node_text.first().map(String::as_str))
        .map(str::trim)
        .ok_or_else(|| AdapterError::malformed(&raw.node_type, "missing literal text"))
}

fn adapt_literal(raw: &RawNode) -> Result<Literal, AdapterError> {
    match raw.node_type.as_str() {
        "NullLiteral" => Ok(Literal::Null),
        "BooleanLiteral" => match literal_text(raw)? {
            "true" => Ok(Literal::Boolean(true)),
            "false" => Ok(Literal::Boolean(false)),
            other => Err(AdapterError::invalid_literal(other, "expected true or false")),
        },
        "StringLiteral" => Ok(Literal::String(unescape_string(literal_text(raw)?)?)),
        "NumberLiteral" => number_literal(literal_text(raw)?),
        "DateLiteral" => {
            let text = literal_text(raw)?;
            let value = text.trim_start_matches('@');
            validate_date(value).map_err(|reason| AdapterError::invalid_literal(text, reason))?;
            Ok(Literal::Date(value.to_string()))
        }
        "DateTimeLiteral" => {
            let text = literal_text(raw)?;
            let value = text.trim_start_matches('@');
            match value.split_once('T') {
                Some((date, "")) => {
                    validate_date(date)
                        .map_err(|reason| AdapterError::invalid_literal(text, reason))?;
                    Ok(Literal::DateTime(date.to_string()))
                }
                Some((date, time)) => {
                    validate_date(date)
                        .map_err(|reason| AdapterError::invalid_literal(text, reason))?;
                    validate_time(strip_zone(time))
                        .map_err(|reason| AdapterError::invalid_literal(text, reason))?;
                    Ok(Literal::DateTime(value.to_string()))
                }
                None => Err(AdapterError::invalid_literal(text, "missing `T` separator")),
            }
        }
        "TimeLiteral" => {
            let text = literal_text(raw)?;
            let value = text.trim_start_matches('@').trim_start_matches('T');
            validate_time(value).map_err(|reason| AdapterError::invalid_literal(text, reason))?;
            Ok(Literal::Time(value.to_string()))
        }
        "QuantityLiteral" => {
            let quantity = single_child(raw)?;
            quantity_literal(quantity)
        }
        other => Err(AdapterError::UnrecognizedNode {
            node_type: other.to_string(),
        }),
    }
}

fn number_literal(text: &str) -> Result<Literal, AdapterError> {
    if text.contains('.') {
        text.parse::<f64>()
            .map_err(|e| AdapterError::invalid_literal(text, e.to_string()))?;
        Ok(Literal::Decimal(text.to_string()))
    } else {
        text.parse::<i64>()
            .map(Literal::Integer)
            .map_err(|e| AdapterError::invalid_literal(text, e.to_string()))
    }
}

fn quantity_literal(raw: &RawNode) -> Result<Literal, AdapterError> {
    if raw.node_type != "Quantity" {
        return Err(AdapterError::malformed(
            "QuantityLiteral",
            format!("expected Quantity, found `{}`", raw.node_type),
        ));
    }
    let text = raw.text.as_deref().unwrap_or_default().trim();
    let value = raw
        .terminal_node_text
        .first()
        .map(|v| v.trim().to_string())
        .or_else(|| text.split_whitespace().next().map(str::to_string))
        .ok_or_else(|| AdapterError::malformed("Quantity", "missing number"))?;
    number_literal(&value)?;

    let unit = match raw.children.iter().find(|c| c.node_type == "Unit") {
        Some(unit) => literal_text(unit)?.to_string(),
        None => text
            .strip_prefix(value.as_str())
            .map(str::trim)
            .unwrap_or_default()
            .to_string(),
    };
    let unit = unit
        .strip_prefix('\'')
        .and_then(|u| u.strip_suffix('\''))
        .map(str::to_string)
        .unwrap_or(unit);
    Ok(Literal::Quantity {
        value,
        unit: if unit.is_empty() { "1".to_string() } else { unit },
    })
}

/// Remove the quotes of a string literal and resolve its escapes.
fn unescape_string(text: &str) -> Result<String, AdapterError> {
    let inner = text
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .ok_or_else(|| AdapterError::invalid_literal(text, "string must be single-quoted"))?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('f') => out.push('\u{000C}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| {
                        AdapterError::invalid_literal(text, format!("bad escape \\u{}", hex))
                    })?;
                out.push(code);
            }
            Some(other) => out.push(other),
            None => return Err(AdapterError::invalid_literal(text, "dangling escape")),
        }
    }
    Ok(out)
}

/// Accepts `YYYY`, `YYYY-MM` and `YYYY-MM-DD`.
fn validate_date(value: &str) -> Result<(), String> {
    let padded = match value.len() {
        4 => format!("{}-01-01", value),
        7 => format!("{}-01", value),
        10 => value.to_string(),
        _ => return Err(format!("`{}` is not a date", value)),
    };
    NaiveDate::parse_from_str(&padded, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Accepts `HH`, `HH:MM`, `HH:MM:SS` and fractional seconds.
fn validate_time(value: &str) -> Result<(), String> {
    let padded = match value.len() {
        2 => format!("{}:00:00", value),
        5 => format!("{}:00", value),
        _ => value.to_string(),
    };
    NaiveTime::parse_from_str(&padded, "%H:%M:%S%.f")
        .map(|_| ())
        .map_err(|e| e.to_string())
}

fn strip_zone(time: &str) -> &str {
    if let Some(stripped) = time.strip_suffix('Z') {
        return stripped;
    }
    match time.rfind(|c: char| c == '+' || c == '-') {
        Some(pos) => &time[..pos],
        None => time,
    }
}

fn literal_type(literal: &Literal) -> Option<&'static str> {
    match literal {
        Literal::Null => None,
        Literal::Boolean(_) => Some("boolean"),
        Literal::String(_) => Some("string"),
        Literal::Integer(_) => Some("integer"),
        Literal::Decimal(_) => Some("decimal"),
        Literal::Date(_) => Some("date"),
        Literal::DateTime(_) => Some("dateTime"),
        Literal::Time(_) => Some("time"),
        Literal::Quantity { .. } => Some("Quantity"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_registry::Cardinality;

    fn adapter() -> AstAdapter {
        AstAdapter::new(Arc::new(TypeRegistry::builtin().unwrap()))
    }

    #[test]
    fn test_path_metadata() {
        let node = adapter()
            .adapt(&RawNode::entire(RawNode::path(&["Patient", "name", "given"])))
            .unwrap();
        assert_eq!(node.to_string(), "Patient.name.given");
        assert_eq!(node.metadata.type_hint.as_deref(), Some("string"));
        assert_eq!(node.metadata.cardinality, Some(Cardinality::Array));
        assert_eq!(node.metadata.path.as_deref(), Some("Patient.name.given"));

        let NodeKind::Identifier { target: Some(name), .. } = &node.kind else {
            panic!("expected identifier");
        };
        let NodeKind::Identifier { target: Some(root), .. } = &name.kind else {
            panic!("expected identifier");
        };
        assert!(root.metadata.type_root);
    }

    #[test]
    fn test_polymorphic_element_records_choice_types() {
        let node = adapter()
            .adapt(&RawNode::path(&["Observation", "value"]))
            .unwrap();
        assert!(node.metadata.polymorphic);
        assert!(node.metadata.choice_types.contains(&"Quantity".to_string()));
        assert_eq!(node.metadata.type_hint, None);
    }

    #[test]
    fn test_lambda_argument_gets_item_type() {
        let raw = RawNode::call(
            RawNode::path(&["Patient", "name"]),
            "where",
            vec![RawNode::binary(
                "EqualityExpression",
                "=",
                RawNode::member("use"),
                RawNode::string("official"),
            )],
        );
        let node = adapter().adapt(&raw).unwrap();
        let NodeKind::FunctionCall { args, .. } = &node.kind else {
            panic!("expected function call");
        };
        let NodeKind::BinaryOp { left, .. } = &args[0].kind else {
            panic!("expected binary op");
        };
        assert_eq!(left.metadata.path.as_deref(), Some("HumanName.use"));
        assert_eq!(left.metadata.type_hint.as_deref(), Some("code"));
        assert_eq!(node.metadata.type_hint.as_deref(), Some("HumanName"));
    }

    #[test]
    fn test_context_type_resolves_leading_property() {
        let node = adapter()
            .with_context_type(Some("Patient".to_string()))
            .adapt(&RawNode::path(&["birthDate"]))
            .unwrap();
        assert_eq!(node.metadata.type_hint.as_deref(), Some("date"));
        assert!(!node.metadata.type_root);
    }

    #[test]
    fn test_literals() {
        let a = adapter();
        let cases = vec![
            (RawNode::number("42"), Literal::Integer(42)),
            (RawNode::number("1.50"), Literal::Decimal("1.50".to_string())),
            (RawNode::string("it\\'s"), Literal::String("it\\'s".to_string())),
            (RawNode::boolean(true), Literal::Boolean(true)),
            (
                RawNode::literal("DateLiteral", "@2020-02"),
                Literal::Date("2020-02".to_string()),
            ),
            (
                RawNode::literal("DateTimeLiteral", "@2020-02-03T10:15:00Z"),
                Literal::DateTime("2020-02-03T10:15:00Z".to_string()),
            ),
            (
                RawNode::literal("TimeLiteral", "@T10:15"),
                Literal::Time("10:15".to_string()),
            ),
            (
                RawNode::quantity("5", "'mg'"),
                Literal::Quantity {
                    value: "5".to_string(),
                    unit: "mg".to_string(),
                },
            ),
            (RawNode::literal("NullLiteral", "{}"), Literal::Null),
        ];
        for (raw, expected) in cases {
            assert_eq!(a.adapt(&raw).unwrap().kind, NodeKind::Literal(expected));
        }
    }

    #[test]
    fn test_negative_number_is_folded() {
        let node = adapter()
            .adapt(&RawNode::polarity("-", RawNode::number("3")))
            .unwrap();
        assert_eq!(node.kind, NodeKind::Literal(Literal::Integer(-3)));
    }

    #[test]
    fn test_invalid_date_literal() {
        let err = adapter()
            .adapt(&RawNode::literal("DateLiteral", "@2020-13-01"))
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidLiteral { .. }));
    }

    #[test]
    fn test_type_expression_and_of_type_argument() {
        let a = adapter();
        let node = a
            .adapt(&RawNode::type_expression(
                "is",
                RawNode::path(&["Patient", "gender"]),
                "System.String",
            ))
            .unwrap();
        let NodeKind::TypeOp { type_name, op, .. } = &node.kind else {
            panic!("expected type op");
        };
        assert_eq!(type_name, "System.String");
        assert_eq!(*op, TypeOperator::Is);

        let call = a
            .adapt(&RawNode::call(
                RawNode::path(&["Patient", "gender"]),
                "ofType",
                vec![RawNode::member("string")],
            ))
            .unwrap();
        assert_eq!(call.metadata.type_hint.as_deref(), Some("string"));
    }

    #[test]
    fn test_external_constant_and_variables() {
        let a = adapter();
        assert_eq!(
            a.adapt(&RawNode::external("resource")).unwrap().kind,
            NodeKind::Variable(Variable::External("resource".to_string()))
        );
        assert_eq!(
            a.adapt(&RawNode::this()).unwrap().kind,
            NodeKind::Variable(Variable::This)
        );
    }

    #[test]
    fn test_unrecognized_node() {
        let err = adapter().adapt(&RawNode::new("LambdaExpression")).unwrap_err();
        assert_eq!(
            err,
            AdapterError::UnrecognizedNode {
                node_type: "LambdaExpression".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_binary_node() {
        let raw = RawNode::new("AdditiveExpression")
            .with_terminal("+")
            .with_children(vec![RawNode::number("1")]);
        assert!(matches!(
            adapter().adapt(&raw),
            Err(AdapterError::MalformedNode { .. })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let mut raw = RawNode::number("1");
        for _ in 0..20 {
            raw = RawNode::parenthesized(raw);
        }
        let err = adapter().with_max_depth(10).adapt(&raw).unwrap_err();
        assert_eq!(err, AdapterError::TooDeep { max_depth: 10 });
    }
}
