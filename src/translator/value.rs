//! Typed SQL expressions produced while translating a subtree.

use serde_json::Value as JsonValue;

use super::fragment::{Shape, ValueKind};

/// A SQL expression together with what the translator knows about it.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlValue {
    pub sql: String,
    pub kind: ValueKind,
    pub shape: Shape,
    /// Canonical FHIR type of the items, when known
    pub fhir_type: Option<String>,
    /// Set when the value is an unresolved choice element (`Observation.value`)
    pub choice: Option<Box<ChoiceInfo>>,
    /// Set for literals, so they can be embedded as typed JSON constants
    pub literal: Option<JsonValue>,
}

/// A polymorphic element, before a type operator picks a concrete field.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceInfo {
    /// The object (or collection of objects) declaring the element
    pub parent: SqlValue,
    /// Element name without `[x]`
    pub base: String,
    pub types: Vec<String>,
}

impl SqlValue {
    pub fn new(sql: impl Into<String>, kind: ValueKind, shape: Shape) -> Self {
        Self {
            sql: sql.into(),
            kind,
            shape,
            fhir_type: None,
            choice: None,
            literal: None,
        }
    }

    pub fn json_item(sql: impl Into<String>) -> Self {
        Self::new(sql, ValueKind::Json, Shape::Item)
    }

    pub fn json_collection(sql: impl Into<String>) -> Self {
        Self::new(sql, ValueKind::Json, Shape::Collection)
    }

    /// Scalar SQL value (NULL means empty).
    pub fn scalar(sql: impl Into<String>, kind: ValueKind) -> Self {
        let mut value = Self::new(sql, kind, Shape::Item);
        value.fhir_type = kind.fhir_type().map(str::to_string);
        value
    }

    pub fn boolean(sql: impl Into<String>) -> Self {
        Self::scalar(sql, ValueKind::Boolean)
    }

    /// The empty collection.
    pub fn null() -> Self {
        let mut value = Self::json_item("NULL");
        value.literal = Some(JsonValue::Null);
        value
    }

    pub fn with_type(mut self, fhir_type: Option<String>) -> Self {
        self.fhir_type = fhir_type;
        self
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_literal(mut self, literal: JsonValue) -> Self {
        self.literal = Some(literal);
        self
    }

    pub fn with_choice(mut self, choice: ChoiceInfo) -> Self {
        self.choice = Some(Box::new(choice));
        self
    }

    pub fn is_json(&self) -> bool {
        self.kind == ValueKind::Json
    }

    pub fn is_item(&self) -> bool {
        self.shape == Shape::Item
    }

    /// Statically known to be the empty collection
    pub fn is_null_literal(&self) -> bool {
        matches!(self.literal, Some(JsonValue::Null))
    }

    pub fn type_name(&self) -> Option<&str> {
        self.fhir_type.as_deref()
    }
}
