//! SQL fragments: the translator's unit of output.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Well-known metadata keys
pub mod keys {
    pub const CTE_NAME: &str = "cte_name";
    pub const ELEMENT_ALIAS: &str = "element_alias";
    pub const ID_COLUMN: &str = "id_column";
    pub const RESULT_COLUMN: &str = "result_column";
    pub const VALUE_KIND: &str = "value_kind";
    pub const SHAPE: &str = "shape";
    pub const FHIR_TYPE: &str = "fhir_type";
    pub const PATH: &str = "path";
    pub const CHOICE_BASE: &str = "choice_base";
    pub const CHOICE_FIELD: &str = "choice_field";
    pub const CHOICE_TYPES: &str = "choice_types";
    pub const STRUCTURAL: &str = "structural";
    /// Rows of the unnested relation carry an `ord` ordering column
    pub const ORDINAL: &str = "ordinal";
    /// Ordering column of the source relation, prefixed onto `ord`
    pub const ORDER_COLUMN: &str = "order_column";
}

pub const DEFAULT_ELEMENT_ALIAS: &str = "elem";
pub const DEFAULT_RESULT_COLUMN: &str = "value";

/// SQL representation of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Json,
    Text,
    Decimal,
    Integer,
    Boolean,
    Date,
    DateTime,
    Time,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Json => "json",
            ValueKind::Text => "text",
            ValueKind::Decimal => "decimal",
            ValueKind::Integer => "integer",
            ValueKind::Boolean => "boolean",
            ValueKind::Date => "date",
            ValueKind::DateTime => "datetime",
            ValueKind::Time => "time",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueKind::Decimal | ValueKind::Integer)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, ValueKind::Date | ValueKind::DateTime | ValueKind::Time)
    }

    /// FHIR type name of a native SQL value
    pub fn fhir_type(&self) -> Option<&'static str> {
        match self {
            ValueKind::Json => None,
            ValueKind::Text => Some("string"),
            ValueKind::Decimal => Some("decimal"),
            ValueKind::Integer => Some("integer"),
            ValueKind::Boolean => Some("boolean"),
            ValueKind::Date => Some("date"),
            ValueKind::DateTime => Some("dateTime"),
            ValueKind::Time => Some("time"),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(ValueKind::Json),
            "text" => Ok(ValueKind::Text),
            "decimal" => Ok(ValueKind::Decimal),
            "integer" => Ok(ValueKind::Integer),
            "boolean" => Ok(ValueKind::Boolean),
            "date" => Ok(ValueKind::Date),
            "datetime" => Ok(ValueKind::DateTime),
            "time" => Ok(ValueKind::Time),
            other => Err(format!("unknown value kind `{}`", other)),
        }
    }
}

/// How many items a value holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// Zero (NULL) or one item
    Item,
    /// A JSON array
    Collection,
    /// JSON that may be an array or a single item
    Unknown,
}

impl Shape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::Item => "item",
            Shape::Collection => "collection",
            Shape::Unknown => "unknown",
        }
    }
}

impl FromStr for Shape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "item" => Ok(Shape::Item),
            "collection" => Ok(Shape::Collection),
            "unknown" => Ok(Shape::Unknown),
            other => Err(format!("unknown shape `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlFragment {
    pub expression: String,
    pub source_table: String,
    pub requires_unnest: bool,
    pub is_aggregate: bool,
    /// Names of earlier fragments this one reads, in first-use order
    pub dependencies: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

impl SqlFragment {
    pub fn new(expression: impl Into<String>, source_table: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            source_table: source_table.into(),
            requires_unnest: false,
            is_aggregate: false,
            dependencies: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_unnest(mut self) -> Self {
        self.requires_unnest = true;
        self
    }

    pub fn with_aggregate(mut self) -> Self {
        self.is_aggregate = true;
        self
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() && !self.dependencies.contains(&name) {
            self.dependencies.push(name);
        }
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_cte_name(self, name: &str) -> Self {
        self.with_metadata(keys::CTE_NAME, name)
    }

    pub fn with_value_kind(self, kind: ValueKind) -> Self {
        self.with_metadata(keys::VALUE_KIND, kind.as_str())
    }

    pub fn with_shape(self, shape: Shape) -> Self {
        self.with_metadata(keys::SHAPE, shape.as_str())
    }

    pub fn with_fhir_type(self, fhir_type: Option<&str>) -> Self {
        match fhir_type {
            Some(ty) => self.with_metadata(keys::FHIR_TYPE, ty),
            None => self,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn cte_name(&self) -> Option<&str> {
        self.get(keys::CTE_NAME)
    }

    pub fn element_alias(&self) -> &str {
        self.get(keys::ELEMENT_ALIAS)
            .unwrap_or(DEFAULT_ELEMENT_ALIAS)
    }

    pub fn id_column(&self) -> String {
        self.get(keys::ID_COLUMN)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.id", self.source_table))
    }

    pub fn result_column(&self) -> &str {
        self.get(keys::RESULT_COLUMN)
            .unwrap_or(DEFAULT_RESULT_COLUMN)
    }

    pub fn value_kind(&self) -> Option<ValueKind> {
        self.get(keys::VALUE_KIND).and_then(|k| k.parse().ok())
    }

    pub fn shape(&self) -> Shape {
        self.get(keys::SHAPE)
            .and_then(|s| s.parse().ok())
            .unwrap_or(Shape::Unknown)
    }

    pub fn fhir_type(&self) -> Option<&str> {
        self.get(keys::FHIR_TYPE)
    }

    pub fn is_ordinal(&self) -> bool {
        self.get(keys::ORDINAL) == Some("true")
    }

    /// The expression is already a complete query.
    pub fn is_complete_select(&self) -> bool {
        let head = self.expression.trim_start();
        let upper: String = head.chars().take(7).collect::<String>().to_ascii_uppercase();
        upper.starts_with("SELECT ") || upper.starts_with("WITH ")
    }
}
