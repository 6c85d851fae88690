//! SQL dialects.
//!
//! A [`Dialect`] turns already-decided semantics into the tokens one SQL engine
//! understands. Every method is a pure function of its string arguments: the
//! translator decides *what* to compute, the dialect only decides *how it is
//! spelled*. Capabilities an engine lacks return [`DialectError::NotImplemented`]
//! instead of degrading silently.
//!
//! Conventions shared by both engines:
//!
//! - JSON values are the engine's JSON type (`JSON` in DuckDB, `jsonb` in PostgreSQL).
//! - Unnested rows always expose a `value` column; ordinal variants add a 0-based `idx`.
//! - Safe casts yield `NULL` for unconvertible input rather than failing the query.

pub mod duckdb;
pub mod errors;
pub mod postgres;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use duckdb::DuckDbDialect;
pub use errors::DialectError;
pub use postgres::PostgresDialect;

use crate::type_registry::JsonKind;

pub type DialectResult<T> = Result<T, DialectError>;

/// Target SQL engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    #[serde(alias = "duck")]
    DuckDb,
    #[serde(alias = "postgres", alias = "pg")]
    PostgreSql,
}

impl DialectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialectKind::DuckDb => "duckdb",
            DialectKind::PostgreSql => "postgresql",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = DialectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "duckdb" | "duck" => Ok(DialectKind::DuckDb),
            "postgresql" | "postgres" | "pg" => Ok(DialectKind::PostgreSql),
            other => Err(DialectError::UnknownDialect {
                name: other.to_string(),
            }),
        }
    }
}

/// Create the dialect for an engine. Dialects are stateless and shared.
pub fn create_dialect(kind: DialectKind) -> Arc<dyn Dialect> {
    match kind {
        DialectKind::DuckDb => Arc::new(DuckDbDialect),
        DialectKind::PostgreSql => Arc::new(PostgresDialect),
    }
}

/// Target of a safe cast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    Decimal,
    Integer,
    Boolean,
    Text,
    Date,
    Timestamp,
    Time,
}

/// Scalar math functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathFunction {
    Abs,
    Ceiling,
    Floor,
    /// `round(x [, precision])`
    Round,
    Sqrt,
    Ln,
    /// `log(x, base)`
    Log,
    Exp,
    Power,
    Truncate,
    /// Remainder, `mod(a, b)`
    Modulo,
    /// Integer division truncating toward zero, `div(a, b)`
    IntegerDivide,
}

/// Calendar units for date arithmetic and differences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl DateUnit {
    /// Parse a calendar-duration keyword (`year`, `years`, `'month'`, `'ms'`, ...).
    pub fn parse(unit: &str) -> Option<Self> {
        match unit.trim().trim_matches('\'').to_ascii_lowercase().as_str() {
            "year" | "years" | "a" => Some(DateUnit::Year),
            "month" | "months" | "mo" => Some(DateUnit::Month),
            "week" | "weeks" | "wk" => Some(DateUnit::Week),
            "day" | "days" | "d" => Some(DateUnit::Day),
            "hour" | "hours" | "h" => Some(DateUnit::Hour),
            "minute" | "minutes" | "min" => Some(DateUnit::Minute),
            "second" | "seconds" | "s" => Some(DateUnit::Second),
            "millisecond" | "milliseconds" | "ms" => Some(DateUnit::Millisecond),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DateUnit::Year => "year",
            DateUnit::Month => "month",
            DateUnit::Week => "week",
            DateUnit::Day => "day",
            DateUnit::Hour => "hour",
            DateUnit::Minute => "minute",
            DateUnit::Second => "second",
            DateUnit::Millisecond => "millisecond",
        }
    }
}

/// Quote a string as a SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Syntax generation for one SQL engine.
///
/// Required methods are the places where the engines disagree; provided
/// methods are ANSI spellings both engines accept.
pub trait Dialect: Send + Sync + fmt::Debug {
    fn kind(&self) -> DialectKind;

    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    // ===== JSON ACCESS =====

    /// Field of a JSON object, as JSON.
    fn json_extract(&self, json: &str, field: &str) -> String;

    /// Field of a JSON object, as text (scalars unquoted).
    fn json_extract_text(&self, json: &str, field: &str) -> String;

    /// A scalar JSON value as text.
    fn json_to_text(&self, json: &str) -> String;

    /// Element of a JSON array by 0-based index. `index` is a SQL expression;
    /// integer literals produce a constant path.
    fn json_array_element(&self, json: &str, index: &str) -> String;

    fn json_array_last(&self, json: &str) -> String;

    fn json_array_length(&self, json: &str) -> String;

    /// Boolean test that `json` is a JSON array.
    fn json_is_array(&self, json: &str) -> String;

    /// Boolean test of the JSON kind of a value.
    fn json_type_test(&self, json: &str, kind: JsonKind) -> String;

    /// JSON array built from SQL values.
    fn json_array(&self, items: &[String]) -> String;

    /// Concatenation of two JSON arrays, keeping order and duplicates.
    fn json_array_concat(&self, left: &str, right: &str) -> String;

    /// JSON constant from its serialized text.
    fn json_literal(&self, json_text: &str) -> String;

    fn empty_json_array(&self) -> String {
        self.json_literal("[]")
    }

    /// Convert a native SQL value to JSON.
    fn to_json(&self, expr: &str) -> String;

    /// JSON object from (key, SQL value) pairs.
    fn json_object(&self, pairs: &[(String, String)]) -> String;

    // ===== UNNESTING =====

    /// Set-returning expression yielding one JSON row per array element.
    fn unnest(&self, array: &str) -> String;

    /// FROM item over a JSON array exposing `<alias>.value`.
    fn unnest_table(&self, array: &str, alias: &str) -> String;

    /// FROM item over a JSON array exposing `<alias>.value` and 0-based `<alias>.idx`.
    fn unnest_with_ordinality(&self, array: &str, alias: &str) -> String;

    /// Comma-joinable lateral unnest clause exposing `<alias>.value`.
    fn lateral_unnest(&self, array: &str, alias: &str) -> String;

    /// Sortable text key for a nested row: the parent key followed by the
    /// zero-padded element index.
    fn ordinal_key(&self, parent: Option<&str>, index: &str) -> String {
        let padded = format!("lpad({}, 6, '0')", self.cast_to_text(index));
        match parent {
            Some(parent) => self.string_concat(&[parent.to_string(), padded]),
            None => padded,
        }
    }

    // ===== STRINGS =====

    fn string_literal(&self, value: &str) -> String {
        quote_literal(value)
    }

    fn string_concat(&self, parts: &[String]) -> String {
        format!("({})", parts.join(" || "))
    }

    /// Substring from a 0-based start, optionally bounded in length.
    fn substring(&self, value: &str, start: &str, length: Option<&str>) -> String;

    /// 0-based position of `needle`, -1 when absent.
    fn string_position(&self, haystack: &str, needle: &str) -> String {
        format!("(strpos({}, {}) - 1)", haystack, needle)
    }

    fn starts_with(&self, value: &str, prefix: &str) -> String;

    fn ends_with(&self, value: &str, suffix: &str) -> String;

    fn string_contains(&self, value: &str, needle: &str) -> String;

    fn upper(&self, value: &str) -> String {
        format!("upper({})", value)
    }

    fn lower(&self, value: &str) -> String {
        format!("lower({})", value)
    }

    fn replace(&self, value: &str, pattern: &str, replacement: &str) -> String {
        format!("replace({}, {}, {})", value, pattern, replacement)
    }

    fn regex_matches(&self, value: &str, pattern: &str) -> String;

    fn regex_replace(&self, value: &str, pattern: &str, replacement: &str) -> String {
        format!("regexp_replace({}, {}, {}, 'g')", value, pattern, replacement)
    }

    fn string_length(&self, value: &str) -> String {
        format!("length({})", value)
    }

    fn trim(&self, value: &str) -> String {
        format!("trim({})", value)
    }

    /// JSON array of the pieces of `value` split on `separator`.
    fn string_split(&self, value: &str, separator: &str) -> String;

    /// JSON array of the characters of `value`.
    fn string_to_chars(&self, value: &str) -> String;

    /// Encode text in `format` (`base64`, `hex`, ...).
    fn encode(&self, value: &str, format: &str) -> DialectResult<String> {
        let _ = (value, format);
        Err(DialectError::not_implemented(self.name(), "encode"))
    }

    fn decode(&self, value: &str, format: &str) -> DialectResult<String> {
        let _ = (value, format);
        Err(DialectError::not_implemented(self.name(), "decode"))
    }

    // ===== CASTS =====

    /// Cast text to `target`, yielding NULL when it does not convert.
    fn safe_cast(&self, expr: &str, target: SqlType) -> String;

    /// Boolean test that text converts to `target`.
    fn converts_to(&self, expr: &str, target: SqlType) -> String;

    fn cast_to_decimal(&self, expr: &str) -> String {
        self.safe_cast(expr, SqlType::Decimal)
    }

    fn cast_to_integer(&self, expr: &str) -> String {
        self.safe_cast(expr, SqlType::Integer)
    }

    fn cast_to_boolean(&self, expr: &str) -> String {
        self.safe_cast(expr, SqlType::Boolean)
    }

    fn cast_to_text(&self, expr: &str) -> String {
        self.safe_cast(expr, SqlType::Text)
    }

    fn cast_to_date(&self, expr: &str) -> String {
        self.safe_cast(expr, SqlType::Date)
    }

    fn cast_to_timestamp(&self, expr: &str) -> String {
        self.safe_cast(expr, SqlType::Timestamp)
    }

    fn cast_to_time(&self, expr: &str) -> String {
        self.safe_cast(expr, SqlType::Time)
    }

    // ===== MATH =====

    fn math_function(&self, function: MathFunction, args: &[String]) -> String;

    // ===== DATE / TIME =====

    fn date_literal(&self, value: &str) -> String;

    /// Timestamp literal; values with a zone offset become zoned timestamps.
    fn datetime_literal(&self, value: &str) -> String;

    fn time_literal(&self, value: &str) -> String;

    fn current_timestamp(&self) -> String;

    fn current_date(&self) -> String {
        "current_date".to_string()
    }

    fn current_time(&self) -> String;

    /// `value + amount unit` (amount may be negative).
    fn date_add(&self, value: &str, amount: &str, unit: DateUnit) -> String;

    /// Number of unit boundaries crossed between `start` and `end`.
    fn date_diff(&self, unit: DateUnit, start: &str, end: &str) -> DialectResult<String>;

    /// Number of whole units elapsed between `start` and `end`.
    fn date_duration(&self, unit: DateUnit, start: &str, end: &str) -> DialectResult<String>;

    // ===== AGGREGATES =====

    /// `function(args ORDER BY order_by) FILTER (WHERE filter)`
    fn aggregate(
        &self,
        function: &str,
        args: &[String],
        order_by: Option<&str>,
        filter: Option<&str>,
    ) -> String {
        let mut sql = format!("{}({}", function, args.join(", "));
        if let Some(order) = order_by {
            sql.push_str(&format!(" ORDER BY {}", order));
        }
        sql.push(')');
        if let Some(predicate) = filter {
            sql.push_str(&format!(" FILTER (WHERE {})", predicate));
        }
        sql
    }

    /// Aggregate rows into a JSON array.
    fn json_array_agg(&self, expr: &str, order_by: Option<&str>, filter: Option<&str>) -> String;

    /// Product of numeric rows.
    fn product_aggregate(&self, expr: &str, filter: Option<&str>) -> String;

    // ===== LOGIC / COMPARISON =====

    fn comparison(&self, left: &str, op: &str, right: &str) -> String {
        format!("({} {} {})", left, op, right)
    }

    fn and(&self, left: &str, right: &str) -> String {
        format!("({} AND {})", left, right)
    }

    fn or(&self, left: &str, right: &str) -> String {
        format!("({} OR {})", left, right)
    }

    fn not(&self, expr: &str) -> String {
        format!("(NOT {})", expr)
    }

    fn coalesce(&self, exprs: &[String]) -> String {
        format!("COALESCE({})", exprs.join(", "))
    }

    fn case_when(&self, branches: &[(String, String)], otherwise: Option<&str>) -> String {
        let mut sql = String::from("CASE");
        for (condition, result) in branches {
            sql.push_str(&format!(" WHEN {} THEN {}", condition, result));
        }
        if let Some(default) = otherwise {
            sql.push_str(&format!(" ELSE {}", default));
        }
        sql.push_str(" END");
        sql
    }

    fn exists(&self, subquery: &str) -> String {
        format!("EXISTS ({})", subquery)
    }
}

/// Value of `index` when it is an integer literal, optionally parenthesized
/// (`(-1)`).
pub(crate) fn literal_index(index: &str) -> Option<i64> {
    let mut text = index.trim();
    while let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        text = inner.trim();
    }
    text.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_kind_parsing() {
        assert_eq!("duckdb".parse::<DialectKind>().unwrap(), DialectKind::DuckDb);
        assert_eq!("Postgres".parse::<DialectKind>().unwrap(), DialectKind::PostgreSql);
        assert_eq!("pg".parse::<DialectKind>().unwrap(), DialectKind::PostgreSql);
        assert!(matches!(
            "sqlite".parse::<DialectKind>(),
            Err(DialectError::UnknownDialect { .. })
        ));
    }

    #[test]
    fn test_dialect_kind_serde() {
        let kind: DialectKind = serde_yaml::from_str("postgres").unwrap();
        assert_eq!(kind, DialectKind::PostgreSql);
        assert_eq!(serde_json::to_string(&DialectKind::DuckDb).unwrap(), "\"duckdb\"");
    }

    #[test]
    fn test_create_dialect_matches_kind() {
        for kind in [DialectKind::DuckDb, DialectKind::PostgreSql] {
            assert_eq!(create_dialect(kind).kind(), kind);
        }
    }

    #[test]
    fn test_quote_literal_escapes() {
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_date_unit_parse() {
        assert_eq!(DateUnit::parse("'years'"), Some(DateUnit::Year));
        assert_eq!(DateUnit::parse("ms"), Some(DateUnit::Millisecond));
        assert_eq!(DateUnit::parse("fortnight"), None);
    }

    #[test]
    fn test_ordinal_key_per_engine() {
        let duck = create_dialect(DialectKind::DuckDb);
        assert_eq!(duck.ordinal_key(None, "e.idx"), "lpad(CAST(e.idx AS VARCHAR), 6, '0')");
        let pg = create_dialect(DialectKind::PostgreSql);
        assert_eq!(
            pg.ordinal_key(Some("src.ord"), "e.idx"),
            "(src.ord || lpad(CAST(e.idx AS TEXT), 6, '0'))"
        );
    }

    #[test]
    fn test_provided_aggregate_syntax() {
        let dialect = create_dialect(DialectKind::DuckDb);
        assert_eq!(
            dialect.aggregate("sum", &["x".to_string()], Some("i"), Some("x > 0")),
            "sum(x ORDER BY i) FILTER (WHERE x > 0)"
        );
        assert_eq!(
            dialect.case_when(&[("a".into(), "1".into())], Some("0")),
            "CASE WHEN a THEN 1 ELSE 0 END"
        );
    }
}
