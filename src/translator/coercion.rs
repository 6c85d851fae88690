//! Conversions between the SQL representations of a value.
//!
//! Values flow through the translator as JSON (record data), JSON arrays
//! (collections) or native SQL scalars (literals and computed results). Every
//! operator and function picks the representation it needs from here.

use super::fragment::{Shape, ValueKind};
use super::value::SqlValue;
use super::Translator;
use crate::type_registry::JsonKind;

impl Translator {
    /// The value as a JSON array expression that is never NULL.
    pub(crate) fn as_collection(&self, value: &SqlValue) -> String {
        let d = self.dialect();
        if value.is_null_literal() {
            return d.empty_json_array();
        }
        if value.literal.is_some() {
            return d.json_array(&[self.to_json(value)]);
        }
        match (value.kind, value.shape) {
            (ValueKind::Json, Shape::Collection) => {
                d.coalesce(&[value.sql.clone(), d.empty_json_array()])
            }
            (ValueKind::Json, Shape::Unknown) => d.case_when(
                &[
                    (format!("{} IS NULL", value.sql), d.empty_json_array()),
                    (d.json_is_array(&value.sql), value.sql.clone()),
                ],
                Some(&d.json_array(&[value.sql.clone()])),
            ),
            _ => d.case_when(
                &[(format!("{} IS NULL", value.sql), d.empty_json_array())],
                Some(&d.json_array(&[self.to_json(value)])),
            ),
        }
    }

    /// The first item of a value, keeping its representation.
    pub(crate) fn single(&self, value: &SqlValue) -> SqlValue {
        let d = self.dialect();
        let sql = match value.shape {
            Shape::Item => return value.clone(),
            Shape::Collection => d.json_array_element(&value.sql, "0"),
            Shape::Unknown => d.case_when(
                &[(
                    d.json_is_array(&value.sql),
                    d.json_array_element(&value.sql, "0"),
                )],
                Some(&value.sql),
            ),
        };
        SqlValue::json_item(sql).with_type(value.fhir_type.clone())
    }

    /// JSON representation of a value (an array stays an array).
    pub(crate) fn to_json(&self, value: &SqlValue) -> String {
        let d = self.dialect();
        if let Some(literal) = &value.literal {
            if literal.is_null() {
                return "NULL".to_string();
            }
            return d.json_literal(&literal.to_string());
        }
        match value.kind {
            ValueKind::Json => value.sql.clone(),
            _ => d.to_json(&value.sql),
        }
    }

    pub(crate) fn as_text(&self, value: &SqlValue) -> String {
        let item = self.single(value);
        match item.kind {
            ValueKind::Text => item.sql,
            ValueKind::Json => self.dialect().json_to_text(&item.sql),
            _ => self.dialect().cast_to_text(&item.sql),
        }
    }

    pub(crate) fn as_number(&self, value: &SqlValue) -> String {
        let item = self.single(value);
        let d = self.dialect();
        match item.kind {
            ValueKind::Decimal | ValueKind::Integer => item.sql,
            ValueKind::Json => d.cast_to_decimal(&d.json_to_text(&item.sql)),
            ValueKind::Boolean => d.case_when(
                &[(item.sql.clone(), "1".to_string())],
                Some(&format!("CASE WHEN {} IS NULL THEN NULL ELSE 0 END", item.sql)),
            ),
            _ => d.cast_to_decimal(&item.sql),
        }
    }

    pub(crate) fn as_integer(&self, value: &SqlValue) -> String {
        let item = self.single(value);
        let d = self.dialect();
        match item.kind {
            ValueKind::Integer => item.sql,
            ValueKind::Json => d.cast_to_integer(&d.json_to_text(&item.sql)),
            _ => d.cast_to_integer(&item.sql),
        }
    }

    pub(crate) fn as_boolean(&self, value: &SqlValue) -> String {
        let item = self.single(value);
        let d = self.dialect();
        match item.kind {
            ValueKind::Boolean => item.sql,
            ValueKind::Json => d.cast_to_boolean(&d.json_to_text(&item.sql)),
            ValueKind::Integer | ValueKind::Decimal => format!("({} <> 0)", item.sql),
            _ => d.cast_to_boolean(&item.sql),
        }
    }

    pub(crate) fn as_date(&self, value: &SqlValue) -> String {
        let item = self.single(value);
        let d = self.dialect();
        match item.kind {
            ValueKind::Date => item.sql,
            ValueKind::DateTime => format!("CAST({} AS DATE)", item.sql),
            ValueKind::Json => d.cast_to_date(&d.json_to_text(&item.sql)),
            _ => d.cast_to_date(&item.sql),
        }
    }

    pub(crate) fn as_datetime(&self, value: &SqlValue) -> String {
        let item = self.single(value);
        let d = self.dialect();
        match item.kind {
            ValueKind::DateTime => item.sql,
            ValueKind::Date => format!("CAST({} AS TIMESTAMP)", item.sql),
            ValueKind::Json => d.cast_to_timestamp(&d.json_to_text(&item.sql)),
            _ => d.cast_to_timestamp(&item.sql),
        }
    }

    pub(crate) fn as_time(&self, value: &SqlValue) -> String {
        let item = self.single(value);
        let d = self.dialect();
        match item.kind {
            ValueKind::Time => item.sql,
            ValueKind::Json => d.cast_to_time(&d.json_to_text(&item.sql)),
            _ => d.cast_to_time(&item.sql),
        }
    }

    /// Convert to `kind`, taking the first item of collections.
    pub(crate) fn coerce(&self, value: &SqlValue, kind: ValueKind) -> String {
        match kind {
            ValueKind::Json => self.to_json(&self.single(value)),
            ValueKind::Text => self.as_text(value),
            ValueKind::Decimal => self.as_number(value),
            ValueKind::Integer => self.as_integer(value),
            ValueKind::Boolean => self.as_boolean(value),
            ValueKind::Date => self.as_date(value),
            ValueKind::DateTime => self.as_datetime(value),
            ValueKind::Time => self.as_time(value),
        }
    }

    /// The native kind a value compares as, judged from its SQL kind or declared type.
    pub(crate) fn effective_kind(&self, value: &SqlValue) -> ValueKind {
        if value.kind != ValueKind::Json {
            return value.kind;
        }
        let Some(fhir_type) = value.type_name() else {
            return ValueKind::Json;
        };
        let temporal = ["date", "dateTime", "instant", "time"]
            .iter()
            .find(|t| self.registry().is_same_or_subtype_of(fhir_type, t).unwrap_or(false));
        match temporal {
            Some(&"date") => return ValueKind::Date,
            Some(&"time") => return ValueKind::Time,
            Some(_) => return ValueKind::DateTime,
            None => {}
        }
        match self.registry().primitive_json_kind(fhir_type) {
            Some(JsonKind::Boolean) => ValueKind::Boolean,
            Some(JsonKind::Integer) => ValueKind::Integer,
            Some(JsonKind::Number) => ValueKind::Decimal,
            Some(JsonKind::String) => ValueKind::Text,
            _ => ValueKind::Json,
        }
    }

    /// Representation both operands of a comparison are converted to.
    pub(crate) fn comparison_kind(&self, left: &SqlValue, right: &SqlValue) -> ValueKind {
        use ValueKind::*;
        match (self.effective_kind(left), self.effective_kind(right)) {
            (l, r) if l == r => l,
            (l, r) if l.is_numeric() && r.is_numeric() => Decimal,
            (Date, DateTime) | (DateTime, Date) => DateTime,
            (Json, other) | (other, Json) => other,
            (Text, other) | (other, Text) if other.is_temporal() => other,
            _ => Text,
        }
    }

    /// Boolean SQL testing that a value holds no items.
    pub(crate) fn is_empty_sql(&self, value: &SqlValue) -> String {
        if value.is_null_literal() {
            return "TRUE".to_string();
        }
        match value.shape {
            Shape::Item => format!("({} IS NULL)", value.sql),
            _ => format!(
                "({} = 0)",
                self.dialect()
                    .json_array_length(&self.as_collection(value))
            ),
        }
    }

    /// Items of a collection as a FROM item exposing `<alias>.value` and `<alias>.idx`.
    pub(crate) fn elements_from(&self, collection: &SqlValue, alias: &str) -> String {
        self.dialect()
            .unnest_with_ordinality(&self.as_collection(collection), alias)
    }

    /// One item of `collection` bound to `alias`.
    pub(crate) fn element_of(&self, collection: &SqlValue, alias: &str) -> SqlValue {
        SqlValue::json_item(format!("{}.value", alias)).with_type(collection.fhir_type.clone())
    }

    /// JSON-array aggregate that yields `[]` instead of NULL over no rows.
    pub(crate) fn json_agg_or_empty(
        &self,
        expr: &str,
        order_by: Option<&str>,
        filter: Option<&str>,
    ) -> String {
        let d = self.dialect();
        d.coalesce(&[d.json_array_agg(expr, order_by, filter), d.empty_json_array()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DialectKind;
    use crate::translator::tests::translator_for;

    #[test]
    fn test_collection_of_item_and_array() {
        let t = translator_for(DialectKind::DuckDb);
        let item = SqlValue::json_item("x");
        assert_eq!(
            t.as_collection(&item),
            "CASE WHEN x IS NULL THEN '[]'::JSON ELSE json_array(x) END"
        );
        let array = SqlValue::json_collection("a");
        assert_eq!(t.as_collection(&array), "COALESCE(a, '[]'::JSON)");
    }

    #[test]
    fn test_literals_embed_as_typed_json() {
        let t = translator_for(DialectKind::PostgreSql);
        let literal = SqlValue::scalar("'abc'", ValueKind::Text)
            .with_literal(serde_json::Value::String("abc".to_string()));
        assert_eq!(t.to_json(&literal), "'\"abc\"'::jsonb");
        assert_eq!(t.as_collection(&literal), "jsonb_build_array('\"abc\"'::jsonb)");
    }

    #[test]
    fn test_effective_kind_uses_declared_type() {
        let t = translator_for(DialectKind::DuckDb);
        let code = SqlValue::json_item("x").with_type(Some("code".to_string()));
        assert_eq!(t.effective_kind(&code), ValueKind::Text);
        let birth = SqlValue::json_item("x").with_type(Some("date".to_string()));
        assert_eq!(t.effective_kind(&birth), ValueKind::Date);
        let count = SqlValue::json_item("x").with_type(Some("positiveInt".to_string()));
        assert_eq!(t.effective_kind(&count), ValueKind::Integer);
    }

    #[test]
    fn test_comparison_kind_prefers_native_side() {
        let t = translator_for(DialectKind::DuckDb);
        let json = SqlValue::json_item("x");
        let number = SqlValue::scalar("1", ValueKind::Integer);
        assert_eq!(t.comparison_kind(&json, &number), ValueKind::Integer);
        let decimal = SqlValue::scalar("1.5", ValueKind::Decimal);
        assert_eq!(t.comparison_kind(&number, &decimal), ValueKind::Decimal);
    }
}
