//! Literals and variables.

use serde_json::{json, Number, Value as JsonValue};

use super::context::TranslationContext;
use super::errors::{TranslatorError, TranslatorResult};
use super::fragment::ValueKind;
use super::value::SqlValue;
use super::{node_context, Translator};
use crate::ast::{AstNode, Literal, Variable};
use crate::dialect::quote_literal;

const UCUM_URL: &str = "http://unitsofmeasure.org";
const SNOMED_URL: &str = "http://snomed.info/sct";
const LOINC_URL: &str = "http://loinc.org";
const VALUE_SET_PREFIX: &str = "http://hl7.org/fhir/ValueSet/";
const EXTENSION_PREFIX: &str = "http://hl7.org/fhir/StructureDefinition/";

/// Variables naming the record under evaluation
const RECORD_VARIABLES: &[&str] = &["resource", "context", "rootResource"];

/// `2020` -> `2020-01-01`, `2020-03` -> `2020-03-01`
pub(crate) fn pad_date(value: &str) -> String {
    match value.len() {
        4 => format!("{}-01-01", value),
        7 => format!("{}-01", value),
        _ => value.to_string(),
    }
}

/// `14` -> `14:00:00`, `14:30` -> `14:30:00`
pub(crate) fn pad_time(value: &str) -> String {
    match value.len() {
        2 => format!("{}:00:00", value),
        5 => format!("{}:00", value),
        _ => value.to_string(),
    }
}

/// Complete a partial date-time literal to something both engines parse.
pub(crate) fn pad_datetime(value: &str) -> String {
    let trimmed = value.trim_end_matches('T');
    match trimmed.split_once('T') {
        None => format!("{}T00:00:00", pad_date(trimmed)),
        Some((date, time)) => {
            let zone_at = time
                .find(|c: char| c == 'Z' || c == '+' || c == '-')
                .unwrap_or(time.len());
            let (clock, zone) = time.split_at(zone_at);
            format!("{}T{}{}", pad_date(date), pad_time(clock), zone)
        }
    }
}

impl Translator {
    pub(crate) fn visit_literal(
        &self,
        literal: &Literal,
        node: &AstNode,
    ) -> TranslatorResult<SqlValue> {
        let d = self.dialect();
        let value = match literal {
            Literal::Null => SqlValue::null(),
            Literal::Boolean(b) => {
                SqlValue::boolean(if *b { "TRUE" } else { "FALSE" }).with_literal(json!(b))
            }
            Literal::String(s) => {
                SqlValue::scalar(quote_literal(s), ValueKind::Text).with_literal(json!(s))
            }
            Literal::Integer(i) => {
                SqlValue::scalar(i.to_string(), ValueKind::Integer).with_literal(json!(i))
            }
            Literal::Decimal(text) => {
                let number: Number = text.parse().map_err(|_| {
                    TranslatorError::invalid_with_context(
                        node_context(node),
                        format!("`{}` is not a decimal", text),
                    )
                })?;
                SqlValue::scalar(text.clone(), ValueKind::Decimal)
                    .with_literal(JsonValue::Number(number))
            }
            Literal::Date(text) => {
                SqlValue::scalar(d.date_literal(&pad_date(text)), ValueKind::Date)
                    .with_literal(json!(text))
            }
            Literal::DateTime(text) => {
                SqlValue::scalar(d.datetime_literal(&pad_datetime(text)), ValueKind::DateTime)
                    .with_literal(json!(text))
            }
            Literal::Time(text) => {
                SqlValue::scalar(d.time_literal(&pad_time(text)), ValueKind::Time)
                    .with_literal(json!(text))
            }
            Literal::Quantity { value, unit } => {
                let number: Number = value.parse().map_err(|_| {
                    TranslatorError::invalid_with_context(
                        node_context(node),
                        format!("`{}` is not a quantity value", value),
                    )
                })?;
                let object = json!({ "value": number, "unit": unit, "code": unit });
                SqlValue::json_item(d.json_literal(&object.to_string()))
                    .with_type(Some("Quantity".to_string()))
                    .with_literal(object)
            }
        };
        Ok(value)
    }

    /// A constant supplied by the caller or the environment.
    fn constant(&self, value: &JsonValue) -> SqlValue {
        match value {
            JsonValue::Null => SqlValue::null(),
            JsonValue::Bool(b) => {
                SqlValue::boolean(if *b { "TRUE" } else { "FALSE" }).with_literal(value.clone())
            }
            JsonValue::Number(n) if n.is_i64() => {
                SqlValue::scalar(n.to_string(), ValueKind::Integer).with_literal(value.clone())
            }
            JsonValue::Number(n) => {
                SqlValue::scalar(n.to_string(), ValueKind::Decimal).with_literal(value.clone())
            }
            JsonValue::String(s) => {
                SqlValue::scalar(quote_literal(s), ValueKind::Text).with_literal(value.clone())
            }
            JsonValue::Array(_) => {
                SqlValue::json_collection(self.dialect().json_literal(&value.to_string()))
                    .with_literal(value.clone())
            }
            JsonValue::Object(_) => {
                SqlValue::json_item(self.dialect().json_literal(&value.to_string()))
                    .with_literal(value.clone())
            }
        }
    }

    /// The record under evaluation, correlated by id when the relation in
    /// scope is not the root relation itself.
    pub(crate) fn root_value(&self, ctx: &TranslationContext) -> SqlValue {
        let root = &ctx.root_table;
        let fhir_type = ctx
            .variable("%resource")
            .and_then(|v| v.fhir_type.clone());
        let sql = if ctx.current_table.is_empty() || &ctx.current_table == root {
            format!("{}.value", root)
        } else {
            format!(
                "(SELECT {root}.value FROM {root} WHERE {root}.id = {current}.id)",
                root = root,
                current = ctx.current_table
            )
        };
        SqlValue::json_item(sql).with_type(fhir_type)
    }

    pub(crate) fn visit_variable(
        &self,
        variable: &Variable,
        node: &AstNode,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<SqlValue> {
        match variable {
            Variable::This => self.focus(ctx, node),
            Variable::Index => ctx.variable("$index").cloned().ok_or_else(|| {
                TranslatorError::unsupported("`$index` outside of an iterating function")
            }),
            Variable::Total => ctx.variable("$total").cloned().ok_or_else(|| {
                TranslatorError::unsupported("`$total` outside of aggregate()")
            }),
            Variable::External(name) => self.external_variable(name, ctx),
        }
    }

    fn external_variable(
        &self,
        name: &str,
        ctx: &TranslationContext,
    ) -> TranslatorResult<SqlValue> {
        let name = name.trim_matches(|c| c == '`' || c == '"' || c == '\'');
        if RECORD_VARIABLES.contains(&name) {
            return Ok(self.root_value(ctx));
        }
        if let Some(value) = self.options().constants.get(name) {
            return Ok(self.constant(value));
        }
        let url = match name {
            "ucum" => UCUM_URL.to_string(),
            "sct" => SNOMED_URL.to_string(),
            "loinc" => LOINC_URL.to_string(),
            other => {
                if let Some(value_set) = other.strip_prefix("vs-") {
                    format!("{}{}", VALUE_SET_PREFIX, value_set)
                } else if let Some(extension) = other.strip_prefix("ext-") {
                    format!("{}{}", EXTENSION_PREFIX, extension)
                } else {
                    return Err(TranslatorError::unsupported(format!(
                        "unknown environment variable `%{}`",
                        other
                    )));
                }
            }
        };
        Ok(self.constant(&JsonValue::String(url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_dates_are_padded() {
        assert_eq!(pad_date("2020"), "2020-01-01");
        assert_eq!(pad_date("2020-03"), "2020-03-01");
        assert_eq!(pad_date("2020-03-04"), "2020-03-04");
    }

    #[test]
    fn test_partial_datetimes_are_padded() {
        assert_eq!(pad_datetime("2015-02-04T14"), "2015-02-04T14:00:00");
        assert_eq!(pad_datetime("2015-02-04T"), "2015-02-04T00:00:00");
        assert_eq!(pad_datetime("2015T"), "2015-01-01T00:00:00");
        assert_eq!(
            pad_datetime("2015-02-04T14:30+01:00"),
            "2015-02-04T14:30:00+01:00"
        );
        assert_eq!(
            pad_datetime("2015-02-04T14:30:15.123Z"),
            "2015-02-04T14:30:15.123Z"
        );
    }

    #[test]
    fn test_partial_times_are_padded() {
        assert_eq!(pad_time("14"), "14:00:00");
        assert_eq!(pad_time("14:30"), "14:30:00");
    }
}
