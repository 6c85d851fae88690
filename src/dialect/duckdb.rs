//! DuckDB syntax.
//!
//! JSON values use the `JSON` logical type from the json extension. Arrays are
//! turned into `JSON[]` lists with the `'$[*]'` wildcard path before unnesting.

use super::{
    literal_index, quote_literal, DateUnit, Dialect, DialectError, DialectKind, DialectResult,
    MathFunction, SqlType,
};
use crate::type_registry::JsonKind;

#[derive(Debug, Clone, Copy, Default)]
pub struct DuckDbDialect;

impl DuckDbDialect {
    /// `JSON[]` list of the elements of a JSON array
    fn json_list(&self, array: &str) -> String {
        format!("json_extract({}, '$[*]')", array)
    }

    fn json_path(field: &str) -> String {
        if field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            quote_literal(&format!("$.{}", field))
        } else {
            quote_literal(&format!("$.\"{}\"", field.replace('"', "\\\"")))
        }
    }

    fn type_name(target: SqlType) -> &'static str {
        match target {
            SqlType::Decimal => "DOUBLE",
            SqlType::Integer => "BIGINT",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Text => "VARCHAR",
            SqlType::Date => "DATE",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Time => "TIME",
        }
    }
}

fn arg(args: &[String], index: usize) -> &str {
    args.get(index).map(String::as_str).unwrap_or("NULL")
}

/// True when an ISO date-time literal carries a zone designator.
pub(crate) fn has_zone_offset(value: &str) -> bool {
    match value.split_once('T') {
        Some((_, time)) => time.ends_with('Z') || time.contains('+') || time.contains('-'),
        None => false,
    }
}

impl Dialect for DuckDbDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::DuckDb
    }

    fn json_extract(&self, json: &str, field: &str) -> String {
        format!("json_extract({}, {})", json, Self::json_path(field))
    }

    fn json_extract_text(&self, json: &str, field: &str) -> String {
        format!("json_extract_string({}, {})", json, Self::json_path(field))
    }

    fn json_to_text(&self, json: &str) -> String {
        format!("json_extract_string({}, '$')", json)
    }

    fn json_array_element(&self, json: &str, index: &str) -> String {
        match literal_index(index) {
            Some(i) if i >= 0 => format!("json_extract({}, '$[{}]')", json, i),
            Some(_) => "NULL".to_string(),
            None => format!(
                "json_extract({}, '$[' || CAST({} AS VARCHAR) || ']')",
                json, index
            ),
        }
    }

    fn json_array_last(&self, json: &str) -> String {
        format!("json_extract({}, '$[#-1]')", json)
    }

    fn json_array_length(&self, json: &str) -> String {
        format!("json_array_length({})", json)
    }

    fn json_is_array(&self, json: &str) -> String {
        format!("(json_type({}) = 'ARRAY')", json)
    }

    fn json_type_test(&self, json: &str, kind: JsonKind) -> String {
        let types = match kind {
            JsonKind::String => "'VARCHAR'",
            JsonKind::Integer => "'BIGINT', 'UBIGINT'",
            JsonKind::Number => "'BIGINT', 'UBIGINT', 'DOUBLE'",
            JsonKind::Boolean => "'BOOLEAN'",
            JsonKind::Object => "'OBJECT'",
            JsonKind::Array => "'ARRAY'",
        };
        format!("(json_type({}) IN ({}))", json, types)
    }

    fn json_array(&self, items: &[String]) -> String {
        if items.is_empty() {
            return self.empty_json_array();
        }
        format!("json_array({})", items.join(", "))
    }

    fn json_array_concat(&self, left: &str, right: &str) -> String {
        format!(
            "to_json(list_concat({}, {}))",
            self.json_list(left),
            self.json_list(right)
        )
    }

    fn json_literal(&self, json_text: &str) -> String {
        format!("{}::JSON", quote_literal(json_text))
    }

    fn to_json(&self, expr: &str) -> String {
        format!("to_json({})", expr)
    }

    fn json_object(&self, pairs: &[(String, String)]) -> String {
        let args: Vec<String> = pairs
            .iter()
            .map(|(key, value)| format!("{}, {}", quote_literal(key), value))
            .collect();
        format!("json_object({})", args.join(", "))
    }

    fn unnest(&self, array: &str) -> String {
        format!("unnest({})", self.json_list(array))
    }

    fn unnest_table(&self, array: &str, alias: &str) -> String {
        format!("(SELECT {} AS value) AS {}", self.unnest(array), alias)
    }

    fn unnest_with_ordinality(&self, array: &str, alias: &str) -> String {
        // the list is bound once so nested arrays are not re-evaluated per column
        format!(
            "(SELECT unnest({alias}_src.items) AS value, generate_subscripts({alias}_src.items, 1) - 1 AS idx \
             FROM (SELECT {list} AS items) AS {alias}_src) AS {alias}",
            list = self.json_list(array),
            alias = alias
        )
    }

    fn lateral_unnest(&self, array: &str, alias: &str) -> String {
        format!("LATERAL {}", self.unnest_table(array, alias))
    }

    fn substring(&self, value: &str, start: &str, length: Option<&str>) -> String {
        match length {
            Some(len) => format!("substring({}, ({}) + 1, {})", value, start, len),
            None => format!("substring({}, ({}) + 1)", value, start),
        }
    }

    fn starts_with(&self, value: &str, prefix: &str) -> String {
        format!("starts_with({}, {})", value, prefix)
    }

    fn ends_with(&self, value: &str, suffix: &str) -> String {
        format!("ends_with({}, {})", value, suffix)
    }

    fn string_contains(&self, value: &str, needle: &str) -> String {
        format!("contains({}, {})", value, needle)
    }

    fn regex_matches(&self, value: &str, pattern: &str) -> String {
        format!("regexp_matches({}, {})", value, pattern)
    }

    fn string_split(&self, value: &str, separator: &str) -> String {
        format!("to_json(string_split({}, {}))", value, separator)
    }

    fn string_to_chars(&self, value: &str) -> String {
        format!("to_json(string_split({}, ''))", value)
    }

    fn encode(&self, value: &str, format: &str) -> DialectResult<String> {
        match format {
            "base64" => Ok(format!("to_base64(encode({}))", value)),
            "hex" => Ok(format!("hex({})", value)),
            other => Err(DialectError::not_implemented(
                self.name(),
                format!("encode({})", other),
            )),
        }
    }

    fn decode(&self, value: &str, format: &str) -> DialectResult<String> {
        match format {
            "base64" => Ok(format!("decode(from_base64({}))", value)),
            "hex" => Ok(format!("decode(unhex({}))", value)),
            other => Err(DialectError::not_implemented(
                self.name(),
                format!("decode({})", other),
            )),
        }
    }

    fn safe_cast(&self, expr: &str, target: SqlType) -> String {
        match target {
            SqlType::Text => format!("CAST({} AS VARCHAR)", expr),
            _ => format!("TRY_CAST({} AS {})", expr, Self::type_name(target)),
        }
    }

    fn converts_to(&self, expr: &str, target: SqlType) -> String {
        match target {
            SqlType::Text => format!("({} IS NOT NULL)", expr),
            _ => format!("({} IS NOT NULL)", self.safe_cast(expr, target)),
        }
    }

    fn math_function(&self, function: MathFunction, args: &[String]) -> String {
        let x = arg(args, 0);
        match function {
            MathFunction::Abs => format!("abs({})", x),
            MathFunction::Ceiling => format!("ceil({})", x),
            MathFunction::Floor => format!("floor({})", x),
            MathFunction::Round => match args.get(1) {
                Some(precision) => format!("round({}, {})", x, precision),
                None => format!("round({})", x),
            },
            MathFunction::Sqrt => format!("sqrt({})", x),
            MathFunction::Ln => format!("ln({})", x),
            MathFunction::Log => format!("(ln({}) / ln({}))", x, arg(args, 1)),
            MathFunction::Exp => format!("exp({})", x),
            MathFunction::Power => format!("pow({}, {})", x, arg(args, 1)),
            MathFunction::Truncate => format!("trunc({})", x),
            MathFunction::Modulo => format!("({} % {})", x, arg(args, 1)),
            MathFunction::IntegerDivide => {
                format!("CAST(trunc(({}) / ({})) AS BIGINT)", x, arg(args, 1))
            }
        }
    }

    fn date_literal(&self, value: &str) -> String {
        format!("DATE {}", quote_literal(value))
    }

    fn datetime_literal(&self, value: &str) -> String {
        if has_zone_offset(value) {
            format!("TIMESTAMPTZ {}", quote_literal(value))
        } else {
            format!("TIMESTAMP {}", quote_literal(value))
        }
    }

    fn time_literal(&self, value: &str) -> String {
        format!("TIME {}", quote_literal(value))
    }

    fn current_timestamp(&self) -> String {
        "CAST(now() AS TIMESTAMP)".to_string()
    }

    fn current_time(&self) -> String {
        "CAST(now() AS TIME)".to_string()
    }

    fn date_add(&self, value: &str, amount: &str, unit: DateUnit) -> String {
        format!(
            "({} + INTERVAL ({}) {})",
            value,
            amount,
            unit.as_str().to_ascii_uppercase()
        )
    }

    fn date_diff(&self, unit: DateUnit, start: &str, end: &str) -> DialectResult<String> {
        Ok(format!("date_diff('{}', {}, {})", unit.as_str(), start, end))
    }

    fn date_duration(&self, unit: DateUnit, start: &str, end: &str) -> DialectResult<String> {
        Ok(format!("date_sub('{}', {}, {})", unit.as_str(), start, end))
    }

    fn json_array_agg(&self, expr: &str, order_by: Option<&str>, filter: Option<&str>) -> String {
        self.aggregate("json_group_array", &[expr.to_string()], order_by, filter)
    }

    fn product_aggregate(&self, expr: &str, filter: Option<&str>) -> String {
        self.aggregate("product", &[expr.to_string()], None, filter)
    }
}
