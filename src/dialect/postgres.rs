//! PostgreSQL syntax.
//!
//! JSON values are `jsonb`. PostgreSQL casts fail the whole statement on bad
//! input, so safe casts are guarded by a format check first.

use super::duckdb::has_zone_offset;
use super::{
    literal_index, quote_literal, DateUnit, Dialect, DialectError, DialectKind, DialectResult,
    MathFunction, SqlType,
};
use crate::type_registry::JsonKind;

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

const DECIMAL_PATTERN: &str = r"^\s*[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)\s*$";
const INTEGER_PATTERN: &str = r"^\s*[+-]?[0-9]+\s*$";
const DATE_PATTERN: &str = r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$";
const TIMESTAMP_PATTERN: &str =
    r"^[0-9]{4}-[0-9]{2}-[0-9]{2}([T ][0-9]{2}:[0-9]{2}(:[0-9]{2}(\.[0-9]+)?)?(Z|[+-][0-9]{2}:[0-9]{2})?)?$";
const TIME_PATTERN: &str = r"^[0-9]{2}:[0-9]{2}(:[0-9]{2}(\.[0-9]+)?)?$";

impl PostgresDialect {
    fn type_name(target: SqlType) -> &'static str {
        match target {
            SqlType::Decimal => "NUMERIC",
            SqlType::Integer => "BIGINT",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Text => "TEXT",
            SqlType::Date => "DATE",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Time => "TIME",
        }
    }

    /// Format check that must hold before a cast to `target` is attempted.
    fn cast_guard(expr: &str, target: SqlType) -> String {
        let text = format!("CAST({} AS TEXT)", expr);
        let pattern = match target {
            SqlType::Decimal => DECIMAL_PATTERN,
            SqlType::Integer => INTEGER_PATTERN,
            SqlType::Date => DATE_PATTERN,
            SqlType::Timestamp => TIMESTAMP_PATTERN,
            SqlType::Time => TIME_PATTERN,
            SqlType::Boolean => {
                return format!("(lower({}) IN ('true', 'false'))", text);
            }
            SqlType::Text => return format!("({} IS NOT NULL)", expr),
        };
        format!("({} ~ {})", text, quote_literal(pattern))
    }

    fn epoch_units(unit: DateUnit) -> Option<&'static str> {
        match unit {
            DateUnit::Day => Some("86400"),
            DateUnit::Hour => Some("3600"),
            DateUnit::Minute => Some("60"),
            DateUnit::Second => Some("1"),
            DateUnit::Millisecond => Some("0.001"),
            _ => None,
        }
    }
}

fn arg(args: &[String], index: usize) -> &str {
    args.get(index).map(String::as_str).unwrap_or("NULL")
}

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::PostgreSql
    }

    fn json_extract(&self, json: &str, field: &str) -> String {
        format!("jsonb_extract_path({}, {})", json, quote_literal(field))
    }

    fn json_extract_text(&self, json: &str, field: &str) -> String {
        format!("jsonb_extract_path_text({}, {})", json, quote_literal(field))
    }

    fn json_to_text(&self, json: &str) -> String {
        format!("({} #>> '{{}}')", json)
    }

    fn json_array_element(&self, json: &str, index: &str) -> String {
        match literal_index(index) {
            Some(i) if i >= 0 => format!("({} -> {})", json, i),
            Some(_) => "NULL".to_string(),
            None => format!("({} -> CAST({} AS INTEGER))", json, index),
        }
    }

    fn json_array_last(&self, json: &str) -> String {
        format!("({} -> -1)", json)
    }

    fn json_array_length(&self, json: &str) -> String {
        format!("jsonb_array_length({})", json)
    }

    fn json_is_array(&self, json: &str) -> String {
        format!("(jsonb_typeof({}) = 'array')", json)
    }

    fn json_type_test(&self, json: &str, kind: JsonKind) -> String {
        match kind {
            JsonKind::String => format!("(jsonb_typeof({}) = 'string')", json),
            JsonKind::Number => format!("(jsonb_typeof({}) = 'number')", json),
            JsonKind::Integer => format!(
                "(jsonb_typeof({json}) = 'number' AND ({json} #>> '{{}}') ~ '^-?[0-9]+$')",
                json = json
            ),
            JsonKind::Boolean => format!("(jsonb_typeof({}) = 'boolean')", json),
            JsonKind::Object => format!("(jsonb_typeof({}) = 'object')", json),
            JsonKind::Array => format!("(jsonb_typeof({}) = 'array')", json),
        }
    }

    fn json_array(&self, items: &[String]) -> String {
        if items.is_empty() {
            return self.empty_json_array();
        }
        format!("jsonb_build_array({})", items.join(", "))
    }

    fn json_array_concat(&self, left: &str, right: &str) -> String {
        format!("({} || {})", left, right)
    }

    fn json_literal(&self, json_text: &str) -> String {
        format!("{}::jsonb", quote_literal(json_text))
    }

    fn to_json(&self, expr: &str) -> String {
        format!("to_jsonb({})", expr)
    }

    fn json_object(&self, pairs: &[(String, String)]) -> String {
        let args: Vec<String> = pairs
            .iter()
            .map(|(key, value)| format!("{}, {}", quote_literal(key), value))
            .collect();
        format!("jsonb_build_object({})", args.join(", "))
    }

    fn unnest(&self, array: &str) -> String {
        format!("jsonb_array_elements({})", array)
    }

    fn unnest_table(&self, array: &str, alias: &str) -> String {
        format!("jsonb_array_elements({}) AS {}(value)", array, alias)
    }

    fn unnest_with_ordinality(&self, array: &str, alias: &str) -> String {
        format!(
            "(SELECT {a}_o.value, {a}_o.ord - 1 AS idx FROM jsonb_array_elements({x}) WITH ORDINALITY AS {a}_o(value, ord)) AS {a}",
            a = alias,
            x = array
        )
    }

    fn lateral_unnest(&self, array: &str, alias: &str) -> String {
        format!("LATERAL {}", self.unnest_table(array, alias))
    }

    fn substring(&self, value: &str, start: &str, length: Option<&str>) -> String {
        match length {
            Some(len) => format!("substr({}, ({}) + 1, {})", value, start, len),
            None => format!("substr({}, ({}) + 1)", value, start),
        }
    }

    fn starts_with(&self, value: &str, prefix: &str) -> String {
        format!("(left({}, length({})) = {})", value, prefix, prefix)
    }

    fn ends_with(&self, value: &str, suffix: &str) -> String {
        format!("(right({}, length({})) = {})", value, suffix, suffix)
    }

    fn string_contains(&self, value: &str, needle: &str) -> String {
        format!("(strpos({}, {}) > 0)", value, needle)
    }

    fn regex_matches(&self, value: &str, pattern: &str) -> String {
        format!("({} ~ {})", value, pattern)
    }

    fn string_split(&self, value: &str, separator: &str) -> String {
        format!("to_jsonb(string_to_array({}, {}))", value, separator)
    }

    fn string_to_chars(&self, value: &str) -> String {
        format!("to_jsonb(regexp_split_to_array({}, ''))", value)
    }

    fn encode(&self, value: &str, format: &str) -> DialectResult<String> {
        match format {
            "base64" | "hex" => Ok(format!(
                "encode(convert_to({}, 'UTF8'), '{}')",
                value, format
            )),
            other => Err(DialectError::not_implemented(
                self.name(),
                format!("encode({})", other),
            )),
        }
    }

    fn decode(&self, value: &str, format: &str) -> DialectResult<String> {
        match format {
            "base64" | "hex" => Ok(format!(
                "convert_from(decode({}, '{}'), 'UTF8')",
                value, format
            )),
            other => Err(DialectError::not_implemented(
                self.name(),
                format!("decode({})", other),
            )),
        }
    }

    fn safe_cast(&self, expr: &str, target: SqlType) -> String {
        match target {
            SqlType::Text => format!("CAST({} AS TEXT)", expr),
            _ => format!(
                "CASE WHEN {} THEN CAST(trim(CAST({} AS TEXT)) AS {}) END",
                Self::cast_guard(expr, target),
                expr,
                Self::type_name(target)
            ),
        }
    }

    fn converts_to(&self, expr: &str, target: SqlType) -> String {
        format!("COALESCE({}, FALSE)", Self::cast_guard(expr, target))
    }

    fn math_function(&self, function: MathFunction, args: &[String]) -> String {
        let x = arg(args, 0);
        match function {
            MathFunction::Abs => format!("abs({})", x),
            MathFunction::Ceiling => format!("ceiling({})", x),
            MathFunction::Floor => format!("floor({})", x),
            MathFunction::Round => match args.get(1) {
                Some(precision) => format!("round(CAST({} AS NUMERIC), {})", x, precision),
                None => format!("round(CAST({} AS NUMERIC))", x),
            },
            MathFunction::Sqrt => format!("sqrt({})", x),
            MathFunction::Ln => format!("ln({})", x),
            MathFunction::Log => format!(
                "log(CAST({} AS NUMERIC), CAST({} AS NUMERIC))",
                arg(args, 1),
                x
            ),
            MathFunction::Exp => format!("exp({})", x),
            MathFunction::Power => format!("power({}, {})", x, arg(args, 1)),
            MathFunction::Truncate => format!("trunc({})", x),
            MathFunction::Modulo => format!("mod({}, {})", x, arg(args, 1)),
            MathFunction::IntegerDivide => format!(
                "div(CAST({} AS NUMERIC), CAST({} AS NUMERIC))",
                x,
                arg(args, 1)
            ),
        }
    }

    fn date_literal(&self, value: &str) -> String {
        format!("CAST({} AS DATE)", quote_literal(value))
    }

    fn datetime_literal(&self, value: &str) -> String {
        if has_zone_offset(value) {
            format!("CAST({} AS TIMESTAMPTZ)", quote_literal(value))
        } else {
            format!("CAST({} AS TIMESTAMP)", quote_literal(value))
        }
    }

    fn time_literal(&self, value: &str) -> String {
        format!("CAST({} AS TIME)", quote_literal(value))
    }

    fn current_timestamp(&self) -> String {
        "LOCALTIMESTAMP".to_string()
    }

    fn current_time(&self) -> String {
        "LOCALTIME".to_string()
    }

    fn date_add(&self, value: &str, amount: &str, unit: DateUnit) -> String {
        format!("({} + ({}) * INTERVAL '1 {}')", value, amount, unit.as_str())
    }

    fn date_diff(&self, unit: DateUnit, start: &str, end: &str) -> DialectResult<String> {
        let sql = match unit {
            DateUnit::Year => format!(
                "CAST(EXTRACT(YEAR FROM {e}) - EXTRACT(YEAR FROM {s}) AS BIGINT)",
                s = start,
                e = end
            ),
            DateUnit::Month => format!(
                "CAST((EXTRACT(YEAR FROM {e}) - EXTRACT(YEAR FROM {s})) * 12 + EXTRACT(MONTH FROM {e}) - EXTRACT(MONTH FROM {s}) AS BIGINT)",
                s = start,
                e = end
            ),
            DateUnit::Week => format!(
                "CAST((CAST(date_trunc('week', {e}) AS DATE) - CAST(date_trunc('week', {s}) AS DATE)) / 7 AS BIGINT)",
                s = start,
                e = end
            ),
            DateUnit::Day => format!("(CAST({} AS DATE) - CAST({} AS DATE))", end, start),
            DateUnit::Hour | DateUnit::Minute | DateUnit::Second => {
                let divisor = Self::epoch_units(unit).unwrap_or("1");
                format!(
                    "CAST(EXTRACT(EPOCH FROM date_trunc('{u}', {e}) - date_trunc('{u}', {s})) / {d} AS BIGINT)",
                    u = unit.as_str(),
                    s = start,
                    e = end,
                    d = divisor
                )
            }
            DateUnit::Millisecond => {
                return Err(DialectError::not_implemented(
                    self.name(),
                    "date_diff(millisecond)",
                ))
            }
        };
        Ok(sql)
    }

    fn date_duration(&self, unit: DateUnit, start: &str, end: &str) -> DialectResult<String> {
        let sql = match unit {
            DateUnit::Year => format!(
                "CAST(EXTRACT(YEAR FROM age({e}, {s})) AS BIGINT)",
                s = start,
                e = end
            ),
            DateUnit::Month => format!(
                "CAST(EXTRACT(YEAR FROM age({e}, {s})) * 12 + EXTRACT(MONTH FROM age({e}, {s})) AS BIGINT)",
                s = start,
                e = end
            ),
            DateUnit::Week => format!(
                "CAST(trunc((CAST({e} AS DATE) - CAST({s} AS DATE)) / 7.0) AS BIGINT)",
                s = start,
                e = end
            ),
            _ => {
                let divisor = Self::epoch_units(unit).unwrap_or("1");
                format!(
                    "CAST(trunc(EXTRACT(EPOCH FROM CAST({e} AS TIMESTAMP) - CAST({s} AS TIMESTAMP)) / {d}) AS BIGINT)",
                    s = start,
                    e = end,
                    d = divisor
                )
            }
        };
        Ok(sql)
    }

    fn json_array_agg(&self, expr: &str, order_by: Option<&str>, filter: Option<&str>) -> String {
        self.aggregate("jsonb_agg", &[expr.to_string()], order_by, filter)
    }

    /// No native product; sign and zero are tracked separately around
    /// `exp(sum(ln(abs(x))))`. Results are floating point.
    fn product_aggregate(&self, expr: &str, filter: Option<&str>) -> String {
        let with_filter = |extra: &str| match filter {
            Some(f) => format!("({}) AND {}", f, extra),
            None => extra.to_string(),
        };
        format!(
            "CASE WHEN {count} = 0 THEN NULL WHEN {zeros} > 0 THEN 0 ELSE (CASE WHEN {negatives} % 2 = 1 THEN -1 ELSE 1 END) * round(CAST(exp({log_sum}) AS NUMERIC), 10) END",
            count = self.aggregate("count", &[expr.to_string()], None, filter),
            zeros = self.aggregate("count", &["*".to_string()], None, Some(&with_filter(&format!("{} = 0", expr)))),
            negatives = self.aggregate("count", &["*".to_string()], None, Some(&with_filter(&format!("{} < 0", expr)))),
            log_sum = self.aggregate("sum", &[format!("ln(abs({}))", expr)], None, Some(&with_filter(&format!("{} <> 0", expr)))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: PostgresDialect = PostgresDialect;

    #[test]
    fn test_json_extraction() {
        assert_eq!(
            P.json_extract("r.resource", "name"),
            "jsonb_extract_path(r.resource, 'name')"
        );
        assert_eq!(
            P.json_extract_text("r.resource", "gender"),
            "jsonb_extract_path_text(r.resource, 'gender')"
        );
        assert_eq!(P.json_to_text("v"), "(v #>> '{}')");
    }

    #[test]
    fn test_array_access() {
        assert_eq!(P.json_array_element("v", "0"), "(v -> 0)");
        assert_eq!(P.json_array_element("v", "i"), "(v -> CAST(i AS INTEGER))");
        assert_eq!(P.json_array_element("v", "(-1)"), "NULL");
        assert_eq!(P.json_array_last("v"), "(v -> -1)");
        assert_eq!(P.json_array_concat("a", "b"), "(a || b)");
    }

    #[test]
    fn test_unnest_forms() {
        assert_eq!(
            P.lateral_unnest("src.value", "elem"),
            "LATERAL jsonb_array_elements(src.value) AS elem(value)"
        );
        assert_eq!(
            P.unnest_with_ordinality("x", "e"),
            "(SELECT e_o.value, e_o.ord - 1 AS idx FROM jsonb_array_elements(x) WITH ORDINALITY AS e_o(value, ord)) AS e"
        );
    }

    #[test]
    fn test_guarded_casts() {
        let cast = P.cast_to_integer("v");
        assert!(cast.starts_with("CASE WHEN (CAST(v AS TEXT) ~ "));
        assert!(cast.ends_with("THEN CAST(trim(CAST(v AS TEXT)) AS BIGINT) END"));
        assert_eq!(
            P.converts_to("v", SqlType::Boolean),
            "COALESCE((lower(CAST(v AS TEXT)) IN ('true', 'false')), FALSE)"
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(P.empty_json_array(), "'[]'::jsonb");
        assert_eq!(P.date_literal("2020-01-01"), "CAST('2020-01-01' AS DATE)");
        assert_eq!(
            P.datetime_literal("2020-01-01T10:00:00+02:00"),
            "CAST('2020-01-01T10:00:00+02:00' AS TIMESTAMPTZ)"
        );
    }

    #[test]
    fn test_date_arithmetic() {
        assert_eq!(
            P.date_add("d", "2", DateUnit::Day),
            "(d + (2) * INTERVAL '1 day')"
        );
        assert_eq!(
            P.date_diff(DateUnit::Day, "a", "b").unwrap(),
            "(CAST(b AS DATE) - CAST(a AS DATE))"
        );
        assert!(matches!(
            P.date_diff(DateUnit::Millisecond, "a", "b"),
            Err(DialectError::NotImplemented { dialect: "postgresql", .. })
        ));
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(
            P.json_array_agg("e.value", Some("e.idx"), None),
            "jsonb_agg(e.value ORDER BY e.idx)"
        );
        let product = P.product_aggregate("x", None);
        assert!(product.contains("sum(ln(abs(x))) FILTER (WHERE x <> 0)"));
    }
}
