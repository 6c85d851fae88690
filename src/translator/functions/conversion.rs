//! Conversion functions, `iif()`, `not()` and `trace()`.
//!
//! Conversions never fail a query: an input that does not convert yields
//! empty (NULL), and the `convertsTo*` tests are empty for empty input.

use crate::dialect::SqlType;
use crate::translator::context::TranslationContext;
use crate::translator::errors::TranslatorResult;
use crate::translator::fragment::{Shape, ValueKind};
use crate::translator::function_registry::CallSite;
use crate::translator::value::SqlValue;
use crate::translator::Translator;

const TRUE_TOKENS: &str = "'true', 't', 'yes', 'y', '1', '1.0'";
const FALSE_TOKENS: &str = "'false', 'f', 'no', 'n', '0', '0.0'";

/// `iif(criterion, true-result [, otherwise-result])`
pub(crate) fn iif(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    let focus = t.single(&site.base);
    let criterion = t.lambda(&site.args[0], focus.clone(), "0", ctx)?;
    let when_true = t.lambda(&site.args[1], focus.clone(), "0", ctx)?;
    let otherwise = match site.args.get(2) {
        Some(arg) => t.lambda(arg, focus, "0", ctx)?,
        None => SqlValue::null(),
    };
    if criterion.is_null_literal() {
        return Ok(otherwise);
    }

    let (a, b, kind, shape) = unify_branches(t, &when_true, &otherwise);
    let sql = d.case_when(&[(t.as_boolean(&criterion), a)], Some(&b));
    let fhir_type = match (when_true.type_name(), otherwise.type_name()) {
        (Some(x), Some(y)) if x == y => Some(x.to_string()),
        (Some(x), None) if otherwise.is_null_literal() => Some(x.to_string()),
        (None, Some(y)) if when_true.is_null_literal() => Some(y.to_string()),
        _ => None,
    };
    Ok(SqlValue::new(sql, kind, shape).with_type(fhir_type))
}

/// Bring both branches of a conditional to one SQL type.
fn unify_branches(
    t: &Translator,
    a: &SqlValue,
    b: &SqlValue,
) -> (String, String, ValueKind, Shape) {
    if a.is_null_literal() && b.is_null_literal() {
        return ("NULL".to_string(), "NULL".to_string(), ValueKind::Json, Shape::Item);
    }
    if b.is_null_literal() {
        return (a.sql.clone(), "NULL".to_string(), a.kind, a.shape);
    }
    if a.is_null_literal() {
        return ("NULL".to_string(), b.sql.clone(), b.kind, b.shape);
    }
    if a.kind == b.kind && a.shape == b.shape {
        return (a.sql.clone(), b.sql.clone(), a.kind, a.shape);
    }
    if a.is_item() && b.is_item() {
        if a.kind.is_numeric() && b.kind.is_numeric() {
            return (
                t.as_number(a),
                t.as_number(b),
                ValueKind::Decimal,
                Shape::Item,
            );
        }
        return (t.to_json(a), t.to_json(b), ValueKind::Json, Shape::Item);
    }
    (
        t.as_collection(a),
        t.as_collection(b),
        ValueKind::Json,
        Shape::Collection,
    )
}

/// Convert the input item to `kind` with a cast that yields NULL on failure.
fn convert(t: &Translator, site: &CallSite<'_>, target: SqlType, kind: ValueKind) -> SqlValue {
    let base = &site.base;
    if base.is_null_literal() {
        return SqlValue::null();
    }
    if t.effective_kind(base) == kind {
        return SqlValue::scalar(t.coerce(base, kind), kind);
    }
    let d = t.dialect();
    let sql = match (t.effective_kind(base), kind) {
        (ValueKind::Boolean, ValueKind::Integer | ValueKind::Decimal) => {
            let flag = t.as_boolean(base);
            format!("CASE WHEN {} THEN 1 WHEN NOT {} THEN 0 END", flag, flag)
        }
        (ValueKind::Integer, ValueKind::Decimal) => t.as_number(base),
        _ => d.safe_cast(&t.as_text(base), target),
    };
    SqlValue::scalar(sql, kind)
}

/// `CASE WHEN x IS NULL THEN NULL ELSE <test> END`
fn converts(t: &Translator, site: &CallSite<'_>, test: impl FnOnce(&str) -> String) -> SqlValue {
    if site.base.is_null_literal() {
        return SqlValue::null();
    }
    let text = t.as_text(&site.base);
    let sql = t.dialect().case_when(
        &[(format!("{} IS NULL", text), "NULL".to_string())],
        Some(&test(&text)),
    );
    SqlValue::boolean(sql)
}

pub(crate) fn to_string(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    if site.base.is_null_literal() {
        return Ok(SqlValue::null());
    }
    Ok(SqlValue::scalar(t.as_text(&site.base), ValueKind::Text))
}

pub(crate) fn to_integer(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(convert(t, site, SqlType::Integer, ValueKind::Integer))
}

pub(crate) fn to_decimal(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(convert(t, site, SqlType::Decimal, ValueKind::Decimal))
}

pub(crate) fn to_boolean(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let base = &site.base;
    if base.is_null_literal() {
        return Ok(SqlValue::null());
    }
    if t.effective_kind(base) == ValueKind::Boolean {
        return Ok(SqlValue::boolean(t.as_boolean(base)));
    }
    let d = t.dialect();
    let token = d.lower(&d.trim(&t.as_text(base)));
    let sql = d.case_when(
        &[
            (format!("{} IN ({})", token, TRUE_TOKENS), "TRUE".to_string()),
            (format!("{} IN ({})", token, FALSE_TOKENS), "FALSE".to_string()),
        ],
        None,
    );
    Ok(SqlValue::boolean(sql))
}

pub(crate) fn to_date(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(convert(t, site, SqlType::Date, ValueKind::Date))
}

pub(crate) fn to_datetime(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(convert(t, site, SqlType::Timestamp, ValueKind::DateTime))
}

pub(crate) fn to_time(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(convert(t, site, SqlType::Time, ValueKind::Time))
}

pub(crate) fn converts_to_string(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(converts(t, site, |_| "TRUE".to_string()))
}

pub(crate) fn converts_to_integer(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    Ok(converts(t, site, |text| d.converts_to(text, SqlType::Integer)))
}

pub(crate) fn converts_to_decimal(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    Ok(converts(t, site, |text| d.converts_to(text, SqlType::Decimal)))
}

pub(crate) fn converts_to_boolean(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    Ok(converts(t, site, |text| {
        format!(
            "({} IN ({}, {}))",
            d.lower(&d.trim(text)),
            TRUE_TOKENS,
            FALSE_TOKENS
        )
    }))
}

pub(crate) fn converts_to_date(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    Ok(converts(t, site, |text| d.converts_to(text, SqlType::Date)))
}

pub(crate) fn converts_to_datetime(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    Ok(converts(t, site, |text| d.converts_to(text, SqlType::Timestamp)))
}

pub(crate) fn not(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    if site.base.is_null_literal() {
        return Ok(SqlValue::null());
    }
    Ok(SqlValue::boolean(t.dialect().not(&t.as_boolean(&site.base))))
}

/// Logs the traced expression at translation time; the input passes through.
pub(crate) fn trace(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let label = t.literal_argument(ctx, site, 0)?;
    match site.args.get(1) {
        Some(projection) => {
            let projected = t.lambda(projection, site.base.clone(), "0", ctx)?;
            log::debug!("trace `{}`: {}", label, projected.sql);
        }
        None => log::debug!("trace `{}`: {}", label, site.base.sql),
    }
    Ok(site.base.clone())
}

#[cfg(test)]
mod tests {
    use crate::ast::{AstNode, BinaryOperator, Literal};
    use crate::dialect::DialectKind;
    use crate::translator::tests::translator_for;
    use crate::translator::{SqlValue, TranslationContext, ValueKind};

    fn inline(kind: DialectKind, ast: &AstNode) -> SqlValue {
        let t = translator_for(kind);
        let mut ctx = TranslationContext::new();
        ctx.root_table = "cte_1".to_string();
        ctx.current_table = "cte_1".to_string();
        t.inline(ast, &mut ctx).unwrap()
    }

    #[test]
    fn test_iif_branches_share_a_type() {
        let ast = AstNode::function(
            "iif",
            vec![
                AstNode::boolean(true),
                AstNode::integer(1),
                AstNode::literal(Literal::Decimal("2.5".to_string())),
            ],
        );
        let value = inline(DialectKind::DuckDb, &ast);
        assert_eq!(value.kind, ValueKind::Decimal);
        assert!(value.sql.starts_with("CASE WHEN TRUE THEN"));
    }

    #[test]
    fn test_iif_without_otherwise_is_empty_when_false() {
        let ast = AstNode::function(
            "iif",
            vec![
                AstNode::binary(
                    BinaryOperator::GreaterThan,
                    AstNode::integer(1),
                    AstNode::integer(2),
                ),
                AstNode::string("yes"),
            ],
        );
        let value = inline(DialectKind::PostgreSql, &ast);
        assert_eq!(value.kind, ValueKind::Text);
        assert!(value.sql.ends_with("ELSE NULL END"));
    }

    #[test]
    fn test_to_integer_uses_safe_cast() {
        let ast = AstNode::string("42").call("toInteger", vec![]);
        let value = inline(DialectKind::DuckDb, &ast);
        assert_eq!(value.sql, "TRY_CAST('42' AS BIGINT)");
        assert_eq!(value.kind, ValueKind::Integer);
    }

    #[test]
    fn test_to_boolean_accepts_token_lists() {
        let ast = AstNode::string("Yes").call("toBoolean", vec![]);
        let value = inline(DialectKind::PostgreSql, &ast);
        assert!(value.sql.contains("'yes'"));
        assert!(value.sql.contains("THEN FALSE END"));
    }

    #[test]
    fn test_converts_to_is_empty_for_empty_input() {
        let ast = AstNode::literal(Literal::Null).call("convertsToInteger", vec![]);
        assert!(inline(DialectKind::DuckDb, &ast).is_null_literal());
    }
}
