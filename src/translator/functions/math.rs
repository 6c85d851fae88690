//! Math functions over the single input number.
//!
//! Inputs outside a function's domain (`sqrt` of a negative, `ln` of zero)
//! give empty rather than a database error.

use crate::dialect::MathFunction;
use crate::translator::context::TranslationContext;
use crate::translator::errors::TranslatorResult;
use crate::translator::fragment::ValueKind;
use crate::translator::function_registry::CallSite;
use crate::translator::value::SqlValue;
use crate::translator::Translator;

fn unary(
    t: &Translator,
    site: &CallSite<'_>,
    function: MathFunction,
    kind: ValueKind,
    domain: Option<&str>,
) -> SqlValue {
    if site.base.is_null_literal() {
        return SqlValue::null();
    }
    let d = t.dialect();
    let x = t.as_number(&site.base);
    let call = d.math_function(function, &[x.clone()]);
    let sql = match domain {
        Some(condition) => d.case_when(
            &[(format!("{} {}", x, condition), call)],
            None,
        ),
        None => call,
    };
    SqlValue::scalar(sql, kind)
}

/// Integer input stays integer.
fn same_kind(t: &Translator, value: &SqlValue) -> ValueKind {
    match t.effective_kind(value) {
        ValueKind::Integer => ValueKind::Integer,
        _ => ValueKind::Decimal,
    }
}

pub(crate) fn abs(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let kind = same_kind(t, &site.base);
    Ok(unary(t, site, MathFunction::Abs, kind, None))
}

pub(crate) fn ceiling(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(unary(t, site, MathFunction::Ceiling, ValueKind::Integer, None))
}

pub(crate) fn floor(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(unary(t, site, MathFunction::Floor, ValueKind::Integer, None))
}

pub(crate) fn truncate(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(unary(t, site, MathFunction::Truncate, ValueKind::Integer, None))
}

pub(crate) fn sqrt(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(unary(t, site, MathFunction::Sqrt, ValueKind::Decimal, Some(">= 0")))
}

pub(crate) fn ln(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(unary(t, site, MathFunction::Ln, ValueKind::Decimal, Some("> 0")))
}

pub(crate) fn exp(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(unary(t, site, MathFunction::Exp, ValueKind::Decimal, None))
}

/// `round([precision])`
pub(crate) fn round(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    if site.base.is_null_literal() {
        return Ok(SqlValue::null());
    }
    let mut args = vec![t.as_number(&site.base)];
    if let Some(precision) = t.optional_argument(ctx, site, 0)? {
        if precision.is_null_literal() {
            return Ok(SqlValue::null());
        }
        args.push(t.as_integer(&precision));
    }
    let sql = t.dialect().math_function(MathFunction::Round, &args);
    Ok(SqlValue::scalar(sql, ValueKind::Decimal))
}

/// `log(base)`
pub(crate) fn log(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let base = t.argument(ctx, site, 0)?;
    if site.base.is_null_literal() || base.is_null_literal() {
        return Ok(SqlValue::null());
    }
    let d = t.dialect();
    let x = t.as_number(&site.base);
    let b = t.as_number(&base);
    let guard = format!("{x} > 0 AND {b} > 0 AND {b} <> 1", x = x, b = b);
    let sql = d.case_when(
        &[(guard, d.math_function(MathFunction::Log, &[x, b]))],
        None,
    );
    Ok(SqlValue::scalar(sql, ValueKind::Decimal))
}

/// `power(exponent)`; integer when both operands are.
pub(crate) fn power(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let exponent = t.argument(ctx, site, 0)?;
    if site.base.is_null_literal() || exponent.is_null_literal() {
        return Ok(SqlValue::null());
    }
    let d = t.dialect();
    let call = d.math_function(
        MathFunction::Power,
        &[t.as_number(&site.base), t.as_number(&exponent)],
    );
    let integral = t.effective_kind(&site.base) == ValueKind::Integer
        && t.effective_kind(&exponent) == ValueKind::Integer;
    if integral {
        return Ok(SqlValue::scalar(
            d.cast_to_integer(&call),
            ValueKind::Integer,
        ));
    }
    Ok(SqlValue::scalar(call, ValueKind::Decimal))
}
