//! Current date/time functions and calendar differences.

use crate::dialect::DateUnit;
use crate::translator::context::TranslationContext;
use crate::translator::errors::{TranslatorError, TranslatorResult};
use crate::translator::fragment::ValueKind;
use crate::translator::function_registry::CallSite;
use crate::translator::node_context;
use crate::translator::value::SqlValue;
use crate::translator::Translator;

pub(crate) fn now(
    t: &Translator,
    _ctx: &mut TranslationContext,
    _site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(SqlValue::scalar(
        t.dialect().current_timestamp(),
        ValueKind::DateTime,
    ))
}

pub(crate) fn today(
    t: &Translator,
    _ctx: &mut TranslationContext,
    _site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(SqlValue::scalar(t.dialect().current_date(), ValueKind::Date))
}

pub(crate) fn time_of_day(
    t: &Translator,
    _ctx: &mut TranslationContext,
    _site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(SqlValue::scalar(t.dialect().current_time(), ValueKind::Time))
}

/// Operands of `start.duration(end, 'unit')`, both as the same temporal kind.
fn span(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<Option<(DateUnit, String, String)>> {
    let end = t.argument(ctx, site, 0)?;
    let unit_text = t.literal_argument(ctx, site, 1)?;
    let unit = DateUnit::parse(&unit_text).ok_or_else(|| {
        TranslatorError::invalid_with_context(
            node_context(site.node),
            format!("`{}` is not a calendar duration unit", unit_text),
        )
    })?;
    if site.base.is_null_literal() || end.is_null_literal() {
        return Ok(None);
    }
    let both_dates = t.effective_kind(&site.base) == ValueKind::Date
        && t.effective_kind(&end) == ValueKind::Date;
    let (start, end) = if both_dates {
        (t.as_date(&site.base), t.as_date(&end))
    } else {
        (t.as_datetime(&site.base), t.as_datetime(&end))
    };
    Ok(Some((unit, start, end)))
}

/// Whole units elapsed from the input to the end.
pub(crate) fn duration(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let Some((unit, start, end)) = span(t, ctx, site)? else {
        return Ok(SqlValue::null());
    };
    let sql = t
        .dialect()
        .date_duration(unit, &start, &end)
        .map_err(|e| TranslatorError::dialect_with_context(node_context(site.node), e))?;
    Ok(SqlValue::scalar(sql, ValueKind::Integer))
}

/// Unit boundaries crossed from the input to the end.
pub(crate) fn difference(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let Some((unit, start, end)) = span(t, ctx, site)? else {
        return Ok(SqlValue::null());
    };
    let sql = t
        .dialect()
        .date_diff(unit, &start, &end)
        .map_err(|e| TranslatorError::dialect_with_context(node_context(site.node), e))?;
    Ok(SqlValue::scalar(sql, ValueKind::Integer))
}
