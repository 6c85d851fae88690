//! Subsetting functions: positional slices of a collection.

use crate::translator::context::TranslationContext;
use crate::translator::errors::TranslatorResult;
use crate::translator::fragment::Shape;
use crate::translator::function_registry::CallSite;
use crate::translator::value::SqlValue;
use crate::translator::Translator;

pub(crate) fn first(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(t.single(&site.base))
}

pub(crate) fn last(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let base = &site.base;
    if base.is_item() {
        return Ok(base.clone());
    }
    let sql = t.dialect().json_array_last(&t.as_collection(base));
    Ok(SqlValue::json_item(sql).with_type(base.fhir_type.clone()))
}

/// Items whose 0-based position satisfies `predicate(idx)`, in order.
fn slice(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
    predicate: impl FnOnce(&str) -> String,
) -> SqlValue {
    let (from, element, index) = t.iterate(ctx, site);
    let aggregate = t.json_agg_or_empty(&element.sql, Some(&index), Some(&predicate(&index)));
    SqlValue::json_collection(format!("(SELECT {} FROM {})", aggregate, from))
        .with_type(site.base.fhir_type.clone())
}

pub(crate) fn tail(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(slice(t, ctx, site, |idx| format!("{} >= 1", idx)))
}

pub(crate) fn skip(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let count = t.argument(ctx, site, 0)?;
    if count.is_null_literal() {
        return Ok(site.base.clone());
    }
    let count = t.as_integer(&count);
    Ok(slice(t, ctx, site, |idx| format!("{} >= {}", idx, count)))
}

pub(crate) fn take(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let count = t.argument(ctx, site, 0)?;
    if count.is_null_literal() {
        return Ok(SqlValue::null());
    }
    let count = t.as_integer(&count);
    Ok(slice(t, ctx, site, |idx| format!("{} < {}", idx, count)))
}

/// The only item, or empty when there is not exactly one.
pub(crate) fn single(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let base = &site.base;
    if base.shape == Shape::Item {
        return Ok(base.clone());
    }
    let d = t.dialect();
    let items = t.as_collection(base);
    let sql = d.case_when(
        &[(
            format!("{} = 1", d.json_array_length(&items)),
            d.json_array_element(&items, "0"),
        )],
        None,
    );
    Ok(SqlValue::json_item(sql).with_type(base.fhir_type.clone()))
}
