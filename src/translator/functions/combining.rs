//! Combining functions and the set-like subsetting functions.

use crate::ast::BinaryOperator;
use crate::translator::context::TranslationContext;
use crate::translator::errors::TranslatorResult;
use crate::translator::function_registry::CallSite;
use crate::translator::value::SqlValue;
use crate::translator::Translator;

/// `union()` behaves like `|`: both inputs in order, duplicates kept.
pub(crate) fn union(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let other = t.argument(ctx, site, 0)?;
    Ok(t.union(&site.base, &other))
}

pub(crate) fn combine(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let other = t.argument(ctx, site, 0)?;
    Ok(t.union(&site.base, &other))
}

/// `EXISTS` test for an item equal to `element` among the items of `other`.
fn found_in(
    t: &Translator,
    ctx: &mut TranslationContext,
    element: &SqlValue,
    other: &SqlValue,
) -> String {
    let d = t.dialect();
    let alias = ctx.next_alias("elem");
    let candidate = t.element_of(other, &alias);
    let equal = t.compare(BinaryOperator::Equal, element, &candidate);
    d.exists(&format!(
        "SELECT 1 FROM {} WHERE {}",
        d.unnest_table(&t.as_collection(other), &alias),
        equal.sql
    ))
}

/// Distinct items present in both collections, in first-occurrence order.
pub(crate) fn intersect(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let other = t.argument(ctx, site, 0)?;
    if site.base.is_null_literal() || other.is_null_literal() {
        return Ok(SqlValue::null());
    }
    let groups = ctx.next_alias("common");
    let (from, element, index) = t.iterate(ctx, site);
    let present = found_in(t, ctx, &element, &other);
    let aggregate = t.json_agg_or_empty(
        &format!("{}.value", groups),
        Some(&format!("{}.first_idx", groups)),
        None,
    );
    let sql = format!(
        "(SELECT {agg} FROM (SELECT {value} AS value, min({index}) AS first_idx FROM {from} WHERE {present} GROUP BY {value}) AS {groups})",
        agg = aggregate,
        value = element.sql,
        index = index,
        from = from,
        present = present,
        groups = groups
    );
    Ok(SqlValue::json_collection(sql).with_type(site.base.fhir_type.clone()))
}

/// Items not present in the other collection; order and duplicates kept.
pub(crate) fn exclude(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let other = t.argument(ctx, site, 0)?;
    if other.is_null_literal() || site.base.is_null_literal() {
        return Ok(site.base.clone());
    }
    let (from, element, index) = t.iterate(ctx, site);
    let present = found_in(t, ctx, &element, &other);
    let aggregate = t.json_agg_or_empty(
        &element.sql,
        Some(&index),
        Some(&t.dialect().not(&present)),
    );
    Ok(
        SqlValue::json_collection(format!("(SELECT {} FROM {})", aggregate, from))
            .with_type(site.base.fhir_type.clone()),
    )
}
