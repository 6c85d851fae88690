//! `where()`, `select()` and `repeat()` inside an expression.
//!
//! On the spine these become their own fragments; here they are correlated
//! subqueries over the items of an inline collection.

use crate::translator::context::TranslationContext;
use crate::translator::errors::TranslatorResult;
use crate::translator::function_registry::CallSite;
use crate::translator::value::SqlValue;
use crate::translator::Translator;

pub(crate) fn where_items(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    if site.base.is_null_literal() {
        return Ok(SqlValue::null());
    }
    let (from, element, index) = t.iterate(ctx, site);
    let keep = t.lambda(&site.args[0], element.clone(), &index, ctx)?;
    let aggregate = t.json_agg_or_empty(&element.sql, Some(&index), Some(&t.as_boolean(&keep)));
    Ok(
        SqlValue::json_collection(format!("(SELECT {} FROM {})", aggregate, from))
            .with_type(site.base.fhir_type.clone()),
    )
}

pub(crate) fn select_items(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    if site.base.is_null_literal() {
        return Ok(SqlValue::null());
    }
    let (from, element, index) = t.iterate(ctx, site);
    let projected = t.lambda(&site.args[0], element, &index, ctx)?;
    let item = ctx.next_alias("item");
    let value = format!("{}.value", item);
    let aggregate = t.json_agg_or_empty(
        &value,
        Some(&format!("{}, {}.idx", index, item)),
        Some(&format!("{} IS NOT NULL", value)),
    );
    let sql = format!(
        "(SELECT {} FROM {}, LATERAL {})",
        aggregate,
        from,
        t.elements_from(&projected, &item)
    );
    Ok(SqlValue::json_collection(sql).with_type(projected.fhir_type.clone()))
}

/// Transitive closure of the projection, breadth first, bounded by
/// `max_repeat_depth`. Items keep their discovery order through `ord` keys.
pub(crate) fn repeat_items(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    if site.base.is_null_literal() {
        return Ok(SqlValue::null());
    }
    let d = t.dialect();
    let closure = ctx.next_alias("repeat");

    let (from, element, index) = t.iterate(ctx, site);
    let first = t.lambda(&site.args[0], element, &index, ctx)?;
    let first_item = ctx.next_alias("item");

    let step = SqlValue::json_item(format!("{}.value", closure)).with_type(first.fhir_type.clone());
    let next = t.lambda(&site.args[0], step, "0", ctx)?;
    let next_item = ctx.next_alias("item");

    let anchor_key = d.ordinal_key(
        Some(&d.ordinal_key(None, &index)),
        &format!("{}.idx", first_item),
    );
    let step_key = d.ordinal_key(
        Some(&format!("{}.ord", closure)),
        &format!("{}.idx", next_item),
    );
    let sql = format!(
        "(WITH RECURSIVE {r}(value, ord, depth) AS (\
         SELECT {fi}.value, {anchor_key}, 1 FROM {from}, LATERAL {first_from} WHERE {fi}.value IS NOT NULL \
         UNION ALL \
         SELECT {ni}.value, {step_key}, {r}.depth + 1 FROM {r}, LATERAL {next_from} \
         WHERE {ni}.value IS NOT NULL AND {r}.depth < {max}) \
         SELECT {agg} FROM {r})",
        r = closure,
        fi = first_item,
        ni = next_item,
        anchor_key = anchor_key,
        step_key = step_key,
        from = from,
        first_from = t.elements_from(&first, &first_item),
        next_from = t.elements_from(&next, &next_item),
        max = t.options().max_repeat_depth,
        agg = t.json_agg_or_empty(
            &format!("{}.value", closure),
            Some(&format!("{}.ord", closure)),
            None
        ),
    );
    Ok(SqlValue::json_collection(sql).with_type(first.fhir_type.clone()))
}
