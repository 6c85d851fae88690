//! Existence functions.
//!
//! Results are single booleans (or a count) per input collection. Nothing
//! here collapses rows: reductions over a collection are scalar subqueries
//! over its unnested items.

use crate::ast::BinaryOperator;
use crate::translator::context::TranslationContext;
use crate::translator::errors::TranslatorResult;
use crate::translator::fragment::{Shape, ValueKind};
use crate::translator::function_registry::CallSite;
use crate::translator::value::SqlValue;
use crate::translator::Translator;

pub(crate) fn empty(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(SqlValue::boolean(t.is_empty_sql(&site.base)))
}

pub(crate) fn exists(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    if let Some(criteria) = site.args.first() {
        let (from, element, index) = t.iterate(ctx, site);
        let predicate = t.lambda(criteria, element, &index, ctx)?;
        let subquery = format!("SELECT 1 FROM {} WHERE {}", from, t.as_boolean(&predicate));
        return Ok(SqlValue::boolean(d.exists(&subquery)));
    }
    if site.base.is_null_literal() {
        return Ok(SqlValue::boolean("FALSE"));
    }
    let sql = match site.base.shape {
        Shape::Item => format!("({} IS NOT NULL)", site.base.sql),
        _ => d.case_when(
            &[(
                format!("{} > 0", d.json_array_length(&t.as_collection(&site.base))),
                "TRUE".to_string(),
            )],
            Some("FALSE"),
        ),
    };
    Ok(SqlValue::boolean(sql))
}

pub(crate) fn all(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    let (from, element, index) = t.iterate(ctx, site);
    let predicate = t.lambda(&site.args[0], element, &index, ctx)?;
    let failing = format!(
        "SELECT 1 FROM {} WHERE {}",
        from,
        d.not(&d.coalesce(&[t.as_boolean(&predicate), "FALSE".to_string()]))
    );
    let sql = d.case_when(&[(d.exists(&failing), "FALSE".to_string())], Some("TRUE"));
    Ok(SqlValue::boolean(sql))
}

/// `bool_and`/`bool_or` over the items, with the empty-input default.
fn boolean_reduction(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
    function: &str,
    negate: bool,
    empty_default: &str,
) -> SqlValue {
    let d = t.dialect();
    let (from, element, _) = t.iterate(ctx, site);
    let mut item = t.as_boolean(&element);
    if negate {
        item = d.not(&item);
    }
    let aggregate = d.aggregate(function, &[item], None, None);
    SqlValue::boolean(format!(
        "(SELECT {} FROM {})",
        d.coalesce(&[aggregate, empty_default.to_string()]),
        from
    ))
}

pub(crate) fn all_true(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(boolean_reduction(t, ctx, site, "bool_and", false, "TRUE"))
}

pub(crate) fn any_true(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(boolean_reduction(t, ctx, site, "bool_or", false, "FALSE"))
}

pub(crate) fn all_false(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(boolean_reduction(t, ctx, site, "bool_and", true, "TRUE"))
}

pub(crate) fn any_false(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(boolean_reduction(t, ctx, site, "bool_or", true, "FALSE"))
}

/// Every item of `subset` has an equal item in `superset`.
fn contained_in(
    t: &Translator,
    ctx: &mut TranslationContext,
    subset: &SqlValue,
    superset: &SqlValue,
) -> SqlValue {
    let d = t.dialect();
    let inner = ctx.next_alias("elem");
    let outer = ctx.next_alias("elem");
    let matches = t.compare(
        BinaryOperator::Equal,
        &t.element_of(subset, &inner),
        &t.element_of(superset, &outer),
    );
    let missing = format!(
        "SELECT 1 FROM {} WHERE {}",
        d.unnest_table(&t.as_collection(subset), &inner),
        d.not(&d.exists(&format!(
            "SELECT 1 FROM {} WHERE {}",
            d.unnest_table(&t.as_collection(superset), &outer),
            matches.sql
        )))
    );
    SqlValue::boolean(d.case_when(&[(d.exists(&missing), "FALSE".to_string())], Some("TRUE")))
}

pub(crate) fn subset_of(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let other = t.argument(ctx, site, 0)?;
    Ok(contained_in(t, ctx, &site.base, &other))
}

pub(crate) fn superset_of(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let other = t.argument(ctx, site, 0)?;
    Ok(contained_in(t, ctx, &other, &site.base))
}

pub(crate) fn count(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    let base = &site.base;
    let sql = if base.is_null_literal() {
        "0".to_string()
    } else if base.shape == Shape::Item && base.literal.is_none() {
        format!("CASE WHEN {} IS NULL THEN 0 ELSE 1 END", base.sql)
    } else if base.shape == Shape::Collection && base.literal.is_none() {
        d.coalesce(&[d.json_array_length(&base.sql), "0".to_string()])
    } else {
        d.coalesce(&[d.json_array_length(&t.as_collection(base)), "0".to_string()])
    };
    Ok(SqlValue::scalar(sql, ValueKind::Integer))
}

pub(crate) fn distinct(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let groups = ctx.next_alias("distinct");
    let (from, element, index) = t.iterate(ctx, site);
    let aggregate = t.json_agg_or_empty(
        &format!("{}.value", groups),
        Some(&format!("{}.first_idx", groups)),
        None,
    );
    let sql = format!(
        "(SELECT {agg} FROM (SELECT {value} AS value, min({index}) AS first_idx FROM {from} GROUP BY {value}) AS {groups})",
        agg = aggregate,
        value = element.sql,
        index = index,
        from = from,
        groups = groups
    );
    Ok(SqlValue::json_collection(sql).with_type(site.base.fhir_type.clone()))
}

pub(crate) fn is_distinct(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let (from, element, _) = t.iterate(ctx, site);
    Ok(SqlValue::boolean(format!(
        "(SELECT count(DISTINCT {}) = count(*) FROM {})",
        element.sql, from
    )))
}

/// A single item holding a primitive value.
pub(crate) fn has_value(
    t: &Translator,
    _ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    if site.base.is_null_literal() {
        return Ok(SqlValue::boolean("FALSE"));
    }
    let item = t.single(&site.base);
    if let Some(ty) = item.type_name() {
        if !t.registry().is_primitive(ty) {
            return Ok(SqlValue::boolean("FALSE"));
        }
    }
    Ok(SqlValue::boolean(format!("({} IS NOT NULL)", item.sql)))
}
