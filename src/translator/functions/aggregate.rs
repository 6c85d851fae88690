//! Aggregates over a whole collection: `sum`, `avg`, `min`, `max` and the
//! general fold `aggregate(expr [, init])`.
//!
//! Folds whose body is `$this + $total`, `$this * $total` or a string
//! concatenation onto `$total` map to native SQL aggregates. Anything else
//! is evaluated item by item with a recursive CTE.

use crate::ast::{AstNode, BinaryOperator, NodeKind, Variable};
use crate::translator::context::TranslationContext;
use crate::translator::errors::TranslatorResult;
use crate::translator::fragment::ValueKind;
use crate::translator::function_registry::CallSite;
use crate::translator::value::SqlValue;
use crate::translator::Translator;

/// Numeric kind of the items: integer only when they are declared integers.
fn numeric_kind(t: &Translator, element: &SqlValue) -> ValueKind {
    match t.effective_kind(element) {
        ValueKind::Integer => ValueKind::Integer,
        _ => ValueKind::Decimal,
    }
}

/// `(SELECT <function>(item) FROM items)` with an optional empty-input default.
fn reduce(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
    function: &str,
    kind: ValueKind,
    empty_default: Option<&str>,
) -> SqlValue {
    let d = t.dialect();
    let (from, element, _) = t.iterate(ctx, site);
    let item = t.coerce(&element, kind);
    let mut aggregate = d.aggregate(function, &[item], None, None);
    if let Some(default) = empty_default {
        aggregate = d.coalesce(&[aggregate, default.to_string()]);
    }
    SqlValue::scalar(format!("(SELECT {} FROM {})", aggregate, from), kind)
}

pub(crate) fn sum(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let kind = numeric_kind(t, &t.element_of(&site.base, "_"));
    Ok(reduce(t, ctx, site, "sum", kind, Some("0")))
}

pub(crate) fn avg(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    Ok(reduce(t, ctx, site, "avg", ValueKind::Decimal, None))
}

/// Kind `min`/`max` compare in: the declared kind, numbers when unknown.
fn ordered_kind(t: &Translator, site: &CallSite<'_>) -> ValueKind {
    match t.effective_kind(&t.element_of(&site.base, "_")) {
        ValueKind::Json | ValueKind::Boolean => ValueKind::Decimal,
        other => other,
    }
}

pub(crate) fn min(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let kind = ordered_kind(t, site);
    Ok(reduce(t, ctx, site, "min", kind, None))
}

pub(crate) fn max(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let kind = ordered_kind(t, site);
    Ok(reduce(t, ctx, site, "max", kind, None))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NativeFold {
    Sum,
    Product,
    Concat,
}

/// Recognize fold bodies with a native aggregate.
fn native_fold(body: &AstNode, text_items: bool) -> Option<NativeFold> {
    let NodeKind::BinaryOp { op, left, right } = &body.kind else {
        return None;
    };
    let this_total = left.is_variable(&Variable::This) && right.is_variable(&Variable::Total);
    let total_this = left.is_variable(&Variable::Total) && right.is_variable(&Variable::This);
    if !this_total && !total_this {
        return None;
    }
    match op {
        BinaryOperator::Concat if total_this => Some(NativeFold::Concat),
        BinaryOperator::Add if text_items && total_this => Some(NativeFold::Concat),
        BinaryOperator::Add if !text_items => Some(NativeFold::Sum),
        BinaryOperator::Multiply if !text_items => Some(NativeFold::Product),
        _ => None,
    }
}

/// `aggregate(aggregator [, init])`
pub(crate) fn fold(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let init = t.optional_argument(ctx, site, 1)?;
    let init = init.filter(|value| !value.is_null_literal());
    if site.base.is_null_literal() {
        return Ok(init.unwrap_or_else(SqlValue::null));
    }

    let probe = t.element_of(&site.base, "_");
    let text_items = t.effective_kind(&probe) == ValueKind::Text
        || init
            .as_ref()
            .is_some_and(|value| t.effective_kind(value) == ValueKind::Text);
    if let Some(native) = native_fold(&site.args[0], text_items) {
        log::trace!("aggregate() folded natively as {:?}", native);
        return Ok(native_aggregate(t, ctx, site, native, init.as_ref()));
    }
    recursive_fold(t, ctx, site, init)
}

fn native_aggregate(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
    native: NativeFold,
    init: Option<&SqlValue>,
) -> SqlValue {
    let d = t.dialect();
    let (from, element, index) = t.iterate(ctx, site);
    let (aggregate, identity, kind) = match native {
        NativeFold::Sum | NativeFold::Product => {
            let mut kind = numeric_kind(t, &element);
            if let Some(init) = init {
                if t.effective_kind(init) != ValueKind::Integer {
                    kind = ValueKind::Decimal;
                }
            }
            let item = t.coerce(&element, kind);
            if native == NativeFold::Sum {
                (d.aggregate("sum", &[item], None, None), "0", kind)
            } else {
                // products are computed in floating point
                let product = d.product_aggregate(&item, None);
                let product = match kind {
                    ValueKind::Integer => format!("CAST({} AS BIGINT)", product),
                    _ => product,
                };
                (product, "1", kind)
            }
        }
        NativeFold::Concat => (
            d.aggregate(
                "string_agg",
                &[t.as_text(&element), "''".to_string()],
                Some(&index),
                None,
            ),
            "''",
            ValueKind::Text,
        ),
    };
    let sql = match init {
        None => format!("(SELECT {} FROM {})", aggregate, from),
        Some(init) => {
            let start = t.coerce(init, kind);
            let rest = format!(
                "(SELECT {} FROM {})",
                d.coalesce(&[aggregate, identity.to_string()]),
                from
            );
            match native {
                NativeFold::Sum => format!("({} + {})", start, rest),
                NativeFold::Product => format!("({} * {})", start, rest),
                NativeFold::Concat => d.string_concat(&[start, rest]),
            }
        }
    };
    SqlValue::scalar(sql, kind)
}

/// Item-by-item fold: `$total` starts at `init` (or the first item) and
/// each step evaluates the body over the next item.
fn recursive_fold(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
    init: Option<SqlValue>,
) -> TranslatorResult<SqlValue> {
    let name = ctx.next_alias("fold");
    let items = format!("{}_items", name);
    let state = format!("{}_state", name);
    let (from, element, index) = t.iterate(ctx, site);

    let total_type = init
        .as_ref()
        .and_then(|value| value.fhir_type.clone())
        .or_else(|| site.base.fhir_type.clone());
    let step_item = SqlValue::json_item(format!("{}.value", items))
        .with_type(site.base.fhir_type.clone());
    let total = SqlValue::json_item(format!("{}.total", state)).with_type(total_type);

    let body = {
        let mut scope = ctx.enter_scope();
        scope.bind("$total", total);
        t.lambda(&site.args[0], step_item, &format!("{}.idx", items), &mut scope)?
    };

    let anchor = match &init {
        Some(init) => format!("SELECT CAST(-1 AS BIGINT), {}", t.to_json(init)),
        None => format!(
            "SELECT {items}.idx, {items}.value FROM {items} WHERE {items}.idx = 0",
            items = items
        ),
    };
    let sql = format!(
        "(WITH RECURSIVE {items}(idx, value) AS (SELECT {index}, {value} FROM {from}), \
         {state}(idx, total) AS ({anchor} UNION ALL \
         SELECT {items}.idx, {step} FROM {state} JOIN {items} ON {items}.idx = {state}.idx + 1) \
         SELECT {state}.total FROM {state} ORDER BY {state}.idx DESC LIMIT 1)",
        items = items,
        state = state,
        index = index,
        value = element.sql,
        from = from,
        anchor = anchor,
        step = t.to_json(&body),
    );
    Ok(SqlValue::json_item(sql).with_type(body.fhir_type.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DialectKind;
    use crate::translator::tests::translator_for;
    use test_case::test_case;

    fn inline(kind: DialectKind, ast: &AstNode) -> SqlValue {
        let t = translator_for(kind);
        let mut ctx = TranslationContext::new();
        ctx.root_table = "cte_1".to_string();
        ctx.current_table = "cte_1".to_string();
        t.inline(ast, &mut ctx).unwrap()
    }

    fn numbers() -> AstNode {
        AstNode::binary(
            BinaryOperator::Union,
            AstNode::binary(BinaryOperator::Union, AstNode::integer(1), AstNode::integer(2)),
            AstNode::integer(3),
        )
    }

    fn this_op_total(op: BinaryOperator) -> AstNode {
        AstNode::binary(
            op,
            AstNode::variable(Variable::This),
            AstNode::variable(Variable::Total),
        )
    }

    #[test]
    fn test_sum_defaults_to_zero() {
        let value = inline(DialectKind::DuckDb, &numbers().call("sum", vec![]));
        assert!(value.sql.starts_with("(SELECT COALESCE(sum("));
        assert!(value.sql.contains(", 0) FROM"));
    }

    #[test]
    fn test_native_sum_with_init() {
        let ast = numbers().call(
            "aggregate",
            vec![this_op_total(BinaryOperator::Add), AstNode::integer(0)],
        );
        let value = inline(DialectKind::PostgreSql, &ast);
        assert!(value.sql.starts_with("(0 + (SELECT COALESCE(sum("));
        assert!(!value.sql.contains("RECURSIVE"));
    }

    #[test]
    fn test_native_product() {
        let ast = numbers().call("aggregate", vec![this_op_total(BinaryOperator::Multiply)]);
        let value = inline(DialectKind::DuckDb, &ast);
        assert!(value.sql.contains("product("));
    }

    #[test_case(DialectKind::DuckDb ; "duckdb")]
    #[test_case(DialectKind::PostgreSql ; "postgresql")]
    fn test_integer_product_stays_integer(kind: DialectKind) {
        let ast = numbers().call(
            "aggregate",
            vec![this_op_total(BinaryOperator::Multiply), AstNode::integer(1)],
        );
        let value = inline(kind, &ast);
        assert_eq!(value.kind, ValueKind::Integer);
        assert!(value.sql.starts_with("(1 * (SELECT COALESCE(CAST("), "{}", value.sql);
        assert!(value.sql.contains(" AS BIGINT), 1) FROM "), "{}", value.sql);
    }

    #[test]
    fn test_decimal_product_is_not_truncated() {
        let items = AstNode::binary(
            BinaryOperator::Union,
            AstNode::literal(crate::ast::Literal::Decimal("1.5".to_string())),
            AstNode::literal(crate::ast::Literal::Decimal("2.5".to_string())),
        );
        let ast = items.call("aggregate", vec![this_op_total(BinaryOperator::Multiply)]);
        let value = inline(DialectKind::PostgreSql, &ast);
        assert_eq!(value.kind, ValueKind::Decimal);
        assert!(!value.sql.contains("AS BIGINT)"), "{}", value.sql);
    }

    #[test]
    fn test_general_fold_is_recursive() {
        let body = AstNode::function(
            "iif",
            vec![
                AstNode::binary(
                    BinaryOperator::GreaterThan,
                    AstNode::variable(Variable::This),
                    AstNode::variable(Variable::Total),
                ),
                AstNode::variable(Variable::This),
                AstNode::variable(Variable::Total),
            ],
        );
        let ast = numbers().call("aggregate", vec![body, AstNode::integer(0)]);
        let value = inline(DialectKind::PostgreSql, &ast);
        assert!(value.sql.starts_with("(WITH RECURSIVE fold_"));
        assert!(value.sql.contains("SELECT CAST(-1 AS BIGINT), '0'::jsonb"));
        assert!(value.sql.ends_with("DESC LIMIT 1)"));
    }

    #[test]
    fn test_native_fold_recognition() {
        assert_eq!(
            native_fold(&this_op_total(BinaryOperator::Add), false),
            Some(NativeFold::Sum)
        );
        // string concatenation depends on order
        assert_eq!(native_fold(&this_op_total(BinaryOperator::Add), true), None);
        let total_first = AstNode::binary(
            BinaryOperator::Concat,
            AstNode::variable(Variable::Total),
            AstNode::variable(Variable::This),
        );
        assert_eq!(native_fold(&total_first, true), Some(NativeFold::Concat));
        assert_eq!(native_fold(&AstNode::integer(1), false), None);
    }
}
