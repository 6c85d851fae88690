//! String functions. All operate on the single input item; an empty input
//! or an empty argument makes the result empty.

use crate::translator::context::TranslationContext;
use crate::translator::errors::{TranslatorError, TranslatorResult};
use crate::translator::fragment::ValueKind;
use crate::translator::function_registry::CallSite;
use crate::translator::node_context;
use crate::translator::value::SqlValue;
use crate::translator::Translator;

/// The input as text plus each argument as text, or `None` if any is the
/// empty literal.
fn text_operands(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<Option<(String, Vec<String>)>> {
    if site.base.is_null_literal() {
        return Ok(None);
    }
    let mut args = Vec::with_capacity(site.args.len());
    for i in 0..site.args.len() {
        let arg = t.argument(ctx, site, i)?;
        if arg.is_null_literal() {
            return Ok(None);
        }
        args.push(t.as_text(&arg));
    }
    Ok(Some((t.as_text(&site.base), args)))
}

fn string_function(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
    kind: ValueKind,
    build: impl FnOnce(&str, &[String]) -> String,
) -> TranslatorResult<SqlValue> {
    match text_operands(t, ctx, site)? {
        Some((text, args)) => Ok(SqlValue::scalar(build(&text, &args), kind)),
        None => Ok(SqlValue::null()),
    }
}

pub(crate) fn index_of(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    string_function(t, ctx, site, ValueKind::Integer, |s, args| {
        d.string_position(s, &args[0])
    })
}

/// `substring(start [, length])`; a start outside the string is empty.
pub(crate) fn substring(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    if site.base.is_null_literal() {
        return Ok(SqlValue::null());
    }
    let start = t.argument(ctx, site, 0)?;
    if start.is_null_literal() {
        return Ok(SqlValue::null());
    }
    let length = t.optional_argument(ctx, site, 1)?;
    let d = t.dialect();
    let text = t.as_text(&site.base);
    let start = t.as_integer(&start);
    let length = length
        .filter(|len| !len.is_null_literal())
        .map(|len| t.as_integer(&len));
    let out_of_range = format!(
        "{start} < 0 OR {start} >= {len}",
        start = start,
        len = d.string_length(&text)
    );
    let sql = d.case_when(
        &[(out_of_range, "NULL".to_string())],
        Some(&d.substring(&text, &start, length.as_deref())),
    );
    Ok(SqlValue::scalar(sql, ValueKind::Text))
}

pub(crate) fn starts_with(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    string_function(t, ctx, site, ValueKind::Boolean, |s, args| {
        d.starts_with(s, &args[0])
    })
}

pub(crate) fn ends_with(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    string_function(t, ctx, site, ValueKind::Boolean, |s, args| {
        d.ends_with(s, &args[0])
    })
}

pub(crate) fn contains(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    string_function(t, ctx, site, ValueKind::Boolean, |s, args| {
        d.string_contains(s, &args[0])
    })
}

pub(crate) fn upper(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    string_function(t, ctx, site, ValueKind::Text, |s, _| d.upper(s))
}

pub(crate) fn lower(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    string_function(t, ctx, site, ValueKind::Text, |s, _| d.lower(s))
}

pub(crate) fn replace(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    string_function(t, ctx, site, ValueKind::Text, |s, args| {
        d.replace(s, &args[0], &args[1])
    })
}

/// True when the regex matches anywhere in the input.
pub(crate) fn matches(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    string_function(t, ctx, site, ValueKind::Boolean, |s, args| {
        d.regex_matches(s, &args[0])
    })
}

pub(crate) fn replace_matches(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    string_function(t, ctx, site, ValueKind::Text, |s, args| {
        d.regex_replace(s, &args[0], &args[1])
    })
}

pub(crate) fn length(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    string_function(t, ctx, site, ValueKind::Integer, |s, _| d.string_length(s))
}

pub(crate) fn trim(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    string_function(t, ctx, site, ValueKind::Text, |s, _| d.trim(s))
}

fn string_collection(sql: String) -> SqlValue {
    SqlValue::json_collection(sql).with_type(Some("string".to_string()))
}

pub(crate) fn to_chars(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    Ok(match text_operands(t, ctx, site)? {
        Some((text, _)) => string_collection(d.string_to_chars(&text)),
        None => SqlValue::null(),
    })
}

pub(crate) fn split(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let d = t.dialect();
    Ok(match text_operands(t, ctx, site)? {
        Some((text, args)) => string_collection(d.string_split(&text, &args[0])),
        None => SqlValue::null(),
    })
}

/// `join([separator])`: the items' text in order, `''` for no items.
pub(crate) fn join(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let separator = match t.optional_argument(ctx, site, 0)? {
        Some(sep) if !sep.is_null_literal() => t.as_text(&sep),
        _ => "''".to_string(),
    };
    let d = t.dialect();
    let (from, element, index) = t.iterate(ctx, site);
    let joined = d.aggregate(
        "string_agg",
        &[t.as_text(&element), separator],
        Some(&index),
        None,
    );
    let sql = format!(
        "(SELECT {} FROM {})",
        d.coalesce(&[joined, "''".to_string()]),
        from
    );
    Ok(SqlValue::scalar(sql, ValueKind::Text))
}

fn codec(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
    encode: bool,
) -> TranslatorResult<SqlValue> {
    if site.base.is_null_literal() {
        return Ok(SqlValue::null());
    }
    let format = t.literal_argument(ctx, site, 0)?;
    let text = t.as_text(&site.base);
    let d = t.dialect();
    let sql = if encode {
        d.encode(&text, &format)
    } else {
        d.decode(&text, &format)
    }
    .map_err(|e| TranslatorError::dialect_with_context(node_context(site.node), e))?;
    Ok(SqlValue::scalar(sql, ValueKind::Text))
}

pub(crate) fn encode(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    codec(t, ctx, site, true)
}

pub(crate) fn decode(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    codec(t, ctx, site, false)
}

#[cfg(test)]
mod tests {
    use crate::ast::{AstNode, Literal};
    use crate::dialect::DialectKind;
    use crate::translator::tests::translator_for;
    use crate::translator::{SqlValue, TranslationContext, TranslatorError, ValueKind};

    fn inline(kind: DialectKind, ast: &AstNode) -> Result<SqlValue, TranslatorError> {
        let t = translator_for(kind);
        let mut ctx = TranslationContext::new();
        ctx.root_table = "cte_1".to_string();
        ctx.current_table = "cte_1".to_string();
        t.inline(ast, &mut ctx)
    }

    #[test]
    fn test_substring_guards_range() {
        let ast = AstNode::string("hello").call("substring", vec![AstNode::integer(1)]);
        let value = inline(DialectKind::DuckDb, &ast).unwrap();
        assert_eq!(
            value.sql,
            "CASE WHEN 1 < 0 OR 1 >= length('hello') THEN NULL ELSE substring('hello', (1) + 1) END"
        );
    }

    #[test]
    fn test_empty_argument_makes_result_empty() {
        let ast = AstNode::string("abc").call("startsWith", vec![AstNode::literal(Literal::Null)]);
        assert!(inline(DialectKind::DuckDb, &ast).unwrap().is_null_literal());
    }

    #[test]
    fn test_join_defaults_to_empty_string() {
        let ast = AstNode::path(&["name", "given"]).call("join", vec![AstNode::string(", ")]);
        let value = inline(DialectKind::PostgreSql, &ast).unwrap();
        assert_eq!(value.kind, ValueKind::Text);
        assert!(value.sql.contains("string_agg("));
        assert!(value.sql.contains("', '"));
        assert!(value.sql.contains(", '')"));
    }

    #[test]
    fn test_unknown_encoding_is_dialect_error() {
        let ast = AstNode::string("abc").call("encode", vec![AstNode::string("rot13")]);
        let err = inline(DialectKind::DuckDb, &ast).unwrap_err();
        assert!(matches!(err, TranslatorError::Translation { .. }));
    }

    #[test]
    fn test_length_is_integer() {
        let ast = AstNode::string("abc").call("length", vec![]);
        assert_eq!(
            inline(DialectKind::PostgreSql, &ast).unwrap().kind,
            ValueKind::Integer
        );
    }
}
