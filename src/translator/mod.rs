//! FHIRPath to SQL translation.
//!
//! The [`Translator`] walks an adapted [`AstNode`] tree and produces an
//! ordered list of [`SqlFragment`]s. Each fragment becomes one CTE; together
//! they form a pipeline of relations that all expose the same two columns:
//!
//! - `id`: the record the row belongs to
//! - `value`: the current focus (JSON or a native SQL scalar)
//!
//! # Two modes
//!
//! The leftmost invocation chain of the expression (`Patient.name.given`) is
//! the *relational spine*. Every step on it that flattens an array or
//! re-aggregates per record starts a new fragment (see `spine`).
//!
//! Everything else (operator operands, function arguments, lambda bodies) is
//! translated *inline* into a single SQL expression over the relation in
//! scope. Inline collections are JSON arrays; inline items are either JSON
//! values or native scalars, tracked by [`SqlValue`].
//!
//! # Scoping
//!
//! Every visit runs inside a [`ScopeGuard`], so after translating any subtree
//! the [`TranslationContext`] is exactly what it was before.

pub mod context;
pub mod errors;
pub mod fragment;
pub mod function_registry;
pub mod value;

mod coercion;
mod functions;
mod literals;
mod operators;
mod path;
mod spine;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub use context::{ContextSnapshot, ScopeGuard, TranslationContext, TranslationMode};
pub use errors::{TranslationCause, TranslatorError, TranslatorResult};
pub use fragment::{keys, Shape, SqlFragment, ValueKind};
pub use function_registry::{FunctionCategory, FunctionSpec};
pub use value::{ChoiceInfo, SqlValue};

use crate::ast::{AstNode, NodeKind};
use crate::dialect::Dialect;
use crate::type_registry::TypeRegistry;

use function_registry::CallSite;

/// Settings that shape the SQL a translator emits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorOptions {
    /// Table holding one row per record
    pub resource_table: String,
    pub id_column: String,
    /// JSON column holding the record
    pub resource_column: String,
    /// Resource type records are filtered to when the expression does not name one
    pub resource_type: Option<String>,
    /// Unknown elements are errors instead of untyped navigation
    pub strict_paths: bool,
    /// Recursion bound of `repeat()`
    pub max_repeat_depth: usize,
    /// Values of caller-supplied `%name` variables
    pub constants: BTreeMap<String, JsonValue>,
}

impl Default for TranslatorOptions {
    fn default() -> Self {
        Self {
            resource_table: "resources".to_string(),
            id_column: "id".to_string(),
            resource_column: "resource".to_string(),
            resource_type: None,
            strict_paths: false,
            max_repeat_depth: 10,
            constants: BTreeMap::new(),
        }
    }
}

/// `kind \`expression\``, used as error context
pub(crate) fn node_context(node: &AstNode) -> String {
    format!("{} `{}`", node.kind_name(), node)
}

#[derive(Debug, Clone)]
pub struct Translator {
    registry: Arc<TypeRegistry>,
    dialect: Arc<dyn Dialect>,
    options: TranslatorOptions,
}

impl Translator {
    pub fn new(
        registry: Arc<TypeRegistry>,
        dialect: Arc<dyn Dialect>,
        options: TranslatorOptions,
    ) -> Self {
        Self {
            registry,
            dialect,
            options,
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn options(&self) -> &TranslatorOptions {
        &self.options
    }

    /// Translate an expression into the fragments of one query, in
    /// dependency order. The last fragment holds the result.
    pub fn translate(
        &self,
        ast: &AstNode,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<Vec<SqlFragment>> {
        ctx.reset_counters();
        let mut scope = ctx.enter_scope();
        scope.mode = TranslationMode::Relational;
        let fragments = spine::translate_spine(self, ast, &mut scope)?;
        log::debug!(
            "Translated `{}` into {} fragment(s) for {}",
            ast,
            fragments.len(),
            self.dialect.name()
        );
        Ok(fragments)
    }

    /// The focus item (`$this`) in scope.
    pub(crate) fn focus(
        &self,
        ctx: &TranslationContext,
        node: &AstNode,
    ) -> TranslatorResult<SqlValue> {
        if let Some(focus) = &ctx.focus {
            return Ok(focus.clone());
        }
        if ctx.root_table.is_empty() {
            return Err(TranslatorError::invalid_with_context(
                node_context(node),
                "no focus in scope",
            ));
        }
        Ok(self.root_value(ctx))
    }

    /// Translate a subtree into one SQL expression over the relation in scope.
    pub(crate) fn inline(
        &self,
        node: &AstNode,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<SqlValue> {
        log::trace!("visit {} `{}`", node.kind_name(), node);
        let mut scope = ctx.enter_scope();
        scope.mode = TranslationMode::Inline;
        let ctx: &mut TranslationContext = &mut scope;
        match &node.kind {
            NodeKind::Literal(literal) => self.visit_literal(literal, node),
            NodeKind::Identifier { target, name } => {
                self.visit_identifier(target.as_deref(), name, node, ctx)
            }
            NodeKind::FunctionCall { target, name, args } => {
                self.visit_function(target.as_deref(), name, args, node, ctx)
            }
            NodeKind::BinaryOp { op, left, right } => {
                self.visit_binary(*op, left, right, node, ctx)
            }
            NodeKind::UnaryOp { op, operand } => self.visit_unary(*op, operand, ctx),
            NodeKind::TypeOp {
                op,
                operand,
                type_name,
            } => self.visit_type_op(*op, operand, type_name, node, ctx),
            NodeKind::Variable(variable) => self.visit_variable(variable, node, ctx),
            NodeKind::Index { target, index } => self.visit_index(target, index, ctx),
        }
    }

    fn visit_function(
        &self,
        target: Option<&AstNode>,
        name: &str,
        args: &[AstNode],
        node: &AstNode,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<SqlValue> {
        let spec = self.function_spec(name, args)?;
        let base = match target {
            Some(target) => self.inline(target, ctx)?,
            None => self.focus(ctx, node)?,
        };
        self.apply_function(spec, base, args, node, ctx)
    }

    /// Table entry for `name`, with the call's arity checked.
    pub(crate) fn function_spec(
        &self,
        name: &str,
        args: &[AstNode],
    ) -> TranslatorResult<&'static FunctionSpec> {
        let spec = function_registry::lookup(name)
            .ok_or_else(|| TranslatorError::unsupported(format!("function `{}()`", name)))?;
        spec.check_arity(args.len())?;
        Ok(spec)
    }

    pub(crate) fn apply_function(
        &self,
        spec: &FunctionSpec,
        base: SqlValue,
        args: &[AstNode],
        node: &AstNode,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<SqlValue> {
        log::trace!("function {}() over {}", spec.name, base.sql);
        let site = CallSite {
            name: spec.name,
            base,
            args,
            node,
        };
        (spec.handler)(self, ctx, &site)
    }

    /// Translate a lambda body once per item: `$this` is `item`, `$index`
    /// is the item's 0-based position.
    pub(crate) fn lambda(
        &self,
        body: &AstNode,
        item: SqlValue,
        index: &str,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<SqlValue> {
        let mut scope = ctx.enter_scope();
        scope.focus = Some(item);
        scope.bind("$index", SqlValue::scalar(index, ValueKind::Integer));
        self.inline(body, &mut scope)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ast::{BinaryOperator, TypeOperator, UnaryOperator, Variable};
    use crate::dialect::{create_dialect, DialectKind};
    use test_case::test_case;

    pub(crate) fn translator_for(kind: DialectKind) -> Translator {
        let registry = Arc::new(TypeRegistry::builtin().expect("builtin schema loads"));
        Translator::new(registry, create_dialect(kind), TranslatorOptions::default())
    }

    fn translate(kind: DialectKind, ast: &AstNode) -> Vec<SqlFragment> {
        let mut ctx = TranslationContext::new();
        translator_for(kind).translate(ast, &mut ctx).unwrap()
    }

    #[test]
    fn test_type_root_only_emits_root_fragment() {
        let fragments = translate(DialectKind::DuckDb, &AstNode::identifier("Patient"));
        assert_eq!(fragments.len(), 1);
        let root = &fragments[0];
        assert_eq!(root.cte_name(), Some("cte_1"));
        assert_eq!(
            root.expression,
            "SELECT r.id AS id, r.resource AS value FROM resources AS r \
             WHERE json_extract_string(r.resource, '$.resourceType') = 'Patient'"
        );
    }

    #[test]
    fn test_array_path_requires_unnest() {
        let fragments = translate(DialectKind::DuckDb, &AstNode::path(&["Patient", "name"]));
        assert_eq!(fragments.len(), 2);
        let name = &fragments[1];
        assert!(name.requires_unnest);
        assert_eq!(name.source_table, "cte_1");
        assert_eq!(name.dependencies, vec!["cte_1".to_string()]);
        assert_eq!(name.fhir_type(), Some("HumanName"));
        assert!(name.is_ordinal());
    }

    #[test]
    fn test_single_path_is_folded() {
        let fragments = translate(DialectKind::PostgreSql, &AstNode::path(&["Patient", "gender"]));
        assert_eq!(fragments.len(), 2);
        let gender = &fragments[1];
        assert!(!gender.requires_unnest);
        assert!(!gender.is_aggregate);
        assert_eq!(gender.expression, "jsonb_extract_path(cte_1.value, 'gender')");
        assert_eq!(gender.fhir_type(), Some("code"));
    }

    #[test]
    fn test_first_uses_index_extraction() {
        let ast = AstNode::path(&["Patient", "name"]).call("first", vec![]);
        let fragments = translate(DialectKind::DuckDb, &ast);
        let last = fragments.last().unwrap();
        assert!(last.expression.contains("'$[0]'"));
        assert!(!last.expression.to_uppercase().contains("LIMIT"));
    }

    #[test]
    fn test_where_reaggregates_by_id() {
        let predicate = AstNode::binary(
            BinaryOperator::Equal,
            AstNode::identifier("use"),
            AstNode::string("official"),
        );
        let ast = AstNode::path(&["Patient", "name"]).call("where", vec![predicate]);
        let fragments = translate(DialectKind::PostgreSql, &ast);
        let filter = fragments
            .iter()
            .find(|f| f.is_aggregate && f.expression.contains("'official'"))
            .expect("where fragment");
        assert!(filter.expression.contains("LEFT JOIN LATERAL"));
        assert!(filter.expression.contains("FILTER (WHERE"));
        assert!(filter.expression.contains("GROUP BY"));
    }

    #[test]
    fn test_translation_is_deterministic() {
        let ast = AstNode::path(&["Patient", "name", "given"]).call("count", vec![]);
        assert_eq!(
            translate(DialectKind::DuckDb, &ast),
            translate(DialectKind::DuckDb, &ast)
        );
    }

    #[test]
    fn test_context_is_restored_after_translation() {
        let translator = translator_for(DialectKind::DuckDb);
        let mut ctx = TranslationContext::new();
        let before = ctx.snapshot();
        let lambda = AstNode::binary(
            BinaryOperator::GreaterThan,
            AstNode::variable(Variable::Index),
            AstNode::integer(0),
        );
        let ast = AstNode::path(&["Patient", "name"]).call("where", vec![lambda]);
        translator.translate(&ast, &mut ctx).unwrap();
        assert_eq!(ctx.snapshot(), before);
        assert_eq!(ctx.scope_depth(), 0);
    }

    #[test]
    fn test_unknown_function_is_unsupported() {
        let translator = translator_for(DialectKind::DuckDb);
        let ast = AstNode::path(&["Patient", "name"]).call("frobnicate", vec![]);
        let err = translator
            .translate(&ast, &mut TranslationContext::new())
            .unwrap_err();
        assert!(matches!(err, TranslatorError::UnsupportedOperation { .. }));
    }

    #[test]
    fn test_arity_error_names_function() {
        let translator = translator_for(DialectKind::DuckDb);
        let ast = AstNode::path(&["Patient", "name"]).call("count", vec![AstNode::integer(1)]);
        let err = translator
            .translate(&ast, &mut TranslationContext::new())
            .unwrap_err();
        assert_eq!(err, TranslatorError::arity("count", 0, 0, 1));
    }

    #[test]
    fn test_unknown_type_is_translation_error() {
        let translator = translator_for(DialectKind::DuckDb);
        let ast = AstNode::type_op(
            TypeOperator::Is,
            AstNode::path(&["Patient", "gender"]),
            "NoSuchType",
        );
        let err = translator
            .translate(&ast, &mut TranslationContext::new())
            .unwrap_err();
        assert!(matches!(
            err,
            TranslatorError::Translation {
                source: TranslationCause::Registry(_),
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_element_in_strict_mode() {
        let registry = Arc::new(TypeRegistry::builtin().unwrap());
        let options = TranslatorOptions {
            strict_paths: true,
            ..Default::default()
        };
        let translator = Translator::new(registry, create_dialect(DialectKind::DuckDb), options);
        let ast = AstNode::path(&["Patient", "nickname"]);
        assert!(translator
            .translate(&ast, &mut TranslationContext::new())
            .is_err());
        let lenient = translator_for(DialectKind::DuckDb);
        assert!(lenient
            .translate(&ast, &mut TranslationContext::new())
            .is_ok());
    }

    fn given_at(index: AstNode) -> AstNode {
        AstNode::new(NodeKind::Index {
            target: Box::new(AstNode::path(&["Patient", "name", "given"])),
            index: Box::new(index),
        })
    }

    #[test_case(DialectKind::DuckDb ; "duckdb")]
    #[test_case(DialectKind::PostgreSql ; "postgresql")]
    fn test_negative_index_selects_nothing(kind: DialectKind) {
        let minus_one = AstNode::new(NodeKind::UnaryOp {
            op: UnaryOperator::Minus,
            operand: Box::new(AstNode::integer(1)),
        });
        let fragments = translate(kind, &given_at(minus_one));
        assert_eq!(fragments.last().unwrap().expression, "NULL");
    }

    #[test]
    fn test_literal_index_is_direct_element_access() {
        let fragments = translate(DialectKind::PostgreSql, &given_at(AstNode::integer(1)));
        let last = fragments.last().unwrap();
        assert!(last.expression.ends_with(" -> 1)"), "{}", last.expression);
        assert!(!last.expression.contains("CASE"));
    }

    #[test_case(DialectKind::DuckDb ; "duckdb")]
    #[test_case(DialectKind::PostgreSql ; "postgresql")]
    fn test_computed_index_is_bounds_checked(kind: DialectKind) {
        let position = AstNode::binary(
            BinaryOperator::Subtract,
            AstNode::integer(0),
            AstNode::integer(1),
        );
        let fragments = translate(kind, &given_at(position));
        let last = &fragments.last().unwrap().expression;
        assert!(last.starts_with("CASE WHEN "), "{}", last);
        assert!(last.contains(" >= 0 THEN "), "{}", last);
        assert!(last.ends_with(" END"), "{}", last);
    }
}
