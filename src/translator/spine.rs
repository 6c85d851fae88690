//! The relational spine.
//!
//! The leftmost invocation chain of an expression is split into a *base* and
//! the *steps* applied to it:
//!
//! ```text
//! Patient.name.where(use = 'official').given.first()
//! └─base─┘ └step┘ └──────── step ────────┘ └step┘ └step┘
//! ```
//!
//! The spine walks the steps left to right, holding a *pending* expression
//! over the current relation. A new fragment starts when a step needs it:
//!
//! - **unnest**: a property step over a collection flattens it to one row
//!   per item. These relations carry an `ord` column, a sortable key of the
//!   item's position in every enclosing collection.
//! - **collect**: a function consuming the whole collection (`count()`,
//!   `where()`, `first()`, ...) over a per-item relation re-aggregates the
//!   items per record, in `ord` order. The root relation drives the join,
//!   so records without items keep their row.
//! - **filter/project**: `where()` and `select()` unnest, evaluate the lambda
//!   per item and re-aggregate grouped by `id`.
//!
//! Everything between boundaries (single-cardinality navigation, operators,
//! scalar functions) is folded into the pending expression. At the end a
//! pending collection is flattened and any remaining expression becomes a
//! plain projection fragment.

use super::context::TranslationContext;
use super::errors::{TranslatorError, TranslatorResult};
use super::fragment::{keys, Shape, SqlFragment, ValueKind, DEFAULT_ELEMENT_ALIAS};
use super::function_registry::FunctionSpec;
use super::value::SqlValue;
use super::Translator;
use crate::ast::{AstNode, NodeKind, TypeOperator};
use crate::dialect::quote_literal;

enum Step<'a> {
    Property {
        name: &'a str,
        node: &'a AstNode,
    },
    Function {
        name: &'a str,
        args: &'a [AstNode],
        node: &'a AstNode,
    },
    Index {
        index: &'a AstNode,
    },
    TypeOp {
        op: TypeOperator,
        type_name: &'a str,
        node: &'a AstNode,
    },
}

/// Split `a.b.where(x)[0]` into its base `a` and the steps applied to it.
fn decompose(ast: &AstNode) -> (&AstNode, Vec<Step<'_>>) {
    let mut steps = Vec::new();
    let mut node = ast;
    loop {
        match &node.kind {
            NodeKind::Identifier {
                target: Some(target),
                name,
            } => {
                steps.push(Step::Property { name, node });
                node = target.as_ref();
            }
            NodeKind::FunctionCall {
                target: Some(target),
                name,
                args,
            } => {
                steps.push(Step::Function { name, args, node });
                node = target.as_ref();
            }
            NodeKind::Index { target, index } => {
                steps.push(Step::Index { index });
                node = target.as_ref();
            }
            NodeKind::TypeOp {
                op,
                operand,
                type_name,
            } => {
                steps.push(Step::TypeOp {
                    op: *op,
                    type_name,
                    node,
                });
                node = operand.as_ref();
            }
            _ => break,
        }
    }
    steps.reverse();
    (node, steps)
}

/// Translate `ast` as a pipeline of fragments.
pub(super) fn translate_spine(
    translator: &Translator,
    ast: &AstNode,
    ctx: &mut TranslationContext,
) -> TranslatorResult<Vec<SqlFragment>> {
    let (base, mut steps) = decompose(ast);

    let default_type = match translator.options().resource_type.as_deref() {
        Some(name) => Some(
            translator
                .registry()
                .canonicalize(name)
                .map_err(|e| TranslatorError::registry_with_context("resource type", e))?,
        ),
        None => None,
    };
    let default_root = SqlValue::json_item("").with_type(default_type.clone());

    let mut inline_base = None;
    let root_type = match &base.kind {
        NodeKind::Identifier { target: None, name }
            if translator.names_type_root(&default_root, name, base) =>
        {
            Some(translator.registry().canonicalize(name).map_err(|e| {
                TranslatorError::registry_with_context(super::node_context(base), e)
            })?)
        }
        NodeKind::Identifier { target: None, name } => {
            steps.insert(0, Step::Property { name, node: base });
            default_type
        }
        NodeKind::FunctionCall {
            target: None,
            name,
            args,
        } => {
            steps.insert(
                0,
                Step::Function {
                    name,
                    args,
                    node: base,
                },
            );
            default_type
        }
        _ => {
            inline_base = Some(base);
            default_type
        }
    };

    let mut spine = Spine::start(translator, root_type, ctx);
    if let Some(base) = inline_base {
        spine.pending = translator.inline(base, ctx)?;
    }
    for step in steps {
        spine.apply(step, ctx)?;
    }
    spine.finish(ctx)
}

struct Spine<'t> {
    translator: &'t Translator,
    fragments: Vec<SqlFragment>,
    root: String,
    /// Relation the pending expression reads
    relation: String,
    /// `relation` has one row per record; otherwise one row per item, with `ord`
    per_record: bool,
    pending: SqlValue,
}

impl<'t> Spine<'t> {
    /// Emit the root relation: one row per record, filtered to `root_type`.
    fn start(
        translator: &'t Translator,
        root_type: Option<String>,
        ctx: &mut TranslationContext,
    ) -> Self {
        let options = translator.options();
        let name = "cte_1".to_string();
        let record = format!("r.{}", options.resource_column);
        let mut sql = format!(
            "SELECT r.{} AS id, {} AS value FROM {} AS r",
            options.id_column, record, options.resource_table
        );
        if let Some(ty) = &root_type {
            sql.push_str(&format!(
                " WHERE {} = {}",
                translator.dialect().json_extract_text(&record, "resourceType"),
                quote_literal(ty)
            ));
        }
        let mut fragment = SqlFragment::new(sql, options.resource_table.clone())
            .with_cte_name(&name)
            .with_value_kind(ValueKind::Json)
            .with_shape(Shape::Item)
            .with_fhir_type(root_type.as_deref());
        if let Some(ty) = &root_type {
            fragment = fragment.with_metadata(keys::PATH, ty.clone());
            ctx.push_path(ty);
        }
        log::debug!("{}: root relation over {}", name, options.resource_table);

        let root = SqlValue::json_item(format!("{}.value", name)).with_type(root_type);
        ctx.root_table = name.clone();
        ctx.current_table = name.clone();
        ctx.per_record = true;
        ctx.focus = Some(root.clone());
        ctx.bind("%resource", root.clone());

        Spine {
            translator,
            fragments: vec![fragment],
            root: name.clone(),
            relation: name,
            per_record: true,
            pending: root,
        }
    }

    fn apply(&mut self, step: Step<'_>, ctx: &mut TranslationContext) -> TranslatorResult<()> {
        let t = self.translator;
        match step {
            Step::Property { name, node } => {
                if !self.pending.is_item() {
                    self.materialize(ctx)?;
                }
                let value = t.navigate(&self.pending, name, node, ctx)?;
                ctx.push_path(name);
                self.pending = value;
                if !self.pending.is_item() {
                    self.materialize(ctx)?;
                }
            }
            Step::Function { name, args, node } => {
                let spec = t.function_spec(name, args)?;
                if spec.whole_collection && !self.per_record {
                    self.collect(ctx)?;
                }
                match spec.name {
                    "where" | "select" => self.filter_or_project(spec, &args[0], ctx)?,
                    _ => {
                        let base = self.pending.clone();
                        self.pending = t.apply_function(spec, base, args, node, ctx)?;
                    }
                }
            }
            Step::Index { index } => {
                if !self.per_record {
                    self.collect(ctx)?;
                }
                let position = t.inline(index, ctx)?;
                self.pending = t.index_into(&self.pending, &position);
            }
            Step::TypeOp {
                op,
                type_name,
                node,
            } => {
                let value = self.pending.clone();
                self.pending = t.apply_type_op(op, value, type_name, node, ctx)?;
            }
        }
        Ok(())
    }

    fn next_name(&self) -> String {
        format!("cte_{}", self.fragments.len() + 1)
    }

    /// Append a fragment reading the current relation and make it current.
    fn emit(
        &mut self,
        name: &str,
        fragment: SqlFragment,
        per_record: bool,
        ctx: &mut TranslationContext,
    ) {
        let mut fragment = fragment
            .with_cte_name(name)
            .with_dependency(self.relation.clone());
        if self.relation != self.root
            && fragment.expression.contains(&format!("{}.", self.root))
        {
            fragment = fragment.with_dependency(self.root.clone());
        }
        log::debug!(
            "{}: {} over {} -> {}",
            name,
            if fragment.requires_unnest {
                "unnest"
            } else if fragment.is_aggregate {
                "aggregate"
            } else {
                "projection"
            },
            fragment.source_table,
            fragment.expression
        );
        self.fragments.push(fragment);
        self.relation = name.to_string();
        self.per_record = per_record;
        ctx.current_table = self.relation.clone();
        ctx.per_record = per_record;
        ctx.focus = Some(self.translator.root_value(ctx));
    }

    /// Flatten the pending collection: one row per item.
    fn materialize(&mut self, ctx: &mut TranslationContext) -> TranslatorResult<()> {
        let t = self.translator;
        let expression = match (self.pending.kind, self.pending.shape) {
            (ValueKind::Json, Shape::Collection) if self.pending.literal.is_none() => {
                self.pending.sql.clone()
            }
            _ => t.as_collection(&self.pending),
        };
        let fhir_type = self.pending.fhir_type.clone();
        let path = ctx.path_string();
        let structural = t.registry().is_structural_element(&path)
            || fhir_type
                .as_deref()
                .is_some_and(|ty| t.registry().is_structural_element(ty));

        let mut fragment = SqlFragment::new(expression, self.relation.clone())
            .with_unnest()
            .with_metadata(keys::ELEMENT_ALIAS, DEFAULT_ELEMENT_ALIAS)
            .with_metadata(keys::ID_COLUMN, format!("{}.id", self.relation))
            .with_metadata(keys::ORDINAL, "true")
            .with_value_kind(ValueKind::Json)
            .with_shape(Shape::Item)
            .with_fhir_type(fhir_type.as_deref())
            .with_metadata(keys::PATH, path);
        if !self.per_record {
            fragment =
                fragment.with_metadata(keys::ORDER_COLUMN, format!("{}.ord", self.relation));
        }
        if structural {
            fragment = fragment.with_metadata(keys::STRUCTURAL, "true");
        }

        let name = self.next_name();
        self.emit(&name, fragment, false, ctx);
        self.pending = SqlValue::json_item(format!("{}.value", name)).with_type(fhir_type);
        Ok(())
    }

    /// Re-aggregate a per-item relation into one collection per record.
    fn collect(&mut self, ctx: &mut TranslationContext) -> TranslatorResult<()> {
        let t = self.translator;
        let src = self.relation.clone();
        let root = self.root.clone();
        let (item, joins, order) = if self.pending.is_item() {
            (t.to_json(&self.pending), String::new(), format!("{}.ord", src))
        } else {
            let alias = ctx.next_alias("item");
            (
                format!("{}.value", alias),
                format!(
                    " LEFT JOIN LATERAL {} ON TRUE",
                    t.elements_from(&self.pending, &alias)
                ),
                format!("{}.ord, {}.idx", src, alias),
            )
        };
        let aggregate = t.json_agg_or_empty(
            &item,
            Some(&order),
            Some(&format!("{} IS NOT NULL", item)),
        );
        let sql = format!(
            "SELECT {root}.id AS id, {agg} AS value FROM {root} LEFT JOIN {src} ON {src}.id = {root}.id{joins} GROUP BY {root}.id",
            root = root,
            agg = aggregate,
            src = src,
            joins = joins
        );
        let fhir_type = self.pending.fhir_type.clone();
        let fragment = SqlFragment::new(sql, src)
            .with_aggregate()
            .with_value_kind(ValueKind::Json)
            .with_shape(Shape::Collection)
            .with_fhir_type(fhir_type.as_deref())
            .with_metadata(keys::PATH, ctx.path_string());

        let name = self.next_name();
        self.emit(&name, fragment, true, ctx);
        self.pending = SqlValue::json_collection(format!("{}.value", name)).with_type(fhir_type);
        Ok(())
    }

    /// `where()` / `select()`: unnest, evaluate the lambda per item and
    /// re-aggregate grouped by record.
    fn filter_or_project(
        &mut self,
        spec: &FunctionSpec,
        lambda: &AstNode,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<()> {
        let t = self.translator;
        let src = self.relation.clone();
        let alias = ctx.next_alias("elem");
        let element = t.element_of(&self.pending, &alias);
        let index = format!("{}.idx", alias);
        let body = t.lambda(lambda, element, &index, ctx)?;
        let unnest = format!(
            "LEFT JOIN LATERAL {} ON TRUE",
            t.elements_from(&self.pending, &alias)
        );

        let (value, joins, order, filter, fhir_type) = if spec.name == "where" {
            (
                format!("{}.value", alias),
                unnest,
                index.clone(),
                format!("{} IS NOT NULL AND {}", index, t.as_boolean(&body)),
                self.pending.fhir_type.clone(),
            )
        } else {
            let item = ctx.next_alias("item");
            (
                format!("{}.value", item),
                format!(
                    "{} LEFT JOIN LATERAL {} ON TRUE",
                    unnest,
                    t.elements_from(&body, &item)
                ),
                format!("{}, {}.idx", index, item),
                format!("{}.value IS NOT NULL", item),
                body.fhir_type.clone(),
            )
        };
        let aggregate = t.json_agg_or_empty(&value, Some(&order), Some(&filter));
        let sql = format!(
            "SELECT {src}.id AS id, {agg} AS value FROM {src} {joins} GROUP BY {src}.id",
            src = src,
            agg = aggregate,
            joins = joins
        );
        let fragment = SqlFragment::new(sql, src)
            .with_aggregate()
            .with_value_kind(ValueKind::Json)
            .with_shape(Shape::Collection)
            .with_fhir_type(fhir_type.as_deref())
            .with_metadata(keys::PATH, ctx.path_string());

        let name = self.next_name();
        self.emit(&name, fragment, true, ctx);
        self.pending = SqlValue::json_collection(format!("{}.value", name)).with_type(fhir_type);
        Ok(())
    }

    fn finish(mut self, ctx: &mut TranslationContext) -> TranslatorResult<Vec<SqlFragment>> {
        if !self.pending.is_item() {
            self.materialize(ctx)?;
        }
        let current = format!("{}.value", self.relation);
        if self.pending.sql == current && self.pending.choice.is_none() {
            return Ok(self.fragments);
        }

        let pending = self.pending.clone();
        let mut fragment = SqlFragment::new(pending.sql.clone(), self.relation.clone())
            .with_value_kind(pending.kind)
            .with_shape(Shape::Item)
            .with_fhir_type(pending.type_name())
            .with_metadata(keys::PATH, ctx.path_string());
        if !self.per_record {
            fragment =
                fragment.with_metadata(keys::ORDER_COLUMN, format!("{}.ord", self.relation));
        }
        if let Some(choice) = &pending.choice {
            fragment = fragment
                .with_metadata(keys::CHOICE_BASE, choice.base.clone())
                .with_metadata(keys::CHOICE_TYPES, choice.types.join(","));
        }
        let name = self.next_name();
        let per_record = self.per_record;
        self.emit(&name, fragment, per_record, ctx);
        Ok(self.fragments)
    }
}
