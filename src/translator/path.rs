//! Property navigation.
//!
//! Navigation reads the declared element from the type registry to decide the
//! result's shape:
//!
//! | base       | element cardinality | SQL                                   |
//! |------------|---------------------|---------------------------------------|
//! | item       | single              | field extraction                      |
//! | item       | array               | field extraction, collection-shaped   |
//! | collection | any                 | ordered flatten subquery              |
//!
//! Choice elements (`value[x]`) coalesce their concrete fields and remember
//! the parent so a later type operator can pick the `value<Type>` field.

use super::context::TranslationContext;
use super::errors::{TranslatorError, TranslatorResult};
use super::fragment::{Shape, ValueKind};
use super::value::{ChoiceInfo, SqlValue};
use super::{node_context, Translator};
use crate::ast::AstNode;
use crate::dialect::{literal_index, quote_literal};
use crate::type_registry::{choice_field_name, Cardinality, ElementInfo, TypeRegistryError};

impl Translator {
    pub(crate) fn visit_identifier(
        &self,
        target: Option<&AstNode>,
        name: &str,
        node: &AstNode,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<SqlValue> {
        match target {
            Some(target) => {
                let base = self.inline(target, ctx)?;
                self.navigate(&base, name, node, ctx)
            }
            None => {
                let focus = self.focus(ctx, node)?;
                if self.names_type_root(&focus, name, node) {
                    self.type_root(focus, name, node)
                } else {
                    self.navigate(&focus, name, node, ctx)
                }
            }
        }
    }

    /// A leading identifier that names a type rather than an element of the focus.
    pub(crate) fn names_type_root(&self, focus: &SqlValue, name: &str, node: &AstNode) -> bool {
        if node.metadata.type_root {
            return true;
        }
        if !self.registry().is_resource(name) {
            return false;
        }
        match focus.type_name() {
            Some(ty) => self.registry().element(ty, name).is_err(),
            None => true,
        }
    }

    /// `Patient` at the start of a path: the focus when it is a Patient,
    /// otherwise empty.
    fn type_root(&self, focus: SqlValue, name: &str, node: &AstNode) -> TranslatorResult<SqlValue> {
        let canonical = self
            .registry()
            .canonicalize(name)
            .map_err(|e| TranslatorError::registry_with_context(node_context(node), e))?;
        if let Some(declared) = focus.type_name() {
            let matches = self
                .registry()
                .is_same_or_subtype_of(declared, &canonical)
                .map_err(|e| TranslatorError::registry_with_context(node_context(node), e))?;
            return Ok(if matches {
                focus
            } else {
                SqlValue::null()
            });
        }
        let d = self.dialect();
        let test = format!(
            "{} = {}",
            d.json_extract_text(&focus.sql, "resourceType"),
            quote_literal(&canonical)
        );
        Ok(SqlValue::json_item(d.case_when(&[(test, focus.sql.clone())], None))
            .with_type(Some(canonical)))
    }

    /// Declared element for `name` on the base type, if the schema knows it.
    fn lookup_element(
        &self,
        base: &SqlValue,
        name: &str,
        node: &AstNode,
    ) -> TranslatorResult<Option<ElementInfo>> {
        let Some(base_type) = base.type_name() else {
            return Ok(None);
        };
        match self.registry().element(base_type, name) {
            Ok(info) => Ok(Some(info)),
            Err(err @ TypeRegistryError::UnknownElement { .. }) => {
                if self.options().strict_paths {
                    Err(TranslatorError::registry_with_context(node_context(node), err))
                } else {
                    log::warn!("{}; navigating without type information", err);
                    Ok(None)
                }
            }
            Err(_) => Ok(None),
        }
    }

    /// `base.name`
    pub(crate) fn navigate(
        &self,
        base: &SqlValue,
        name: &str,
        node: &AstNode,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<SqlValue> {
        if base.is_null_literal() || base.kind != ValueKind::Json {
            // primitives carry no child elements in SQL form
            return Ok(SqlValue::null());
        }
        let element = self.lookup_element(base, name, node)?;
        log::trace!(
            "navigate {}.{} ({:?})",
            base.type_name().unwrap_or("?"),
            name,
            element.as_ref().map(|e| e.cardinality)
        );

        if let Some(info) = element.as_ref().filter(|info| info.is_choice) {
            return Ok(self.navigate_choice(base, info, ctx));
        }

        let child_type = element
            .as_ref()
            .and_then(|info| info.single_type())
            .map(str::to_string);
        let child_shape = match element.as_ref().map(|info| info.cardinality) {
            Some(Cardinality::Single) => Shape::Item,
            Some(Cardinality::Array) => Shape::Collection,
            None => Shape::Unknown,
        };
        let d = self.dialect();

        if base.is_item() {
            let sql = d.json_extract(&base.sql, name);
            return Ok(SqlValue::new(sql, ValueKind::Json, child_shape).with_type(child_type));
        }

        let outer = ctx.next_alias("elem");
        let from = self.elements_from(base, &outer);
        let child = d.json_extract(&format!("{}.value", outer), name);
        let sql = match child_shape {
            Shape::Item => {
                let agg = self.json_agg_or_empty(
                    &child,
                    Some(&format!("{}.idx", outer)),
                    Some(&format!("{} IS NOT NULL", child)),
                );
                format!("(SELECT {} FROM {})", agg, from)
            }
            _ => {
                let inner = ctx.next_alias("elem");
                let nested = SqlValue::new(child, ValueKind::Json, child_shape);
                let agg = self.json_agg_or_empty(
                    &format!("{}.value", inner),
                    Some(&format!("{}.idx, {}.idx", outer, inner)),
                    None,
                );
                format!(
                    "(SELECT {} FROM {}, LATERAL {})",
                    agg,
                    from,
                    self.elements_from(&nested, &inner)
                )
            }
        };
        Ok(SqlValue::json_collection(sql).with_type(child_type))
    }

    /// `Observation.value`: the first present concrete field.
    fn navigate_choice(
        &self,
        base: &SqlValue,
        info: &ElementInfo,
        ctx: &mut TranslationContext,
    ) -> SqlValue {
        let d = self.dialect();
        let fields = |object: &str| -> Vec<String> {
            info.type_codes
                .iter()
                .map(|code| d.json_extract(object, &choice_field_name(&info.name, code)))
                .collect()
        };
        let choice = ChoiceInfo {
            parent: base.clone(),
            base: info.name.clone(),
            types: info.type_codes.clone(),
        };
        if base.is_item() {
            let sql = d.coalesce(&fields(&base.sql));
            return SqlValue::json_item(sql).with_choice(choice);
        }
        let alias = ctx.next_alias("elem");
        let value = d.coalesce(&fields(&format!("{}.value", alias)));
        let agg = self.json_agg_or_empty(
            &value,
            Some(&format!("{}.idx", alias)),
            Some(&format!("{} IS NOT NULL", value)),
        );
        let sql = format!("(SELECT {} FROM {})", agg, self.elements_from(base, &alias));
        SqlValue::json_collection(sql).with_choice(choice)
    }

    /// The concrete `value<Type>` field of a choice element.
    pub(crate) fn choice_field(
        &self,
        choice: &ChoiceInfo,
        type_name: &str,
        node: &AstNode,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<SqlValue> {
        let Some(code) = choice
            .types
            .iter()
            .find(|code| code.as_str() == type_name)
        else {
            return Ok(SqlValue::null());
        };
        let field = choice_field_name(&choice.base, code);
        let mut value = self.navigate(&choice.parent, &field, node, ctx)?;
        value.fhir_type = Some(code.clone());
        Ok(value)
    }

    /// `target[index]`
    pub(crate) fn visit_index(
        &self,
        target: &AstNode,
        index: &AstNode,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<SqlValue> {
        let base = self.inline(target, ctx)?;
        let position = self.inline(index, ctx)?;
        Ok(self.index_into(&base, &position))
    }

    /// Negative or out-of-range positions select nothing.
    pub(crate) fn index_into(&self, base: &SqlValue, position: &SqlValue) -> SqlValue {
        let index = self.as_integer(position);
        let d = self.dialect();
        let element = d.json_array_element(&self.as_collection(base), &index);
        let sql = match literal_index(&index) {
            Some(i) if i < 0 => return SqlValue::null(),
            Some(_) => element,
            None => d.case_when(&[(format!("{} >= 0", index), element)], None),
        };
        SqlValue::json_item(sql).with_type(base.fhir_type.clone())
    }
}
