//! Type operators: `is`, `as` and `ofType()`.
//!
//! Where the schema declares the operand's type the test is decided at
//! translation time. Untyped JSON is tested at run time: primitives by
//! their JSON type, resources by `resourceType`. Choice elements pick the
//! concrete `value<Type>` field instead of testing anything.

use crate::ast::{AstNode, TypeOperator};
use crate::dialect::quote_literal;
use crate::translator::context::TranslationContext;
use crate::translator::errors::{TranslatorError, TranslatorResult};
use crate::translator::function_registry::CallSite;
use crate::translator::node_context;
use crate::translator::value::{ChoiceInfo, SqlValue};
use crate::translator::Translator;
use crate::type_registry::CanonicalName;

/// Outcome of testing one item against a type.
#[derive(Debug, Clone, PartialEq)]
enum TypeTest {
    Always,
    Never,
    /// SQL predicate over the item
    Runtime(String),
}

impl Translator {
    pub(crate) fn visit_type_op(
        &self,
        op: TypeOperator,
        operand: &AstNode,
        type_name: &str,
        node: &AstNode,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<SqlValue> {
        let value = self.inline(operand, ctx)?;
        self.apply_type_op(op, value, type_name, node, ctx)
    }

    pub(crate) fn apply_type_op(
        &self,
        op: TypeOperator,
        value: SqlValue,
        type_name: &str,
        node: &AstNode,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<SqlValue> {
        let target = self.resolve_type(type_name, node)?;
        match op {
            TypeOperator::Is => self.type_is(&value, &target, node, ctx),
            TypeOperator::As => self.type_as(&value, &target, node, ctx),
        }
    }

    /// Canonical name of a type specifier; profiles resolve to their base type.
    fn resolve_type(&self, type_name: &str, node: &AstNode) -> TranslatorResult<CanonicalName> {
        match self.registry().canonicalize(type_name) {
            Ok(name) => Ok(name),
            Err(err) => self
                .registry()
                .get_profile_base_type(type_name)
                .ok_or_else(|| TranslatorError::registry_with_context(node_context(node), err)),
        }
    }

    fn is_same_or_subtype(&self, child: &str, parent: &str, node: &AstNode) -> TranslatorResult<bool> {
        self.registry()
            .is_same_or_subtype_of(child, parent)
            .map_err(|e| TranslatorError::registry_with_context(node_context(node), e))
    }

    /// The choice type a target selects, if any.
    fn choice_code(
        &self,
        choice: &ChoiceInfo,
        target: &str,
        node: &AstNode,
    ) -> TranslatorResult<Option<String>> {
        for code in &choice.types {
            if self.is_same_or_subtype(code, target, node)? {
                return Ok(Some(code.clone()));
            }
        }
        Ok(None)
    }

    fn type_test(&self, item: &SqlValue, target: &str, node: &AstNode) -> TranslatorResult<TypeTest> {
        let declared = match item.type_name() {
            Some(declared) => Some(declared.to_string()),
            None if !item.is_json() => item.kind.fhir_type().map(str::to_string),
            None => None,
        };
        let registry = self.registry();
        if let Some(declared) = declared {
            if self.is_same_or_subtype(&declared, target, node)? {
                return Ok(TypeTest::Always);
            }
            let narrower_resource = registry.is_resource(target)
                && registry.is_subtype_of(target, &declared).unwrap_or(false);
            if narrower_resource && item.is_json() {
                return Ok(TypeTest::Runtime(self.resource_type_test(&item.sql, target)));
            }
            return Ok(TypeTest::Never);
        }
        if registry.is_resource(target) {
            return Ok(TypeTest::Runtime(self.resource_type_test(&item.sql, target)));
        }
        match registry.primitive_json_kind(target) {
            Some(kind) => Ok(TypeTest::Runtime(
                self.dialect().json_type_test(&item.sql, kind),
            )),
            None => Err(TranslatorError::unsupported(format!(
                "type test against `{}` on an untyped value",
                target
            ))),
        }
    }

    fn resource_type_test(&self, item: &str, target: &str) -> String {
        format!(
            "{} = {}",
            self.dialect().json_extract_text(item, "resourceType"),
            quote_literal(target)
        )
    }

    fn type_is(
        &self,
        value: &SqlValue,
        target: &str,
        node: &AstNode,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<SqlValue> {
        if value.is_null_literal() {
            return Ok(SqlValue::null());
        }
        let item = self.single(value);
        let result = match &value.choice {
            Some(choice) => match self.choice_code(choice, target, node)? {
                Some(code) => {
                    let field = self.choice_field(choice, &code, node, ctx)?;
                    format!("({} IS NOT NULL)", self.single(&field).sql)
                }
                None => "FALSE".to_string(),
            },
            None => match self.type_test(&item, target, node)? {
                TypeTest::Always => "TRUE".to_string(),
                TypeTest::Never => "FALSE".to_string(),
                TypeTest::Runtime(predicate) => predicate,
            },
        };
        let sql = self.dialect().case_when(
            &[(format!("{} IS NULL", item.sql), "NULL".to_string())],
            Some(&result),
        );
        Ok(SqlValue::boolean(sql))
    }

    /// `as`: the value when it is of the type, otherwise empty. Collections
    /// are filtered item by item.
    fn type_as(
        &self,
        value: &SqlValue,
        target: &str,
        node: &AstNode,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<SqlValue> {
        if value.is_null_literal() {
            return Ok(SqlValue::null());
        }
        if let Some(choice) = &value.choice {
            return match self.choice_code(choice, target, node)? {
                Some(code) => self.choice_field(choice, &code, node, ctx),
                None => Ok(SqlValue::null()),
            };
        }
        if value.is_item() {
            return Ok(match self.type_test(value, target, node)? {
                TypeTest::Always => value.clone(),
                TypeTest::Never => SqlValue::null(),
                TypeTest::Runtime(predicate) => {
                    let sql = self
                        .dialect()
                        .case_when(&[(predicate, value.sql.clone())], None);
                    SqlValue::json_item(sql).with_type(Some(target.to_string()))
                }
            });
        }

        let alias = ctx.next_alias("elem");
        let element = self.element_of(value, &alias);
        match self.type_test(&element, target, node)? {
            TypeTest::Always => Ok(value.clone()),
            TypeTest::Never => Ok(SqlValue::null()),
            TypeTest::Runtime(predicate) => {
                let aggregate = self.json_agg_or_empty(
                    &element.sql,
                    Some(&format!("{}.idx", alias)),
                    Some(&predicate),
                );
                let sql = format!(
                    "(SELECT {} FROM {})",
                    aggregate,
                    self.elements_from(value, &alias)
                );
                Ok(SqlValue::json_collection(sql).with_type(Some(target.to_string())))
            }
        }
    }
}

pub(crate) fn is(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let type_name = t.type_argument(site, 0)?;
    t.apply_type_op(TypeOperator::Is, site.base.clone(), &type_name, site.node, ctx)
}

pub(crate) fn as_type(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let type_name = t.type_argument(site, 0)?;
    t.apply_type_op(TypeOperator::As, site.base.clone(), &type_name, site.node, ctx)
}

/// `ofType(T)`: the items of type `T`, in order.
pub(crate) fn of_type(
    t: &Translator,
    ctx: &mut TranslationContext,
    site: &CallSite<'_>,
) -> TranslatorResult<SqlValue> {
    let type_name = t.type_argument(site, 0)?;
    t.apply_type_op(TypeOperator::As, site.base.clone(), &type_name, site.node, ctx)
}

#[cfg(test)]
mod tests {
    use crate::ast::{AstNode, TypeOperator, Variable};
    use crate::dialect::DialectKind;
    use crate::translator::tests::translator_for;
    use crate::translator::{SqlFragment, TranslationContext, TranslatorError};

    fn translate(kind: DialectKind, ast: &AstNode) -> Vec<SqlFragment> {
        translator_for(kind)
            .translate(ast, &mut TranslationContext::new())
            .unwrap()
    }

    #[test]
    fn test_of_type_selects_choice_field() {
        let ast = AstNode::path(&["Observation", "value"])
            .call("ofType", vec![AstNode::identifier("Quantity")]);
        let out = translate(DialectKind::DuckDb, &ast);
        let last = out.last().unwrap();
        assert!(last.expression.contains("'$.valueQuantity'"));
        assert_eq!(last.fhir_type(), Some("Quantity"));
    }

    #[test]
    fn test_declared_type_is_static() {
        let ast = AstNode::type_op(
            TypeOperator::Is,
            AstNode::path(&["Patient", "gender"]),
            "code",
        );
        let out = translate(DialectKind::PostgreSql, &ast);
        assert!(out.last().unwrap().expression.ends_with("ELSE TRUE END"));
    }

    #[test]
    fn test_untyped_resource_test_is_runtime() {
        let t = translator_for(DialectKind::DuckDb);
        let mut ctx = TranslationContext::new();
        ctx.root_table = "cte_1".to_string();
        let ast = AstNode::type_op(TypeOperator::Is, AstNode::variable(Variable::This), "Patient");
        let value = t.inline(&ast, &mut ctx).unwrap();
        assert!(value
            .sql
            .contains("json_extract_string(cte_1.value, '$.resourceType') = 'Patient'"));
    }

    #[test]
    fn test_untyped_structural_test_is_unsupported() {
        let t = translator_for(DialectKind::DuckDb);
        let mut ctx = TranslationContext::new();
        ctx.root_table = "cte_1".to_string();
        let ast = AstNode::type_op(TypeOperator::Is, AstNode::variable(Variable::This), "HumanName");
        let err = t.inline(&ast, &mut ctx).unwrap_err();
        assert!(matches!(err, TranslatorError::UnsupportedOperation { .. }));
    }
}
