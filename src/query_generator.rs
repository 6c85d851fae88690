//! End-to-end pipeline: raw parser AST → adapted AST → fragments → CTEs →
//! one `WITH … SELECT` statement.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::ast::{AdapterError, AstAdapter, AstNode, RawNode};
use crate::config::TranslatorConfig;
use crate::cte::{Cte, CteAssembler, CteBuilder, CteError};
use crate::dialect::{create_dialect, DialectKind};
use crate::translator::{SqlFragment, TranslationContext, Translator, TranslatorError};
use crate::type_registry::{TypeRegistry, TypeRegistryError};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryGeneratorError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Registry(#[from] TypeRegistryError),
    #[error(transparent)]
    Translator(#[from] TranslatorError),
    #[error(transparent)]
    Cte(#[from] CteError),
    #[error("Expression produced no fragments")]
    EmptyTranslation,
}

/// Everything produced for one expression, for `--explain`.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub dialect: DialectKind,
    pub expression: String,
    pub fragments: Vec<SqlFragment>,
    pub ctes: Vec<Cte>,
    pub sql: String,
}

#[derive(Debug, Clone)]
pub struct QueryGenerator {
    kind: DialectKind,
    adapter: AstAdapter,
    translator: Translator,
    builder: CteBuilder,
}

impl QueryGenerator {
    pub fn new(registry: Arc<TypeRegistry>, config: &TranslatorConfig) -> Self {
        let dialect = create_dialect(config.dialect);
        let adapter = AstAdapter::new(registry.clone())
            .with_context_type(config.resource_type.clone())
            .with_max_depth(config.max_expression_depth);
        Self {
            kind: config.dialect,
            adapter,
            translator: Translator::new(registry, dialect.clone(), config.translator_options()),
            builder: CteBuilder::new(dialect),
        }
    }

    /// Load the schema named by the configuration (or the bundled one).
    pub fn from_config(config: &TranslatorConfig) -> Result<Self, QueryGeneratorError> {
        let registry = match &config.schema_path {
            Some(path) => TypeRegistry::from_yaml_file(path)?,
            None => TypeRegistry::builtin()?,
        };
        Ok(Self::new(Arc::new(registry), config))
    }

    pub fn dialect(&self) -> DialectKind {
        self.kind
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    /// SQL for a parser AST serialized as JSON.
    pub fn generate(&self, raw_json: &str) -> Result<String, QueryGeneratorError> {
        let ast = self.adapter.adapt_json(raw_json)?;
        self.generate_ast(&ast)
    }

    pub fn generate_raw(&self, raw: &RawNode) -> Result<String, QueryGeneratorError> {
        let ast = self.adapter.adapt(raw)?;
        self.generate_ast(&ast)
    }

    pub fn generate_ast(&self, ast: &AstNode) -> Result<String, QueryGeneratorError> {
        let ctes = self.ctes(&self.fragments(ast)?)?;
        Ok(CteAssembler::assemble(ctes)?)
    }

    /// Fragments in dependency order; the last holds the result.
    pub fn fragments(&self, ast: &AstNode) -> Result<Vec<SqlFragment>, QueryGeneratorError> {
        let mut ctx = TranslationContext::new();
        let fragments = self.translator.translate(ast, &mut ctx)?;
        if fragments.is_empty() {
            return Err(QueryGeneratorError::EmptyTranslation);
        }
        Ok(fragments)
    }

    fn ctes(&self, fragments: &[SqlFragment]) -> Result<Vec<Cte>, QueryGeneratorError> {
        let ctes = self.builder.build_all(fragments)?;
        log::debug!("Built {} CTE(s) for {}", ctes.len(), self.kind);
        Ok(ctes)
    }

    /// Every intermediate artifact of [`generate`](Self::generate).
    pub fn explain(&self, raw_json: &str) -> Result<Explanation, QueryGeneratorError> {
        let ast = self.adapter.adapt_json(raw_json)?;
        let fragments = self.fragments(&ast)?;
        let ctes = self.ctes(&fragments)?;
        let sql = CteAssembler::assemble(ctes.clone())?;
        Ok(Explanation {
            dialect: self.kind,
            expression: ast.to_string(),
            fragments,
            ctes,
            sql,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(dialect: DialectKind) -> QueryGenerator {
        QueryGenerator::from_config(&TranslatorConfig {
            dialect,
            ..Default::default()
        })
        .unwrap()
    }

    fn patient_name() -> RawNode {
        RawNode::entire(RawNode::path(&["Patient", "name"]))
    }

    #[test]
    fn test_generate_is_single_statement() {
        let sql = generator(DialectKind::DuckDb)
            .generate_raw(&patient_name())
            .unwrap();
        assert!(sql.starts_with("WITH cte_1 AS ("));
        assert!(sql.contains("cte_2 AS ("));
        assert!(sql.ends_with("SELECT * FROM cte_2"));
    }

    #[test]
    fn test_generate_from_json_matches_raw() {
        let generator = generator(DialectKind::PostgreSql);
        let json = serde_json::to_string(&patient_name()).unwrap();
        assert_eq!(
            generator.generate(&json).unwrap(),
            generator.generate_raw(&patient_name()).unwrap()
        );
    }

    #[test]
    fn test_invalid_json_is_adapter_error() {
        let err = generator(DialectKind::DuckDb).generate("{not json").unwrap_err();
        assert!(matches!(err, QueryGeneratorError::Adapter(_)));
    }

    #[test]
    fn test_explain_lists_every_stage() {
        let json = serde_json::to_string(&patient_name()).unwrap();
        let explanation = generator(DialectKind::DuckDb).explain(&json).unwrap();
        assert_eq!(explanation.expression, "Patient.name");
        assert_eq!(explanation.fragments.len(), explanation.ctes.len());
        assert!(explanation.sql.ends_with(&format!(
            "SELECT * FROM {}",
            explanation.ctes.last().unwrap().name
        )));
    }

    #[test]
    fn test_missing_schema_file_is_registry_error() {
        let result = QueryGenerator::from_config(&TranslatorConfig {
            schema_path: Some("/nonexistent/schema.yaml".into()),
            ..Default::default()
        });
        assert!(matches!(result, Err(QueryGeneratorError::Registry(_))));
    }
}
