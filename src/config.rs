use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::ast::adapter::DEFAULT_MAX_DEPTH;
use crate::dialect::DialectKind;
use crate::translator::TranslatorOptions;

lazy_static::lazy_static! {
    static ref COLUMN_NAME: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("column pattern is valid");
    static ref TABLE_NAME: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
            .expect("table pattern is valid");
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn validate_table_name(value: &str) -> Result<(), ValidationError> {
    if TABLE_NAME.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("table_name"))
    }
}

fn validate_column_name(value: &str) -> Result<(), ValidationError> {
    if COLUMN_NAME.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("column_name"))
    }
}

/// Translation settings with validation
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Target SQL engine
    pub dialect: DialectKind,

    /// Table holding one row per record, optionally schema-qualified
    #[validate(custom(function = "validate_table_name"))]
    pub resource_table: String,

    #[validate(custom(function = "validate_column_name"))]
    pub id_column: String,

    /// JSON column holding the record
    #[validate(custom(function = "validate_column_name"))]
    pub resource_column: String,

    /// Context type for expressions that do not start with a resource type
    #[validate(custom(function = "validate_column_name"))]
    pub resource_type: Option<String>,

    /// Schema-definition document replacing the bundled FHIR R4 schema
    pub schema_path: Option<PathBuf>,

    /// Reject elements the schema does not declare
    pub strict_paths: bool,

    /// Maximum nesting depth of an expression
    #[validate(range(
        min = 1,
        max = 1000,
        message = "Max expression depth must be between 1 and 1000"
    ))]
    pub max_expression_depth: usize,

    /// Recursion bound of `repeat()`
    #[validate(range(
        min = 1,
        max = 100,
        message = "Max repeat depth must be between 1 and 100"
    ))]
    pub max_repeat_depth: usize,

    /// Values of `%name` constants
    pub constants: BTreeMap<String, serde_json::Value>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        let options = TranslatorOptions::default();
        Self {
            dialect: DialectKind::default(),
            resource_table: options.resource_table,
            id_column: options.id_column,
            resource_column: options.resource_column,
            resource_type: None,
            schema_path: None,
            strict_paths: false,
            max_expression_depth: DEFAULT_MAX_DEPTH,
            max_repeat_depth: options.max_repeat_depth,
            constants: BTreeMap::new(),
        }
    }
}

impl TranslatorConfig {
    /// Create configuration from `FHIRPATH_SQL_*` environment variables
    /// (and a `.env` file when present) with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            dialect: parse_env_var("FHIRPATH_SQL_DIALECT", defaults.dialect.as_str())?,
            resource_table: env::var("FHIRPATH_SQL_RESOURCE_TABLE")
                .unwrap_or(defaults.resource_table),
            id_column: env::var("FHIRPATH_SQL_ID_COLUMN").unwrap_or(defaults.id_column),
            resource_column: env::var("FHIRPATH_SQL_RESOURCE_COLUMN")
                .unwrap_or(defaults.resource_column),
            resource_type: env::var("FHIRPATH_SQL_RESOURCE_TYPE")
                .ok()
                .filter(|value| !value.is_empty()),
            schema_path: env::var("FHIRPATH_SQL_SCHEMA")
                .ok()
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
            strict_paths: parse_env_var("FHIRPATH_SQL_STRICT", "false")?,
            max_expression_depth: parse_env_var(
                "FHIRPATH_SQL_MAX_EXPRESSION_DEPTH",
                &defaults.max_expression_depth.to_string(),
            )?,
            max_repeat_depth: parse_env_var(
                "FHIRPATH_SQL_MAX_REPEAT_DEPTH",
                &defaults.max_repeat_depth.to_string(),
            )?,
            constants: BTreeMap::new(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn translator_options(&self) -> TranslatorOptions {
        TranslatorOptions {
            resource_table: self.resource_table.clone(),
            id_column: self.id_column.clone(),
            resource_column: self.resource_column.clone(),
            resource_type: self.resource_type.clone(),
            strict_paths: self.strict_paths,
            max_repeat_depth: self.max_repeat_depth,
            constants: self.constants.clone(),
        }
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use test_case::test_case;

    const ENV_KEYS: &[&str] = &[
        "FHIRPATH_SQL_DIALECT",
        "FHIRPATH_SQL_RESOURCE_TABLE",
        "FHIRPATH_SQL_ID_COLUMN",
        "FHIRPATH_SQL_RESOURCE_COLUMN",
        "FHIRPATH_SQL_RESOURCE_TYPE",
        "FHIRPATH_SQL_SCHEMA",
        "FHIRPATH_SQL_STRICT",
        "FHIRPATH_SQL_MAX_EXPRESSION_DEPTH",
        "FHIRPATH_SQL_MAX_REPEAT_DEPTH",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            // SAFETY: environment tests are serialized
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    fn test_default_config() {
        let config = TranslatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dialect, DialectKind::DuckDb);
        assert_eq!(config.resource_table, "resources");
        assert_eq!(config.translator_options(), TranslatorOptions::default());
    }

    #[test_case("resources", true ; "plain table")]
    #[test_case("fhir.resources", true ; "qualified table")]
    #[test_case("resources; DROP TABLE x", false ; "injection")]
    #[test_case("", false ; "empty")]
    fn test_resource_table_validation(table: &str, valid: bool) {
        let config = TranslatorConfig {
            resource_table: table.to_string(),
            ..Default::default()
        };
        assert_eq!(config.validate().is_ok(), valid);
    }

    #[test]
    fn test_qualified_column_is_rejected() {
        let config = TranslatorConfig {
            resource_column: "t.resource".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test_case(0 ; "zero")]
    #[test_case(101 ; "above limit")]
    fn test_invalid_repeat_depth(depth: usize) {
        let config = TranslatorConfig {
            max_repeat_depth: depth,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_expression_depth() {
        let config = TranslatorConfig {
            max_expression_depth: 1001,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        unsafe {
            env::set_var("FHIRPATH_SQL_DIALECT", "postgres");
            env::set_var("FHIRPATH_SQL_RESOURCE_TYPE", "Patient");
            env::set_var("FHIRPATH_SQL_STRICT", "true");
        }
        let config = TranslatorConfig::from_env().unwrap();
        clear_env();
        assert_eq!(config.dialect, DialectKind::PostgreSql);
        assert_eq!(config.resource_type.as_deref(), Some("Patient"));
        assert!(config.strict_paths);
        assert_eq!(config.max_repeat_depth, 10);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_values() {
        clear_env();
        unsafe { env::set_var("FHIRPATH_SQL_MAX_REPEAT_DEPTH", "many") };
        let result = TranslatorConfig::from_env();
        clear_env();
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "dialect: postgresql\nresource_table: fhir.resources\nmax_repeat_depth: 5"
        )
        .unwrap();
        let config = TranslatorConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.dialect, DialectKind::PostgreSql);
        assert_eq!(config.resource_table, "fhir.resources");
        assert_eq!(config.max_repeat_depth, 5);
        assert_eq!(config.id_column, "id");
    }

    #[test]
    fn test_from_yaml_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_expression_depth: 0").unwrap();
        assert!(matches!(
            TranslatorConfig::from_yaml_file(file.path()),
            Err(ConfigError::Validation(_))
        ));
    }
}
