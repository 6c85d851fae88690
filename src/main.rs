use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use fhirpath_sql::config::TranslatorConfig;
use fhirpath_sql::dialect::DialectKind;
use fhirpath_sql::QueryGenerator;
use validator::Validate;

/// fhirpath-sql - translate a parsed FHIRPath expression into SQL
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Parser AST as JSON (`-` reads standard input)
    #[arg(long)]
    ast: String,

    /// Target SQL dialect (duckdb, postgresql)
    #[arg(long)]
    dialect: Option<DialectKind>,

    /// Schema-definition YAML replacing the bundled FHIR R4 schema
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Table holding one row per resource
    #[arg(long)]
    resource_table: Option<String>,

    /// Context type for expressions that do not start with a resource type
    #[arg(long)]
    resource_type: Option<String>,

    /// Reject elements the schema does not declare
    #[arg(long)]
    strict: bool,

    /// Translation settings file (YAML); environment variables apply otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print fragments, CTEs and SQL as JSON instead of the SQL alone
    #[arg(long)]
    explain: bool,
}

impl Cli {
    /// Settings from the config file or environment, overridden by flags.
    fn translator_config(&self) -> anyhow::Result<TranslatorConfig> {
        let mut config = match &self.config {
            Some(path) => TranslatorConfig::from_yaml_file(path)?,
            None => TranslatorConfig::from_env()?,
        };
        if let Some(dialect) = self.dialect {
            config.dialect = dialect;
        }
        if let Some(schema) = &self.schema {
            config.schema_path = Some(schema.clone());
        }
        if let Some(table) = &self.resource_table {
            config.resource_table = table.clone();
        }
        if let Some(resource_type) = &self.resource_type {
            config.resource_type = Some(resource_type.clone());
        }
        config.strict_paths |= self.strict;
        config.validate()?;
        Ok(config)
    }

    fn read_ast(&self) -> anyhow::Result<String> {
        if self.ast == "-" {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("reading AST from standard input")?;
            return Ok(input);
        }
        std::fs::read_to_string(&self.ast).with_context(|| format!("reading AST from {}", self.ast))
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logger - defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.translator_config()?;
    log::debug!("Translator configuration: {:?}", config);

    let generator = QueryGenerator::from_config(&config)?;
    let ast = cli.read_ast()?;

    if cli.explain {
        let explanation = generator.explain(&ast)?;
        println!("{}", serde_json::to_string_pretty(&explanation)?);
    } else {
        println!("{}", generator.generate(&ast)?);
    }
    Ok(())
}
