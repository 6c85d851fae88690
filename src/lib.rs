//! fhirpath-sql - FHIRPath expressions as SQL over JSON resource tables
//!
//! This crate translates a parsed FHIRPath expression into one SQL statement:
//! - Schema-aware AST adaptation (types, cardinality, choice elements)
//! - Translation into an ordered pipeline of CTE fragments
//! - DuckDB and PostgreSQL dialects
//! - CTE construction and dependency-ordered assembly

pub mod ast;
pub mod config;
pub mod cte;
pub mod dialect;
pub mod query_generator;
pub mod translator;
pub mod type_registry;

pub use config::TranslatorConfig;
pub use query_generator::{QueryGenerator, QueryGeneratorError};
