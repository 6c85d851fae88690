//! Integration tests - Tests that run the whole pipeline
//!
//! These tests go from a parser AST to one SQL statement through the public
//! API, for both dialects. No database is needed.

mod custom_schema_tests;
mod pipeline_tests;
