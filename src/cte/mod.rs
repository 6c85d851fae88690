//! Named sub-queries and their assembly into one statement.
//!
//! The [`CteBuilder`] turns each translated fragment into a [`Cte`]: a
//! complete `SELECT` exposing `id` and `value` (plus `ord` for flattened
//! relations). The [`CteAssembler`] orders CTEs so every one follows the
//! CTEs it reads and emits the final `WITH ... SELECT * FROM <last>`.

pub mod assembler;
pub mod builder;
pub mod errors;

use serde::{Deserialize, Serialize};

pub use assembler::CteAssembler;
pub use builder::CteBuilder;
pub use errors::CteError;

/// One named, executable sub-query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cte {
    pub name: String,
    pub query: String,
    /// Names of the CTEs the query reads
    pub dependencies: Vec<String>,
}

impl Cte {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// `name AS (query)`
    pub fn render(&self) -> String {
        format!("{} AS ({})", self.name, self.query)
    }
}
