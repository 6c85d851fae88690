//! Fragment → CTE conversion.
//!
//! | fragment                      | CTE query                                                  |
//! |-------------------------------|------------------------------------------------------------|
//! | complete `SELECT`/`WITH`      | unchanged                                                  |
//! | `requires_unnest` + ordinal   | `SELECT id, elem.value, <ord> FROM src, LATERAL <unnest>`  |
//! | `requires_unnest`             | `SELECT id, elem.value FROM src, LATERAL <unnest>`         |
//! | `is_aggregate` expression     | `SELECT id, <expr> FROM src GROUP BY id`                   |
//! | plain expression              | `SELECT id, <expr> [, ord] FROM src`                       |

use std::sync::Arc;

use super::errors::{CteError, UNNAMED};
use super::Cte;
use crate::dialect::Dialect;
use crate::translator::{keys, SqlFragment};

#[derive(Debug, Clone)]
pub struct CteBuilder {
    dialect: Arc<dyn Dialect>,
}

impl CteBuilder {
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self { dialect }
    }

    /// Wrap a fragment that flattens or aggregates over `source_table`.
    pub fn wrap(&self, fragment: &SqlFragment, source_table: &str) -> Result<Cte, CteError> {
        let Some(name) = fragment.cte_name() else {
            return Err(CteError::invalid_fragment_with_context(
                UNNAMED,
                "fragment has no CTE name",
            ));
        };
        if !fragment.requires_unnest && !fragment.is_aggregate {
            return Err(CteError::invalid_fragment_with_context(
                name,
                "only unnest or aggregate fragments can be wrapped",
            ));
        }
        if source_table.trim().is_empty() {
            return Err(CteError::invalid_fragment_with_context(name, "empty source table"));
        }
        let query = if fragment.is_complete_select() {
            fragment.expression.clone()
        } else if fragment.requires_unnest {
            self.unnest_query(fragment, source_table)
        } else {
            let id = self.id_column(fragment, source_table);
            format!(
                "SELECT {id} AS id, {expr} AS {value} FROM {src} GROUP BY {id}",
                id = id,
                expr = fragment.expression,
                value = fragment.result_column(),
                src = source_table
            )
        };
        Ok(Cte::new(name, query).with_dependencies(fragment.dependencies.clone()))
    }

    fn id_column(&self, fragment: &SqlFragment, source_table: &str) -> String {
        fragment
            .get(keys::ID_COLUMN)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.id", source_table))
    }

    fn unnest_query(&self, fragment: &SqlFragment, source_table: &str) -> String {
        let d = self.dialect.as_ref();
        let alias = fragment.element_alias();
        let id = self.id_column(fragment, source_table);
        if fragment.is_ordinal() {
            let ord = d.ordinal_key(fragment.get(keys::ORDER_COLUMN), &format!("{}.idx", alias));
            format!(
                "SELECT {id} AS id, {alias}.value AS {value}, {ord} AS ord FROM {src}, LATERAL {unnest}",
                id = id,
                alias = alias,
                value = fragment.result_column(),
                ord = ord,
                src = source_table,
                unnest = d.unnest_with_ordinality(&fragment.expression, alias)
            )
        } else {
            format!(
                "SELECT {id} AS id, {alias}.value AS {value} FROM {src}, {unnest}",
                id = id,
                alias = alias,
                value = fragment.result_column(),
                src = source_table,
                unnest = d.lateral_unnest(&fragment.expression, alias)
            )
        }
    }

    /// Convert any named fragment, projecting plain expressions over their source.
    pub fn build(&self, fragment: &SqlFragment) -> Result<Cte, CteError> {
        let Some(name) = fragment.cte_name() else {
            return Err(CteError::invalid_fragment_with_context(
                UNNAMED,
                "fragment has no CTE name",
            ));
        };
        if fragment.requires_unnest || fragment.is_aggregate {
            return self.wrap(fragment, &fragment.source_table);
        }
        if fragment.is_complete_select() {
            return Ok(Cte::new(name, fragment.expression.clone())
                .with_dependencies(fragment.dependencies.clone()));
        }
        if fragment.source_table.trim().is_empty() {
            return Err(CteError::invalid_fragment_with_context(name, "empty source table"));
        }
        let order = fragment
            .get(keys::ORDER_COLUMN)
            .map(|column| format!(", {} AS ord", column))
            .unwrap_or_default();
        let query = format!(
            "SELECT {id} AS id, {expr} AS {value}{order} FROM {src}",
            id = self.id_column(fragment, &fragment.source_table),
            expr = fragment.expression,
            value = fragment.result_column(),
            order = order,
            src = fragment.source_table
        );
        Ok(Cte::new(name, query).with_dependencies(fragment.dependencies.clone()))
    }

    /// Convert a fragment list; unnamed fragments are named `cte_<position>`.
    pub fn build_all(&self, fragments: &[SqlFragment]) -> Result<Vec<Cte>, CteError> {
        fragments
            .iter()
            .enumerate()
            .map(|(i, fragment)| match fragment.cte_name() {
                Some(_) => self.build(fragment),
                None => self.build(&fragment.clone().with_cte_name(&format!("cte_{}", i + 1))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{create_dialect, DialectKind};

    fn builder(kind: DialectKind) -> CteBuilder {
        CteBuilder::new(create_dialect(kind))
    }

    #[test]
    fn test_complete_select_passes_through() {
        let fragment = SqlFragment::new("SELECT 1 AS id, 2 AS value", "cte_1")
            .with_aggregate()
            .with_cte_name("cte_2")
            .with_dependency("cte_1");
        let cte = builder(DialectKind::DuckDb).build(&fragment).unwrap();
        assert_eq!(cte.query, "SELECT 1 AS id, 2 AS value");
        assert_eq!(cte.dependencies, vec!["cte_1".to_string()]);
    }

    #[test]
    fn test_ordinal_unnest_exposes_ord() {
        let fragment = SqlFragment::new("jsonb_extract_path(cte_1.value, 'name')", "cte_1")
            .with_unnest()
            .with_metadata(keys::ORDINAL, "true")
            .with_cte_name("cte_2");
        let cte = builder(DialectKind::PostgreSql).build(&fragment).unwrap();
        assert_eq!(
            cte.query,
            "SELECT cte_1.id AS id, elem.value AS value, lpad(CAST(elem.idx AS TEXT), 6, '0') AS ord \
             FROM cte_1, LATERAL (SELECT elem_o.value, elem_o.ord - 1 AS idx \
             FROM jsonb_array_elements(jsonb_extract_path(cte_1.value, 'name')) WITH ORDINALITY AS elem_o(value, ord)) AS elem"
        );
    }

    #[test]
    fn test_plain_unnest_without_ordinal() {
        let fragment = SqlFragment::new("x.items", "x")
            .with_unnest()
            .with_cte_name("cte_2");
        let cte = builder(DialectKind::PostgreSql).build(&fragment).unwrap();
        assert_eq!(
            cte.query,
            "SELECT x.id AS id, elem.value AS value FROM x, LATERAL jsonb_array_elements(x.items) AS elem(value)"
        );
    }

    #[test]
    fn test_plain_fragment_is_projected_with_ord() {
        let fragment = SqlFragment::new("upper(cte_2.value)", "cte_2")
            .with_metadata(keys::ORDER_COLUMN, "cte_2.ord")
            .with_cte_name("cte_3");
        let cte = builder(DialectKind::DuckDb).build(&fragment).unwrap();
        assert_eq!(
            cte.query,
            "SELECT cte_2.id AS id, upper(cte_2.value) AS value, cte_2.ord AS ord FROM cte_2"
        );
    }

    #[test]
    fn test_wrap_rejects_plain_and_sourceless_fragments() {
        let b = builder(DialectKind::DuckDb);
        let plain = SqlFragment::new("x", "t").with_cte_name("c");
        assert!(matches!(
            b.wrap(&plain, "t"),
            Err(CteError::InvalidFragment { .. })
        ));
        let unnest = SqlFragment::new("x", "").with_unnest().with_cte_name("c");
        assert_eq!(
            b.wrap(&unnest, "").unwrap_err(),
            CteError::invalid_fragment_with_context("c", "empty source table")
        );
    }

    #[test]
    fn test_wrap_rejects_unnamed_fragment() {
        let unnamed = SqlFragment::new("x.items", "x").with_unnest();
        assert_eq!(
            builder(DialectKind::PostgreSql).wrap(&unnamed, "x").unwrap_err(),
            CteError::invalid_fragment_with_context(UNNAMED, "fragment has no CTE name")
        );
    }

    #[test]
    fn test_build_all_names_unnamed_fragments() {
        let fragments = vec![
            SqlFragment::new("SELECT 1 AS id, 1 AS value", "resources"),
            SqlFragment::new("cte_1.value", "cte_1").with_dependency("cte_1"),
        ];
        let ctes = builder(DialectKind::DuckDb).build_all(&fragments).unwrap();
        assert_eq!(ctes[0].name, "cte_1");
        assert_eq!(ctes[1].name, "cte_2");
    }
}
