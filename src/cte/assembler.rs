//! Dependency ordering and final statement assembly.
//!
//! CTEs are ordered with Kahn's algorithm. Among CTEs that are ready at the
//! same time the one given first wins, so translator output (already in
//! dependency order) is emitted unchanged.

use std::collections::{BTreeSet, HashMap};

use regex::Regex;

use super::errors::CteError;
use super::Cte;

lazy_static::lazy_static! {
    static ref IDENTIFIER: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid");
}

pub struct CteAssembler;

impl CteAssembler {
    /// `WITH n1 AS (q1), n2 AS (q2), ... SELECT * FROM <last>`
    pub fn assemble(ctes: Vec<Cte>) -> Result<String, CteError> {
        let ordered = Self::order(ctes)?;
        let last = ordered
            .last()
            .map(|cte| cte.name.clone())
            .ok_or_else(|| CteError::assembly("no CTEs to assemble"))?;
        let body = ordered
            .iter()
            .map(Cte::render)
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("WITH {} SELECT * FROM {}", body, last))
    }

    /// Topological order of `ctes`, dependencies first.
    pub fn order(ctes: Vec<Cte>) -> Result<Vec<Cte>, CteError> {
        if ctes.is_empty() {
            return Err(CteError::assembly("no CTEs to assemble"));
        }
        Self::validate(&ctes)?;

        let position: HashMap<&str, usize> = ctes
            .iter()
            .enumerate()
            .map(|(i, cte)| (cte.name.as_str(), i))
            .collect();
        let mut remaining: Vec<usize> = ctes.iter().map(|cte| cte.dependencies.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); ctes.len()];
        for (i, cte) in ctes.iter().enumerate() {
            for dep in &cte.dependencies {
                dependents[position[dep.as_str()]].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(i, _)| i)
            .collect();
        let mut sequence = Vec::with_capacity(ctes.len());
        while let Some(next) = ready.pop_first() {
            sequence.push(next);
            for &dependent in &dependents[next] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if sequence.len() != ctes.len() {
            let stuck: Vec<&str> = ctes
                .iter()
                .enumerate()
                .filter(|(i, _)| !sequence.contains(i))
                .map(|(_, cte)| cte.name.as_str())
                .collect();
            return Err(CteError::assembly(format!(
                "dependency cycle among {}",
                stuck.join(", ")
            )));
        }

        let mut slots: Vec<Option<Cte>> = ctes.into_iter().map(Some).collect();
        let ordered: Vec<Cte> = sequence
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();
        log::debug!(
            "CTE order: {}",
            ordered
                .iter()
                .map(|cte| cte.name.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        Ok(ordered)
    }

    fn validate(ctes: &[Cte]) -> Result<(), CteError> {
        let mut names = BTreeSet::new();
        for cte in ctes {
            if !IDENTIFIER.is_match(&cte.name) {
                return Err(CteError::assembly(format!(
                    "`{}` is not a valid CTE name",
                    cte.name
                )));
            }
            if !names.insert(cte.name.as_str()) {
                return Err(CteError::assembly(format!("duplicate CTE name `{}`", cte.name)));
            }
        }
        for cte in ctes {
            for dep in &cte.dependencies {
                if !names.contains(dep.as_str()) {
                    return Err(CteError::assembly(format!(
                        "`{}` depends on unknown CTE `{}`",
                        cte.name, dep
                    )));
                }
                if dep == &cte.name {
                    return Err(CteError::assembly(format!(
                        "dependency cycle among {}",
                        cte.name
                    )));
                }
            }
        }
        Ok(())
    }
}
