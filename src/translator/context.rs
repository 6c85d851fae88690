//! Translation context.
//!
//! [`TranslationContext`] is the mutable state threaded through a translation:
//!
//! - the relation (`current_table`) whose `id`/`value` columns are in scope
//! - the root relation holding the original records
//! - the focus item (`$this`) and bound variables (`$index`, `$total`)
//! - the navigation path walked so far
//!
//! # Scopes
//!
//! Any visit that changes the context does so through [`TranslationContext::enter_scope`].
//! The returned [`ScopeGuard`] restores the exact pre-visit state when dropped,
//! so sibling subtrees never observe each other's bindings:
//!
//! ```text
//! name.where(use = 'official').given
//!      └─ scope: $this = element of name ─┘
//! ```
//!
//! A context belongs to one translation at a time. The alias counter lives
//! outside the snapshot so names stay unique across sibling scopes.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use super::value::SqlValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranslationMode {
    /// Emitting relation-level fragments
    #[default]
    Relational,
    /// Building a single SQL expression inside a fragment
    Inline,
}

/// Restorable part of the context
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContextSnapshot {
    pub current_table: String,
    pub root_table: String,
    pub current_path: Vec<String>,
    pub focus: Option<SqlValue>,
    pub variables: BTreeMap<String, SqlValue>,
    pub mode: TranslationMode,
    pub per_record: bool,
    pub depth: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TranslationContext {
    pub current_table: String,
    pub root_table: String,
    pub current_path: Vec<String>,
    /// `$this`
    pub focus: Option<SqlValue>,
    pub variables: BTreeMap<String, SqlValue>,
    pub mode: TranslationMode,
    /// `current_table` has exactly one row per record
    pub per_record: bool,
    pub depth: usize,
    saved: Vec<ContextSnapshot>,
    alias_counter: usize,
}

impl TranslationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            current_table: self.current_table.clone(),
            root_table: self.root_table.clone(),
            current_path: self.current_path.clone(),
            focus: self.focus.clone(),
            variables: self.variables.clone(),
            mode: self.mode,
            per_record: self.per_record,
            depth: self.depth,
        }
    }

    fn restore(&mut self, snapshot: ContextSnapshot) {
        self.current_table = snapshot.current_table;
        self.root_table = snapshot.root_table;
        self.current_path = snapshot.current_path;
        self.focus = snapshot.focus;
        self.variables = snapshot.variables;
        self.mode = snapshot.mode;
        self.per_record = snapshot.per_record;
        self.depth = snapshot.depth;
    }

    /// Open a nested scope; the previous state comes back when the guard drops.
    pub fn enter_scope(&mut self) -> ScopeGuard<'_> {
        let snapshot = self.snapshot();
        self.saved.push(snapshot);
        self.depth += 1;
        ScopeGuard { ctx: self }
    }

    /// Number of open scopes
    pub fn scope_depth(&self) -> usize {
        self.saved.len()
    }

    pub fn variable(&self, name: &str) -> Option<&SqlValue> {
        self.variables.get(name)
    }

    pub fn bind(&mut self, name: &str, value: SqlValue) {
        self.variables.insert(name.to_string(), value);
    }

    pub fn push_path(&mut self, segment: &str) {
        self.current_path.push(segment.to_string());
    }

    pub fn path_string(&self) -> String {
        self.current_path.join(".")
    }

    /// Fresh alias `<prefix>_<n>`, unique within the translation.
    pub fn next_alias(&mut self, prefix: &str) -> String {
        self.alias_counter += 1;
        format!("{}_{}", prefix, self.alias_counter)
    }

    pub(crate) fn reset_counters(&mut self) {
        self.alias_counter = 0;
    }
}

/// Restores the enclosing scope on drop
pub struct ScopeGuard<'a> {
    ctx: &'a mut TranslationContext,
}

impl Deref for ScopeGuard<'_> {
    type Target = TranslationContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.ctx.saved.pop() {
            self.ctx.restore(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_restores_on_drop() {
        let mut ctx = TranslationContext::new();
        ctx.current_table = "cte_1".to_string();
        let before = ctx.snapshot();
        {
            let mut scope = ctx.enter_scope();
            scope.current_table = "cte_2".to_string();
            scope.focus = Some(SqlValue::json_item("elem_1.value"));
            scope.bind("$index", SqlValue::json_item("elem_1.idx"));
            scope.push_path("name");
            assert_eq!(scope.depth, 1);
        }
        assert_eq!(ctx.snapshot(), before);
        assert_eq!(ctx.scope_depth(), 0);
    }

    #[test]
    fn test_nested_scopes_unwind_in_order() {
        let mut ctx = TranslationContext::new();
        {
            let mut outer = ctx.enter_scope();
            outer.push_path("a");
            let outer_state = outer.snapshot();
            {
                let mut inner = outer.enter_scope();
                inner.push_path("b");
                assert_eq!(inner.path_string(), "a.b");
            }
            assert_eq!(outer.snapshot(), outer_state);
        }
        assert!(ctx.current_path.is_empty());
    }

    #[test]
    fn test_aliases_stay_unique_across_scopes() {
        let mut ctx = TranslationContext::new();
        let first = {
            let mut scope = ctx.enter_scope();
            scope.next_alias("elem")
        };
        let second = ctx.next_alias("elem");
        assert_ne!(first, second);
    }
}
