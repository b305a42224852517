//! Per-row, per-column visibility.
//!
//! Evaluation order for one column of one row:
//!
//! 1. Baseline: visible unless the schema masks columns, hidden otherwise.
//! 2. Group rule: the schema's own `edit`/`view` entry, skipped when the
//!    row's instance override replaces inherited rules.
//! 3. Hierarchy rule: the first tree rule (declared order) whose tree backs
//!    one of the schema's security fields and whose pattern covers the row's
//!    path for that field.
//! 4. Instance override: applied last and final.
//!
//! Helper columns (row id, `unit_*` paths) are not evaluated here; callers
//! strip them from output.

use std::borrow::Cow;

use serde_json::{Map, Value};

use crate::constants::{ID_COLUMN, unit_column};
use crate::profile::{InstanceOverride, InstanceSecurity, SchemaSecurity, TreeRule};
use crate::tree_path;

/// Row values as returned by the scoped query.
pub type Row = Map<String, Value>;

/// Reads the row identifier as a string, whatever its JSON type.
#[must_use]
pub fn row_id(row: &Row) -> Option<Cow<'_, str>> {
    match row.get(ID_COLUMN)? {
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        _ => None,
    }
}

/// Column visibility for one schema of one user. Stateless and cheap to
/// create per call.
#[derive(Clone, Copy, Debug)]
pub struct ColumnResolver<'a> {
    schema: &'a SchemaSecurity,
    instances: Option<&'a InstanceSecurity>,
}

impl<'a> ColumnResolver<'a> {
    #[must_use]
    pub fn new(schema: &'a SchemaSecurity, instances: Option<&'a InstanceSecurity>) -> Self {
        Self { schema, instances }
    }

    #[must_use]
    pub fn schema(&self) -> &'a SchemaSecurity {
        self.schema
    }

    /// Resolves the row-level inputs once so every column of the row can
    /// reuse them.
    #[must_use]
    pub fn for_row(&self, row: &Row) -> RowVisibility<'a> {
        if !self.schema.masks_columns() {
            return RowVisibility {
                schema: self.schema,
                instance: None,
                tree_rule: None,
            };
        }

        let instance = row_id(row).and_then(|id| self.instances.and_then(|i| i.get(&id)));
        RowVisibility {
            schema: self.schema,
            instance,
            tree_rule: self.first_matching_tree_rule(row),
        }
    }

    /// Visibility of `field` in `row`.
    #[must_use]
    pub fn is_visible(&self, row: &Row, field: &str) -> bool {
        self.for_row(row).is_visible(field)
    }

    fn first_matching_tree_rule(&self, row: &Row) -> Option<&'a TreeRule> {
        self.schema
            .trees
            .iter()
            .find(|rule| self.tree_rule_covers(rule, row))
    }

    fn tree_rule_covers(&self, rule: &TreeRule, row: &Row) -> bool {
        self.schema
            .security_fields
            .iter()
            .filter(|(_, tree)| **tree == rule.tree)
            .any(|(field, tree)| {
                let Some(user_path) = self.schema.user_path(tree) else {
                    tracing::debug!(tree = %tree, "no recorded user path for tree");
                    return false;
                };
                let unit = unit_column(field);
                let Some(row_path) = row.get(&unit).and_then(Value::as_str) else {
                    tracing::debug!(column = %unit, "row has no hierarchy path");
                    return false;
                };
                tree_path::matches(&rule.tree_unit, row_path, user_path)
            })
    }
}

/// Row-level decision inputs produced by [`ColumnResolver::for_row`].
#[derive(Clone, Copy, Debug)]
pub struct RowVisibility<'a> {
    schema: &'a SchemaSecurity,
    instance: Option<&'a InstanceOverride>,
    tree_rule: Option<&'a TreeRule>,
}

impl<'a> RowVisibility<'a> {
    #[must_use]
    pub fn instance(&self) -> Option<&'a InstanceOverride> {
        self.instance
    }

    #[must_use]
    pub fn tree_rule(&self) -> Option<&'a TreeRule> {
        self.tree_rule
    }

    #[must_use]
    pub fn is_visible(&self, field: &str) -> bool {
        if !self.schema.masks_columns() {
            return true;
        }

        let mut visible = false;

        let replaces = self
            .instance
            .is_some_and(InstanceOverride::replaces_inherited);
        if !replaces && let Some(rule) = self.schema.rules.rule_for(field) {
            visible = rule;
        }

        if let Some(tree_rule) = self.tree_rule {
            if !tree_rule.permission.is_custom() {
                visible = true;
            }
            if let Some(rule) = tree_rule.rules.rule_for(field) {
                visible = rule;
            }
        }

        if let Some(instance) = self.instance {
            if instance.replaces_inherited() {
                visible = false;
            }
            if !instance.permission.is_custom() {
                visible = true;
            }
            if let Some(rule) = instance.rules.rule_for(field) {
                visible = rule;
            }
        }

        visible
    }
}
