//! Configuration for scoped tenant-table queries.

use std::time::Duration;

use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::secure::ident::ensure_identifier;
use crate::SecureQueryError;

/// Names of the shared platform tables the engine reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreTables {
    pub schemas: String,
    pub schema_fields: String,
    pub trees: String,
    pub tree_units: String,
    pub users: String,
}

impl Default for CoreTables {
    fn default() -> Self {
        Self {
            schemas: "core_schemas".to_owned(),
            schema_fields: "core_schema_fields".to_owned(),
            trees: "core_trees".to_owned(),
            tree_units: "core_tree_units".to_owned(),
            users: "core_users".to_owned(),
        }
    }
}

/// Engine configuration.
///
/// ```yaml
/// secure_query:
///   instances_table_prefix: "cst_"
///   document_column: "data"
///   tables:
///     trees: "core_trees"
///   fields_cache_ttl: "10m"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecureQueryConfig {
    /// Tenant tables are named `<prefix><schema_code>`.
    pub instances_table_prefix: String,
    /// JSON document column holding the dynamic fields of a tenant table.
    pub document_column: String,
    pub tables: CoreTables,
    /// Freshness bound for cached field lists. `None` keeps entries until
    /// they are invalidated.
    #[serde(with = "humantime_serde")]
    pub fields_cache_ttl: Option<Duration>,
}

impl Default for SecureQueryConfig {
    fn default() -> Self {
        Self {
            instances_table_prefix: "cst_".to_owned(),
            document_column: "data".to_owned(),
            tables: CoreTables::default(),
            fields_cache_ttl: None,
        }
    }
}

impl SecureQueryConfig {
    /// Extracts the configuration stored under `key`, or the defaults when the
    /// key is absent.
    ///
    /// # Errors
    /// Returns the figment error when the section exists but does not match
    /// the expected shape.
    pub fn from_figment(figment: &Figment, key: &str) -> Result<Self, figment::Error> {
        if figment.contains(key) {
            figment.extract_inner(key)
        } else {
            Ok(Self::default())
        }
    }

    /// Physical table backing `schema_code`.
    ///
    /// # Errors
    /// Returns [`SecureQueryError::InvalidIdentifier`] when the schema code is
    /// not a plain identifier.
    pub fn instances_table(&self, schema_code: &str) -> Result<String, SecureQueryError> {
        ensure_identifier(schema_code)?;
        Ok(format!("{}{schema_code}", self.instances_table_prefix))
    }

    /// Checks that every configured name is a plain identifier.
    ///
    /// # Errors
    /// Returns [`SecureQueryError::InvalidIdentifier`] for the first offending
    /// name.
    pub fn validate(&self) -> Result<(), SecureQueryError> {
        if !self.instances_table_prefix.is_empty() {
            ensure_identifier(&self.instances_table_prefix)?;
        }
        for name in [
            &self.document_column,
            &self.tables.schemas,
            &self.tables.schema_fields,
            &self.tables.trees,
            &self.tables.tree_units,
            &self.tables.users,
        ] {
            ensure_identifier(name)?;
        }
        Ok(())
    }
}
