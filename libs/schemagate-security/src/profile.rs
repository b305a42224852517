//! Per-user security profile as persisted on the user record.
//!
//! The profile is stored as two JSON documents:
//!
//! ```json
//! {
//!   "security": {
//!     "schema": {
//!       "contract": {
//!         "permission_instance": "custom",
//!         "permission_structure": "custom",
//!         "query_data_columns": "amount,dept",
//!         "security_fields": { "dept": "org-tree" },
//!         "user_trees_security": { "org-tree": "42*" },
//!         "edit": { "amount": false },
//!         "view": { "amount": false },
//!         "trees": [
//!           { "tree": "org-tree", "tree_unit": "42", "permission": "view", "view": { "amount": true } }
//!         ]
//!       }
//!     }
//!   },
//!   "security_instances": {
//!     "schema": {
//!       "contract": {
//!         "instance": {
//!           "c-1": { "permission_scope": "replace", "permission": "default" }
//!         }
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Every key is optional and JSON `null` is read as the empty value.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::{ALL_FIELDS_MARKER, CUSTOM_MODE, ID_COLUMN, REPLACE_SCOPE, unit_column};

/// Reads JSON `null` the same way as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Whether a permission layer uses its defaults or only its explicit entries.
///
/// Only the literal `"custom"` selects [`PermissionMode::Custom`]; anything
/// else, including an empty string, is the default mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PermissionMode {
    #[default]
    Default,
    Custom,
}

impl PermissionMode {
    #[must_use]
    pub fn is_custom(self) -> bool {
        matches!(self, Self::Custom)
    }
}

impl From<String> for PermissionMode {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<&str> for PermissionMode {
    fn from(value: &str) -> Self {
        if value == CUSTOM_MODE {
            Self::Custom
        } else {
            Self::Default
        }
    }
}

impl From<PermissionMode> for String {
    fn from(mode: PermissionMode) -> Self {
        match mode {
            PermissionMode::Default => "default".to_owned(),
            PermissionMode::Custom => CUSTOM_MODE.to_owned(),
        }
    }
}

/// How an instance override combines with inherited group/hierarchy rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PermissionScope {
    /// Inherited visibility is kept and the override is layered on top.
    #[default]
    Default,
    /// Inherited visibility is discarded before the override applies.
    Replace,
}

impl From<String> for PermissionScope {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<&str> for PermissionScope {
    fn from(value: &str) -> Self {
        if value == REPLACE_SCOPE {
            Self::Replace
        } else {
            Self::Default
        }
    }
}

impl From<PermissionScope> for String {
    fn from(scope: PermissionScope) -> Self {
        match scope {
            PermissionScope::Default => "default".to_owned(),
            PermissionScope::Replace => REPLACE_SCOPE.to_owned(),
        }
    }
}

/// Explicit per-field `edit`/`view` entries of one permission layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldRules {
    #[serde(deserialize_with = "null_as_default")]
    pub edit: HashMap<String, bool>,
    #[serde(deserialize_with = "null_as_default")]
    pub view: HashMap<String, bool>,
}

impl FieldRules {
    /// Effective entry for `field`: `view` wins over `edit` when both are set.
    #[must_use]
    pub fn rule_for(&self, field: &str) -> Option<bool> {
        self.view
            .get(field)
            .or_else(|| self.edit.get(field))
            .copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edit.is_empty() && self.view.is_empty()
    }
}

/// Hierarchy-based rule. At most one applies per row: the first match in
/// declared order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeRule {
    #[serde(deserialize_with = "null_as_default")]
    pub tree: String,
    /// Unit pattern; a trailing `*` extends the rule to descendants.
    #[serde(deserialize_with = "null_as_default")]
    pub tree_unit: String,
    #[serde(deserialize_with = "null_as_default")]
    pub permission: PermissionMode,
    #[serde(flatten)]
    pub rules: FieldRules,
}

/// Output columns requested from a schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputColumns {
    /// Every active field of the schema, resolved through the field catalog.
    All,
    Fields(Vec<String>),
}

impl OutputColumns {
    /// Parses a comma separated column list. A leading `*` or an empty list
    /// selects every active field.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        let fields: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        match fields.first() {
            None => Self::All,
            Some(first) if first == ALL_FIELDS_MARKER => Self::All,
            Some(_) => Self::Fields(fields),
        }
    }

    #[must_use]
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fields(fields.into_iter().map(Into::into).collect())
    }
}

/// Security configuration of one schema for one user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaSecurity {
    /// Row scoping mode.
    #[serde(deserialize_with = "null_as_default")]
    pub permission_instance: PermissionMode,
    /// Column masking mode.
    #[serde(deserialize_with = "null_as_default")]
    pub permission_structure: PermissionMode,
    #[serde(deserialize_with = "null_as_default")]
    pub query_data_columns: String,
    /// Field code -> hierarchy code for fields that reference a hierarchy node.
    #[serde(deserialize_with = "null_as_default")]
    pub security_fields: BTreeMap<String, String>,
    /// Hierarchy code -> the user's recorded unit path pattern.
    #[serde(deserialize_with = "null_as_default")]
    pub user_trees_security: HashMap<String, String>,
    #[serde(flatten)]
    pub rules: FieldRules,
    #[serde(deserialize_with = "null_as_default")]
    pub trees: Vec<TreeRule>,
}

impl SchemaSecurity {
    #[must_use]
    pub fn scopes_rows(&self) -> bool {
        self.permission_instance.is_custom()
    }

    #[must_use]
    pub fn masks_columns(&self) -> bool {
        self.permission_structure.is_custom()
    }

    /// The user's recorded path pattern in `tree`, if any.
    #[must_use]
    pub fn user_path(&self, tree: &str) -> Option<&str> {
        self.user_trees_security.get(tree).map(String::as_str)
    }

    #[must_use]
    pub fn output_columns(&self) -> OutputColumns {
        OutputColumns::parse(&self.query_data_columns)
    }

    /// Columns added to a result only to evaluate rules: the row id and one
    /// `unit_<field>` path per security field.
    #[must_use]
    pub fn is_helper_column(&self, column: &str) -> bool {
        column == ID_COLUMN || self.security_fields.keys().any(|f| unit_column(f) == column)
    }
}

/// Per-row override of one user's visibility.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceOverride {
    #[serde(deserialize_with = "null_as_default")]
    pub permission_scope: PermissionScope,
    #[serde(deserialize_with = "null_as_default")]
    pub permission: PermissionMode,
    #[serde(flatten)]
    pub rules: FieldRules,
}

impl InstanceOverride {
    #[must_use]
    pub fn replaces_inherited(&self) -> bool {
        matches!(self.permission_scope, PermissionScope::Replace)
    }
}

/// Row id -> override, for one schema.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceSecurity {
    #[serde(deserialize_with = "null_as_default")]
    pub instance: BTreeMap<String, InstanceOverride>,
}

impl InstanceSecurity {
    #[must_use]
    pub fn get(&self, row_id: &str) -> Option<&InstanceOverride> {
        self.instance.get(row_id)
    }

    /// Row ids explicitly granted to the user, in sorted order.
    pub fn row_ids(&self) -> impl Iterator<Item = &str> {
        self.instance.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instance.is_empty()
    }
}

/// `{"schema": {<code>: T}}` wrapper used by both persisted documents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaTable<T> {
    #[serde(
        deserialize_with = "null_as_default",
        bound(deserialize = "T: Deserialize<'de>")
    )]
    pub schema: HashMap<String, T>,
}

impl<T> Default for SchemaTable<T> {
    fn default() -> Self {
        Self {
            schema: HashMap::new(),
        }
    }
}

/// Security profile of one user, loaded once per request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityProfile {
    #[serde(deserialize_with = "null_as_default")]
    pub security: SchemaTable<SchemaSecurity>,
    #[serde(deserialize_with = "null_as_default")]
    pub security_instances: SchemaTable<InstanceSecurity>,
}

impl SecurityProfile {
    /// Builds a profile from the two raw documents of a user record.
    ///
    /// # Errors
    /// Returns [`ProfileError::Malformed`] when a document does not have the
    /// expected shape.
    pub fn from_documents(
        security: serde_json::Value,
        security_instances: serde_json::Value,
    ) -> Result<Self, ProfileError> {
        let security = if security.is_null() {
            SchemaTable::default()
        } else {
            serde_json::from_value(security).map_err(|source| ProfileError::Malformed {
                document: "security",
                source,
            })?
        };
        let security_instances = if security_instances.is_null() {
            SchemaTable::default()
        } else {
            serde_json::from_value(security_instances).map_err(|source| {
                ProfileError::Malformed {
                    document: "security_instances",
                    source,
                }
            })?
        };

        Ok(Self {
            security,
            security_instances,
        })
    }

    #[must_use]
    pub fn schema(&self, schema_code: &str) -> Option<&SchemaSecurity> {
        self.security.schema.get(schema_code)
    }

    #[must_use]
    pub fn instances(&self, schema_code: &str) -> Option<&InstanceSecurity> {
        self.security_instances.schema.get(schema_code)
    }

    /// Adds or replaces the configuration of one schema.
    #[must_use]
    pub fn with_schema(mut self, schema_code: impl Into<String>, security: SchemaSecurity) -> Self {
        self.security.schema.insert(schema_code.into(), security);
        self
    }

    /// Adds or replaces the instance overrides of one schema.
    #[must_use]
    pub fn with_instances(
        mut self,
        schema_code: impl Into<String>,
        instances: InstanceSecurity,
    ) -> Self {
        self.security_instances
            .schema
            .insert(schema_code.into(), instances);
        self
    }
}

/// Errors raised while reading a persisted profile.
#[derive(thiserror::Error, Debug)]
pub enum ProfileError {
    #[error("malformed {document} document: {source}")]
    Malformed {
        document: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
