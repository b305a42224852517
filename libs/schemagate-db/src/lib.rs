#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Scoped queries over schema-driven tenant tables.
//!
//! Tenant tables are named `<prefix><schema_code>` and keep their dynamic
//! fields in one JSON document column. A user's [`SecurityProfile`] decides
//! which rows of such a table they see (enforced in SQL) and which fields of
//! each row they see (enforced on the result).
//!
//! # Example
//! ```rust,no_run
//! use figment::{Figment, providers::{Format, Yaml}};
//! use schemagate_db::SecureQueryConfig;
//!
//! let figment = Figment::new().merge(Yaml::string(
//!     "secure_query:\n  instances_table_prefix: \"cst_\"\n  fields_cache_ttl: \"5m\"\n",
//! ));
//! let config = SecureQueryConfig::from_figment(&figment, "secure_query").unwrap();
//! assert_eq!(config.instances_table("contract").unwrap(), "cst_contract");
//! ```
//!
//! See [`secure`] for the read path.
//!
//! [`SecurityProfile`]: schemagate_security::SecurityProfile

pub mod catalog;
pub mod config;
pub mod error;
pub mod profile_store;
pub mod secure;

pub use catalog::{CachedFieldCatalog, FieldCatalog, SeaOrmFieldCatalog};
pub use config::{CoreTables, SecureQueryConfig};
pub use error::{CatalogError, ProfileError, ScanError, SecureQueryError};
pub use profile_store::{ProfileLoader, SeaOrmProfileLoader};
pub use secure::{
    QueryScopeBuilder, ResultMasker, RowCursor, RowSource, ScopedQuery, SecureInstanceReader,
    SecureQueryOptions,
};

pub use schemagate_security as security;

pub type Result<T> = std::result::Result<T, SecureQueryError>;
