#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Security profile model and row/column visibility resolution for
//! schema-driven tenant tables.
//!
//! This crate is free of I/O. The query side lives in `schemagate-db`.
pub mod constants;
pub mod profile;
pub mod tree_path;
pub mod visibility;

pub use profile::{
    FieldRules, InstanceOverride, InstanceSecurity, OutputColumns, PermissionMode,
    PermissionScope, ProfileError, SchemaSecurity, SchemaTable, SecurityProfile, TreeRule,
};
pub use tree_path::{PathPredicate, TreeAnchor};
pub use visibility::{ColumnResolver, Row, RowVisibility, row_id};
