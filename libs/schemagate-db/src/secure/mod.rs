//! Scoped reads of tenant tables.
//!
//! A read goes through three steps:
//!
//! 1. [`QueryScopeBuilder`] turns a user's schema configuration into one
//!    parameterized SELECT. Rows the user may not see never leave the
//!    database.
//! 2. A [`RowSource`] runs the query and hands back a [`RowCursor`].
//! 3. [`ResultMasker`] drops the columns the user may not see from each row,
//!    strips the helper columns, and closes the cursor.
//!
//! [`SecureInstanceReader`] wires the three together.
//!
//! # Row scope
//!
//! | Schema | Filter |
//! |--------|--------|
//! | `permission_instance` not custom | none |
//! | custom, with user paths or overrides | any path predicate OR id in overrides |
//! | custom, nothing to match | deny all (`WHERE FALSE`) |
//!
//! # Example
//!
//! ```rust,ignore
//! use schemagate_db::secure::{SecureInstanceReader, SecureQueryOptions};
//! use sea_orm::sea_query::Order;
//!
//! let reader = SecureInstanceReader::from_connection(conn, config);
//! let rows = reader
//!     .get_security_instances(
//!         &profile,
//!         "contract",
//!         &SecureQueryOptions::new().order_by("title", Order::Asc).limit(50),
//!     )
//!     .await?;
//! ```

mod cond;
mod cursor;
pub(crate) mod ident;
mod masker;
mod provider;
mod reader;
mod select;

pub use cond::{SCHEMA_ALIAS, deny_all, path_condition, row_scope_condition};
pub use cursor::{BufferedCursor, RowCursor};
pub use ident::is_identifier;
pub use masker::ResultMasker;
pub use provider::{RowSource, SeaOrmRowSource};
pub use reader::SecureInstanceReader;
pub use select::{
    ColumnKind, OrderBy, OutputColumn, QueryScopeBuilder, ScopedQuery, SecureQueryOptions,
    SubSelect,
};
