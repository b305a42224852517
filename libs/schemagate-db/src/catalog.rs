//! Active-field lookup for schemas, with an optional in-process cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use sea_orm::sea_query::{Alias, Expr, JoinType, Order, Query, SelectStatement};
use sea_orm::{ConnectionTrait, DatabaseConnection};

use crate::config::CoreTables;
use crate::error::{CatalogError, ScanError};

/// Source of the active field codes of a schema.
#[async_trait]
pub trait FieldCatalog: Send + Sync {
    /// Active field codes of `schema_code`, in a stable order.
    ///
    /// # Errors
    /// Returns [`CatalogError`] when the lookup fails.
    async fn active_fields(&self, schema_code: &str) -> Result<Vec<String>, CatalogError>;
}

/// Reads active fields from the schema catalog tables.
#[derive(Clone, Debug)]
pub struct SeaOrmFieldCatalog {
    conn: DatabaseConnection,
    tables: CoreTables,
}

impl SeaOrmFieldCatalog {
    #[must_use]
    pub fn new(conn: DatabaseConnection, tables: CoreTables) -> Self {
        Self { conn, tables }
    }

    /// Active field codes of one schema, ordered by code.
    fn active_fields_query(&self, schema_code: &str) -> SelectStatement {
        let fld = Alias::new("fld");
        let sch = Alias::new("sch");
        let mut select = Query::select();
        select
            .expr_as(Expr::col((fld.clone(), Alias::new("code"))), Alias::new("code"))
            .from_as(Alias::new(&self.tables.schema_fields), fld.clone())
            .join_as(
                JoinType::InnerJoin,
                Alias::new(&self.tables.schemas),
                sch.clone(),
                Expr::col((sch.clone(), Alias::new("code")))
                    .equals((fld.clone(), Alias::new("schema_code"))),
            )
            .and_where(Expr::col((sch, Alias::new("code"))).eq(schema_code))
            .and_where(Expr::col((fld.clone(), Alias::new("active"))).eq(true))
            .order_by((fld, Alias::new("code")), Order::Asc);
        select
    }
}

#[async_trait]
impl FieldCatalog for SeaOrmFieldCatalog {
    async fn active_fields(&self, schema_code: &str) -> Result<Vec<String>, CatalogError> {
        let select = self.active_fields_query(schema_code);
        let stmt = self.conn.get_database_backend().build(&select);
        let rows = self.conn.query_all(stmt).await?;
        let fields = rows
            .iter()
            .map(|row| {
                row.try_get::<String>("", "code")
                    .map_err(|e| ScanError::new("code", e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(schema = %schema_code, fields = fields.len(), "loaded active fields");
        Ok(fields)
    }
}

#[derive(Debug)]
struct CachedFields {
    fields: Arc<[String]>,
    loaded_at: Instant,
}

/// Caches another catalog's answers per schema code.
///
/// Failed lookups are not cached. With a TTL, entries older than the TTL are
/// reloaded on next use.
#[derive(Debug)]
pub struct CachedFieldCatalog<C> {
    inner: C,
    ttl: Option<Duration>,
    entries: DashMap<String, CachedFields>,
}

impl<C: FieldCatalog> CachedFieldCatalog<C> {
    #[must_use]
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            ttl: None,
            entries: DashMap::new(),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Forgets the cached fields of one schema.
    pub fn invalidate(&self, schema_code: &str) {
        self.entries.remove(schema_code);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_fresh(&self, entry: &CachedFields) -> bool {
        self.ttl.is_none_or(|ttl| entry.loaded_at.elapsed() < ttl)
    }
}

#[async_trait]
impl<C: FieldCatalog> FieldCatalog for CachedFieldCatalog<C> {
    async fn active_fields(&self, schema_code: &str) -> Result<Vec<String>, CatalogError> {
        let cached = self
            .entries
            .get(schema_code)
            .filter(|entry| self.is_fresh(entry))
            .map(|entry| Arc::clone(&entry.fields));
        if let Some(fields) = cached {
            tracing::trace!(schema = %schema_code, "field cache hit");
            return Ok(fields.to_vec());
        }

        let fields = self.inner.active_fields(schema_code).await?;
        self.entries.insert(
            schema_code.to_owned(),
            CachedFields {
                fields: fields.clone().into(),
                loaded_at: Instant::now(),
            },
        );
        Ok(fields)
    }
}

#[async_trait]
impl<T: FieldCatalog + ?Sized> FieldCatalog for Arc<T> {
    async fn active_fields(&self, schema_code: &str) -> Result<Vec<String>, CatalogError> {
        (**self).active_fields(schema_code).await
    }
}
