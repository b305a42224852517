use std::sync::Arc;

use sea_orm::DatabaseConnection;
use schemagate_security::{
    ColumnResolver, InstanceSecurity, OutputColumns, Row, SchemaSecurity, SecurityProfile,
};

use crate::SecureQueryError;
use crate::catalog::{CachedFieldCatalog, FieldCatalog, SeaOrmFieldCatalog};
use crate::config::SecureQueryConfig;
use crate::secure::masker::ResultMasker;
use crate::secure::provider::{RowSource, SeaOrmRowSource};
use crate::secure::select::{QueryScopeBuilder, SecureQueryOptions};

/// Reads the rows of a tenant table that a user may see, with the columns
/// they may not see removed.
#[derive(Clone)]
pub struct SecureInstanceReader {
    config: Arc<SecureQueryConfig>,
    rows: Arc<dyn RowSource>,
    catalog: Arc<dyn FieldCatalog>,
}

impl std::fmt::Debug for SecureInstanceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureInstanceReader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SecureInstanceReader {
    #[must_use]
    pub fn new(
        config: SecureQueryConfig,
        rows: Arc<dyn RowSource>,
        catalog: Arc<dyn FieldCatalog>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            rows,
            catalog,
        }
    }

    /// Reader over one connection, with field lists cached for the configured
    /// TTL.
    #[must_use]
    pub fn from_connection(conn: DatabaseConnection, config: SecureQueryConfig) -> Self {
        let catalog = CachedFieldCatalog::new(SeaOrmFieldCatalog::new(
            conn.clone(),
            config.tables.clone(),
        ))
        .with_ttl(config.fields_cache_ttl);
        Self::new(
            config,
            Arc::new(SeaOrmRowSource::new(conn)),
            Arc::new(catalog),
        )
    }

    #[must_use]
    pub fn config(&self) -> &SecureQueryConfig {
        &self.config
    }

    /// Rows of `schema_code` visible to the owner of `profile`.
    ///
    /// A schema absent from the profile yields no rows without touching the
    /// database.
    ///
    /// # Errors
    /// - [`SecureQueryError::InvalidIdentifier`] for a bad schema code, field
    ///   or column name.
    /// - [`SecureQueryError::Metadata`] when the active fields cannot be
    ///   resolved.
    /// - [`SecureQueryError::Db`] when the query fails.
    /// - [`SecureQueryError::Scan`] when a row cannot be decoded.
    pub async fn get_security_instances(
        &self,
        profile: &SecurityProfile,
        schema_code: &str,
        options: &SecureQueryOptions,
    ) -> Result<Vec<Row>, SecureQueryError> {
        let Some(schema) = profile.schema(schema_code) else {
            tracing::debug!(schema = %schema_code, "schema not in profile, nothing visible");
            return Ok(Vec::new());
        };
        self.get_schema_instances(schema_code, schema, profile.instances(schema_code), options)
            .await
    }

    /// Same as [`Self::get_security_instances`] for callers holding the
    /// parts of a profile rather than the whole.
    ///
    /// # Errors
    /// See [`Self::get_security_instances`].
    #[tracing::instrument(skip_all, fields(schema = %schema_code))]
    pub async fn get_schema_instances(
        &self,
        schema_code: &str,
        schema: &SchemaSecurity,
        instances: Option<&InstanceSecurity>,
        options: &SecureQueryOptions,
    ) -> Result<Vec<Row>, SecureQueryError> {
        let fields = if options.sub_select.is_some() {
            Vec::new()
        } else {
            self.resolve_fields(schema_code, schema, options).await?
        };

        let query = QueryScopeBuilder::new(&self.config, schema_code, schema, instances)
            .build(&fields, options)?;
        tracing::debug!(
            columns = query.columns().len(),
            scoped = schema.scopes_rows(),
            "running scoped query"
        );

        let mut cursor = self.rows.open(&query).await?;
        let masker = ResultMasker::new(ColumnResolver::new(schema, instances), query.keeps_id())
            .with_column_fields(options.column_fields.as_ref());
        let rows = masker.drain(cursor.as_mut())?;

        tracing::debug!(rows = rows.len(), "scoped query done");
        Ok(rows)
    }

    /// Explicit columns win, then the schema's configured list, then every
    /// active field of the schema.
    async fn resolve_fields(
        &self,
        schema_code: &str,
        schema: &SchemaSecurity,
        options: &SecureQueryOptions,
    ) -> Result<Vec<String>, SecureQueryError> {
        let columns = options
            .columns
            .clone()
            .unwrap_or_else(|| schema.output_columns());
        match columns {
            OutputColumns::Fields(fields) => Ok(fields),
            OutputColumns::All => Ok(self.catalog.active_fields(schema_code).await?),
        }
    }
}
