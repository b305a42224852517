use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr};

use crate::secure::cursor::{QueryResultCursor, RowCursor};
use crate::secure::select::ScopedQuery;

/// Executes scoped queries.
///
/// Implementations must run the query exactly as built; the row scope lives
/// in its WHERE clause.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Runs `query` and returns a cursor over its rows.
    ///
    /// # Errors
    /// Returns the database error when the query cannot be executed.
    async fn open(&self, query: &ScopedQuery) -> Result<Box<dyn RowCursor>, DbErr>;
}

/// [`RowSource`] backed by a `SeaORM` connection.
#[derive(Clone, Debug)]
pub struct SeaOrmRowSource {
    conn: DatabaseConnection,
}

impl SeaOrmRowSource {
    #[must_use]
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    #[must_use]
    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }
}

#[async_trait]
impl RowSource for SeaOrmRowSource {
    async fn open(&self, query: &ScopedQuery) -> Result<Box<dyn RowCursor>, DbErr> {
        let rows = self.conn.query_all(query.statement()).await?;
        tracing::trace!(rows = rows.len(), "scoped query returned");
        Ok(Box::new(QueryResultCursor::new(
            rows,
            query.columns().to_vec(),
        )))
    }
}
