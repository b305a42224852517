//! Loading of users' security profiles.

use async_trait::async_trait;
use sea_orm::sea_query::{Alias, Expr, Func, Query, SelectStatement};
use sea_orm::{ConnectionTrait, DatabaseConnection};
use serde_json::Value;
use schemagate_security::SecurityProfile;

use crate::error::ProfileError;

#[async_trait]
pub trait ProfileLoader: Send + Sync {
    /// Security profile of `user_id`.
    ///
    /// # Errors
    /// Returns [`ProfileError::UserNotFound`] for an unknown user,
    /// [`ProfileError::Malformed`] when a stored document has the wrong
    /// shape, and [`ProfileError::Db`] when the lookup fails.
    async fn load(&self, user_id: &str) -> Result<SecurityProfile, ProfileError>;
}

/// Reads the `security` and `security_instances` documents of the users
/// table.
#[derive(Clone, Debug)]
pub struct SeaOrmProfileLoader {
    conn: DatabaseConnection,
    users_table: String,
}

impl SeaOrmProfileLoader {
    #[must_use]
    pub fn new(conn: DatabaseConnection, users_table: impl Into<String>) -> Self {
        Self {
            conn,
            users_table: users_table.into(),
        }
    }

    fn profile_query(&self, user_id: &str) -> SelectStatement {
        let mut select = Query::select();
        select
            .columns([Alias::new("security"), Alias::new("security_instances")])
            .from(Alias::new(&self.users_table))
            .and_where(
                Expr::expr(Func::cast_as(Expr::col(Alias::new("id")), Alias::new("text")))
                    .eq(user_id),
            )
            .limit(1);
        select
    }
}

#[async_trait]
impl ProfileLoader for SeaOrmProfileLoader {
    async fn load(&self, user_id: &str) -> Result<SecurityProfile, ProfileError> {
        let select = self.profile_query(user_id);
        let stmt = self.conn.get_database_backend().build(&select);
        let row = self
            .conn
            .query_one(stmt)
            .await?
            .ok_or_else(|| ProfileError::UserNotFound(user_id.to_owned()))?;

        let security: Option<Value> = row.try_get("", "security")?;
        let instances: Option<Value> = row.try_get("", "security_instances")?;
        let profile = SecurityProfile::from_documents(
            security.unwrap_or_default(),
            instances.unwrap_or_default(),
        )?;

        tracing::debug!(user = %user_id, "loaded security profile");
        Ok(profile)
    }
}
