//! Config repository
//!
//! Returns raw rows. Payload decoding belongs to the config cache.

use crate::domain::ConfigRow;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    /// Every config in every tenant
    async fn list(&self) -> Result<Vec<ConfigRow>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<ConfigRow>>;

    /// The config of `config_type` scoped exactly to (app, org)
    async fn find(&self, config_type: &str, app_id: &str, org_id: &str)
        -> Result<Option<ConfigRow>>;

    async fn insert(&self, row: &ConfigRow) -> Result<()>;

    /// Update by id. Fails with NotFound when no row matched.
    async fn update(&self, row: &ConfigRow) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;
}

pub struct ConfigRepositoryImpl {
    pool: MySqlPool,
}

impl ConfigRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const CONFIG_COLUMNS: &str =
    "id, config_type, app_id, org_id, `system`, data, date_created, date_updated";

#[async_trait]
impl ConfigRepository for ConfigRepositoryImpl {
    async fn list(&self) -> Result<Vec<ConfigRow>> {
        let rows = sqlx::query_as::<_, ConfigRow>(&format!(
            "SELECT {CONFIG_COLUMNS} FROM configs ORDER BY config_type, app_id, org_id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ConfigRow>> {
        let row = sqlx::query_as::<_, ConfigRow>(&format!(
            "SELECT {CONFIG_COLUMNS} FROM configs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find(
        &self,
        config_type: &str,
        app_id: &str,
        org_id: &str,
    ) -> Result<Option<ConfigRow>> {
        let row = sqlx::query_as::<_, ConfigRow>(&format!(
            "SELECT {CONFIG_COLUMNS} FROM configs WHERE config_type = ? AND app_id = ? AND org_id = ?"
        ))
        .bind(config_type)
        .bind(app_id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn insert(&self, row: &ConfigRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO configs (id, config_type, app_id, org_id, `system`, data, date_created, date_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.config_type)
        .bind(&row.app_id)
        .bind(&row.org_id)
        .bind(row.system)
        .bind(sqlx::types::Json(&row.data))
        .bind(row.date_created)
        .bind(row.date_updated)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, row: &ConfigRow) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE configs
            SET config_type = ?, app_id = ?, org_id = ?, `system` = ?, data = ?, date_updated = ?
            WHERE id = ?
            "#,
        )
        .bind(&row.config_type)
        .bind(&row.app_id)
        .bind(&row.org_id)
        .bind(row.system)
        .bind(sqlx::types::Json(&row.data))
        .bind(row.date_updated)
        .bind(&row.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("config {}", row.id)));
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM configs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("config {}", id)));
        }

        Ok(())
    }
}
