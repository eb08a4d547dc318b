//! Alert contact repository

use crate::domain::{AlertContact, Tenant};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertContactRepository: Send + Sync {
    async fn list(&self, tenant: &Tenant) -> Result<Vec<AlertContact>>;

    async fn find(&self, id: &str, tenant: &Tenant) -> Result<Option<AlertContact>>;

    async fn find_by_key(&self, key: &str, tenant: &Tenant) -> Result<Vec<AlertContact>>;

    async fn insert(&self, contact: &AlertContact) -> Result<AlertContact>;

    async fn update(&self, contact: &AlertContact) -> Result<()>;

    async fn delete(&self, id: &str, tenant: &Tenant) -> Result<()>;
}

pub struct AlertContactRepositoryImpl {
    pool: MySqlPool,
}

impl AlertContactRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const CONTACT_COLUMNS: &str =
    "id, org_id, app_id, `key`, contact_type, address, params, date_created, date_updated";

#[async_trait]
impl AlertContactRepository for AlertContactRepositoryImpl {
    async fn list(&self, tenant: &Tenant) -> Result<Vec<AlertContact>> {
        let contacts = sqlx::query_as::<_, AlertContact>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM alert_contacts WHERE org_id = ? AND app_id = ? ORDER BY `key`"
        ))
        .bind(&tenant.org_id)
        .bind(&tenant.app_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(contacts)
    }

    async fn find(&self, id: &str, tenant: &Tenant) -> Result<Option<AlertContact>> {
        let contact = sqlx::query_as::<_, AlertContact>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM alert_contacts WHERE id = ? AND org_id = ? AND app_id = ?"
        ))
        .bind(id)
        .bind(&tenant.org_id)
        .bind(&tenant.app_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(contact)
    }

    async fn find_by_key(&self, key: &str, tenant: &Tenant) -> Result<Vec<AlertContact>> {
        let contacts = sqlx::query_as::<_, AlertContact>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM alert_contacts WHERE `key` = ? AND org_id = ? AND app_id = ?"
        ))
        .bind(key)
        .bind(&tenant.org_id)
        .bind(&tenant.app_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(contacts)
    }

    async fn insert(&self, contact: &AlertContact) -> Result<AlertContact> {
        sqlx::query(
            r#"
            INSERT INTO alert_contacts (id, org_id, app_id, `key`, contact_type, address, params, date_created)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&contact.id)
        .bind(&contact.org_id)
        .bind(&contact.app_id)
        .bind(&contact.key)
        .bind(&contact.contact_type)
        .bind(&contact.address)
        .bind(sqlx::types::Json(&contact.params))
        .bind(contact.date_created)
        .execute(&self.pool)
        .await?;

        Ok(contact.clone())
    }

    async fn update(&self, contact: &AlertContact) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE alert_contacts
            SET `key` = ?, contact_type = ?, address = ?, params = ?, date_updated = ?
            WHERE id = ? AND org_id = ? AND app_id = ?
            "#,
        )
        .bind(&contact.key)
        .bind(&contact.contact_type)
        .bind(&contact.address)
        .bind(sqlx::types::Json(&contact.params))
        .bind(contact.date_updated)
        .bind(&contact.id)
        .bind(&contact.org_id)
        .bind(&contact.app_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("alert contact {}", contact.id)));
        }

        Ok(())
    }

    async fn delete(&self, id: &str, tenant: &Tenant) -> Result<()> {
        let result =
            sqlx::query("DELETE FROM alert_contacts WHERE id = ? AND org_id = ? AND app_id = ?")
                .bind(id)
                .bind(&tenant.org_id)
                .bind(&tenant.app_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("alert contact {}", id)));
        }

        Ok(())
    }
}
