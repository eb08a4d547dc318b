//! Scoped unit of work for survey deletion
//!
//! [`perform_transaction`] opens a [`SurveyTransaction`], hands it to a closure
//! and commits when the closure returns `Ok`. Any `Err` rolls back. A
//! transaction dropped without either (a panic inside the closure, or the
//! request future being cancelled) is rolled back by the driver.

use crate::domain::{Survey, SurveyRow, Tenant};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::warn;

use super::survey::SURVEY_COLUMNS;

/// Store operations bound to one open transaction
#[async_trait]
pub trait SurveyTransaction: Send {
    /// Read a survey and lock it until the transaction ends
    async fn find_survey(&mut self, id: &str, tenant: &Tenant) -> Result<Option<Survey>>;

    /// Delete a survey. Unless `elevated` is set the row must be owned by
    /// `user_id`. Fails with NotFound when no row matched.
    async fn delete_survey(
        &mut self,
        id: &str,
        tenant: &Tenant,
        user_id: &str,
        elevated: bool,
    ) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Opens transactions against the backing store
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn SurveyTransaction>>;
}

/// Run `work` inside one transaction.
///
/// The closure receives the transaction handle and returns a boxed future
/// borrowing it. Anything else the future needs must be moved in.
pub async fn perform_transaction<M, F, T>(manager: &M, work: F) -> Result<T>
where
    M: TransactionManager + ?Sized,
    F: for<'t> FnOnce(&'t mut dyn SurveyTransaction) -> BoxFuture<'t, Result<T>> + Send,
    T: Send,
{
    let mut tx = manager.begin().await?;
    match work(tx.as_mut()).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Failed to roll back survey transaction");
            }
            Err(err)
        }
    }
}

pub struct MySqlTransactionManager {
    pool: MySqlPool,
}

impl MySqlTransactionManager {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionManager for MySqlTransactionManager {
    async fn begin(&self) -> Result<Box<dyn SurveyTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlSurveyTransaction { tx }))
    }
}

struct MySqlSurveyTransaction {
    tx: sqlx::Transaction<'static, MySql>,
}

#[async_trait]
impl SurveyTransaction for MySqlSurveyTransaction {
    async fn find_survey(&mut self, id: &str, tenant: &Tenant) -> Result<Option<Survey>> {
        // A concurrent delete blocks here until the first one commits, then
        // reads the row as gone.
        let row = sqlx::query_as::<_, SurveyRow>(&format!(
            "SELECT {SURVEY_COLUMNS} FROM surveys WHERE id = ? AND org_id = ? AND app_id = ? FOR UPDATE"
        ))
        .bind(id)
        .bind(&tenant.org_id)
        .bind(&tenant.app_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Survey::from))
    }

    async fn delete_survey(
        &mut self,
        id: &str,
        tenant: &Tenant,
        user_id: &str,
        elevated: bool,
    ) -> Result<()> {
        let mut qb = QueryBuilder::<MySql>::new("DELETE FROM surveys WHERE id = ");
        qb.push_bind(id.to_string())
            .push(" AND org_id = ")
            .push_bind(tenant.org_id.clone())
            .push(" AND app_id = ")
            .push_bind(tenant.app_id.clone());
        if !elevated {
            qb.push(" AND creator_id = ").push_bind(user_id.to_string());
        }

        let result = qb.build().execute(&mut *self.tx).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("survey {}", id)));
        }

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
