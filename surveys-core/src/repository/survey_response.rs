//! Survey response repository

use crate::domain::{SurveyResponse, SurveyResponseQuery, SurveyResponseRow, Tenant};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::{MySql, MySqlPool, QueryBuilder};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SurveyResponseRepository: Send + Sync {
    /// A response owned by `user_id` in `tenant`
    async fn find(&self, id: &str, tenant: &Tenant, user_id: &str)
        -> Result<Option<SurveyResponse>>;

    /// Newest first
    async fn list(&self, query: &SurveyResponseQuery) -> Result<Vec<SurveyResponse>>;

    async fn insert(&self, response: &SurveyResponse) -> Result<SurveyResponse>;

    /// Replace the survey snapshot of a response matched by id, owner and
    /// tenant. Fails with NotFound when no row matched.
    async fn update(&self, response: &SurveyResponse) -> Result<()>;

    async fn delete(&self, id: &str, tenant: &Tenant, user_id: &str) -> Result<()>;

    /// Delete every response matching `query`; returns the number removed
    async fn delete_many(&self, query: &SurveyResponseQuery) -> Result<u64>;
}

pub struct SurveyResponseRepositoryImpl {
    pool: MySqlPool,
}

impl SurveyResponseRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const RESPONSE_COLUMNS: &str = "id, user_id, org_id, app_id, survey, date_created, date_updated";

fn push_filters(qb: &mut QueryBuilder<'_, MySql>, query: &SurveyResponseQuery) {
    qb.push(" WHERE 1=1");
    if let Some(org_id) = &query.org_id {
        qb.push(" AND org_id = ").push_bind(org_id.clone());
    }
    if let Some(app_id) = &query.app_id {
        qb.push(" AND app_id = ").push_bind(app_id.clone());
    }
    if let Some(user_id) = &query.user_id {
        qb.push(" AND user_id = ").push_bind(user_id.clone());
    }
    if !query.survey_ids.is_empty() {
        qb.push(" AND survey_id IN (");
        let mut ids = qb.separated(", ");
        for id in &query.survey_ids {
            ids.push_bind(id.clone());
        }
        ids.push_unseparated(")");
    }
    if !query.survey_types.is_empty() {
        qb.push(" AND survey_type IN (");
        let mut types = qb.separated(", ");
        for survey_type in &query.survey_types {
            types.push_bind(survey_type.clone());
        }
        types.push_unseparated(")");
    }
    if let Some(start) = query.start_date {
        qb.push(" AND date_created >= ").push_bind(start);
    }
    if let Some(end) = query.end_date {
        qb.push(" AND date_created < ").push_bind(end);
    }
}

#[async_trait]
impl SurveyResponseRepository for SurveyResponseRepositoryImpl {
    async fn find(
        &self,
        id: &str,
        tenant: &Tenant,
        user_id: &str,
    ) -> Result<Option<SurveyResponse>> {
        let row = sqlx::query_as::<_, SurveyResponseRow>(&format!(
            "SELECT {RESPONSE_COLUMNS} FROM survey_responses WHERE id = ? AND org_id = ? AND app_id = ? AND user_id = ?"
        ))
        .bind(id)
        .bind(&tenant.org_id)
        .bind(&tenant.app_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SurveyResponse::from))
    }

    async fn list(&self, query: &SurveyResponseQuery) -> Result<Vec<SurveyResponse>> {
        let mut qb = QueryBuilder::<MySql>::new(format!(
            "SELECT {RESPONSE_COLUMNS} FROM survey_responses"
        ));
        push_filters(&mut qb, query);
        qb.push(" ORDER BY date_created DESC");
        if query.limit.is_some() || query.offset.is_some() {
            qb.push(" LIMIT ")
                .push_bind(query.limit.unwrap_or(i64::MAX))
                .push(" OFFSET ")
                .push_bind(query.offset.unwrap_or(0));
        }

        let rows = qb
            .build_query_as::<SurveyResponseRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(SurveyResponse::from).collect())
    }

    async fn insert(&self, response: &SurveyResponse) -> Result<SurveyResponse> {
        sqlx::query(
            r#"
            INSERT INTO survey_responses (id, user_id, org_id, app_id, survey_id, survey_type, survey, date_created)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&response.id)
        .bind(&response.user_id)
        .bind(&response.org_id)
        .bind(&response.app_id)
        .bind(&response.survey.id)
        .bind(&response.survey.content.survey_type)
        .bind(sqlx::types::Json(&response.survey))
        .bind(response.date_created)
        .execute(&self.pool)
        .await?;

        Ok(response.clone())
    }

    async fn update(&self, response: &SurveyResponse) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE survey_responses
            SET survey = ?, survey_type = ?, date_updated = ?
            WHERE id = ? AND user_id = ? AND org_id = ? AND app_id = ?
            "#,
        )
        .bind(sqlx::types::Json(&response.survey))
        .bind(&response.survey.content.survey_type)
        .bind(response.date_updated)
        .bind(&response.id)
        .bind(&response.user_id)
        .bind(&response.org_id)
        .bind(&response.app_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("survey response {}", response.id)));
        }

        Ok(())
    }

    async fn delete(&self, id: &str, tenant: &Tenant, user_id: &str) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM survey_responses WHERE id = ? AND org_id = ? AND app_id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(&tenant.org_id)
        .bind(&tenant.app_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("survey response {}", id)));
        }

        Ok(())
    }

    async fn delete_many(&self, query: &SurveyResponseQuery) -> Result<u64> {
        let mut qb = QueryBuilder::<MySql>::new("DELETE FROM survey_responses");
        push_filters(&mut qb, query);

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
