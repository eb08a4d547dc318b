//! Survey repository

use crate::domain::{Survey, SurveyQuery, SurveyRow, Tenant};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::{MySql, MySqlPool, QueryBuilder};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SurveyRepository: Send + Sync {
    async fn find(&self, id: &str, tenant: &Tenant) -> Result<Option<Survey>>;

    async fn list(&self, tenant: &Tenant, query: &SurveyQuery) -> Result<Vec<Survey>>;

    async fn insert(&self, survey: &Survey) -> Result<Survey>;

    /// Overwrite the editable fields of a survey matched by id and tenant.
    ///
    /// Unless `elevated` is set the row must also be owned by
    /// `survey.creator_id`. Fails with NotFound when no row matched.
    async fn update(&self, survey: &Survey, elevated: bool) -> Result<()>;
}

pub struct SurveyRepositoryImpl {
    pool: MySqlPool,
}

impl SurveyRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

pub(crate) const SURVEY_COLUMNS: &str = "id, creator_id, org_id, app_id, calendar_event_id, sensitive, anonymous, public, archived, content, date_created, date_updated";

fn push_filters(qb: &mut QueryBuilder<'_, MySql>, tenant: &Tenant, query: &SurveyQuery) {
    qb.push(" WHERE org_id = ")
        .push_bind(tenant.org_id.clone())
        .push(" AND app_id = ")
        .push_bind(tenant.app_id.clone());

    if let Some(creator_id) = &query.creator_id {
        qb.push(" AND creator_id = ").push_bind(creator_id.clone());
    }
    if !query.ids.is_empty() {
        qb.push(" AND id IN (");
        let mut ids = qb.separated(", ");
        for id in &query.ids {
            ids.push_bind(id.clone());
        }
        ids.push_unseparated(")");
    }
    if !query.types.is_empty() {
        qb.push(" AND survey_type IN (");
        let mut types = qb.separated(", ");
        for survey_type in &query.types {
            types.push_bind(survey_type.clone());
        }
        types.push_unseparated(")");
    }
    if let Some(event_id) = query.calendar_event_id.as_deref().filter(|e| !e.is_empty()) {
        qb.push(" AND calendar_event_id = ").push_bind(event_id.to_string());
    }

    let time = &query.time;
    if let Some(after) = time.start_time_after {
        qb.push(" AND start_date >= ").push_bind(after);
    }
    if let Some(before) = time.start_time_before {
        qb.push(" AND start_date <= ").push_bind(before);
    }
    if let Some(after) = time.end_time_after {
        qb.push(" AND end_date >= ").push_bind(after);
    }
    if let Some(before) = time.end_time_before {
        qb.push(" AND end_date <= ").push_bind(before);
    }

    // Unset tri-state flags count as false
    match query.public {
        Some(true) => {
            qb.push(" AND public = TRUE");
        }
        Some(false) => {
            qb.push(" AND (public = FALSE OR public IS NULL)");
        }
        None => {}
    }
    match query.archived {
        Some(true) => {
            qb.push(" AND archived = TRUE");
        }
        Some(false) => {
            qb.push(" AND (archived = FALSE OR archived IS NULL)");
        }
        None => {}
    }
}

fn order_by(query: &SurveyQuery) -> &'static str {
    let time = &query.time;
    if time.end_time_before.is_some() {
        " ORDER BY end_date DESC"
    } else if time.end_time_after.is_some() {
        " ORDER BY end_date ASC"
    } else if time.start_time_before.is_some() {
        " ORDER BY start_date DESC"
    } else if time.start_time_after.is_some() {
        " ORDER BY start_date ASC"
    } else {
        " ORDER BY date_created ASC"
    }
}

#[async_trait]
impl SurveyRepository for SurveyRepositoryImpl {
    async fn find(&self, id: &str, tenant: &Tenant) -> Result<Option<Survey>> {
        let row = sqlx::query_as::<_, SurveyRow>(&format!(
            "SELECT {SURVEY_COLUMNS} FROM surveys WHERE id = ? AND org_id = ? AND app_id = ?"
        ))
        .bind(id)
        .bind(&tenant.org_id)
        .bind(&tenant.app_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Survey::from))
    }

    async fn list(&self, tenant: &Tenant, query: &SurveyQuery) -> Result<Vec<Survey>> {
        let mut qb = QueryBuilder::<MySql>::new(format!("SELECT {SURVEY_COLUMNS} FROM surveys"));
        push_filters(&mut qb, tenant, query);
        qb.push(order_by(query));
        if query.limit.is_some() || query.offset.is_some() {
            qb.push(" LIMIT ")
                .push_bind(query.limit.unwrap_or(i64::MAX))
                .push(" OFFSET ")
                .push_bind(query.offset.unwrap_or(0));
        }

        let rows = qb
            .build_query_as::<SurveyRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Survey::from).collect())
    }

    async fn insert(&self, survey: &Survey) -> Result<Survey> {
        sqlx::query(
            r#"
            INSERT INTO surveys (id, creator_id, org_id, app_id, calendar_event_id, sensitive, anonymous,
                                 public, archived, survey_type, start_date, end_date, content, date_created)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&survey.id)
        .bind(&survey.creator_id)
        .bind(&survey.org_id)
        .bind(&survey.app_id)
        .bind(survey.event_id())
        .bind(survey.sensitive)
        .bind(survey.anonymous)
        .bind(survey.public)
        .bind(survey.archived)
        .bind(&survey.content.survey_type)
        .bind(survey.content.start_date)
        .bind(survey.content.end_date)
        .bind(sqlx::types::Json(&survey.content))
        .bind(survey.date_created)
        .execute(&self.pool)
        .await?;

        Ok(survey.clone())
    }

    async fn update(&self, survey: &Survey, elevated: bool) -> Result<()> {
        let mut qb = QueryBuilder::<MySql>::new("UPDATE surveys SET calendar_event_id = ");
        qb.push_bind(survey.event_id().map(str::to_string))
            .push(", sensitive = ")
            .push_bind(survey.sensitive)
            .push(", anonymous = ")
            .push_bind(survey.anonymous)
            .push(", public = ")
            .push_bind(survey.public)
            .push(", archived = ")
            .push_bind(survey.archived)
            .push(", survey_type = ")
            .push_bind(survey.content.survey_type.clone())
            .push(", start_date = ")
            .push_bind(survey.content.start_date)
            .push(", end_date = ")
            .push_bind(survey.content.end_date)
            .push(", content = ")
            .push_bind(sqlx::types::Json(survey.content.clone()))
            .push(", date_updated = ")
            .push_bind(survey.date_updated)
            .push(" WHERE id = ")
            .push_bind(survey.id.clone())
            .push(" AND org_id = ")
            .push_bind(survey.org_id.clone())
            .push(" AND app_id = ")
            .push_bind(survey.app_id.clone());
        if !elevated {
            qb.push(" AND creator_id = ")
                .push_bind(survey.creator_id.clone());
        }

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("survey {}", survey.id)));
        }

        Ok(())
    }
}
