//! Survey response service

use super::AuthorizationResolver;
use crate::domain::{Identity, Survey, SurveyResponse, SurveyResponseQuery, Tenant};
use crate::error::{AppError, Result};
use crate::repository::{ConfigRepository, SurveyRepository, SurveyResponseRepository};
use crate::upstream::EventAccessClient;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Filters a caller may apply to their own responses, or an event admin to
/// a survey's responses
#[derive(Debug, Clone, Default)]
pub struct ResponseFilter {
    pub survey_ids: Vec<String>,
    pub survey_types: Vec<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ResponseFilter {
    fn owned_by(self, actor: &Identity, tenant: &Tenant) -> SurveyResponseQuery {
        SurveyResponseQuery {
            org_id: Some(tenant.org_id.clone()),
            app_id: Some(tenant.app_id.clone()),
            user_id: Some(actor.account_id.clone()),
            survey_ids: self.survey_ids,
            survey_types: self.survey_types,
            start_date: self.start_date,
            end_date: self.end_date,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

pub struct SurveyResponseService<R, S, E, C>
where
    R: SurveyResponseRepository,
    S: SurveyRepository,
    E: EventAccessClient,
    C: ConfigRepository,
{
    responses: Arc<R>,
    surveys: Arc<S>,
    authorization: Arc<AuthorizationResolver<E, C>>,
}

impl<R, S, E, C> SurveyResponseService<R, S, E, C>
where
    R: SurveyResponseRepository,
    S: SurveyRepository,
    E: EventAccessClient,
    C: ConfigRepository,
{
    pub fn new(
        responses: Arc<R>,
        surveys: Arc<S>,
        authorization: Arc<AuthorizationResolver<E, C>>,
    ) -> Self {
        Self {
            responses,
            surveys,
            authorization,
        }
    }

    /// Record the actor's answers to a survey.
    ///
    /// `answered` is the survey as filled in by the client. Its answers are
    /// kept; its identifying fields are taken from the stored survey. For a
    /// non-sensitive survey linked to an event the actor must have attended
    /// the event.
    pub async fn create(
        &self,
        answered: Survey,
        tenant: &Tenant,
        actor: &Identity,
    ) -> Result<SurveyResponse> {
        let live = self
            .surveys
            .find(&answered.id, tenant)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Survey {} not found", answered.id)))?;

        if live.event_id().is_some()
            && !live.sensitive
            && !self.authorization.has_attended(&live, actor).await?
        {
            return Err(AppError::PermissionDenied(
                "Only event attendees can respond to this survey".to_string(),
            ));
        }

        let response = SurveyResponse {
            id: Uuid::new_v4().to_string(),
            user_id: actor.account_id.clone(),
            org_id: tenant.org_id.clone(),
            app_id: tenant.app_id.clone(),
            survey: snapshot(answered, &live),
            date_created: Utc::now(),
            date_updated: None,
        };
        let response = self.responses.insert(&response).await?;
        info!(response_id = %response.id, survey_id = %live.id, "Created survey response");
        Ok(response)
    }

    pub async fn get(&self, id: &str, tenant: &Tenant, actor: &Identity) -> Result<SurveyResponse> {
        self.responses
            .find(id, tenant, &actor.account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Survey response {} not found", id)))
    }

    pub async fn list(
        &self,
        filter: ResponseFilter,
        tenant: &Tenant,
        actor: &Identity,
    ) -> Result<Vec<SurveyResponse>> {
        self.responses.list(&filter.owned_by(actor, tenant)).await
    }

    /// Replace the answers of one of the actor's responses
    pub async fn update(
        &self,
        id: &str,
        answered: Survey,
        tenant: &Tenant,
        actor: &Identity,
    ) -> Result<SurveyResponse> {
        let mut response = self.get(id, tenant, actor).await?;
        response.survey = snapshot(answered, &response.survey);
        response.date_updated = Some(Utc::now());

        self.responses.update(&response).await?;
        Ok(response)
    }

    pub async fn delete(&self, id: &str, tenant: &Tenant, actor: &Identity) -> Result<()> {
        self.responses.delete(id, tenant, &actor.account_id).await
    }

    /// Delete every response of the actor matching `filter`. Paging is
    /// ignored. Fails with NotFound when nothing matched.
    pub async fn delete_many(
        &self,
        filter: ResponseFilter,
        tenant: &Tenant,
        actor: &Identity,
    ) -> Result<u64> {
        let mut query = filter.owned_by(actor, tenant);
        query.limit = None;
        query.offset = None;

        let deleted = self.responses.delete_many(&query).await?;
        if deleted == 0 {
            return Err(AppError::NotFound(
                "No survey responses matched".to_string(),
            ));
        }
        info!(user_id = %actor.account_id, deleted, "Deleted survey responses");
        Ok(deleted)
    }

    /// Every response to a survey, for the admins of its event.
    ///
    /// Sensitive surveys and surveys without an event never qualify, and the
    /// calendar is always asked, whatever permissions the caller holds.
    /// Responses to an anonymous survey come back without their author.
    pub async fn list_for_event_admin(
        &self,
        survey_id: &str,
        filter: ResponseFilter,
        tenant: &Tenant,
        actor: &Identity,
    ) -> Result<Vec<SurveyResponse>> {
        let survey = self
            .surveys
            .find(survey_id, tenant)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Survey {} not found", survey_id)))?;

        if survey.sensitive {
            return Err(AppError::PermissionDenied(
                "Responses to sensitive surveys are not shared".to_string(),
            ));
        }
        if survey.event_id().is_none() {
            return Err(AppError::PermissionDenied(
                "Survey is not linked to an event".to_string(),
            ));
        }
        if !self
            .authorization
            .is_elevated(&survey, actor, false)
            .await?
        {
            return Err(AppError::PermissionDenied(format!(
                "Not an admin of the event for survey {}",
                survey_id
            )));
        }

        let query = SurveyResponseQuery {
            org_id: Some(tenant.org_id.clone()),
            app_id: Some(tenant.app_id.clone()),
            survey_ids: vec![survey.id.clone()],
            start_date: filter.start_date,
            end_date: filter.end_date,
            limit: filter.limit,
            offset: filter.offset,
            ..Default::default()
        };
        let mut responses = self.responses.list(&query).await?;
        if survey.anonymous {
            responses.iter_mut().for_each(SurveyResponse::anonymize);
        }
        Ok(responses)
    }
}

/// Keep the client's answers under the identity of the stored survey
fn snapshot(answered: Survey, stored: &Survey) -> Survey {
    Survey {
        id: stored.id.clone(),
        creator_id: stored.creator_id.clone(),
        org_id: stored.org_id.clone(),
        app_id: stored.app_id.clone(),
        calendar_event_id: stored.calendar_event_id.clone(),
        sensitive: stored.sensitive,
        anonymous: stored.anonymous,
        date_created: stored.date_created,
        ..answered
    }
}
