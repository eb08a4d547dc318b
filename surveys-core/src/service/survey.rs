//! Survey create/update/delete orchestration and reads
//!
//! Every mutation asks [`AuthorizationResolver`] whether the actor is
//! elevated and then hands that flag to the store, which applies its own
//! creator filter when the flag is unset. Deletion runs its read, its
//! elevation check and its delete inside one transaction.

use super::AuthorizationResolver;
use crate::domain::{
    Identity, Survey, SurveyInput, SurveyListItem, SurveyQuery, SurveyResponseQuery, Tenant,
    UserData,
};
use crate::error::{AppError, Result};
use crate::repository::{
    perform_transaction, ConfigRepository, SurveyRepository, SurveyResponseRepository,
    TransactionManager,
};
use crate::upstream::EventAccessClient;
use chrono::Utc;
use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

pub struct SurveyService<S, R, E, C, M>
where
    S: SurveyRepository,
    R: SurveyResponseRepository,
    E: EventAccessClient,
    C: ConfigRepository,
    M: TransactionManager,
{
    surveys: Arc<S>,
    responses: Arc<R>,
    authorization: Arc<AuthorizationResolver<E, C>>,
    transactions: Arc<M>,
    fanout_timeout: Duration,
}

impl<S, R, E, C, M> SurveyService<S, R, E, C, M>
where
    S: SurveyRepository,
    R: SurveyResponseRepository,
    E: EventAccessClient + 'static,
    C: ConfigRepository + 'static,
    M: TransactionManager,
{
    pub fn new(
        surveys: Arc<S>,
        responses: Arc<R>,
        authorization: Arc<AuthorizationResolver<E, C>>,
        transactions: Arc<M>,
        fanout_timeout: Duration,
    ) -> Self {
        Self {
            surveys,
            responses,
            authorization,
            transactions,
            fanout_timeout,
        }
    }

    pub async fn get(&self, id: &str, tenant: &Tenant) -> Result<Survey> {
        self.surveys
            .find(id, tenant)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Survey {} not found", id)))
    }

    /// List surveys, marking those the actor already answered.
    /// `completed` keeps only surveys whose flag equals it.
    pub async fn list(
        &self,
        tenant: &Tenant,
        query: &SurveyQuery,
        completed: Option<bool>,
        actor: &Identity,
    ) -> Result<Vec<SurveyListItem>> {
        let surveys = self.surveys.list(tenant, query).await?;
        if surveys.is_empty() {
            return Ok(Vec::new());
        }

        let answered: HashSet<String> = self
            .responses
            .list(&SurveyResponseQuery {
                org_id: Some(tenant.org_id.clone()),
                app_id: Some(tenant.app_id.clone()),
                user_id: Some(actor.account_id.clone()),
                survey_ids: surveys.iter().map(|s| s.id.clone()).collect(),
                ..Default::default()
            })
            .await?
            .into_iter()
            .map(|r| r.survey.id)
            .collect();

        Ok(surveys
            .into_iter()
            .map(|survey| SurveyListItem {
                completed: answered.contains(&survey.id),
                survey,
            })
            .filter(|item| completed.is_none_or(|c| item.completed == c))
            .collect())
    }

    pub async fn list_created_by(&self, actor: &Identity, tenant: &Tenant) -> Result<Vec<Survey>> {
        self.surveys
            .list(
                tenant,
                &SurveyQuery {
                    creator_id: Some(actor.account_id.clone()),
                    ..Default::default()
                },
            )
            .await
    }

    /// The actor's own surveys and responses, fetched concurrently
    pub async fn get_user_data(&self, actor: &Identity, tenant: &Tenant) -> Result<UserData> {
        let responses_query = SurveyResponseQuery {
            org_id: Some(tenant.org_id.clone()),
            app_id: Some(tenant.app_id.clone()),
            user_id: Some(actor.account_id.clone()),
            ..Default::default()
        };

        let fetch = async {
            tokio::try_join!(
                self.list_created_by(actor, tenant),
                self.responses.list(&responses_query)
            )
        };
        let (surveys, survey_responses) = tokio::time::timeout(self.fanout_timeout, fetch)
            .await
            .map_err(|_| {
                AppError::UpstreamUnavailable(format!(
                    "user data fetch exceeded {}ms",
                    self.fanout_timeout.as_millis()
                ))
            })??;

        Ok(UserData {
            surveys,
            survey_responses,
        })
    }

    /// Create a survey owned by `actor`. A survey linked to an event needs
    /// the actor to be elevated on that event, admin callers included.
    pub async fn create(
        &self,
        input: SurveyInput,
        tenant: &Tenant,
        actor: &Identity,
    ) -> Result<Survey> {
        input.validate()?;
        let survey = input.into_survey(Uuid::new_v4().to_string(), &actor.account_id, tenant);

        if survey.event_id().is_some()
            && !self
                .authorization
                .is_elevated(&survey, actor, false)
                .await?
        {
            return Err(AppError::PermissionDenied(
                "Only event admins can create surveys for this event".to_string(),
            ));
        }

        let survey = self.surveys.insert(&survey).await?;
        info!(survey_id = %survey.id, creator_id = %survey.creator_id, "Created survey");
        Ok(survey)
    }

    /// Replace a survey's editable fields.
    ///
    /// Elevation is decided on the stored survey. The write itself is still
    /// filtered to the actor's own rows unless elevated, so a survey whose
    /// event admins changed in between is not overwritten.
    pub async fn update(
        &self,
        id: &str,
        input: SurveyInput,
        tenant: &Tenant,
        actor: &Identity,
        already_admin: bool,
    ) -> Result<Survey> {
        input.validate()?;
        let existing = self.get(id, tenant).await?;

        let elevated = self
            .authorization
            .is_elevated(&existing, actor, already_admin)
            .await?;
        if !elevated && existing.creator_id != actor.account_id {
            return Err(AppError::PermissionDenied(format!(
                "Not allowed to update survey {}",
                id
            )));
        }

        let owner = if elevated {
            existing.creator_id.as_str()
        } else {
            actor.account_id.as_str()
        };
        let mut survey = input.into_survey(id.to_string(), owner, tenant);
        survey.date_created = existing.date_created;
        survey.date_updated = Some(Utc::now());

        match self.surveys.update(&survey, elevated).await {
            Ok(()) => Ok(survey),
            // The filtered write matched nothing although the row was read a
            // moment ago: either it is gone or ownership no longer holds.
            Err(AppError::NotFound(_)) if !elevated => {
                match self.surveys.find(id, tenant).await? {
                    Some(_) => Err(AppError::PermissionDenied(format!(
                        "Not allowed to update survey {}",
                        id
                    ))),
                    None => Err(AppError::NotFound(format!("Survey {} not found", id))),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Delete a survey as one unit of work: read it, re-check elevation on
    /// the row just read, then delete under the same ownership filter as
    /// update. Any failure rolls the whole unit back.
    pub async fn delete(
        &self,
        id: &str,
        tenant: &Tenant,
        actor: &Identity,
        already_admin: bool,
    ) -> Result<()> {
        let authorization = self.authorization.clone();
        let id = id.to_string();
        let tenant = tenant.clone();
        let actor = actor.clone();

        let result = perform_transaction(self.transactions.as_ref(), move |tx| {
            Box::pin(async move {
                let survey = tx
                    .find_survey(&id, &tenant)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Survey {} not found", id)))?;

                let elevated = authorization
                    .is_elevated(&survey, &actor, already_admin)
                    .await?;
                if !elevated && survey.creator_id != actor.account_id {
                    return Err(AppError::PermissionDenied(format!(
                        "Not allowed to delete survey {}",
                        id
                    )));
                }

                tx.delete_survey(&id, &tenant, &actor.account_id, elevated)
                    .await?;
                info!(survey_id = %id, actor = %actor.account_id, elevated, "Deleted survey");
                Ok(())
            })
        })
        .await;

        let outcome = match &result {
            Ok(()) => "deleted",
            Err(e) => e.kind(),
        };
        counter!("surveys_survey_deletes_total", "result" => outcome).increment(1);
        result
    }
}
