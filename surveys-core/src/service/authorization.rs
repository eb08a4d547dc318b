//! Event-based elevation decisions
//!
//! An identity may act on an event-linked survey beyond plain ownership when
//! the calendar service reports it as an admin of that event. Accounts are
//! matched on account ID or, when the tenant configures one, on an external
//! ID. Some callers are known to the calendar only by one of the two, so a
//! tenant without an env config cannot be checked at all.

use crate::cache::ConfigCache;
use crate::domain::{EventPersonFilter, EventUser, Identity, Survey, EVENT_ROLE_ADMIN};
use crate::error::{AppError, Result};
use crate::repository::ConfigRepository;
use crate::upstream::EventAccessClient;
use std::sync::Arc;
use tracing::debug;

pub struct AuthorizationResolver<E: EventAccessClient, C: ConfigRepository> {
    events: Arc<E>,
    configs: Arc<ConfigCache<C>>,
}

impl<E: EventAccessClient, C: ConfigRepository> AuthorizationResolver<E, C> {
    pub fn new(events: Arc<E>, configs: Arc<ConfigCache<C>>) -> Self {
        Self { events, configs }
    }

    /// Whether `actor` may act on `survey` beyond ownership.
    ///
    /// `already_admin` short-circuits without a remote call. A survey with no
    /// calendar event cannot grant elevation. A failed calendar lookup is an
    /// error, never a denial.
    pub async fn is_elevated(
        &self,
        survey: &Survey,
        actor: &Identity,
        already_admin: bool,
    ) -> Result<bool> {
        if already_admin {
            return Ok(true);
        }
        let Some(event_id) = survey.event_id() else {
            return Ok(false);
        };

        let user = self.event_user(survey, actor)?;
        let persons = self
            .events
            .get_event_persons(
                &survey.tenant(),
                event_id,
                std::slice::from_ref(&user),
                &EventPersonFilter::admins(),
            )
            .await
            .map_err(|e| wrap("event admin", event_id, e))?;

        let elevated = persons.iter().any(|p| {
            p.is_identity(&user.account_id, &user.external_id) && p.role == EVENT_ROLE_ADMIN
        });
        debug!(
            survey_id = %survey.id,
            event_id,
            account_id = %actor.account_id,
            elevated,
            "Resolved event admin"
        );
        Ok(elevated)
    }

    /// Whether `actor` registered for and attended the survey's event.
    /// Surveys without an event have no attendance.
    pub async fn has_attended(&self, survey: &Survey, actor: &Identity) -> Result<bool> {
        let Some(event_id) = survey.event_id() else {
            return Ok(false);
        };

        let user = self.event_user(survey, actor)?;
        let persons = self
            .events
            .get_event_persons(
                &survey.tenant(),
                event_id,
                std::slice::from_ref(&user),
                &EventPersonFilter::attendees(),
            )
            .await
            .map_err(|e| wrap("event attendance", event_id, e))?;

        Ok(persons
            .iter()
            .any(|p| p.is_identity(&user.account_id, &user.external_id) && p.attended))
    }

    /// The candidate identity for the survey's tenant. The external ID field
    /// comes from the tenant's env config, which must exist. An env config
    /// with an empty field name sends the account ID alone.
    fn event_user(&self, survey: &Survey, actor: &Identity) -> Result<EventUser> {
        let tenant = survey.tenant();
        let env = self.configs.env_config(&tenant).ok_or_else(|| {
            AppError::InvalidState(format!(
                "no env config for app {} org {}",
                tenant.app_id, tenant.org_id
            ))
        })?;

        let external_id = if env.external_id.is_empty() {
            String::new()
        } else {
            actor.external_id(&env.external_id).to_string()
        };

        Ok(EventUser {
            account_id: actor.account_id.clone(),
            external_id,
        })
    }
}

fn wrap(check: &str, event_id: &str, err: AppError) -> AppError {
    match err {
        AppError::UpstreamUnavailable(msg) => AppError::UpstreamUnavailable(format!(
            "checking {} for event {}: {}",
            check, event_id, msg
        )),
        other => other,
    }
}
