//! Alert contacts and survey alert dispatch

use crate::domain::{AlertContact, AlertContactInput, SurveyAlert, Tenant, CONTACT_TYPE_EMAIL};
use crate::error::{AppError, Result};
use crate::repository::AlertContactRepository;
use crate::upstream::Notifications;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

pub struct AlertService<A: AlertContactRepository, N: Notifications> {
    contacts: Arc<A>,
    notifications: Arc<N>,
}

impl<A: AlertContactRepository, N: Notifications + 'static> AlertService<A, N> {
    pub fn new(contacts: Arc<A>, notifications: Arc<N>) -> Self {
        Self {
            contacts,
            notifications,
        }
    }

    pub async fn list(&self, tenant: &Tenant) -> Result<Vec<AlertContact>> {
        self.contacts.list(tenant).await
    }

    pub async fn get(&self, id: &str, tenant: &Tenant) -> Result<AlertContact> {
        self.contacts
            .find(id, tenant)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Alert contact {} not found", id)))
    }

    pub async fn create(&self, input: AlertContactInput, tenant: &Tenant) -> Result<AlertContact> {
        input.validate()?;
        let contact = AlertContact {
            id: Uuid::new_v4().to_string(),
            org_id: tenant.org_id.clone(),
            app_id: tenant.app_id.clone(),
            key: input.key,
            contact_type: input.contact_type,
            address: input.address,
            params: input.params,
            date_created: Utc::now(),
            date_updated: None,
        };
        self.contacts.insert(&contact).await
    }

    pub async fn update(
        &self,
        id: &str,
        input: AlertContactInput,
        tenant: &Tenant,
    ) -> Result<AlertContact> {
        input.validate()?;
        let mut contact = self.get(id, tenant).await?;
        contact.key = input.key;
        contact.contact_type = input.contact_type;
        contact.address = input.address;
        contact.params = input.params;
        contact.date_updated = Some(Utc::now());

        self.contacts.update(&contact).await?;
        Ok(contact)
    }

    pub async fn delete(&self, id: &str, tenant: &Tenant) -> Result<()> {
        self.contacts.delete(id, tenant).await
    }

    /// Send an alert to every contact registered under its key.
    ///
    /// The whole alert is rejected if an email contact cannot be served from
    /// its content. Deliveries run in the background; their failures are
    /// logged. Returns the number of deliveries started.
    pub async fn raise(&self, alert: SurveyAlert, tenant: &Tenant) -> Result<usize> {
        let contacts = self.contacts.find_by_key(&alert.contact_key, tenant).await?;

        let mut deliveries = Vec::new();
        for contact in contacts {
            if contact.contact_type != CONTACT_TYPE_EMAIL {
                debug!(contact_id = %contact.id, contact_type = %contact.contact_type, "Skipping unsupported alert contact");
                continue;
            }
            let (subject, body) = alert.email_parts().map_err(|field| {
                AppError::BadRequest(format!("Alert content.{} must be a string", field))
            })?;
            deliveries.push((contact.address, subject.to_string(), body.to_string()));
        }

        let started = deliveries.len();
        for (to, subject, body) in deliveries {
            let notifications = self.notifications.clone();
            let tenant = tenant.clone();
            tokio::spawn(async move {
                if let Err(e) = notifications.send_mail(&tenant, &to, &subject, &body).await {
                    warn!(error = %e, to = %to, "Failed to deliver survey alert");
                }
            });
        }
        info!(contact_key = %alert.contact_key, deliveries = started, "Raised survey alert");
        Ok(started)
    }
}
