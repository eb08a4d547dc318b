//! Common test utilities
//!
//! In-memory implementations of every storage and upstream seam, so the
//! services and the production router can be exercised without MySQL,
//! Redis or the calendar service.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use surveys_core::cache::{ConfigCache, ConfigChangeNotifier};
use surveys_core::config::JwtConfig;
use surveys_core::domain::{
    AlertContact, ConfigRow, EventPerson, EventPersonFilter, EventUser, Survey, SurveyContent,
    SurveyQuery, SurveyResponse, SurveyResponseQuery, Tenant,
};
use surveys_core::error::{AppError, Result};
use surveys_core::jwt::{Claims, JwtManager};
use surveys_core::repository::{
    AlertContactRepository, ConfigRepository, SurveyRepository, SurveyResponseRepository,
    SurveyTransaction, TransactionManager,
};
use surveys_core::service::{AuthorizationResolver, SurveyService};
use surveys_core::upstream::{EventAccessClient, Notifications};
use tokio::sync::{Mutex, Notify, OwnedMutexGuard, RwLock};

// ============================================================================
// Fixtures
// ============================================================================

pub const ORG: &str = "o1";
pub const APP: &str = "a1";

pub fn tenant() -> Tenant {
    Tenant::new(ORG, APP)
}

pub fn survey(id: &str, creator_id: &str, event_id: Option<&str>) -> Survey {
    Survey {
        id: id.to_string(),
        creator_id: creator_id.to_string(),
        org_id: ORG.to_string(),
        app_id: APP.to_string(),
        calendar_event_id: event_id.map(str::to_string),
        content: SurveyContent {
            title: format!("Survey {}", id),
            survey_type: "feedback".to_string(),
            ..Default::default()
        },
        date_created: Utc::now(),
        ..Default::default()
    }
}

pub fn response(id: &str, user_id: &str, survey: &Survey) -> SurveyResponse {
    SurveyResponse {
        id: id.to_string(),
        user_id: user_id.to_string(),
        org_id: survey.org_id.clone(),
        app_id: survey.app_id.clone(),
        survey: survey.clone(),
        date_created: Utc::now(),
        date_updated: None,
    }
}

pub fn event_person(account_id: &str, role: &str) -> EventPerson {
    EventPerson {
        user: EventUser {
            account_id: account_id.to_string(),
            external_id: String::new(),
        },
        registered: true,
        role: role.to_string(),
        ..Default::default()
    }
}

pub fn config_row(
    id: &str,
    config_type: &str,
    app_id: &str,
    org_id: &str,
    system: bool,
    data: serde_json::Value,
) -> ConfigRow {
    ConfigRow {
        id: id.to_string(),
        config_type: config_type.to_string(),
        app_id: app_id.to_string(),
        org_id: org_id.to_string(),
        system,
        data,
        date_created: Utc::now(),
        date_updated: None,
    }
}

/// Env config for the test tenant, matching accounts on their `uin`
pub fn env_row() -> ConfigRow {
    config_row(
        "env1",
        "env",
        APP,
        ORG,
        false,
        serde_json::json!({"external_id": "uin"}),
    )
}

pub fn test_jwt_config() -> JwtConfig {
    JwtConfig {
        secret: "test-secret-key-for-surveys-testing".to_string(),
        issuer: "https://auth.surveys.test".to_string(),
        public_key_pem: None,
    }
}

pub fn test_jwt_manager() -> JwtManager {
    JwtManager::new(test_jwt_config()).expect("HS256 manager")
}

pub fn claims(sub: &str, permissions: &[&str]) -> Claims {
    let now = Utc::now().timestamp();
    Claims {
        sub: sub.to_string(),
        org_id: ORG.to_string(),
        app_id: APP.to_string(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        system: false,
        external_ids: HashMap::new(),
        iss: test_jwt_config().issuer,
        exp: now + 3600,
        iat: now,
    }
}

pub fn token_for(claims: &Claims) -> String {
    test_jwt_manager()
        .create_token(claims)
        .expect("Failed to create test token")
}

// ============================================================================
// Surveys: repository plus transactional store
// ============================================================================

#[derive(Default)]
struct SurveyStoreInner {
    surveys: RwLock<HashMap<String, Survey>>,
    /// Held for the whole life of a transaction
    unit: Arc<Mutex<()>>,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    deletes: AtomicUsize,
    fail_deletes: AtomicBool,
}

/// Survey storage whose transactions are serialized by one lock, so no unit
/// of work observes another's intermediate state
#[derive(Clone, Default)]
pub struct SurveyStore {
    inner: Arc<SurveyStoreInner>,
}

impl SurveyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, survey: Survey) {
        self.inner
            .surveys
            .write()
            .await
            .insert(survey.id.clone(), survey);
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.surveys.read().await.contains_key(id)
    }

    pub async fn stored(&self, id: &str) -> Option<Survey> {
        self.inner.surveys.read().await.get(id).cloned()
    }

    pub fn commits(&self) -> usize {
        self.inner.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.inner.rollbacks.load(Ordering::SeqCst)
    }

    /// Number of `delete_survey` calls that reached storage
    pub fn deletes(&self) -> usize {
        self.inner.deletes.load(Ordering::SeqCst)
    }

    /// Make every `delete_survey` fail after being recorded
    pub fn fail_deletes(&self) {
        self.inner.fail_deletes.store(true, Ordering::SeqCst);
    }

    fn in_tenant(survey: &Survey, tenant: &Tenant) -> bool {
        survey.org_id == tenant.org_id && survey.app_id == tenant.app_id
    }
}

#[async_trait]
impl SurveyRepository for SurveyStore {
    async fn find(&self, id: &str, tenant: &Tenant) -> Result<Option<Survey>> {
        Ok(self
            .inner
            .surveys
            .read()
            .await
            .get(id)
            .filter(|s| Self::in_tenant(s, tenant))
            .cloned())
    }

    async fn list(&self, tenant: &Tenant, query: &SurveyQuery) -> Result<Vec<Survey>> {
        let surveys = self.inner.surveys.read().await;
        let mut matched: Vec<Survey> = surveys
            .values()
            .filter(|s| Self::in_tenant(s, tenant) && query.matches(s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let limit = query.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn insert(&self, survey: &Survey) -> Result<Survey> {
        self.add(survey.clone()).await;
        Ok(survey.clone())
    }

    async fn update(&self, survey: &Survey, elevated: bool) -> Result<()> {
        let mut surveys = self.inner.surveys.write().await;
        match surveys.get_mut(&survey.id) {
            Some(existing)
                if Self::in_tenant(existing, &survey.tenant())
                    && (elevated || existing.creator_id == survey.creator_id) =>
            {
                *existing = survey.clone();
                Ok(())
            }
            _ => Err(AppError::NotFound(format!("Survey {} not found", survey.id))),
        }
    }
}

struct StoreTransaction {
    store: SurveyStore,
    pending_deletes: Vec<String>,
    _unit: OwnedMutexGuard<()>,
}

#[async_trait]
impl SurveyTransaction for StoreTransaction {
    async fn find_survey(&mut self, id: &str, tenant: &Tenant) -> Result<Option<Survey>> {
        if self.pending_deletes.iter().any(|p| p == id) {
            return Ok(None);
        }
        self.store.find(id, tenant).await
    }

    async fn delete_survey(
        &mut self,
        id: &str,
        tenant: &Tenant,
        user_id: &str,
        elevated: bool,
    ) -> Result<()> {
        self.store.inner.deletes.fetch_add(1, Ordering::SeqCst);
        if self.store.inner.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Internal(anyhow::anyhow!("store went away")));
        }
        let owned = self
            .find_survey(id, tenant)
            .await?
            .is_some_and(|s| elevated || s.creator_id == user_id);
        if !owned {
            return Err(AppError::NotFound(format!("Survey {} not found", id)));
        }
        self.pending_deletes.push(id.to_string());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut surveys = self.store.inner.surveys.write().await;
        for id in &self.pending_deletes {
            surveys.remove(id);
        }
        self.store.inner.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.store.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl TransactionManager for SurveyStore {
    async fn begin(&self) -> Result<Box<dyn SurveyTransaction>> {
        let unit = self.inner.unit.clone().lock_owned().await;
        Ok(Box::new(StoreTransaction {
            store: self.clone(),
            pending_deletes: Vec::new(),
            _unit: unit,
        }))
    }
}

// ============================================================================
// Survey responses
// ============================================================================

#[derive(Default)]
pub struct TestSurveyResponseRepository {
    responses: RwLock<Vec<SurveyResponse>>,
    list_delay: StdMutex<Option<Duration>>,
}

impl TestSurveyResponseRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, response: SurveyResponse) {
        self.responses.write().await.push(response);
    }

    pub async fn all(&self) -> Vec<SurveyResponse> {
        self.responses.read().await.clone()
    }

    /// Delay every `list` call, to simulate a slow store
    pub fn set_list_delay(&self, delay: Duration) {
        if let Ok(mut slot) = self.list_delay.lock() {
            *slot = Some(delay);
        }
    }

    fn owned(r: &SurveyResponse, id: &str, tenant: &Tenant, user_id: &str) -> bool {
        r.id == id && r.org_id == tenant.org_id && r.app_id == tenant.app_id && r.user_id == user_id
    }
}

#[async_trait]
impl SurveyResponseRepository for TestSurveyResponseRepository {
    async fn find(
        &self,
        id: &str,
        tenant: &Tenant,
        user_id: &str,
    ) -> Result<Option<SurveyResponse>> {
        Ok(self
            .responses
            .read()
            .await
            .iter()
            .find(|r| Self::owned(r, id, tenant, user_id))
            .cloned())
    }

    async fn list(&self, query: &SurveyResponseQuery) -> Result<Vec<SurveyResponse>> {
        let delay = self.list_delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut matched: Vec<SurveyResponse> = self
            .responses
            .read()
            .await
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.date_created.cmp(&a.date_created));
        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let limit = query.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn insert(&self, response: &SurveyResponse) -> Result<SurveyResponse> {
        self.add(response.clone()).await;
        Ok(response.clone())
    }

    async fn update(&self, response: &SurveyResponse) -> Result<()> {
        let tenant = Tenant::new(&response.org_id, &response.app_id);
        let mut responses = self.responses.write().await;
        match responses
            .iter_mut()
            .find(|r| Self::owned(r, &response.id, &tenant, &response.user_id))
        {
            Some(existing) => {
                *existing = response.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!(
                "Survey response {} not found",
                response.id
            ))),
        }
    }

    async fn delete(&self, id: &str, tenant: &Tenant, user_id: &str) -> Result<()> {
        let mut responses = self.responses.write().await;
        let before = responses.len();
        responses.retain(|r| !Self::owned(r, id, tenant, user_id));
        if responses.len() == before {
            return Err(AppError::NotFound(format!(
                "Survey response {} not found",
                id
            )));
        }
        Ok(())
    }

    async fn delete_many(&self, query: &SurveyResponseQuery) -> Result<u64> {
        let mut responses = self.responses.write().await;
        let before = responses.len();
        responses.retain(|r| !query.matches(r));
        Ok((before - responses.len()) as u64)
    }
}

// ============================================================================
// Configs
// ============================================================================

/// Pauses one `list` call after it has read the rows
#[derive(Clone, Default)]
pub struct ListHold {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[derive(Default)]
pub struct TestConfigRepository {
    rows: RwLock<Vec<ConfigRow>>,
    fail_list: AtomicBool,
    inserts: AtomicUsize,
    hold: StdMutex<Option<ListHold>>,
}

impl TestConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<ConfigRow>) -> Self {
        Self {
            rows: RwLock::new(rows),
            ..Default::default()
        }
    }

    pub async fn rows(&self) -> Vec<ConfigRow> {
        self.rows.read().await.clone()
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Make `list` fail until reset
    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Hold the next `list` call until `release` is notified
    pub fn hold_next_list(&self) -> ListHold {
        let hold = ListHold::default();
        if let Ok(mut slot) = self.hold.lock() {
            *slot = Some(hold.clone());
        }
        hold
    }
}

#[async_trait]
impl ConfigRepository for TestConfigRepository {
    async fn list(&self) -> Result<Vec<ConfigRow>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(AppError::Internal(anyhow::anyhow!("configs unavailable")));
        }
        let rows = self.rows.read().await.clone();
        let hold = self.hold.lock().ok().and_then(|mut slot| slot.take());
        if let Some(hold) = hold {
            hold.entered.notify_one();
            hold.release.notified().await;
        }
        Ok(rows)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ConfigRow>> {
        Ok(self.rows.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn find(
        &self,
        config_type: &str,
        app_id: &str,
        org_id: &str,
    ) -> Result<Option<ConfigRow>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|r| r.config_type == config_type && r.app_id == app_id && r.org_id == org_id)
            .cloned())
    }

    async fn insert(&self, row: &ConfigRow) -> Result<()> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.rows.write().await.push(row.clone());
        Ok(())
    }

    async fn update(&self, row: &ConfigRow) -> Result<()> {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|r| r.id == row.id) {
            Some(existing) => {
                *existing = row.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Config {} not found", row.id))),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.rows.write().await.retain(|r| r.id != id);
        Ok(())
    }
}

/// Counts publishes instead of refreshing anything
#[derive(Default)]
pub struct RecordingNotifier {
    publishes: AtomicUsize,
}

impl RecordingNotifier {
    pub fn publishes(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigChangeNotifier for RecordingNotifier {
    async fn publish(&self) -> Result<()> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Alert contacts and mail
// ============================================================================

#[derive(Default)]
pub struct TestAlertContactRepository {
    contacts: RwLock<Vec<AlertContact>>,
}

impl TestAlertContactRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, contact: AlertContact) {
        self.contacts.write().await.push(contact);
    }

    fn in_tenant(c: &AlertContact, tenant: &Tenant) -> bool {
        c.org_id == tenant.org_id && c.app_id == tenant.app_id
    }
}

#[async_trait]
impl AlertContactRepository for TestAlertContactRepository {
    async fn list(&self, tenant: &Tenant) -> Result<Vec<AlertContact>> {
        Ok(self
            .contacts
            .read()
            .await
            .iter()
            .filter(|c| Self::in_tenant(c, tenant))
            .cloned()
            .collect())
    }

    async fn find(&self, id: &str, tenant: &Tenant) -> Result<Option<AlertContact>> {
        Ok(self
            .contacts
            .read()
            .await
            .iter()
            .find(|c| c.id == id && Self::in_tenant(c, tenant))
            .cloned())
    }

    async fn find_by_key(&self, key: &str, tenant: &Tenant) -> Result<Vec<AlertContact>> {
        Ok(self
            .contacts
            .read()
            .await
            .iter()
            .filter(|c| c.key == key && Self::in_tenant(c, tenant))
            .cloned()
            .collect())
    }

    async fn insert(&self, contact: &AlertContact) -> Result<AlertContact> {
        self.add(contact.clone()).await;
        Ok(contact.clone())
    }

    async fn update(&self, contact: &AlertContact) -> Result<()> {
        let tenant = Tenant::new(&contact.org_id, &contact.app_id);
        let mut contacts = self.contacts.write().await;
        match contacts
            .iter_mut()
            .find(|c| c.id == contact.id && Self::in_tenant(c, &tenant))
        {
            Some(existing) => {
                *existing = contact.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!(
                "Alert contact {} not found",
                contact.id
            ))),
        }
    }

    async fn delete(&self, id: &str, tenant: &Tenant) -> Result<()> {
        let mut contacts = self.contacts.write().await;
        let before = contacts.len();
        contacts.retain(|c| !(c.id == id && Self::in_tenant(c, tenant)));
        if contacts.len() == before {
            return Err(AppError::NotFound(format!("Alert contact {} not found", id)));
        }
        Ok(())
    }
}

/// Records every mail it is asked to send
#[derive(Default)]
pub struct RecordingMailer {
    sent: StdMutex<Vec<(String, String, String)>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifications for RecordingMailer {
    async fn send_mail(&self, _tenant: &Tenant, to: &str, subject: &str, body: &str) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((to.to_string(), subject.to_string(), body.to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Calendar
// ============================================================================

/// Event client that answers from a fixed person list and counts calls
#[derive(Default)]
pub struct CountingEventClient {
    persons: StdMutex<Vec<EventPerson>>,
    calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl CountingEventClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_persons(persons: Vec<EventPerson>) -> Self {
        Self {
            persons: StdMutex::new(persons),
            ..Default::default()
        }
    }

    pub fn set_persons(&self, persons: Vec<EventPerson>) {
        if let Ok(mut slot) = self.persons.lock() {
            *slot = persons;
        }
    }

    /// Make every call fail as a transport error
    pub fn set_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventAccessClient for CountingEventClient {
    async fn get_event_persons(
        &self,
        _tenant: &Tenant,
        event_id: &str,
        _users: &[EventUser],
        filter: &EventPersonFilter,
    ) -> Result<Vec<EventPerson>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamUnavailable(format!(
                "calendar unreachable for event {}",
                event_id
            )));
        }
        let persons = self.persons.lock().map(|p| p.clone()).unwrap_or_default();
        Ok(persons
            .into_iter()
            .filter(|p| {
                filter.registered.is_none_or(|r| p.registered == r)
                    && filter.role.as_deref().is_none_or(|r| p.role == r)
                    && filter.attended.is_none_or(|a| p.attended == a)
            })
            .collect())
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub type TestAuthorization = AuthorizationResolver<CountingEventClient, TestConfigRepository>;

pub type TestSurveyService = SurveyService<
    SurveyStore,
    TestSurveyResponseRepository,
    CountingEventClient,
    TestConfigRepository,
    SurveyStore,
>;

/// Everything a survey service test needs to arrange and inspect
pub struct SurveyHarness {
    pub store: SurveyStore,
    pub responses: Arc<TestSurveyResponseRepository>,
    pub events: Arc<CountingEventClient>,
    pub configs: Arc<ConfigCache<TestConfigRepository>>,
    pub service: TestSurveyService,
}

impl SurveyHarness {
    pub async fn new(persons: Vec<EventPerson>) -> Self {
        Self::with_fanout_timeout(persons, Duration::from_secs(5)).await
    }

    pub async fn with_fanout_timeout(persons: Vec<EventPerson>, fanout_timeout: Duration) -> Self {
        let store = SurveyStore::new();
        let responses = Arc::new(TestSurveyResponseRepository::new());
        let events = Arc::new(CountingEventClient::with_persons(persons));
        let configs = Arc::new(ConfigCache::new(Arc::new(TestConfigRepository::with_rows(
            vec![env_row()],
        ))));
        configs
            .refresh_all()
            .await
            .expect("Failed to load test configs");
        let authorization = Arc::new(AuthorizationResolver::new(events.clone(), configs.clone()));
        let shared = Arc::new(store.clone());
        let service = SurveyService::new(
            shared.clone(),
            responses.clone(),
            authorization,
            shared,
            fanout_timeout,
        );
        Self {
            store,
            responses,
            events,
            configs,
            service,
        }
    }
}
