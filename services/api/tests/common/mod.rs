#![allow(dead_code)]

use api_lib::config::Config;
use api_lib::web::auth::hash_password;
use api_lib::web::build_router;
use api_lib::web::state::AppState;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Request, StatusCode};
use chrono::{DateTime, Utc};
use diagnostic_core::domain::{
    AnalysisPeriod, Diagnostic, DiagnosticDetail, DiagnosticFilter, DiagnosticStatus, NewAnswer,
    NewDiagnostic, NewUser, Page, Subscription, SubscriptionStatus, User, UserCredentials,
    UserFilter, UserRole, UserStatus, UserUpdate,
};
use diagnostic_core::ports::{
    DatabaseService, PdfRenderingService, PortError, PortResult, ReportGenerationService,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;
use uuid::Uuid;

//=========================================================================================
// In-memory database
//=========================================================================================

#[derive(Default)]
pub struct Store {
    pub users: Vec<(User, Option<String>)>,
    pub sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    pub subscriptions: Vec<Subscription>,
    pub diagnostics: Vec<Diagnostic>,
    pub details: Vec<DiagnosticDetail>,
}

#[derive(Default)]
pub struct MemoryDb {
    pub store: Mutex<Store>,
}

impl MemoryDb {
    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().expect("store lock poisoned")
    }

    pub fn diagnostic(&self, id: Uuid) -> Diagnostic {
        self.lock()
            .diagnostics
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .expect("diagnostic should exist")
    }

    pub fn details(&self, id: Uuid) -> Vec<DiagnosticDetail> {
        self.lock()
            .details
            .iter()
            .filter(|d| d.diagnostic_id == id)
            .cloned()
            .collect()
    }

    pub fn subscription(&self, id: Uuid) -> Subscription {
        self.lock()
            .subscriptions
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .expect("subscription should exist")
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }
}

fn page_of<T: Clone>(items: Vec<T>, page: diagnostic_core::PageRequest) -> Page<T> {
    let total = items.len() as i64;
    let items = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect();
    Page { items, total }
}

#[async_trait]
impl DatabaseService for MemoryDb {
    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let mut store = self.lock();
        if store.users.iter().any(|(u, _)| u.email == new_user.email) {
            return Err(PortError::Conflict("Email already registered".into()));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            name: new_user.name,
            role: UserRole::User,
            status: UserStatus::Active,
            diagnostics_limit: Some(new_user.diagnostics_limit),
            current_plan_id: None,
            created_at: now,
            updated_at: now,
        };
        store
            .users
            .push((user.clone(), Some(new_user.password_hash)));
        Ok(user)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        self.lock()
            .users
            .iter()
            .find(|(u, _)| u.id == user_id)
            .map(|(u, _)| u.clone())
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.lock()
            .users
            .iter()
            .find(|(u, _)| u.email == email)
            .map(|(u, p)| UserCredentials {
                user: u.clone(),
                password: p.clone(),
            })
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn list_users(&self, filter: &UserFilter) -> PortResult<Page<User>> {
        let mut users: Vec<User> = self
            .lock()
            .users
            .iter()
            .map(|(u, _)| u.clone())
            .filter(|u| match &filter.search {
                Some(s) => u.email.to_lowercase().contains(&s.to_lowercase()),
                None => true,
            })
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page_of(users, filter.page))
    }

    async fn update_user(&self, user_id: Uuid, update: UserUpdate) -> PortResult<User> {
        let mut store = self.lock();
        if let Some(email) = &update.email {
            if store
                .users
                .iter()
                .any(|(u, _)| &u.email == email && u.id != user_id)
            {
                return Err(PortError::Conflict("Email already registered".into()));
            }
        }
        let (user, password) = store
            .users
            .iter_mut()
            .find(|(u, _)| u.id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        if let Some(email) = update.email {
            user.email = email;
        }
        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(status) = update.status {
            user.status = status;
        }
        if let Some(limit) = update.diagnostics_limit {
            user.diagnostics_limit = Some(limit);
        }
        if let Some(hash) = update.password_hash {
            *password = Some(hash);
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn get_user_emails(&self, user_ids: &[Uuid]) -> PortResult<HashMap<Uuid, String>> {
        Ok(self
            .lock()
            .users
            .iter()
            .filter(|(u, _)| user_ids.contains(&u.id))
            .map(|(u, _)| (u.id, u.email.clone()))
            .collect())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.lock()
            .sessions
            .insert(session_id.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        match self.lock().sessions.get(session_id) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => Ok(*user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.lock().sessions.remove(session_id);
        Ok(())
    }

    async fn latest_active_subscription(&self, user_id: Uuid) -> PortResult<Option<Subscription>> {
        Ok(self
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id && s.status == SubscriptionStatus::Active)
            .max_by_key(|s| s.end_date)
            .cloned())
    }

    async fn mark_subscription_expired(&self, subscription_id: Uuid) -> PortResult<()> {
        if let Some(s) = self
            .lock()
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id)
        {
            s.status = SubscriptionStatus::Expired;
        }
        Ok(())
    }

    async fn create_diagnostic(
        &self,
        user_id: Uuid,
        diagnostic: NewDiagnostic,
    ) -> PortResult<Diagnostic> {
        let now = Utc::now();
        let d = Diagnostic {
            id: Uuid::new_v4(),
            user_id,
            company_name: diagnostic.company_name,
            analysis_period: diagnostic.analysis_period,
            status: DiagnosticStatus::Pending,
            general_score: None,
            strategic_reading: None,
            pdf_report_url: None,
            realization_date: None,
            created_at: now,
            updated_at: now,
        };
        self.lock().diagnostics.push(d.clone());
        Ok(d)
    }

    async fn get_diagnostic(&self, diagnostic_id: Uuid) -> PortResult<Diagnostic> {
        self.lock()
            .diagnostics
            .iter()
            .find(|d| d.id == diagnostic_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Diagnostic {} not found", diagnostic_id)))
    }

    async fn list_user_diagnostics(&self, user_id: Uuid) -> PortResult<Vec<Diagnostic>> {
        let mut list: Vec<Diagnostic> = self
            .lock()
            .diagnostics
            .iter()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn list_diagnostics(&self, filter: &DiagnosticFilter) -> PortResult<Page<Diagnostic>> {
        let mut list: Vec<Diagnostic> = self
            .lock()
            .diagnostics
            .iter()
            .filter(|d| filter.status.map_or(true, |s| d.status == s))
            .filter(|d| filter.user_id.map_or(true, |u| d.user_id == u))
            .filter(|d| filter.start_date.map_or(true, |s| d.created_at >= s))
            .filter(|d| filter.end_date.map_or(true, |e| d.created_at <= e))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page_of(list, filter.page))
    }

    async fn count_user_diagnostics(
        &self,
        user_id: Uuid,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> PortResult<i64> {
        Ok(self
            .lock()
            .diagnostics
            .iter()
            .filter(|d| d.user_id == user_id)
            .filter(|d| match window {
                Some((start, end)) => d.created_at >= start && d.created_at <= end,
                None => true,
            })
            .count() as i64)
    }

    async fn complete_diagnostic(
        &self,
        diagnostic_id: Uuid,
        general_score: i32,
        strategic_reading: &str,
        realized_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut store = self.lock();
        let d = store
            .diagnostics
            .iter_mut()
            .find(|d| d.id == diagnostic_id)
            .ok_or_else(|| PortError::NotFound(format!("Diagnostic {} not found", diagnostic_id)))?;
        d.general_score = Some(general_score);
        d.strategic_reading = Some(strategic_reading.to_string());
        d.status = DiagnosticStatus::Completed;
        d.realization_date = Some(realized_at);
        d.updated_at = Utc::now();
        Ok(())
    }

    async fn replace_answers(
        &self,
        diagnostic_id: Uuid,
        answers: Vec<NewAnswer>,
    ) -> PortResult<usize> {
        let mut store = self.lock();
        store.details.retain(|d| d.diagnostic_id != diagnostic_id);
        let count = answers.len();
        for answer in answers {
            store.details.push(DiagnosticDetail {
                id: Uuid::new_v4(),
                diagnostic_id,
                area: answer.area.as_str().to_string(),
                question: answer.question,
                answer: answer.answer,
                ai_feedback: None,
                created_at: Utc::now(),
            });
        }
        Ok(count)
    }

    async fn get_details(&self, diagnostic_id: Uuid) -> PortResult<Vec<DiagnosticDetail>> {
        let mut details = self.details(diagnostic_id);
        details.sort_by(|a, b| a.area.cmp(&b.area));
        Ok(details)
    }

    async fn set_area_feedback(
        &self,
        diagnostic_id: Uuid,
        area: &str,
        feedback: &str,
    ) -> PortResult<u64> {
        let mut touched = 0;
        for d in self
            .lock()
            .details
            .iter_mut()
            .filter(|d| d.diagnostic_id == diagnostic_id && d.area.eq_ignore_ascii_case(area))
        {
            d.ai_feedback = Some(feedback.to_string());
            touched += 1;
        }
        Ok(touched)
    }
}

//=========================================================================================
// Fake outbound services
//=========================================================================================

/// Returns a canned reply, or fails with an upstream message.
pub struct FakeAi {
    pub reply: Mutex<Result<String, String>>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeAi {
    pub fn new() -> Self {
        Self {
            reply: Mutex::new(Ok(VALID_REPORT.to_string())),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn reply_with(&self, text: &str) {
        *self.reply.lock().unwrap() = Ok(text.to_string());
    }

    pub fn fail_with(&self, message: &str) {
        *self.reply.lock().unwrap() = Err(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ReportGenerationService for FakeAi {
    fn provider(&self) -> &str {
        "fake"
    }

    async fn generate_report_text(&self, prompt: &str) -> PortResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply
            .lock()
            .unwrap()
            .clone()
            .map_err(PortError::Upstream)
    }
}

#[derive(Default)]
pub struct FakePdf {
    pub last_html: Mutex<Option<String>>,
}

pub const FAKE_PDF: &[u8] = b"%PDF-1.7 fake";

#[async_trait]
impl PdfRenderingService for FakePdf {
    async fn render_pdf(&self, html: &str) -> PortResult<Vec<u8>> {
        *self.last_html.lock().unwrap() = Some(html.to_string());
        Ok(FAKE_PDF.to_vec())
    }
}

pub const VALID_REPORT: &str = r#"{
    "general_score": 72.4,
    "strategic_reading": "Strong product, weak funnel.",
    "priorities": [{"title": "Adopt a CRM", "description": "Track every lead", "impact": "high"}],
    "bottlenecks": [],
    "charts_data": {
        "areas": [{"name": "Sales", "score": 55}, {"name": "tools", "score": 40}],
        "revenue_impact": {"current": 10000, "potential": 15000, "gap": 5000}
    },
    "lost_revenue_indicators": []
}"#;

//=========================================================================================
// Test context
//=========================================================================================

pub struct TestContext {
    pub app: axum::Router,
    pub db: Arc<MemoryDb>,
    pub ai: Arc<FakeAi>,
    pub pdf: Arc<FakePdf>,
}

pub fn build_test_context() -> TestContext {
    build_context(true)
}

pub fn build_test_context_without_pdf() -> TestContext {
    build_context(false)
}

fn build_context(with_pdf: bool) -> TestContext {
    let db = Arc::new(MemoryDb::default());
    let ai = Arc::new(FakeAi::new());
    let pdf = Arc::new(FakePdf::default());
    let state = Arc::new(AppState {
        db: db.clone(),
        config: Arc::new(Config::default()),
        report_adapter: ai.clone(),
        pdf_adapter: if with_pdf {
            Some(pdf.clone() as Arc<dyn PdfRenderingService>)
        } else {
            None
        },
    });
    let app = build_router(state).expect("router should build");
    TestContext { app, db, ai, pdf }
}

//=========================================================================================
// Seeding
//=========================================================================================

pub fn seed_user(
    db: &MemoryDb,
    email: &str,
    password: &str,
    role: UserRole,
    status: UserStatus,
    diagnostics_limit: Option<i32>,
) -> User {
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        name: None,
        role,
        status,
        diagnostics_limit,
        current_plan_id: None,
        created_at: now,
        updated_at: now,
    };
    let hash = hash_password(password).expect("password should hash");
    db.store
        .lock()
        .unwrap()
        .users
        .push((user.clone(), Some(hash)));
    user
}

pub fn seed_diagnostic(db: &MemoryDb, user_id: Uuid, created_at: DateTime<Utc>) -> Diagnostic {
    let d = Diagnostic {
        id: Uuid::new_v4(),
        user_id,
        company_name: "Seeded Co".into(),
        analysis_period: AnalysisPeriod::LastMonth,
        status: DiagnosticStatus::Pending,
        general_score: None,
        strategic_reading: None,
        pdf_report_url: None,
        realization_date: None,
        created_at,
        updated_at: created_at,
    };
    db.store.lock().unwrap().diagnostics.push(d.clone());
    d
}

pub fn seed_subscription(
    db: &MemoryDb,
    user_id: Uuid,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
) -> Subscription {
    let s = Subscription {
        id: Uuid::new_v4(),
        user_id,
        plan_id: Uuid::new_v4(),
        status: SubscriptionStatus::Active,
        start_date,
        end_date,
    };
    db.store.lock().unwrap().subscriptions.push(s.clone());
    s
}

//=========================================================================================
// Requests
//=========================================================================================

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        if self.bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&self.bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&self.bytes).to_string())
            })
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }

    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let req = builder.body(body).expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read")
        .to_vec();

    TestResponse {
        status,
        headers,
        bytes,
    }
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let resp = send(app, method, uri, cookie, body).await;
    (resp.status, resp.json())
}

/// Logs in and returns the `Cookie` header value for later requests.
pub async fn login(app: &axum::Router, email: &str, password: &str) -> String {
    let resp = send(
        app,
        "POST",
        "/auth/login",
        None,
        Some(serde_json::json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(resp.status, StatusCode::OK, "login failed: {}", resp.text());
    let set_cookie = resp
        .header(header::SET_COOKIE)
        .expect("login should set a cookie");
    set_cookie
        .split(';')
        .next()
        .expect("cookie should have a value")
        .to_string()
}

/// Seeds an active user and logs them in.
pub async fn user_session(ctx: &TestContext, email: &str, limit: Option<i32>) -> (User, String) {
    let user = seed_user(&ctx.db, email, "secret123", UserRole::User, UserStatus::Active, limit);
    let cookie = login(&ctx.app, email, "secret123").await;
    (user, cookie)
}

pub async fn admin_session(ctx: &TestContext) -> (User, String) {
    let admin = seed_user(
        &ctx.db,
        "admin@example.com",
        "secret123",
        UserRole::Admin,
        UserStatus::Active,
        None,
    );
    let cookie = login(&ctx.app, "admin@example.com", "secret123").await;
    (admin, cookie)
}
