//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diagnostic_core::domain::{
    Diagnostic, DiagnosticDetail, DiagnosticFilter, NewAnswer, NewDiagnostic, NewUser, Page,
    Subscription, SubscriptionStatus, User, UserCredentials, UserFilter, UserUpdate,
};
use diagnostic_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(what: String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn corrupt(e: impl std::fmt::Display) -> PortError {
    PortError::Unexpected(format!("corrupt row: {}", e))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str =
    "id, email, name, role, status, diagnostics_limit, current_plan_id, created_at, updated_at";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    name: Option<String>,
    role: String,
    status: String,
    diagnostics_limit: Option<i32>,
    current_plan_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> PortResult<User> {
        Ok(User {
            id: self.id,
            email: self.email,
            name: self.name,
            role: self.role.parse().map_err(corrupt)?,
            status: self.status.parse().map_err(corrupt)?,
            diagnostics_limit: self.diagnostics_limit,
            current_plan_id: self.current_plan_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    #[sqlx(flatten)]
    user: UserRecord,
    password: Option<String>,
}

#[derive(FromRow)]
struct SubscriptionRecord {
    id: Uuid,
    user_id: Uuid,
    plan_id: Uuid,
    status: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
}
impl SubscriptionRecord {
    fn to_domain(self) -> PortResult<Subscription> {
        Ok(Subscription {
            id: self.id,
            user_id: self.user_id,
            plan_id: self.plan_id,
            status: self.status.parse().map_err(corrupt)?,
            start_date: self.start_date,
            end_date: self.end_date,
        })
    }
}

const DIAGNOSTIC_COLUMNS: &str = "id, user_id, company_name, analysis_period, status, \
     general_score, strategic_reading, pdf_report_url, realization_date, created_at, updated_at";

#[derive(FromRow)]
struct DiagnosticRecord {
    id: Uuid,
    user_id: Uuid,
    company_name: String,
    analysis_period: String,
    status: String,
    general_score: Option<i32>,
    strategic_reading: Option<String>,
    pdf_report_url: Option<String>,
    realization_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl DiagnosticRecord {
    fn to_domain(self) -> PortResult<Diagnostic> {
        Ok(Diagnostic {
            id: self.id,
            user_id: self.user_id,
            company_name: self.company_name,
            analysis_period: self.analysis_period.parse().map_err(corrupt)?,
            status: self.status.parse().map_err(corrupt)?,
            general_score: self.general_score,
            strategic_reading: self.strategic_reading,
            pdf_report_url: self.pdf_report_url,
            realization_date: self.realization_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Answers of one diagnostic, by area and then in the order they were submitted.
const DETAILS_QUERY: &str = "SELECT id, diagnostic_id, area, question, answer, ai_feedback, created_at \
     FROM diagnostic_details WHERE diagnostic_id = $1 ORDER BY area ASC, position ASC";

#[derive(FromRow)]
struct DetailRecord {
    id: Uuid,
    diagnostic_id: Uuid,
    area: String,
    question: String,
    answer: String,
    ai_feedback: Option<String>,
    created_at: DateTime<Utc>,
}
impl DetailRecord {
    fn to_domain(self) -> DiagnosticDetail {
        DiagnosticDetail {
            id: self.id,
            diagnostic_id: self.diagnostic_id,
            area: self.area,
            question: self.question,
            answer: self.answer,
            ai_feedback: self.ai_feedback,
            created_at: self.created_at,
        }
    }
}

fn collect<R, T>(records: Vec<R>, f: impl Fn(R) -> PortResult<T>) -> PortResult<Vec<T>> {
    records.into_iter().map(f).collect()
}

//=========================================================================================
// Dynamic filters
//=========================================================================================

fn push_user_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    qb.push(" WHERE TRUE");
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        qb.push(" AND email ILIKE ")
            .push_bind(format!("%{}%", search.trim()));
    }
}

fn push_diagnostic_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &DiagnosticFilter) {
    qb.push(" WHERE TRUE");
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(start) = filter.start_date {
        qb.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = filter.end_date {
        qb.push(" AND created_at <= ").push_bind(end);
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let sql = format!(
            "INSERT INTO users (id, email, name, password, diagnostics_limit) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new_user.email)
            .bind(&new_user.name)
            .bind(&new_user.password_hash)
            .bind(new_user.diagnostics_limit)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    PortError::Conflict("Email already registered".to_string())
                } else {
                    unexpected(e)
                }
            })?;
        record.to_domain()
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or_unexpected(format!("User {} not found", user_id)))?
            .to_domain()
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let sql = format!("SELECT {USER_COLUMNS}, password FROM users WHERE email = $1");
        let record = sqlx::query_as::<_, CredentialsRecord>(&sql)
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or_unexpected(format!("User {} not found", email)))?;
        Ok(UserCredentials {
            user: record.user.to_domain()?,
            password: record.password,
        })
    }

    async fn list_users(&self, filter: &UserFilter) -> PortResult<Page<User>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_user_filter(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_user_filter(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(i64::from(filter.page.limit))
            .push(" OFFSET ")
            .push_bind(filter.page.offset());
        let records = select
            .build_query_as::<UserRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        Ok(Page {
            items: collect(records, UserRecord::to_domain)?,
            total,
        })
    }

    async fn update_user(&self, user_id: Uuid, update: UserUpdate) -> PortResult<User> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET updated_at = NOW()");
        if let Some(email) = update.email {
            qb.push(", email = ").push_bind(email);
        }
        if let Some(name) = update.name {
            qb.push(", name = ").push_bind(name);
        }
        if let Some(role) = update.role {
            qb.push(", role = ").push_bind(role.as_str());
        }
        if let Some(status) = update.status {
            qb.push(", status = ").push_bind(status.as_str());
        }
        if let Some(limit) = update.diagnostics_limit {
            qb.push(", diagnostics_limit = ").push_bind(limit);
        }
        if let Some(password) = update.password_hash {
            qb.push(", password = ").push_bind(password);
        }
        qb.push(" WHERE id = ")
            .push_bind(user_id)
            .push(format!(" RETURNING {USER_COLUMNS}"));

        qb.build_query_as::<UserRecord>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
                e if is_unique_violation(&e) => {
                    PortError::Conflict("Email already registered".to_string())
                }
                e => unexpected(e),
            })?
            .to_domain()
    }

    async fn get_user_emails(&self, user_ids: &[Uuid]) -> PortResult<HashMap<Uuid, String>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Uuid, String)> =
            sqlx::query_as("SELECT id, email FROM users WHERE id = ANY($1)")
                .bind(user_ids)
                .fetch_all(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(rows.into_iter().collect())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        user_id.ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn latest_active_subscription(&self, user_id: Uuid) -> PortResult<Option<Subscription>> {
        let record = sqlx::query_as::<_, SubscriptionRecord>(
            "SELECT id, user_id, plan_id, status, start_date, end_date FROM user_subscriptions \
             WHERE user_id = $1 AND status = $2 ORDER BY end_date DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(SubscriptionStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(SubscriptionRecord::to_domain).transpose()
    }

    async fn mark_subscription_expired(&self, subscription_id: Uuid) -> PortResult<()> {
        sqlx::query("UPDATE user_subscriptions SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(SubscriptionStatus::Expired.as_str())
            .bind(subscription_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn create_diagnostic(
        &self,
        user_id: Uuid,
        diagnostic: NewDiagnostic,
    ) -> PortResult<Diagnostic> {
        let sql = format!(
            "INSERT INTO diagnostics (id, user_id, company_name, analysis_period) \
             VALUES ($1, $2, $3, $4) RETURNING {DIAGNOSTIC_COLUMNS}"
        );
        sqlx::query_as::<_, DiagnosticRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(&diagnostic.company_name)
            .bind(diagnostic.analysis_period.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?
            .to_domain()
    }

    async fn get_diagnostic(&self, diagnostic_id: Uuid) -> PortResult<Diagnostic> {
        let sql = format!("SELECT {DIAGNOSTIC_COLUMNS} FROM diagnostics WHERE id = $1");
        sqlx::query_as::<_, DiagnosticRecord>(&sql)
            .bind(diagnostic_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or_unexpected(format!(
                "Diagnostic {} not found",
                diagnostic_id
            )))?
            .to_domain()
    }

    async fn list_user_diagnostics(&self, user_id: Uuid) -> PortResult<Vec<Diagnostic>> {
        let sql = format!(
            "SELECT {DIAGNOSTIC_COLUMNS} FROM diagnostics WHERE user_id = $1 ORDER BY created_at DESC"
        );
        let records = sqlx::query_as::<_, DiagnosticRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        collect(records, DiagnosticRecord::to_domain)
    }

    async fn list_diagnostics(&self, filter: &DiagnosticFilter) -> PortResult<Page<Diagnostic>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM diagnostics");
        push_diagnostic_filter(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {DIAGNOSTIC_COLUMNS} FROM diagnostics"));
        push_diagnostic_filter(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(i64::from(filter.page.limit))
            .push(" OFFSET ")
            .push_bind(filter.page.offset());
        let records = select
            .build_query_as::<DiagnosticRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        Ok(Page {
            items: collect(records, DiagnosticRecord::to_domain)?,
            total,
        })
    }

    async fn count_user_diagnostics(
        &self,
        user_id: Uuid,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> PortResult<i64> {
        let query = match window {
            Some((start, end)) => sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM diagnostics \
                 WHERE user_id = $1 AND created_at >= $2 AND created_at <= $3",
            )
            .bind(user_id)
            .bind(start)
            .bind(end),
            None => sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM diagnostics WHERE user_id = $1")
                .bind(user_id),
        };
        query.fetch_one(&self.pool).await.map_err(unexpected)
    }

    async fn complete_diagnostic(
        &self,
        diagnostic_id: Uuid,
        general_score: i32,
        strategic_reading: &str,
        realized_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE diagnostics SET general_score = $1, strategic_reading = $2, status = 'completed', \
             realization_date = $3, updated_at = NOW() WHERE id = $4",
        )
        .bind(general_score)
        .bind(strategic_reading)
        .bind(realized_at)
        .bind(diagnostic_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Diagnostic {} not found",
                diagnostic_id
            )));
        }
        Ok(())
    }

    async fn replace_answers(
        &self,
        diagnostic_id: Uuid,
        answers: Vec<NewAnswer>,
    ) -> PortResult<usize> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query("DELETE FROM diagnostic_details WHERE diagnostic_id = $1")
            .bind(diagnostic_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        let inserted = answers.len();
        if !answers.is_empty() {
            let mut qb = QueryBuilder::<Postgres>::new(
                "INSERT INTO diagnostic_details (id, diagnostic_id, area, question, answer, position) ",
            );
            qb.push_values(
                answers.into_iter().enumerate(),
                |mut row, (position, answer)| {
                    row.push_bind(Uuid::new_v4())
                        .push_bind(diagnostic_id)
                        .push_bind(answer.area.as_str())
                        .push_bind(answer.question)
                        .push_bind(answer.answer)
                        .push_bind(position as i32);
                },
            );
            qb.build().execute(&mut *tx).await.map_err(unexpected)?;
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(inserted)
    }

    async fn get_details(&self, diagnostic_id: Uuid) -> PortResult<Vec<DiagnosticDetail>> {
        let records = sqlx::query_as::<_, DetailRecord>(DETAILS_QUERY)
            .bind(diagnostic_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(DetailRecord::to_domain).collect())
    }

    async fn set_area_feedback(
        &self,
        diagnostic_id: Uuid,
        area: &str,
        feedback: &str,
    ) -> PortResult<u64> {
        let result = sqlx::query(
            "UPDATE diagnostic_details SET ai_feedback = $1 \
             WHERE diagnostic_id = $2 AND LOWER(area) = LOWER($3)",
        )
        .bind(feedback)
        .bind(diagnostic_id)
        .bind(area)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected())
    }
}
