//! crates/diagnostic_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or web framework.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Quota applied when a user row carries no explicit `diagnostics_limit`.
pub const DEFAULT_DIAGNOSTICS_LIMIT: i32 = 4;

/// Error returned when a stored or submitted enum value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Generates `as_str`, `Display` and `FromStr` for a snake_case string enum.
macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(UnknownVariant::new($kind, s)),
                }
            }
        }
    };
}

//=========================================================================================
// Users
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}
string_enum!(UserRole, "role", { User => "user", Admin => "admin" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Inactive,
    Blocked,
}
string_enum!(UserStatus, "user status", {
    Active => "active",
    Inactive => "inactive",
    Blocked => "blocked",
});

/// Represents a user - used throughout the app. Never carries the password.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    pub diagnostics_limit: Option<i32>,
    pub current_plan_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// The quota that applies to this user, falling back to the platform default.
    pub fn effective_limit(&self) -> i32 {
        self.diagnostics_limit.unwrap_or(DEFAULT_DIAGNOSTICS_LIMIT)
    }

    /// Admin routes require an admin role on an active account.
    pub fn is_active_admin(&self) -> bool {
        self.role == UserRole::Admin && self.status == UserStatus::Active
    }
}

// Only used internally for login - contains the stored password.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password: Option<String>,
}

/// Fields accepted when registering a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub diagnostics_limit: i32,
}

/// Partial update applied by an administrator. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<String>,
    /// `Some(None)` clears the name.
    pub name: Option<Option<String>>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    pub diagnostics_limit: Option<i32>,
    pub password_hash: Option<String>,
}

//=========================================================================================
// Subscriptions
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}
string_enum!(SubscriptionStatus, "subscription status", {
    Active => "active",
    Expired => "expired",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

//=========================================================================================
// Diagnostics
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticStatus {
    Pending,
    Completed,
    Failed,
}
string_enum!(DiagnosticStatus, "diagnostic status", {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
});

/// The relative window of business activity a diagnostic looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisPeriod {
    LastWeek,
    LastMonth,
    LastQuarter,
    LastSemester,
    LastYear,
}
string_enum!(AnalysisPeriod, "analysis period", {
    LastWeek => "last_week",
    LastMonth => "last_month",
    LastQuarter => "last_quarter",
    LastSemester => "last_semester",
    LastYear => "last_year",
});

impl AnalysisPeriod {
    pub fn label(&self) -> &'static str {
        match self {
            Self::LastWeek => "Last week",
            Self::LastMonth => "Last month",
            Self::LastQuarter => "Last quarter",
            Self::LastSemester => "Last semester",
            Self::LastYear => "Last year",
        }
    }
}

/// One of the six fixed questionnaire categories, in questionnaire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Area {
    Revenue,
    Sales,
    Marketing,
    Processes,
    Tools,
    Challenges,
}
string_enum!(Area, "area", {
    Revenue => "revenue",
    Sales => "sales",
    Marketing => "marketing",
    Processes => "processes",
    Tools => "tools",
    Challenges => "challenges",
});

impl Area {
    pub const ALL: [Area; 6] = [
        Area::Revenue,
        Area::Sales,
        Area::Marketing,
        Area::Processes,
        Area::Tools,
        Area::Challenges,
    ];
}

/// Represents one questionnaire submission and, once generated, its report.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_name: String,
    pub analysis_period: AnalysisPeriod,
    pub status: DiagnosticStatus,
    pub general_score: Option<i32>,
    pub strategic_reading: Option<String>,
    pub pdf_report_url: Option<String>,
    pub realization_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDiagnostic {
    pub company_name: String,
    pub analysis_period: AnalysisPeriod,
}

/// A single stored answer of a diagnostic.
#[derive(Debug, Clone)]
pub struct DiagnosticDetail {
    pub id: Uuid,
    pub diagnostic_id: Uuid,
    pub area: String,
    pub question: String,
    pub answer: String,
    pub ai_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An answer as submitted by the client, before it is stored.
#[derive(Debug, Clone)]
pub struct NewAnswer {
    pub area: Area,
    pub question: String,
    pub answer: String,
}

//=========================================================================================
// Listing
//=========================================================================================

/// A page of results plus the total number of matching rows.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const MAX_LIMIT: u32 = 100;

    /// Builds a page request from raw query values, applying defaults and bounds.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(10).clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        let limit = i64::from(self.limit);
        (total + limit - 1) / limit
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub search: Option<String>,
    pub page: PageRequest,
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticFilter {
    pub status: Option<DiagnosticStatus>,
    pub user_id: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: PageRequest,
}
