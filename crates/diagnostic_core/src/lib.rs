pub mod domain;
pub mod pipeline;
pub mod ports;
pub mod questions;
pub mod quota;
pub mod report;

pub use domain::{
    AnalysisPeriod, Area, Diagnostic, DiagnosticDetail, DiagnosticFilter,
    DiagnosticStatus, NewAnswer, NewDiagnostic, NewUser, Page, PageRequest, Subscription,
    SubscriptionStatus, User, UserCredentials, UserFilter, UserRole, UserStatus, UserUpdate,
};
pub use pipeline::{generate_report, ReportError};
pub use ports::{
    DatabaseService, PdfRenderingService, PortError, PortResult, ReportGenerationService,
};
pub use quota::{check_quota, subscription_info, QuotaDecision, SubscriptionInfo};
pub use report::DiagnosticReport;
