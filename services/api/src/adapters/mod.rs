pub mod db;
pub mod gemini;
pub mod openai_report;
pub mod pdf;

pub use db::DbAdapter;
pub use gemini::GeminiReportAdapter;
pub use openai_report::OpenAiReportAdapter;
pub use pdf::HttpPdfAdapter;
