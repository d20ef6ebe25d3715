//! services/api/src/bin/openapi.rs
//!
//! Writes the REST API's OpenAPI document to disk, the same document the server
//! serves at `/api-docs/openapi.json`.
//!
//! Usage: `openapi [OUTPUT]` (defaults to `openapi.json`).

use api_lib::{error::ApiError, web::rest::ApiDoc};
use utoipa::OpenApi;

const DEFAULT_OUTPUT: &str = "openapi.json";

fn main() -> Result<(), ApiError> {
    let output = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());

    let doc = ApiDoc::openapi();
    let json = doc
        .to_pretty_json()
        .map_err(|e| ApiError::Internal(format!("Failed to serialize OpenAPI document: {}", e)))?;
    std::fs::write(&output, json)?;

    println!(
        "Wrote {} documented paths for {} v{} to {}",
        doc.paths.paths.len(),
        doc.info.title,
        doc.info.version,
        output
    );
    Ok(())
}
