//! Concrete context sources backed by external HTTP services.

pub mod academic;
pub mod local;
pub mod web;

pub use academic::AcademicLiteratureSource;
pub use local::LocalKnowledgeSource;
pub use web::TrustedWebSource;

use clinq_core::error::RetrievalError;
use std::time::Duration;

/// Shared client settings for search backends.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

pub(crate) fn map_send_error(e: reqwest::Error) -> RetrievalError {
    RetrievalError::Network(e.to_string())
}

/// Map non-success statuses to retrieval errors. 429 and the
/// plan-limit statuses some search vendors use count as quota exhaustion.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, RetrievalError> {
    let status = response.status().as_u16();
    if response.status().is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        429 | 432 | 433 => Err(RetrievalError::QuotaExhausted(body)),
        _ => Err(RetrievalError::Http {
            status_code: status,
            message: body,
        }),
    }
}

/// Truncate on a char boundary, appending an ellipsis when cut.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}
