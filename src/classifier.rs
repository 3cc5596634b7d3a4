// Response and transport error classification
// Decides whether the pipeline returns, refreshes, retries, or surfaces

use reqwest::StatusCode;

use crate::error::{TransportError, TransportErrorKind};
use crate::models::ApiResponse;

/// How the pipeline should treat an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Return the response to the caller
    Ok,
    /// The token was rejected: refresh once and retry
    AuthFailure,
    /// Safe to retry with backoff
    Transient,
    /// Surface immediately
    Fatal,
}

/// Maps responses and transport errors to a [`Classification`]
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    /// Treat 403 like 401 (some APIs answer 403 for expired tokens)
    refresh_on_forbidden: bool,
}

impl ErrorClassifier {
    pub fn new(refresh_on_forbidden: bool) -> Self {
        Self {
            refresh_on_forbidden,
        }
    }

    /// Classify a status code alone
    pub fn classify_status(&self, status: StatusCode) -> Classification {
        match status.as_u16() {
            200..=299 => Classification::Ok,
            401 => Classification::AuthFailure,
            403 if self.refresh_on_forbidden => Classification::AuthFailure,
            408 | 429 => Classification::Transient,
            500..=599 => Classification::Transient,
            _ => Classification::Fatal,
        }
    }

    /// Classify a full response, including a malformed-body check on success
    pub fn classify(&self, response: &ApiResponse) -> Classification {
        let class = self.classify_status(response.status());
        if class == Classification::Ok && is_malformed_json(response) {
            tracing::warn!(
                status = %response.status(),
                "Response announces JSON but the body does not parse"
            );
            return Classification::Fatal;
        }
        class
    }

    /// Classify a failure that produced no response
    pub fn classify_error(&self, error: &TransportError) -> Classification {
        match error.kind {
            TransportErrorKind::Builder => Classification::Fatal,
            _ => Classification::Transient,
        }
    }
}

fn is_malformed_json(response: &ApiResponse) -> bool {
    if !response.is_json() {
        return false;
    }
    let body = response.body();
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return false;
    }
    serde_json::from_slice::<serde::de::IgnoredAny>(body).is_err()
}

/// Pull a human-readable error message out of an error body
///
/// Looks at `error` (string), `error.message`, `message` and
/// `error_description`, falling back to the raw text.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let candidates = [
            json.get("error").and_then(|v| v.as_str()),
            json.get("error")
                .and_then(|v| v.get("message"))
                .and_then(|v| v.as_str()),
            json.get("message").and_then(|v| v.as_str()),
            json.get("error_description").and_then(|v| v.as_str()),
        ];
        if let Some(msg) = candidates.into_iter().flatten().next() {
            return msg.to_string();
        }
    }
    body.trim().to_string()
}
