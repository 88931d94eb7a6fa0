//! HTTP request handlers for the intercom service.

pub mod health;
pub mod metrics;
pub mod productions;
pub mod sessions;
pub mod whip;

pub use health::health_check;
pub use metrics::metrics_handler;

use crate::errors::IntercomError;
use serde::de::DeserializeOwned;

/// Deserialize a JSON body, answering 400 (not axum's default 422) on
/// malformed input.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, IntercomError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(target: "intercom.handlers", error = %e, "Invalid request body");
        IntercomError::BadRequest("Invalid request body".to_string())
    })
}
