//! Broker-offered session handlers.
//!
//! - `POST /api/v1/sessions` - Create session, returns the SDP offer
//! - `PATCH /api/v1/sessions/{id}` - Submit the client's SDP answer
//! - `DELETE /api/v1/sessions/{id}` - End session
//! - `GET /api/v1/heartbeat/{id}` - Keep session alive (410 once gone)

use super::parse_json;
use crate::errors::IntercomError;
use crate::routes::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use common::types::{LineId, ProductionId, SessionId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub production_id: ProductionId,
    pub line_id: LineId,
    pub username: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
    pub sdp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    pub sdp_answer: String,
}

#[instrument(skip_all, name = "intercom.session.create")]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateSessionResponse>), IntercomError> {
    let request: CreateSessionRequest = parse_json(&body)?;
    let offer = state
        .orchestrator
        .create_session_offer(request.production_id, request.line_id, &request.username)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: offer.session_id,
            sdp: offer.sdp,
        }),
    ))
}

#[instrument(skip_all, name = "intercom.session.answer", fields(session_id = %session_id))]
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    body: Bytes,
) -> Result<StatusCode, IntercomError> {
    let request: SubmitAnswerRequest = parse_json(&body)?;
    state
        .orchestrator
        .submit_answer(session_id, &request.sdp_answer)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all, name = "intercom.session.delete", fields(session_id = %session_id))]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<StatusCode, IntercomError> {
    state.orchestrator.delete_session(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<&'static str, IntercomError> {
    state.orchestrator.heartbeat(session_id)?;
    Ok("OK")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_requires_uuid_ids() {
        let bad = serde_json::from_str::<CreateSessionRequest>(
            r#"{"productionId":"1","lineId":"2","username":"a"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_answer_request_field_name() {
        let request: SubmitAnswerRequest =
            serde_json::from_str(r#"{"sdpAnswer":"v=0\r\n"}"#).unwrap();
        assert_eq!(request.sdp_answer, "v=0\r\n");
    }
}
