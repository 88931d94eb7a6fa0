//! WHIP ingest and WHEP egress handlers.
//!
//! The client POSTs an `application/sdp` offer and receives the answer in
//! the `201 Created` body, with the session resource in `Location`. DELETE on
//! that resource ends the session.
//!
//! - `POST /whip/productions/{id}/lines/{line_id}?username=`
//! - `POST /whep/productions/{id}/lines/{line_id}?username=`
//! - `DELETE /whip/sessions/{id}`, `DELETE /whep/sessions/{id}`

use crate::directory::SessionKind;
use crate::errors::IntercomError;
use crate::routes::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use common::types::{LineId, ProductionId, SessionId};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

pub const SDP_CONTENT_TYPE: &str = "application/sdp";

#[derive(Debug, Default, Deserialize)]
pub struct IngestQuery {
    pub username: Option<String>,
}

fn resource_prefix(kind: SessionKind) -> &'static str {
    match kind {
        SessionKind::Whep => "/whep",
        SessionKind::Whip | SessionKind::Legacy => "/whip",
    }
}

fn sdp_body(headers: &HeaderMap, body: &Bytes) -> Result<String, IntercomError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with(SDP_CONTENT_TYPE) {
        return Err(IntercomError::BadRequest(format!(
            "expected {SDP_CONTENT_TYPE} body"
        )));
    }
    let offer = std::str::from_utf8(body)
        .map_err(|_| IntercomError::BadRequest("SDP offer is not UTF-8".to_string()))?;
    if offer.trim().is_empty() {
        return Err(IntercomError::BadRequest("SDP offer is empty".to_string()));
    }
    Ok(offer.to_string())
}

async fn create_resource(
    state: &AppState,
    kind: SessionKind,
    production_id: ProductionId,
    line_id: LineId,
    query: IngestQuery,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, IntercomError> {
    let offer = sdp_body(headers, body)?;
    let username = query
        .username
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| kind.as_str().to_string());

    let created = state
        .orchestrator
        .create_ingest_session(production_id, line_id, &username, &offer, kind)
        .await?;

    let location = format!("{}/sessions/{}", resource_prefix(kind), created.session_id);
    info!(
        target: "intercom.handlers.whip",
        session_id = %created.session_id,
        kind = kind.as_str(),
        "Ingest resource created"
    );

    Ok((
        StatusCode::CREATED,
        [
            (header::CONTENT_TYPE, SDP_CONTENT_TYPE.to_string()),
            (header::LOCATION, location),
        ],
        created.sdp,
    )
        .into_response())
}

async fn delete_resource(
    state: &AppState,
    kind: SessionKind,
    session_id: SessionId,
) -> Result<StatusCode, IntercomError> {
    let session = state.orchestrator.directory().get_session(session_id)?;
    if session.kind != kind {
        return Err(IntercomError::SessionNotFound(session_id.to_string()));
    }
    state.orchestrator.delete_session(session_id).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip_all, name = "intercom.whip.create", fields(production_id = %production_id, line_id = %line_id))]
pub async fn create_whip(
    State(state): State<Arc<AppState>>,
    Path((production_id, line_id)): Path<(ProductionId, LineId)>,
    Query(query): Query<IngestQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, IntercomError> {
    create_resource(&state, SessionKind::Whip, production_id, line_id, query, &headers, &body).await
}

#[instrument(skip_all, name = "intercom.whep.create", fields(production_id = %production_id, line_id = %line_id))]
pub async fn create_whep(
    State(state): State<Arc<AppState>>,
    Path((production_id, line_id)): Path<(ProductionId, LineId)>,
    Query(query): Query<IngestQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, IntercomError> {
    create_resource(&state, SessionKind::Whep, production_id, line_id, query, &headers, &body).await
}

#[instrument(skip_all, name = "intercom.whip.delete", fields(session_id = %session_id))]
pub async fn delete_whip(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<StatusCode, IntercomError> {
    delete_resource(&state, SessionKind::Whip, session_id).await
}

#[instrument(skip_all, name = "intercom.whep.delete", fields(session_id = %session_id))]
pub async fn delete_whep(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<StatusCode, IntercomError> {
    delete_resource(&state, SessionKind::Whep, session_id).await
}
