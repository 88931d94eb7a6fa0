//! Production and line handlers.
//!
//! - `POST /api/v1/productions` - Create production
//! - `GET /api/v1/productions` - List productions
//! - `GET /api/v1/productions/{id}` - Get production
//! - `DELETE /api/v1/productions/{id}` - Delete production and its sessions
//! - `POST /api/v1/productions/{id}/lines` - Add line
//! - `PATCH /api/v1/productions/{id}/lines/{line_id}` - Rename line
//! - `DELETE /api/v1/productions/{id}/lines/{line_id}` - Delete line
//! - `POST /api/v1/productions/{id}/lines/{line_id}/conference` - Ensure conference
//! - `GET /api/v1/productions/{id}/lines/{line_id}/participants` - List or long-poll

use super::parse_json;
use crate::directory::{Line, NewLine, Participant, Production};
use crate::errors::IntercomError;
use crate::routes::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use common::types::{LineId, ProductionId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLineRequest {
    pub name: String,
    #[serde(default)]
    pub program_output_line: bool,
}

impl CreateLineRequest {
    fn into_new_line(self) -> Result<NewLine, IntercomError> {
        Ok(NewLine {
            name: non_empty(self.name, "line name")?,
            is_program_output: self.program_output_line,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductionRequest {
    pub name: String,
    #[serde(default)]
    pub lines: Vec<CreateLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct RenameLineRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceResponse {
    pub conference_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ParticipantsQuery {
    #[serde(default)]
    pub wait: bool,
}

fn non_empty(value: String, what: &str) -> Result<String, IntercomError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(IntercomError::BadRequest(format!("{what} must not be empty")));
    }
    Ok(trimmed.to_string())
}

#[instrument(skip_all, name = "intercom.production.create")]
pub async fn create_production(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Production>), IntercomError> {
    let request: CreateProductionRequest = parse_json(&body)?;
    let name = non_empty(request.name, "production name")?;
    let lines = request
        .lines
        .into_iter()
        .map(CreateLineRequest::into_new_line)
        .collect::<Result<Vec<_>, _>>()?;

    let production = state
        .orchestrator
        .directory()
        .create_production(name, lines)
        .await?;

    info!(
        target: "intercom.handlers.productions",
        production_id = %production.id,
        line_count = production.lines.len(),
        "Production created"
    );
    Ok((StatusCode::CREATED, Json(production)))
}

#[instrument(skip_all, name = "intercom.production.list")]
pub async fn list_productions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Production>>, IntercomError> {
    Ok(Json(
        state.orchestrator.directory().list_productions().await?,
    ))
}

#[instrument(skip_all, name = "intercom.production.get", fields(production_id = %production_id))]
pub async fn get_production(
    State(state): State<Arc<AppState>>,
    Path(production_id): Path<ProductionId>,
) -> Result<Json<Production>, IntercomError> {
    Ok(Json(
        state
            .orchestrator
            .directory()
            .get_production(production_id)
            .await?,
    ))
}

#[instrument(skip_all, name = "intercom.production.delete", fields(production_id = %production_id))]
pub async fn delete_production(
    State(state): State<Arc<AppState>>,
    Path(production_id): Path<ProductionId>,
) -> Result<StatusCode, IntercomError> {
    state.orchestrator.delete_production(production_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all, name = "intercom.line.add", fields(production_id = %production_id))]
pub async fn add_line(
    State(state): State<Arc<AppState>>,
    Path(production_id): Path<ProductionId>,
    body: Bytes,
) -> Result<(StatusCode, Json<Line>), IntercomError> {
    let request: CreateLineRequest = parse_json(&body)?;
    let line = state
        .orchestrator
        .directory()
        .add_line(production_id, request.into_new_line()?)
        .await?;
    Ok((StatusCode::CREATED, Json(line)))
}

#[instrument(skip_all, name = "intercom.line.rename", fields(production_id = %production_id, line_id = %line_id))]
pub async fn rename_line(
    State(state): State<Arc<AppState>>,
    Path((production_id, line_id)): Path<(ProductionId, LineId)>,
    body: Bytes,
) -> Result<Json<Line>, IntercomError> {
    let request: RenameLineRequest = parse_json(&body)?;
    let line = state
        .orchestrator
        .directory()
        .rename_line(production_id, line_id, non_empty(request.name, "line name")?)
        .await?;
    Ok(Json(line))
}

#[instrument(skip_all, name = "intercom.line.delete", fields(production_id = %production_id, line_id = %line_id))]
pub async fn delete_line(
    State(state): State<Arc<AppState>>,
    Path((production_id, line_id)): Path<(ProductionId, LineId)>,
) -> Result<StatusCode, IntercomError> {
    state
        .orchestrator
        .delete_line(production_id, line_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all, name = "intercom.line.conference", fields(production_id = %production_id, line_id = %line_id))]
pub async fn ensure_conference(
    State(state): State<Arc<AppState>>,
    Path((production_id, line_id)): Path<(ProductionId, LineId)>,
) -> Result<Json<ConferenceResponse>, IntercomError> {
    let conference_id = state
        .orchestrator
        .ensure_line_conference(production_id, line_id)
        .await?;
    Ok(Json(ConferenceResponse { conference_id }))
}

/// With `?wait=true`, hold the request until the participant picture changes
/// or the long-poll timeout passes; either way answer with the current list.
#[instrument(skip_all, name = "intercom.line.participants", fields(production_id = %production_id, line_id = %line_id))]
pub async fn list_participants(
    State(state): State<Arc<AppState>>,
    Path((production_id, line_id)): Path<(ProductionId, LineId)>,
    Query(query): Query<ParticipantsQuery>,
) -> Result<Json<Vec<Participant>>, IntercomError> {
    let participants = if query.wait {
        state
            .orchestrator
            .wait_for_participants(production_id, line_id, state.config.long_poll_timeout)
            .await?
    } else {
        state
            .orchestrator
            .list_participants(production_id, line_id)
            .await?
    };
    Ok(Json(participants))
}
