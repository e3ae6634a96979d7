use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::api::error::ApiError;
use crate::api::server::AppState;
use crate::engine::{SessionHandle, SessionOutcome};
use crate::events::SessionEvent;
use crate::types::{FrontierIdea, SessionConfig, SessionId, SessionSnapshot, SessionState};

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub claim: String,
    #[serde(default)]
    pub config: Option<SessionConfig>,
}

#[derive(Deserialize)]
pub struct ProposeIdeaRequest {
    pub idea: String,
}

#[derive(Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub claim: String,
    pub support: f64,
    pub cycle_count: u64,
    pub state: SessionState,
    pub cost_total: f64,
}

impl From<SessionSnapshot> for SessionSummary {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            id: snapshot.session_id.to_string(),
            claim: snapshot.claim,
            support: snapshot.support,
            cycle_count: snapshot.cycle_count,
            state: snapshot.state,
            cost_total: snapshot.cost_total,
        }
    }
}

#[derive(Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
    pub outcome: Option<SessionOutcome>,
}

async fn find(state: &AppState, id: SessionId) -> Result<SessionHandle, ApiError> {
    state
        .registry
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session {} not found", id)))
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionSummary>), ApiError> {
    if request.claim.trim().is_empty() {
        return Err(ApiError::BadRequest("claim must not be empty".to_string()));
    }
    if let Some(config) = &request.config {
        config
            .validate()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    }

    let handle = state.registry.start(&request.claim, request.config).await?;
    let snapshot = handle.snapshot().await;
    Ok((StatusCode::CREATED, Json(SessionSummary::from(snapshot))))
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    let mut summaries = Vec::new();
    for handle in state.registry.list().await {
        summaries.push(SessionSummary::from(handle.snapshot().await));
    }
    Json(summaries)
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionDetail>, ApiError> {
    let handle = find(&state, id).await?;
    Ok(Json(SessionDetail {
        snapshot: handle.snapshot().await,
        outcome: state.registry.outcome(id).await,
    }))
}

pub async fn stop_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let handle = find(&state, id).await?;
    let stopped = handle.stop("stopped via API");
    Ok(Json(serde_json::json!({
        "id": id.to_string(),
        "stopped": stopped,
    })))
}

pub async fn propose_idea(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
    Json(request): Json<ProposeIdeaRequest>,
) -> Result<Json<FrontierIdea>, ApiError> {
    if request.idea.trim().is_empty() {
        return Err(ApiError::BadRequest("idea must not be empty".to_string()));
    }
    let handle = find(&state, id).await?;
    Ok(Json(handle.propose_idea(&request.idea).await))
}

/// Streams this session's events until the session ends.
pub async fn stream_session_events(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    find(&state, id).await?;
    let mut events = BroadcastStream::new(state.bus.subscribe());

    let stream = async_stream::stream! {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) if event.session_id() != id => continue,
                Ok(event) => {
                    let last = matches!(event, SessionEvent::ClaimChanged { .. });
                    match Event::default().event(event.name()).json_data(&event) {
                        Ok(sse) => yield Ok::<Event, Infallible>(sse),
                        Err(e) => log::warn!("Failed to encode {} event: {}", event.name(), e),
                    }
                    if last {
                        break;
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    yield Ok::<Event, Infallible>(Event::default().event("lagged").data(skipped.to_string()));
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
