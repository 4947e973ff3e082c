//! Operator endpoints for the process-wide caches.

use axum::{Json, extract::State, http::StatusCode};

use crate::{AppState, api::models::internal::CandidatesResponse};

/// Drop the cached candidate list and return a freshly resolved one.
#[tracing::instrument(skip_all)]
pub async fn refresh_candidates(State(state): State<AppState>) -> Json<CandidatesResponse> {
    let directory = state.pipeline.gateway().directory();
    directory.invalidate().await;
    let list = directory.current().await;

    tracing::info!(candidates = ?list.as_slice(), "Candidate list refreshed");
    Json(CandidatesResponse {
        candidates: list.as_slice().to_vec(),
    })
}

/// Drop the cached roster; the next lookup reloads the file.
#[tracing::instrument(skip_all)]
pub async fn refresh_roster(State(state): State<AppState>) -> StatusCode {
    state.roster.invalidate().await;
    tracing::info!("Roster cache invalidated");
    StatusCode::NO_CONTENT
}
