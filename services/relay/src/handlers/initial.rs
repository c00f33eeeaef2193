//! Initial-state fetch, answered immediately from the snapshot cache
//!
//! Initial state is sourced from the same cache the delta relay maintains,
//! so the base a client starts from is the base its subsequent deltas
//! assume. Games the cache does not currently hold are simply absent from
//! the response; the first publication on their channel arrives as a
//! full-sync delta.

use axum::{extract::State, Json};
use types::messages::{InitialRequest, ServerMessage};

use crate::clock;
use crate::error::AppError;
use crate::state::SharedState;

pub async fn initial_handler(
    State(state): State<SharedState>,
    Json(request): Json<InitialRequest>,
) -> Result<Json<ServerMessage>, AppError> {
    if request.game_ids.is_empty() || request.game_ids.iter().any(|id| !id.is_valid()) {
        return Err(AppError::BadRequest("malformed game id list".to_string()));
    }

    let now = clock::now_millis();
    let cache = state.cache.read();
    let data = request
        .game_ids
        .iter()
        .filter_map(|id| cache.get(id, now).cloned())
        .collect();

    Ok(Json(ServerMessage::Initial { data }))
}
