//! Long-poll delivery
//!
//! A poll request registers (or refreshes) a polling session whose game
//! list is authoritative for its subscriptions, then parks on the
//! session's mailbox until a batch accrues or the bounded wait elapses.
//! An empty batch tells the client "no news, poll again immediately".
//! Sessions that stop polling are swept by the maintenance task.

use axum::{extract::State, Json};
use tracing::debug;
use types::messages::{PollRequest, ServerMessage};

use crate::clock;
use crate::error::AppError;
use crate::state::SharedState;

pub async fn poll_handler(
    State(state): State<SharedState>,
    Json(request): Json<PollRequest>,
) -> Result<Json<ServerMessage>, AppError> {
    let now = clock::now_millis();

    let mailbox = {
        let mut registry = state.registry.write();
        let (mailbox, created) = registry.ensure_poll_session(
            request.client_id,
            &request.game_ids,
            state.config.poll_mailbox_capacity,
            now,
        )?;
        if created {
            debug!(session = %request.client_id, "poll session registered");
            state.metrics.session_opened();
        }
        mailbox
    };
    mailbox.touch(now);

    let deltas = mailbox.wait_batch(state.config.poll_wait).await;
    state.metrics.record_poll_served();

    Ok(Json(ServerMessage::Batch { deltas }))
}
