//! Storage-write event endpoint for the extraction worker.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::{ServiceError, ServiceResult};
use crate::events::StorageNotification;

use super::AppState;

#[derive(Serialize)]
pub struct EventAccepted {
    pub bucket: String,
    pub document_key: String,
}

/// Accept one storage-write notification onto the worker queue.
///
/// The answer only means the event was queued; extraction happens on the
/// background worker, which applies its own retry policy.
pub async fn storage_event_handler(
    State(state): State<Arc<AppState>>,
    Json(notification): Json<StorageNotification>,
) -> ServiceResult<(StatusCode, Json<EventAccepted>)> {
    let event = notification.first_event()?;
    let object = event.object.clone();

    let queue = state.events.as_ref().ok_or(ServiceError::WorkerUnavailable)?;
    if queue.send(event).await.is_err() {
        error!(object = %object, "Worker queue is closed, rejecting storage event");
        return Err(ServiceError::WorkerUnavailable);
    }

    metrics::counter!("scribe_events_received_total").increment(1);
    info!(object = %object, "Storage event queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(EventAccepted {
            bucket: object.bucket,
            document_key: object.key,
        }),
    ))
}
