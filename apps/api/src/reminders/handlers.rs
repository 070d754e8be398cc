//! Axum route handlers for adopted plants and their reminders.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::plant::{CatalogEntry, PlantId, StoredPlant};
use crate::reminders::scheduler::NotificationPayload;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SaveReminderRequest {
    pub plant: CatalogEntry,
    pub reminder_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SaveReminderResponse {
    pub plant: StoredPlant,
    pub notification_id: Uuid,
}

/// GET /api/v1/reminders
pub async fn handle_list_reminders(
    State(state): State<AppState>,
) -> Result<Json<Vec<StoredPlant>>, AppError> {
    Ok(Json(state.reminders.load_all().await?))
}

/// POST /api/v1/reminders
/// Saves the plant, then arms its notification with the stored time.
pub async fn handle_save_reminder(
    State(state): State<AppState>,
    Json(req): Json<SaveReminderRequest>,
) -> Result<(StatusCode, Json<SaveReminderResponse>), AppError> {
    if req.plant.id.as_str().is_empty() {
        return Err(AppError::Validation("plant.id must not be empty".into()));
    }
    if req.plant.name.trim().is_empty() {
        return Err(AppError::Validation("plant.name must not be empty".into()));
    }

    let _sync = state.reminder_sync.lock().await;
    let stored = state.reminders.save(req.plant, req.reminder_at).await?;
    let notification_id = state
        .scheduler
        .schedule(
            stored.id(),
            stored.reminder_at,
            NotificationPayload::for_plant(&stored),
        )
        .await;

    Ok((
        StatusCode::CREATED,
        Json(SaveReminderResponse {
            plant: stored,
            notification_id,
        }),
    ))
}

/// DELETE /api/v1/reminders/:id
/// Idempotent: removing an unknown plant still answers 204.
pub async fn handle_remove_reminder(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = PlantId::new(id);
    let _sync = state.reminder_sync.lock().await;
    state.reminders.remove(&id).await?;
    state.scheduler.cancel(&id).await;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/reminders
/// Purges every adopted plant and disarms all notifications. Never reads the
/// stored mapping, so an unreadable one can still be reset.
pub async fn handle_clear_reminders(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    let _sync = state.reminder_sync.lock().await;
    state.reminders.clear().await?;
    state.scheduler.cancel_all().await;
    Ok(StatusCode::NO_CONTENT)
}
