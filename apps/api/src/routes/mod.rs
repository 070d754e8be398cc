pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::catalog::handlers as catalog;
use crate::reminders::handlers as reminders;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Catalog API
        .route("/api/v1/environments", get(catalog::handle_environments))
        .route("/api/v1/plants", get(catalog::handle_plants))
        .route("/api/v1/plants/refresh", post(catalog::handle_refresh))
        .route("/api/v1/plants/more", post(catalog::handle_fetch_more))
        // Reminder API
        .route(
            "/api/v1/reminders",
            get(reminders::handle_list_reminders)
                .post(reminders::handle_save_reminder)
                .delete(reminders::handle_clear_reminders),
        )
        .route(
            "/api/v1/reminders/:id",
            delete(reminders::handle_remove_reminder),
        )
        .with_state(state)
}
