use std::sync::Arc;

use tokio::sync::Mutex;

use crate::catalog::cache::CatalogCache;
use crate::reminders::scheduler::NotificationScheduler;
use crate::reminders::store::ReminderStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Catalog session. Lives as long as the process serves one UI shell.
    pub catalog: Arc<CatalogCache>,
    pub reminders: Arc<ReminderStore>,
    /// Armed right after a successful save, disarmed right after a remove.
    pub scheduler: Arc<dyn NotificationScheduler>,
    /// Held across a store mutation and the matching scheduler update, so the
    /// armed notifications always mirror the stored mapping.
    pub reminder_sync: Arc<Mutex<()>>,
}
