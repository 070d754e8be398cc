mod catalog;
mod config;
mod errors;
mod models;
mod reminders;
mod routes;
mod state;
mod storage;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::catalog::cache::CatalogCache;
use crate::catalog::client::HttpCatalogClient;
use crate::config::{Config, StorageBackend};
use crate::reminders::clock::{Clock, SystemClock};
use crate::reminders::scheduler::{rearm_pending, LogNotifier, TokioScheduler};
use crate::reminders::store::ReminderStore;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::{FileStore, KeyValueStore, MemoryStore, RedisStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("plantcare_api={}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting PlantCare API v{}", env!("CARGO_PKG_VERSION"));

    let catalog_client = HttpCatalogClient::new(&config.catalog_api_url, config.catalog_timeout)?;
    let catalog = Arc::new(
        CatalogCache::new(Arc::new(catalog_client), config.catalog_page_size)
            .with_all_title(config.catalog_all_title.as_str()),
    );
    info!(
        "Catalog client initialized ({}, page size {})",
        config.catalog_api_url,
        catalog.page_size()
    );

    let kv: Arc<dyn KeyValueStore> = match &config.storage {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::File(dir) => Arc::new(FileStore::open(dir).await?),
        StorageBackend::Redis(url) => Arc::new(RedisStore::connect(url).await?),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let reminders = Arc::new(ReminderStore::new(kv, &config.storage_key, clock.clone()));
    let scheduler = Arc::new(TokioScheduler::new(clock.clone(), Arc::new(LogNotifier)));

    // Reminders armed before a restart are not in the scheduler yet.
    let stored = reminders.load_all().await?;
    rearm_pending(scheduler.as_ref(), &stored, clock.now()).await;
    info!(
        "Re-armed {} of {} stored reminders",
        scheduler.armed(),
        stored.len()
    );
    if let Some(next) = reminders.next_due().await? {
        info!("Next reminder: {} at {}", next.entry.name, next.reminder_at);
    }

    let state = AppState {
        catalog,
        reminders,
        scheduler,
        reminder_sync: Arc::new(Mutex::new(())),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
