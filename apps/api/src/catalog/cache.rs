//! Session-scoped catalog cache.
//!
//! Pages are fetched through a `CatalogService` and merged into one ordered list:
//! page 1 replaces the list (pull-to-refresh), later pages are appended in the
//! order the service returned them. Ids are not de-duplicated across pages; the
//! remote service owns identity.
//!
//! Only one page request may be in flight at a time. The `loading_more` flag is
//! raised before fetching and lowered once the merge finished or failed; a
//! trigger observed while it is raised is dropped. The flag is owned by a guard,
//! so a dropped (cancelled) load lowers it without applying anything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::catalog::client::{CatalogError, CatalogService};
use crate::models::plant::{CatalogEntry, EnvironmentTag, ALL_ENVIRONMENTS, DEFAULT_ALL_TITLE};

/// Result of a fetch-more or refresh trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { page: u32, count: usize },
    /// Another page request was in flight; the trigger was dropped.
    Skipped,
    /// The last merged page was short, there is nothing further to request.
    Exhausted,
}

#[derive(Debug)]
struct CacheState {
    entries: Vec<CatalogEntry>,
    /// Last successfully merged page, 0 before the first merge.
    page: u32,
    exhausted: bool,
    selected_environment: String,
}

pub struct CatalogCache {
    service: Arc<dyn CatalogService>,
    page_size: u32,
    all_title: String,
    state: RwLock<CacheState>,
    loading_more: AtomicBool,
    environments: OnceCell<Vec<EnvironmentTag>>,
}

/// Lowers the loading flag on every exit path, including cancellation.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CatalogCache {
    pub fn new(service: Arc<dyn CatalogService>, page_size: u32) -> Self {
        Self {
            service,
            page_size: page_size.max(1),
            all_title: DEFAULT_ALL_TITLE.to_string(),
            state: RwLock::new(CacheState {
                entries: Vec::new(),
                page: 0,
                exhausted: false,
                selected_environment: ALL_ENVIRONMENTS.to_string(),
            }),
            loading_more: AtomicBool::new(false),
            environments: OnceCell::new(),
        }
    }

    /// Overrides the title of the synthetic `all` tag.
    pub fn with_all_title(mut self, title: impl Into<String>) -> Self {
        self.all_title = title.into();
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn is_loading_more(&self) -> bool {
        self.loading_more.load(Ordering::Acquire)
    }

    /// Last merged page number (0 if nothing was merged yet).
    pub fn current_page(&self) -> u32 {
        self.read().page
    }

    /// Requests one page from the service. Does not touch the cache.
    pub async fn fetch_page(&self, page: u32) -> Result<Vec<CatalogEntry>, CatalogError> {
        debug!("Fetching catalog page {} (size {})", page, self.page_size);
        self.service.fetch_plants(page, self.page_size).await
    }

    /// Merges a fetched page: page 1 replaces the list, any later page is appended.
    pub fn append_page(&self, page: u32, entries: Vec<CatalogEntry>) {
        let mut state = self.write();
        let count = entries.len();

        if page <= 1 {
            state.entries = entries;
        } else {
            state.entries.extend(entries);
        }
        state.page = page.max(1);
        state.exhausted = count < self.page_size as usize;

        debug!(
            "Merged catalog page {} ({} entries, {} total)",
            state.page,
            count,
            state.entries.len()
        );
    }

    /// Entries whose environments include `tag`, or everything for `"all"`.
    /// Order follows the merged list.
    pub fn filter_by_environment(&self, tag: &str) -> Vec<CatalogEntry> {
        let state = self.read();
        if tag == ALL_ENVIRONMENTS {
            return state.entries.clone();
        }
        state
            .entries
            .iter()
            .filter(|entry| entry.grows_in(tag))
            .cloned()
            .collect()
    }

    /// Environment tags with the synthetic `all` tag first. Fetched once per cache.
    pub async fn load_environments(&self) -> Result<Vec<EnvironmentTag>, CatalogError> {
        let tags = self
            .environments
            .get_or_try_init(|| async {
                let remote = self.service.fetch_environments().await?;
                info!("Loaded {} environment tags", remote.len());
                let mut tags = Vec::with_capacity(remote.len() + 1);
                tags.push(EnvironmentTag::all(self.all_title.as_str()));
                tags.extend(remote);
                Ok::<_, CatalogError>(tags)
            })
            .await?;
        Ok(tags.clone())
    }

    pub fn select_environment(&self, tag: impl Into<String>) {
        self.write().selected_environment = tag.into();
    }

    pub fn selected_environment(&self) -> String {
        self.read().selected_environment.clone()
    }

    /// The merged list narrowed by the selected environment.
    pub fn visible(&self) -> Vec<CatalogEntry> {
        let selected = self.selected_environment();
        self.filter_by_environment(&selected)
    }

    /// Reloads page 1, replacing the merged list.
    pub async fn refresh(&self) -> Result<LoadOutcome, CatalogError> {
        let Some(_guard) = self.try_begin_loading() else {
            warn!("Catalog refresh dropped: a page request is already in flight");
            return Ok(LoadOutcome::Skipped);
        };
        self.load(1).await
    }

    /// Requests the page after the last merged one.
    pub async fn load_more(&self) -> Result<LoadOutcome, CatalogError> {
        let Some(_guard) = self.try_begin_loading() else {
            debug!("Fetch-more trigger dropped: a page request is already in flight");
            return Ok(LoadOutcome::Skipped);
        };

        let (next, exhausted) = {
            let state = self.read();
            (state.page + 1, state.exhausted)
        };
        if exhausted {
            return Ok(LoadOutcome::Exhausted);
        }
        self.load(next).await
    }

    /// Caller must hold the loading guard.
    async fn load(&self, page: u32) -> Result<LoadOutcome, CatalogError> {
        let entries = self.fetch_page(page).await?;
        let count = entries.len();
        self.append_page(page, entries);
        Ok(LoadOutcome::Loaded { page, count })
    }

    fn try_begin_loading(&self) -> Option<LoadingGuard<'_>> {
        self.loading_more
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LoadingGuard(&self.loading_more))
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
