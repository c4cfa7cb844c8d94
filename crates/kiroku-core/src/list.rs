//! Load state for a paginated list screen.
//!
//! [`ListLoadController`] drives "first page / next page / retry" against a
//! [`PageSource`], keeping server order in `ordered_ids` and the entities
//! themselves in an [`EntityCache`]. All methods take `&self`: the state lives
//! behind a mutex that is never held across an `.await`, and the
//! `is_loading` flag keeps at most one page request in flight.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use kiroku_api::{ApiError, Cursor, EntityId, ErrorKind, Identified, Page, PageSource};
use tracing::{debug, info, warn};

use crate::cache::EntityCache;

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    Loading,
    Ready,
    LoadingMore,
    Error,
}

/// Snapshot handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListState {
    /// Server order, each id at most once.
    pub ordered_ids: Vec<EntityId>,
    pub cursor: Option<Cursor>,
    /// Ids whose detail fetch is in flight.
    pub loading_ids: HashSet<EntityId>,
    pub is_loading: bool,
    pub error: Option<ApiError>,
}

/// Result of one controller call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was applied; `added` new ids were appended.
    Loaded { added: usize },
    /// A single entity was refreshed in the cache.
    Updated,
    /// The request failed; the error is in [`ListState::error`].
    Failed(ErrorKind),
    /// Nothing to do, no request was issued.
    Skipped,
    /// The result arrived after a reset or a newer load and was dropped.
    Discarded,
}

/// The request behind the current error, replayed by `retry`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FailedFetch {
    FirstPage,
    NextPage,
    Detail(EntityId),
}

struct Inner<T> {
    state: ListState,
    cache: EntityCache<T>,
    phase: LoadPhase,
    loaded_once: bool,
    last_failure: Option<FailedFetch>,
    /// Bumped whenever an in-flight page result must be ignored.
    generation: u64,
    /// Bumped only by `reset`; guards detail fetches.
    epoch: u64,
}

impl<T> Inner<T> {
    fn new() -> Self {
        Self {
            state: ListState::default(),
            cache: EntityCache::new(),
            phase: LoadPhase::Idle,
            loaded_once: false,
            last_failure: None,
            generation: 0,
            epoch: 0,
        }
    }

    /// Phase to fall back to when a page fetch ends without a result.
    fn settled_phase(&self) -> LoadPhase {
        if self.loaded_once {
            LoadPhase::Ready
        } else if self.state.error.is_some() {
            LoadPhase::Error
        } else {
            LoadPhase::Idle
        }
    }
}

pub struct ListLoadController<T, S> {
    source: S,
    inner: Mutex<Inner<T>>,
}

impl<T, S> ListLoadController<T, S>
where
    T: Identified + Send,
    S: PageSource<T>,
{
    pub fn new(source: S) -> Self {
        Self {
            source,
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Load the first page, replacing the id list on success.
    ///
    /// Safe to call from any phase. A page fetch already in flight is
    /// superseded and its result discarded.
    pub async fn load_first(&self) -> LoadOutcome {
        let generation = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.state.is_loading = true;
            inner.state.error = None;
            inner.last_failure = None;
            inner.phase = LoadPhase::Loading;
            inner.generation
        };
        debug!(generation, "loading first page");

        let mut guard = PageFetchGuard::new(&self.inner, generation);
        let result = self.source.fetch_page(None).await;
        guard.disarm();

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(generation, "discarding superseded first page");
            return LoadOutcome::Discarded;
        }
        inner.state.is_loading = false;

        match result {
            Ok(page) => {
                let Page { items, next_cursor } = page;
                let mut seen = HashSet::with_capacity(items.len());
                let ids: Vec<EntityId> = items
                    .iter()
                    .map(|item| item.entity_id().clone())
                    .filter(|id| seen.insert(id.clone()))
                    .collect();
                let added = ids.len();

                inner.cache.merge_entities(items);
                inner.state.ordered_ids = ids;
                inner.state.cursor = next_cursor;
                inner.phase = LoadPhase::Ready;
                inner.loaded_once = true;
                info!(items = added, more = inner.state.cursor.is_some(), "first page loaded");
                LoadOutcome::Loaded { added }
            }
            Err(err) => {
                warn!(error = %err, "first page failed");
                let kind = err.kind;
                inner.state.error = Some(err);
                inner.last_failure = Some(FailedFetch::FirstPage);
                inner.phase = LoadPhase::Error;
                LoadOutcome::Failed(kind)
            }
        }
    }

    /// Load the page after the current cursor.
    ///
    /// Issues no request while another page is loading or once the cursor is
    /// exhausted. On failure the already loaded ids, cursor and entities stay
    /// exactly as they were; only the error slot changes.
    pub async fn load_more(&self) -> LoadOutcome {
        let (generation, cursor) = {
            let mut inner = self.lock();
            if inner.state.is_loading {
                return LoadOutcome::Skipped;
            }
            let Some(cursor) = inner.state.cursor.clone() else {
                return LoadOutcome::Skipped;
            };
            inner.state.is_loading = true;
            inner.phase = LoadPhase::LoadingMore;
            (inner.generation, cursor)
        };
        debug!(%cursor, "loading next page");

        let mut guard = PageFetchGuard::new(&self.inner, generation);
        let result = self.source.fetch_page(Some(&cursor)).await;
        guard.disarm();

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(generation, "discarding superseded page");
            return LoadOutcome::Discarded;
        }
        inner.state.is_loading = false;
        inner.phase = LoadPhase::Ready;

        match result {
            Ok(page) => {
                let Page { items, next_cursor } = page;
                inner.last_failure = None;
                let Inner { state, cache, .. } = &mut *inner;

                let mut known: HashSet<EntityId> = state.ordered_ids.iter().cloned().collect();
                let before = state.ordered_ids.len();
                for item in &items {
                    let id = item.entity_id();
                    if known.insert(id.clone()) {
                        state.ordered_ids.push(id.clone());
                    }
                }
                let added = state.ordered_ids.len() - before;

                cache.merge_entities(items);
                state.cursor = next_cursor;
                state.error = None;
                debug!(added, more = state.cursor.is_some(), "page appended");
                LoadOutcome::Loaded { added }
            }
            Err(err) => {
                warn!(error = %err, "next page failed, keeping loaded items");
                let kind = err.kind;
                inner.state.error = Some(err);
                inner.last_failure = Some(FailedFetch::NextPage);
                LoadOutcome::Failed(kind)
            }
        }
    }

    /// Repeat the request that produced the current error: the first page,
    /// the next page, or a detail fetch. With no recorded failure this loads
    /// the first page if nothing is loaded yet, otherwise the next page.
    pub async fn retry(&self) -> LoadOutcome {
        let (failed, loaded_once) = {
            let inner = self.lock();
            (inner.last_failure.clone(), inner.loaded_once)
        };
        match failed {
            Some(FailedFetch::FirstPage) => self.load_first().await,
            Some(FailedFetch::NextPage) => self.load_more().await,
            Some(FailedFetch::Detail(id)) => self.enrich(&id).await,
            None if !loaded_once => self.load_first().await,
            None => self.load_more().await,
        }
    }

    /// Fetch the full representation of one entity into the cache.
    ///
    /// The id sits in `loading_ids` while the request runs; asking again for
    /// the same id in the meantime is a no-op.
    pub async fn enrich(&self, id: &EntityId) -> LoadOutcome {
        let epoch = {
            let mut inner = self.lock();
            if !inner.state.loading_ids.insert(id.clone()) {
                return LoadOutcome::Skipped;
            }
            inner.epoch
        };
        debug!(%id, "enriching entity");

        let mut guard = DetailFetchGuard {
            inner: &self.inner,
            id,
            epoch,
            armed: true,
        };
        let result = self.source.fetch_one(id).await;
        guard.armed = false;

        let mut inner = self.lock();
        if inner.epoch != epoch {
            return LoadOutcome::Discarded;
        }
        inner.state.loading_ids.remove(id);

        match result {
            Ok(item) => {
                inner.cache.merge([(id.clone(), item)]);
                if inner.last_failure.as_ref() == Some(&FailedFetch::Detail(id.clone())) {
                    inner.state.error = None;
                    inner.last_failure = None;
                }
                LoadOutcome::Updated
            }
            Err(err) => {
                warn!(%id, error = %err, "detail fetch failed");
                let kind = err.kind;
                inner.state.error = Some(err);
                inner.last_failure = Some(FailedFetch::Detail(id.clone()));
                LoadOutcome::Failed(kind)
            }
        }
    }

    /// Stop waiting for the in-flight page request; its result will be
    /// discarded if it still arrives.
    pub fn cancel(&self) {
        let mut inner = self.lock();
        if inner.state.is_loading {
            inner.generation += 1;
            inner.state.is_loading = false;
            inner.phase = inner.settled_phase();
            debug!("page request cancelled");
        }
    }

    /// Forget everything and return to `Idle`. Late results from requests
    /// started before the reset are discarded.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let generation = inner.generation + 1;
        let epoch = inner.epoch + 1;
        *inner = Inner::new();
        inner.generation = generation;
        inner.epoch = epoch;
        debug!("list reset");
    }

    pub fn state(&self) -> ListState {
        self.lock().state.clone()
    }

    pub fn phase(&self) -> LoadPhase {
        self.lock().phase
    }

    /// Run `f` against the cache without cloning entities.
    pub fn with_cache<R>(&self, f: impl FnOnce(&EntityCache<T>) -> R) -> R {
        f(&self.lock().cache)
    }

    pub fn entity(&self, id: &EntityId) -> Option<T>
    where
        T: Clone,
    {
        self.lock().cache.get(id).cloned()
    }

    /// Loaded entities in list order.
    pub fn items(&self) -> Vec<T>
    where
        T: Clone,
    {
        let inner = self.lock();
        inner
            .state
            .ordered_ids
            .iter()
            .filter_map(|id| inner.cache.get(id).cloned())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears `is_loading` if a page fetch future is dropped before it finishes.
struct PageFetchGuard<'a, T> {
    inner: &'a Mutex<Inner<T>>,
    generation: u64,
    armed: bool,
}

impl<'a, T> PageFetchGuard<'a, T> {
    fn new(inner: &'a Mutex<Inner<T>>, generation: u64) -> Self {
        Self {
            inner,
            generation,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<T> Drop for PageFetchGuard<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.generation == self.generation && inner.state.is_loading {
            inner.generation += 1;
            inner.state.is_loading = false;
            inner.phase = inner.settled_phase();
            debug!("page request abandoned");
        }
    }
}

/// Removes the id from `loading_ids` if a detail fetch is dropped early.
struct DetailFetchGuard<'a, T> {
    inner: &'a Mutex<Inner<T>>,
    id: &'a EntityId,
    epoch: u64,
    armed: bool,
}

impl<T> Drop for DetailFetchGuard<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.epoch == self.epoch {
            inner.state.loading_ids.remove(self.id);
        }
    }
}
