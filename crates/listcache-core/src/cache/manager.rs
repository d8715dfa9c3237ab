use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::api::DataError;
use crate::models::Record;

use super::key::CacheKey;
use super::stats::CacheCounters;

/// A memoized gateway result.
#[derive(Debug, Clone)]
pub enum CachedValue {
    Collection(Arc<Vec<Record>>),
    Item(Arc<Record>),
}

impl CachedValue {
    pub fn collection(records: Vec<Record>) -> Self {
        Self::Collection(Arc::new(records))
    }

    pub fn item(record: Record) -> Self {
        Self::Item(Arc::new(record))
    }

    pub fn into_collection(self, key: &CacheKey) -> Result<Arc<Vec<Record>>, DataError> {
        match self {
            Self::Collection(records) => Ok(records),
            Self::Item(_) => Err(mismatch(key, "collection")),
        }
    }

    pub fn into_item(self, key: &CacheKey) -> Result<Arc<Record>, DataError> {
        match self {
            Self::Item(record) => Ok(record),
            Self::Collection(_) => Err(mismatch(key, "single record")),
        }
    }
}

fn mismatch(key: &CacheKey, expected: &str) -> DataError {
    DataError::InvalidResponse {
        target: key.to_string(),
        message: format!("cached value is not a {}", expected),
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: CachedValue,
    pub inserted_at: Instant,
}

impl CacheEntry {
    fn new(value: CachedValue) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.inserted_at)
    }

    pub fn is_live(&self, ttl: Duration, now: Instant) -> bool {
        self.age(now) < ttl
    }
}

type SharedOutcome = Shared<BoxFuture<'static, Result<CachedValue, DataError>>>;

struct InFlight {
    /// Distinguishes this load from a later one for the same key.
    id: u64,
    outcome: SharedOutcome,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    in_flight: HashMap<CacheKey, InFlight>,
    next_load_id: u64,
    counters: CacheCounters,
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Store a finished load, unless its marker was invalidated meanwhile.
fn settle(
    state: &Mutex<CacheState>,
    key: &CacheKey,
    id: u64,
    result: &Result<CachedValue, DataError>,
) {
    let mut guard = lock(state);
    let state = &mut *guard;
    if state.in_flight.get(key).map(|f| f.id) != Some(id) {
        debug!(key = %key, "Load finished after invalidation, result not stored");
        return;
    }
    state.in_flight.remove(key);
    match result {
        Ok(value) => {
            state.entries.insert(key.clone(), CacheEntry::new(value.clone()));
            state.counters.entries = state.entries.len();
        }
        Err(e) => debug!(key = %key, error = %e, "Load failed, nothing cached"),
    }
}

/// In-memory memoization of gateway calls.
///
/// Each key has at most one load in flight; concurrent callers for the same
/// key share its outcome. Successful results are kept for the TTL, failures
/// are never cached. Clones share the same store.
#[derive(Clone)]
pub struct RequestCache {
    ttl: Duration,
    state: Arc<Mutex<CacheState>>,
}

impl RequestCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value for `key`, joining or starting a load as needed.
    pub async fn get<F>(&self, key: CacheKey, loader: F) -> Result<CachedValue, DataError>
    where
        F: Future<Output = Result<CachedValue, DataError>> + Send + 'static,
    {
        self.get_cancellable(key, loader, futures::future::pending())
            .await
    }

    /// Like [`get`](Self::get), but a load started by this call is abandoned
    /// when `cancel` completes first. Every waiter then receives
    /// `DataError::Cancelled` and nothing is cached. `cancel` is ignored
    /// when the call is answered from the store or joins an existing load.
    pub async fn get_cancellable<F, C>(
        &self,
        key: CacheKey,
        loader: F,
        cancel: C,
    ) -> Result<CachedValue, DataError>
    where
        F: Future<Output = Result<CachedValue, DataError>> + Send + 'static,
        C: Future<Output = ()> + Send + 'static,
    {
        let outcome = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            let now = Instant::now();

            match state.entries.get(&key) {
                Some(entry) if entry.is_live(self.ttl, now) => {
                    let value = entry.value.clone();
                    state.counters.hits += 1;
                    debug!(key = %key, "Cache hit");
                    return Ok(value);
                }
                Some(_) => {
                    debug!(key = %key, "Cache entry expired");
                    state.entries.remove(&key);
                    state.counters.entries = state.entries.len();
                }
                None => {}
            }

            if let Some(in_flight) = state.in_flight.get(&key) {
                let outcome = in_flight.outcome.clone();
                state.counters.coalesced += 1;
                debug!(key = %key, "Joining in-flight load");
                outcome
            } else {
                state.counters.misses += 1;
                state.counters.loads += 1;
                let id = state.next_load_id;
                state.next_load_id += 1;
                debug!(key = %key, "Cache miss, loading");

                let outcome = self.spawn_load(key.clone(), id, loader, cancel);
                state.in_flight.insert(
                    key,
                    InFlight {
                        id,
                        outcome: outcome.clone(),
                    },
                );
                outcome
            }
        };

        outcome.await
    }

    /// Run the loader on its own task so it settles even if every waiter is dropped.
    fn spawn_load<F, C>(&self, key: CacheKey, id: u64, loader: F, cancel: C) -> SharedOutcome
    where
        F: Future<Output = Result<CachedValue, DataError>> + Send + 'static,
        C: Future<Output = ()> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                result = loader => result,
                () = cancel => {
                    info!(key = %task_key, "Load cancelled");
                    Err(DataError::Cancelled(task_key.to_string()))
                }
            };
            settle(&state, &task_key, id, &result);
            result
        });

        let state = Arc::clone(&self.state);
        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    // The task never reached settle; clear its marker here.
                    let result = Err(DataError::Cancelled(format!("{}: {}", key, e)));
                    settle(&state, &key, id, &result);
                    result
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Drop collection entries for `list` under every option variant.
    /// Loads in flight for those keys finish for their waiters but are not stored.
    pub fn invalidate(&self, list: &str) -> usize {
        self.remove_where(|key| key.is_collection_of(list), list)
    }

    /// Drop single-item entries for `list`/`id` under every option variant.
    pub fn invalidate_item(&self, list: &str, id: i64) -> usize {
        self.remove_where(|key| key.is_item_of(list, id), list)
    }

    fn remove_where(&self, matches: impl Fn(&CacheKey) -> bool, list: &str) -> usize {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let before = state.entries.len();
        state.entries.retain(|key, _| !matches(key));
        state.in_flight.retain(|key, _| !matches(key));
        let removed = before - state.entries.len();
        state.counters.entries = state.entries.len();
        info!(list = list, removed = removed, "Invalidated cache entries");
        removed
    }

    /// Drop every entry and in-flight marker. Counters are kept.
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.entries.clear();
        state.in_flight.clear();
        state.counters.entries = 0;
    }

    pub fn counters(&self) -> CacheCounters {
        lock(&self.state).counters
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        let state = lock(&self.state);
        state
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_live(self.ttl, Instant::now()))
    }

    pub fn is_loading(&self, key: &CacheKey) -> bool {
        lock(&self.state).in_flight.contains_key(key)
    }
}
