mod key;

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{ClientError, Result};

pub use key::QueryKey;

/// Produces the server value for one key. Called again on every refetch.
pub type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync>;

pub fn fetcher<F, Fut>(fetch: F) -> Fetcher
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move || fetch().boxed())
}

type SharedFetch = Shared<BoxFuture<'static, Result<Value>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    /// No value yet.
    Pending,
    Fresh,
    /// Value kept but older than the threshold or invalidated.
    Stale,
    /// The last fetch failed after retries. Any earlier value is kept.
    Error,
}

/// Point-in-time view of one entry, as handed to consumers.
#[derive(Debug, Clone)]
pub struct QuerySnapshot {
    pub key: QueryKey,
    pub value: Option<Value>,
    pub state: QueryState,
    pub error: Option<ClientError>,
    pub fetched_at: Option<Instant>,
    pub is_fetching: bool,
}

impl QuerySnapshot {
    pub fn data<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.value
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(ClientError::from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub stale_after: Duration,
    /// Extra attempts after a transient failure.
    pub retry: u32,
    pub retry_delay: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30),
            retry: 1,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Per-query overrides of [`CacheConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub stale_after: Option<Duration>,
    pub retry: Option<u32>,
}

struct Flight {
    id: u64,
    outcome: SharedFetch,
}

struct Entry {
    id: u64,
    key: QueryKey,
    value: Option<Value>,
    error: Option<ClientError>,
    fetched_at: Option<Instant>,
    invalidated: bool,
    /// An invalidation landed while `flight` was running.
    invalidated_in_flight: bool,
    flight: Option<Flight>,
    fetcher: Fetcher,
    options: QueryOptions,
    subscribers: usize,
    notify: watch::Sender<QuerySnapshot>,
}

impl Entry {
    fn new(id: u64, key: QueryKey, fetcher: Fetcher, options: QueryOptions) -> Self {
        let (notify, _) = watch::channel(QuerySnapshot {
            key: key.clone(),
            value: None,
            state: QueryState::Pending,
            error: None,
            fetched_at: None,
            is_fetching: false,
        });
        Self {
            id,
            key,
            value: None,
            error: None,
            fetched_at: None,
            invalidated: false,
            invalidated_in_flight: false,
            flight: None,
            fetcher,
            options,
            subscribers: 0,
            notify,
        }
    }

    fn stale_after(&self, config: &CacheConfig) -> Duration {
        self.options.stale_after.unwrap_or(config.stale_after)
    }

    fn is_stale(&self, now: Instant, config: &CacheConfig) -> bool {
        match self.fetched_at {
            Some(at) => self.invalidated || now.duration_since(at) >= self.stale_after(config),
            None => true,
        }
    }

    fn needs_fetch(&self, now: Instant, config: &CacheConfig) -> bool {
        self.value.is_none() || self.error.is_some() || self.is_stale(now, config)
    }

    fn state(&self, now: Instant, config: &CacheConfig) -> QueryState {
        if self.error.is_some() {
            QueryState::Error
        } else if self.value.is_none() {
            QueryState::Pending
        } else if self.is_stale(now, config) {
            QueryState::Stale
        } else {
            QueryState::Fresh
        }
    }

    fn snapshot(&self, now: Instant, config: &CacheConfig) -> QuerySnapshot {
        QuerySnapshot {
            key: self.key.clone(),
            value: self.value.clone(),
            state: self.state(now, config),
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            is_fetching: self.flight.is_some(),
        }
    }

    fn publish(&self, config: &CacheConfig) {
        self.notify.send_replace(self.snapshot(Instant::now(), config));
    }
}

struct CacheInner {
    config: CacheConfig,
    entries: Mutex<HashMap<QueryKey, Entry>>,
    next_id: AtomicU64,
}

/// Process-wide server-state cache. Cloning shares the same entries.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                config,
                entries: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub async fn get(&self, key: &QueryKey, fetcher: Fetcher) -> Result<Value> {
        self.get_with(key, fetcher, QueryOptions::default()).await
    }

    /// Returns the cached value at once when it only aged past `stale_after`,
    /// refetching in the background. An entry with no value, or one that was
    /// invalidated, is awaited through the shared in-flight request.
    pub async fn get_with(
        &self,
        key: &QueryKey,
        fetcher: Fetcher,
        options: QueryOptions,
    ) -> Result<Value> {
        {
            let mut entries = self.lock();
            let entry = self.entry(&mut entries, key, Arc::clone(&fetcher), options);
            if !entry.invalidated
                && !entry.invalidated_in_flight
                && let Some(value) = entry.value.clone()
            {
                if entry.needs_fetch(Instant::now(), &self.inner.config) && entry.flight.is_none() {
                    self.start_fetch(entry);
                    entry.publish(&self.inner.config);
                }
                return Ok(value);
            }
        }
        self.fetch_with(key, fetcher, options).await
    }

    /// Like [`get`](Self::get), but waits for a fresh value instead of
    /// returning a stale one.
    pub async fn fetch(&self, key: &QueryKey, fetcher: Fetcher) -> Result<Value> {
        self.fetch_with(key, fetcher, QueryOptions::default()).await
    }

    async fn fetch_with(
        &self,
        key: &QueryKey,
        fetcher: Fetcher,
        options: QueryOptions,
    ) -> Result<Value> {
        let mut result = None;
        for _ in 0..2 {
            let pending = {
                let mut entries = self.lock();
                let entry = self.entry(&mut entries, key, Arc::clone(&fetcher), options);
                let now = Instant::now();
                if let Some(flight) = &entry.flight {
                    flight.outcome.clone()
                } else if entry.needs_fetch(now, &self.inner.config) {
                    let pending = self.start_fetch(entry);
                    entry.publish(&self.inner.config);
                    pending
                } else if let Some(value) = &entry.value {
                    return Ok(value.clone());
                } else {
                    self.start_fetch(entry)
                }
            };
            let outcome = pending.await;
            // A write landed while this request was running; ask once more.
            let retry_needed = outcome.is_ok() && self.is_invalidated(key);
            result = Some(outcome);
            if !retry_needed {
                break;
            }
        }
        result.unwrap_or_else(|| Err(ClientError::NotFound(format!("no result for {}", key))))
    }

    /// Registers a displayed consumer of `key`. Dropping the handle
    /// unregisters it.
    pub fn subscribe(&self, key: &QueryKey, fetcher: Fetcher) -> QuerySubscription {
        let mut entries = self.lock();
        let entry = self.entry(&mut entries, key, fetcher, QueryOptions::default());
        entry.subscribers += 1;
        if entry.needs_fetch(Instant::now(), &self.inner.config) && entry.flight.is_none() {
            self.start_fetch(entry);
            entry.publish(&self.inner.config);
        }
        QuerySubscription {
            cache: self.clone(),
            key: key.clone(),
            entry_id: entry.id,
            updates: entry.notify.subscribe(),
        }
    }

    /// Marks every entry whose resource matches `pattern` as stale. Displayed
    /// entries refetch now, or right after the fetch already in flight.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let mut entries = self.lock();
        let mut count = 0;
        for entry in entries.values_mut().filter(|entry| entry.key.matches(pattern)) {
            count += 1;
            entry.invalidated = true;
            if entry.flight.is_some() {
                entry.invalidated_in_flight = true;
            } else if entry.subscribers > 0 {
                self.start_fetch(entry);
            }
            entry.publish(&self.inner.config);
        }
        debug!("invalidated {} entries matching {}", count, pattern);
        count
    }

    pub fn invalidate_all(&self, patterns: &[&str]) -> usize {
        patterns.iter().map(|pattern| self.invalidate(pattern)).sum()
    }

    /// Drops every entry. Results of requests still in flight are discarded.
    pub fn clear(&self) {
        let mut entries = self.lock();
        debug!("clearing {} cache entries", entries.len());
        entries.clear();
    }

    pub fn snapshot(&self, key: &QueryKey) -> Option<QuerySnapshot> {
        let entries = self.lock();
        entries
            .get(key)
            .map(|entry| entry.snapshot(Instant::now(), &self.inner.config))
    }

    fn is_invalidated(&self, key: &QueryKey) -> bool {
        self.lock()
            .get(key)
            .map(|entry| entry.invalidated)
            .unwrap_or(false)
    }

    fn entry<'a>(
        &self,
        entries: &'a mut HashMap<QueryKey, Entry>,
        key: &QueryKey,
        fetcher: Fetcher,
        options: QueryOptions,
    ) -> &'a mut Entry {
        let entry = entries.entry(key.clone()).or_insert_with(|| {
            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            Entry::new(id, key.clone(), fetcher.clone(), options)
        });
        entry.fetcher = fetcher;
        entry.options = options;
        entry
    }

    fn start_fetch(&self, entry: &mut Entry) -> SharedFetch {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let key = entry.key.clone();
        let fetcher = Arc::clone(&entry.fetcher);
        let retry = entry.options.retry.unwrap_or(self.inner.config.retry);
        let retry_delay = self.inner.config.retry_delay;
        let cache = Arc::downgrade(&self.inner);
        debug!("fetching {}", key);

        let outcome = async move {
            let result = run_with_retry(&key, fetcher, retry, retry_delay).await;
            complete(&cache, &key, id, &result);
            result
        }
        .boxed()
        .shared();
        entry.flight = Some(Flight {
            id,
            outcome: outcome.clone(),
        });
        // Runs to completion even if every caller stops waiting.
        tokio::spawn(outcome.clone());
        outcome
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

fn complete(cache: &Weak<CacheInner>, key: &QueryKey, id: u64, result: &Result<Value>) {
    let Some(inner) = cache.upgrade() else {
        return;
    };
    let cache = QueryCache { inner };
    let mut entries = cache.lock();
    let Some(entry) = entries.get_mut(key) else {
        debug!("discarding result for cleared entry {}", key);
        return;
    };
    if entry.flight.as_ref().map(|flight| flight.id) != Some(id) {
        debug!("discarding superseded result for {}", key);
        return;
    }
    entry.flight = None;
    let refetch = match result {
        Ok(value) => {
            entry.value = Some(value.clone());
            entry.error = None;
            entry.fetched_at = Some(Instant::now());
            entry.invalidated = entry.invalidated_in_flight;
            entry.invalidated_in_flight && entry.subscribers > 0
        }
        Err(err) => {
            entry.error = Some(err.clone());
            false
        }
    };
    entry.invalidated_in_flight = false;
    if refetch {
        cache.start_fetch(entry);
    }
    entry.publish(&cache.inner.config);
}

async fn run_with_retry(
    key: &QueryKey,
    fetcher: Fetcher,
    retry: u32,
    retry_delay: Duration,
) -> Result<Value> {
    let mut attempt = 0;
    loop {
        match fetcher().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < retry => {
                attempt += 1;
                warn!("fetch {} failed, retrying: {}", key, err);
                tokio::time::sleep(retry_delay).await;
            }
            Err(err) => {
                debug!("fetch {} failed: {}", key, err);
                return Err(err);
            }
        }
    }
}

/// Handle held by a displayed consumer of one key.
pub struct QuerySubscription {
    cache: QueryCache,
    key: QueryKey,
    entry_id: u64,
    updates: watch::Receiver<QuerySnapshot>,
}

impl QuerySubscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn snapshot(&self) -> QuerySnapshot {
        self.cache
            .snapshot(&self.key)
            .unwrap_or_else(|| self.updates.borrow().clone())
    }

    /// Waits for the next published change. `None` once the entry is cleared.
    pub async fn changed(&mut self) -> Option<QuerySnapshot> {
        self.updates.changed().await.ok()?;
        Some(self.updates.borrow_and_update().clone())
    }
}

impl Drop for QuerySubscription {
    fn drop(&mut self) {
        let mut entries = self.cache.lock();
        if let Some(entry) = entries.get_mut(&self.key)
            && entry.id == self.entry_id
        {
            entry.subscribers = entry.subscribers.saturating_sub(1);
        }
    }
}

/// A cache key paired with its fetcher and the type it decodes to.
pub struct Query<T> {
    pub key: QueryKey,
    pub fetcher: Fetcher,
    marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            fetcher: Arc::clone(&self.fetcher),
            marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Query<T> {
    pub fn new(key: QueryKey, fetcher: Fetcher) -> Self {
        Self {
            key,
            fetcher,
            marker: PhantomData,
        }
    }

    pub async fn get(&self, cache: &QueryCache) -> Result<T> {
        let value = cache.get(&self.key, Arc::clone(&self.fetcher)).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn subscribe(&self, cache: &QueryCache) -> QuerySubscription {
        cache.subscribe(&self.key, Arc::clone(&self.fetcher))
    }
}
