//! Periodic vehicle reader with content-hash dedup and scheduled dispatch.

use crate::provider::vehicle::Vehicle;
use crate::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

pub type ParseFn<T> = Arc<dyn Fn(Vec<u8>) -> Result<T> + Send + Sync>;
pub type OnUpdate<T> = Arc<dyn Fn(T) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct FetcherState<T> {
    last_digest: RwLock<Option<String>>,
    updated_at: RwLock<Option<chrono::DateTime<chrono::Utc>>>,
    _marker: std::marker::PhantomData<T>,
}

/// A timer-driven loop that reads a [`Vehicle`], parses on content change,
/// and dispatches the result through an `on_update` callback. Generic over
/// the parsed output type `T` so a single implementation serves both the
/// mapping-level tests and the proxy-object-producing production path.
pub struct Fetcher<T: Send + Sync + Clone + 'static> {
    name: String,
    vehicle: Arc<dyn Vehicle>,
    interval: Duration,
    /// Whether the vehicle reads a local file. File-backed fetchers get a
    /// stale-on-load check in [`Fetcher::initial`] that HTTP vehicles don't
    /// need, since an HTTP read is always current as of the request.
    file_backed: bool,
    parser: ParseFn<T>,
    on_update: OnUpdate<T>,
    state: Arc<FetcherState<T>>,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + Sync + Clone + 'static> Fetcher<T> {
    pub fn new(
        name: impl Into<String>,
        vehicle: Arc<dyn Vehicle>,
        interval: Duration,
        file_backed: bool,
        parser: ParseFn<T>,
        on_update: OnUpdate<T>,
    ) -> Self {
        Fetcher {
            name: name.into(),
            vehicle,
            interval,
            file_backed,
            parser,
            on_update,
            state: Arc::new(FetcherState {
                last_digest: RwLock::new(None),
                updated_at: RwLock::new(None),
                _marker: std::marker::PhantomData,
            }),
            running: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn updated_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        *self.state.updated_at.read().await
    }

    /// Reads and parses unconditionally; used for the first load. If the
    /// vehicle is file-backed and the file on disk is already older than
    /// `interval`, also schedules a non-fatal out-of-band refresh so a stale
    /// cache catches up without blocking startup on it.
    pub async fn initial(self: &Arc<Self>) -> Result<T> {
        let read = self.vehicle.read().await?;
        let parsed = (self.parser)(read.bytes)?;
        *self.state.last_digest.write().await = Some(read.digest);
        *self.state.updated_at.write().await = Some(chrono::Utc::now());

        if self.file_backed && !self.interval.is_zero() && self.file_is_stale().await {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.refresh_once().await;
            });
        }

        Ok(parsed)
    }

    /// True when the vehicle's on-disk file was last modified longer ago
    /// than `interval`. Any error reading metadata is treated as "not stale"
    /// rather than failing the caller.
    async fn file_is_stale(&self) -> bool {
        let Ok(metadata) = tokio::fs::metadata(self.vehicle.path()).await else {
            return false;
        };
        let Ok(modified) = metadata.modified() else {
            return false;
        };
        modified.elapsed().map(|age| age >= self.interval).unwrap_or(false)
    }

    /// One `try_update`, dispatching to `on_update` on change. Failures are
    /// logged and swallowed rather than propagated: both the ticker loop and
    /// the stale-on-load refresh are background work with no caller to report to.
    async fn refresh_once(self: &Arc<Self>) {
        match self.try_update().await {
            Ok(Some(value)) => (self.on_update)(value).await,
            Ok(None) => {}
            Err(e) => tracing::warn!("fetcher {} refresh failed: {}", self.name, e),
        }
    }

    /// Reads the vehicle; if the content digest is unchanged, returns `Ok(None)`
    /// without invoking the parser (the `same=true` case). Otherwise parses
    /// and returns `Ok(Some(value))`.
    pub async fn try_update(&self) -> Result<Option<T>> {
        let read = self.vehicle.read().await?;
        let mut last = self.state.last_digest.write().await;
        if last.as_deref() == Some(read.digest.as_str()) {
            return Ok(None);
        }
        let parsed = (self.parser)(read.bytes)?;
        *last = Some(read.digest);
        *self.state.updated_at.write().await = Some(chrono::Utc::now());
        Ok(Some(parsed))
    }

    /// Starts the background ticker. Idempotent: a second call while a
    /// loop is already running is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.interval.is_zero() {
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if !this.running.load(Ordering::SeqCst) {
                    break;
                }
                this.refresh_once().await;
            }
        });

        *self.task.lock().unwrap() = Some(handle);
    }

    /// Cancels the interval ticker. Idempotent.
    pub fn destroy(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl<T: Send + Sync + Clone + 'static> Drop for Fetcher<T> {
    fn drop(&mut self) {
        self.destroy();
    }
}
