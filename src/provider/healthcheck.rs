//! Latency probing with bounded concurrency and a "lazy" suppression rule.

use crate::outbound::OutboundProxy;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

const PROBE_CONCURRENCY: usize = 10;
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HealthCheck {
    url: String,
    interval: Duration,
    lazy: bool,
    proxies: RwLock<Vec<Arc<dyn OutboundProxy>>>,
    last_touch: AtomicU64,
    running: AtomicBool,
    start_lock: Mutex<()>,
    done: broadcast::Sender<()>,
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

impl HealthCheck {
    pub fn new(url: impl Into<String>, interval: Duration, lazy: bool) -> Self {
        let (done, _) = broadcast::channel(1);
        HealthCheck {
            url: url.into(),
            interval,
            lazy,
            proxies: RwLock::new(Vec::new()),
            last_touch: AtomicU64::new(now_secs()),
            running: AtomicBool::new(false),
            start_lock: Mutex::new(()),
            done,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_auto(&self) -> bool {
        !self.interval.is_zero()
    }

    pub async fn set_proxies(&self, proxies: Vec<Arc<dyn OutboundProxy>>) {
        *self.proxies.write().await = proxies;
    }

    /// Probes every known proxy with bounded concurrency; failures are
    /// absorbed per-proxy and simply not reported as a latency sample.
    pub async fn check(&self) {
        let proxies = self.proxies.read().await.clone();
        let url = self.url.clone();

        let mut futures = FuturesUnordered::new();
        let mut iter = proxies.into_iter();
        let mut in_flight = 0;

        // Seed up to PROBE_CONCURRENCY probes, then keep the window full as
        // each one completes — a simple bounded-concurrency fan-out.
        for proxy in iter.by_ref().take(PROBE_CONCURRENCY) {
            futures.push(probe_one(proxy, url.clone()));
            in_flight += 1;
        }

        while in_flight > 0 {
            if let Some((name, result)) = futures.next().await {
                in_flight -= 1;
                match result {
                    Ok(ms) => tracing::debug!("{}: {}ms", name, ms),
                    Err(e) => tracing::debug!("{}: probe failed: {}", name, e),
                }
                if let Some(proxy) = iter.next() {
                    futures.push(probe_one(proxy, url.clone()));
                    in_flight += 1;
                }
            }
        }
    }

    /// At-most-one-runner probe loop. A second concurrent call while
    /// already running is a no-op.
    pub async fn process(self: &Arc<Self>) {
        {
            let _guard = self.start_lock.lock().unwrap();
            if self.running.swap(true, Ordering::SeqCst) {
                return;
            }
        }

        let mut done_rx = self.done.subscribe();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let last = self.last_touch.load(Ordering::Relaxed);
                    let now = now_secs();
                    if self.lazy && now.saturating_sub(last) >= self.interval.as_secs() {
                        continue;
                    }
                    self.check().await;
                }
                _ = done_rx.recv() => {
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }

    /// Spawns [`HealthCheck::process`] as a background task if auto
    /// health-checking is enabled.
    pub fn spawn(self: &Arc<Self>) {
        if !self.is_auto() {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.process().await;
        });
    }

    pub fn touch(&self) {
        self.last_touch.store(now_secs(), Ordering::Relaxed);
    }

    /// Stops the probe loop. Idempotent; the send is non-blocking and
    /// ignored if no loop is currently listening.
    pub fn close(&self) {
        let _ = self.done.send(());
    }
}

async fn probe_one(proxy: Arc<dyn OutboundProxy>, url: String) -> (String, crate::Result<u64>) {
    let name = proxy.name().to_string();
    let result = tokio::time::timeout(PROBE_TIMEOUT, proxy.url_test(&url, PROBE_TIMEOUT))
        .await
        .unwrap_or_else(|_| Err(crate::Error::Cancelled));
    (name, result)
}
