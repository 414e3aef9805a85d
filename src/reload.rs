//! Scheduled OpenAPI refresh.
//!
//! [`LiveReload`] reloads the registry on a fixed interval. When a new
//! document version arrives the scope discovery cache is recomputed and an
//! optional [`ReloadListener`] is told, so tool listings can be rebuilt.
//! Runs never overlap; a tick that fires while a refresh is still running is
//! skipped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::LiveReloadConfig;
use crate::metrics::{MetricsSink, NoopMetrics, ReloadStatus};
use crate::oauth::discovery::ScopeDiscovery;
use crate::openapi::OpenApi;
use crate::registry::{OpenApiRegistry, ReloadOutcome};

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Notified after a new document version became active.
pub trait ReloadListener: Send + Sync + 'static {
    fn document_updated(&self, document: &OpenApi);
}

impl<F> ReloadListener for F
where
    F: Fn(&OpenApi) + Send + Sync + 'static,
{
    fn document_updated(&self, document: &OpenApi) {
        self(document)
    }
}

/// Resets the in-progress flag, also when a refresh future is dropped.
struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Background refresher of an [`OpenApiRegistry`].
pub struct LiveReload {
    registry: Arc<OpenApiRegistry>,
    discovery: Option<Arc<ScopeDiscovery>>,
    listener: Option<Arc<dyn ReloadListener>>,
    config: LiveReloadConfig,
    retry_delay: Duration,
    in_progress: AtomicBool,
    metrics: Arc<dyn MetricsSink>,
    shutdown: CancellationToken,
}

impl LiveReload {
    pub fn new(registry: Arc<OpenApiRegistry>, config: LiveReloadConfig) -> Self {
        Self {
            registry,
            discovery: None,
            listener: None,
            config,
            retry_delay: RETRY_DELAY,
            in_progress: AtomicBool::new(false),
            metrics: Arc::new(NoopMetrics),
            shutdown: CancellationToken::new(),
        }
    }

    /// Recompute `discovery` whenever the document changes.
    pub fn with_discovery(mut self, discovery: Arc<ScopeDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ReloadListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Pause between failed attempts of one refresh (default 1s).
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Token that stops the background task when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawn the periodic refresh. The first run happens one interval from now.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(&self) {
        let period = self.config.interval;
        tracing::info!(
            interval = ?period,
            max_retries = self.config.max_retries,
            document = %self.registry.document_id(),
            "Starting OpenAPI live reload"
        );

        let mut tick = tokio::time::interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("OpenAPI live reload stopped");
                    break;
                }
                _ = tick.tick() => {
                    self.refresh().await;
                }
            }
        }
    }

    /// Run one refresh with retries.
    ///
    /// Returns `None` when another refresh is still in progress.
    pub async fn refresh(&self) -> Option<ReloadStatus> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("OpenAPI refresh already in progress, skipping this execution");
            return None;
        }
        let _guard = InProgress(&self.in_progress);

        tracing::info!("Refreshing OpenAPI on schedule");
        let started = Instant::now();
        let max_retries = self.config.max_retries.max(1);
        let mut status = ReloadStatus::Failure;

        for attempt in 1..=max_retries {
            match self.registry.reload().await {
                Ok(ReloadOutcome::Unchanged) => {
                    status = ReloadStatus::SuccessNoChange;
                    break;
                }
                Ok(ReloadOutcome::Loaded | ReloadOutcome::Updated) => {
                    status = ReloadStatus::SuccessUpdated;
                    self.document_updated();
                    break;
                }
                Err(e) => {
                    tracing::error!(attempt, max_retries, error = %e, "Error refreshing OpenAPI");
                    if attempt < max_retries {
                        tokio::select! {
                            _ = self.shutdown.cancelled() => break,
                            _ = tokio::time::sleep(self.retry_delay) => {}
                        }
                    }
                }
            }
        }

        if status == ReloadStatus::Failure {
            tracing::warn!(attempts = max_retries, "OpenAPI refresh failed");
        } else {
            tracing::info!(status = status.as_str(), "OpenAPI refreshed successfully");
        }
        self.metrics.live_reload(status, started.elapsed());
        Some(status)
    }

    fn document_updated(&self) {
        if let Some(discovery) = &self.discovery {
            discovery.reload();
        }
        if let (Some(listener), Some(document)) = (&self.listener, self.registry.document()) {
            listener.document_updated(&document);
        }
    }
}

impl std::fmt::Debug for LiveReload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveReload")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("in_progress", &self.in_progress.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScopeDiscoveryConfig;
    use crate::error::{Error, Result};
    use crate::metrics::tests::RecordingSink;
    use crate::registry::DocumentLoader;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Loader that replays queued results and then repeats the last document.
    struct QueueLoader {
        queue: Mutex<VecDeque<Result<OpenApi>>>,
        last: Mutex<Option<OpenApi>>,
        calls: AtomicUsize,
    }

    impl QueueLoader {
        fn new(results: impl IntoIterator<Item = Result<OpenApi>>) -> Arc<Self> {
            Arc::new(Self {
                queue: Mutex::new(results.into_iter().collect()),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DocumentLoader for Arc<QueueLoader> {
        fn document_id(&self) -> &str {
            "test://queue"
        }

        async fn load(&self) -> Result<OpenApi> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.queue.lock().unwrap().pop_front();
            match next {
                Some(Ok(doc)) => {
                    *self.last.lock().unwrap() = Some(doc.clone());
                    Ok(doc)
                }
                Some(Err(e)) => Err(e),
                None => self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .ok_or_else(|| Error::invalid_document("test://queue", ["empty"])),
            }
        }
    }

    fn doc(version: &str, scope: &str) -> OpenApi {
        serde_json::from_value(json!({
            "info": { "title": "Pets", "version": version },
            "components": { "securitySchemes": { "oauth": { "type": "oauth2" } } },
            "paths": { "/pets": { "get": { "security": [{ "oauth": [scope] }] } } }
        }))
        .unwrap()
    }

    fn broken() -> Result<OpenApi> {
        Err(Error::invalid_document("test://queue", ["unresolvable $ref"]))
    }

    async fn loaded_registry(loader: Arc<QueueLoader>) -> Arc<OpenApiRegistry> {
        let registry = Arc::new(OpenApiRegistry::new(loader));
        registry.reload().await.unwrap();
        registry
    }

    fn config(max_retries: u32) -> LiveReloadConfig {
        LiveReloadConfig {
            enabled: true,
            interval: Duration::from_secs(60),
            max_retries,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_refreshes_discovery_and_listener() {
        let loader = QueueLoader::new([Ok(doc("1", "old")), Ok(doc("2", "new"))]);
        let registry = loaded_registry(loader).await;
        let discovery = Arc::new(ScopeDiscovery::new(registry.clone(), &ScopeDiscoveryConfig::default()));
        assert_eq!(discovery.get().to_scope_string(), "old");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_listener = seen.clone();
        let sink = Arc::new(RecordingSink::default());
        let reload = LiveReload::new(registry, config(3))
            .with_discovery(discovery.clone())
            .with_listener(Arc::new(move |doc: &OpenApi| {
                seen_by_listener.lock().unwrap().push(doc.info.version.clone())
            }))
            .with_metrics(sink.clone());

        assert_eq!(reload.refresh().await, Some(ReloadStatus::SuccessUpdated));
        assert_eq!(discovery.get().to_scope_string(), "new");
        assert_eq!(*seen.lock().unwrap(), vec!["2".to_string()]);
        assert_eq!(*sink.reloads.lock().unwrap(), vec![ReloadStatus::SuccessUpdated]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_version_is_no_change() {
        let loader = QueueLoader::new([Ok(doc("1", "a"))]);
        let reload = LiveReload::new(loaded_registry(loader.clone()).await, config(3));
        assert_eq!(reload.refresh().await, Some(ReloadStatus::SuccessNoChange));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let loader = QueueLoader::new([Ok(doc("1", "a")), broken(), broken(), Ok(doc("2", "b"))]);
        let reload = LiveReload::new(loaded_registry(loader.clone()).await, config(3));
        assert_eq!(reload.refresh().await, Some(ReloadStatus::SuccessUpdated));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_after_max_retries() {
        let loader = QueueLoader::new([Ok(doc("1", "a")), broken(), broken()]);
        let registry = loaded_registry(loader.clone()).await;
        let sink = Arc::new(RecordingSink::default());
        let reload = LiveReload::new(registry.clone(), config(2)).with_metrics(sink.clone());

        assert_eq!(reload.refresh().await, Some(ReloadStatus::Failure));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 3);
        assert_eq!(registry.document().unwrap().info.version, "1");
        assert_eq!(*sink.reloads.lock().unwrap(), vec![ReloadStatus::Failure]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_refresh_is_skipped() {
        let loader = QueueLoader::new([Ok(doc("1", "a"))]);
        let reload = LiveReload::new(loaded_registry(loader).await, config(1));

        reload.in_progress.store(true, Ordering::SeqCst);
        assert_eq!(reload.refresh().await, None);

        reload.in_progress.store(false, Ordering::SeqCst);
        assert!(reload.refresh().await.is_some());
        assert!(!reload.in_progress.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_task_runs_and_stops() {
        let loader = QueueLoader::new([Ok(doc("1", "a")), Ok(doc("2", "b"))]);
        let registry = loaded_registry(loader).await;
        let reload = Arc::new(LiveReload::new(registry.clone(), config(1)));
        let token = reload.shutdown_token();
        let handle = reload.start();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(registry.document().unwrap().info.version, "2");

        token.cancel();
        handle.await.unwrap();
    }
}
