//! Recurring sampling of live entity values into the store.
//!
//! The sampler is an explicit, cancellable recurring task. Ticks are
//! awaited inline, so two ticks can never overlap; when a tick runs
//! past the interval the next tick is skipped rather than queued.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::storage::{DuckDbBackend, SampleStore};

/// Supplies the current value of a monitored entity, if one exists.
pub trait ValueSource: Send + Sync + 'static {
    fn current_value(&self, entity_key: &str) -> Option<f64>;
}

/// Runs one sampling pass: reconciles the known entity list and
/// appends one raw sample per entity that has a current value.
///
/// Returns the number of samples appended. Per-entity append failures
/// are logged and skipped so one broken entity never stalls the rest.
pub async fn sample_tick(store: &DuckDbBackend, source: &dyn ValueSource) -> Result<usize> {
    let entities = store.list_entities().await?;
    let mut appended = 0;
    let now = Utc::now();

    for entity in &entities {
        let Some(value) = source.current_value(&entity.entity_key) else {
            continue;
        };
        match store.append(&entity.entity_key, now, value).await {
            Ok(()) => appended += 1,
            Err(err) => {
                tracing::warn!(entity = %entity.entity_key, error = %err, "sample append failed");
            }
        }
    }

    tracing::debug!(entities = entities.len(), appended, "sampling tick");
    Ok(appended)
}

/// Cancellable periodic sampler.
pub struct Sampler {
    store: Arc<DuckDbBackend>,
    source: Arc<dyn ValueSource>,
    interval: Duration,
    handle: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

impl Sampler {
    pub fn new(store: Arc<DuckDbBackend>, source: Arc<dyn ValueSource>, interval: Duration) -> Self {
        Self {
            store,
            source,
            interval,
            handle: None,
            shutdown: None,
        }
    }

    /// Starts the recurring task. Starting an already-running sampler
    /// is a no-op.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }

        let (tx, mut rx) = watch::channel(false);
        let store = Arc::clone(&self.store);
        let source = Arc::clone(&self.source);
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = sample_tick(&store, source.as_ref()).await {
                            tracing::warn!(error = %err, "sampling tick failed");
                        }
                    }
                    _ = rx.changed() => break,
                }
            }
        });

        self.shutdown = Some(tx);
        self.handle = Some(handle);
        tracing::info!(interval_secs = self.interval.as_secs(), "sampler started");
    }

    /// Signals the recurring task to stop and waits for it to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
            tracing::info!("sampler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}
