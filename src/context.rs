//! Application context wiring the components together.
//!
//! Everything is constructed explicitly and passed down; there is no
//! process-wide registry. `start`/`stop` bound the sampler lifecycle.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::error::Result;
use crate::export::Exporter;
use crate::scheduler::{Sampler, ValueSource};
use crate::storage::DuckDbBackend;

/// Owns the store, exporter, and sampler for one archiver instance.
pub struct ArchiverContext {
    store: Arc<DuckDbBackend>,
    exporter: Exporter,
    sampler: Sampler,
}

impl ArchiverContext {
    /// Opens the store, creates the schema, and wires the exporter and
    /// sampler. The store doubles as entity registry and metadata
    /// selector; hosts with a richer registry construct `Exporter`
    /// directly.
    pub async fn new(settings: &Settings, source: Arc<dyn ValueSource>) -> Result<Self> {
        let store = Arc::new(DuckDbBackend::new(
            &settings.storage.path,
            Duration::from_secs(settings.storage.op_timeout_secs),
        )?);
        store.init().await?;

        let exporter = Exporter::new(
            store.clone(),
            store.clone(),
            store.clone(),
            &settings.export.directory,
        )?;
        let sampler = Sampler::new(
            store.clone(),
            source,
            Duration::from_secs(settings.sampling.interval_secs),
        );

        Ok(Self {
            store,
            exporter,
            sampler,
        })
    }

    /// Starts periodic sampling.
    pub fn start(&mut self) {
        self.sampler.start();
    }

    /// Stops periodic sampling and waits for the in-flight tick.
    pub async fn stop(&mut self) {
        self.sampler.stop().await;
    }

    pub fn store(&self) -> Arc<DuckDbBackend> {
        self.store.clone()
    }

    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }
}
