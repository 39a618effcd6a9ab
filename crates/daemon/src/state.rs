// SPDX-License-Identifier: MIT

//! Shared state handed to every axum handler through `State<AppState>`, and
//! the startup wiring that builds it: storage layout, catalog schema init,
//! the function registry, the handler loader, and finally the worker pool
//! and janitor the scheduler spawns on [`Scheduler::start`].

use std::sync::Arc;
use std::time::Duration;

use inferd_core::DaemonError;
use inferd_engine::{FunctionRegistry, Installer, Loader, Pipeline, Scheduler, SchedulerConfig};
use inferd_runtime::fake::FakeEngine;
use inferd_runtime::SessionCache;
use inferd_storage::{Catalog, Layout, ResultStore};

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler<FakeEngine>>,
    pub results: ResultStore,
}

impl AppState {
    /// Wire every collaborator the scheduler needs and start its worker
    /// pool and janitor. A real inference engine binding would replace
    /// [`FakeEngine`] here; the tensor runtime itself is treated as an
    /// out-of-scope opaque adapter this workspace doesn't implement.
    pub fn bootstrap(config: &Config) -> Result<Self, DaemonError> {
        let layout = Layout::new(&config.root_dir);
        layout
            .ensure_dirs()
            .map_err(|e| DaemonError::PackageStorageError(format!("creating storage layout: {e}")))?;

        let catalog = Arc::new(Catalog::open(layout.catalog_path())?);
        let registry = Arc::new(FunctionRegistry::new());
        let cache = SessionCache::new(FakeEngine::new(), Duration::from_secs(30));
        let pipeline = Arc::new(Pipeline::new(layout.clone(), Arc::clone(&registry), cache));
        let installer = Arc::new(Installer::new(layout.clone()));
        let loader = Arc::new(Loader::new());
        let http_client = reqwest::Client::new();

        let scheduler = Arc::new(Scheduler::start(
            SchedulerConfig {
                queue_capacity: config.queue_capacity,
                worker_count: config.worker_count,
                cache_hold_time: config.cache_hold_time(),
                remote_index_url: config.remote_index_url.clone(),
            },
            layout.clone(),
            catalog,
            pipeline,
            installer,
            loader,
            registry,
            http_client,
        ));

        Ok(Self { scheduler, results: ResultStore::new(layout) })
    }
}
