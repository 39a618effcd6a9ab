// SPDX-License-Identifier: MIT

//! The scheduler: a bounded FIFO queue feeding a fixed pool of Tokio worker
//! tasks, each running one job's worker loop — open a catalog session, run
//! the job, commit or roll back by outcome, stamp an eviction deadline,
//! notify awaiters.
//!
//! Cancellation uses a checked `CancellationToken` per job rather than
//! preemption: a running job's own request handling may consult it (the
//! downloader checks it every chunk; see [`crate::scheduler::JobProgress`]).
//! A cancel delivered to a job that already finished running is a no-op;
//! one delivered before or during execution forces the terminal state to
//! `Interrupted` regardless of what the job body itself returned — the
//! best-effort cancellation contract runtimes like Tokio allow, since they
//! can't truly preempt a worker mid-step.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use inferd_core::job::{Job, JobError, JobId, JobState};
use inferd_core::package::PackageRow;
use inferd_core::{DaemonError, Tensor};
use inferd_net::{download, DownloadLocks, ProgressSink};
use inferd_runtime::InferenceEngine;
use inferd_storage::{Catalog, Layout};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::installer::{InstallOptions, InstallOutcome, Installer};
use crate::loader::Loader;
use crate::pipeline::Pipeline;
use crate::registry::FunctionRegistry;
use crate::remote_index;

/// Where to install from — `/package/install`'s three request shapes.
/// `RemoteName` is resolved against the configured remote index inside
/// the worker, right before the resolved `Url` is downloaded: the lookup is
/// itself a blocking network call, so it belongs in the job like the
/// download that follows it, rather than split across the HTTP frontend and
/// the worker.
#[derive(Debug, Clone)]
pub enum InstallSource {
    LocalFile(PathBuf),
    Url { url: String, sha256: String },
    RemoteName(String),
}

#[derive(Debug, Clone)]
pub struct PackageTarget {
    pub name: String,
    pub version: Option<String>,
}

/// Every unit of work a worker can run. The HTTP layer maps each endpoint
/// onto one of these; the scheduler doesn't know or care which endpoint
/// produced it.
pub enum JobRequest {
    Call { pkg_name: String, fn_name: String, inputs: HashMap<String, Value> },
    CallRaw { pkg_name: String, model_name: String, inputs: HashMap<String, Tensor> },
    Install { source: InstallSource, options: InstallOptions },
    Activate(PackageTarget),
    Deactivate(PackageTarget),
    Remove(PackageTarget),
    /// `/package/search`'s substring query against the remote index —
    /// network I/O, so it runs on a worker like everything else here.
    Search { query: String },
    /// `/package/list`. No I/O at all, but it rides alongside every other
    /// package-lifecycle route, so it gets the same sync/async twin rather
    /// than a one-off plain endpoint.
    List,
}

impl JobRequest {
    /// The method name recorded in the job's `request_info` for logging —
    /// not part of the wire job descriptor.
    fn method_name(&self) -> &'static str {
        match self {
            JobRequest::Call { .. } => "call",
            JobRequest::CallRaw { .. } => "call_raw",
            JobRequest::Install { .. } => "package.install",
            JobRequest::Activate(_) => "package.activate",
            JobRequest::Deactivate(_) => "package.deactivate",
            JobRequest::Remove(_) => "package.remove",
            JobRequest::Search { .. } => "package.search",
            JobRequest::List => "package.list",
        }
    }
}

pub struct SchedulerConfig {
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub cache_hold_time: Duration,
    /// The remote package index URL. `None` means `/package/install`'s
    /// `{name}` form and `/package/search` both fail with `RepositoryError`
    /// — there is nowhere to look.
    pub remote_index_url: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            worker_count: 16,
            cache_hold_time: Duration::from_secs(60),
            remote_index_url: None,
        }
    }
}

/// Reports download progress into a job's `progress_extras`, updating the
/// active job's download-progress and download-size fields as bytes arrive.
struct JobProgressSink {
    job: Arc<Mutex<Job>>,
    cancel: CancellationToken,
}

impl ProgressSink for JobProgressSink {
    fn set_size(&self, total_bytes: u64) {
        self.job.lock().extras.insert("download-size".to_string(), Value::from(total_bytes));
    }

    fn add_progress(&self, bytes_so_far: u64) {
        self.job.lock().extras.insert("download-progress".to_string(), Value::from(bytes_so_far));
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

struct CacheEntry {
    handle: JobHandle,
    cache_expiry: Mutex<Option<Instant>>,
}

/// A handle to a submitted job: its id, its shared state, and the means to
/// wait for or cancel it. Cheap to clone — everything behind it is `Arc`.
#[derive(Clone)]
pub struct JobHandle {
    uid: JobId,
    job: Arc<Mutex<Job>>,
    notify: Arc<Notify>,
    cancel: CancellationToken,
}

impl JobHandle {
    pub fn uid(&self) -> JobId {
        self.uid.clone()
    }

    /// A point-in-time copy of the job's bookkeeping record.
    pub fn snapshot(&self) -> Job {
        self.job.lock().clone()
    }

    /// Block until the job reaches a terminal state, then surface its
    /// result or error.
    pub async fn await_result(&self) -> Result<Value, JobError> {
        loop {
            {
                let job = self.job.lock();
                match job.state {
                    JobState::Done => return Ok(job.result.clone().unwrap_or(Value::Null)),
                    JobState::Error | JobState::Interrupted => {
                        return Err(job.error.clone().unwrap_or(JobError {
                            error: "Internal Error",
                            msg: "job terminated without an error record".to_string(),
                            status_code: 500,
                            data: None,
                        }));
                    }
                    _ => {}
                }
            }
            self.notify.notified().await;
        }
    }

    /// Request cancellation: idempotent, and best-effort once the job has
    /// already entered `Running`.
    pub fn cancel(&self) {
        self.cancel.cancel();
        let mut job = self.job.lock();
        if !job.state.is_terminal() {
            job.transition(JobState::Interrupted);
        }
        self.notify.notify_waiters();
    }
}

struct QueuedJob {
    uid: JobId,
    job: Arc<Mutex<Job>>,
    notify: Arc<Notify>,
    cancel: CancellationToken,
    request: JobRequest,
}

/// The bound, everything-wired scheduler: queue, worker pool, job cache,
/// janitor, plus every collaborator a job body needs (catalog, pipeline,
/// installer, loader, registry, downloader).
pub struct Scheduler<E: InferenceEngine + 'static> {
    sender: mpsc::Sender<QueuedJob>,
    cache: Arc<Mutex<HashMap<JobId, CacheEntry>>>,
    cache_hold_time: Duration,
    _workers: Vec<tokio::task::JoinHandle<()>>,
    _janitor: tokio::task::JoinHandle<()>,
    pipeline: Arc<Pipeline<E>>,
    catalog: Arc<Catalog>,
}

struct Worker<E: InferenceEngine + 'static> {
    catalog: Arc<Catalog>,
    layout: Layout,
    pipeline: Arc<Pipeline<E>>,
    installer: Arc<Installer>,
    loader: Arc<Loader>,
    registry: Arc<FunctionRegistry>,
    http_client: reqwest::Client,
    download_locks: DownloadLocks,
    remote_index_url: Option<String>,
    cache: Arc<Mutex<HashMap<JobId, CacheEntry>>>,
    cache_hold_time: Duration,
}

impl<E: InferenceEngine + 'static> Clone for Worker<E> {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            layout: self.layout.clone(),
            pipeline: Arc::clone(&self.pipeline),
            installer: Arc::clone(&self.installer),
            loader: Arc::clone(&self.loader),
            registry: Arc::clone(&self.registry),
            http_client: self.http_client.clone(),
            download_locks: self.download_locks.clone(),
            remote_index_url: self.remote_index_url.clone(),
            cache: Arc::clone(&self.cache),
            cache_hold_time: self.cache_hold_time,
        }
    }
}

impl<E: InferenceEngine + 'static> Scheduler<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        config: SchedulerConfig,
        layout: Layout,
        catalog: Arc<Catalog>,
        pipeline: Arc<Pipeline<E>>,
        installer: Arc<Installer>,
        loader: Arc<Loader>,
        registry: Arc<FunctionRegistry>,
        http_client: reqwest::Client,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let cache: Arc<Mutex<HashMap<JobId, CacheEntry>>> = Arc::new(Mutex::new(HashMap::new()));
        let worker_ctx = Worker {
            catalog: Arc::clone(&catalog),
            layout,
            pipeline: Arc::clone(&pipeline),
            installer,
            loader,
            registry,
            http_client,
            download_locks: DownloadLocks::new(),
            remote_index_url: config.remote_index_url,
            cache: Arc::clone(&cache),
            cache_hold_time: config.cache_hold_time,
        };

        let mut workers = Vec::with_capacity(config.worker_count);
        for _ in 0..config.worker_count {
            let receiver = Arc::clone(&receiver);
            let ctx = worker_ctx.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let queued = {
                        let mut guard = receiver.lock().await;
                        guard.recv().await
                    };
                    let Some(queued) = queued else { break };
                    ctx.run(queued).await;
                }
            }));
        }

        let janitor_cache = Arc::clone(&cache);
        let hold_time = config.cache_hold_time;
        let janitor = tokio::spawn(async move {
            loop {
                tokio::time::sleep(hold_time).await;
                let now = Instant::now();
                janitor_cache.lock().retain(|_, entry| match *entry.cache_expiry.lock() {
                    Some(expiry) => expiry > now,
                    None => true,
                });
            }
        });

        Self {
            sender,
            cache,
            cache_hold_time: hold_time,
            _workers: workers,
            _janitor: janitor,
            pipeline,
            catalog,
        }
    }

    /// Non-blocking: fails with `Overloaded` if the queue is at capacity.
    pub fn submit(&self, request: JobRequest) -> Result<JobHandle, DaemonError> {
        let mut job = Job::new();
        job.request_info =
            Some(inferd_core::RequestInfo { method: request.method_name(), received_at: std::time::SystemTime::now() });
        job.transition(JobState::Queued);
        let uid = job.uid.clone();
        let job = Arc::new(Mutex::new(job));
        let notify = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let queued =
            QueuedJob { uid: uid.clone(), job: Arc::clone(&job), notify: Arc::clone(&notify), cancel: cancel.clone(), request };

        self.sender.try_send(queued).map_err(|_| DaemonError::Overloaded)?;

        let handle = JobHandle { uid: uid.clone(), job, notify, cancel };
        self.cache
            .lock()
            .insert(uid, CacheEntry { handle: handle.clone(), cache_expiry: Mutex::new(None) });
        Ok(handle)
    }

    /// Fails with `NoSuchJob` if unknown or evicted.
    pub fn get(&self, uid: &JobId) -> Result<JobHandle, DaemonError> {
        self.cache
            .lock()
            .get(uid)
            .map(|entry| entry.handle.clone())
            .ok_or_else(|| DaemonError::NoSuchJob(uid.to_string()))
    }

    pub fn cancel(&self, uid: &JobId) -> Result<(), DaemonError> {
        self.get(uid)?.cancel();
        Ok(())
    }

    pub fn cache_hold_time(&self) -> Duration {
        self.cache_hold_time
    }

    pub fn pipeline(&self) -> &Arc<Pipeline<E>> {
        &self.pipeline
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }
}

fn resolve_target(session: &inferd_storage::CatalogSession<'_>, target: &PackageTarget) -> Result<PackageRow, DaemonError> {
    let found = match &target.version {
        Some(version) => session.package_by_name_version(&target.name, Some(version)),
        None => session.package_latest(&target.name),
    };
    found.ok_or_else(|| DaemonError::MissingEntry(format!("package {}", target.name)))
}

impl<E: InferenceEngine + 'static> Worker<E> {
    async fn run(&self, queued: QueuedJob) {
        let QueuedJob { uid, job, notify, cancel, request } = queued;

        if cancel.is_cancelled() {
            notify.notify_waiters();
            return;
        }
        {
            let mut guard = job.lock();
            if guard.state.is_terminal() {
                notify.notify_waiters();
                return;
            }
            guard.transition(JobState::Running);
        }

        let started = Instant::now();
        let method = job.lock().request_info.map(|info| info.method).unwrap_or("unknown");
        tracing::debug!(job_id = %uid, method, "job started");

        let catalog = Arc::clone(&self.catalog);
        let ctx = self.clone();
        let job_for_blocking = Arc::clone(&job);
        let cancel_for_blocking = cancel.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let mut session = catalog.session();
                let result = ctx.execute(&mut session, request, &job_for_blocking, &cancel_for_blocking);
                (session, result)
            }));
            match result {
                Ok((session, result)) => (Some(session), result),
                Err(panic) => {
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "job body panicked".to_string());
                    (None, Err(DaemonError::InternalError(msg)))
                }
            }
        })
        .await;

        let (session, result) = match outcome {
            Ok(pair) => pair,
            Err(join_err) => (None, Err(DaemonError::InternalError(join_err.to_string()))),
        };

        let forced_interrupt = cancel.is_cancelled();
        {
            let mut guard = job.lock();
            if !guard.state.is_terminal() {
                if forced_interrupt {
                    guard.transition(JobState::Interrupted);
                } else {
                    match &result {
                        Ok(value) => {
                            guard.result = Some(value.clone());
                            guard.transition(JobState::Done);
                        }
                        Err(DaemonError::JobInterrupted) => {
                            guard.transition(JobState::Interrupted);
                        }
                        Err(err) => {
                            guard.error = Some(JobError::from(err));
                            guard.transition(JobState::Error);
                        }
                    }
                }
            }
            let elapsed_ms = started.elapsed().as_millis();
            match &guard.state {
                JobState::Error => tracing::warn!(job_id = %uid, method, elapsed_ms, error = ?guard.error, "job failed"),
                JobState::Interrupted => tracing::info!(job_id = %uid, method, elapsed_ms, "job interrupted"),
                _ => tracing::debug!(job_id = %uid, method, elapsed_ms, "job finished"),
            }
        }

        if let Some(session) = session {
            if !forced_interrupt && matches!(result, Ok(_)) {
                if let Err(e) = session.commit() {
                    tracing::warn!(error = %e, "catalog commit failed after job completion");
                }
            } else {
                session.rollback();
            }
        }

        if let Some(entry) = self.cache.lock().get(&uid) {
            *entry.cache_expiry.lock() = Some(Instant::now() + self.cache_hold_time);
        }

        notify.notify_waiters();
    }

    fn execute(
        &self,
        session: &mut inferd_storage::CatalogSession<'_>,
        request: JobRequest,
        job: &Arc<Mutex<Job>>,
        cancel: &CancellationToken,
    ) -> Result<Value, DaemonError> {
        match request {
            JobRequest::Call { pkg_name, fn_name, inputs } => {
                self.pipeline.call(session, &pkg_name, &fn_name, inputs, cancel)
            }
            JobRequest::CallRaw { pkg_name, model_name, inputs } => {
                let outputs = self.pipeline.call_raw(session, &pkg_name, &model_name, inputs, cancel)?;
                let encoded: HashMap<String, Value> = outputs
                    .into_iter()
                    .map(|(name, tensor)| (name, serde_json::to_value(tensor.encode()).unwrap_or(Value::Null)))
                    .collect();
                Ok(serde_json::to_value(encoded).unwrap_or(Value::Null))
            }
            JobRequest::Install { source, options } => self.install(session, source, options, job, cancel),
            JobRequest::Activate(target) => {
                let row = resolve_target(session, &target)?;
                if !self.loader.is_loaded(row.package_id) {
                    let dir = self.layout.package_install_dir(&row.install_path);
                    self.loader.load(&self.registry, row.package_id, &dir, crate::loader::MODULE_FILE_NAME)?;
                }
                session.set_active(row.package_id, true)?;
                Ok(serde_json::to_value(row).unwrap_or(Value::Null))
            }
            JobRequest::Deactivate(target) => {
                let row = resolve_target(session, &target)?;
                session.set_active(row.package_id, false)?;
                self.loader.unload(&self.registry, row.package_id);
                Ok(serde_json::to_value(row).unwrap_or(Value::Null))
            }
            JobRequest::Remove(target) => {
                let row = resolve_target(session, &target)?;
                self.loader.unload(&self.registry, row.package_id);
                session.remove_package(row.package_id)?;
                Ok(serde_json::to_value(row).unwrap_or(Value::Null))
            }
            JobRequest::Search { query } => {
                let entries = self.fetch_remote_index()?;
                let found = remote_index::search(&entries, &query);
                Ok(serde_json::to_value(found).unwrap_or(Value::Null))
            }
            JobRequest::List => Ok(serde_json::to_value(session.list_packages()).unwrap_or(Value::Null)),
        }
    }

    fn fetch_remote_index(&self) -> Result<Vec<remote_index::RemoteIndexEntry>, DaemonError> {
        let url = self
            .remote_index_url
            .as_deref()
            .ok_or_else(|| DaemonError::RepositoryError("no remote index configured".to_string()))?;
        tokio::runtime::Handle::current().block_on(remote_index::fetch(&self.http_client, url))
    }

    fn install(
        &self,
        session: &mut inferd_storage::CatalogSession<'_>,
        source: InstallSource,
        options: InstallOptions,
        job: &Arc<Mutex<Job>>,
        cancel: &CancellationToken,
    ) -> Result<Value, DaemonError> {
        let source = match source {
            InstallSource::RemoteName(name) => {
                let entries = self.fetch_remote_index()?;
                let entry = remote_index::resolve(&entries, &name)
                    .ok_or_else(|| DaemonError::MissingEntry(format!("remote package {name}")))?;
                InstallSource::Url { url: entry.url, sha256: entry.sha256 }
            }
            other => other,
        };

        let archive_path = match source {
            InstallSource::LocalFile(path) => path,
            InstallSource::Url { url, sha256 } => {
                if cancel.is_cancelled() {
                    return Err(DaemonError::JobInterrupted);
                }
                let sink = JobProgressSink { job: Arc::clone(job), cancel: cancel.clone() };
                tokio::runtime::Handle::current().block_on(download(
                    &self.http_client,
                    &self.download_locks,
                    self.layout.root(),
                    &url,
                    &sha256,
                    &sink,
                ))?
            }
            InstallSource::RemoteName(_) => {
                return Err(DaemonError::InternalError("remote name resolved twice".to_string()));
            }
        };

        let outcome = self.installer.install(session, &self.loader, &self.registry, &archive_path, options)?;
        let row = match outcome {
            InstallOutcome::Installed(row) | InstallOutcome::AlreadyExists(row) => row,
        };
        Ok(serde_json::to_value(row).unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inferd_core::DType;
    use inferd_runtime::fake::FakeEngine;
    use inferd_runtime::SessionCache;

    fn build_scheduler(dir: &std::path::Path) -> Scheduler<FakeEngine> {
        let layout = Layout::new(dir);
        layout.ensure_dirs().expect("ensure dirs");
        let catalog = Arc::new(Catalog::open(layout.catalog_path()).expect("open catalog"));
        let registry = Arc::new(FunctionRegistry::new());
        let cache = SessionCache::new(FakeEngine::new(), Duration::from_secs(30));
        let pipeline = Arc::new(Pipeline::new(layout.clone(), Arc::clone(&registry), cache));
        let installer = Arc::new(Installer::new(layout.clone()));
        let loader = Arc::new(Loader::new());

        Scheduler::start(
            SchedulerConfig {
                queue_capacity: 16,
                worker_count: 2,
                cache_hold_time: Duration::from_millis(50),
                remote_index_url: None,
            },
            layout,
            catalog,
            pipeline,
            installer,
            loader,
            registry,
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn call_on_missing_package_surfaces_missing_function() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scheduler = build_scheduler(dir.path());

        let handle = scheduler
            .submit(JobRequest::Call { pkg_name: "ghost".to_string(), fn_name: "identity".to_string(), inputs: HashMap::new() })
            .expect("submit");
        let err = handle.await_result().await.unwrap_err();
        assert_eq!(err.error, "Missing Function");
    }

    #[tokio::test]
    async fn cancel_before_dispatch_marks_job_interrupted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scheduler = build_scheduler(dir.path());

        let handle = scheduler
            .submit(JobRequest::Call { pkg_name: "ghost".to_string(), fn_name: "identity".to_string(), inputs: HashMap::new() })
            .expect("submit");
        handle.cancel();
        let err = handle.await_result().await.unwrap_err();
        assert_eq!(err.error, "Job Interrupted");
    }

    #[tokio::test]
    async fn call_raw_against_identity_model_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scheduler = build_scheduler(dir.path());

        {
            let mut session = scheduler.catalog().session();
            let pkg = session.insert_package("echo", None, None, "install-1").expect("insert package");
            session.insert_model(pkg.package_id, "y", inferd_core::package::ModelKind::Onnx, "y.onnx").expect("insert model");
            session.set_active(pkg.package_id, true).expect("activate");
            session.commit().expect("commit");
        }
        std::fs::create_dir_all(Layout::new(dir.path()).package_install_dir("install-1")).expect("mkdir");
        std::fs::write(Layout::new(dir.path()).package_install_dir("install-1").join("y.onnx"), b"fake").expect("write");

        let tensor = Tensor::new(DType::Float32, vec![1], vec![0, 0, 128, 63]).expect("tensor");
        let mut inputs = HashMap::new();
        inputs.insert("x".to_string(), tensor);

        let handle = scheduler
            .submit(JobRequest::CallRaw { pkg_name: "echo".to_string(), model_name: "y".to_string(), inputs })
            .expect("submit");
        let value = handle.await_result().await.expect("call_raw succeeds");
        assert!(value.get("y").is_some());
    }

    #[tokio::test]
    async fn get_after_eviction_is_no_such_job() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scheduler = build_scheduler(dir.path());
        let handle = scheduler
            .submit(JobRequest::Call { pkg_name: "ghost".to_string(), fn_name: "identity".to_string(), inputs: HashMap::new() })
            .expect("submit");
        let uid = handle.uid();
        let _ = handle.await_result().await;
        tokio::time::sleep(scheduler.cache_hold_time() * 3).await;
        assert!(scheduler.get(&uid).is_err());
    }
}
