//! The dev server: single owner of all serve-time state, plus the
//! blocking request loop.

mod dispatcher;
mod headers;
mod invoke;
mod lifecycle;
mod listing;
mod proxy;
mod respond;


pub use dispatcher::RequestInfo;
pub use lifecycle::ListenSpec;

use crate::build::{BuildContext, BuildMatch, BuildScheduler, MatchRegistry};
use crate::builders::BuilderRegistry;
use crate::config::NowConfig;
use crate::index::FileIndex;
use crate::watch::{self, WatchHandle};
use anyhow::{Context, Result, anyhow, bail};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use tiny_http::Server;

/// Owner of the file index, match registry, scheduler, watcher, and
/// listener. All serve-time state hangs off this object.
pub struct DevServer {
    root: PathBuf,
    pub config: NowConfig,
    pub index: FileIndex,
    pub matches: MatchRegistry,
    pub builders: BuilderRegistry,
    pub scheduler: BuildScheduler,
    pub pod_id: String,
    stopping: AtomicBool,
    http: OnceLock<Arc<Server>>,
    bound_addr: RwLock<Option<String>>,
    watch: Mutex<Option<WatchHandle>>,
    update_task: Mutex<Option<JoinHandle<()>>>,
}

impl DevServer {
    /// Construct a server for a project directory. The directory must exist.
    pub fn new(root: PathBuf, config: NowConfig) -> Result<Arc<Self>> {
        if !root.is_dir() {
            bail!("project directory does not exist: {}", root.display());
        }
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to resolve {}", root.display()))?;
        let index = FileIndex::new(root.clone())?;

        Ok(Arc::new(Self {
            root,
            config,
            index,
            matches: MatchRegistry::new(),
            builders: BuilderRegistry::new(),
            scheduler: BuildScheduler::new(),
            pod_id: headers::generate_pod_id(),
            stopping: AtomicBool::new(false),
            http: OnceLock::new(),
            bound_addr: RwLock::new(None),
            watch: Mutex::new(None),
            update_task: Mutex::new(None),
        }))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Address the listener bound to, once bound.
    pub fn addr(&self) -> Option<String> {
        self.bound_addr.read().clone()
    }

    pub fn build_context(&self) -> BuildContext<'_> {
        BuildContext {
            index: &self.index,
            env: &self.config.env,
            build_env: &self.config.build_env,
            work_path: &self.root,
        }
    }

    /// Refresh the match registry against the current file list, running
    /// any blocking initial builds before returning.
    pub fn reconcile(&self) -> Result<()> {
        let outcome =
            self.matches
                .reconcile(&self.config, &self.index.snapshot(), &self.builders)?;
        if !outcome.blocking.is_empty() {
            self.scheduler
                .run_blocking(&self.build_context(), &outcome.blocking);
        }
        Ok(())
    }

    /// First match holding a built asset under this key.
    pub fn find_asset_match(&self, asset_key: &str) -> Option<Arc<BuildMatch>> {
        self.matches.find_asset(asset_key)
    }

    /// First match whose builder lazily claims this request path.
    pub fn find_servable(&self, request_path: &str) -> Option<Arc<BuildMatch>> {
        let files = self.index.snapshot();
        self.matches
            .all()
            .into_iter()
            .find(|m| m.should_serve(request_path, &files, &self.root))
    }

    /// The router's `check` capability: does (or could) a built asset
    /// exist for this path?
    pub fn probe_asset(&self, dest: &str) -> bool {
        let decoded = crate::utils::path::decode_path(dest);
        let key = decoded.trim_start_matches('/');
        if key.is_empty() {
            return false;
        }
        self.find_asset_match(key).is_some() || self.find_servable(key).is_some()
    }

    /// Builder-module update path: purge caches, drop affected matches,
    /// re-reconcile so fresh bindings are created.
    pub fn apply_builder_updates(&self, modules: &[String]) {
        if modules.is_empty() {
            return;
        }
        crate::log!("build"; "updated builders: {}", modules.join(", "));
        self.builders.purge(modules);
        let removed = self.matches.purge_use(modules);
        crate::debug!("build"; "invalidated {} matches", removed);
        if let Err(e) = self.reconcile() {
            crate::log!("build"; "reconcile after update failed: {:#}", e);
        }
    }

    /// Bring up everything except the listener: builder install, initial
    /// scan, initial builds, the update task, and the watcher.
    pub fn prepare(self: &Arc<Self>) -> Result<()> {
        let uses: Vec<&str> = self.config.builds.iter().map(|b| b.use_.as_str()).collect();
        self.builders.install(&uses)?;

        let count = self.index.scan()?;
        crate::debug!("serve"; "indexed {} files", count);

        self.reconcile()?;

        let task_server = Arc::clone(self);
        *self.update_task.lock() = Some(std::thread::spawn(move || {
            let updated = task_server.builders.check_updates();
            if !updated.is_empty() {
                task_server.apply_builder_updates(&updated);
            }
        }));

        *self.watch.lock() = Some(watch::spawn(Arc::clone(self))?);
        Ok(())
    }

    /// Bind the listener and register it for Ctrl+C unblocking.
    pub fn bind(&self, spec: &ListenSpec) -> Result<String> {
        let (server, addr) = lifecycle::bind(spec)?;
        let server = Arc::new(server);
        self.http
            .set(Arc::clone(&server))
            .map_err(|_| anyhow!("listener already bound"))?;
        *self.bound_addr.write() = Some(addr.clone());
        crate::core::register_server(server);
        Ok(addr)
    }

    /// Accept requests until the listener is unblocked. Each request is
    /// handled on a pool thread so builds cannot stall the accept loop.
    pub fn serve_requests(self: &Arc<Self>) {
        let Some(server) = self.http.get().cloned() else {
            return;
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .expect("failed to create request pool");

        for request in server.incoming_requests() {
            let this = Arc::clone(self);
            pool.spawn(move || dispatcher::handle(&this, request));
        }
    }

    /// Full lifecycle: prepare, bind, serve, tear down.
    pub fn start(self: &Arc<Self>, spec: &ListenSpec) -> Result<()> {
        self.prepare()?;
        let addr = self.bind(spec)?;
        match spec {
            ListenSpec::Port(_) => crate::log!("serve"; "ready! available at http://{}", addr),
            ListenSpec::Unix(_) => crate::log!("serve"; "ready! listening on {}", addr),
        }
        self.serve_requests();
        self.stop();
        Ok(())
    }

    /// Tear everything down. Idempotent; later calls return immediately.
    pub fn stop(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }

        self.matches.shutdown_all();
        if let Some(server) = self.http.get() {
            // harmless when the accept loop never started
            server.unblock();
        }
        if let Some(watch) = self.watch.lock().take() {
            watch.close();
        }
        if let Some(task) = self.update_task.lock().take() {
            let _ = task.join();
        }
        crate::debug!("serve"; "stopped");
    }
}
