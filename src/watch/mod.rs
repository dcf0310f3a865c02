//! Filesystem watching.
//!
//! Raw notify events are debounced into batches, filtered against build
//! outputs and ignore rules, folded into net-effect change sets, and mapped
//! to the builds they invalidate.
//!
//! ```text
//! notify → Debouncer (pure timing) → apply_events (index mutation)
//!        → reconcile → rebuild_candidates → scheduler
//! ```

mod debouncer;


pub use debouncer::{DEBOUNCE_MS, Debouncer, FsEvent, FsEventKind};

use crate::build::{BuildMatch, KEY_ALL};
use crate::index::{FileIndex, FileRef};
use crate::serve::DevServer;
use crate::utils::path::to_rel;
use anyhow::{Context, Result};
use globset::Glob;
use notify::{RecursiveMode, Watcher};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Net effect of one debounced batch. The sets are disjoint.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub changed: FxHashSet<String>,
    pub removed: FxHashSet<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Running watcher; `close` tears it down.
pub struct WatchHandle {
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn close(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Start watching the project root. Returns once the watcher is attached
/// and its event loop is running.
pub fn spawn(server: Arc<DevServer>) -> Result<WatchHandle> {
    let (notify_tx, notify_rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = notify_tx.send(res);
    })
    .context("failed to create filesystem watcher")?;
    watcher
        .watch(server.root(), RecursiveMode::Recursive)
        .context("failed to attach filesystem watcher")?;

    let (ready_tx, ready_rx) = crossbeam::channel::bounded::<()>(1);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let thread = std::thread::spawn(move || {
        // Watcher must stay alive for the lifetime of the loop
        let _watcher = watcher;
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("failed to create watch runtime");
        rt.block_on(run_loop(server, notify_rx, shutdown_rx, ready_tx));
    });

    ready_rx
        .recv()
        .context("watcher loop did not signal ready")?;

    Ok(WatchHandle {
        shutdown_tx: Some(shutdown_tx),
        thread: Some(thread),
    })
}

async fn run_loop(
    server: Arc<DevServer>,
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
    ready_tx: crossbeam::channel::Sender<()>,
) {
    let (async_tx, mut async_rx) = tokio::sync::mpsc::channel::<notify::Event>(64);

    // Bridge the sync notify channel into the async loop
    std::thread::spawn(move || {
        while let Ok(result) = notify_rx.recv() {
            match result {
                Ok(event) => {
                    if async_tx.blocking_send(event).is_err() {
                        break;
                    }
                }
                Err(e) => crate::log!("watch"; "notify error: {}", e),
            }
        }
    });

    let _ = ready_tx.send(());
    let mut debouncer = Debouncer::new();

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            Some(event) = async_rx.recv() => debouncer.add_notify(&event),
            _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                if let Some(events) = debouncer.take_if_ready() {
                    process_batch(&server, events);
                }
            }
        }
    }
}

/// One debounced batch: mutate the index, reconcile matches, rebuild.
fn process_batch(server: &Arc<DevServer>, events: Vec<FsEvent>) {
    // Shutdown may land between the timer arming and firing
    if crate::core::is_shutdown() || server.is_stopping() {
        return;
    }

    let dist_paths: Vec<PathBuf> = server
        .matches
        .all()
        .iter()
        .flat_map(|m| m.dist_paths())
        .collect();

    let set = apply_events(&server.index, events, &dist_paths);
    if set.is_empty() {
        return;
    }
    crate::debug!(
        "watch";
        "{} changed, {} removed",
        set.changed.len(),
        set.removed.len()
    );

    // Entrypoints may have appeared or disappeared
    if let Err(e) = server.reconcile() {
        crate::log!("watch"; "reconcile failed: {:#}", e);
        return;
    }

    let files = server.index.snapshot();
    let candidates = rebuild_candidates(&server.matches.all(), &set, &files, server.root());
    let ctx = server.build_context();
    for (build_match, request_path) in candidates {
        server
            .scheduler
            .build(&ctx, &build_match, request_path.as_deref());
    }
}

/// Fold raw events into disjoint net-effect sets, refreshing the file
/// index as we go. Events under build outputs or ignored paths are dropped.
pub fn apply_events(index: &FileIndex, events: Vec<FsEvent>, dist_paths: &[PathBuf]) -> ChangeSet {
    let mut set = ChangeSet::default();

    for event in events {
        if dist_paths.iter().any(|dist| event.path.starts_with(dist)) {
            continue;
        }
        let Some(rel_path) = to_rel(index.root(), &event.path) else {
            continue;
        };
        if rel_path.is_empty() || index.ignore().is_ignored(&rel_path) {
            continue;
        }

        match event.kind {
            FsEventKind::Add | FsEventKind::Change => {
                // A stat that comes back ENOENT means the file is already
                // gone again; fold it into the removed set.
                if index.refresh(&rel_path) {
                    set.removed.remove(&rel_path);
                    set.changed.insert(rel_path);
                } else {
                    set.changed.remove(&rel_path);
                    set.removed.insert(rel_path);
                }
            }
            FsEventKind::Unlink => {
                index.remove(&rel_path);
                set.changed.remove(&rel_path);
                set.removed.insert(rel_path);
            }
        }
    }

    set
}

/// Map a change set to the build results it invalidates: one rebuild per
/// (match, result key) whose `watch` globs intersect the set. Concrete
/// request keys are gated on the builder's servability probe.
pub fn rebuild_candidates(
    matches: &[Arc<BuildMatch>],
    set: &ChangeSet,
    files: &FxHashMap<String, FileRef>,
    work_path: &Path,
) -> Vec<(Arc<BuildMatch>, Option<String>)> {
    let mut candidates = Vec::new();

    for build_match in matches {
        for (result_key, patterns) in build_match.watch_entries() {
            let hit = patterns.iter().any(|pattern| {
                let Ok(glob) = Glob::new(pattern) else {
                    return false;
                };
                let matcher = glob.compile_matcher();
                set.changed
                    .iter()
                    .chain(set.removed.iter())
                    .any(|path| matcher.is_match(path))
            });
            if !hit {
                continue;
            }

            if result_key == KEY_ALL {
                candidates.push((Arc::clone(build_match), None));
            } else if build_match.should_serve(&result_key, files, work_path) {
                candidates.push((Arc::clone(build_match), Some(result_key)));
            }
        }
    }

    candidates
}
