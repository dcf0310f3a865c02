//! Build scheduling.
//!
//! Guarantees at-most-one concurrent build per key, applies the rebuild
//! cooldown, and coordinates the blocking-build gate that holds requests
//! while initial builds run.

use super::matches::BuildMatch;
use crate::builders::BuildParams;
use crate::core::epoch_ms;
use crate::index::FileIndex;
use crossbeam::channel::{self, Sender};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::path::Path;
use std::sync::Arc;

/// Refractory period between rebuilds of the same key. Absorbs the burst of
/// no-cache sub-asset requests that follows an HTML rebuild.
pub const COOLDOWN_MS: u64 = 2_000;

/// Outcome of a build request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// A build ran and its outputs were published.
    Built,
    /// Skipped inside the cooldown window.
    Skipped,
    /// The builder failed; the match remains and may be retried.
    Failed(String),
}

type Waiter = Sender<BuildOutcome>;

/// Everything a build invocation needs from the server.
pub struct BuildContext<'a> {
    pub index: &'a FileIndex,
    pub env: &'a FxHashMap<String, String>,
    pub build_env: &'a FxHashMap<String, String>,
    pub work_path: &'a Path,
}

/// Barrier held while one batch of blocking initial builds is outstanding.
pub struct BlockingGate {
    remaining: Mutex<usize>,
    cv: Condvar,
}

impl BlockingGate {
    fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            cv: Condvar::new(),
        }
    }

    /// Block until every build in the batch has completed.
    pub fn wait(&self) {
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            self.cv.wait(&mut remaining);
        }
    }

    fn arrive(&self) {
        let mut remaining = self.remaining.lock();
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.cv.notify_all();
        }
    }
}

pub struct BuildScheduler {
    /// In-progress builds by build key; values are waiters to notify.
    in_progress: DashMap<String, Vec<Waiter>>,
    /// Current blocking-build barrier, if any.
    gate: Mutex<Option<Arc<BlockingGate>>>,
}

impl BuildScheduler {
    pub fn new() -> Self {
        Self {
            in_progress: DashMap::new(),
            gate: Mutex::new(None),
        }
    }

    /// Build (or join the in-flight build of) one (match, request-path) key.
    pub fn build(
        &self,
        ctx: &BuildContext<'_>,
        build_match: &Arc<BuildMatch>,
        request_path: Option<&str>,
    ) -> BuildOutcome {
        let result_key = build_match.result_key(request_path);
        let build_key = build_match.build_key(&result_key);

        let last = build_match.last_built(&result_key);
        if last != 0 && epoch_ms().saturating_sub(last) < COOLDOWN_MS {
            crate::debug!("build"; "cooldown, skipping {}", build_key.replace('\n', " "));
            return BuildOutcome::Skipped;
        }

        let (tx, rx) = channel::bounded(1);
        match self.in_progress.entry(build_key.clone()) {
            Entry::Occupied(mut entry) => {
                // Someone else is building this key; await their result.
                entry.get_mut().push(tx);
                drop(entry);
                return rx
                    .recv()
                    .unwrap_or_else(|_| BuildOutcome::Failed("build worker vanished".into()));
            }
            Entry::Vacant(entry) => {
                entry.insert(Vec::new());
            }
        }

        let outcome = self.execute(ctx, build_match, &result_key);

        let waiters = self
            .in_progress
            .remove(&build_key)
            .map(|(_, waiters)| waiters)
            .unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        outcome
    }

    fn execute(
        &self,
        ctx: &BuildContext<'_>,
        build_match: &Arc<BuildMatch>,
        result_key: &str,
    ) -> BuildOutcome {
        build_match.teardown(result_key);

        let params = BuildParams {
            files: ctx.index.snapshot(),
            entrypoint: build_match.src.clone(),
            config: build_match.config.clone(),
            work_path: ctx.work_path.to_path_buf(),
            env: ctx.env.clone(),
            build_env: ctx.build_env.clone(),
            request_path: (result_key != super::matches::KEY_ALL)
                .then(|| result_key.to_string()),
        };

        // Waiters must always receive an outcome, even if the builder panics.
        let built = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            build_match.builder.build(&params)
        }))
        .unwrap_or_else(|_| Err(anyhow::anyhow!("builder panicked")));

        match built {
            Ok(result) => {
                build_match.publish(result_key, result);
                BuildOutcome::Built
            }
            Err(e) => {
                crate::log!("build"; "error building {}: {:#}", build_match.src, e);
                BuildOutcome::Failed(format!("{e:#}"))
            }
        }
    }

    /// Run a batch of blocking initial builds sequentially, holding the
    /// gate for the duration. A fresh gate replaces any previous one.
    pub fn run_blocking(&self, ctx: &BuildContext<'_>, matches: &[Arc<BuildMatch>]) {
        if matches.is_empty() {
            return;
        }

        crate::log!(
            "build";
            "Creating initial build{}",
            if matches.len() == 1 { "" } else { "s" }
        );

        let gate = Arc::new(BlockingGate::new(matches.len()));
        *self.gate.lock() = Some(Arc::clone(&gate));

        for build_match in matches {
            self.build(ctx, build_match, None);
            gate.arrive();
        }

        // Clear only if a newer batch has not installed its own gate.
        let mut slot = self.gate.lock();
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, &gate)) {
            *slot = None;
        }
    }

    /// Await the active blocking-build gate, if any.
    pub fn wait_blocking(&self) {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.wait();
        }
    }
}

impl Default for BuildScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::matches::KEY_ALL;
    use crate::builders::{Asset, BuildResult, Builder};
    use anyhow::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct SlowBuilder {
        invocations: Arc<AtomicUsize>,
    }
    impl Builder for SlowBuilder {
        fn build(&self, params: &BuildParams) -> Result<BuildResult> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(100));
            let mut result = BuildResult::default();
            result.output.insert(
                params.entrypoint.clone(),
                Asset::FileBlob {
                    data: b"built".to_vec(),
                    content_type: None,
                },
            );
            Ok(result)
        }
        fn has_should_serve(&self) -> bool {
            true
        }
        fn should_serve(&self, _params: &crate::builders::ServeParams<'_>) -> bool {
            true
        }
    }

    struct FailingBuilder;
    impl Builder for FailingBuilder {
        fn build(&self, _params: &BuildParams) -> Result<BuildResult> {
            anyhow::bail!("synthetic failure")
        }
    }

    fn fixture() -> (TempDir, FileIndex) {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("page.html"), "x").unwrap();
        let index = FileIndex::new(temp.path().to_path_buf()).unwrap();
        index.scan().unwrap();
        (temp, index)
    }

    fn make_match(builder: Arc<dyn Builder>) -> Arc<BuildMatch> {
        Arc::new(BuildMatch::new(
            "page.html".to_string(),
            "test".to_string(),
            serde_json::Value::Null,
            builder,
        ))
    }

    #[test]
    fn test_concurrent_builds_deduplicate() {
        let (temp, index) = fixture();
        let env = FxHashMap::default();
        let build_env = FxHashMap::default();
        let ctx = BuildContext {
            index: &index,
            env: &env,
            build_env: &build_env,
            work_path: temp.path(),
        };

        let invocations = Arc::new(AtomicUsize::new(0));
        let build_match = make_match(Arc::new(SlowBuilder {
            invocations: Arc::clone(&invocations),
        }));
        let scheduler = BuildScheduler::new();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let scheduler = &scheduler;
                    let ctx = &ctx;
                    let build_match = &build_match;
                    scope.spawn(move || scheduler.build(ctx, build_match, Some("page.html")))
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), BuildOutcome::Built);
            }
        });

        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert!(build_match.has_asset("page.html"));
    }

    #[test]
    fn test_cooldown_boundaries() {
        let (temp, index) = fixture();
        let env = FxHashMap::default();
        let build_env = FxHashMap::default();
        let ctx = BuildContext {
            index: &index,
            env: &env,
            build_env: &build_env,
            work_path: temp.path(),
        };

        let invocations = Arc::new(AtomicUsize::new(0));
        let build_match = make_match(Arc::new(SlowBuilder {
            invocations: Arc::clone(&invocations),
        }));
        let scheduler = BuildScheduler::new();

        // 1.9s ago: inside the window, rebuild suppressed
        build_match.force_built_at("page.html", epoch_ms() - 1_900);
        assert_eq!(
            scheduler.build(&ctx, &build_match, Some("page.html")),
            BuildOutcome::Skipped
        );
        assert_eq!(invocations.load(Ordering::SeqCst), 0);

        // 2.1s ago: window elapsed, rebuild runs
        build_match.force_built_at("page.html", epoch_ms() - 2_100);
        assert_eq!(
            scheduler.build(&ctx, &build_match, Some("page.html")),
            BuildOutcome::Built
        );
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_build_clears_in_progress() {
        let (temp, index) = fixture();
        let env = FxHashMap::default();
        let build_env = FxHashMap::default();
        let ctx = BuildContext {
            index: &index,
            env: &env,
            build_env: &build_env,
            work_path: temp.path(),
        };

        let build_match = make_match(Arc::new(FailingBuilder));
        let scheduler = BuildScheduler::new();

        assert!(matches!(
            scheduler.build(&ctx, &build_match, None),
            BuildOutcome::Failed(_)
        ));
        assert!(scheduler.in_progress.is_empty());
        // a retry is allowed (still outside cooldown: nothing was published)
        assert_eq!(build_match.last_built(KEY_ALL), 0);
    }

    #[test]
    fn test_blocking_gate_lifecycle() {
        let (temp, index) = fixture();
        let env = FxHashMap::default();
        let build_env = FxHashMap::default();
        let ctx = BuildContext {
            index: &index,
            env: &env,
            build_env: &build_env,
            work_path: temp.path(),
        };

        let invocations = Arc::new(AtomicUsize::new(0));
        let build_match = make_match(Arc::new(SlowBuilder {
            invocations: Arc::clone(&invocations),
        }));
        let scheduler = BuildScheduler::new();

        scheduler.run_blocking(&ctx, std::slice::from_ref(&build_match));

        // gate cleared; waiting returns immediately
        scheduler.wait_blocking();
        assert!(scheduler.gate.lock().is_none());
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }
}
