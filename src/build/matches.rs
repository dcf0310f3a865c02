//! Build matches: an entrypoint bound to a builder, plus accumulated
//! build results and their published assets.

use crate::builders::{Asset, BuildResult, Builder, ServeParams};
use crate::core::epoch_ms;
use crate::index::FileRef;
use crate::router::RouteRule;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel result key for builders whose assets are not keyed by
/// request path.
pub const KEY_ALL: &str = "all";

/// Per-result bookkeeping kept after a publish.
#[derive(Debug, Default)]
pub struct StoredResult {
    pub routes: Vec<RouteRule>,
    pub watch: Vec<String>,
    pub dist_path: Option<PathBuf>,
    pub asset_keys: Vec<String>,
    /// Epoch ms of the publish; drives the rebuild cooldown.
    pub built_at: u64,
}

/// An entrypoint bound to a specific builder.
pub struct BuildMatch {
    /// Entrypoint, project-root-relative.
    pub src: String,
    /// Builder module identifier.
    pub use_: String,
    pub config: serde_json::Value,
    pub builder: Arc<dyn Builder>,
    /// Most recent publish across all result keys, epoch ms. Monotonic
    /// non-decreasing; 0 = never built.
    built_at: AtomicU64,
    results: RwLock<FxHashMap<String, StoredResult>>,
    /// Union of all result outputs, keyed by asset path.
    output: RwLock<FxHashMap<String, Asset>>,
}

impl BuildMatch {
    pub fn new(
        src: String,
        use_: String,
        config: serde_json::Value,
        builder: Arc<dyn Builder>,
    ) -> Self {
        Self {
            src,
            use_,
            config,
            builder,
            built_at: AtomicU64::new(0),
            results: RwLock::new(FxHashMap::default()),
            output: RwLock::new(FxHashMap::default()),
        }
    }

    /// Result key for a (possibly absent) request path.
    pub fn result_key(&self, request_path: Option<&str>) -> String {
        match request_path {
            Some(path) if self.builder.has_should_serve() => path.to_string(),
            _ => KEY_ALL.to_string(),
        }
    }

    /// Scheduler key: `src` for the "all" sentinel, else `src\nrequest_path`.
    pub fn build_key(&self, result_key: &str) -> String {
        if result_key == KEY_ALL {
            self.src.clone()
        } else {
            format!("{}\n{}", self.src, result_key)
        }
    }

    /// Epoch ms of this key's last publish (0 when never built).
    pub fn last_built(&self, result_key: &str) -> u64 {
        self.results
            .read()
            .get(result_key)
            .map(|r| r.built_at)
            .unwrap_or(0)
    }

    /// Epoch ms of the most recent publish of any key.
    pub fn built_at(&self) -> u64 {
        self.built_at.load(Ordering::Acquire)
    }

    /// Remove a previous result's outputs ahead of a rebuild, so stale
    /// assets cannot be served while the rebuild runs.
    pub fn teardown(&self, result_key: &str) {
        let keys = match self.results.write().get_mut(result_key) {
            Some(result) => std::mem::take(&mut result.asset_keys),
            None => return,
        };
        let mut output = self.output.write();
        for key in keys {
            output.remove(&key);
        }
    }

    /// Publish a build result. Outputs become visible before the
    /// timestamps move, so readers see either old or new, never partial.
    pub fn publish(&self, result_key: &str, result: BuildResult) {
        let asset_keys: Vec<String> = result.output.keys().cloned().collect();
        self.output.write().extend(result.output);

        let now = epoch_ms();
        self.results.write().insert(
            result_key.to_string(),
            StoredResult {
                routes: result.routes,
                watch: result.watch,
                dist_path: result.dist_path,
                asset_keys,
                built_at: now,
            },
        );
        self.built_at.fetch_max(now, Ordering::AcqRel);
    }

    pub fn get_asset(&self, asset_key: &str) -> Option<Asset> {
        self.output.read().get(asset_key).cloned()
    }

    pub fn has_asset(&self, asset_key: &str) -> bool {
        self.output.read().contains_key(asset_key)
    }

    pub fn asset_keys(&self) -> Vec<String> {
        self.output.read().keys().cloned().collect()
    }

    /// Sub-routes of the result that produced an asset.
    pub fn routes_for_asset(&self, asset_key: &str) -> Vec<RouteRule> {
        self.results
            .read()
            .values()
            .find(|r| r.asset_keys.iter().any(|k| k == asset_key))
            .map(|r| r.routes.clone())
            .unwrap_or_default()
    }

    /// (result key, watch globs) pairs for rebuild-set computation.
    pub fn watch_entries(&self) -> Vec<(String, Vec<String>)> {
        self.results
            .read()
            .iter()
            .filter(|(_, r)| !r.watch.is_empty())
            .map(|(key, r)| (key.clone(), r.watch.clone()))
            .collect()
    }

    /// Build-output directories to exclude from watching.
    pub fn dist_paths(&self) -> Vec<PathBuf> {
        self.results
            .read()
            .values()
            .filter_map(|r| r.dist_path.clone())
            .collect()
    }

    /// Probe the builder's lazy servability capability.
    pub fn should_serve(
        &self,
        request_path: &str,
        files: &FxHashMap<String, FileRef>,
        work_path: &Path,
    ) -> bool {
        self.builder.has_should_serve()
            && self.builder.should_serve(&ServeParams {
                entrypoint: &self.src,
                request_path,
                files,
                config: &self.config,
                work_path,
            })
    }

    pub fn shutdown(&self) {
        self.builder.shutdown();
    }

    #[cfg(test)]
    pub fn force_built_at(&self, result_key: &str, built_at: u64) {
        self.results
            .write()
            .entry(result_key.to_string())
            .or_default()
            .built_at = built_at;
        self.built_at.fetch_max(built_at, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{BuildParams, StaticBuilder};
    use anyhow::Result;

    struct ServeAllBuilder;
    impl Builder for ServeAllBuilder {
        fn build(&self, _params: &BuildParams) -> Result<BuildResult> {
            Ok(BuildResult::default())
        }
        fn has_should_serve(&self) -> bool {
            true
        }
    }

    fn blob(name: &str) -> Asset {
        Asset::FileBlob {
            data: name.as_bytes().to_vec(),
            content_type: None,
        }
    }

    fn make_match(builder: Arc<dyn Builder>) -> BuildMatch {
        BuildMatch::new(
            "api/fn.js".to_string(),
            "test".to_string(),
            serde_json::Value::Null,
            builder,
        )
    }

    #[test]
    fn test_result_key_sentinel() {
        let eager = make_match(Arc::new(EagerBuilder));
        assert_eq!(eager.result_key(Some("/api/fn")), KEY_ALL);
        assert_eq!(eager.result_key(None), KEY_ALL);

        let lazy = make_match(Arc::new(ServeAllBuilder));
        assert_eq!(lazy.result_key(Some("api/fn")), "api/fn");
        assert_eq!(lazy.result_key(None), KEY_ALL);
    }

    struct EagerBuilder;
    impl Builder for EagerBuilder {
        fn build(&self, _params: &BuildParams) -> Result<BuildResult> {
            Ok(BuildResult::default())
        }
    }

    #[test]
    fn test_build_key() {
        let m = make_match(Arc::new(StaticBuilder));
        assert_eq!(m.build_key(KEY_ALL), "api/fn.js");
        assert_eq!(m.build_key("api/fn"), "api/fn.js\napi/fn");
    }

    #[test]
    fn test_publish_then_teardown() {
        let m = make_match(Arc::new(StaticBuilder));
        let mut result = BuildResult::default();
        result.output.insert("a.html".to_string(), blob("a"));
        result.output.insert("b.html".to_string(), blob("b"));

        m.publish(KEY_ALL, result);
        assert!(m.has_asset("a.html"));
        assert!(m.has_asset("b.html"));
        assert!(m.built_at() > 0);
        assert!(m.last_built(KEY_ALL) > 0);

        m.teardown(KEY_ALL);
        assert!(!m.has_asset("a.html"));
        assert!(!m.has_asset("b.html"));
    }

    #[test]
    fn test_timestamp_monotonic() {
        let m = make_match(Arc::new(StaticBuilder));
        m.force_built_at(KEY_ALL, 10_000);
        m.publish(KEY_ALL, BuildResult::default());
        assert!(m.built_at() >= 10_000);
    }

    #[test]
    fn test_routes_for_asset() {
        let m = make_match(Arc::new(StaticBuilder));
        let mut result = BuildResult::default();
        result.output.insert("page.html".to_string(), blob("p"));
        result.routes = vec![RouteRule {
            src: "^/sub$".to_string(),
            ..RouteRule::default()
        }];
        m.publish(KEY_ALL, result);

        assert_eq!(m.routes_for_asset("page.html").len(), 1);
        assert!(m.routes_for_asset("other.html").is_empty());
    }
}
