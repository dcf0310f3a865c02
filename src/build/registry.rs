//! The build-match registry.
//!
//! Holds the live set of build matches and reconciles it against the
//! expected set whenever the config or file list changes.

use super::matcher::expected_bindings;
use super::matches::BuildMatch;
use crate::builders::{BuilderRegistry, STATIC_USE};
use crate::config::NowConfig;
use crate::index::FileRef;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Result of a reconcile pass.
#[derive(Default)]
pub struct ReconcileOutcome {
    /// Newly added matches whose builders lack `should_serve` and therefore
    /// require a blocking initial build.
    pub blocking: Vec<Arc<BuildMatch>>,
}

/// Live build matches, sorted with static catch-all entries last so asset
/// lookup keeps first-match-wins semantics.
pub struct MatchRegistry {
    matches: RwLock<Vec<Arc<BuildMatch>>>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: RwLock::new(Vec::new()),
        }
    }

    /// Diff the current set against the expected set.
    ///
    /// Matches that disappeared (or changed `use`) are shut down and
    /// removed; new bindings are added. Returns the blocking builds the
    /// caller must run before serving those matches.
    pub fn reconcile(
        &self,
        config: &NowConfig,
        files: &FxHashMap<String, FileRef>,
        builders: &BuilderRegistry,
    ) -> Result<ReconcileOutcome> {
        let expected = expected_bindings(config, files);
        let mut outcome = ReconcileOutcome::default();
        let mut matches = self.matches.write();

        matches.retain(|m| {
            let keep = expected
                .get(&m.src)
                .is_some_and(|def| def.use_ == m.use_);
            if !keep {
                crate::debug!("build"; "removing match {} ({})", m.src, m.use_);
                m.shutdown();
            }
            keep
        });

        for (src, def) in expected {
            if matches.iter().any(|m| m.src == src) {
                continue;
            }
            let builder = builders
                .get(&def.use_)
                .with_context(|| format!("builder module not installed: {}", def.use_))?;
            let new_match = Arc::new(BuildMatch::new(src, def.use_.clone(), def.config, builder));
            if !new_match.builder.has_should_serve() {
                outcome.blocking.push(Arc::clone(&new_match));
            }
            matches.push(new_match);
        }

        // Static catch-all last, otherwise stable by entrypoint.
        matches.sort_by(|a, b| {
            (a.use_ == STATIC_USE, &a.src).cmp(&(b.use_ == STATIC_USE, &b.src))
        });

        Ok(outcome)
    }

    /// Snapshot of the sorted match list.
    pub fn all(&self) -> Vec<Arc<BuildMatch>> {
        self.matches.read().clone()
    }

    pub fn len(&self) -> usize {
        self.matches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.read().is_empty()
    }

    /// First match (in sort order) holding an asset under this key.
    pub fn find_asset(&self, asset_key: &str) -> Option<Arc<BuildMatch>> {
        self.matches
            .read()
            .iter()
            .find(|m| m.has_asset(asset_key))
            .cloned()
    }

    /// Remove matches bound to updated builder modules. The static builder
    /// is exempt. Returns the number removed.
    pub fn purge_use(&self, modules: &[String]) -> usize {
        let mut matches = self.matches.write();
        let before = matches.len();
        matches.retain(|m| {
            let purge = m.use_ != STATIC_USE && modules.iter().any(|u| *u == m.use_);
            if purge {
                m.shutdown();
            }
            !purge
        });
        before - matches.len()
    }

    /// Entrypoints under a directory prefix, for listings.
    pub fn entrypoints_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.matches
            .read()
            .iter()
            .filter(|m| m.src.starts_with(prefix))
            .map(|m| m.src.clone())
            .collect()
    }

    /// Shut down every match (server stop).
    pub fn shutdown_all(&self) {
        for m in self.matches.read().iter() {
            m.shutdown();
        }
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}
