//! Builder module registry.
//!
//! The core's single loading point for builder modules. Factories register
//! by module identifier; instances are cached and shared across matches.
//! The update path purges cached instances so stale bindings are never
//! invoked after a module update.

use super::{Builder, STATIC_USE, StaticBuilder};
use anyhow::{Result, bail};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Arc;

type BuilderFactory = Box<dyn Fn() -> Arc<dyn Builder> + Send + Sync>;

pub struct BuilderRegistry {
    factories: RwLock<FxHashMap<String, BuilderFactory>>,
    cache: RwLock<FxHashMap<String, Arc<dyn Builder>>>,
    /// Module identifiers reported as updated by the background task.
    pending_updates: Mutex<Vec<String>>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        let registry = Self {
            factories: RwLock::new(FxHashMap::default()),
            cache: RwLock::new(FxHashMap::default()),
            pending_updates: Mutex::new(Vec::new()),
        };
        registry.register(STATIC_USE, || Arc::new(StaticBuilder));
        registry
    }

    /// Register a builder module factory.
    pub fn register<F>(&self, use_: &str, factory: F)
    where
        F: Fn() -> Arc<dyn Builder> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .insert(use_.to_string(), Box::new(factory));
    }

    /// Verify every referenced module is available and instantiate it.
    /// An unknown module is a startup-fatal error.
    pub fn install(&self, uses: &[&str]) -> Result<()> {
        for use_ in uses {
            if self.get(use_).is_none() {
                bail!("unknown builder module `{use_}`");
            }
        }
        Ok(())
    }

    /// Cached instance for a module, created from its factory on first use.
    pub fn get(&self, use_: &str) -> Option<Arc<dyn Builder>> {
        if let Some(builder) = self.cache.read().get(use_) {
            return Some(Arc::clone(builder));
        }

        let factories = self.factories.read();
        let factory = factories.get(use_)?;
        let builder = factory();
        self.cache
            .write()
            .insert(use_.to_string(), Arc::clone(&builder));
        Some(builder)
    }

    /// Drop cached instances for updated modules. The static builder is
    /// never purged. Fresh instances are created on next `get`.
    pub fn purge(&self, modules: &[String]) {
        let mut cache = self.cache.write();
        for module in modules {
            if module == STATIC_USE {
                continue;
            }
            cache.remove(module);
        }
    }

    /// Record a module update for the background task to report.
    pub fn record_update(&self, module: &str) {
        self.pending_updates.lock().push(module.to_string());
    }

    /// Take the set of modules updated since the last check.
    ///
    /// Stands in for the platform's package-update poll; locally, updates
    /// only appear via `record_update`.
    pub fn check_updates(&self) -> Vec<String> {
        std::mem::take(&mut *self.pending_updates.lock())
    }
}

impl Default for BuilderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{BuildParams, BuildResult};

    struct NoopBuilder;
    impl Builder for NoopBuilder {
        fn build(&self, _params: &BuildParams) -> Result<BuildResult> {
            Ok(BuildResult::default())
        }
    }

    #[test]
    fn test_static_is_preregistered() {
        let registry = BuilderRegistry::new();
        assert!(registry.get(STATIC_USE).is_some());
    }

    #[test]
    fn test_install_unknown_module_fails() {
        let registry = BuilderRegistry::new();
        assert!(registry.install(&[STATIC_USE]).is_ok());
        assert!(registry.install(&["missing-builder"]).is_err());
    }

    #[test]
    fn test_get_caches_instance() {
        let registry = BuilderRegistry::new();
        registry.register("noop", || Arc::new(NoopBuilder));

        let a = registry.get("noop").unwrap();
        let b = registry.get("noop").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_purge_replaces_instance() {
        let registry = BuilderRegistry::new();
        registry.register("noop", || Arc::new(NoopBuilder));

        let before = registry.get("noop").unwrap();
        registry.purge(&["noop".to_string()]);
        let after = registry.get("noop").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_purge_never_drops_static() {
        let registry = BuilderRegistry::new();
        let before = registry.get(STATIC_USE).unwrap();
        registry.purge(&[STATIC_USE.to_string()]);
        let after = registry.get(STATIC_USE).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_update_reporting() {
        let registry = BuilderRegistry::new();
        assert!(registry.check_updates().is_empty());

        registry.record_update("node");
        let updates = registry.check_updates();
        assert_eq!(updates, vec!["node".to_string()]);
        assert!(registry.check_updates().is_empty());
    }
}
