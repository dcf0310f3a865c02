//! Entrypoint matching.
//!
//! Expands the manifest's `builds` globs against the current file list into
//! the set of (entrypoint → builder binding) pairs expected to exist.

use crate::config::{BuildDef, NowConfig};
use crate::index::FileRef;
use globset::Glob;
use rustc_hash::FxHashMap;

/// Compute the expected bindings for a config and file list.
///
/// First matching `builds` entry wins per entrypoint, so overlapping globs
/// have well-defined precedence.
pub fn expected_bindings(
    config: &NowConfig,
    files: &FxHashMap<String, FileRef>,
) -> FxHashMap<String, BuildDef> {
    let mut expected: FxHashMap<String, BuildDef> = FxHashMap::default();

    for def in &config.builds {
        let Ok(glob) = Glob::new(&def.src) else {
            // Validated at config load; sub-second races aside, skip.
            crate::debug!("build"; "skipping invalid build glob: {}", def.src);
            continue;
        };
        let matcher = glob.compile_matcher();

        for rel_path in files.keys() {
            if matcher.is_match(rel_path) {
                expected
                    .entry(rel_path.clone())
                    .or_insert_with(|| def.clone());
            }
        }
    }

    expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::STATIC_USE;
    use std::path::PathBuf;

    fn files(paths: &[&str]) -> FxHashMap<String, FileRef> {
        paths
            .iter()
            .map(|p| {
                (
                    p.to_string(),
                    FileRef {
                        rel_path: p.to_string(),
                        fs_path: PathBuf::from("/project").join(p),
                        mode: 0o644,
                    },
                )
            })
            .collect()
    }

    fn config_with(builds: Vec<BuildDef>) -> NowConfig {
        NowConfig {
            version: 2,
            builds,
            routes: Vec::new(),
            env: FxHashMap::default(),
            build_env: FxHashMap::default(),
            zero_config: false,
        }
    }

    fn def(src: &str, use_: &str) -> BuildDef {
        BuildDef {
            src: src.to_string(),
            use_: use_.to_string(),
            config: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_glob_expansion() {
        let config = config_with(vec![def("api/*.js", "node")]);
        let files = files(&["api/a.js", "api/b.js", "index.html"]);

        let expected = expected_bindings(&config, &files);
        assert_eq!(expected.len(), 2);
        assert!(expected.contains_key("api/a.js"));
        assert!(expected.contains_key("api/b.js"));
        assert!(!expected.contains_key("index.html"));
    }

    #[test]
    fn test_catch_all() {
        let config = config_with(vec![def("**", STATIC_USE)]);
        let files = files(&["index.html", "assets/logo.png"]);

        let expected = expected_bindings(&config, &files);
        assert_eq!(expected.len(), 2);
    }

    #[test]
    fn test_first_build_entry_wins() {
        let config = config_with(vec![def("api/*.js", "node"), def("**", STATIC_USE)]);
        let files = files(&["api/a.js", "index.html"]);

        let expected = expected_bindings(&config, &files);
        assert_eq!(expected.get("api/a.js").unwrap().use_, "node");
        assert_eq!(expected.get("index.html").unwrap().use_, STATIC_USE);
    }
}
