//! Ignore rules for project scanning and watching.
//!
//! Combines built-in defaults with the project's `.nowignore` file
//! (gitignore-like glob lines, `#` comments).

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::Path;

/// Ignore file name at the project root.
pub const IGNORE_FILE: &str = ".nowignore";

/// Paths never presented to builders, regardless of `.nowignore`.
const DEFAULT_IGNORES: &[&str] = &[".git", "node_modules", ".env", ".env.build", ".nowignore"];

/// Compiled ignore rules matched against root-relative paths.
#[derive(Debug)]
pub struct IgnoreRules {
    set: GlobSet,
}

impl IgnoreRules {
    /// Load rules from `<root>/.nowignore` plus defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let mut patterns: Vec<String> = DEFAULT_IGNORES.iter().map(ToString::to_string).collect();

        let path = root.join(IGNORE_FILE);
        if path.is_file() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                patterns.push(line.trim_matches('/').to_string());
            }
        }

        Self::from_patterns(&patterns)
    }

    /// Compile a pattern list. Each pattern also matches as a directory
    /// prefix (`pat` covers `pat` and `pat/**`).
    pub fn from_patterns(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(
                Glob::new(pattern).with_context(|| format!("invalid ignore glob `{pattern}`"))?,
            );
            let dir_pattern = format!("{pattern}/**");
            builder.add(
                Glob::new(&dir_pattern)
                    .with_context(|| format!("invalid ignore glob `{dir_pattern}`"))?,
            );
        }
        let set = builder.build().context("failed to build ignore set")?;
        Ok(Self { set })
    }

    /// Whether a root-relative path is excluded.
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        self.set.is_match(rel_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let temp = TempDir::new().unwrap();
        let rules = IgnoreRules::load(temp.path()).unwrap();

        assert!(rules.is_ignored(".git/config"));
        assert!(rules.is_ignored("node_modules/pkg/index.js"));
        assert!(rules.is_ignored(".env"));
        assert!(rules.is_ignored(".env.build"));
        assert!(!rules.is_ignored("index.html"));
        assert!(!rules.is_ignored("api/fn.js"));
    }

    #[test]
    fn test_nowignore_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(IGNORE_FILE), "# build output\ndist\n*.log\n").unwrap();
        let rules = IgnoreRules::load(temp.path()).unwrap();

        assert!(rules.is_ignored("dist"));
        assert!(rules.is_ignored("dist/bundle.js"));
        assert!(rules.is_ignored("debug.log"));
        assert!(!rules.is_ignored("src/main.js"));
    }

    #[test]
    fn test_now_json_is_a_source() {
        let temp = TempDir::new().unwrap();
        let rules = IgnoreRules::load(temp.path()).unwrap();
        assert!(!rules.is_ignored("now.json"));
    }
}
