//! Environment file loading and merging.
//!
//! Two dotenv-format files at the project root supply local values:
//! `.env` for the runtime environment and `.env.build` for builds. Each is
//! merged right-biased over the manifest's `env` / `build.env` maps, after
//! `@secret` references in the manifest have been resolved against the file.

use super::error::ConfigError;
use regex::Regex;
use rustc_hash::FxHashMap;
use std::path::Path;
use std::sync::LazyLock;

/// Runtime environment file name.
pub const ENV_FILE: &str = ".env";
/// Build environment file name.
pub const BUILD_ENV_FILE: &str = ".env.build";

/// Valid environment variable names.
static ENV_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Za-z][A-Za-z0-9_]*$").unwrap());

/// Read a dotenv-format file into a map. A missing file is an empty map.
pub fn read_env_file(path: &Path) -> Result<FxHashMap<String, String>, ConfigError> {
    let mut vars = FxHashMap::default();
    if !path.is_file() {
        return Ok(vars);
    }

    for item in dotenv::from_path_iter(path)
        .map_err(|e| ConfigError::EnvFile(path.to_path_buf(), e.to_string()))?
    {
        let (key, value) =
            item.map_err(|e| ConfigError::EnvFile(path.to_path_buf(), e.to_string()))?;
        vars.insert(key, value);
    }
    Ok(vars)
}

/// Resolve `@secret` references in a manifest env map against a local env
/// file's contents. A reference with no local value is a fatal error.
pub fn resolve_secrets(
    vars: &FxHashMap<String, String>,
    local: &FxHashMap<String, String>,
    file: &str,
) -> Result<FxHashMap<String, String>, ConfigError> {
    let mut out = FxHashMap::default();
    for (key, value) in vars {
        let resolved = match value.strip_prefix('@') {
            Some(name) => local
                .get(name)
                .cloned()
                .ok_or_else(|| ConfigError::MissingSecret {
                    name: name.to_string(),
                    var: key.clone(),
                    file: file.to_string(),
                })?,
            None => value.clone(),
        };
        out.insert(key.clone(), resolved);
    }
    Ok(out)
}

/// Merge `local` over `base`, right-biased. Keys that are not valid env
/// variable names are dropped with a warning and never appear in the result.
pub fn merge(
    base: FxHashMap<String, String>,
    local: FxHashMap<String, String>,
) -> FxHashMap<String, String> {
    let mut out = FxHashMap::default();
    for (key, value) in base.into_iter().chain(local) {
        if !ENV_NAME_RE.is_match(&key) {
            crate::log!("hint"; "ignoring env var with invalid name: {key:?}");
            continue;
        }
        out.insert(key, value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn map(pairs: &[(&str, &str)]) -> FxHashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_read_env_file_missing_is_empty() {
        let temp = TempDir::new().unwrap();
        let vars = read_env_file(&temp.path().join(".env")).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn test_read_env_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".env");
        std::fs::write(&path, "FOO=bar\n# comment\nBAZ=\"quoted value\"\n").unwrap();

        let vars = read_env_file(&path).unwrap();
        assert_eq!(vars.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(vars.get("BAZ").map(String::as_str), Some("quoted value"));
    }

    #[test]
    fn test_merge_right_biased() {
        let merged = merge(map(&[("A", "1"), ("B", "2")]), map(&[("B", "3")]));
        assert_eq!(merged.get("A").map(String::as_str), Some("1"));
        assert_eq!(merged.get("B").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_merge_drops_invalid_names() {
        let merged = merge(map(&[("1BAD", "x"), ("GOOD", "y")]), map(&[("ALSO-BAD", "z")]));
        assert_eq!(merged.len(), 1);
        assert!(merged.contains_key("GOOD"));
    }

    #[test]
    fn test_resolve_secrets() {
        let local = map(&[("db-url", "postgres://localhost")]);
        let resolved =
            resolve_secrets(&map(&[("DB", "@db-url"), ("PLAIN", "v")]), &local, ".env").unwrap();
        assert_eq!(
            resolved.get("DB").map(String::as_str),
            Some("postgres://localhost")
        );
        assert_eq!(resolved.get("PLAIN").map(String::as_str), Some("v"));
    }

    #[test]
    fn test_resolve_secrets_missing_is_error() {
        let err = resolve_secrets(&map(&[("DB", "@nope")]), &FxHashMap::default(), ".env")
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret { .. }));
    }
}
