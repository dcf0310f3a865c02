//! Deployment manifest (`now.json`) loading and validation.
//!
//! The manifest is the only configuration surface of the dev server:
//!
//! | Field       | Purpose                                            |
//! |-------------|----------------------------------------------------|
//! | `version`   | Platform version; only `2` is accepted             |
//! | `builds`    | Entrypoint globs bound to builder modules          |
//! | `routes`    | Ordered request-routing rules                      |
//! | `env`       | Runtime env vars, literal or `@secret` references  |
//! | `build.env` | Build-time env vars, same syntax                   |
//!
//! An absent or empty `builds` list triggers zero-config mode: the whole
//! project is served statically.

mod env;
mod error;

pub use env::{BUILD_ENV_FILE, ENV_FILE};
pub use error::ConfigError;

use crate::builders::STATIC_USE;
use crate::router::{RouteRule, compile_src};
use globset::Glob;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Manifest file name at the project root.
pub const CONFIG_FILE: &str = "now.json";

/// One `builds` entry: an entrypoint glob bound to a builder module.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildDef {
    pub src: String,
    #[serde(rename = "use")]
    pub use_: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Normalized deployment configuration.
#[derive(Debug, Clone)]
pub struct NowConfig {
    pub version: u64,
    pub builds: Vec<BuildDef>,
    pub routes: Vec<RouteRule>,
    pub env: FxHashMap<String, String>,
    pub build_env: FxHashMap<String, String>,
    /// True when `builds` was absent/empty and a static catch-all was synthesized.
    pub zero_config: bool,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    version: Option<u64>,
    #[serde(default)]
    builds: Vec<BuildDef>,
    #[serde(default)]
    routes: Vec<RouteRule>,
    #[serde(default)]
    env: FxHashMap<String, String>,
    #[serde(default)]
    build: RawBuildSection,
}

#[derive(Debug, Default, Deserialize)]
struct RawBuildSection {
    #[serde(default)]
    env: FxHashMap<String, String>,
}

impl NowConfig {
    /// Load and validate the manifest plus local env files.
    ///
    /// A missing `now.json` yields the zero-config defaults.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);
        let raw = if path.is_file() {
            let text = fs::read_to_string(&path).map_err(|e| ConfigError::Io(path.clone(), e))?;
            serde_json::from_str::<RawConfig>(&text).map_err(|e| ConfigError::Json(path, e))?
        } else {
            RawConfig::default()
        };

        let version = raw.version.unwrap_or(2);
        if version != 2 {
            return Err(ConfigError::UnsupportedVersion(version));
        }

        for build in &raw.builds {
            validate_build(build)?;
        }
        for route in &raw.routes {
            compile_src(&route.src).map_err(|e| ConfigError::InvalidRoute {
                src: route.src.clone(),
                message: e.to_string(),
            })?;
        }

        let zero_config = raw.builds.is_empty();
        let builds = if zero_config {
            vec![BuildDef {
                src: "**".to_string(),
                use_: STATIC_USE.to_string(),
                config: serde_json::Value::Null,
            }]
        } else {
            raw.builds
        };

        // Local env files override manifest values; @secret references in
        // the manifest resolve against the matching file.
        let local_env = env::read_env_file(&root.join(ENV_FILE))?;
        let local_build_env = env::read_env_file(&root.join(BUILD_ENV_FILE))?;
        let env = env::merge(
            env::resolve_secrets(&raw.env, &local_env, ENV_FILE)?,
            local_env,
        );
        let build_env = env::merge(
            env::resolve_secrets(&raw.build.env, &local_build_env, BUILD_ENV_FILE)?,
            local_build_env,
        );

        Ok(Self {
            version,
            builds,
            routes: raw.routes,
            env,
            build_env,
            zero_config,
        })
    }

    /// Copy the build environment into the process environment.
    ///
    /// Must run before any threads are spawned (process-env mutation).
    pub fn apply_build_env(&self) {
        for (key, value) in &self.build_env {
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn validate_build(build: &BuildDef) -> Result<(), ConfigError> {
    if build.use_.is_empty() {
        return Err(ConfigError::InvalidBuild {
            src: build.src.clone(),
            message: "missing `use`".to_string(),
        });
    }
    Glob::new(&build.src).map_err(|e| ConfigError::InvalidBuild {
        src: build.src.clone(),
        message: e.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(root: &Path, json: &str) {
        fs::write(root.join(CONFIG_FILE), json).unwrap();
    }

    #[test]
    fn test_missing_config_is_zero_config() {
        let temp = TempDir::new().unwrap();
        let config = NowConfig::load(temp.path()).unwrap();
        assert!(config.zero_config);
        assert_eq!(config.builds.len(), 1);
        assert_eq!(config.builds[0].use_, STATIC_USE);
        assert_eq!(config.builds[0].src, "**");
    }

    #[test]
    fn test_version_one_is_rejected() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), r#"{"version": 1}"#);
        let err = NowConfig::load(temp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedVersion(1)));
    }

    #[test]
    fn test_empty_builds_synthesizes_static() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), r#"{"version": 2, "builds": []}"#);
        let config = NowConfig::load(temp.path()).unwrap();
        assert!(config.zero_config);
        assert_eq!(config.builds[0].use_, STATIC_USE);
    }

    #[test]
    fn test_explicit_builds_kept() {
        let temp = TempDir::new().unwrap();
        write_config(
            temp.path(),
            r#"{"version": 2, "builds": [{"src": "api/*.js", "use": "node"}]}"#,
        );
        let config = NowConfig::load(temp.path()).unwrap();
        assert!(!config.zero_config);
        assert_eq!(config.builds.len(), 1);
        assert_eq!(config.builds[0].src, "api/*.js");
    }

    #[test]
    fn test_invalid_route_regex_rejected() {
        let temp = TempDir::new().unwrap();
        write_config(
            temp.path(),
            r#"{"version": 2, "routes": [{"src": "^/([unclosed$"}]}"#,
        );
        let err = NowConfig::load(temp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRoute { .. }));
    }

    #[test]
    fn test_env_secret_resolution() {
        let temp = TempDir::new().unwrap();
        write_config(
            temp.path(),
            r#"{"version": 2, "env": {"TOKEN": "@token", "PLAIN": "x"}}"#,
        );
        fs::write(temp.path().join(ENV_FILE), "token=sekrit\nEXTRA=1\n").unwrap();

        let config = NowConfig::load(temp.path()).unwrap();
        assert_eq!(config.env.get("TOKEN").map(String::as_str), Some("sekrit"));
        assert_eq!(config.env.get("PLAIN").map(String::as_str), Some("x"));
        // file vars merge in right-biased
        assert_eq!(config.env.get("EXTRA").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_env_missing_secret_is_fatal() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), r#"{"version": 2, "env": {"TOKEN": "@absent"}}"#);
        let err = NowConfig::load(temp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret { .. }));
    }
}
