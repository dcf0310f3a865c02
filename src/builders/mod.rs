//! Builder plugin interface.
//!
//! Builders turn entrypoints into servable assets. The core treats them as
//! opaque capability objects: `build` is mandatory, `should_serve` and
//! `shutdown` are optional. A builder without the `should_serve` capability
//! must be built eagerly before its match can serve requests.

mod lambda;
mod registry;
mod static_files;

pub use lambda::{InvokePayload, InvokeResult, Lambda, decode_result_body, invoke};
pub use registry::BuilderRegistry;
pub use static_files::{STATIC_USE, StaticBuilder};

use crate::index::FileRef;
use crate::router::RouteRule;
use anyhow::Result;
use rustc_hash::FxHashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Inputs to a build invocation.
pub struct BuildParams {
    /// Snapshot of the file index at build time.
    pub files: FxHashMap<String, FileRef>,
    pub entrypoint: String,
    pub config: serde_json::Value,
    pub work_path: PathBuf,
    pub env: FxHashMap<String, String>,
    pub build_env: FxHashMap<String, String>,
    /// Set for request-path-keyed builds, absent for "all" builds.
    pub request_path: Option<String>,
}

/// Inputs to a servability probe.
pub struct ServeParams<'a> {
    pub entrypoint: &'a str,
    pub request_path: &'a str,
    pub files: &'a FxHashMap<String, FileRef>,
    pub config: &'a serde_json::Value,
    pub work_path: &'a Path,
}

/// One build invocation's outputs.
#[derive(Default)]
pub struct BuildResult {
    /// Servable assets keyed by asset path.
    pub output: FxHashMap<String, Asset>,
    /// Sub-routes evaluated when a request resolves into this result.
    pub routes: Vec<RouteRule>,
    /// Glob patterns whose changes invalidate this result.
    pub watch: Vec<String>,
    /// Build-output directory; changes under it are never sources.
    pub dist_path: Option<PathBuf>,
}

/// A servable unit produced by a build.
#[derive(Clone)]
pub enum Asset {
    /// Backed by a file on disk.
    FileFsRef { fs_path: PathBuf, mode: u32 },
    /// In-memory content.
    FileBlob {
        data: Vec<u8>,
        content_type: Option<String>,
    },
    /// Invocable function artifact.
    Lambda(Arc<Lambda>),
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileFsRef { fs_path, mode } => f
                .debug_struct("FileFsRef")
                .field("fs_path", fs_path)
                .field("mode", mode)
                .finish(),
            Self::FileBlob { data, content_type } => f
                .debug_struct("FileBlob")
                .field("len", &data.len())
                .field("content_type", content_type)
                .finish(),
            Self::Lambda(lambda) => f
                .debug_struct("Lambda")
                .field("handler", &lambda.handler)
                .finish(),
        }
    }
}

/// The builder capability set.
pub trait Builder: Send + Sync {
    /// Produce assets for an entrypoint.
    fn build(&self, params: &BuildParams) -> Result<BuildResult>;

    /// Whether this builder can decide servability lazily. When `false`,
    /// an initial blocking build is required before requests are served.
    fn has_should_serve(&self) -> bool {
        false
    }

    /// Lazily decide whether a request path is served by this entrypoint.
    /// Only meaningful when `has_should_serve` returns `true`.
    fn should_serve(&self, _params: &ServeParams<'_>) -> bool {
        false
    }

    /// Release any resources. Called when the binding is removed.
    fn shutdown(&self) {}
}
