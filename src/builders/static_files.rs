//! The identity static builder.
//!
//! Serves project files as-is: the build output for an entrypoint is a
//! filesystem reference to that same file. Declares `should_serve` so no
//! eager builds are needed, and is never purged by builder updates.

use super::{BuildParams, BuildResult, Builder, ServeParams};
use crate::builders::Asset;
use anyhow::{Context, Result};
use rustc_hash::FxHashMap;

/// Module identifier of the static builder.
pub const STATIC_USE: &str = "static";

pub struct StaticBuilder;

impl Builder for StaticBuilder {
    fn build(&self, params: &BuildParams) -> Result<BuildResult> {
        let file = params
            .files
            .get(&params.entrypoint)
            .with_context(|| format!("entrypoint not in file index: {}", params.entrypoint))?;

        let mut output = FxHashMap::default();
        output.insert(
            params.entrypoint.clone(),
            Asset::FileFsRef {
                fs_path: file.fs_path.clone(),
                mode: file.mode,
            },
        );
        Ok(BuildResult {
            output,
            ..BuildResult::default()
        })
    }

    fn has_should_serve(&self) -> bool {
        true
    }

    fn should_serve(&self, params: &ServeParams<'_>) -> bool {
        params.request_path == params.entrypoint && params.files.contains_key(params.entrypoint)
    }
}
