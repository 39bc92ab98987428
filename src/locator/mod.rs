//! Locates the ffmpeg executable.

use std::path::{Path, PathBuf};

use crate::config::FfmpegConfig;

/// Name handed to the OS search path when nothing else is found
pub const FFMPEG_FALLBACK_NAME: &str = "ffmpeg";

/// Finds a usable path to the transcoding tool.
///
/// Order: configured path, environment override, well-known install locations, and
/// finally the bare executable name. Never fails; a missing executable surfaces later
/// when the process is spawned.
#[derive(Debug, Clone)]
pub struct FfmpegLocator {
    configured: Option<PathBuf>,
    env_var: String,
    fallback_paths: Vec<PathBuf>,
}

impl FfmpegLocator {
    pub fn new(config: &FfmpegConfig) -> Self {
        Self {
            configured: config.binary.clone(),
            env_var: config.env_var.clone(),
            fallback_paths: config.fallback_paths.clone(),
        }
    }

    pub fn resolve(&self) -> PathBuf {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Same as [`resolve`](Self::resolve) with an injectable environment lookup
    pub fn resolve_with(&self, env: impl Fn(&str) -> Option<String>) -> PathBuf {
        if let Some(path) = self.configured.as_deref().filter(|p| p.exists()) {
            tracing::debug!(path = %path.display(), "using configured ffmpeg");
            return path.to_path_buf();
        }

        if !self.env_var.is_empty() {
            if let Some(value) = env(&self.env_var) {
                let path = PathBuf::from(value.trim());
                if !value.trim().is_empty() && path.exists() {
                    tracing::debug!(path = %path.display(), env = %self.env_var, "using ffmpeg from environment");
                    return path;
                }
            }
        }

        if let Some(path) = self.fallback_paths.iter().find(|p| p.exists()) {
            tracing::debug!(path = %path.display(), "using well-known ffmpeg location");
            return path.clone();
        }

        PathBuf::from(FFMPEG_FALLBACK_NAME)
    }
}

/// Whether the resolved path is the bare name left for the search path
pub fn is_search_path_fallback(path: &Path) -> bool {
    path == Path::new(FFMPEG_FALLBACK_NAME)
}
