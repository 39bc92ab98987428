//! Audio retrieval: yt-dlp download, ffmpeg conversion, intermediate cleanup.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::process::Command;
use tokio::sync::OwnedMutexGuard;

pub mod ytdlp;

use crate::config::Config;
use crate::locator::FfmpegLocator;
use crate::ScribeError;
use ytdlp::YtDlpClient;

/// Extension of the final artifact
pub const FINAL_EXTENSION: &str = "mp3";

/// Container extensions probed when yt-dlp's reported one is absent
pub const FALLBACK_EXTENSIONS: [&str; 4] = ["webm", "m4a", "opus", "mp4"];

const SAMPLE_RATE: &str = "44100";
const CHANNELS: &str = "2";
const BITRATE: &str = "192k";

/// Produces a local audio file for a video link
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn retrieve(&self, link: &str) -> Result<PathBuf, ScribeError>;
}

/// `<root>/audio-<id>.<ext>`
pub fn artifact_path(root: &Path, id: &str, ext: &str) -> PathBuf {
    root.join(format!("audio-{}.{}", id, ext))
}

/// Downloads best audio with yt-dlp and converts it to a fixed mp3 format
pub struct AudioRetriever {
    media_root: Option<PathBuf>,
    locator: FfmpegLocator,
    ytdlp: YtDlpClient,
}

impl AudioRetriever {
    pub fn new(media_root: Option<PathBuf>, locator: FfmpegLocator, ytdlp: YtDlpClient) -> Self {
        Self {
            media_root,
            locator,
            ytdlp,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.storage.media_root.clone(),
            FfmpegLocator::new(&config.ffmpeg),
            YtDlpClient::new(config.yt_dlp.binary.clone()),
        )
    }

    async fn prepare_root(&self) -> Result<PathBuf, ScribeError> {
        let root = self
            .media_root
            .clone()
            .ok_or_else(|| ScribeError::Config("storage.media_root is not set".to_string()))?;

        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            ScribeError::Config(format!("cannot create media root {}: {}", root.display(), e))
        })?;

        Ok(root)
    }

    async fn convert(&self, ffmpeg: &Path, src: &Path, dst: &Path) -> Result<(), ScribeError> {
        tracing::debug!(ffmpeg = %ffmpeg.display(), src = %src.display(), dst = %dst.display(), "converting audio");

        let output = Command::new(ffmpeg)
            .args(["-y", "-i"])
            .arg(src)
            .args(["-vn", "-ar", SAMPLE_RATE, "-ac", CHANNELS, "-b:a", BITRATE])
            .arg(dst)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                ScribeError::ConversionFailed(format!("failed to run {}: {}", ffmpeg.display(), e))
            })?;

        if !output.status.success() {
            // a half-written mp3 must not survive a failed run
            remove_best_effort(dst);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScribeError::ConversionFailed(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl AudioSource for AudioRetriever {
    async fn retrieve(&self, link: &str) -> Result<PathBuf, ScribeError> {
        let root = self.prepare_root().await?;
        let ffmpeg = self.locator.resolve();

        let template = root.join("audio-%(id)s.%(ext)s");
        let template = template.to_str().ok_or_else(|| {
            ScribeError::Config("media root path contains invalid UTF-8".to_string())
        })?;

        tracing::info!(%link, "downloading audio");
        let info = self
            .ytdlp
            .download_audio(link, template)
            .await
            .map_err(|e| ScribeError::DownloadFailed(format!("{:#}", e)))?;

        let id = info
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                ScribeError::DownloadFailed("could not resolve video id from yt-dlp info".to_string())
            })?;

        let final_path = artifact_path(&root, &id, FINAL_EXTENSION);
        let src = locate_source(&root, &id, info.ext.as_deref()).ok_or_else(|| {
            ScribeError::DownloadFailed(
                "download succeeded but no source audio file was found".to_string(),
            )
        })?;
        let intermediate = IntermediateFile::new(src);

        // a leftover mp3 from an earlier run must not pass for this conversion's output
        remove_best_effort(&final_path);
        self.convert(&ffmpeg, intermediate.path(), &final_path).await?;
        drop(intermediate);

        if !final_path.exists() {
            return Err(ScribeError::ConversionFailed(format!(
                "ffmpeg reported success but {} is missing",
                final_path.display()
            )));
        }

        tracing::info!(path = %final_path.display(), "audio ready");
        Ok(final_path)
    }
}

/// Find the file yt-dlp wrote for `id`.
///
/// Tries the reported extension, then the fallback list, then the newest file whose name
/// starts with `audio-<id>.`. The final mp3 and partial downloads are never returned.
pub fn locate_source(root: &Path, id: &str, reported_ext: Option<&str>) -> Option<PathBuf> {
    let mut extensions: Vec<&str> = Vec::new();
    for ext in reported_ext.into_iter().chain(FALLBACK_EXTENSIONS) {
        if !ext.is_empty() && !extensions.contains(&ext) {
            extensions.push(ext);
        }
    }

    let final_path = artifact_path(root, id, FINAL_EXTENSION);
    if let Some(path) = extensions
        .iter()
        .filter(|ext| **ext != FINAL_EXTENSION)
        .map(|ext| artifact_path(root, id, ext))
        .find(|path| path.is_file())
    {
        return Some(path);
    }

    // an mp3 source would collide with the conversion target; move it aside
    if reported_ext == Some(FINAL_EXTENSION) && final_path.is_file() {
        let aside = artifact_path(root, id, "source.mp3");
        if std::fs::rename(&final_path, &aside).is_ok() {
            return Some(aside);
        }
    }

    let prefix = format!("audio-{}.", id);
    let mut best: Option<(PathBuf, std::time::SystemTime)> = None;

    for entry in std::fs::read_dir(root).ok()?.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(&prefix) || path == final_path {
            continue;
        }
        if name.ends_with(".part") || name.ends_with(".ytdl") {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            if best.as_ref().map_or(true, |(_, t)| modified > *t) {
                best = Some((path, modified));
            }
        }
    }

    best.map(|(path, _)| path)
}

/// Downloaded container file, removed when dropped
struct IntermediateFile {
    path: PathBuf,
}

impl IntermediateFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IntermediateFile {
    fn drop(&mut self) {
        remove_best_effort(&self.path);
    }
}

/// Delete a file, logging but otherwise ignoring failure
pub(crate) fn remove_best_effort(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed audio artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove audio artifact"),
    }
}

/// Per-link locks so two requests for the same video never share artifact paths at once
#[derive(Debug, Clone, Default)]
pub struct ArtifactLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ArtifactLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // entries only referenced by the map are idle
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(key.to_string()).or_default().clone()
        };

        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FfmpegConfig;
    use std::time::Duration;

    #[test]
    fn test_locate_prefers_reported_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(artifact_path(dir.path(), "abc", "m4a"), b"a").unwrap();
        std::fs::write(artifact_path(dir.path(), "abc", "webm"), b"b").unwrap();

        let found = locate_source(dir.path(), "abc", Some("m4a")).unwrap();
        assert_eq!(found, artifact_path(dir.path(), "abc", "m4a"));

        let found = locate_source(dir.path(), "abc", None).unwrap();
        assert_eq!(found, artifact_path(dir.path(), "abc", "webm"));
    }

    #[test]
    fn test_locate_scans_for_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(artifact_path(dir.path(), "abc", "mp3"), b"old").unwrap();
        std::fs::write(artifact_path(dir.path(), "abc", "mka.part"), b"partial").unwrap();
        std::fs::write(artifact_path(dir.path(), "abcd", "mka"), b"other video").unwrap();
        std::fs::write(artifact_path(dir.path(), "abc", "mka"), b"source").unwrap();

        let found = locate_source(dir.path(), "abc", Some("webm")).unwrap();
        assert_eq!(found, artifact_path(dir.path(), "abc", "mka"));
    }

    #[test]
    fn test_locate_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(artifact_path(dir.path(), "abc", "mp3"), b"old").unwrap();
        assert!(locate_source(dir.path(), "abc", Some("webm")).is_none());
    }

    #[test]
    fn test_intermediate_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = artifact_path(dir.path(), "abc", "webm");
        std::fs::write(&path, b"x").unwrap();

        drop(IntermediateFile::new(path.clone()));
        assert!(!path.exists());

        // already gone: still silent
        drop(IntermediateFile::new(path));
    }

    #[tokio::test]
    async fn test_missing_media_root_is_config_error() {
        let retriever = AudioRetriever::new(
            None,
            FfmpegLocator::new(&FfmpegConfig::default()),
            YtDlpClient::new("yt-dlp"),
        );

        let err = retriever.retrieve("https://youtu.be/abc").await.unwrap_err();
        assert!(matches!(err, ScribeError::Config(_)));
    }

    #[tokio::test]
    async fn test_locks_serialize_same_key() {
        let locks = ArtifactLocks::new();
        let guard = locks.acquire("https://youtu.be/abc").await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.acquire("https://youtu.be/abc").await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        // a different video is not blocked
        let _unrelated = tokio::time::timeout(Duration::from_secs(1), locks.acquire("https://youtu.be/xyz"))
            .await
            .unwrap();

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let locks = ArtifactLocks::new();
        drop(locks.acquire("a").await);
        drop(locks.acquire("b").await);
        let _held = locks.acquire("c").await;
        assert_eq!(locks.len(), 1);
    }

    #[cfg(unix)]
    mod subprocess {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        /// Fake yt-dlp that writes `file` into the media root and prints `json`
        fn fake_ytdlp(bin: &Path, root: &Path, file: Option<&str>, json: &str) -> PathBuf {
            let write = file
                .map(|f| format!("printf 'source' > '{}'", root.join(f).display()))
                .unwrap_or_default();
            script(bin, "yt-dlp", &format!("{}\necho '{}'", write, json))
        }

        fn ffmpeg_ok(bin: &Path) -> PathBuf {
            script(bin, "ffmpeg", "for last; do :; done\nprintf 'mp3' > \"$last\"")
        }

        fn retriever(root: &Path, ytdlp: PathBuf, ffmpeg: PathBuf) -> AudioRetriever {
            AudioRetriever::new(
                Some(root.to_path_buf()),
                FfmpegLocator::new(&FfmpegConfig {
                    binary: Some(ffmpeg),
                    env_var: String::new(),
                    fallback_paths: vec![],
                }),
                YtDlpClient::new(ytdlp.to_string_lossy().into_owned()),
            )
        }

        fn files_in(root: &Path) -> Vec<String> {
            let mut names: Vec<String> = std::fs::read_dir(root)
                .unwrap()
                .flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }

        #[tokio::test]
        async fn test_retrieve_converts_and_cleans_up() {
            let bin = tempfile::tempdir().unwrap();
            let media = tempfile::tempdir().unwrap();
            let root = media.path().join("media");
            let ytdlp = fake_ytdlp(
                bin.path(),
                &root,
                Some("audio-abc.webm"),
                r#"{"id":"abc","ext":"webm","title":"T"}"#,
            );

            let path = retriever(&root, ytdlp, ffmpeg_ok(bin.path()))
                .retrieve("https://youtu.be/abc")
                .await
                .unwrap();

            assert_eq!(path, root.join("audio-abc.mp3"));
            assert_eq!(files_in(&root), vec!["audio-abc.mp3".to_string()]);
        }

        #[tokio::test]
        async fn test_ffmpeg_failure_carries_stderr() {
            let bin = tempfile::tempdir().unwrap();
            let root = tempfile::tempdir().unwrap();
            let ytdlp = fake_ytdlp(
                bin.path(),
                root.path(),
                Some("audio-abc.m4a"),
                r#"{"id":"abc","ext":"m4a"}"#,
            );
            let ffmpeg = script(
                bin.path(),
                "ffmpeg",
                "echo 'Invalid data found when processing input' >&2\nexit 1",
            );

            let err = retriever(root.path(), ytdlp, ffmpeg)
                .retrieve("https://youtu.be/abc")
                .await
                .unwrap_err();

            match err {
                ScribeError::ConversionFailed(msg) => {
                    assert!(msg.contains("Invalid data found when processing input"))
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert!(files_in(root.path()).is_empty());
        }

        #[tokio::test]
        async fn test_silent_ffmpeg_is_conversion_failure() {
            let bin = tempfile::tempdir().unwrap();
            let root = tempfile::tempdir().unwrap();
            let ytdlp = fake_ytdlp(
                bin.path(),
                root.path(),
                Some("audio-abc.webm"),
                r#"{"id":"abc","ext":"webm"}"#,
            );
            let ffmpeg = script(bin.path(), "ffmpeg", "exit 0");

            let err = retriever(root.path(), ytdlp, ffmpeg)
                .retrieve("https://youtu.be/abc")
                .await
                .unwrap_err();
            assert!(matches!(err, ScribeError::ConversionFailed(_)));
            assert!(!root.path().join("audio-abc.mp3").exists());
        }

        #[tokio::test]
        async fn test_previous_mp3_does_not_hide_silent_ffmpeg() {
            let bin = tempfile::tempdir().unwrap();
            let root = tempfile::tempdir().unwrap();
            std::fs::write(root.path().join("audio-abc.mp3"), "STALE").unwrap();
            let ytdlp = fake_ytdlp(
                bin.path(),
                root.path(),
                Some("audio-abc.webm"),
                r#"{"id":"abc","ext":"webm"}"#,
            );
            let ffmpeg = script(bin.path(), "ffmpeg", "exit 0");

            let err = retriever(root.path(), ytdlp, ffmpeg)
                .retrieve("https://youtu.be/abc")
                .await
                .unwrap_err();
            assert!(matches!(err, ScribeError::ConversionFailed(_)));
            assert!(!root.path().join("audio-abc.mp3").exists());
        }

        #[tokio::test]
        async fn test_download_ignores_user_ytdlp_config() {
            let bin = tempfile::tempdir().unwrap();
            let root = tempfile::tempdir().unwrap();
            let ytdlp = script(
                bin.path(),
                "yt-dlp",
                &format!(
                    "case \" $* \" in *\" --ignore-config \"*) ;; *) echo 'config not ignored' >&2; exit 2;; esac\nprintf 'source' > '{}'\necho '{}'",
                    root.path().join("audio-abc.webm").display(),
                    r#"{"id":"abc","ext":"webm"}"#
                ),
            );

            let path = retriever(root.path(), ytdlp, ffmpeg_ok(bin.path()))
                .retrieve("https://youtu.be/abc")
                .await
                .unwrap();
            assert_eq!(path, root.path().join("audio-abc.mp3"));
        }

        #[tokio::test]
        async fn test_missing_id_is_download_failure() {
            let bin = tempfile::tempdir().unwrap();
            let root = tempfile::tempdir().unwrap();
            let ytdlp = fake_ytdlp(bin.path(), root.path(), None, r#"{"title":"no id"}"#);

            let err = retriever(root.path(), ytdlp, ffmpeg_ok(bin.path()))
                .retrieve("https://youtu.be/abc")
                .await
                .unwrap_err();
            assert!(matches!(err, ScribeError::DownloadFailed(ref m) if m.contains("video id")));
        }

        #[tokio::test]
        async fn test_missing_source_is_download_failure() {
            let bin = tempfile::tempdir().unwrap();
            let root = tempfile::tempdir().unwrap();
            let ytdlp = fake_ytdlp(bin.path(), root.path(), None, r#"{"id":"abc","ext":"webm"}"#);

            let err = retriever(root.path(), ytdlp, ffmpeg_ok(bin.path()))
                .retrieve("https://youtu.be/abc")
                .await
                .unwrap_err();
            assert!(matches!(err, ScribeError::DownloadFailed(ref m) if m.contains("no source audio")));
        }

        #[tokio::test]
        async fn test_ytdlp_failure_is_download_failure() {
            let bin = tempfile::tempdir().unwrap();
            let root = tempfile::tempdir().unwrap();
            let ytdlp = script(bin.path(), "yt-dlp", "echo 'ERROR: Video unavailable' >&2\nexit 1");

            let err = retriever(root.path(), ytdlp, ffmpeg_ok(bin.path()))
                .retrieve("https://youtu.be/abc")
                .await
                .unwrap_err();
            assert!(matches!(err, ScribeError::DownloadFailed(ref m) if m.contains("Video unavailable")));
        }

        #[tokio::test]
        async fn test_mp3_source_is_moved_aside() {
            let bin = tempfile::tempdir().unwrap();
            let root = tempfile::tempdir().unwrap();
            let ytdlp = fake_ytdlp(
                bin.path(),
                root.path(),
                Some("audio-abc.mp3"),
                r#"{"id":"abc","ext":"mp3"}"#,
            );

            let path = retriever(root.path(), ytdlp, ffmpeg_ok(bin.path()))
                .retrieve("https://youtu.be/abc")
                .await
                .unwrap();

            assert_eq!(path, root.path().join("audio-abc.mp3"));
            assert_eq!(files_in(root.path()), vec!["audio-abc.mp3".to_string()]);
        }
    }
}
