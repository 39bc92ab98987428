use anyhow::Context;
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;

use crate::utils::truncate_chars;
use crate::Result;

/// Subset of yt-dlp's info JSON the pipeline reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoInfo {
    pub id: Option<String>,
    pub ext: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
}

/// Thin wrapper over the yt-dlp executable
#[derive(Debug, Clone)]
pub struct YtDlpClient {
    binary: String,
}

impl YtDlpClient {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Fetch metadata without downloading anything
    pub async fn video_info(&self, link: &str) -> Result<VideoInfo> {
        tracing::debug!("Extracting video info for: {}", link);

        self.run_json(
            &[
                "--ignore-config",
                "--dump-json",
                "--skip-download",
                "--no-playlist",
            ],
            link,
        )
        .await
    }

    /// Download the best audio-only stream using `output_template`.
    ///
    /// Post-processing stays off: yt-dlp writes whatever container the stream comes in
    /// and conversion is left to the caller.
    pub async fn download_audio(&self, link: &str, output_template: &str) -> Result<VideoInfo> {
        tracing::debug!(template = %output_template, "Downloading best audio for: {}", link);

        self.run_json(
            &[
                // user or system config could re-enable post-processing
                "--ignore-config",
                "--format",
                "bestaudio/best",
                "--output",
                output_template,
                "--no-playlist",
                "--no-progress",
                "--quiet",
                "--no-exec",
                // print the info JSON but still download
                "--dump-json",
                "--no-simulate",
            ],
            link,
        )
        .await
    }

    async fn run_json(&self, args: &[&str], link: &str) -> Result<VideoInfo> {
        let output = Command::new(&self.binary)
            .args(args)
            .arg("--")
            .arg(link)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.binary))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed: {}", truncate_chars(error.trim(), 1000));
        }

        parse_info(&String::from_utf8_lossy(&output.stdout))
    }
}

/// yt-dlp prints one JSON document per line; the last one describes the video
fn parse_info(stdout: &str) -> Result<VideoInfo> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .context("yt-dlp printed no video info")?;

    serde_json::from_str(line.trim()).context("Failed to parse yt-dlp info JSON")
}
