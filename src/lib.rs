//! blogscribe - turn a video link into a written blog article
//!
//! The library wires four fallible stages into one linear pipeline: resolve the video's
//! title, pull its audio track down with yt-dlp and convert it with ffmpeg, send the audio
//! to a speech-to-text service, and ask a local language model to rewrite the transcript
//! as an article. The result is stored per user and served over a small JSON API.

pub mod audio;
pub mod cli;
pub mod config;
pub mod generate;
pub mod locator;
pub mod output;
pub mod pipeline;
pub mod server;
pub mod store;
pub mod stt;
pub mod title;
pub mod transcribe;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use pipeline::{ArticlePipeline, GenerationRequest, PipelineError, PipelineResult};
pub use store::{ArticleStore, BlogArticle};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Failures raised by the pipeline components
#[derive(thiserror::Error, Debug)]
pub enum ScribeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("title unavailable: {0}")]
    TitleUnavailable(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("ffmpeg conversion failed: {0}")]
    ConversionFailed(String),

    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("article generation failed: {0}")]
    GenerationFailed(String),

    #[error("persistence failed: {0}")]
    Persistence(String),
}
