//! The article pipeline: validate, resolve title, transcribe, generate, persist, respond.
//!
//! Every stage either hands its output to the next one or ends the run with a
//! [`PipelineError`]. Nothing is persisted unless all stages before `Persist` succeeded.

use anyhow::Context;
use axum::http::StatusCode;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use crate::audio::ytdlp::YtDlpClient;
use crate::audio::AudioRetriever;
use crate::config::Config;
use crate::generate::{is_quota_error, ArticleGenerator, OllamaChat};
use crate::store::{ArticleStore, NewArticle};
use crate::title::{OembedTitleSource, TitleResolver, YtDlpTitleSource};
use crate::transcribe::Transcriber;
use crate::{stt, ScribeError};

/// One submission; lives only for the duration of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub user: String,
    pub link: String,
}

/// What the caller gets back on success
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    pub title: String,
    pub content: String,
    #[serde(skip)]
    pub article_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ValidateRequest,
    ResolveTitle,
    Transcribe,
    GenerateArticle,
    Persist,
    Respond,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ValidateRequest => "validate_request",
            Stage::ResolveTitle => "resolve_title",
            Stage::Transcribe => "transcribe",
            Stage::GenerateArticle => "generate_article",
            Stage::Persist => "persist",
            Stage::Respond => "respond",
        };
        f.write_str(name)
    }
}

/// Externally visible failure of a run
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("title stage failed: {0}")]
    UpstreamTitle(String),

    #[error("transcription stage failed: {0}")]
    UpstreamTranscription(String),

    #[error("generation stage failed: {message}")]
    UpstreamGeneration { message: String, quota: bool },

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn invalid_data() -> Self {
        Self::BadRequest("Invalid data sent".to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::UpstreamTitle(_) | Self::UpstreamTranscription(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamGeneration { quota: true, .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamGeneration { quota: false, .. } => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message placed in the `{"error": ...}` body; internal detail stays in the logs
    pub fn client_message(&self) -> String {
        match self {
            Self::BadRequest(msg) => msg.clone(),
            Self::MethodNotAllowed => "Invalid request method".to_string(),
            Self::UpstreamTitle(detail) => format!("Failed to fetch title: {}", detail),
            Self::UpstreamTranscription(detail) => format!("Transcription failed: {}", detail),
            Self::UpstreamGeneration { message, .. } => message.clone(),
            Self::Persistence(_) => "Failed to save article".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }

    fn from_title(err: ScribeError) -> Self {
        match err {
            ScribeError::TitleUnavailable(detail) => Self::UpstreamTitle(detail),
            other => Self::Internal(other.to_string()),
        }
    }

    fn from_transcription(err: ScribeError) -> Self {
        match err {
            ScribeError::TranscriptionFailed(detail) => Self::UpstreamTranscription(detail),
            e @ (ScribeError::DownloadFailed(_) | ScribeError::ConversionFailed(_)) => {
                Self::UpstreamTranscription(e.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }

    fn from_generation(err: ScribeError) -> Self {
        match err {
            ScribeError::GenerationFailed(message) => Self::UpstreamGeneration {
                quota: is_quota_error(&message),
                message,
            },
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Parse a request body into the trimmed link.
///
/// Anything but a JSON object with a string `link` is rejected as invalid data; a blank
/// link gets its own message. Only http(s) links are accepted since they end up as
/// subprocess arguments.
pub fn validate_body(body: &[u8]) -> Result<String, PipelineError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| PipelineError::invalid_data())?;

    let link = value
        .as_object()
        .and_then(|obj| obj.get("link"))
        .and_then(|link| link.as_str())
        .ok_or_else(PipelineError::invalid_data)?;

    validate_link(link)
}

/// Trim and check a link supplied outside of a JSON body
pub fn validate_link(link: &str) -> Result<String, PipelineError> {
    let link = link.trim();
    if link.is_empty() {
        return Err(PipelineError::BadRequest("Missing \"link\"".to_string()));
    }

    match url::Url::parse(link) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {
            Ok(link.to_string())
        }
        _ => Err(PipelineError::invalid_data()),
    }
}

pub struct ArticlePipeline {
    titles: TitleResolver,
    transcriber: Transcriber,
    generator: ArticleGenerator,
    store: Arc<dyn ArticleStore>,
}

impl ArticlePipeline {
    pub fn new(
        titles: TitleResolver,
        transcriber: Transcriber,
        generator: ArticleGenerator,
        store: Arc<dyn ArticleStore>,
    ) -> Self {
        Self {
            titles,
            transcriber,
            generator,
            store,
        }
    }

    /// Wire up the production collaborators described by `config`
    pub async fn from_config(config: &Config, store: Arc<dyn ArticleStore>) -> crate::Result<Self> {
        let ytdlp = YtDlpClient::new(config.yt_dlp.binary.clone());

        let titles = TitleResolver::new(
            Arc::new(OembedTitleSource::new(
                config.title.oembed_endpoint.clone(),
                Duration::from_secs(config.title.timeout_secs),
            )?),
            Arc::new(YtDlpTitleSource::new(ytdlp)),
        );

        let stt = stt::from_config(&config.transcription)
            .await
            .context("Failed to create speech-to-text client")?;
        let transcriber = Transcriber::new(Arc::new(AudioRetriever::from_config(config)), stt)
            .keep_audio(config.storage.keep_audio);

        let generation = &config.generation;
        let chat = OllamaChat::new(
            &generation.base_url,
            generation.model.clone(),
            Duration::from_secs(generation.timeout_secs),
        )?;
        let generator = ArticleGenerator::new(
            Arc::new(chat),
            generation.temperature,
            generation.num_predict,
        );

        Ok(Self::new(titles, transcriber, generator, store))
    }

    pub fn store(&self) -> &Arc<dyn ArticleStore> {
        &self.store
    }

    /// Validate a raw request body for `user`, then run the remaining stages
    pub async fn handle(&self, user: &str, body: &[u8]) -> Result<PipelineResult, PipelineError> {
        let link = validate_body(body).map_err(|e| {
            tracing::info!(stage = %Stage::ValidateRequest, error = %e, "request rejected");
            e
        })?;

        self.run(GenerationRequest {
            user: user.to_string(),
            link,
        })
        .await
    }

    /// Run title resolution through persistence for an already validated request
    pub async fn run(&self, request: GenerationRequest) -> Result<PipelineResult, PipelineError> {
        let span = tracing::info_span!("pipeline", user = %request.user, link = %request.link);
        self.run_stages(request).instrument(span).await
    }

    async fn run_stages(&self, request: GenerationRequest) -> Result<PipelineResult, PipelineError> {
        tracing::info!(stage = %Stage::ResolveTitle, "stage started");
        let title = self
            .titles
            .resolve(&request.link)
            .await
            .map_err(|e| failed(Stage::ResolveTitle, PipelineError::from_title(e)))?;

        tracing::info!(stage = %Stage::Transcribe, title = %title, "stage started");
        let transcript = self
            .transcriber
            .transcribe(&request.link)
            .await
            .map_err(|e| failed(Stage::Transcribe, PipelineError::from_transcription(e)))?;

        tracing::info!(stage = %Stage::GenerateArticle, transcript_chars = transcript.len(), "stage started");
        let content = self
            .generator
            .generate(&transcript)
            .await
            .map_err(|e| failed(Stage::GenerateArticle, PipelineError::from_generation(e)))?;

        tracing::info!(stage = %Stage::Persist, "stage started");
        let article = self
            .store
            .create(NewArticle {
                owner: request.user,
                source_title: title.clone(),
                source_link: request.link,
                content: content.clone(),
            })
            .await
            .map_err(|e| failed(Stage::Persist, PipelineError::Persistence(format!("{:#}", e))))?;

        tracing::info!(stage = %Stage::Respond, article_id = %article.id, "article generated");
        Ok(PipelineResult {
            title,
            content,
            article_id: article.id,
        })
    }
}

fn failed(stage: Stage, err: PipelineError) -> PipelineError {
    if err.status_code().is_server_error() {
        tracing::error!(stage = %stage, error = %err, "stage failed");
    } else {
        tracing::warn!(stage = %stage, error = %err, "stage failed");
    }
    err
}
