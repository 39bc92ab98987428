//! Speech-to-text service clients.

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub mod assemblyai;
pub mod aws;

pub use assemblyai::AssemblyAiClient;
pub use aws::AwsTranscribeClient;

use crate::config::{SttProvider, TranscriptionConfig};
use crate::Result;

/// Status reported by a transcription service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptStatus {
    Queued,
    Processing,
    Completed,
    Error,
    Other(String),
}

impl TranscriptStatus {
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "queued" => TranscriptStatus::Queued,
            "processing" | "in_progress" => TranscriptStatus::Processing,
            "completed" => TranscriptStatus::Completed,
            "error" | "failed" => TranscriptStatus::Error,
            _ => TranscriptStatus::Other(status.to_string()),
        }
    }

    /// No further progress will be reported
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TranscriptStatus::Queued | TranscriptStatus::Processing)
    }
}

impl fmt::Display for TranscriptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptStatus::Queued => write!(f, "queued"),
            TranscriptStatus::Processing => write!(f, "processing"),
            TranscriptStatus::Completed => write!(f, "completed"),
            TranscriptStatus::Error => write!(f, "error"),
            TranscriptStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Terminal report for one submitted audio file
#[derive(Debug, Clone)]
pub struct TranscriptOutcome {
    pub status: TranscriptStatus,
    pub error: Option<String>,
    pub text: Option<String>,
}

impl TranscriptOutcome {
    pub fn completed(text: impl Into<String>) -> Self {
        Self {
            status: TranscriptStatus::Completed,
            error: None,
            text: Some(text.into()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TranscriptStatus::Error,
            error: Some(error.into()),
            text: None,
        }
    }
}

/// Submits a local audio file and waits for the terminal status
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptOutcome>;
}

/// Build the configured provider
pub async fn from_config(config: &TranscriptionConfig) -> Result<Arc<dyn SpeechToText>> {
    let client: Arc<dyn SpeechToText> = match config.provider {
        SttProvider::AssemblyAi => {
            let aai = &config.assemblyai;
            Arc::new(AssemblyAiClient::new(
                &aai.base_url,
                &aai.api_key,
                Duration::from_secs(aai.poll_interval_secs),
                aai.max_polls,
            )?)
        }
        SttProvider::Aws => Arc::new(AwsTranscribeClient::from_config(&config.aws).await),
    };

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!(TranscriptStatus::parse("completed"), TranscriptStatus::Completed);
        assert_eq!(TranscriptStatus::parse("COMPLETED"), TranscriptStatus::Completed);
        assert_eq!(TranscriptStatus::parse("error"), TranscriptStatus::Error);
        assert_eq!(TranscriptStatus::parse("queued"), TranscriptStatus::Queued);
        assert_eq!(
            TranscriptStatus::parse("throttled"),
            TranscriptStatus::Other("throttled".to_string())
        );
    }

    #[test]
    fn test_terminal() {
        assert!(!TranscriptStatus::Queued.is_terminal());
        assert!(!TranscriptStatus::Processing.is_terminal());
        assert!(TranscriptStatus::Completed.is_terminal());
        assert!(TranscriptStatus::Error.is_terminal());
        assert_eq!(TranscriptStatus::Other("x".into()).to_string(), "x");
    }
}
