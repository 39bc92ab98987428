//! Transcriber: link in, transcript text out.

use std::sync::Arc;

use crate::audio::{remove_best_effort, ArtifactLocks, AudioSource};
use crate::stt::{SpeechToText, TranscriptStatus};
use crate::ScribeError;

/// Drives audio retrieval and speech-to-text for one link
pub struct Transcriber {
    audio: Arc<dyn AudioSource>,
    stt: Arc<dyn SpeechToText>,
    locks: ArtifactLocks,
    keep_audio: bool,
}

impl Transcriber {
    pub fn new(audio: Arc<dyn AudioSource>, stt: Arc<dyn SpeechToText>) -> Self {
        Self {
            audio,
            stt,
            locks: ArtifactLocks::new(),
            keep_audio: true,
        }
    }

    /// Delete the converted audio once the service has it
    pub fn keep_audio(mut self, keep: bool) -> Self {
        self.keep_audio = keep;
        self
    }

    /// Download, convert and transcribe the audio behind `link`.
    ///
    /// Download and conversion failures are passed through unchanged; everything the
    /// speech-to-text side reports becomes [`ScribeError::TranscriptionFailed`].
    pub async fn transcribe(&self, link: &str) -> Result<String, ScribeError> {
        // artifact paths are keyed by video, so the same link must not run twice at once
        let _guard = self.locks.acquire(link).await;

        let audio_path = self.audio.retrieve(link).await?;
        tracing::info!(path = %audio_path.display(), "submitting audio for transcription");

        let outcome = self.stt.transcribe(&audio_path).await;

        if !self.keep_audio {
            remove_best_effort(&audio_path);
        }

        let outcome = outcome.map_err(|e| ScribeError::TranscriptionFailed(format!("{:#}", e)))?;

        if outcome.status != TranscriptStatus::Completed {
            return Err(ScribeError::TranscriptionFailed(format!(
                "status={}, error={}",
                outcome.status,
                outcome.error.as_deref().unwrap_or("none")
            )));
        }

        match outcome.text {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(ScribeError::TranscriptionFailed(
                "service returned an empty transcript".to_string(),
            )),
        }
    }
}
