use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;

use super::{SpeechToText, TranscriptOutcome, TranscriptStatus};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    id: String,
    status: String,
    text: Option<String>,
    error: Option<String>,
}

/// AssemblyAI v2 REST client: upload, start, poll
pub struct AssemblyAiClient {
    http_client: Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl Debug for AssemblyAiClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("AssemblyAiClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AssemblyAiClient {
    pub fn new(base_url: &str, api_key: &str, poll_interval: Duration, max_polls: u32) -> Result<Self> {
        if api_key.is_empty() {
            anyhow::bail!("AssemblyAI API key is required");
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(300)) // uploads of long audio files
            .build()
            .context("Failed to create HTTP client for AssemblyAI")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            poll_interval,
            max_polls: max_polls.max(1),
        })
    }

    async fn upload_audio(&self, audio_path: &Path) -> Result<String> {
        let audio_data = tokio::fs::read(audio_path)
            .await
            .with_context(|| format!("Failed to read {}", audio_path.display()))?;

        tracing::debug!(bytes = audio_data.len(), "uploading audio to AssemblyAI");

        let response = self
            .http_client
            .post(format!("{}/upload", self.base_url))
            .header("authorization", &self.api_key)
            .body(audio_data)
            .send()
            .await
            .context("Failed to upload audio to AssemblyAI")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("AssemblyAI upload failed: {} - {}", status, error_text);
        }

        let upload: UploadResponse = response
            .json()
            .await
            .context("Failed to parse upload response")?;

        Ok(upload.upload_url)
    }

    async fn start_transcription(&self, upload_url: &str) -> Result<String> {
        let response = self
            .http_client
            .post(format!("{}/transcript", self.base_url))
            .header("authorization", &self.api_key)
            .json(&json!({ "audio_url": upload_url }))
            .send()
            .await
            .context("Failed to start transcription")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("AssemblyAI transcription start failed: {} - {}", status, error_text);
        }

        let transcript: TranscriptResponse = response
            .json()
            .await
            .context("Failed to parse transcription response")?;

        Ok(transcript.id)
    }

    async fn poll_transcription(&self, transcript_id: &str) -> Result<TranscriptOutcome> {
        let url = format!("{}/transcript/{}", self.base_url, transcript_id);

        for attempt in 1..=self.max_polls {
            let response = self
                .http_client
                .get(&url)
                .header("authorization", &self.api_key)
                .send()
                .await
                .context("Failed to poll transcription status")?;

            let status = response.status();
            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                anyhow::bail!("AssemblyAI status check failed: {} - {}", status, error_text);
            }

            let transcript: TranscriptResponse = response
                .json()
                .await
                .context("Failed to parse transcript status")?;

            let state = TranscriptStatus::parse(&transcript.status);
            if state.is_terminal() {
                tracing::info!(%transcript_id, status = %state, attempt, "transcript reached terminal status");
                return Ok(TranscriptOutcome {
                    status: state,
                    error: transcript.error,
                    text: transcript.text,
                });
            }

            tracing::debug!(%transcript_id, status = %state, attempt, "transcript not ready");
            sleep(self.poll_interval).await;
        }

        anyhow::bail!(
            "Transcription {} did not finish after {} status checks",
            transcript_id,
            self.max_polls
        )
    }
}

#[async_trait]
impl SpeechToText for AssemblyAiClient {
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptOutcome> {
        let upload_url = self.upload_audio(audio_path).await?;
        let transcript_id = self.start_transcription(&upload_url).await?;

        tracing::info!(%transcript_id, "transcription started, polling for completion");
        self.poll_transcription(&transcript_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_upload_and_start(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v2/upload"))
            .and(header("authorization", "secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "upload_url": "https://cdn.example/abc" })),
            )
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v2/transcript"))
            .and(body_json(json!({ "audio_url": "https://cdn.example/abc" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": "t1", "status": "queued" })),
            )
            .mount(server)
            .await;
    }

    fn client(server: &MockServer, max_polls: u32) -> AssemblyAiClient {
        AssemblyAiClient::new(
            &format!("{}/v2", server.uri()),
            "secret",
            Duration::from_millis(5),
            max_polls,
        )
        .unwrap()
    }

    fn audio_file() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"ID3fake").unwrap();
        file
    }

    #[tokio::test]
    async fn test_completed_transcript() {
        let server = MockServer::start().await;
        mount_upload_and_start(&server).await;

        Mock::given(method("GET"))
            .and(path("/v2/transcript/t1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": "t1", "status": "processing" })),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/transcript/t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "id": "t1", "status": "completed", "text": "hello there" }),
            ))
            .mount(&server)
            .await;

        let audio = audio_file();
        let outcome = client(&server, 10).transcribe(audio.path()).await.unwrap();
        assert_eq!(outcome.status, TranscriptStatus::Completed);
        assert_eq!(outcome.text.as_deref(), Some("hello there"));
    }

    #[tokio::test]
    async fn test_error_status_is_reported_not_raised() {
        let server = MockServer::start().await;
        mount_upload_and_start(&server).await;

        Mock::given(method("GET"))
            .and(path("/v2/transcript/t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "id": "t1", "status": "error", "error": "Audio file is too short" }),
            ))
            .mount(&server)
            .await;

        let audio = audio_file();
        let outcome = client(&server, 10).transcribe(audio.path()).await.unwrap();
        assert_eq!(outcome.status, TranscriptStatus::Error);
        assert_eq!(outcome.error.as_deref(), Some("Audio file is too short"));
    }

    #[tokio::test]
    async fn test_poll_budget_exhausted() {
        let server = MockServer::start().await;
        mount_upload_and_start(&server).await;

        Mock::given(method("GET"))
            .and(path("/v2/transcript/t1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": "t1", "status": "queued" })),
            )
            .mount(&server)
            .await;

        let audio = audio_file();
        let err = client(&server, 3).transcribe(audio.path()).await.unwrap_err();
        assert!(err.to_string().contains("did not finish"));
    }

    #[tokio::test]
    async fn test_upload_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/upload"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
            .mount(&server)
            .await;

        let audio = audio_file();
        let err = client(&server, 3).transcribe(audio.path()).await.unwrap_err();
        assert!(err.to_string().contains("Invalid API key"));
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(AssemblyAiClient::new("https://api.assemblyai.com/v2", "", Duration::from_secs(1), 1).is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let client =
            AssemblyAiClient::new("https://api.assemblyai.com/v2", "secret-key", Duration::from_secs(1), 1)
                .unwrap();
        assert!(!format!("{:?}", client).contains("secret-key"));
    }
}
