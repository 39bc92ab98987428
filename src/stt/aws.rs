use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_transcribe::types::{Media, MediaFormat, TranscriptionJob, TranscriptionJobStatus};
use aws_sdk_transcribe::Client as TranscribeClient;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use super::{SpeechToText, TranscriptOutcome};
use crate::config::AwsConfig;

/// AWS Transcribe transcript document (only the fields we read)
#[derive(Debug, Deserialize)]
struct AwsTranscript {
    results: TranscriptResults,
}

#[derive(Debug, Deserialize)]
struct TranscriptResults {
    transcripts: Vec<TranscriptText>,
}

#[derive(Debug, Deserialize)]
struct TranscriptText {
    transcript: String,
}

/// Speech-to-text through S3 + AWS Transcribe
pub struct AwsTranscribeClient {
    s3_client: S3Client,
    transcribe_client: TranscribeClient,
    http_client: reqwest::Client,
    bucket: String,
    key_prefix: String,
    language_code: Option<String>,
}

impl AwsTranscribeClient {
    pub async fn from_config(config: &AwsConfig) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        Self {
            s3_client: S3Client::new(&aws_config),
            transcribe_client: TranscribeClient::new(&aws_config),
            http_client: reqwest::Client::new(),
            bucket: config.s3_bucket.clone(),
            key_prefix: config.s3_key_prefix.clone().unwrap_or_default(),
            language_code: config.language_code.clone(),
        }
    }

    async fn upload_to_s3(&self, audio_path: &Path) -> Result<String> {
        let ext = audio_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp3");
        let key = format!(
            "{}audio_{}_{}.{}",
            self.key_prefix,
            Uuid::new_v4(),
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
            ext
        );

        tracing::info!("Uploading audio to S3: s3://{}/{}", self.bucket, key);

        let content = fs_err::read(audio_path)?;

        self.s3_client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(content.into())
            .content_type(mime_type(ext))
            .send()
            .await
            .context("Failed to upload audio to S3")?;

        Ok(key)
    }

    async fn start_job(&self, s3_key: &str, format: MediaFormat) -> Result<String> {
        let job_name = format!("blogscribe_{}", Uuid::new_v4());
        let media_uri = format!("s3://{}/{}", self.bucket, s3_key);

        tracing::info!("Starting transcription job: {}", job_name);

        let media = Media::builder().media_file_uri(media_uri).build();

        let mut job_builder = self
            .transcribe_client
            .start_transcription_job()
            .transcription_job_name(&job_name)
            .media_format(format)
            .media(media);

        if let Some(lang) = &self.language_code {
            job_builder = job_builder.language_code(lang.as_str().into());
        } else {
            job_builder = job_builder.identify_language(true);
        }

        job_builder
            .send()
            .await
            .context("Failed to start transcription job")?;

        Ok(job_name)
    }

    async fn get_job(&self, job_name: &str) -> Result<TranscriptionJob> {
        let response = self
            .transcribe_client
            .get_transcription_job()
            .transcription_job_name(job_name)
            .send()
            .await
            .context("Failed to get transcription job status")?;

        response
            .transcription_job()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Transcription job not found"))
    }

    /// Poll until the job leaves the in-progress states
    async fn wait_for_job(&self, job_name: &str) -> Result<TranscriptOutcome> {
        let mut check_count: u64 = 0;

        loop {
            check_count += 1;
            let job = self.get_job(job_name).await?;

            match job.transcription_job_status() {
                Some(TranscriptionJobStatus::InProgress) | Some(TranscriptionJobStatus::Queued) => {
                    tracing::debug!(job = %job_name, check = check_count, "transcription in progress");
                    // backoff up to 30 seconds
                    let wait_time = std::cmp::min(5 + (check_count - 1) * 2, 30);
                    sleep(Duration::from_secs(wait_time)).await;
                }
                Some(TranscriptionJobStatus::Completed) => {
                    let uri = job
                        .transcript()
                        .and_then(|t| t.transcript_file_uri())
                        .context("No transcript URI found")?;
                    let text = self.download_transcript(uri).await?;
                    return Ok(TranscriptOutcome::completed(text));
                }
                Some(TranscriptionJobStatus::Failed) => {
                    let reason = job.failure_reason().unwrap_or("Unknown error");
                    return Ok(TranscriptOutcome::failed(reason));
                }
                other => {
                    anyhow::bail!("Unexpected transcription job status: {:?}", other);
                }
            }
        }
    }

    async fn download_transcript(&self, uri: &str) -> Result<String> {
        let response = self
            .http_client
            .get(uri)
            .send()
            .await
            .context("Failed to download transcript")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download transcript: HTTP {}", response.status());
        }

        let content = response
            .text()
            .await
            .context("Failed to read transcript content")?;

        parse_transcript(&content)
    }

    async fn cleanup_s3(&self, s3_key: &str) {
        tracing::debug!("Cleaning up S3 object: {}", s3_key);

        if let Err(e) = self
            .s3_client
            .delete_object()
            .bucket(&self.bucket)
            .key(s3_key)
            .send()
            .await
        {
            tracing::warn!(key = %s3_key, error = %e, "failed to clean up S3 object");
        }
    }
}

#[async_trait]
impl SpeechToText for AwsTranscribeClient {
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptOutcome> {
        let s3_key = self.upload_to_s3(audio_path).await?;

        let outcome = match self.start_job(&s3_key, media_format(audio_path)).await {
            Ok(job_name) => self.wait_for_job(&job_name).await,
            Err(e) => Err(e),
        };

        self.cleanup_s3(&s3_key).await;
        outcome
    }
}

fn parse_transcript(json: &str) -> Result<String> {
    let transcript: AwsTranscript =
        serde_json::from_str(json).context("Failed to parse transcript JSON")?;

    Ok(transcript
        .results
        .transcripts
        .into_iter()
        .map(|t| t.transcript)
        .collect::<Vec<_>>()
        .join(" "))
}

fn media_format(path: &Path) -> MediaFormat {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("m4a") | Some("mp4") => MediaFormat::Mp4,
        Some("wav") => MediaFormat::Wav,
        Some("flac") => MediaFormat::Flac,
        Some("ogg") | Some("opus") => MediaFormat::Ogg,
        Some("webm") => MediaFormat::Webm,
        _ => MediaFormat::Mp3,
    }
}

fn mime_type(ext: &str) -> &'static str {
    match ext {
        "m4a" | "mp4" => "audio/mp4",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" | "opus" => "audio/ogg",
        "webm" => "audio/webm",
        _ => "audio/mpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transcript() {
        let json = r#"{
            "jobName": "blogscribe_1",
            "accountId": "123",
            "status": "COMPLETED",
            "results": {
                "transcripts": [{ "transcript": "Hello world." }],
                "items": []
            }
        }"#;
        assert_eq!(parse_transcript(json).unwrap(), "Hello world.");
    }

    #[test]
    fn test_parse_transcript_rejects_garbage() {
        assert!(parse_transcript("{\"results\": 3}").is_err());
    }

    #[test]
    fn test_media_format_from_extension() {
        assert_eq!(media_format(Path::new("/m/audio-abc.mp3")), MediaFormat::Mp3);
        assert_eq!(media_format(Path::new("/m/audio-abc.M4A")), MediaFormat::Mp4);
        assert_eq!(media_format(Path::new("/m/audio-abc")), MediaFormat::Mp3);
        assert_eq!(mime_type("mp3"), "audio/mpeg");
    }
}
