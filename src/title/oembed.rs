use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::TitleSource;
use crate::Result;

#[derive(Debug, Deserialize)]
struct OembedResponse {
    title: Option<String>,
}

/// Lightweight title lookup against an oEmbed endpoint
pub struct OembedTitleSource {
    client: Client,
    endpoint: String,
}

impl OembedTitleSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for oEmbed")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl TitleSource for OembedTitleSource {
    async fn lookup(&self, link: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", link), ("format", "json")])
            .send()
            .await
            .context("oEmbed request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("oEmbed returned HTTP {}", response.status());
        }

        let body: OembedResponse = response
            .json()
            .await
            .context("Failed to parse oEmbed response")?;

        Ok(body
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()))
    }

    fn name(&self) -> &'static str {
        "oembed"
    }
}
