//! Title resolution: a cheap oEmbed lookup first, yt-dlp metadata second.

use async_trait::async_trait;
use std::sync::Arc;

pub mod oembed;

pub use oembed::OembedTitleSource;

use crate::audio::ytdlp::YtDlpClient;
use crate::{Result, ScribeError};

/// Something that can name a video
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TitleSource: Send + Sync {
    /// Look up the title. `Ok(None)` means the source answered without one.
    async fn lookup(&self, link: &str) -> Result<Option<String>>;

    fn name(&self) -> &'static str;
}

/// Heavier fallback: ask yt-dlp for the full video metadata
pub struct YtDlpTitleSource {
    client: YtDlpClient,
}

impl YtDlpTitleSource {
    pub fn new(client: YtDlpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TitleSource for YtDlpTitleSource {
    async fn lookup(&self, link: &str) -> Result<Option<String>> {
        let info = self.client.video_info(link).await?;
        Ok(info.title)
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

pub struct TitleResolver {
    primary: Arc<dyn TitleSource>,
    fallback: Arc<dyn TitleSource>,
}

impl TitleResolver {
    pub fn new(primary: Arc<dyn TitleSource>, fallback: Arc<dyn TitleSource>) -> Self {
        Self { primary, fallback }
    }

    /// Return a non-empty display title for `link`.
    ///
    /// Errors from the primary source are swallowed; only the fallback can fail the call.
    pub async fn resolve(&self, link: &str) -> std::result::Result<String, ScribeError> {
        match self.primary.lookup(link).await {
            Ok(Some(title)) if !title.trim().is_empty() => {
                return Ok(title.trim().to_string());
            }
            Ok(_) => {
                tracing::debug!(source = self.primary.name(), "no title returned, trying fallback");
            }
            Err(e) => {
                tracing::debug!(source = self.primary.name(), error = %e, "title lookup failed, trying fallback");
            }
        }

        match self.fallback.lookup(link).await {
            Ok(Some(title)) if !title.trim().is_empty() => Ok(title.trim().to_string()),
            Ok(_) => Err(ScribeError::TitleUnavailable(format!(
                "{} returned no title",
                self.fallback.name()
            ))),
            Err(e) => Err(ScribeError::TitleUnavailable(format!("{:#}", e))),
        }
    }
}
