//! Persistence for generated articles.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::Result;

/// A stored article; never modified after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogArticle {
    pub id: Uuid,
    pub owner: String,
    pub source_title: String,
    pub source_link: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the pipeline
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub owner: String,
    pub source_title: String,
    pub source_link: String,
    pub content: String,
}

impl NewArticle {
    fn into_article(self) -> BlogArticle {
        BlogArticle {
            id: Uuid::new_v4(),
            owner: self.owner,
            source_title: self.source_title,
            source_link: self.source_link,
            content: self.content,
            created_at: Utc::now(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn create(&self, article: NewArticle) -> Result<BlogArticle>;

    /// Articles owned by `owner`, newest first
    async fn list_for_owner(&self, owner: &str) -> Result<Vec<BlogArticle>>;

    async fn get(&self, id: Uuid) -> Result<Option<BlogArticle>>;
}

fn newest_first(mut articles: Vec<BlogArticle>) -> Vec<BlogArticle> {
    articles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    articles
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    articles: Mutex<Vec<BlogArticle>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.articles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn create(&self, article: NewArticle) -> Result<BlogArticle> {
        let article = article.into_article();
        self.articles.lock().await.push(article.clone());
        Ok(article)
    }

    async fn list_for_owner(&self, owner: &str) -> Result<Vec<BlogArticle>> {
        let articles = self.articles.lock().await;
        Ok(newest_first(
            articles.iter().filter(|a| a.owner == owner).cloned().collect(),
        ))
    }

    async fn get(&self, id: Uuid) -> Result<Option<BlogArticle>> {
        Ok(self.articles.lock().await.iter().find(|a| a.id == id).cloned())
    }
}

/// Articles kept in a single JSON document, rewritten atomically on every insert
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let store = Self {
            path,
            write_lock: Mutex::new(()),
        };
        // fail at startup rather than on the first request
        read_articles(&store.path)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<BlogArticle>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_articles(&path))
            .await
            .context("Article store read task panicked")?
    }

    async fn write_all(&self, articles: Vec<BlogArticle>) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_articles(&path, &articles))
            .await
            .context("Article store write task panicked")?
    }
}

fn read_articles(path: &Path) -> Result<Vec<BlogArticle>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs_err::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse article store {}", path.display()))
}

fn write_articles(path: &Path, articles: &[BlogArticle]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .context("Failed to create temporary article file")?;
    serde_json::to_writer_pretty(&mut tmp, articles).context("Failed to serialize articles")?;
    tmp.flush()?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    Ok(())
}

#[async_trait]
impl ArticleStore for JsonFileStore {
    async fn create(&self, article: NewArticle) -> Result<BlogArticle> {
        // held across the read and the rewrite
        let _guard = self.write_lock.lock().await;

        let mut articles = self.read_all().await?;
        let article = article.into_article();
        articles.push(article.clone());
        self.write_all(articles).await?;

        tracing::debug!(id = %article.id, owner = %article.owner, "article stored");
        Ok(article)
    }

    async fn list_for_owner(&self, owner: &str) -> Result<Vec<BlogArticle>> {
        let articles = self.read_all().await?;
        Ok(newest_first(
            articles.into_iter().filter(|a| a.owner == owner).collect(),
        ))
    }

    async fn get(&self, id: Uuid) -> Result<Option<BlogArticle>> {
        Ok(self.read_all().await?.into_iter().find(|a| a.id == id))
    }
}

/// JSON file store when a path is configured, memory otherwise
pub fn from_config(path: Option<&Path>) -> Result<Arc<dyn ArticleStore>> {
    match path {
        Some(path) => Ok(Arc::new(JsonFileStore::open(path)?)),
        None => Ok(Arc::new(MemoryStore::new())),
    }
}
