use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Longest wait allowed on the title metadata lookup
pub const MAX_TITLE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP service settings
    pub server: ServerConfig,

    /// Where audio artifacts and articles live on disk
    pub storage: StorageConfig,

    /// Transcoding executable lookup
    pub ffmpeg: FfmpegConfig,

    /// Download client settings
    pub yt_dlp: YtDlpConfig,

    /// Title lookup settings
    pub title: TitleConfig,

    /// Speech-to-text settings
    pub transcription: TranscriptionConfig,

    /// Article generation settings
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP service binds to
    pub bind: String,

    /// Header set by the fronting proxy with the authenticated user's name
    pub user_header: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for downloaded and converted audio
    pub media_root: Option<PathBuf>,

    /// JSON file holding generated articles (in-memory store if unset)
    pub articles_path: Option<PathBuf>,

    /// Keep the converted mp3 after transcription
    pub keep_audio: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    /// Explicitly configured ffmpeg path
    pub binary: Option<PathBuf>,

    /// Environment variable consulted when the configured path is missing
    pub env_var: String,

    /// Well-known install locations, tried in order
    pub fallback_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YtDlpConfig {
    pub binary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleConfig {
    /// oEmbed endpoint queried before falling back to yt-dlp
    pub oembed_endpoint: String,

    /// Timeout for the oEmbed request in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttProvider {
    AssemblyAi,
    Aws,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub provider: SttProvider,
    pub assemblyai: AssemblyAiConfig,
    pub aws: AwsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyAiConfig {
    pub base_url: String,

    /// API key; falls back to `ASSEMBLYAI_API_KEY` when empty
    pub api_key: String,

    /// Seconds between status polls
    pub poll_interval_secs: u64,

    /// Polls before giving up on a queued/processing transcript
    pub max_polls: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub region: String,

    /// S3 bucket for temporary audio storage
    pub s3_bucket: String,

    pub s3_key_prefix: Option<String>,

    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Ollama server URL
    pub base_url: String,
    pub model: String,
    pub temperature: f32,

    /// Upper bound on generated tokens
    pub num_predict: u32,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            ffmpeg: FfmpegConfig::default(),
            yt_dlp: YtDlpConfig::default(),
            title: TitleConfig::default(),
            transcription: TranscriptionConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            user_header: "x-authenticated-user".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            media_root: Some(PathBuf::from("media")),
            articles_path: Some(PathBuf::from("media/articles.json")),
            keep_audio: true,
        }
    }
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary: None,
            env_var: "FFMPEG_BINARY".to_string(),
            fallback_paths: [
                r"C:\Program Files\ffmpeg\bin\ffmpeg.exe",
                r"C:\Program Files (x86)\ffmpeg\bin\ffmpeg.exe",
                r"C:\ffmpeg\bin\ffmpeg.exe",
                r"C:\tools\ffmpeg\bin\ffmpeg.exe",
                "/usr/local/bin/ffmpeg",
                "/opt/homebrew/bin/ffmpeg",
            ]
            .iter()
            .map(PathBuf::from)
            .collect(),
        }
    }
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
        }
    }
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            oembed_endpoint: "https://www.youtube.com/oembed".to_string(),
            timeout_secs: MAX_TITLE_TIMEOUT_SECS,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: SttProvider::AssemblyAi,
            assemblyai: AssemblyAiConfig::default(),
            aws: AwsConfig::default(),
        }
    }
}

impl Default for AssemblyAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.assemblyai.com/v2".to_string(),
            api_key: String::new(),
            poll_interval_secs: 3,
            max_polls: 400,
        }
    }
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            s3_bucket: String::new(),
            s3_key_prefix: Some("blogscribe/".to_string()),
            language_code: None,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
            temperature: 0.7,
            num_predict: 1200,
            timeout_secs: 600,
        }
    }
}

impl Config {
    /// Load configuration from an explicit path, or the default location, and validate it
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = Self::load_unvalidated(explicit).await?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`] but without validation, for commands that only inspect settings
    pub async fn load_unvalidated(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else if explicit.is_some() {
            anyhow::bail!("Config file not found: {}", config_path.display());
        } else {
            let config = Self::default();
            config.save(&config_path).await?;
            config
        };

        config.apply_env();
        Ok(config)
    }

    /// Parse a YAML config file without touching the environment
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path)
            .context("Failed to read config file")?;

        serde_yaml::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("blogscribe").join("config.yaml"))
    }

    /// Pull secrets that must not live in the config file from the environment
    pub fn apply_env(&mut self) {
        if self.transcription.assemblyai.api_key.is_empty() {
            if let Ok(key) = std::env::var("ASSEMBLYAI_API_KEY") {
                self.transcription.assemblyai.api_key = key.trim().to_string();
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.media_root.is_none() {
            anyhow::bail!("storage.media_root must be configured");
        }

        if self.title.timeout_secs == 0 || self.title.timeout_secs > MAX_TITLE_TIMEOUT_SECS {
            anyhow::bail!(
                "title.timeout_secs must be between 1 and {}",
                MAX_TITLE_TIMEOUT_SECS
            );
        }

        match self.transcription.provider {
            SttProvider::AssemblyAi if self.transcription.assemblyai.api_key.is_empty() => {
                anyhow::bail!(
                    "AssemblyAI API key must be configured (transcription.assemblyai.api_key or ASSEMBLYAI_API_KEY)"
                );
            }
            SttProvider::Aws if self.transcription.aws.s3_bucket.is_empty() => {
                anyhow::bail!("AWS S3 bucket must be configured for the aws provider");
            }
            _ => {}
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Bind Address: {}", self.server.bind);
        println!("  User Header: {}", self.server.user_header);
        match &self.storage.media_root {
            Some(root) => println!("  Media Root: {}", root.display()),
            None => println!("  Media Root: <unset>"),
        }
        match &self.storage.articles_path {
            Some(path) => println!("  Article Store: {}", path.display()),
            None => println!("  Article Store: in-memory"),
        }
        println!("  Keep Audio: {}", self.storage.keep_audio);
        if let Some(binary) = &self.ffmpeg.binary {
            println!("  ffmpeg: {}", binary.display());
        }
        println!("  ffmpeg Env Override: {}", self.ffmpeg.env_var);
        println!("  yt-dlp: {}", self.yt_dlp.binary);
        println!("  Transcription Provider: {:?}", self.transcription.provider);
        let key_state = if self.transcription.assemblyai.api_key.is_empty() {
            "missing"
        } else {
            "set"
        };
        println!("  AssemblyAI Key: {}", key_state);
        if self.transcription.provider == SttProvider::Aws {
            println!("  AWS Region: {}", self.transcription.aws.region);
            println!("  S3 Bucket: {}", self.transcription.aws.s3_bucket);
        }
        println!(
            "  Model: {} @ {}",
            self.generation.model, self.generation.base_url
        );
    }
}
