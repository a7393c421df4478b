// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for homecare
//!
//! Loads configuration from .homecarerc.toml in current directory or ~/.config/homecare/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::embedding::provider::{DEFAULT_EMBEDDING_DIM, DEFAULT_MAX_INPUT_TOKENS};
use crate::index::Metric;
use crate::utils::DATA_DIR;

/// Output format for results (mirrored from cli for library use)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOutputFormat {
    #[default]
    Text,
    Json,
}

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// Local fastembed model
    #[default]
    Builtin,
    /// External command speaking JSON on stdin/stdout
    Command,
    /// Deterministic feature hashing, no model download
    Hashing,
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (builtin, command, hashing)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier for the embedding provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Texts per provider call
    pub batch_size: Option<usize>,
    /// Maximum model input length in tokens
    pub max_tokens: Option<usize>,
    /// Vector length for command and hashing providers
    pub dimension: Option<usize>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Builtin)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "minilm")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("minilm")
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Get batch size (defaults to 256)
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(256)
    }

    /// Get max input tokens (defaults to 512)
    pub fn max_tokens(&self) -> usize {
        self.max_tokens.unwrap_or(DEFAULT_MAX_INPUT_TOKENS)
    }

    /// Get dimension (defaults to 384)
    pub fn dimension(&self) -> usize {
        self.dimension.unwrap_or(DEFAULT_EMBEDDING_DIM)
    }
}

/// Index configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Distance metric (l2, cosine)
    pub metric: Option<Metric>,
    /// Number of neighbours returned when the caller gives none
    pub default_k: Option<usize>,
}

impl IndexConfig {
    /// Get metric (defaults to squared L2)
    pub fn metric(&self) -> Metric {
        self.metric.unwrap_or_default()
    }

    /// Get default k (defaults to 3)
    pub fn default_k(&self) -> usize {
        self.default_k.unwrap_or(3).max(1)
    }
}

/// Corpus store configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Path to the SQLite corpus database
    pub database: Option<PathBuf>,
}

impl CorpusConfig {
    /// Get database path (defaults to `.homecare/faq.sqlite` under `root`)
    pub fn database(&self, root: &Path) -> PathBuf {
        match &self.database {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root.join(path),
            None => root.join(DATA_DIR).join("faq.sqlite"),
        }
    }
}

/// Transcription and report generation commands
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Command that turns an audio file into a transcript
    pub transcribe_command: Option<String>,
    /// Command that turns a transcript into a SOAP report
    pub report_command: Option<String>,
}

impl PipelineConfig {
    /// Get transcription command (defaults to "transcriber")
    pub fn transcribe_command(&self) -> &str {
        self.transcribe_command.as_deref().unwrap_or("transcriber")
    }

    /// Get report command (defaults to "reporter")
    pub fn report_command(&self) -> &str {
        self.report_command.as_deref().unwrap_or("reporter")
    }
}

/// Upload server configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: Option<String>,
    /// Maximum upload size in bytes
    pub max_upload_bytes: Option<usize>,
    /// Allowed audio file extensions
    pub allowed_extensions: Option<Vec<String>>,
}

impl ServerConfig {
    /// Get bind address (defaults to 0.0.0.0:5000)
    pub fn bind(&self) -> &str {
        self.bind.as_deref().unwrap_or("0.0.0.0:5000")
    }

    /// Get max upload bytes (defaults to 16MB)
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes.unwrap_or(16 * 1024 * 1024)
    }

    /// Get allowed extensions (defaults to m4a, mp3, wav, mp4)
    pub fn allowed_extensions(&self) -> Vec<String> {
        match &self.allowed_extensions {
            Some(exts) => exts.iter().map(|e| e.trim_start_matches('.').to_lowercase()).collect(),
            None => ["m4a", "mp3", "wav", "mp4"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

/// Configuration loaded from .homecarerc.toml or ~/.config/homecare/config.toml
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default output format (text or json)
    pub default_format: Option<String>,

    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    /// Index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Corpus configuration
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Transcription/report configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Upload server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. .homecarerc.toml in current directory
    /// 2. ~/.config/homecare/config.toml
    pub fn load() -> Self {
        if let Some(config) = Self::load_from_path(Path::new(".homecarerc.toml")) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("homecare").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Load configuration from a specific file, returning None when it is absent or invalid.
    pub fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        Self::parse(&content)
            .map_err(|e| warn!("Failed to parse {}: {}", path.display(), e))
            .ok()
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Get output format from config, parsing the string to ConfigOutputFormat
    pub fn output_format(&self) -> Option<ConfigOutputFormat> {
        self.default_format.as_ref().and_then(|s| match s.to_lowercase().as_str() {
            "json" => Some(ConfigOutputFormat::Json),
            "text" => Some(ConfigOutputFormat::Text),
            _ => None,
        })
    }

    /// Merge CLI k with config (CLI wins)
    pub fn merge_k(&self, cli_value: Option<usize>) -> usize {
        cli_value.unwrap_or_else(|| self.index.default_k())
    }

    /// Get the embedding configuration
    pub fn embeddings(&self) -> &EmbeddingConfig {
        &self.embeddings
    }

    /// Get the index configuration
    pub fn index(&self) -> &IndexConfig {
        &self.index
    }

    /// Get the corpus configuration
    pub fn corpus(&self) -> &CorpusConfig {
        &self.corpus
    }

    /// Get the pipeline configuration
    pub fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    /// Get the server configuration
    pub fn server(&self) -> &ServerConfig {
        &self.server
    }
}
