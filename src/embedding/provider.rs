// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! Providers are plain owned values: constructing one loads its model and
//! dropping it releases the model. Callers pass them into the components
//! that need embeddings instead of reaching for a global.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::Deserialize;
use std::borrow::Cow;
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use crate::config::{EmbeddingConfig, EmbeddingProviderType};
use crate::errors::{FaqError, Result};

const DEFAULT_FASTEMBED_MODEL: &str = "minilm";
const DEFAULT_FASTEMBED_BATCH_SIZE: usize = 256;
const MAX_FASTEMBED_BATCH_SIZE: usize = 1024;
const DEFAULT_FASTEMBED_MAX_CHARS: usize = 8000;
const DEFAULT_COMMAND_BATCH_SIZE: usize = 64;

/// Maximum sequence length fed to sentence-transformer models.
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 512;

/// Output dimension of the MiniLM family of models.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Token accounting for one input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCount {
    /// Tokens the text produces with no length limit (special tokens included).
    pub full: usize,
    /// Tokens actually consumed by the model after truncation.
    pub used: usize,
}

impl TokenCount {
    fn clamp(full: usize, max_tokens: usize) -> Self {
        Self {
            full,
            used: full.min(max_tokens),
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.full > self.used
    }
}

/// Configuration for the fastembed provider.
#[derive(Debug, Clone)]
pub struct EmbeddingProviderConfig {
    pub model: EmbeddingModel,
    pub batch_size: usize,
    pub max_chars: usize,
    pub max_length: usize,
    pub normalize: bool,
}

impl EmbeddingProviderConfig {
    pub fn from_env() -> Result<Self> {
        let model = parse_model_env()?;
        let mut batch_size = parse_usize_env("FASTEMBED_BATCH_SIZE", DEFAULT_FASTEMBED_BATCH_SIZE)?;
        if batch_size == 0 {
            batch_size = DEFAULT_FASTEMBED_BATCH_SIZE;
        }
        if batch_size > MAX_FASTEMBED_BATCH_SIZE {
            warn!(
                "FASTEMBED_BATCH_SIZE={} exceeds max {}; clamping",
                batch_size, MAX_FASTEMBED_BATCH_SIZE
            );
            batch_size = MAX_FASTEMBED_BATCH_SIZE;
        }

        let mut max_chars = parse_usize_env("FASTEMBED_MAX_CHARS", DEFAULT_FASTEMBED_MAX_CHARS)?;
        if max_chars == 0 {
            max_chars = DEFAULT_FASTEMBED_MAX_CHARS;
        }

        let normalize = parse_bool_env("FASTEMBED_NORMALIZE", true)?;

        Ok(Self {
            model,
            batch_size,
            max_chars,
            max_length: DEFAULT_MAX_INPUT_TOKENS,
            normalize,
        })
    }

    pub fn has_env_overrides() -> bool {
        env::var_os("FASTEMBED_MODEL").is_some()
            || env::var_os("FASTEMBED_BATCH_SIZE").is_some()
            || env::var_os("FASTEMBED_MAX_CHARS").is_some()
            || env::var_os("FASTEMBED_NORMALIZE").is_some()
    }

    /// Builds a config from the `[embeddings]` table, letting env vars win.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        if Self::has_env_overrides() {
            let mut from_env = Self::from_env()?;
            from_env.max_length = config.max_tokens();
            return Ok(from_env);
        }

        let mut resolved = Self {
            model: model_from_name(config.model())?,
            batch_size: config.batch_size().clamp(1, MAX_FASTEMBED_BATCH_SIZE),
            max_length: config.max_tokens(),
            ..Self::default()
        };
        if resolved.max_length == 0 {
            resolved.max_length = DEFAULT_MAX_INPUT_TOKENS;
        }
        Ok(resolved)
    }
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            model: EmbeddingModel::AllMiniLML6V2,
            batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
            max_chars: DEFAULT_FASTEMBED_MAX_CHARS,
            max_length: DEFAULT_MAX_INPUT_TOKENS,
            normalize: true,
        }
    }
}

/// Trait for embedding providers.
pub trait EmbeddingProvider: Send {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Length of every vector this provider produces.
    fn dimension(&self) -> usize;

    /// Returns the batch size used by the provider.
    fn batch_size(&self) -> usize;

    /// Longest input, in model tokens, that contributes to an embedding.
    fn max_input_tokens(&self) -> usize;

    /// Identifies the model together with every setting that changes its
    /// vectors. Cached embeddings are only valid under an equal key.
    fn cache_key(&self) -> String;

    /// Generates embeddings for the given texts, one per input, in input order.
    fn embed_batch(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generates an embedding for a single text.
    fn embed(&mut self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.embed_batch(&[text.to_string()])?;
        result
            .pop()
            .ok_or_else(|| FaqError::ModelUnavailable("no embedding returned".to_string()))
    }

    /// Counts model tokens for `text` with and without truncation.
    fn count_tokens(&self, text: &str) -> Result<TokenCount>;
}

/// FastEmbed provider backed by a local ONNX sentence-transformer.
pub struct FastEmbedder {
    embedder: TextEmbedding,
    config: EmbeddingProviderConfig,
    model_id: String,
    dimension: usize,
}

impl FastEmbedder {
    pub fn new(config: EmbeddingProviderConfig) -> Result<Self> {
        let model = config.model.clone();
        let model_id = model.to_string();
        // Both supported MiniLM variants emit 384-d vectors.
        let dimension = DEFAULT_EMBEDDING_DIM;
        let init = InitOptions::new(model).with_max_length(config.max_length);
        let embedder = TextEmbedding::try_new(init).map_err(|e| {
            FaqError::ModelUnavailable(format!("failed to initialize fastembed model: {e:#}"))
        })?;
        debug!(model = %model_id, dimension, "loaded fastembed model");

        Ok(Self {
            embedder,
            config,
            model_id,
            dimension,
        })
    }
}

impl EmbeddingProvider for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn max_input_tokens(&self) -> usize {
        self.config.max_length
    }

    fn cache_key(&self) -> String {
        format!(
            "{}:len={}:chars={}:norm={}",
            self.model_id, self.config.max_length, self.config.max_chars, self.config.normalize
        )
    }

    fn embed_batch(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        validate_texts(texts)?;

        let prepared = truncate_texts(texts, self.config.max_chars);
        let mut embeddings = self
            .embedder
            .embed(&prepared, Some(self.config.batch_size))
            .map_err(|e| FaqError::ModelUnavailable(format!("embedding failed: {e:#}")))?;

        if self.config.normalize {
            for embedding in embeddings.iter_mut() {
                l2_normalize(embedding);
            }
        }

        Ok(embeddings)
    }

    fn count_tokens(&self, text: &str) -> Result<TokenCount> {
        validate_text(text)?;
        let mut tokenizer = self.embedder.tokenizer.clone();
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(None)
            .map_err(|e| FaqError::Encoding(e.to_string()))?;
        let encoding = tokenizer
            .encode(text, true)
            .map_err(|e| FaqError::Encoding(e.to_string()))?;
        Ok(TokenCount::clamp(encoding.len(), self.config.max_length))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CommandOutput {
    Bare(Vec<Vec<f32>>),
    Wrapped {
        #[serde(alias = "vectors", alias = "data")]
        embeddings: Vec<Vec<f32>>,
    },
}

impl CommandOutput {
    fn into_vectors(self) -> Vec<Vec<f32>> {
        match self {
            CommandOutput::Bare(vectors) => vectors,
            CommandOutput::Wrapped { embeddings } => embeddings,
        }
    }
}

/// Command provider that shells out to an external process.
///
/// The command receives `{"model": .., "texts": [..]}` on stdin and must
/// print either a JSON array of vectors or an object with an `embeddings`
/// (alias `vectors`, `data`) array.
pub struct CommandProvider {
    command: String,
    model: String,
    dimension: usize,
    max_tokens: usize,
    batch_size: usize,
}

impl CommandProvider {
    pub fn new(command: String, model: String, dimension: usize) -> Self {
        Self {
            command,
            model,
            dimension,
            max_tokens: DEFAULT_MAX_INPUT_TOKENS,
            batch_size: DEFAULT_COMMAND_BATCH_SIZE,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn run_command(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let payload = serde_json::json!({
            "model": self.model,
            "texts": texts,
        });
        let stdout = run_json_command(&self.command, &payload)
            .map_err(|e| FaqError::ModelUnavailable(e.to_string()))?;

        let parsed: CommandOutput = serde_json::from_str(stdout.trim())
            .map_err(|e| FaqError::parse("embedding command output", e))?;
        let vectors = parsed.into_vectors();

        if vectors.len() != texts.len() {
            return Err(FaqError::parse(
                "embedding command output",
                format!("expected {} vectors, got {}", texts.len(), vectors.len()),
            ));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(FaqError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        Ok(vectors)
    }
}

impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn max_input_tokens(&self) -> usize {
        self.max_tokens
    }

    fn cache_key(&self) -> String {
        let command = blake3::hash(self.command.as_bytes()).to_hex();
        format!("{}:dim={}:cmd={}", self.model, self.dimension, &command[..16])
    }

    fn embed_batch(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        validate_texts(texts)?;

        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size.max(1)) {
            out.extend(self.run_command(chunk)?);
        }
        Ok(out)
    }

    fn count_tokens(&self, text: &str) -> Result<TokenCount> {
        validate_text(text)?;
        Ok(TokenCount::clamp(
            approximate_token_count(text),
            self.max_tokens,
        ))
    }
}

/// Deterministic feature-hashing embedder.
///
/// Words and their character trigrams are hashed into signed buckets and the
/// result is L2-normalized. Texts sharing vocabulary land close together,
/// which is enough for offline use and tests; there is no model to load.
pub struct HashingProvider {
    model: String,
    dimension: usize,
    max_tokens: usize,
    batch_size: usize,
}

impl HashingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            model: format!("hashing-{}", dimension),
            dimension: dimension.max(1),
            max_tokens: DEFAULT_MAX_INPUT_TOKENS,
            batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens.max(1);
        self
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        // Mirror the model: tokens past the limit do not contribute.
        let limit = self.max_tokens.saturating_sub(2);
        for word in word_tokens(text).into_iter().take(limit) {
            self.accumulate(&mut vector, word.as_bytes(), 1.0);

            let padded: Vec<char> = format!("<{}>", word).chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                self.accumulate(&mut vector, gram.as_bytes(), 0.5);
            }
        }
        l2_normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = blake3::hash(feature);
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        let value = u64::from_le_bytes(head);
        let bucket = (value % self.dimension as u64) as usize;
        let sign = if value >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl EmbeddingProvider for HashingProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn max_input_tokens(&self) -> usize {
        self.max_tokens
    }

    fn cache_key(&self) -> String {
        format!("{}:tok={}", self.model, self.max_tokens)
    }

    fn embed_batch(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        validate_texts(texts)?;
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    fn count_tokens(&self, text: &str) -> Result<TokenCount> {
        validate_text(text)?;
        Ok(TokenCount::clamp(
            approximate_token_count(text),
            self.max_tokens,
        ))
    }
}

/// Creates the provider selected by the `[embeddings]` configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider() {
        EmbeddingProviderType::Builtin => {
            let provider_config = EmbeddingProviderConfig::from_config(config)?;
            Ok(Box::new(FastEmbedder::new(provider_config)?))
        }
        EmbeddingProviderType::Command => {
            let provider = CommandProvider::new(
                config.command().to_string(),
                config.model().to_string(),
                config.dimension(),
            )
            .with_max_tokens(config.max_tokens());
            Ok(Box::new(provider))
        }
        EmbeddingProviderType::Hashing => Ok(Box::new(
            HashingProvider::new(config.dimension()).with_max_tokens(config.max_tokens()),
        )),
    }
}

/// Runs `command` through `sh -c`, writing `payload` as JSON to its stdin.
///
/// Returns stdout on success; a non-zero exit becomes an error carrying stderr.
pub(crate) fn run_json_command(command: &str, payload: &serde_json::Value) -> anyhow::Result<String> {
    use anyhow::{bail, Context};

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn command: {}", command))?;

    if let Some(mut stdin) = child.stdin.take() {
        let payload_str = payload.to_string();
        stdin
            .write_all(payload_str.as_bytes())
            .context("Failed to write payload to stdin")?;
    }

    let output = child
        .wait_with_output()
        .context("Failed to read command output")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "Command failed (status {}): {}",
            output.status,
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn validate_text(text: &str) -> Result<()> {
    if text.contains('\0') {
        return Err(FaqError::Encoding(
            "input text contains a NUL byte".to_string(),
        ));
    }
    Ok(())
}

fn validate_texts(texts: &[String]) -> Result<()> {
    texts.iter().try_for_each(|text| validate_text(text))
}

/// Splits text into lowercase alphanumeric runs.
fn word_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Word-level estimate plus the two special tokens BERT-style models add.
fn approximate_token_count(text: &str) -> usize {
    word_tokens(text).len() + 2
}

fn truncate_texts<'a>(texts: &'a [String], max_chars: usize) -> Vec<Cow<'a, str>> {
    texts
        .iter()
        .map(|text| truncate_to_chars(text.as_str(), max_chars))
        .collect()
}

fn truncate_to_chars<'a>(input: &'a str, max_chars: usize) -> Cow<'a, str> {
    if max_chars == 0 {
        return Cow::Borrowed("");
    }

    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(input[..idx].to_string()),
        None => Cow::Borrowed(input),
    }
}

pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

fn model_from_name(raw: &str) -> Result<EmbeddingModel> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(EmbeddingModel::AllMiniLML6V2);
    }

    match value.to_lowercase().as_str() {
        "minilm"
        | "all-minilm-l6-v2"
        | "allminilm-l6-v2"
        | "sentence-transformers/all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "multilingual"
        | "paraphrase-multilingual-minilm-l12-v2"
        | "sentence-transformers/paraphrase-multilingual-minilm-l12-v2" => {
            Ok(EmbeddingModel::ParaphraseMLMiniLML12V2)
        }
        other => Err(FaqError::InvalidArgument(format!(
            "unsupported embedding model '{}'; supported values: minilm, multilingual",
            other
        ))),
    }
}

fn parse_model_env() -> Result<EmbeddingModel> {
    let raw = env::var("FASTEMBED_MODEL").unwrap_or_else(|_| DEFAULT_FASTEMBED_MODEL.to_string());
    model_from_name(&raw)
}

fn parse_usize_env(name: &str, default: usize) -> Result<usize> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim();
            if value.is_empty() {
                Ok(default)
            } else {
                value.parse::<usize>().map_err(|_| {
                    FaqError::InvalidArgument(format!("invalid {} value: {}", name, value))
                })
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(FaqError::InvalidArgument(format!(
            "failed to read {}: {}",
            name, err
        ))),
    }
}

fn parse_bool_env(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim().to_lowercase();
            if value.is_empty() {
                return Ok(default);
            }
            match value.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(FaqError::InvalidArgument(format!(
                    "invalid {} value: {}",
                    name, other
                ))),
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(FaqError::InvalidArgument(format!(
            "failed to read {}: {}",
            name, err
        ))),
    }
}
