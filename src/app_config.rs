use anyhow::{anyhow, Context, Result};
use log::{warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use url::Url;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Directory holding the text documents to narrate
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    /// Directory holding one working subdirectory per document
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Directory receiving one merged audio file per document
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Extension of the input documents
    #[serde(default = "default_text_extension")]
    pub text_extension: String,

    /// Extension of fragments and merged audio
    #[serde(default = "default_audio_extension")]
    pub audio_extension: String,

    /// How a document id is derived from its file name
    #[serde(default)]
    pub document_id: DocumentIdStrategy,

    /// Line splitting settings
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Fragment naming settings
    #[serde(default)]
    pub naming: NamingConfig,

    /// Voice service settings
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Audio concatenation settings
    #[serde(default)]
    pub merge: MergeConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Derivation of a document id from the input file name
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum DocumentIdStrategy {
    /// First `length` characters of the file stem
    Prefix {
        #[serde(default = "default_prefix_length")]
        length: usize,
    },
    /// The whole file stem
    Stem,
}

impl Default for DocumentIdStrategy {
    fn default() -> Self {
        Self::Prefix {
            length: default_prefix_length(),
        }
    }
}

impl DocumentIdStrategy {
    // @returns: Document id for the file, or None when the name yields no usable id
    pub fn derive<P: AsRef<Path>>(&self, path: P) -> Option<String> {
        let stem = path.as_ref().file_stem()?.to_string_lossy().to_string();
        let id = match self {
            Self::Prefix { length } => stem.chars().take(*length).collect::<String>(),
            Self::Stem => stem,
        };

        let id = id.trim().to_string();
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
            return None;
        }
        Some(id)
    }
}

/// Line splitting configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Lines longer than this many characters are split into sentences
    #[serde(default = "default_max_line_chars")]
    pub max_line_chars: usize,

    /// Sentence terminator used for the secondary split
    #[serde(default = "default_sentence_terminator")]
    pub sentence_terminator: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_line_chars: default_max_line_chars(),
            sentence_terminator: default_sentence_terminator(),
        }
    }
}

/// Fragment naming configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NamingConfig {
    /// Digits used for each of the line and sub-segment indices
    #[serde(default = "default_index_width")]
    pub index_width: usize,

    /// Widen the index width per document instead of failing on overflow
    #[serde(default = "default_true")]
    pub widen_to_fit: bool,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            index_width: default_index_width(),
            widen_to_fit: true,
        }
    }
}

/// HTTP method used to call the voice service
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestMethod {
    /// Parameters sent as a query string
    Get,
    /// Parameters sent as a JSON body
    #[default]
    Post,
}

/// Voice service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SynthesisConfig {
    /// Host of the voice service
    #[serde(default = "default_host")]
    pub host: String,

    /// Port of the voice service
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the synthesis endpoint
    #[serde(default = "default_path")]
    pub path: String,

    /// HTTP method of the synthesis endpoint
    #[serde(default)]
    pub method: RequestMethod,

    /// Maximum number of requests in flight across all documents
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,

    /// Timeout of a single request in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts for a failed request (0 disables retries)
    #[serde(default)]
    pub retry_count: u32,

    /// Base backoff in milliseconds, doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Parameters forwarded to the voice model
    #[serde(default)]
    pub voice: VoiceParameters,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
            method: RequestMethod::default(),
            concurrent_requests: default_concurrent_requests(),
            timeout_secs: default_timeout_secs(),
            retry_count: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
            voice: VoiceParameters::default(),
        }
    }
}

impl SynthesisConfig {
    /// Full URL of the synthesis endpoint
    pub fn endpoint_url(&self) -> Result<Url> {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        let raw = format!("http://{}:{}{}", self.host, self.port, path);
        Url::parse(&raw).map_err(|e| anyhow!("Invalid voice service endpoint '{}': {}", raw, e))
    }
}

/// Options understood by the voice model, passed through untouched
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VoiceParameters {
    /// Text encoding
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Model selection
    #[serde(default)]
    pub model_id: u32,

    /// Speaker selection
    #[serde(default)]
    pub speaker_id: u32,

    /// Speaker name, takes precedence over speaker_id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_name: Option<String>,

    /// Mix ratio of the stochastic and deterministic duration predictors
    #[serde(default = "default_sdp_ratio")]
    pub sdp_ratio: f32,

    /// Sample noise ratio
    #[serde(default = "default_noise")]
    pub noise: f32,

    /// Duration noise ratio
    #[serde(default = "default_noisew")]
    pub noisew: f32,

    /// Speech length, 1.0 is the normal rate
    #[serde(default = "default_length")]
    pub length: f32,

    /// Language tag of the text
    #[serde(default = "default_language")]
    pub language: String,

    /// Let the service split the text on its own
    #[serde(default = "default_true")]
    pub auto_split: bool,

    /// Silence inserted between split parts, in seconds
    #[serde(default = "default_split_interval")]
    pub split_interval: f32,

    /// Text guiding the delivery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assist_text: Option<String>,

    /// Strength of the assist text
    #[serde(default = "default_assist_text_weight")]
    pub assist_text_weight: f32,

    /// Voice style
    #[serde(default = "default_style")]
    pub style: String,

    /// Strength of the voice style
    #[serde(default = "default_style_weight")]
    pub style_weight: f32,

    /// Audio file defining the style instead of `style`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_audio_path: Option<String>,
}

impl Default for VoiceParameters {
    fn default() -> Self {
        Self {
            encoding: default_encoding(),
            model_id: 0,
            speaker_id: 0,
            speaker_name: None,
            sdp_ratio: default_sdp_ratio(),
            noise: default_noise(),
            noisew: default_noisew(),
            length: default_length(),
            language: default_language(),
            auto_split: true,
            split_interval: default_split_interval(),
            assist_text: None,
            assist_text_weight: default_assist_text_weight(),
            style: default_style(),
            style_weight: default_style_weight(),
            reference_audio_path: None,
        }
    }
}

/// Audio concatenation configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MergeConfig {
    /// ffmpeg executable
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Timeout of one concatenation in seconds
    #[serde(default = "default_merge_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            timeout_secs: default_merge_timeout_secs(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
            Self::Trace => LevelFilter::Trace,
        }
    }
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("txt")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("download")
}

fn default_text_extension() -> String {
    "txt".to_string()
}

fn default_audio_extension() -> String {
    "wav".to_string()
}

fn default_prefix_length() -> usize {
    5
}

fn default_max_line_chars() -> usize {
    500
}

fn default_sentence_terminator() -> String {
    "。".to_string()
}

fn default_index_width() -> usize {
    3
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_path() -> String {
    "/voice".to_string()
}

fn default_concurrent_requests() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_sdp_ratio() -> f32 {
    0.2
}

fn default_noise() -> f32 {
    0.6
}

fn default_noisew() -> f32 {
    0.8
}

fn default_length() -> f32 {
    0.9
}

fn default_language() -> String {
    "JP".to_string()
}

fn default_split_interval() -> f32 {
    1.0
}

fn default_assist_text_weight() -> f32 {
    1.0
}

fn default_style() -> String {
    "Neutral".to_string()
}

fn default_style_weight() -> f32 {
    5.0
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_merge_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load the configuration file, creating it with defaults when missing
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config file: {:?}", path))?;
            let reader = BufReader::new(file);
            let config: Config = serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            return Ok(config);
        }

        warn!("Config file not found at {:?}, creating default config.", path);
        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write default config to file: {:?}", path))?;

        Ok(config)
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.synthesis.concurrent_requests == 0 {
            return Err(anyhow!("synthesis.concurrent_requests must be at least 1"));
        }
        if self.synthesis.timeout_secs == 0 {
            return Err(anyhow!("synthesis.timeout_secs must be at least 1"));
        }
        if self.naming.index_width == 0 {
            return Err(anyhow!("naming.index_width must be at least 1"));
        }
        if self.chunking.sentence_terminator.is_empty() {
            return Err(anyhow!("chunking.sentence_terminator must not be empty"));
        }
        if let DocumentIdStrategy::Prefix { length: 0 } = self.document_id {
            return Err(anyhow!("document_id.length must be at least 1"));
        }
        if self.audio_extension.trim().is_empty() || self.text_extension.trim().is_empty() {
            return Err(anyhow!("text_extension and audio_extension must not be empty"));
        }
        if self.staging_dir == self.output_dir {
            return Err(anyhow!("staging_dir and output_dir must differ"));
        }

        self.synthesis.endpoint_url()?;

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            input_dir: default_input_dir(),
            staging_dir: default_staging_dir(),
            output_dir: default_output_dir(),
            text_extension: default_text_extension(),
            audio_extension: default_audio_extension(),
            document_id: DocumentIdStrategy::default(),
            chunking: ChunkingConfig::default(),
            naming: NamingConfig::default(),
            synthesis: SynthesisConfig::default(),
            merge: MergeConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
