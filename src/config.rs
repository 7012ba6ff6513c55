//! Configuration for the evidence analyzer.
//!
//! Configuration sources (highest priority first):
//! 1. `EVIDENCE_LENS_CONFIG` (explicit path to a YAML file)
//! 2. Config file (.evidence-lens/config.yaml), searched from the current
//!    directory up through its parents
//! 3. User config (`<config dir>/evidence-lens/config.yaml`)
//! 4. Defaults
//!
//! The API key is never read from a file: it comes from
//! `EVIDENCE_LENS_API_KEY`, falling back to `GEMINI_API_KEY`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::RemotePhase;
use crate::core::credibility::CredibilityPolicy;
use crate::core::retry::RetryPolicy;
use crate::ingest::validator::FileLimits;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "EVIDENCE_LENS_CONFIG";

/// Environment variables holding the API key, in lookup order
pub const API_KEY_ENVS: [&str; 2] = ["EVIDENCE_LENS_API_KEY", "GEMINI_API_KEY"];

const CONFIG_DIR_NAME: &str = ".evidence-lens";
const USER_CONFIG_DIR_NAME: &str = "evidence-lens";
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Config file schema (matches YAML structure)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub limits: FileLimits,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub credibility: CredibilityPolicy,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            limits: FileLimits::default(),
            remote: RemoteSettings::default(),
            credibility: CredibilityPolicy::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Failed to parse analyzer config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.limits.min_files < 2 {
            anyhow::bail!(
                "limits.min_files must be at least 2 (a single source cannot contradict itself), got {}",
                self.limits.min_files
            );
        }
        if self.limits.max_file_bytes == 0 || self.limits.max_total_bytes == 0 {
            anyhow::bail!("limits.max_file_bytes and limits.max_total_bytes must be positive");
        }
        if self.remote.retry.max_attempts == 0 {
            anyhow::bail!("remote.retry.max_attempts must be at least 1");
        }
        if self.remote.timeout_seconds == 0 {
            anyhow::bail!("remote.timeout_seconds must be positive");
        }
        Ok(())
    }
}

/// Remote capability settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the model endpoints (without the model name)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Fast multimodal model for Phase 1
    #[serde(default = "default_extraction_model")]
    pub extraction_model: String,

    /// Reasoning model for Phase 2
    #[serde(default = "default_reasoning_model")]
    pub reasoning_model: String,

    /// Low temperature for factual extraction
    #[serde(default = "default_extraction_temperature")]
    pub extraction_temperature: f32,

    #[serde(default = "default_reasoning_temperature")]
    pub reasoning_temperature: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Per-request timeout (default: 120s)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Applied to transport failures only
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models".to_string()
}
fn default_extraction_model() -> String {
    "gemini-3-flash-preview".to_string()
}
fn default_reasoning_model() -> String {
    "gemini-3-pro-preview".to_string()
}
fn default_extraction_temperature() -> f32 {
    0.1
}
fn default_reasoning_temperature() -> f32 {
    0.2
}
fn default_max_output_tokens() -> u32 {
    8192
}
fn default_timeout_seconds() -> u64 {
    120
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            extraction_model: default_extraction_model(),
            reasoning_model: default_reasoning_model(),
            extraction_temperature: default_extraction_temperature(),
            reasoning_temperature: default_reasoning_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_seconds: default_timeout_seconds(),
            retry: RetryPolicy::default(),
        }
    }
}

impl RemoteSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn model_for(&self, phase: RemotePhase) -> &str {
        match phase {
            RemotePhase::Extraction => &self.extraction_model,
            RemotePhase::Reasoning => &self.reasoning_model,
        }
    }

    pub fn temperature_for(&self, phase: RemotePhase) -> f32 {
        match phase {
            RemotePhase::Extraction => self.extraction_temperature,
            RemotePhase::Reasoning => self.reasoning_temperature,
        }
    }

    /// `generateContent` endpoint for a phase
    pub fn endpoint_for(&self, phase: RemotePhase) -> String {
        format!(
            "{}/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model_for(phase)
        )
    }
}

/// Loaded configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub settings: AnalyzerConfig,

    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Search `start` and its parents for .evidence-lens/config.yaml
fn find_project_config(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Find the config file to use, if any
fn find_config_file() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
        if !explicit.trim().is_empty() {
            return Some(PathBuf::from(explicit));
        }
    }

    if let Some(found) = std::env::current_dir()
        .ok()
        .and_then(|cwd| find_project_config(&cwd))
    {
        return Some(found);
    }

    dirs::config_dir()
        .map(|dir| dir.join(USER_CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .filter(|path| path.exists())
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<AnalyzerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    AnalyzerConfig::from_yaml(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let config_file = find_config_file();

    let settings = match &config_file {
        Some(path) => load_config_file(path)?,
        None => AnalyzerConfig::default(),
    };

    Ok(ResolvedConfig {
        settings,
        config_file,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// API key for the remote capability, from the environment
pub fn api_key() -> Option<String> {
    API_KEY_ENVS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
}
