//! Application configuration for bitfunnel.
//!
//! User config lives at `~/.bitfunnel/bitfunnel.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FunnelError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "bitfunnel.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".bitfunnel";

// ---------------------------------------------------------------------------
// Config structs (matching bitfunnel.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Funnel tunables.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Judgment service settings.
    #[serde(default)]
    pub judgment: JudgmentConfig,

    /// YouTube provider settings.
    #[serde(default)]
    pub youtube: YouTubeConfig,

    /// Result output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// How pre-screening judges a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningMode {
    /// Content excerpt plus sampled items. Passes on `score >= threshold`
    /// and a `continue` recommendation.
    #[default]
    ContentAware,
    /// Items only; the content is never fetched for screening.
    ItemsOnly,
}

impl ScreeningMode {
    /// Default pass threshold for this mode.
    pub fn default_threshold(&self) -> f64 {
        match self {
            Self::ContentAware => 5.0,
            Self::ItemsOnly => 6.0,
        }
    }
}

impl std::str::FromStr for ScreeningMode {
    type Err = FunnelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "content_aware" | "content-aware" => Ok(Self::ContentAware),
            "items_only" | "items-only" => Ok(Self::ItemsOnly),
            other => Err(FunnelError::config(format!(
                "unknown screening mode '{other}': expected 'content-aware' or 'items-only'"
            ))),
        }
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Candidates requested from discovery per search term.
    #[serde(default = "default_max_candidates")]
    pub max_candidates_per_term: usize,

    /// Raw items fetched per surviving candidate.
    #[serde(default = "default_max_items")]
    pub max_items_per_candidate: usize,

    /// Items sampled for pre-screening.
    #[serde(default = "default_screening_sample")]
    pub screening_sample_size: usize,

    /// Seconds of content included in the screening excerpt.
    #[serde(default = "default_screening_secs")]
    pub screening_content_secs: u32,

    /// Screening pass threshold. Unset means the mode's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screening_threshold: Option<f64>,

    #[serde(default)]
    pub screening_mode: ScreeningMode,

    /// Target size of the reduced item set.
    #[serde(default = "default_reduction_target")]
    pub reduction_target: usize,

    /// Quality threshold passed to the judgment as context.
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,

    /// Maximum generation attempts per candidate.
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,

    /// Character cap applied to full content before generation.
    #[serde(default = "default_content_budget")]
    pub content_char_budget: usize,

    /// Candidates analysed at once after screening.
    #[serde(default = "default_concurrency")]
    pub analysis_concurrency: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_candidates_per_term: default_max_candidates(),
            max_items_per_candidate: default_max_items(),
            screening_sample_size: default_screening_sample(),
            screening_content_secs: default_screening_secs(),
            screening_threshold: None,
            screening_mode: ScreeningMode::default(),
            reduction_target: default_reduction_target(),
            quality_threshold: default_quality_threshold(),
            max_retry: default_max_retry(),
            content_char_budget: default_content_budget(),
            analysis_concurrency: default_concurrency(),
        }
    }
}

fn default_max_candidates() -> usize {
    3
}
fn default_max_items() -> usize {
    200
}
fn default_screening_sample() -> usize {
    20
}
fn default_screening_secs() -> u32 {
    180
}
fn default_reduction_target() -> usize {
    50
}
fn default_quality_threshold() -> f64 {
    7.0
}
fn default_max_retry() -> u32 {
    2
}
fn default_content_budget() -> usize {
    15_000
}
fn default_concurrency() -> usize {
    1
}

/// Sampling settings for one kind of judgment call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSettings {
    /// Model override; falls back to `judgment.default_model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl StageSettings {
    fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            model: None,
            temperature,
            max_tokens,
        }
    }
}

/// `[judgment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgmentConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_judgment_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used when a stage sets no override.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Answer repeated identical requests from memory within a run.
    #[serde(default = "default_true")]
    pub cache: bool,

    #[serde(default = "default_screening_settings")]
    pub screening: StageSettings,

    #[serde(default = "default_reduction_settings")]
    pub reduction: StageSettings,

    /// Generation favours creativity, hence the higher temperature.
    #[serde(default = "default_generation_settings")]
    pub generation: StageSettings,

    #[serde(default = "default_quality_settings")]
    pub quality: StageSettings,

    #[serde(default = "default_planning_settings")]
    pub planning: StageSettings,
}

impl Default for JudgmentConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_judgment_key_env(),
            base_url: default_base_url(),
            default_model: default_model(),
            timeout_secs: default_timeout(),
            cache: true,
            screening: default_screening_settings(),
            reduction: default_reduction_settings(),
            generation: default_generation_settings(),
            quality: default_quality_settings(),
            planning: default_planning_settings(),
        }
    }
}

fn default_judgment_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_timeout() -> u64 {
    120
}
fn default_true() -> bool {
    true
}
fn default_screening_settings() -> StageSettings {
    StageSettings::new(0.3, 500)
}
fn default_reduction_settings() -> StageSettings {
    StageSettings::new(0.5, 2000)
}
fn default_generation_settings() -> StageSettings {
    StageSettings::new(0.8, 4000)
}
fn default_quality_settings() -> StageSettings {
    StageSettings::new(0.3, 1500)
}
fn default_planning_settings() -> StageSettings {
    StageSettings::new(0.7, 500)
}

/// `[youtube]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeConfig {
    #[serde(default = "default_youtube_key_env")]
    pub api_key_env: String,

    /// YouTube Data API v3 base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Timed-text caption endpoint.
    #[serde(default = "default_timedtext_base")]
    pub timedtext_base: String,

    /// `videoLicense` search filter.
    #[serde(default = "default_license")]
    pub license: String,

    #[serde(default = "default_relevance_language")]
    pub relevance_language: String,

    /// Caption languages tried in order.
    #[serde(default = "default_caption_languages")]
    pub caption_languages: Vec<String>,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_youtube_key_env(),
            api_base: default_api_base(),
            timedtext_base: default_timedtext_base(),
            license: default_license(),
            relevance_language: default_relevance_language(),
            caption_languages: default_caption_languages(),
        }
    }
}

fn default_youtube_key_env() -> String {
    "YOUTUBE_API_KEY".into()
}
fn default_api_base() -> String {
    "https://www.googleapis.com/youtube/v3".into()
}
fn default_timedtext_base() -> String {
    "https://www.youtube.com/api/timedtext".into()
}
fn default_license() -> String {
    "creativeCommon".into()
}
fn default_relevance_language() -> String {
    "ja".into()
}
fn default_caption_languages() -> Vec<String> {
    vec!["ja".into(), "en".into()]
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory result files are written to.
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "outputs".into()
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime funnel configuration handed to the orchestrator at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub max_candidates_per_term: usize,
    pub max_items_per_candidate: usize,
    pub screening_sample_size: usize,
    pub screening_content_secs: u32,
    pub screening_mode: ScreeningMode,
    pub screening_threshold: f64,
    pub reduction_target: usize,
    pub quality_threshold: f64,
    pub max_retry: u32,
    pub content_char_budget: usize,
    pub analysis_concurrency: usize,
    pub screening: StageSettings,
    pub reduction: StageSettings,
    pub generation: StageSettings,
    pub quality: StageSettings,
    pub planning: StageSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let p = &config.pipeline;
        let j = &config.judgment;
        Self {
            max_candidates_per_term: p.max_candidates_per_term,
            max_items_per_candidate: p.max_items_per_candidate,
            screening_sample_size: p.screening_sample_size,
            screening_content_secs: p.screening_content_secs,
            screening_mode: p.screening_mode,
            screening_threshold: p
                .screening_threshold
                .unwrap_or_else(|| p.screening_mode.default_threshold()),
            reduction_target: p.reduction_target,
            quality_threshold: p.quality_threshold,
            max_retry: p.max_retry,
            content_char_budget: p.content_char_budget,
            analysis_concurrency: p.analysis_concurrency,
            screening: j.screening.clone(),
            reduction: j.reduction.clone(),
            generation: j.generation.clone(),
            quality: j.quality.clone(),
            planning: j.planning.clone(),
        }
    }
}

impl PipelineConfig {
    /// Reject values the funnel cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_retry == 0 {
            return Err(FunnelError::config("max_retry must be at least 1"));
        }
        if self.reduction_target == 0 {
            return Err(FunnelError::config("reduction_target must be at least 1"));
        }
        if self.analysis_concurrency == 0 {
            return Err(FunnelError::config(
                "analysis_concurrency must be at least 1",
            ));
        }
        for (name, value) in [
            ("screening_threshold", self.screening_threshold),
            ("quality_threshold", self.quality_threshold),
        ] {
            if !(0.0..=10.0).contains(&value) {
                return Err(FunnelError::config(format!(
                    "{name} must be within 0..=10, got {value}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.bitfunnel/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| FunnelError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.bitfunnel/bitfunnel.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FunnelError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| FunnelError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FunnelError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| FunnelError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FunnelError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a non-empty API key from the named env var.
pub fn read_api_key(var_name: &str, service: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(FunnelError::config(format!(
            "{service} API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that both the judgment and YouTube API key env vars are set.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    read_api_key(&config.judgment.api_key_env, "Judgment service")?;
    read_api_key(&config.youtube.api_key_env, "YouTube")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("reduction_target"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
        assert!(toml_str.contains("YOUTUBE_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.pipeline.max_retry, 2);
        assert_eq!(parsed.judgment.generation.temperature, 0.8);
        assert_eq!(parsed.youtube.caption_languages, vec!["ja", "en"]);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[pipeline]
quality_threshold = 8.5
screening_mode = "items_only"

[judgment.generation]
model = "anthropic/claude-sonnet"
temperature = 0.9
max_tokens = 3000
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.pipeline.quality_threshold, 8.5);
        assert_eq!(config.pipeline.reduction_target, 50);
        assert_eq!(config.pipeline.screening_mode, ScreeningMode::ItemsOnly);
        assert_eq!(
            config.judgment.generation.model.as_deref(),
            Some("anthropic/claude-sonnet")
        );
        assert_eq!(config.judgment.quality.temperature, 0.3);
    }

    #[test]
    fn pipeline_config_from_app_config() {
        let pipeline = PipelineConfig::from(&AppConfig::default());
        assert_eq!(pipeline.max_candidates_per_term, 3);
        assert_eq!(pipeline.max_items_per_candidate, 200);
        assert_eq!(pipeline.screening_sample_size, 20);
        assert_eq!(pipeline.reduction_target, 50);
        assert_eq!(pipeline.quality_threshold, 7.0);
        assert_eq!(pipeline.screening_threshold, 5.0);
        assert!(pipeline.generation.temperature > pipeline.quality.temperature);
    }

    #[test]
    fn screening_threshold_follows_mode_unless_set() {
        let mut app = AppConfig::default();
        app.pipeline.screening_mode = ScreeningMode::ItemsOnly;
        assert_eq!(PipelineConfig::from(&app).screening_threshold, 6.0);

        app.pipeline.screening_threshold = Some(4.5);
        assert_eq!(PipelineConfig::from(&app).screening_threshold, 4.5);
    }

    #[test]
    fn validate_rejects_zero_retry_and_bad_thresholds() {
        let mut config = PipelineConfig::default();
        assert!(config.validate().is_ok());

        config.max_retry = 0;
        assert!(config.validate().is_err());

        config.max_retry = 2;
        config.quality_threshold = 11.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("quality_threshold"));
    }

    #[test]
    fn screening_mode_parses_both_spellings() {
        assert_eq!(
            "items-only".parse::<ScreeningMode>().unwrap(),
            ScreeningMode::ItemsOnly
        );
        assert_eq!(
            "content_aware".parse::<ScreeningMode>().unwrap(),
            ScreeningMode::ContentAware
        );
        assert!("fast".parse::<ScreeningMode>().is_err());
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.judgment.api_key_env = "BF_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_keys(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
