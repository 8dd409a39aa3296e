//! Configuration management for Chatkeep
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ChatkeepError, Result};
use crate::export::ExportOptions;

/// Main configuration structure for Chatkeep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where conversations and templates live
    #[serde(default)]
    pub storage: StorageConfig,
    /// Known models and their parameters
    #[serde(default)]
    pub models: ModelsConfig,
    /// Export defaults
    #[serde(default)]
    pub export: ExportConfig,
    /// Template library behavior
    #[serde(default)]
    pub templates: TemplatesConfig,
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root data directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("com", "chatkeep", "chatkeep")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}

impl StorageConfig {
    /// Directory of conversation records
    pub fn conversations_dir(&self) -> PathBuf {
        self.data_dir.join("conversations")
    }

    /// Directory of template documents
    pub fn templates_dir(&self) -> PathBuf {
        self.data_dir.join("templates")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Sampling and generation parameters for a model
///
/// Every field is optional so configs can be layered: see
/// [`overlay`](Self::overlay).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Whether responses are streamed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Any other backend-specific parameters
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ModelConfig {
    /// Layer `other` on top of `self`, field by field
    ///
    /// A field set in `other` wins; an unset field keeps the value from
    /// `self`. Extra keys are merged the same way.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatkeep::config::ModelConfig;
    ///
    /// let base = ModelConfig { max_tokens: Some(500), temperature: Some(0.7), ..Default::default() };
    /// let over = ModelConfig { temperature: Some(0.2), ..Default::default() };
    /// let merged = base.overlay(&over);
    /// assert_eq!(merged.max_tokens, Some(500));
    /// assert_eq!(merged.temperature, Some(0.2));
    /// ```
    pub fn overlay(&self, other: &ModelConfig) -> ModelConfig {
        let mut extra = self.extra.clone();
        extra.extend(other.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        ModelConfig {
            max_tokens: other.max_tokens.or(self.max_tokens),
            temperature: other.temperature.or(self.temperature),
            top_p: other.top_p.or(self.top_p),
            stream: other.stream.or(self.stream),
            extra,
        }
    }

    /// Whether no field is set
    pub fn is_empty(&self) -> bool {
        self.max_tokens.is_none()
            && self.temperature.is_none()
            && self.top_p.is_none()
            && self.stream.is_none()
            && self.extra.is_empty()
    }

    fn validate(&self, context: &str) -> Result<()> {
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ChatkeepError::Config(format!(
                    "{}.temperature must be between 0.0 and 2.0, got {}",
                    context, t
                ))
                .into());
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(ChatkeepError::Config(format!(
                    "{}.top_p must be between 0.0 and 1.0, got {}",
                    context, p
                ))
                .into());
            }
        }
        if self.max_tokens == Some(0) {
            return Err(ChatkeepError::Config(format!(
                "{}.max_tokens must be greater than 0",
                context
            ))
            .into());
        }
        Ok(())
    }
}

/// Source of per-model default parameters
///
/// Consulted by the template engine when it seeds a conversation.
pub trait ModelConfigProvider {
    /// Effective parameters for `model`
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::Validation` for an empty model name.
    fn get_model_config(&self, model: &str) -> Result<ModelConfig>;
}

/// Model catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Model used when none is given
    #[serde(default = "default_model")]
    pub default: String,
    /// Models offered to users
    #[serde(default = "default_available_models")]
    pub available: Vec<String>,
    /// Parameters shared by every model
    #[serde(default = "default_model_parameters")]
    pub defaults: ModelConfig,
    /// Per-model parameter overrides
    #[serde(default = "default_model_overrides")]
    pub overrides: BTreeMap<String, ModelConfig>,
}

fn default_model() -> String {
    "ai/gemma3".to_string()
}

fn default_available_models() -> Vec<String> {
    vec!["ai/gemma3".to_string(), "ai/qwen3".to_string()]
}

fn default_model_parameters() -> ModelConfig {
    ModelConfig {
        max_tokens: Some(500),
        temperature: Some(0.7),
        top_p: Some(0.9),
        stream: Some(true),
        extra: BTreeMap::new(),
    }
}

fn default_model_overrides() -> BTreeMap<String, ModelConfig> {
    let mut overrides = BTreeMap::new();
    overrides.insert(
        "ai/gemma3".to_string(),
        ModelConfig {
            max_tokens: Some(500),
            ..Default::default()
        },
    );
    overrides.insert(
        "ai/qwen3".to_string(),
        ModelConfig {
            max_tokens: Some(800),
            ..Default::default()
        },
    );
    overrides
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default: default_model(),
            available: default_available_models(),
            defaults: default_model_parameters(),
            overrides: default_model_overrides(),
        }
    }
}

impl ModelConfigProvider for ModelsConfig {
    fn get_model_config(&self, model: &str) -> Result<ModelConfig> {
        let model = model.trim();
        if model.is_empty() {
            return Err(ChatkeepError::Validation("model name cannot be empty".to_string()).into());
        }
        Ok(match self.overrides.get(model) {
            Some(specific) => self.defaults.overlay(specific),
            None => {
                tracing::debug!("No parameter overrides for model {}, using defaults", model);
                self.defaults.clone()
            }
        })
    }
}

/// Export defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Format used when none is given
    #[serde(default = "default_export_format")]
    pub default_format: String,
    /// Directory exports are written to
    #[serde(default = "default_export_dir")]
    pub output_dir: PathBuf,
    /// Rendering options
    #[serde(default)]
    pub options: ExportOptions,
}

fn default_export_format() -> String {
    "markdown".to_string()
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("exports")
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_format: default_export_format(),
            output_dir: default_export_dir(),
            options: ExportOptions::default(),
        }
    }
}

/// Template library behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Write the built-in templates on first use
    #[serde(default = "default_install_builtin")]
    pub install_builtin: bool,
}

fn default_install_builtin() -> bool {
    true
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            install_builtin: default_install_builtin(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// Parse a YAML configuration file without applying overrides
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChatkeepError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ChatkeepError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(data_dir) = std::env::var("CHATKEEP_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(model) = std::env::var("CHATKEEP_DEFAULT_MODEL") {
            self.models.default = model;
        }

        if let Ok(dir) = std::env::var("CHATKEEP_EXPORT_DIR") {
            self.export.output_dir = PathBuf::from(dir);
        }

        if let Ok(format) = std::env::var("CHATKEEP_EXPORT_FORMAT") {
            self.export.default_format = format;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(data_dir) = &cli.data_dir {
            self.storage.data_dir = data_dir.clone();
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::Config` naming the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(ChatkeepError::Config("storage.data_dir cannot be empty".to_string()).into());
        }

        if self.models.default.trim().is_empty() {
            return Err(ChatkeepError::Config("models.default cannot be empty".to_string()).into());
        }

        self.models.defaults.validate("models.defaults")?;
        for (model, config) in &self.models.overrides {
            config.validate(&format!("models.overrides.{}", model))?;
        }

        if self.export.default_format.trim().is_empty() {
            return Err(
                ChatkeepError::Config("export.default_format cannot be empty".to_string()).into(),
            );
        }
        self.export
            .options
            .validate()
            .map_err(|e| ChatkeepError::Config(format!("export.options: {}", e)))?;

        Ok(())
    }
}

impl ModelConfigProvider for Config {
    fn get_model_config(&self, model: &str) -> Result<ModelConfig> {
        self.models.get_model_config(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    fn test_cli(args: &[&str]) -> crate::cli::Cli {
        let mut argv = vec!["chatkeep"];
        argv.extend_from_slice(args);
        argv.push("formats");
        crate::cli::Cli::try_parse_from(argv).expect("cli should parse")
    }

    fn clear_env() {
        for var in [
            "CHATKEEP_DATA_DIR",
            "CHATKEEP_DEFAULT_MODEL",
            "CHATKEEP_EXPORT_DIR",
            "CHATKEEP_EXPORT_FORMAT",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.models.default, "ai/gemma3");
        assert_eq!(config.export.default_format, "markdown");
        assert!(config.templates.install_builtin);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_get_model_config_merges_defaults_and_override() {
        let config = Config::default();

        let qwen = config.get_model_config("ai/qwen3").unwrap();
        assert_eq!(qwen.max_tokens, Some(800));
        assert_eq!(qwen.temperature, Some(0.7));
        assert_eq!(qwen.top_p, Some(0.9));
        assert_eq!(qwen.stream, Some(true));

        let unknown = config.get_model_config("ai/other").unwrap();
        assert_eq!(unknown, config.models.defaults);
    }

    #[test]
    fn test_get_model_config_rejects_blank_name() {
        let config = Config::default();
        for name in ["", "   "] {
            let err = config.get_model_config(name).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<ChatkeepError>(),
                Some(ChatkeepError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_overlay_merges_extra_keys() {
        let mut base = ModelConfig::default();
        base.extra.insert("seed".to_string(), Value::from(1));
        base.extra.insert("stop".to_string(), Value::from("###"));
        let mut over = ModelConfig::default();
        over.extra.insert("seed".to_string(), Value::from(42));

        let merged = base.overlay(&over);
        assert_eq!(merged.extra["seed"], Value::from(42));
        assert_eq!(merged.extra["stop"], Value::from("###"));
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
storage:
  data_dir: /tmp/chatkeep-test
models:
  default: ai/qwen3
  defaults:
    max_tokens: 256
    temperature: 0.5
  overrides:
    ai/qwen3:
      max_tokens: 1024
      seed: 7
export:
  default_format: html
  output_dir: out
  options:
    include_toc: true
templates:
  install_builtin: false
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/chatkeep-test"));
        assert_eq!(
            config.storage.conversations_dir(),
            PathBuf::from("/tmp/chatkeep-test/conversations")
        );
        assert_eq!(config.export.default_format, "html");
        assert!(config.export.options.include_toc);
        assert!(!config.templates.install_builtin);

        let qwen = config.get_model_config("ai/qwen3").unwrap();
        assert_eq!(qwen.max_tokens, Some(1024));
        assert_eq!(qwen.temperature, Some(0.5));
        assert_eq!(qwen.extra["seed"], Value::from(7));
    }

    #[test]
    fn test_config_validation_rejects_bad_temperature() {
        let mut config = Config::default();
        config.models.defaults.temperature = Some(3.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_bad_override() {
        let mut config = Config::default();
        config.models.overrides.insert(
            "ai/broken".to_string(),
            ModelConfig {
                max_tokens: Some(0),
                ..Default::default()
            },
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("models.overrides.ai/broken"));
    }

    #[test]
    fn test_config_validation_empty_default_model() {
        let mut config = Config::default();
        config.models.default = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        clear_env();
        let cli = test_cli(&[]);
        let config = Config::load("nonexistent.yaml", &cli).unwrap();
        assert_eq!(config.models.default, "ai/gemma3");
    }

    #[test]
    #[serial]
    fn test_env_vars_override_file_values() {
        clear_env();
        std::env::set_var("CHATKEEP_DATA_DIR", "/tmp/chatkeep-env");
        std::env::set_var("CHATKEEP_DEFAULT_MODEL", "ai/qwen3");
        std::env::set_var("CHATKEEP_EXPORT_FORMAT", "json");

        let config = Config::load("nonexistent.yaml", &test_cli(&[])).unwrap();
        clear_env();

        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/chatkeep-env"));
        assert_eq!(config.models.default, "ai/qwen3");
        assert_eq!(config.export.default_format, "json");
    }

    #[test]
    #[serial]
    fn test_cli_data_dir_beats_env() {
        clear_env();
        std::env::set_var("CHATKEEP_DATA_DIR", "/tmp/from-env");

        let cli = test_cli(&["--data-dir", "/tmp/from-cli"]);
        let config = Config::load("nonexistent.yaml", &cli).unwrap();
        clear_env();

        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/from-cli"));
    }

    #[test]
    fn test_load_invalid_yaml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "models: [unterminated").unwrap();

        let err = Config::from_file(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatkeepError>(),
            Some(ChatkeepError::Config(_))
        ));
    }
}
