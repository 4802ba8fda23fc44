use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cli::Cli;
use crate::error::{Error, Result};
use crate::extract::ExtractOptions;
use crate::generate::ModelParams;
use crate::llm::{DEFAULT_API_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use crate::state::StateManager;

const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub model: Option<String>,
    pub api_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub api_key_env: Option<String>,
    pub cookie_env: Option<String>,
    pub wait_timeout_ms: Option<u64>,
    pub settle_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub prompt_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub state_dir: PathBuf,
    pub model: String,
    pub api_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub api_key_env: String,
    pub cookie_env: String,
    pub wait_timeout_ms: u64,
    pub settle_ms: u64,
    pub poll_interval_ms: u64,
    pub prompt_dir: Option<String>,
}

impl Config {
    /// Load the config file (explicit `--config`, else `<state dir>/config.toml`
    /// when present) and apply CLI overrides.
    pub fn load(cli: &Cli) -> Result<Self> {
        let state_dir = cli
            .state_dir
            .clone()
            .map(PathBuf::from)
            .unwrap_or_else(StateManager::default_dir);

        let file_config = match cli.config {
            Some(ref explicit) => {
                let path = Path::new(explicit);
                if !path.exists() {
                    return Err(Error::ConfigNotFound(path.to_path_buf()));
                }
                parse_config(&std::fs::read_to_string(path)?)?
            }
            None => {
                let path = state_dir.join(CONFIG_FILENAME);
                if path.exists() {
                    parse_config(&std::fs::read_to_string(&path)?)?
                } else {
                    ConfigFile::default()
                }
            }
        };

        let config = merge(file_config, cli, state_dir);
        validate_merged(&config)?;
        Ok(config)
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            wait_timeout: Duration::from_millis(self.wait_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            settle_delay: Duration::from_millis(self.settle_ms),
        }
    }

    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

pub fn parse_config(content: &str) -> Result<ConfigFile> {
    let config: ConfigFile = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &ConfigFile) -> Result<()> {
    if let Some(ref url) = config.api_url
        && !(url.starts_with("https://") || url.starts_with("http://"))
    {
        return Err(Error::ConfigValidation(format!(
            "api_url must be an http(s) URL: {url}"
        )));
    }
    if let Some(t) = config.temperature
        && !(0.0..=2.0).contains(&t)
    {
        return Err(Error::ConfigValidation(
            "temperature must be between 0 and 2".to_string(),
        ));
    }
    if config.max_tokens == Some(0) {
        return Err(Error::ConfigValidation(
            "max_tokens must be > 0".to_string(),
        ));
    }
    if config.poll_interval_ms == Some(0) {
        return Err(Error::ConfigValidation(
            "poll_interval_ms must be > 0".to_string(),
        ));
    }
    if let Some(ref name) = config.api_key_env
        && name.trim().is_empty()
    {
        return Err(Error::ConfigValidation(
            "api_key_env must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_merged(config: &Config) -> Result<()> {
    validate(&ConfigFile {
        api_url: Some(config.api_url.clone()),
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        poll_interval_ms: Some(config.poll_interval_ms),
        ..Default::default()
    })
}

pub fn merge(file: ConfigFile, cli: &Cli, state_dir: PathBuf) -> Config {
    Config {
        state_dir,
        model: cli
            .model
            .clone()
            .or(file.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        api_url: cli
            .api_url
            .clone()
            .or(file.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        temperature: cli
            .temperature
            .or(file.temperature)
            .unwrap_or(DEFAULT_TEMPERATURE),
        max_tokens: cli
            .max_tokens
            .or(file.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS),
        api_key_env: file
            .api_key_env
            .unwrap_or_else(|| "OPENAI_API_KEY".to_string()),
        cookie_env: file
            .cookie_env
            .unwrap_or_else(|| "GITHUB_COOKIE".to_string()),
        wait_timeout_ms: cli.wait_timeout_ms.or(file.wait_timeout_ms).unwrap_or(2000),
        settle_ms: cli.settle_ms.or(file.settle_ms).unwrap_or(1000),
        poll_interval_ms: file.poll_interval_ms.unwrap_or(200),
        prompt_dir: cli.prompt_dir.clone().or(file.prompt_dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_parse_valid_config() {
        let toml = r#"
model = "gpt-4o"
api_url = "https://llm.internal/v1/chat/completions"
temperature = 0.2
max_tokens = 1200
wait_timeout_ms = 5000
"#;
        let config = parse_config(toml).unwrap();
        assert_eq!(config.model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.max_tokens, Some(1200));
        assert_eq!(config.wait_timeout_ms, Some(5000));
    }

    #[test]
    fn test_parse_empty_config() {
        let config = parse_config("").unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_parse_invalid_api_url() {
        let err = parse_config(r#"api_url = "ftp://x""#).unwrap_err();
        assert!(err.to_string().contains("api_url must be an http(s) URL"));
    }

    #[test]
    fn test_parse_temperature_out_of_range() {
        let err = parse_config("temperature = 3.5").unwrap_err();
        assert!(err.to_string().contains("temperature must be between 0 and 2"));
    }

    #[test]
    fn test_parse_zero_max_tokens() {
        let err = parse_config("max_tokens = 0").unwrap_err();
        assert!(err.to_string().contains("max_tokens must be > 0"));
    }

    #[test]
    fn test_parse_zero_poll_interval() {
        let err = parse_config("poll_interval_ms = 0").unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms must be > 0"));
    }

    #[test]
    fn test_parse_unknown_field() {
        let err = parse_config(r#"bogus = "value""#).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn test_cli_overrides_config() {
        let file = ConfigFile {
            model: Some("gpt-4o".to_string()),
            max_tokens: Some(500),
            settle_ms: Some(3000),
            ..Default::default()
        };
        let cli = Cli::parse_from([
            "pr-autofill",
            "--model",
            "gpt-4.1-mini",
            "--settle-ms",
            "0",
            "settings",
            "show",
        ]);
        let config = merge(file, &cli, PathBuf::from("/tmp/state"));
        assert_eq!(config.model, "gpt-4.1-mini"); // CLI wins
        assert_eq!(config.settle_ms, 0); // CLI wins
        assert_eq!(config.max_tokens, 500); // file value kept
        assert_eq!(config.state_dir, PathBuf::from("/tmp/state"));
    }

    #[test]
    fn test_defaults_applied() {
        let cli = Cli::parse_from(["pr-autofill", "settings", "show"]);
        let config = merge(ConfigFile::default(), &cli, PathBuf::from("/tmp/state"));
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.api_url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(config.temperature, 0.5);
        assert_eq!(config.max_tokens, 900);
        assert_eq!(config.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.wait_timeout_ms, 2000);
        assert_eq!(config.settle_ms, 1000);
        assert_eq!(config.poll_interval_ms, 200);
        assert!(config.prompt_dir.is_none());
    }

    #[test]
    fn test_extract_options_from_config() {
        let cli = Cli::parse_from(["pr-autofill", "--wait-timeout-ms", "50", "settings", "show"]);
        let config = merge(ConfigFile::default(), &cli, PathBuf::from("/tmp/state"));
        let options = config.extract_options();
        assert_eq!(options.wait_timeout, Duration::from_millis(50));
        assert_eq!(options.settle_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_load_missing_explicit_config() {
        let cli = Cli::parse_from([
            "pr-autofill",
            "--config",
            "/nonexistent/pr-autofill.toml",
            "settings",
            "show",
        ]);
        let err = Config::load(&cli).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn test_load_config_from_state_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "max_tokens = 321").unwrap();
        let state_dir = dir.path().to_string_lossy().to_string();
        let cli = Cli::parse_from(["pr-autofill", "--state-dir", &state_dir, "settings", "show"]);
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.max_tokens, 321);
    }

    #[test]
    fn test_load_rejects_bad_cli_temperature() {
        let dir = TempDir::new().unwrap();
        let state_dir = dir.path().to_string_lossy().to_string();
        let cli = Cli::parse_from([
            "pr-autofill",
            "--state-dir",
            &state_dir,
            "--temperature",
            "9",
            "settings",
            "show",
        ]);
        assert!(Config::load(&cli).is_err());
    }
}
