use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API key for Gemini; falls back to the GEMINI_API_KEY env var
    pub gemini_api_key: Option<String>,

    /// Model to use for identification calls
    pub model: String,

    /// Gemini API base URL
    pub base_url: String,

    /// SpeciesLens home directory
    #[serde(skip)]
    pub home: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("~"))
            .join(".specieslens");

        Config {
            gemini_api_key: None,
            model: crate::prompts::GEMINI_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            home,
        }
    }
}

impl Config {
    /// Load configuration from `~/.specieslens/config.toml`, creating the
    /// directory on first run.
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir()
            .context("Could not find home directory")?
            .join(".specieslens");
        let config_path = home.join("config.toml");

        fs::create_dir_all(&home).context("Failed to create .specieslens directory")?;

        let mut config = if config_path.exists() {
            let content =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Config::default()
        };
        config.home = home;

        // Write a template on first run so the key has a place to live
        if !config_path.exists() {
            config.save()?;
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.home.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Get the API key from config or environment
    pub fn api_key(&self) -> Option<String> {
        self.gemini_api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
    }
}
