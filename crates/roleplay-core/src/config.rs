use crate::voice::VoiceMode;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_GREETING: &str = "Hello! I'm listening.";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub token: Option<String>,
    pub username: Option<String>,
    pub voice_mode: VoiceMode,
    /// Command that listens continuously and prints one recognized line per utterance.
    pub recognizer_command: Option<String>,
    /// Local text-to-speech command; the text is passed as the last argument.
    pub synthesizer_command: Option<String>,
    /// Command that plays audio read from stdin (used with remote synthesis).
    pub audio_player_command: Option<String>,
    pub request_timeout_secs: u64,
    pub greeting: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            username: None,
            voice_mode: VoiceMode::Off,
            recognizer_command: None,
            synthesizer_command: None,
            audio_player_command: None,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            greeting: DEFAULT_GREETING.to_string(),
        }
    }

    /// Loads the config file (defaults if absent), then applies environment overrides.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Rewrites one setting in the file at `path`, leaving the rest as stored.
    ///
    /// Starts from the file rather than an in-memory config so environment
    /// overrides are never written back.
    pub fn update(path: &Path, edit: impl FnOnce(&mut Config)) -> Result<()> {
        let mut config = Self::load_from(path).unwrap_or_else(|_| Self::new());
        edit(&mut config);
        config.save_to(path)
    }

    /// Persists the credential obtained at login.
    pub fn save_token(username: &str, token: &str) -> Result<()> {
        Self::update(&Self::config_path()?, |config| {
            config.username = Some(username.to_string());
            config.token = Some(token.to_string());
        })
    }

    pub fn clear_token() -> Result<()> {
        Self::update(&Self::config_path()?, |config| config.token = None)
    }

    pub fn save_voice_mode(mode: VoiceMode) -> Result<()> {
        Self::update(&Self::config_path()?, |config| config.voice_mode = mode)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("ROLEPLAY_API_URL") {
            if !url.trim().is_empty() {
                self.api_url = url;
            }
        }
        if let Ok(token) = std::env::var("ROLEPLAY_TOKEN") {
            if !token.trim().is_empty() {
                self.token = Some(token);
            }
        }
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("roleplay"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}
