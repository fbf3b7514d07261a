//! Client configuration
//!
//! Settings live in a single JSON file:
//!
//! - Linux: `~/.config/lumeai/config.json`
//! - macOS: `~/Library/Application Support/lumeai/config.json`
//! - Windows: `%APPDATA%/lumeai/config.json`
//!
//! # Example
//!
//! ```no_run
//! use lumeai_lib::state::config::ConfigManager;
//!
//! let mut config = ConfigManager::load().unwrap();
//! config.api.assembly_key = "aai-key".into();
//! config.api.gemini_key = "gemini-key".into();
//! ConfigManager::save_validated(&config).unwrap();
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Directory name under the platform config dir
const APP_DIR: &str = "lumeai";

/// Settings file name
const CONFIG_FILE: &str = "config.json";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Path error
    #[error("Path error: {0}")]
    Path(String),

    /// Required credentials are absent
    #[error("Missing required API keys: {}", .0.join(", "))]
    MissingKeys(Vec<&'static str>),

    /// A field has a value we cannot use
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Full client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend credentials
    pub api: ApiConfig,
    /// Backend location
    pub server: ServerConfig,
    /// Capture and playback settings
    pub audio: AudioConfig,
    /// Assistant persona
    pub persona: Persona,
}

impl ClientConfig {
    /// Check that the keys needed to start a conversation are present
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingKeys`] naming every absent required key.
    pub fn validate(&self) -> ConfigResult<()> {
        self.api.validate()
    }

    /// Whether a conversation can be started with this configuration
    pub fn is_ready(&self) -> bool {
        self.validate().is_ok()
    }

    /// Set a single value by dotted key, e.g. `api.gemini_key`
    ///
    /// Used by the command line `config set` command.
    pub fn set_value(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        let value = value.trim();
        let invalid = |reason: &str| ConfigError::InvalidValue {
            field: key.to_string(),
            reason: reason.to_string(),
        };

        match key {
            "api.murf_key" => self.api.murf_key = value.to_string(),
            "api.assembly_key" => self.api.assembly_key = value.to_string(),
            "api.gemini_key" => self.api.gemini_key = value.to_string(),
            "api.weather_key" => self.api.weather_key = value.to_string(),
            "api.news_key" => self.api.news_key = value.to_string(),
            "api.tmdb_key" => self.api.tmdb_key = value.to_string(),
            "server.base_url" => {
                if !(value.starts_with("http://") || value.starts_with("https://")) {
                    return Err(invalid("must start with http:// or https://"));
                }
                self.server.base_url = value.trim_end_matches('/').to_string();
            }
            "audio.input_device_id" => {
                self.audio.input_device_id = (!value.is_empty()).then(|| value.to_string());
            }
            "audio.frame_size" => {
                let size: usize = value.parse().map_err(|_| invalid("expected an integer"))?;
                if size == 0 {
                    return Err(invalid("must be positive"));
                }
                self.audio.frame_size = size;
            }
            "audio.jitter_secs" => {
                let secs: f64 = value.parse().map_err(|_| invalid("expected a number"))?;
                if !(0.0..=2.0).contains(&secs) {
                    return Err(invalid("must be between 0 and 2 seconds"));
                }
                self.audio.jitter_secs = secs;
            }
            "persona" => {
                self.persona = value.parse().map_err(|e: String| invalid(&e))?;
            }
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: key.to_string(),
                    reason: "unknown setting".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Backend credentials, forwarded to the server per connection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Murf (text-to-speech) key
    pub murf_key: String,
    /// AssemblyAI (speech-to-text) key, required
    pub assembly_key: String,
    /// Gemini (LLM) key, required
    pub gemini_key: String,
    /// Weather skill key
    pub weather_key: String,
    /// News skill key
    pub news_key: String,
    /// TMDB skill key
    pub tmdb_key: String,
}

impl ApiConfig {
    /// Check the required keys
    pub fn validate(&self) -> ConfigResult<()> {
        let mut missing = Vec::new();
        if self.assembly_key.trim().is_empty() {
            missing.push("assembly_key");
        }
        if self.gemini_key.trim().is_empty() {
            missing.push("gemini_key");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingKeys(missing))
        }
    }

    /// Keys as query parameters, in the order the backend documents them
    pub fn query_pairs(&self) -> [(&'static str, &str); 6] {
        [
            ("assembly_key", self.assembly_key.as_str()),
            ("gemini_key", self.gemini_key.as_str()),
            ("murf_key", self.murf_key.as_str()),
            ("weather_key", self.weather_key.as_str()),
            ("news_key", self.news_key.as_str()),
            ("tmdb_key", self.tmdb_key.as_str()),
        ]
    }

    /// Copy with every key masked down to its last four characters
    pub fn redacted(&self) -> ApiConfig {
        fn mask(key: &str) -> String {
            let chars: Vec<char> = key.chars().collect();
            match chars.len() {
                0 => String::new(),
                n if n <= 4 => "****".to_string(),
                n => format!("****{}", chars[n - 4..].iter().collect::<String>()),
            }
        }

        ApiConfig {
            murf_key: mask(&self.murf_key),
            assembly_key: mask(&self.assembly_key),
            gemini_key: mask(&self.gemini_key),
            weather_key: mask(&self.weather_key),
            news_key: mask(&self.news_key),
            tmdb_key: mask(&self.tmdb_key),
        }
    }
}

/// Backend location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP base URL of the backend
    pub base_url: String,
    /// Timeout for the WebSocket handshake (milliseconds)
    pub connect_timeout_ms: u64,
    /// Timeout for upload requests (seconds)
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            connect_timeout_ms: 10_000,
            request_timeout_secs: 120,
        }
    }
}

impl ServerConfig {
    /// WebSocket base derived from the HTTP base (`http -> ws`, `https -> wss`)
    pub fn websocket_base(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        }
    }
}

/// Capture and playback settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name (None selects the default device)
    pub input_device_id: Option<String>,
    /// Rate sent to the backend
    pub target_sample_rate: u32,
    /// Samples per captured frame
    pub frame_size: usize,
    /// Rate of the PCM the backend streams back
    pub playback_sample_rate: u32,
    /// Jitter buffer applied before the first chunk of a reply
    pub jitter_secs: f64,
    /// Minimum lead between "now" and a chunk start
    pub schedule_lead_secs: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device_id: None,
            target_sample_rate: 16000,
            frame_size: 4096,
            playback_sample_rate: 44100,
            jitter_secs: 0.12,
            schedule_lead_secs: 0.01,
        }
    }
}

/// Assistant persona
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    /// Neutral assistant
    #[default]
    Default,
    /// Madara Uchiha
    Madara,
    /// Pirate
    Pirate,
    /// Cowboy
    Cowboy,
    /// Robot
    Robot,
    /// Professor
    Professor,
}

impl Persona {
    /// All personas in menu order
    pub const ALL: [Persona; 6] = [
        Persona::Default,
        Persona::Madara,
        Persona::Pirate,
        Persona::Cowboy,
        Persona::Robot,
        Persona::Professor,
    ];

    /// Wire identifier
    pub fn id(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Madara => "madara",
            Self::Pirate => "pirate",
            Self::Cowboy => "cowboy",
            Self::Robot => "robot",
            Self::Professor => "professor",
        }
    }

    /// Menu label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Default => "Default Assistant",
            Self::Madara => "Madara Uchiha",
            Self::Pirate => "Pirate",
            Self::Cowboy => "Cowboy",
            Self::Robot => "Robot",
            Self::Professor => "Professor",
        }
    }

    /// Styling tag for assistant messages; the default persona has none
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            Self::Default => None,
            other => Some(other.id()),
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Persona {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.id() == wanted)
            .ok_or_else(|| format!("unknown persona '{}'", s.trim()))
    }
}

/// Loads and saves the settings file
pub struct ConfigManager;

impl ConfigManager {
    /// Load from the default location, falling back to defaults
    pub fn load() -> ConfigResult<ClientConfig> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from an explicit path, falling back to defaults if absent
    pub fn load_from(path: &Path) -> ConfigResult<ClientConfig> {
        tracing::debug!(path = %path.display(), "Loading config");

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: ClientConfig = serde_json::from_str(&content)?;
            tracing::info!(path = %path.display(), "Config loaded successfully");
            Ok(config)
        } else {
            tracing::info!("Config file not found, using defaults");
            Ok(ClientConfig::default())
        }
    }

    /// Save to the default location
    pub fn save(config: &ClientConfig) -> ConfigResult<()> {
        Self::save_to(&Self::config_path()?, config)
    }

    /// Validate, then save to the default location
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingKeys`] without writing anything when the
    /// required keys are absent.
    pub fn save_validated(config: &ClientConfig) -> ConfigResult<()> {
        Self::save_validated_to(&Self::config_path()?, config)
    }

    /// Validate, then save to an explicit path
    pub fn save_validated_to(path: &Path, config: &ClientConfig) -> ConfigResult<()> {
        config.validate()?;
        Self::save_to(path, config)
    }

    /// Save to an explicit path
    pub fn save_to(path: &Path, config: &ClientConfig) -> ConfigResult<()> {
        tracing::debug!(path = %path.display(), "Saving config");

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(path, content)?;

        tracing::info!(path = %path.display(), "Config saved successfully");
        Ok(())
    }

    /// Path of the settings file
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::Path("no platform config directory".to_string()))?;
        Ok(dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Reset the settings file to defaults
    pub fn reset() -> ConfigResult<ClientConfig> {
        Self::reset_at(&Self::config_path()?)
    }

    /// Reset the settings file at `path` to defaults
    pub fn reset_at(path: &Path) -> ConfigResult<ClientConfig> {
        let config = ClientConfig::default();
        Self::save_to(path, &config)?;
        tracing::info!(path = %path.display(), "Config reset to defaults");
        Ok(config)
    }
}

/// Live configuration with lock-free reads
pub struct GlobalConfig {
    config: ArcSwap<ClientConfig>,
}

impl GlobalConfig {
    /// Wrap a configuration
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: ArcSwap::new(Arc::new(config)),
        }
    }

    /// Current configuration
    pub fn get(&self) -> Arc<ClientConfig> {
        self.config.load_full()
    }

    /// Replace the configuration
    pub fn update(&self, config: ClientConfig) {
        self.config.store(Arc::new(config));
    }

    /// Switch persona
    pub fn set_persona(&self, persona: Persona) {
        let mut config = (*self.config.load_full()).clone();
        config.persona = persona;
        self.config.store(Arc::new(config));
    }

    /// Current persona
    pub fn persona(&self) -> Persona {
        self.config.load().persona
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_config() -> ClientConfig {
        let mut config = ClientConfig::default();
        config.api.assembly_key = "aai".into();
        config.api.gemini_key = "gem".into();
        config
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();

        assert_eq!(config.server.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.audio.target_sample_rate, 16000);
        assert_eq!(config.audio.frame_size, 4096);
        assert_eq!(config.audio.playback_sample_rate, 44100);
        assert_eq!(config.audio.jitter_secs, 0.12);
        assert_eq!(config.persona, Persona::Default);
    }

    #[test]
    fn test_missing_keys() {
        let err = ClientConfig::default().validate().unwrap_err();
        match err {
            ConfigError::MissingKeys(keys) => assert_eq!(keys, vec!["assembly_key", "gemini_key"]),
            other => panic!("unexpected error: {other}"),
        }

        let mut config = ClientConfig::default();
        config.api.gemini_key = "gem".into();
        assert!(matches!(config.validate(), Err(ConfigError::MissingKeys(k)) if k == vec!["assembly_key"]));

        assert!(ready_config().is_ready());
    }

    #[test]
    fn test_whitespace_key_is_missing() {
        let mut config = ready_config();
        config.api.gemini_key = "   ".into();
        assert!(!config.is_ready());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "api": { "gemini_key": "g" }, "persona": "pirate" }"#;
        let config: ClientConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.api.gemini_key, "g");
        assert_eq!(config.persona, Persona::Pirate);
        assert_eq!(config.audio.frame_size, 4096);
    }

    #[test]
    fn test_redacted_keys() {
        let api = ApiConfig {
            assembly_key: "abcdef123456".into(),
            gemini_key: "abc".into(),
            ..Default::default()
        };
        let redacted = api.redacted();
        assert_eq!(redacted.assembly_key, "****3456");
        assert_eq!(redacted.gemini_key, "****");
        assert_eq!(redacted.murf_key, "");
    }

    #[test]
    fn test_websocket_base() {
        let mut server = ServerConfig::default();
        assert_eq!(server.websocket_base(), "ws://127.0.0.1:8000");

        server.base_url = "https://lume.example.com/".into();
        assert_eq!(server.websocket_base(), "wss://lume.example.com");
    }

    #[test]
    fn test_set_value() {
        let mut config = ClientConfig::default();

        config.set_value("api.gemini_key", " g-key ").unwrap();
        config.set_value("persona", "Robot").unwrap();
        config.set_value("server.base_url", "https://x.example/").unwrap();
        config.set_value("audio.input_device_id", "").unwrap();

        assert_eq!(config.api.gemini_key, "g-key");
        assert_eq!(config.persona, Persona::Robot);
        assert_eq!(config.server.base_url, "https://x.example");
        assert!(config.audio.input_device_id.is_none());

        assert!(config.set_value("server.base_url", "ftp://x").is_err());
        assert!(config.set_value("audio.frame_size", "0").is_err());
        assert!(config.set_value("persona", "ninja").is_err());
        assert!(config.set_value("nope", "1").is_err());
    }

    #[test]
    fn test_persona_round_trip() {
        for persona in Persona::ALL {
            assert_eq!(persona.id().parse::<Persona>().unwrap(), persona);
        }
        assert_eq!(Persona::Default.tag(), None);
        assert_eq!(Persona::Cowboy.tag(), Some("cowboy"));
        assert_eq!(Persona::Madara.label(), "Madara Uchiha");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = ready_config();
        ConfigManager::save_to(&path, &config).unwrap();
        let loaded = ConfigManager::load_from(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = ConfigManager::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, ClientConfig::default());
    }

    #[test]
    fn test_global_config() {
        let global = GlobalConfig::default();
        assert_eq!(global.persona(), Persona::Default);

        global.set_persona(Persona::Professor);
        assert_eq!(global.persona(), Persona::Professor);

        global.update(ready_config());
        assert!(global.get().is_ready());
    }
}
