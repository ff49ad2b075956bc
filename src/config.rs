use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

const CONFIG_PATH_VAR: &str = "STORY_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Main configuration structure for the story dispatcher
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub timeouts: TimeoutConfig,
    pub probe: ProbeConfig,
    pub monitor: MonitorConfig,
    pub speech: SpeechConfig,
    pub client: ClientConfig,
}

/// Generation API settings. Sampling values are sent verbatim in every
/// chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Idle timeout between reads of the generation exchange
    pub request_seconds: u64,
    /// Total budget for one generation exchange
    pub resource_seconds: u64,
    pub probe_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// How long a successful probe is trusted before re-probing
    pub freshness_seconds: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub jitter_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub check_address: String,
    pub interval_seconds: u64,
    pub check_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub api_key: String,
    pub base_url: String,
    pub voice_id: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
    pub speaking_rate: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub user_agent: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4".to_string(),
            temperature: 0.7,
            max_tokens: 800,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_seconds: 30,
            resource_seconds: 60,
            probe_seconds: 10,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            freshness_seconds: 60,
            backoff_initial_ms: 1_000,
            backoff_max_ms: 60_000,
            jitter_factor: 0.2,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_address: "1.1.1.1:443".to_string(),
            interval_seconds: 5,
            check_timeout_seconds: 3,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.elevenlabs.io".to_string(),
            voice_id: "XrExE9yKIg1WjnnlVkGX".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            stability: 0.25,
            similarity_boost: 1.0,
            style: 0.85,
            use_speaker_boost: true,
            speaking_rate: 0.90,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("story-dispatch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// Dotenv, then the YAML file named by `STORY_CONFIG_PATH`, then process
    /// env overrides. Never fails: anything unreadable falls back to defaults
    /// and validation problems are only logged.
    pub fn load() -> Self {
        match [".env", "../.env"]
            .into_iter()
            .find(|path| dotenvy::from_path(path).is_ok())
        {
            Some(path) => tracing::info!(path, "Loaded dotenv file"),
            None => tracing::debug!("No dotenv file, using process environment only"),
        }

        let path = env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path), |key| env::var(key).ok())
    }

    /// `load` without the process-global parts
    pub fn load_from<F>(path: &Path, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::from_file(path).unwrap_or_default();
        config.apply_overrides(lookup);

        if let Err(e) = config.validate() {
            tracing::warn!("Configuration incomplete, continuing: {}", e);
        }
        config
    }

    fn from_file(path: &Path) -> Option<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "No config file, using defaults");
                return None;
            }
            Err(e) => {
                tracing::error!(path = %path.display(), "Unreadable config file, using defaults: {}", e);
                return None;
            }
        };

        match Self::from_yaml(&contents) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "Loaded configuration");
                Some(config)
            }
            Err(e) => {
                tracing::error!(path = %path.display(), "Invalid config file, using defaults: {}", e);
                None
            }
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    /// Apply overrides from an environment-like lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Generation API overrides
        if let Some(api_key) = lookup("OPENAI_API_KEY") {
            self.openai.api_key = api_key;
        }
        if let Some(base_url) = lookup("OPENAI_BASE_URL") {
            self.openai.base_url = base_url;
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.openai.model = model;
        }

        // Timeout overrides
        if let Some(secs) = lookup("STORY_REQUEST_TIMEOUT_SECONDS").and_then(|v| v.parse().ok()) {
            self.timeouts.request_seconds = secs;
        }
        if let Some(secs) = lookup("STORY_RESOURCE_TIMEOUT_SECONDS").and_then(|v| v.parse().ok())
        {
            self.timeouts.resource_seconds = secs;
        }
        if let Some(secs) = lookup("STORY_PROBE_TIMEOUT_SECONDS").and_then(|v| v.parse().ok()) {
            self.timeouts.probe_seconds = secs;
        }

        // Probe overrides
        if let Some(secs) = lookup("STORY_PROBE_FRESHNESS_SECONDS").and_then(|v| v.parse().ok()) {
            self.probe.freshness_seconds = secs;
        }

        // Monitor overrides
        if let Some(addr) = lookup("STORY_MONITOR_ADDRESS") {
            self.monitor.check_address = addr;
        }
        if let Some(secs) = lookup("STORY_MONITOR_INTERVAL_SECONDS").and_then(|v| v.parse().ok()) {
            self.monitor.interval_seconds = secs;
        }

        // Speech overrides
        if let Some(api_key) = lookup("ELEVENLABS_API_KEY") {
            self.speech.api_key = api_key;
        }
        if let Some(voice_id) = lookup("ELEVENLABS_VOICE_ID") {
            self.speech.voice_id = voice_id;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.openai.api_key.is_empty() {
            return Err("OPENAI_API_KEY environment variable must be set".into());
        }
        if !self.openai.base_url.starts_with("http") {
            return Err(format!("Invalid OpenAI base URL: {}", self.openai.base_url).into());
        }

        if self.timeouts.probe_seconds == 0 || self.timeouts.probe_seconds > 10 {
            return Err("Probe timeout must be between 1 and 10 seconds".into());
        }
        if self.timeouts.request_seconds == 0 {
            return Err("Request timeout cannot be 0".into());
        }
        if self.timeouts.resource_seconds < self.timeouts.request_seconds {
            return Err("Resource timeout cannot be shorter than the request timeout".into());
        }

        if self.probe.jitter_factor < 0.0 || self.probe.jitter_factor > 1.0 {
            return Err("Probe jitter factor must be between 0.0 and 1.0".into());
        }
        if self.probe.backoff_max_ms < self.probe.backoff_initial_ms {
            return Err("Probe backoff max must not be below the initial delay".into());
        }

        if self.monitor.interval_seconds == 0 {
            return Err("Monitor interval cannot be 0".into());
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.request_seconds)
    }

    pub fn resource_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.resource_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.probe_seconds.min(10))
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_seconds)
    }

    pub fn monitor_check_timeout(&self) -> Duration {
        Duration::from_secs(self.monitor.check_timeout_seconds)
    }
}
