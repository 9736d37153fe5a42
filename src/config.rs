use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::models::{GeoLocation, Language};

const PLACEHOLDER_API_KEY: &str = "PLACEHOLDER_GEMINI_API_KEY";

/// Main configuration structure for lab-assist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub gemini: GeminiConfig,
    pub retry: RetryConfig,
    pub notifications: NotificationConfig,
    pub geolocation: GeolocationConfig,
    pub providers: ProviderConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub language: Language,
    pub chat_greeting: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    /// Model used for the streaming consultant chat
    pub chat_model: String,
    /// Model used for recommendations, details, providers, trends and posts
    pub structured_model: String,
    /// Model used for semantic site search
    pub search_model: String,
    pub image_model: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub display_ms: u64,
    pub exit_grace_ms: u64,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeolocationConfig {
    pub timeout_ms: u64,
    pub enabled: bool,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Every provider website must end with this suffix
    pub website_suffix: String,
    pub max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub max_results: usize,
}

impl Config {
    /// Load configuration from file with environment variable overrides.
    /// Always returns a usable config; problems are logged.
    pub fn load() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!("Loaded .env from: {}", path.display()),
            Err(_) => tracing::debug!("No .env file found - continuing with env vars only"),
        }

        let config_path =
            env::var("LAB_ASSIST_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match Self::from_yaml(&contents) {
                    Ok(config) => {
                        tracing::info!("Loaded configuration from {}", config_path);
                        config
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to parse config file {}: {} - using defaults",
                            config_path,
                            e
                        );
                        Self::default()
                    }
                },
                Err(e) => {
                    tracing::error!(
                        "Failed to read config file {}: {} - using defaults",
                        config_path,
                        e
                    );
                    Self::default()
                }
            }
        } else {
            tracing::debug!("Config file not found at {} - using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides();

        if let Err(e) = config.validate() {
            tracing::warn!("Config validation warnings: {} - continuing anyway", e);
        }

        config
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    fn apply_env_overrides(&mut self) {
        // Gemini overrides; API_KEY is the name the site build used
        if let Ok(api_key) = env::var("GEMINI_API_KEY").or_else(|_| env::var("API_KEY")) {
            self.gemini.api_key = api_key;
        }
        if let Ok(base_url) = env::var("GEMINI_BASE_URL") {
            self.gemini.base_url = base_url;
        }
        if let Ok(model) = env::var("GEMINI_CHAT_MODEL") {
            self.gemini.chat_model = model;
        }
        if let Ok(model) = env::var("GEMINI_STRUCTURED_MODEL") {
            self.gemini.structured_model = model;
        }
        if let Ok(model) = env::var("GEMINI_SEARCH_MODEL") {
            self.gemini.search_model = model;
        }
        if let Ok(model) = env::var("GEMINI_IMAGE_MODEL") {
            self.gemini.image_model = model;
        }

        // App overrides
        if let Ok(language) = env::var("LAB_ASSIST_LANGUAGE") {
            match language.parse() {
                Ok(lang) => self.app.language = lang,
                Err(e) => tracing::warn!("Ignoring LAB_ASSIST_LANGUAGE: {}", e),
            }
        }

        // Retry overrides
        if let Ok(attempts) = env::var("LAB_ASSIST_RETRY_MAX_ATTEMPTS") {
            if let Ok(n) = attempts.parse() {
                self.retry.max_attempts = n;
            }
        }

        // Geolocation overrides
        if let Ok(timeout) = env::var("LAB_ASSIST_GEO_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.geolocation.timeout_ms = ms;
            }
        }
        if let Ok(lat) = env::var("LAB_ASSIST_LATITUDE") {
            if let Ok(v) = lat.parse() {
                self.geolocation.latitude = Some(v);
            }
        }
        if let Ok(lon) = env::var("LAB_ASSIST_LONGITUDE") {
            if let Ok(v) = lon.parse() {
                self.geolocation.longitude = Some(v);
            }
        }
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.gemini.api_key == PLACEHOLDER_API_KEY || self.gemini.api_key.is_empty() {
            return Err("GEMINI_API_KEY environment variable must be set".into());
        }

        if self.retry.max_attempts == 0 {
            return Err("Retry max_attempts cannot be 0".into());
        }
        if self.retry.jitter_factor < 0.0 || self.retry.jitter_factor > 1.0 {
            return Err("Retry jitter factor must be between 0.0 and 1.0".into());
        }

        if self.notifications.channel_capacity == 0 {
            return Err("Notification channel_capacity cannot be 0".into());
        }

        if !self.providers.website_suffix.starts_with('.') {
            return Err("Provider website_suffix must start with '.'".into());
        }

        if let Some(location) = self.geolocation.fixed_location() {
            if !(-90.0..=90.0).contains(&location.latitude)
                || !(-180.0..=180.0).contains(&location.longitude)
            {
                return Err("Geolocation latitude/longitude out of range".into());
            }
        }

        Ok(())
    }
}

impl GeolocationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Position reported by the static provider, if both coordinates are set.
    pub fn fixed_location(&self) -> Option<GeoLocation> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoLocation {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

impl NotificationConfig {
    pub fn display_duration(&self) -> Duration {
        Duration::from_millis(self.display_ms)
    }

    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: AppConfig {
                language: Language::En,
                chat_greeting: "Hello! I am the Hour-Tash Laboratory assistant. How can I help you with our analysis services today?".to_string(),
            },
            gemini: GeminiConfig {
                api_key: env::var("GEMINI_API_KEY")
                    .or_else(|_| env::var("API_KEY"))
                    .unwrap_or_else(|_| PLACEHOLDER_API_KEY.to_string()),
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                chat_model: "gemini-2.5-flash".to_string(),
                structured_model: "gemini-2.5-flash".to_string(),
                search_model: "gemini-2.5-pro".to_string(),
                image_model: "imagen-4.0-generate-001".to_string(),
                request_timeout_seconds: 120,
            },
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay_ms: 200,
                max_delay_ms: 5000,
                jitter_factor: 0.2,
            },
            notifications: NotificationConfig {
                display_ms: 5000,
                exit_grace_ms: 300,
                channel_capacity: 64,
            },
            geolocation: GeolocationConfig {
                timeout_ms: 10_000,
                enabled: true,
                latitude: None,
                longitude: None,
            },
            providers: ProviderConfig {
                website_suffix: ".example.com".to_string(),
                max_results: 5,
            },
            search: SearchConfig { max_results: 3 },
        }
    }
}
