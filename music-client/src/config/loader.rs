use crate::config::error::{ConfigError, Result};
use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Upper bound on any per-call retry budget, whatever the configuration says.
pub const MAX_RETRY_CAP: u32 = 3;

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deployment environment; strict environments reject partial setups
    #[serde(default)]
    pub environment: Environment,

    /// Spotify credentials and endpoints
    #[serde(default)]
    pub spotify: SpotifyConfig,

    /// Mood analysis service
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Shared retry settings
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn is_strict(self) -> bool {
        matches!(self, Environment::Staging | Environment::Production)
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    /// OAuth callback registered with the Spotify app
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Accounts service base URL (token and authorize endpoints)
    #[serde(default = "default_accounts_url")]
    pub accounts_url: String,

    /// Web API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_spotify_timeout_ms")]
    pub timeout_ms: u64,

    /// Seconds subtracted from the app token lifetime before renewal
    #[serde(default = "default_lease_buffer_secs")]
    pub lease_buffer_secs: u64,
}

/// Mood analysis service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_analysis_url")]
    pub service_url: String,

    /// Per-attempt timeout for `/analyze` outside production
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Timeout for the single `/health` probe
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retries per call, capped at [`MAX_RETRY_CAP`]
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

// Default value functions
fn default_redirect_uri() -> String {
    "http://localhost:5000/api/spotify/callback".to_string()
}
fn default_accounts_url() -> String {
    "https://accounts.spotify.com".to_string()
}
fn default_api_url() -> String {
    "https://api.spotify.com".to_string()
}
fn default_spotify_timeout_ms() -> u64 {
    10_000
}
fn default_lease_buffer_secs() -> u64 {
    60
}
fn default_analysis_url() -> String {
    "http://127.0.0.1:5001".to_string()
}
fn default_request_timeout_ms() -> u64 {
    12_000
}
fn default_health_timeout_ms() -> u64 {
    4_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    300
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_redirect_uri(),
            accounts_url: default_accounts_url(),
            api_url: default_api_url(),
            timeout_ms: default_spotify_timeout_ms(),
            lease_buffer_secs: default_lease_buffer_secs(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            service_url: default_analysis_url(),
            request_timeout_ms: default_request_timeout_ms(),
            health_timeout_ms: default_health_timeout_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl SpotifyConfig {
    /// True iff client id, client secret and redirect URI are all non-blank.
    pub fn is_configured(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Names of the required credential fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("spotify.client_id", &self.client_id),
            ("spotify.client_secret", &self.client_secret),
            ("spotify.redirect_uri", &self.redirect_uri),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn lease_buffer(&self) -> Duration {
        Duration::from_secs(self.lease_buffer_secs)
    }

    fn has_credentials(&self) -> bool {
        !self.client_id.trim().is_empty() || !self.client_secret.trim().is_empty()
    }
}

impl fmt::Debug for SpotifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = if self.client_secret.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("SpotifyConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &secret)
            .field("redirect_uri", &self.redirect_uri)
            .field("accounts_url", &self.accounts_url)
            .field("api_url", &self.api_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("lease_buffer_secs", &self.lease_buffer_secs)
            .finish()
    }
}

impl AnalysisConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}

impl RetryConfig {
    /// Configured retries, never above [`MAX_RETRY_CAP`].
    pub fn max_retries(&self) -> u32 {
        self.max_retries.min(MAX_RETRY_CAP)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl AppConfig {
    /// Check the merged configuration.
    ///
    /// Returns the non-fatal warnings on success. Every fatal problem is
    /// collected into a single [`ConfigError::ValidationError`].
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if !self.spotify.has_credentials() {
            warnings.push(
                "Spotify credentials not configured; Spotify features will degrade gracefully"
                    .to_string(),
            );
        } else {
            let missing = self.spotify.missing_fields();
            if !missing.is_empty() {
                let message = format!("Spotify partially configured. Missing: {}", missing.join(", "));
                if self.environment.is_strict() {
                    errors.push(message);
                } else {
                    warnings.push(format!("{message}. Spotify features will be unavailable"));
                }
            }
        }

        for (name, value) in [
            ("spotify.accounts_url", &self.spotify.accounts_url),
            ("spotify.api_url", &self.spotify.api_url),
            ("analysis.service_url", &self.analysis.service_url),
        ] {
            if let Err(err) = Url::parse(value) {
                errors.push(format!("{name} is not a valid URL ({err})"));
            }
        }

        for (name, value) in [
            ("spotify.timeout_ms", self.spotify.timeout_ms),
            ("analysis.request_timeout_ms", self.analysis.request_timeout_ms),
            ("analysis.health_timeout_ms", self.analysis.health_timeout_ms),
            ("retry.base_delay_ms", self.retry.base_delay_ms),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be greater than zero"));
            }
        }

        if self.retry.max_retries > MAX_RETRY_CAP {
            warnings.push(format!(
                "retry.max_retries = {} exceeds the cap; using {MAX_RETRY_CAP}",
                self.retry.max_retries
            ));
        }

        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(ConfigError::ValidationError(errors))
        }
    }
}

/// Configuration loader with layered merging support
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration with layered merging:
    /// 1. Start with defaults (from Default implementations)
    /// 2. Merge config file if provided
    /// 3. Override with environment variables (ECHONA_ prefix)
    ///
    /// The merged result is validated; warnings are logged.
    pub fn load(&self) -> Result<AppConfig> {
        let mut builder = Config::builder();

        // Layer 1: Defaults (serialize defaults to JSON and load as base)
        let defaults_json = serde_json::to_string(&AppConfig::default())?;
        builder = builder.add_source(File::from_str(&defaults_json, config::FileFormat::Json));

        // Layer 2: Config file (if provided)
        if let Some(ref path) = self.config_path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            builder = builder.add_source(File::from(path.as_ref()));
        }

        // Layer 3: Environment variables, e.g. ECHONA_SPOTIFY__CLIENT_ID
        builder = builder.add_source(
            config::Environment::with_prefix("ECHONA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let app_config: AppConfig = builder.build()?.try_deserialize()?;

        for warning in app_config.validate()? {
            tracing::warn!(%warning, "configuration warning");
        }

        Ok(app_config)
    }

    /// Locate the default config file in standard locations:
    /// 1. Current directory: ./echona.toml
    /// 2. XDG config: ~/.config/echona/config.toml
    /// 3. Home directory: ~/.echona.toml
    pub fn find_config_file() -> Option<PathBuf> {
        let cwd_config = PathBuf::from("./echona.toml");
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("echona").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".echona.toml");
            if home_config.exists() {
                return Some(home_config);
            }
        }

        None
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<AppConfig> {
        let loader = match Self::find_config_file() {
            Some(config_path) => ConfigLoader::new().with_file(config_path),
            None => ConfigLoader::new(),
        };

        loader.load()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
