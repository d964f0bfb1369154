//! Layered configuration for the upstream clients.
//!
//! Sources are merged in order, later layers winning:
//! 1. Defaults (from code)
//! 2. Config file (`echona.toml`, or an explicit path)
//! 3. Environment variables (`ECHONA_*` prefix, `__` between sections)
//!
//! ```no_run
//! use echona_music_client::config::ConfigLoader;
//!
//! let config = ConfigLoader::load_default()?;
//! assert!(config.spotify.timeout().as_millis() > 0);
//! # Ok::<(), echona_music_client::config::ConfigError>(())
//! ```
pub mod error;
pub mod loader;

pub use error::{ConfigError, Result};
pub use loader::{
    AnalysisConfig, AppConfig, ConfigLoader, Environment, RetryConfig, SpotifyConfig,
};
