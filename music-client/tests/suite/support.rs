use echona_music_client::config::AppConfig;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;
use wiremock::MockServer;

pub const CLIENT_ID: &str = "test-client";
pub const CLIENT_SECRET: &str = "test-secret";

/// Route library logs to the test harness; `RUST_LOG` overrides the level.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("echona_music_client=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Configuration pointing every upstream at `server`, with short delays.
pub fn config_for(server: &MockServer) -> AppConfig {
    let mut config = AppConfig::default();
    config.spotify.client_id = CLIENT_ID.to_string();
    config.spotify.client_secret = CLIENT_SECRET.to_string();
    config.spotify.accounts_url = server.uri();
    config.spotify.api_url = server.uri();
    config.spotify.timeout_ms = 500;
    config.retry.base_delay_ms = 10;
    config.analysis.service_url = server.uri();
    config.analysis.request_timeout_ms = 500;
    config.analysis.health_timeout_ms = 200;
    config
}

pub fn token_body(access_token: &str, expires_in: u64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in,
    })
}

pub fn search_body(track_id: &str) -> Value {
    json!({
        "tracks": {
            "items": [{
                "id": track_id,
                "name": "Weightless",
                "uri": format!("spotify:track:{track_id}"),
                "artists": [{"id": "a1", "name": "Marconi Union"}],
                "duration_ms": 480000
            }],
            "total": 1,
            "limit": 10,
            "offset": 0,
            "next": null
        }
    })
}
