//! Test configuration helpers

use wavy_history::{Config, RetryConfig};
use wiremock::MockServer;

/// Configuration pointing at a mock server, with retries off
pub fn mock_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.api.base_url = server.uri();
    config.retry = RetryConfig::disabled();
    config
}

/// Username to use against the real API, from `.env` or the environment
///
/// Reads `WAVY_USERNAME`, and `WAVY_API_BASE` to override the API base URL.
pub fn live_config() -> Option<(Config, String)> {
    dotenvy::dotenv().ok();

    let username = std::env::var("WAVY_USERNAME").ok()?;
    let mut config = Config::default();
    if let Ok(base) = std::env::var("WAVY_API_BASE") {
        config.api.base_url = base;
    }
    Some((config, username))
}
