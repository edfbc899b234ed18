//! Runtime configuration.

use std::time::Duration;

use parceltrack_core::Viewport;
use parceltrack_sync::BackoffPolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:8081/api";
pub const DEFAULT_CHANNEL_URL: &str = "ws://localhost:8081/ws/tracking";

/// Fallback poll cadence per subscribed shipment.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// How long a status-change highlight stays on.
pub const DEFAULT_FLASH_DURATION: Duration = Duration::from_millis(1500);

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Shipment Query Service base, e.g. `http://host/api`.
    pub api_base_url: String,
    /// Push channel endpoint (`ws://` or `wss://`).
    pub channel_url: String,
    pub poll_interval: Duration,
    pub flash_duration: Duration,
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
    pub backoff: BackoffPolicy,
    pub viewport: Viewport,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_owned(),
            channel_url: DEFAULT_CHANNEL_URL.to_owned(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            flash_duration: DEFAULT_FLASH_DURATION,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            backoff: BackoffPolicy::default(),
            viewport: Viewport::default(),
        }
    }
}

impl SyncConfig {
    pub fn with_urls(api_base_url: impl Into<String>, channel_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            channel_url: channel_url.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.poll_interval, Duration::from_secs(30));
        assert_eq!(cfg.flash_duration, Duration::from_millis(1500));
        assert_eq!(cfg.backoff.ceiling, Duration::from_secs(30));
        assert_eq!(cfg.backoff.max_attempts, None);
        assert_eq!(cfg.viewport.width, 400.0);
    }

    #[test]
    fn with_urls_keeps_timing_defaults() {
        let cfg = SyncConfig::with_urls("http://api", "ws://chan");
        assert_eq!(cfg.api_base_url, "http://api");
        assert_eq!(cfg.channel_url, "ws://chan");
        assert_eq!(cfg.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }
}
