//! Server configuration.

use std::time::Duration;

use duet_presence::PresenceConfig;
use duet_transport::TransportConfig;

/// Everything needed to start a [`DuetServer`](crate::DuetServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on. Default: `127.0.0.1:8080`.
    pub bind_addr: String,
    /// A connection that sends nothing (not even a heartbeat) for this
    /// long is treated as gone. Default: 30 s.
    pub idle_timeout: Duration,
    /// Accept-time settings: origin allow-list and handshake timeout.
    pub transport: TransportConfig,
    /// Presence broadcast settings.
    pub presence: PresenceConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            idle_timeout: Duration::from_secs(30),
            transport: TransportConfig::default(),
            presence: PresenceConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr, "127.0.0.1:8080");
        assert_eq!(cfg.idle_timeout, Duration::from_secs(30));
        assert!(cfg.transport.allowed_origins.is_empty());
        assert_eq!(cfg.presence.interval, Duration::from_secs(10));
    }
}
