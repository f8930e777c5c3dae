use serde::Deserialize;
use time::Duration;

/// Settings of the session protocol engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of concurrently open sessions.
    pub max_sessions: usize,
    /// Sessions not consumed within this window become evictable.
    pub timeout_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_sessions: 1000,
            timeout_minutes: 5,
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::minutes(self.timeout_minutes)
    }
}

/// Settings of the PKI lifecycle manager.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PkiConfig {
    /// A CVC whose remaining validity drops below this threshold is renewed
    /// by the periodic sweep.
    pub renewal_threshold_days: i64,
    /// How long a renewal claim on the shared store stays live before other
    /// instances may pick the task up again.
    pub renewal_claim_minutes: i64,
    /// Cadence of delta blacklist refreshes, consumed by the timer driving
    /// the sweep.
    pub blacklist_delta_interval_hours: i64,
    /// Cadence of full blacklist refreshes.
    pub blacklist_full_interval_hours: i64,
}

impl Default for PkiConfig {
    fn default() -> Self {
        PkiConfig {
            renewal_threshold_days: 10,
            renewal_claim_minutes: 15,
            blacklist_delta_interval_hours: 2,
            blacklist_full_interval_hours: 24,
        }
    }
}

impl PkiConfig {
    pub fn renewal_threshold(&self) -> Duration {
        Duration::days(self.renewal_threshold_days)
    }

    pub fn renewal_claim_window(&self) -> Duration {
        Duration::minutes(self.renewal_claim_minutes)
    }
}

/// Top-level configuration of the authentication core. Constructed once at
/// process start; the engine and the lifecycle manager borrow from it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Public base URL of this middleware, used to build the identity
    /// provider callback address.
    pub server_url: String,
    pub session: SessionConfig,
    pub pki: PkiConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            server_url: "https://localhost:8443".to_string(),
            session: SessionConfig::default(),
            pki: PkiConfig::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CoreConfig::default();
        assert!(config.session.max_sessions > 0);
        assert!(config.session.timeout().is_positive());
        assert!(config.pki.renewal_threshold().is_positive());
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let config: CoreConfig = serde_json::from_str(
            r#"{ "server_url": "https://eid.example.org", "session": { "max_sessions": 2 } }"#,
        )
        .unwrap();
        assert_eq!(config.server_url, "https://eid.example.org");
        assert_eq!(config.session.max_sessions, 2);
        assert_eq!(config.session.timeout_minutes, 5);
    }
}
