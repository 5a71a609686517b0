//! Environment profile and authentication-layer tuning.
//!
//! Every knob has two defaults: a production value and a local/dev value.
//! Local tokens are shorter-lived and local networking is flakier, so the
//! development profile renews more often and tolerates more consecutive
//! probe failures before declaring the backend disconnected.

use std::fmt;
use std::time::Duration;

/// Floor for the reactive invalidation cooldown.
pub const MIN_INVALIDATION_COOLDOWN: Duration = Duration::from_secs(60);

const DAY_SECS: u64 = 24 * 60 * 60;

/// Deployment profile, read from `ENVIRONMENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    /// `production` / `prod` (any case) select production; anything else,
    /// including an unset variable, selects development.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "production" || v == "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `SessionRegistry::create` does when the session row cannot be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceMode {
    /// Return a transient, unpersisted record and log the failure.
    Degrade,
    /// Fail the login with a persistence error.
    Strict,
}

impl PersistenceMode {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => PersistenceMode::Strict,
            "degrade" => PersistenceMode::Degrade,
            other => panic!("SESSION_PERSISTENCE_MODE must be `degrade` or `strict`, got `{other}`"),
        }
    }
}

/// Tuning for sessions, handle lifetime, probing and renewal.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub environment: Environment,
    /// Lifetime of a session created at login.
    pub session_ttl: Duration,
    /// Lifetime granted to a session each time its refresh token is rotated.
    pub refresh_token_ttl: Duration,
    /// Maximum age of a cached backend handle before it is recreated.
    pub handle_ttl: Duration,
    /// Cadence of the proactive renewal loop.
    pub renewal_interval: Duration,
    /// Sleep after a failed renewal cycle before resuming the normal cadence.
    pub renewal_backoff: Duration,
    /// Consecutive probe failures at which the backend is declared disconnected.
    pub failure_tolerance: u32,
    pub probe_timeout: Duration,
    pub connect_timeout: Duration,
    pub registry_timeout: Duration,
    /// Minimum spacing between reactive handle invalidations.
    pub invalidation_cooldown: Duration,
    /// Expired sessions are hard-deleted only after this many days.
    pub cleanup_grace_days: i64,
    pub cleanup_interval: Duration,
    pub persistence_mode: PersistenceMode,
}

impl AuthConfig {
    /// Profile defaults with no environment overrides applied.
    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self {
                environment,
                session_ttl: Duration::from_secs(30 * DAY_SECS),
                refresh_token_ttl: Duration::from_secs(30 * DAY_SECS),
                handle_ttl: Duration::from_secs(30 * 60),
                renewal_interval: Duration::from_secs(20 * 60),
                renewal_backoff: Duration::from_secs(300),
                failure_tolerance: 3,
                probe_timeout: Duration::from_secs(5),
                connect_timeout: Duration::from_secs(10),
                registry_timeout: Duration::from_secs(5),
                invalidation_cooldown: MIN_INVALIDATION_COOLDOWN,
                cleanup_grace_days: 7,
                cleanup_interval: Duration::from_secs(3600),
                persistence_mode: PersistenceMode::Degrade,
            },
            Environment::Development => Self {
                environment,
                session_ttl: Duration::from_secs(7 * DAY_SECS),
                refresh_token_ttl: Duration::from_secs(7 * DAY_SECS),
                handle_ttl: Duration::from_secs(15 * 60),
                renewal_interval: Duration::from_secs(10 * 60),
                renewal_backoff: Duration::from_secs(300),
                failure_tolerance: 10,
                probe_timeout: Duration::from_secs(10),
                connect_timeout: Duration::from_secs(15),
                registry_timeout: Duration::from_secs(10),
                invalidation_cooldown: MIN_INVALIDATION_COOLDOWN,
                cleanup_grace_days: 7,
                cleanup_interval: Duration::from_secs(3600),
                persistence_mode: PersistenceMode::Degrade,
            },
        }
    }

    /// Load configuration from environment variables with profile defaults.
    ///
    /// | Env Var                         | Production | Development |
    /// |---------------------------------|------------|-------------|
    /// | `ENVIRONMENT`                   | --         | (default)   |
    /// | `SESSION_TTL_SECS`              | 30 days    | 7 days      |
    /// | `REFRESH_TOKEN_TTL_SECS`        | 30 days    | 7 days      |
    /// | `HANDLE_TTL_SECS`               | 1800       | 900         |
    /// | `RENEWAL_INTERVAL_SECS`         | 1200       | 600         |
    /// | `RENEWAL_BACKOFF_SECS`          | 300        | 300         |
    /// | `FAILURE_TOLERANCE`             | 3          | 10          |
    /// | `PROBE_TIMEOUT_SECS`            | 5          | 10          |
    /// | `CONNECT_TIMEOUT_SECS`          | 10         | 15          |
    /// | `REGISTRY_TIMEOUT_SECS`         | 5          | 10          |
    /// | `INVALIDATION_COOLDOWN_SECS`    | 60         | 60          |
    /// | `SESSION_CLEANUP_GRACE_DAYS`    | 7          | 7           |
    /// | `SESSION_CLEANUP_INTERVAL_SECS` | 3600       | 3600        |
    /// | `SESSION_PERSISTENCE_MODE`      | `degrade`  | `degrade`   |
    ///
    /// # Panics
    ///
    /// Panics if any variable is set to an unparseable value.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading from an arbitrary lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let environment = Environment::parse(lookup("ENVIRONMENT").as_deref());
        let defaults = Self::for_environment(environment);

        let secs = |name: &str, default: Duration| -> Duration {
            match lookup(name) {
                Some(v) => Duration::from_secs(
                    v.trim()
                        .parse()
                        .unwrap_or_else(|_| panic!("{name} must be a valid u64")),
                ),
                None => default,
            }
        };

        let failure_tolerance = lookup("FAILURE_TOLERANCE")
            .map(|v| {
                v.trim()
                    .parse::<u32>()
                    .expect("FAILURE_TOLERANCE must be a valid u32")
            })
            .unwrap_or(defaults.failure_tolerance)
            .max(1);

        let cleanup_grace_days = lookup("SESSION_CLEANUP_GRACE_DAYS")
            .map(|v| {
                v.trim()
                    .parse::<i64>()
                    .expect("SESSION_CLEANUP_GRACE_DAYS must be a valid i64")
            })
            .unwrap_or(defaults.cleanup_grace_days);

        let persistence_mode = lookup("SESSION_PERSISTENCE_MODE")
            .map(|v| PersistenceMode::parse(&v))
            .unwrap_or(defaults.persistence_mode);

        Self {
            environment,
            session_ttl: secs("SESSION_TTL_SECS", defaults.session_ttl),
            refresh_token_ttl: secs("REFRESH_TOKEN_TTL_SECS", defaults.refresh_token_ttl),
            handle_ttl: secs("HANDLE_TTL_SECS", defaults.handle_ttl),
            renewal_interval: secs("RENEWAL_INTERVAL_SECS", defaults.renewal_interval),
            renewal_backoff: secs("RENEWAL_BACKOFF_SECS", defaults.renewal_backoff),
            failure_tolerance,
            probe_timeout: secs("PROBE_TIMEOUT_SECS", defaults.probe_timeout),
            connect_timeout: secs("CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
            registry_timeout: secs("REGISTRY_TIMEOUT_SECS", defaults.registry_timeout),
            invalidation_cooldown: secs(
                "INVALIDATION_COOLDOWN_SECS",
                defaults.invalidation_cooldown,
            )
            .max(MIN_INVALIDATION_COOLDOWN),
            cleanup_grace_days,
            cleanup_interval: secs("SESSION_CLEANUP_INTERVAL_SECS", defaults.cleanup_interval),
            persistence_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn unset_environment_is_development() {
        let config = AuthConfig::from_vars(vars(&[]));
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.session_ttl, Duration::from_secs(7 * DAY_SECS));
        assert_eq!(config.failure_tolerance, 10);
        assert_eq!(config.persistence_mode, PersistenceMode::Degrade);
    }

    #[test]
    fn production_profile_is_stricter() {
        let config = AuthConfig::from_vars(vars(&[("ENVIRONMENT", "Production")]));
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.session_ttl, Duration::from_secs(30 * DAY_SECS));
        assert_eq!(config.failure_tolerance, 3);
        assert!(config.renewal_interval < config.handle_ttl);
    }

    #[test]
    fn dev_renews_more_often_than_prod() {
        let dev = AuthConfig::for_environment(Environment::Development);
        let prod = AuthConfig::for_environment(Environment::Production);
        assert!(dev.renewal_interval < prod.renewal_interval);
        assert!(dev.failure_tolerance > prod.failure_tolerance);
        assert!(dev.renewal_interval < dev.handle_ttl);
    }

    #[test]
    fn overrides_apply() {
        let config = AuthConfig::from_vars(vars(&[
            ("SESSION_TTL_SECS", "3600"),
            ("FAILURE_TOLERANCE", "4"),
            ("SESSION_PERSISTENCE_MODE", "strict"),
            ("SESSION_CLEANUP_GRACE_DAYS", "30"),
        ]));
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert_eq!(config.failure_tolerance, 4);
        assert_eq!(config.persistence_mode, PersistenceMode::Strict);
        assert_eq!(config.cleanup_grace_days, 30);
    }

    #[test]
    fn cooldown_never_drops_below_floor() {
        let config = AuthConfig::from_vars(vars(&[("INVALIDATION_COOLDOWN_SECS", "5")]));
        assert_eq!(config.invalidation_cooldown, MIN_INVALIDATION_COOLDOWN);
    }

    #[test]
    #[should_panic(expected = "HANDLE_TTL_SECS must be a valid u64")]
    fn malformed_value_panics() {
        AuthConfig::from_vars(vars(&[("HANDLE_TTL_SECS", "soon")]));
    }
}
