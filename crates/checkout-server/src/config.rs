//! Runtime Configuration
//!
//! Read from the process environment (optionally seeded from `.env`). The
//! processor implementation is decided here, once, at startup.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use checkout_payments::{
    DEFAULT_PROCESSOR_TIMEOUT, ProcessorClient, SimulatedProcessor, StripeProcessor,
};

/// Signing secret used for webhooks when none is configured outside production
pub const DEV_WEBHOOK_SECRET: &str = "whsec_development_only";

/// Token secret used when none is configured outside production
pub const DEV_JWT_SECRET: &str = "development-only-jwt-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Deployment environment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" | "local" | "test" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ConfigError::Invalid {
                key: "APP_ENV",
                value: other.to_string(),
            }),
        }
    }
}

/// Allowed CORS origins
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub environment: Environment,
    pub bind_addr: String,
    pub jwt_secret: String,

    /// Live processor key; `None` selects the simulated processor
    pub stripe_secret_key: Option<String>,

    pub webhook_secret: String,
    pub allowed_origins: AllowedOrigins,

    /// Base for redirect and onboarding URLs
    pub public_base_url: String,

    pub processor_timeout: Duration,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment: Environment = get("APP_ENV")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or_default();
        let production = environment.is_production();

        let stripe_secret_key = get("STRIPE_SECRET_KEY");
        if stripe_secret_key.is_none() && production {
            return Err(ConfigError::Missing("STRIPE_SECRET_KEY"));
        }

        let webhook_secret = match get("STRIPE_WEBHOOK_SECRET") {
            Some(secret) => secret,
            None if production => return Err(ConfigError::Missing("STRIPE_WEBHOOK_SECRET")),
            None => {
                tracing::warn!("STRIPE_WEBHOOK_SECRET not set, using the development signing secret");
                DEV_WEBHOOK_SECRET.to_string()
            }
        };

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None if production => return Err(ConfigError::Missing("JWT_SECRET")),
            None => {
                tracing::warn!("JWT_SECRET not set, using the development token secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let allowed_origins = match get("ALLOWED_ORIGINS") {
            Some(list) if list.trim() == "*" => AllowedOrigins::Any,
            Some(list) => AllowedOrigins::List(
                list.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            None if production => AllowedOrigins::List(Vec::new()),
            None => AllowedOrigins::Any,
        };

        let processor_timeout = match get("PROCESSOR_TIMEOUT_SECS") {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::Invalid {
                    key: "PROCESSOR_TIMEOUT_SECS",
                    value,
                })?,
            None => DEFAULT_PROCESSOR_TIMEOUT,
        };

        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into());
        let public_base_url = get("PUBLIC_BASE_URL")
            .unwrap_or_else(|| "http://localhost:3000".into())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            environment,
            bind_addr,
            jwt_secret,
            stripe_secret_key,
            webhook_secret,
            allowed_origins,
            public_base_url,
            processor_timeout,
        })
    }

    /// Development defaults: simulated processor, development secrets
    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            bind_addr: "127.0.0.1:3000".into(),
            jwt_secret: DEV_JWT_SECRET.into(),
            stripe_secret_key: None,
            webhook_secret: DEV_WEBHOOK_SECRET.into(),
            allowed_origins: AllowedOrigins::Any,
            public_base_url: "http://localhost:3000".into(),
            processor_timeout: DEFAULT_PROCESSOR_TIMEOUT,
        }
    }

    /// Build the processor client this configuration selects
    pub fn processor(&self) -> Arc<dyn ProcessorClient> {
        match &self.stripe_secret_key {
            Some(key) => Arc::new(StripeProcessor::new(key)),
            None => Arc::new(SimulatedProcessor::new(&self.public_base_url)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use checkout_payments::ProcessorMode;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_development_defaults_to_simulated() {
        let config = load(&[]).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.webhook_secret, DEV_WEBHOOK_SECRET);
        assert_eq!(config.allowed_origins, AllowedOrigins::Any);
        assert_eq!(config.processor().mode(), ProcessorMode::Simulated);
    }

    #[test]
    fn test_secret_key_selects_live_processor() {
        let config = load(&[("STRIPE_SECRET_KEY", "sk_test_123")]).unwrap();
        assert_eq!(config.processor().mode(), ProcessorMode::Live);
    }

    #[test]
    fn test_production_requires_processor_credentials() {
        assert!(matches!(
            load(&[("APP_ENV", "production"), ("JWT_SECRET", "s")]),
            Err(ConfigError::Missing("STRIPE_SECRET_KEY"))
        ));
        assert!(matches!(
            load(&[
                ("APP_ENV", "production"),
                ("STRIPE_SECRET_KEY", "sk_live_1"),
                ("JWT_SECRET", "s"),
            ]),
            Err(ConfigError::Missing("STRIPE_WEBHOOK_SECRET"))
        ));
    }

    #[test]
    fn test_production_config() {
        let config = load(&[
            ("APP_ENV", "production"),
            ("STRIPE_SECRET_KEY", "sk_live_1"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_1"),
            ("JWT_SECRET", "secret"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("PUBLIC_BASE_URL", "https://pay.example/"),
            ("PROCESSOR_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        assert!(config.environment.is_production());
        assert_eq!(
            config.allowed_origins,
            AllowedOrigins::List(vec!["https://a.example".into(), "https://b.example".into()])
        );
        assert_eq!(config.public_base_url, "https://pay.example");
        assert_eq!(config.processor_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(load(&[("APP_ENV", "staging")]).is_err());
        assert!(load(&[("PROCESSOR_TIMEOUT_SECS", "soon")]).is_err());
        assert!(load(&[("PROCESSOR_TIMEOUT_SECS", "0")]).is_err());
    }
}
