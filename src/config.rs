//! Configuration types.

use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;

use crate::error::ConfigError;
use crate::profile::ActivationPolicy;

/// Default WhatsApp Cloud API base (Graph API v17.0).
pub const DEFAULT_WHATSAPP_API_BASE: &str = "https://graph.facebook.com/v17.0";

/// Service configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Secret echoed back by Meta during the webhook verification handshake.
    pub verify_token: SecretString,
    /// Bearer token for the WhatsApp Cloud API.
    pub whatsapp_token: SecretString,
    /// Sending phone number id.
    pub whatsapp_phone_id: String,
    pub whatsapp_api_base: String,
    /// Base URL of the external account backend.
    pub backend_url: String,
    /// Base URL of the onboarding web app (registration, KYC, deposits).
    pub webapp_url: String,
    pub db_path: String,
    pub port: u16,
    pub sweep_interval: Duration,
    /// Delay before the first sweep so startup can settle.
    pub sweep_initial_delay: Duration,
    /// Upper bound on every external HTTP call.
    pub http_timeout: Duration,
    pub profile_cache_ttl: Duration,
    pub activation_policy: ActivationPolicy,
    /// NGN per USD quoted on collection accounts.
    pub ngn_rate: Decimal,
    /// Directory for rotating log files. Stdout only when unset.
    pub log_dir: Option<String>,
}

impl AppConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let verify_token = require(&get, &["TOKI_VERIFY_TOKEN", "VERIFY_TOKEN"])?;
        let whatsapp_token = require(&get, &["WHATSAPP_TOKEN"])?;
        let whatsapp_phone_id = require(&get, &["WHATSAPP_PHONE_ID", "PHONE_ID"])?;
        let backend_url = require(&get, &["TOKI_BACKEND_URL"])?;
        let webapp_url = require(&get, &["TOKI_WEBAPP_URL"])?;

        let activation_policy = match get("TOKI_FREE_ACTIVATION") {
            Some(raw) => raw.parse().map_err(|message| ConfigError::InvalidValue {
                key: "TOKI_FREE_ACTIVATION".into(),
                message,
            })?,
            None => ActivationPolicy::WaitlistBelow(500),
        };

        let ngn_rate = match get("TOKI_NGN_RATE") {
            Some(raw) => raw
                .trim()
                .parse::<Decimal>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "TOKI_NGN_RATE".into(),
                    message: e.to_string(),
                })?,
            None => Decimal::from(1520),
        };

        Ok(Self {
            verify_token: SecretString::from(verify_token),
            whatsapp_token: SecretString::from(whatsapp_token),
            whatsapp_phone_id,
            whatsapp_api_base: get("WHATSAPP_API_BASE")
                .unwrap_or_else(|| DEFAULT_WHATSAPP_API_BASE.to_string()),
            backend_url: backend_url.trim_end_matches('/').to_string(),
            webapp_url: webapp_url.trim_end_matches('/').to_string(),
            db_path: get("TOKI_DB_PATH").unwrap_or_else(|| "./data/toki.db".to_string()),
            port: parse_or(&get, "PORT", 5000)?,
            sweep_interval: Duration::from_secs(parse_or(&get, "TOKI_SWEEP_INTERVAL_SECS", 30)?),
            sweep_initial_delay: Duration::from_secs(parse_or(
                &get,
                "TOKI_SWEEP_INITIAL_DELAY_SECS",
                5,
            )?),
            http_timeout: Duration::from_secs(parse_or(&get, "TOKI_HTTP_TIMEOUT_SECS", 8)?),
            profile_cache_ttl: Duration::from_secs(parse_or(
                &get,
                "TOKI_PROFILE_CACHE_TTL_SECS",
                60,
            )?),
            activation_policy,
            ngn_rate,
            log_dir: get("TOKI_LOG_DIR"),
        })
    }
}

/// First non-empty value among `keys`; errors name the first (preferred) key.
fn require<G>(get: &G, keys: &[&str]) -> Result<String, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    keys.iter()
        .find_map(|k| get(k))
        .ok_or_else(|| ConfigError::MissingEnvVar(keys[0].to_string()))
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
