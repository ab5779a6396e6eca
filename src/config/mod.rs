//! Settings and configuration module
//!
//! Environment-driven configuration for the lookup core and the gateway:
//! defaults, `from_env` loading and builder-style overrides.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::modules::evasion::{EgressRange, EvasionError, EvasionProfileSelector, FingerprintTag};
use crate::modules::pacing::{DelayWindow, DelayWindowError};

pub const DEFAULT_WARMUP_URL: &str = "https://www.tse.go.cr/dondevotar/";
pub const DEFAULT_QUERY_URL: &str =
    "https://www.tse.go.cr/dondevotar/prRemoto.aspx/ObtenerDondeVotar";
pub const DEFAULT_CHAT_WEBHOOK_URL: &str = "https://gscode.app.n8n.cloud/webhook/ask";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Evasion(#[from] EvasionError),
    #[error(transparent)]
    DelayWindow(#[from] DelayWindowError),
    #[error("{var}: '{value}' is not a valid number")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var}: '{value}' is not a valid url")]
    InvalidUrl { var: &'static str, value: String },
    #[error("{var}: '{value}' is not a valid socket address")]
    InvalidAddress { var: &'static str, value: String },
}

/// Lookup pipeline settings.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    /// `None` means direct connections.
    pub egress_template: Option<String>,
    pub egress_range: EgressRange,
    pub fingerprints: Vec<FingerprintTag>,
    pub cache_ttl: Duration,
    pub delay: DelayWindow,
    pub warmup_timeout: Duration,
    pub query_timeout: Duration,
    pub warmup_url: Url,
    pub query_url: Url,
    pub audit_path: PathBuf,
    pub transcript_path: PathBuf,
    pub retry: RetryConfig,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            egress_template: None,
            egress_range: EgressRange::default(),
            fingerprints: FingerprintTag::ALL.to_vec(),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            delay: DelayWindow::default(),
            warmup_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(15),
            warmup_url: parse_const_url(DEFAULT_WARMUP_URL),
            query_url: parse_const_url(DEFAULT_QUERY_URL),
            audit_path: PathBuf::from("lookups.csv"),
            transcript_path: PathBuf::from("chat_transcripts.csv"),
            retry: RetryConfig::default(),
        }
    }
}

impl LookupConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&get);
        let defaults = Self::default();

        let egress_template = vars.get("TSE_PROXY_URL");
        let egress_range = match vars.get("CEDULA_EGRESS_RANGE") {
            Some(raw) => raw.parse()?,
            None => defaults.egress_range,
        };
        let fingerprints = match vars.get("CEDULA_FINGERPRINTS") {
            Some(raw) => raw
                .split(',')
                .filter(|tag| !tag.trim().is_empty())
                .map(str::parse)
                .collect::<Result<Vec<FingerprintTag>, _>>()?,
            None => defaults.fingerprints,
        };

        let delay_min = vars.millis("CEDULA_DELAY_MIN_MS")?.unwrap_or(defaults.delay.min());
        let delay_max = vars.millis("CEDULA_DELAY_MAX_MS")?.unwrap_or(defaults.delay.max());

        let config = Self {
            egress_template,
            egress_range,
            fingerprints,
            cache_ttl: vars.secs("CEDULA_CACHE_TTL_SECS")?.unwrap_or(defaults.cache_ttl),
            delay: DelayWindow::new(delay_min, delay_max)?,
            warmup_timeout: vars
                .secs("CEDULA_WARMUP_TIMEOUT_SECS")?
                .unwrap_or(defaults.warmup_timeout),
            query_timeout: vars
                .secs("CEDULA_QUERY_TIMEOUT_SECS")?
                .unwrap_or(defaults.query_timeout),
            warmup_url: vars.url("CEDULA_WARMUP_URL")?.unwrap_or(defaults.warmup_url),
            query_url: vars.url("CEDULA_QUERY_URL")?.unwrap_or(defaults.query_url),
            audit_path: vars
                .get("CEDULA_AUDIT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.audit_path),
            transcript_path: vars
                .get("CEDULA_TRANSCRIPT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.transcript_path),
            retry: RetryConfig::from_vars(&vars)?,
        };

        // Surface template problems at startup rather than on first lookup.
        config.selector()?;
        Ok(config)
    }

    pub fn selector(&self) -> Result<EvasionProfileSelector, ConfigError> {
        Ok(EvasionProfileSelector::new(
            self.egress_template.as_deref(),
            self.egress_range,
            self.fingerprints.clone(),
        )?)
    }

    pub fn with_egress_template(mut self, template: impl Into<String>) -> Self {
        self.egress_template = Some(template.into());
        self
    }

    pub fn with_delay(mut self, delay: DelayWindow) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_endpoints(mut self, warmup_url: Url, query_url: Url) -> Self {
        self.warmup_url = warmup_url;
        self.query_url = query_url;
        self
    }

    pub fn with_fingerprints(mut self, fingerprints: Vec<FingerprintTag>) -> Self {
        self.fingerprints = fingerprints;
        self
    }
}

/// Optional retry decorator settings. One attempt and no breaker by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive `Blocked` outcomes that open the breaker; 0 disables it.
    pub blocked_threshold: u32,
    pub cooldown: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            blocked_threshold: 0,
            cooldown: Duration::from_secs(300),
        }
    }
}

impl RetryConfig {
    fn from_vars(vars: &Vars<'_>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_attempts: vars
                .count("CEDULA_RETRY_ATTEMPTS")?
                .map(|n| n.max(1))
                .unwrap_or(defaults.max_attempts),
            base_delay: vars.millis("CEDULA_RETRY_BASE_MS")?.unwrap_or(defaults.base_delay),
            max_delay: vars.millis("CEDULA_RETRY_MAX_MS")?.unwrap_or(defaults.max_delay),
            blocked_threshold: vars
                .count("CEDULA_BREAKER_THRESHOLD")?
                .unwrap_or(defaults.blocked_threshold),
            cooldown: vars.secs("CEDULA_BREAKER_COOLDOWN_SECS")?.unwrap_or(defaults.cooldown),
        })
    }
}

/// HTTP front door settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind: SocketAddr,
    pub static_dir: PathBuf,
    pub chat_webhook_url: Url,
    pub chat_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            static_dir: PathBuf::from("static"),
            chat_webhook_url: parse_const_url(DEFAULT_CHAT_WEBHOOK_URL),
            chat_timeout: Duration::from_secs(30),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&get);
        let defaults = Self::default();
        let bind = match vars.get("CEDULA_HTTP_BIND") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidAddress {
                var: "CEDULA_HTTP_BIND",
                value: raw,
            })?,
            None => defaults.bind,
        };
        Ok(Self {
            bind,
            static_dir: vars
                .get("CEDULA_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            chat_webhook_url: vars.url("CHAT_WEBHOOK_URL")?.unwrap_or(defaults.chat_webhook_url),
            chat_timeout: vars.secs("CHAT_TIMEOUT_SECS")?.unwrap_or(defaults.chat_timeout),
        })
    }
}

fn parse_const_url(raw: &str) -> Url {
    Url::parse(raw).unwrap_or_else(|err| panic!("built-in url {raw} is invalid: {err}"))
}

/// Trimmed, non-empty variable access with typed parsing.
struct Vars<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Vars<'_> {
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn number(&self, var: &'static str) -> Result<Option<u64>, ConfigError> {
        self.get(var)
            .map(|value| {
                value
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidNumber { var, value })
            })
            .transpose()
    }

    fn count(&self, var: &'static str) -> Result<Option<u32>, ConfigError> {
        self.number(var)?
            .map(|n| {
                u32::try_from(n).map_err(|_| ConfigError::InvalidNumber {
                    var,
                    value: n.to_string(),
                })
            })
            .transpose()
    }

    fn secs(&self, var: &'static str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.number(var)?.map(Duration::from_secs))
    }

    fn millis(&self, var: &'static str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.number(var)?.map(Duration::from_millis))
    }

    fn url(&self, var: &'static str) -> Result<Option<Url>, ConfigError> {
        self.get(var)
            .map(|value| Url::parse(&value).map_err(|_| ConfigError::InvalidUrl { var, value }))
            .transpose()
    }
}
