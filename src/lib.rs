//! # cedula-lookup-rs
//!
//! Resilient citizen-ID lookups against a registry that sits behind
//! bot-mitigation.
//!
//! ## Features
//!
//! - Per-attempt evasion profiles: rotating egress identity and browser fingerprint
//! - Two-phase scrape: session warm-up, paced pause, authoritative query
//! - Time-bounded result cache with lazy expiry
//! - Write-once audit log of first-time resolutions, plus a chat transcript log
//! - Optional retry decorator with backoff and a block-triggered breaker
//! - Thin axum gateway (`cedula_gateway` binary)
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cedula_lookup::{CsvAuditLog, Lookup, LookupConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LookupConfig::from_env()?;
//!     let audit = Arc::new(CsvAuditLog::new(&config.audit_path, &config.transcript_path));
//!     let lookup = Lookup::builder().with_config(config).with_audit_sink(audit).build()?;
//!     lookup.load_audit().await;
//!
//!     let result = lookup.lookup("1-2345-6789").await?;
//!     println!("{} -> {}", result.identifier, result.display_name);
//!     Ok(())
//! }
//! ```

mod lookup;

pub mod config;
pub mod gateway;
pub mod modules;
pub mod transport;

pub use crate::lookup::{
    Lookup,
    LookupBuilder,
    LookupError,
    LookupOutcome,
    LookupResult,
    LookupSource,
    QUERY_FIELD,
    UpstreamFailure,
    classify,
};

pub use crate::config::{ConfigError, GatewayConfig, LookupConfig, RetryConfig};

pub use crate::transport::{
    RegistryRequest,
    RegistryResponse,
    RegistryTransport,
    ReqwestTransport,
    TransportError,
};

pub use crate::modules::{
    AuditSink,
    AuditSource,
    CsvAuditLog,
    DelayWindow,
    EgressRange,
    EvasionProfile,
    EvasionProfileSelector,
    EventHandler,
    FingerprintTag,
    Identifier,
    IdentifierError,
    LookupEvent,
    LookupStats,
    MemoryAuditLog,
    ResultCache,
    RetryingLookup,
    extract_display_name,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
