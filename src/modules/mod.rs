//! Building blocks of the lookup pipeline.
//!
//! Identifier normalization, evasion profiles, pacing, the result cache, the
//! audit trail, event hooks and the optional retry decorator.

pub mod audit;
pub mod cache;
pub mod evasion;
pub mod events;
pub mod identifier;
pub mod pacing;
pub mod retry;

// Re-export commonly used types
pub use audit::{
    AuditError, AuditRecord, AuditSink, AuditSource, ChatTranscriptRecord, CsvAuditLog,
    MemoryAuditLog, UNKNOWN_NAME, extract_display_name,
};
pub use cache::{CacheEntry, DEFAULT_TTL, ResultCache};
pub use evasion::{
    EgressRange, EvasionError, EvasionProfile, EvasionProfileSelector, FingerprintTag,
};
pub use events::{
    AuditEvent, CacheEvent, EventDispatcher, EventHandler, FailureEvent, LoggingHandler,
    LookupEvent, LookupStats, QueryEvent, RetryEvent, StatsSnapshot, WarmUpEvent,
};
pub use identifier::{Identifier, IdentifierError};
pub use pacing::{Backoff, DelayWindow, DelayWindowError};
pub use retry::RetryingLookup;
