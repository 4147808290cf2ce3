//! Transcript Resolver - resolve YouTube transcripts across multiple extraction sources
//!
//! This library resolves the transcript text for a video id by trying several
//! independent extraction sources in priority order (remote proxy service,
//! hosted extraction API, local python subprocess) until one succeeds, caching
//! results with a TTL so repeated lookups never touch the network.

pub mod cache;
pub mod cli;
pub mod config;
pub mod output;
pub mod resolver;
pub mod retry;
pub mod sources;
pub mod utils;

pub use cache::CacheStore;
pub use config::Config;
pub use resolver::{HealthReport, HealthState, HealthStatus, ResolveOptions, TranscriptResolver};
pub use sources::{SourceKind, TranscriptRequest, TranscriptResult, TranscriptSource};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Errors produced by a single extraction source.
///
/// The resolver treats every variant identically when deciding to fall back
/// to the next source; the variants exist so the retry policy can tell
/// transient failures from definitive ones.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("Required dependency missing: {0}")]
    DependencyMissing(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited by source: {0}")]
    RateLimited(String),

    #[error("No transcript available: {0}")]
    NoTranscriptAvailable(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Malformed source response: {0}")]
    Parse(String),
}

impl SourceError {
    /// Whether retrying the same source could plausibly change the outcome.
    ///
    /// A definitive "no captions" answer never changes on retry; a missing
    /// dependency never appears mid-request.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Network(_)
            | SourceError::RateLimited(_)
            | SourceError::Timeout(_)
            | SourceError::Parse(_) => true,
            SourceError::NoTranscriptAvailable(_) | SourceError::DependencyMissing(_) => false,
        }
    }
}

/// Construction-time failures, reported loudly instead of being masked as
/// per-call empty results.
#[derive(thiserror::Error, Debug)]
pub enum ResolverError {
    #[error("Invalid video id '{0}': expected 11 characters of [A-Za-z0-9_-]")]
    InvalidVideoId(String),

    #[error("No transcript sources enabled; check configuration and credentials")]
    NoSourcesEnabled,
}
