use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod cloud_api;
pub mod local_process;
pub mod remote_proxy;

use crate::{ResolverError, SourceError};

/// A single transcript lookup, constructed per call and discarded afterwards
#[derive(Debug, Clone)]
pub struct TranscriptRequest {
    video_id: String,
    language_preferences: Vec<String>,
    max_wait: Duration,
}

impl TranscriptRequest {
    /// Build a request, validating the video id up front.
    ///
    /// A malformed id is a programmer error, not a source failure, so it is
    /// rejected here rather than surfacing as an empty result later.
    pub fn new(
        video_id: &str,
        language_preferences: Vec<String>,
        max_wait: Duration,
    ) -> Result<Self, ResolverError> {
        if !crate::utils::is_valid_video_id(video_id) {
            return Err(ResolverError::InvalidVideoId(video_id.to_string()));
        }

        Ok(Self {
            video_id: video_id.to_string(),
            language_preferences: crate::utils::normalize_languages(&language_preferences),
            max_wait,
        })
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Ordered language preferences, never empty
    pub fn languages(&self) -> &[String] {
        &self.language_preferences
    }

    /// First language preference, used by sources that accept a single code
    pub fn preferred_language(&self) -> &str {
        &self.language_preferences[0]
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }
}

/// Which extraction source produced a transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    RemoteProxy,
    CloudApi,
    LocalProcess,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::RemoteProxy => "remote-proxy",
            SourceKind::CloudApi => "cloud-api",
            SourceKind::LocalProcess => "local-process",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A resolved transcript, produced by exactly one source and immutable
/// once constructed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    /// The transcript text
    pub text: String,

    /// Source that produced the text
    pub source: SourceKind,

    /// Language the transcript is in
    pub language_code: String,

    /// Whether the captions were auto-generated rather than human-authored
    pub is_auto_generated: bool,

    /// Text length in characters
    pub length_chars: usize,

    /// When the transcript was resolved
    pub resolved_at: DateTime<Utc>,
}

impl TranscriptResult {
    pub fn new(
        text: String,
        source: SourceKind,
        language_code: String,
        is_auto_generated: bool,
    ) -> Self {
        let length_chars = text.chars().count();
        Self {
            text,
            source,
            language_code,
            is_auto_generated,
            length_chars,
            resolved_at: Utc::now(),
        }
    }
}

/// Trait for transcript extraction sources
///
/// Each source is one strategy in the resolver's fallback chain; the
/// resolver interprets any `SourceError` identically regardless of which
/// source raised it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Which source this is
    fn kind(&self) -> SourceKind;

    /// Whether the source can be used at all.
    ///
    /// A source disabled by a missing credential or failed dependency probe
    /// is skipped by the resolver without being counted as a failure.
    async fn available(&self) -> bool;

    /// Fetch the transcript for a request
    async fn fetch(&self, request: &TranscriptRequest) -> Result<TranscriptResult, SourceError>;

    /// Lightweight liveness check, never a full extraction
    async fn probe(&self) -> Result<(), SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_rejects_malformed_id() {
        let err = TranscriptRequest::new("nope", vec![], Duration::from_secs(30));
        assert!(matches!(err, Err(ResolverError::InvalidVideoId(_))));
    }

    #[test]
    fn test_request_defaults_language() {
        let req =
            TranscriptRequest::new("dQw4w9WgXcQ", vec![], Duration::from_secs(30)).unwrap();
        assert_eq!(req.preferred_language(), "en");
    }

    #[test]
    fn test_result_counts_chars() {
        let result = TranscriptResult::new(
            "hello world".to_string(),
            SourceKind::LocalProcess,
            "en".to_string(),
            false,
        );
        assert_eq!(result.length_chars, 11);
    }
}
