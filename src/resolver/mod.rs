use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::cache::CacheStore;
use crate::config::{Config, SourceSettings};
use crate::retry::RetryPolicy;
use crate::sources::cloud_api::CloudApiAdapter;
use crate::sources::local_process::LocalProcessAdapter;
use crate::sources::remote_proxy::RemoteProxyAdapter;
use crate::sources::{SourceKind, TranscriptRequest, TranscriptResult, TranscriptSource};
use crate::{ResolverError, SourceError};

/// Per-call knobs for `get_transcript`
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Ordered language preferences
    pub languages: Vec<String>,

    /// Overall deadline for the whole fallback chain
    pub max_wait: Duration,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string()],
            max_wait: Duration::from_secs(60),
        }
    }
}

/// Health of one source
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub source: SourceKind,
    pub state: HealthState,
    pub last_error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unavailable,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "healthy"),
            HealthState::Degraded => write!(f, "degraded"),
            HealthState::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Aggregate health across every source
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub sources: Vec<HealthStatus>,
}

struct SourceSlot {
    source: Box<dyn TranscriptSource>,
    settings: SourceSettings,
}

/// Orchestrator sequencing cache lookup, prioritized source fallback, and
/// cache population.
///
/// Constructed once at startup and shared by reference; per-call state lives
/// in the request. Source calls are strictly sequential: parallel fan-out
/// would multiply cost and rate-limit exposure across metered sources for no
/// latency benefit when the first source usually succeeds.
pub struct TranscriptResolver {
    cache: CacheStore,
    sources: Vec<SourceSlot>,
}

impl std::fmt::Debug for TranscriptResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptResolver")
            .field("sources", &self.sources.len())
            .finish_non_exhaustive()
    }
}

impl TranscriptResolver {
    /// Build the resolver from configuration.
    ///
    /// Fails loudly when no source ends up enabled; that is a startup
    /// misconfiguration, never a per-call empty result.
    pub fn new(config: &Config) -> crate::Result<Self> {
        let cache = match &config.cache.path {
            Some(path) => CacheStore::open(path, config.cache.ttl_seconds)?,
            None => CacheStore::open_default(config.cache.ttl_seconds)?,
        };
        Self::with_cache(config, cache)
    }

    /// Build the resolver against an explicit cache store
    pub fn with_cache(config: &Config, cache: CacheStore) -> crate::Result<Self> {
        let mut slots: Vec<SourceSlot> = Vec::new();

        let proxy_cfg = &config.sources.remote_proxy;
        if proxy_cfg.settings.enabled {
            slots.push(SourceSlot {
                source: Box::new(RemoteProxyAdapter::new(proxy_cfg)?),
                settings: proxy_cfg.settings.clone(),
            });
        }

        let cloud_cfg = &config.sources.cloud_api;
        if cloud_cfg.settings.enabled {
            if cloud_cfg.api_key.is_some() {
                slots.push(SourceSlot {
                    source: Box::new(CloudApiAdapter::new(cloud_cfg)?),
                    settings: cloud_cfg.settings.clone(),
                });
            } else {
                tracing::info!("cloud API source disabled: no credential configured");
            }
        }

        let local_cfg = &config.sources.local_process;
        if local_cfg.settings.enabled {
            slots.push(SourceSlot {
                source: Box::new(LocalProcessAdapter::new(local_cfg)),
                settings: local_cfg.settings.clone(),
            });
        }

        Self::from_parts(cache, slots)
    }

    fn from_parts(cache: CacheStore, mut slots: Vec<SourceSlot>) -> crate::Result<Self> {
        slots.retain(|slot| slot.settings.enabled);
        slots.sort_by_key(|slot| slot.settings.priority);

        if slots.is_empty() {
            return Err(ResolverError::NoSourcesEnabled.into());
        }

        Ok(Self {
            cache,
            sources: slots,
        })
    }

    /// Names of the configured sources in fallback order
    pub fn source_kinds(&self) -> Vec<SourceKind> {
        self.sources.iter().map(|s| s.source.kind()).collect()
    }

    /// Resolve the transcript for a video id.
    ///
    /// Returns `Ok(None)` when no source can produce a transcript; that is
    /// the ordinary "no captions" outcome, not an error. `Err` is reserved
    /// for malformed input.
    pub async fn get_transcript(
        &self,
        video_id: &str,
        options: ResolveOptions,
    ) -> crate::Result<Option<TranscriptResult>> {
        let request = TranscriptRequest::new(video_id, options.languages, options.max_wait)?;
        let request_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let key = crate::utils::cache_key(video_id);

        if let Some(entry) = self.cache.get(&key).await {
            tracing::info!(request_id = %request_id, video_id, "cache hit");
            return Ok(Some(entry.to_result()));
        }

        let deadline = Instant::now() + request.max_wait();
        let mut failures: Vec<(SourceKind, SourceError)> = Vec::new();

        for (position, slot) in self.sources.iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::warn!(request_id = %request_id, video_id, "deadline spent before trying all sources");
                break;
            }

            let kind = slot.source.kind();
            if !slot.source.available().await {
                tracing::info!(request_id = %request_id, video_id, source = %kind, "source unavailable, skipping");
                continue;
            }

            // Split the remaining deadline evenly across the sources still
            // ahead so a slow source cannot starve the ones behind it.
            let sources_left = (self.sources.len() - position) as u32;
            let budget = remaining / sources_left;

            let policy = RetryPolicy::new(
                slot.settings.retry_attempts,
                Duration::from_millis(slot.settings.backoff_base_ms),
            );

            tracing::debug!(
                request_id = %request_id,
                video_id,
                source = %kind,
                budget_ms = budget.as_millis() as u64,
                attempts = policy.attempts(),
                "trying source"
            );

            let attempt = policy.run(kind.as_str(), || slot.source.fetch(&request));
            let outcome = tokio::time::timeout(budget, attempt).await;

            match outcome {
                Ok(Ok(result)) if !result.text.trim().is_empty() => {
                    tracing::info!(
                        request_id = %request_id,
                        video_id,
                        source = %kind,
                        length = result.length_chars,
                        "transcript resolved"
                    );
                    self.cache.put(&key, video_id, &result).await;
                    return Ok(Some(result));
                }
                Ok(Ok(_)) => {
                    failures.push((
                        kind,
                        SourceError::NoTranscriptAvailable("empty transcript".to_string()),
                    ));
                }
                Ok(Err(e)) => {
                    failures.push((kind, e));
                }
                Err(_) => {
                    failures.push((kind, SourceError::Timeout(budget.as_millis() as u64)));
                }
            }
        }

        for (kind, error) in &failures {
            tracing::warn!(request_id = %request_id, video_id, source = %kind, error = %error, "source failed");
        }
        tracing::info!(request_id = %request_id, video_id, "no source produced a transcript");
        Ok(None)
    }

    /// Probe every configured source and aggregate the verdict.
    ///
    /// Probes are lightweight liveness checks, never full extractions.
    pub async fn health_check(&self) -> HealthReport {
        let mut statuses = Vec::with_capacity(self.sources.len());
        let mut healthy = 0usize;

        for slot in &self.sources {
            let kind = slot.source.kind();
            let checked_at = Utc::now();

            let status = match slot.source.probe().await {
                Ok(()) => {
                    healthy += 1;
                    HealthStatus {
                        source: kind,
                        state: HealthState::Healthy,
                        last_error: None,
                        checked_at,
                    }
                }
                Err(SourceError::RateLimited(msg)) => HealthStatus {
                    source: kind,
                    state: HealthState::Degraded,
                    last_error: Some(msg),
                    checked_at,
                },
                Err(e) => HealthStatus {
                    source: kind,
                    state: HealthState::Unavailable,
                    last_error: Some(e.to_string()),
                    checked_at,
                },
            };
            statuses.push(status);
        }

        // One healthy source is enough to serve requests
        let status = if healthy > 0 {
            HealthState::Healthy
        } else {
            HealthState::Unavailable
        };

        HealthReport {
            status,
            sources: statuses,
        }
    }
}
