use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{SourceKind, TranscriptRequest, TranscriptResult, TranscriptSource};
use crate::config::CloudApiConfig;
use crate::SourceError;

const API_KEY_HEADER: &str = "x-api-key";

/// Transcript source backed by a hosted extraction API.
///
/// Requires a stored credential; the resolver never constructs this adapter
/// when the credential is absent, so a missing key is a startup condition
/// rather than a per-request failure. Rate-limit responses are surfaced as
/// `RateLimited` so the retry policy can back off longer than it would for
/// a plain network error.
pub struct CloudApiAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
struct CloudResponse {
    transcript: Option<String>,
    language_code: Option<String>,
    #[serde(default)]
    is_generated: bool,
    error: Option<String>,
}

impl CloudApiAdapter {
    pub fn new(config: &CloudApiConfig) -> crate::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Cloud API adapter requires an API key"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.settings.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout_ms: config.settings.timeout_ms,
        })
    }

    fn map_status(&self, status: reqwest::StatusCode) -> Option<SourceError> {
        match status.as_u16() {
            200..=299 => None,
            401 | 403 => Some(SourceError::DependencyMissing(
                "Cloud API rejected the configured credential".to_string(),
            )),
            404 => Some(SourceError::NoTranscriptAvailable(
                "Cloud API has no transcript for this video".to_string(),
            )),
            429 => Some(SourceError::RateLimited(
                "Cloud API quota exceeded".to_string(),
            )),
            _ => Some(SourceError::Network(format!(
                "Cloud API returned HTTP {}",
                status
            ))),
        }
    }

    fn map_transport_error(&self, e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout(self.timeout_ms)
        } else {
            SourceError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl TranscriptSource for CloudApiAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::CloudApi
    }

    async fn available(&self) -> bool {
        true
    }

    async fn fetch(&self, request: &TranscriptRequest) -> Result<TranscriptResult, SourceError> {
        let url = format!(
            "{}/v1/transcript?video_id={}&lang={}",
            self.base_url,
            request.video_id(),
            urlencoding::encode(request.preferred_language())
        );
        tracing::debug!(video_id = request.video_id(), "querying cloud API");

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if let Some(err) = self.map_status(response.status()) {
            return Err(err);
        }

        let body: CloudResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("Malformed cloud API response: {}", e)))?;

        if let Some(error) = body.error {
            return Err(SourceError::NoTranscriptAvailable(error));
        }

        match body.transcript {
            Some(text) if !text.trim().is_empty() => {
                let language = body
                    .language_code
                    .unwrap_or_else(|| request.preferred_language().to_string());
                Ok(TranscriptResult::new(
                    text,
                    SourceKind::CloudApi,
                    language,
                    body.is_generated,
                ))
            }
            _ => Err(SourceError::NoTranscriptAvailable(
                "cloud API returned an empty transcript".to_string(),
            )),
        }
    }

    async fn probe(&self) -> Result<(), SourceError> {
        let url = format!("{}/v1/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        match self.map_status(response.status()) {
            // A quota-limited probe still proves the service is reachable
            None | Some(SourceError::RateLimited(_)) => Ok(()),
            Some(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceSettings;

    fn test_config(api_key: Option<&str>) -> CloudApiConfig {
        CloudApiConfig {
            base_url: "https://transcripts.example.com".to_string(),
            api_key: api_key.map(|k| k.to_string()),
            settings: SourceSettings {
                priority: 2,
                timeout_ms: 5000,
                retry_attempts: 2,
                backoff_base_ms: 100,
                enabled: true,
            },
        }
    }

    #[test]
    fn test_requires_credential() {
        assert!(CloudApiAdapter::new(&test_config(None)).is_err());
        assert!(CloudApiAdapter::new(&test_config(Some("key"))).is_ok());
    }

    #[test]
    fn test_status_mapping() {
        let adapter = CloudApiAdapter::new(&test_config(Some("key"))).unwrap();

        assert!(adapter.map_status(reqwest::StatusCode::OK).is_none());
        assert!(matches!(
            adapter.map_status(reqwest::StatusCode::TOO_MANY_REQUESTS),
            Some(SourceError::RateLimited(_))
        ));
        assert!(matches!(
            adapter.map_status(reqwest::StatusCode::NOT_FOUND),
            Some(SourceError::NoTranscriptAvailable(_))
        ));
        assert!(matches!(
            adapter.map_status(reqwest::StatusCode::UNAUTHORIZED),
            Some(SourceError::DependencyMissing(_))
        ));
        assert!(matches!(
            adapter.map_status(reqwest::StatusCode::BAD_GATEWAY),
            Some(SourceError::Network(_))
        ));
    }

    #[test]
    fn test_response_body_parses() {
        let body: CloudResponse = serde_json::from_str(
            r#"{"transcript": "hi there", "language_code": "en", "is_generated": true}"#,
        )
        .unwrap();
        assert_eq!(body.transcript.as_deref(), Some("hi there"));
        assert!(body.is_generated);
    }
}
