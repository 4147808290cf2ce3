use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{SourceKind, TranscriptRequest, TranscriptResult, TranscriptSource};
use crate::config::RemoteProxyConfig;
use crate::SourceError;

/// Transcript source backed by a remote extraction proxy service.
///
/// The proxy runs with its own network identity, which is the point: it can
/// reach the upstream platform from an address that is not ours. Optionally
/// the adapter itself egresses through a configured proxy URL.
pub struct RemoteProxyAdapter {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

/// Wire format of the proxy's transcript endpoint
#[derive(Debug, Deserialize)]
struct ProxyResponse {
    success: bool,
    transcript: Option<String>,
    #[allow(dead_code)]
    length: Option<u64>,
    error: Option<String>,
}

/// Wire format of the proxy's health endpoint
#[derive(Debug, Deserialize)]
struct ProxyHealth {
    status: String,
    #[allow(dead_code)]
    uptime: Option<f64>,
}

impl RemoteProxyAdapter {
    pub fn new(config: &RemoteProxyConfig) -> crate::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.settings.timeout_ms));

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| anyhow::anyhow!("Invalid egress proxy URL {}: {}", proxy_url, e))?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_ms: config.settings.timeout_ms,
        })
    }

    fn transcript_url(&self, request: &TranscriptRequest) -> String {
        format!(
            "{}/transcript/{}?lang={}",
            self.base_url,
            request.video_id(),
            urlencoding::encode(request.preferred_language())
        )
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
impl TranscriptSource for RemoteProxyAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::RemoteProxy
    }

    async fn available(&self) -> bool {
        true
    }

    async fn fetch(&self, request: &TranscriptRequest) -> Result<TranscriptResult, SourceError> {
        let url = self.transcript_url(request);
        tracing::debug!(video_id = request.video_id(), %url, "querying remote proxy");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Network(format!(
                "Proxy returned HTTP {}",
                status
            )));
        }

        let body: ProxyResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Network(format!("Malformed proxy response: {}", e)))?;

        if !body.success {
            return Err(SourceError::NoTranscriptAvailable(
                body.error
                    .unwrap_or_else(|| "proxy reported no transcript".to_string()),
            ));
        }

        match body.transcript {
            Some(text) if !text.trim().is_empty() => Ok(TranscriptResult::new(
                text,
                SourceKind::RemoteProxy,
                request.preferred_language().to_string(),
                false,
            )),
            _ => Err(SourceError::NoTranscriptAvailable(
                "proxy returned an empty transcript".to_string(),
            )),
        }
    }

    async fn probe(&self) -> Result<(), SourceError> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            return Err(SourceError::Network(format!(
                "Proxy health endpoint returned HTTP {}",
                response.status()
            )));
        }

        let health: ProxyHealth = response
            .json()
            .await
            .map_err(|e| SourceError::Network(format!("Malformed health response: {}", e)))?;

        if health.status.eq_ignore_ascii_case("ok")
            || health.status.eq_ignore_ascii_case("healthy")
        {
            Ok(())
        } else {
            Err(SourceError::Network(format!(
                "Proxy reports status '{}'",
                health.status
            )))
        }
    }
}
