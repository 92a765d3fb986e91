//! HTTP client for a JSON probe service.
//!
//! Endpoints (all `POST`, JSON in and out):
//! - `{base_url}/probe/field` - `FieldProbeRequest` -> `FieldProbeResponse`
//! - `{base_url}/probe/incident` - `IncidentProbeRequest` -> `IncidentProbeResponse`
//! - `{base_url}/summaries` - `SummaryRequest` -> `{ "summary": "..." }`

use async_trait::async_trait;
use dossier_core::{
    FieldProbeRequest, FieldProbeResponse, FieldProber, IncidentProbeRequest,
    IncidentProbeResponse, IncidentProber, ProbeError, SummaryGenerator, SummaryRequest,
};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

const PROVIDER: &str = "http";

/// Connection settings for the probe service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for ProbeClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8700/v1".to_string(),
            timeout: Duration::from_secs(10),
            api_key: None,
        }
    }
}

impl ProbeClientConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `DOSSIER_PROBE_URL`: service base URL (default: http://localhost:8700/v1)
    /// - `DOSSIER_PROBE_TIMEOUT_MS`: per-request timeout (default: 10000)
    /// - `DOSSIER_PROBE_API_KEY`: bearer token (default: none)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            base_url: std::env::var("DOSSIER_PROBE_URL")
                .ok()
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty())
                .unwrap_or(defaults.base_url),
            timeout: std::env::var("DOSSIER_PROBE_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            api_key: std::env::var("DOSSIER_PROBE_API_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    summary: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Probe service client implementing all three probe contracts.
pub struct HttpProbeClient {
    client: Client,
    config: ProbeClientConfig,
}

impl HttpProbeClient {
    pub fn new(config: ProbeClientConfig) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProbeError::RequestFailed {
                provider: PROVIDER.to_string(),
                status: 0,
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, ProbeError> {
        Self::new(ProbeClientConfig::from_env())
    }

    /// POST a JSON body and decode the JSON reply.
    async fn post<Req: Serialize + ?Sized, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> Result<Res, ProbeError> {
        let url = format!("{}/{}", self.config.base_url, endpoint);
        tracing::debug!(url = %url, "Sending probe request");

        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout {
                    provider: PROVIDER.to_string(),
                    timeout_ms: self.config.timeout.as_millis() as u64,
                }
            } else {
                ProbeError::RequestFailed {
                    provider: PROVIDER.to_string(),
                    status: 0,
                    message: format!("HTTP request failed: {}", e),
                }
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|e| ProbeError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to parse response: {}", e),
            });
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let error = error_from_status(status, &error_text);
        tracing::warn!(url = %url, status = status.as_u16(), error = %error, "Probe request failed");
        Err(error)
    }
}

/// Map a non-success reply to a probe error. A service error code in the
/// body wins over the bare status.
fn error_from_status(status: StatusCode, body: &str) -> ProbeError {
    let parsed = serde_json::from_str::<ApiError>(body).ok();
    if let Some(code) = parsed.as_ref().and_then(|e| e.code.clone()) {
        return ProbeError::Service { code };
    }
    if status == StatusCode::GATEWAY_TIMEOUT || status == StatusCode::REQUEST_TIMEOUT {
        return ProbeError::Timeout {
            provider: PROVIDER.to_string(),
            timeout_ms: 0,
        };
    }
    ProbeError::RequestFailed {
        provider: PROVIDER.to_string(),
        status: status.as_u16(),
        message: parsed
            .and_then(|e| e.message)
            .unwrap_or_else(|| body.to_string()),
    }
}

#[async_trait]
impl FieldProber for HttpProbeClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn probe_field(
        &self,
        request: &FieldProbeRequest,
    ) -> Result<FieldProbeResponse, ProbeError> {
        self.post("probe/field", request).await
    }
}

#[async_trait]
impl IncidentProber for HttpProbeClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn next_prompt(
        &self,
        request: &IncidentProbeRequest,
    ) -> Result<IncidentProbeResponse, ProbeError> {
        self.post("probe/incident", request).await
    }
}

#[async_trait]
impl SummaryGenerator for HttpProbeClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn summarize_instance(&self, request: &SummaryRequest) -> Result<String, ProbeError> {
        let response: SummaryResponse = self.post("summaries", request).await?;
        if response.summary.trim().is_empty() {
            return Err(ProbeError::SummaryFailed {
                reason: "empty summary".to_string(),
            });
        }
        Ok(response.summary)
    }
}

impl std::fmt::Debug for HttpProbeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProbeClient")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .field("api_key", &self.config.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_code_wins() {
        let err = error_from_status(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"code": "RATE_LIMIT", "message": "slow down"}"#,
        );
        assert_eq!(
            err,
            ProbeError::Service {
                code: "RATE_LIMIT".to_string()
            }
        );
    }

    #[test]
    fn test_gateway_timeout_maps_to_timeout() {
        let err = error_from_status(StatusCode::GATEWAY_TIMEOUT, "");
        assert!(matches!(err, ProbeError::Timeout { .. }));
    }

    #[test]
    fn test_plain_failure_keeps_status_and_message() {
        let err = error_from_status(StatusCode::BAD_GATEWAY, r#"{"message": "upstream down"}"#);
        assert_eq!(
            err,
            ProbeError::RequestFailed {
                provider: "http".to_string(),
                status: 502,
                message: "upstream down".to_string(),
            }
        );
        let raw = error_from_status(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(matches!(raw, ProbeError::RequestFailed { status: 500, ref message, .. } if message == "boom"));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let client = HttpProbeClient::new(ProbeClientConfig {
            api_key: Some("secret-token".to_string()),
            ..ProbeClientConfig::default()
        })
        .unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn test_default_config() {
        let config = ProbeClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.api_key.is_none());
    }
}
