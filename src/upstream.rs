//! HTTP client for the Selin knowledge-base API.
//!
//! Every tool call becomes one `POST /mcp/call`. The upstream answers with an
//! envelope of text blocks and an error flag, which is unwrapped here so the
//! dispatcher only ever sees `Result<String>`.

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

const CALL_PATH: &str = "mcp/call";
const HEALTH_PATH: &str = "health";

/// Upper bound for the startup health check, independent of the tool-call timeout
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
struct CallRequest<'a> {
    name: &'a str,
    arguments: &'a HashMap<String, Value>,
}

/// The upstream's uniform response wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamEnvelope {
    // Omitted by the upstream when false
    #[serde(rename = "isError", default)]
    pub is_error: bool,
    // Only the first block is read; later blocks may be of any type
    pub content: Vec<Value>,
}

impl UpstreamEnvelope {
    /// Extract the first text block, or the upstream's error message.
    pub fn into_text(self) -> Result<String> {
        let first = self.content.into_iter().next().ok_or_else(|| {
            Error::MalformedResponse("envelope has no content blocks".to_string())
        })?;
        let text = match first {
            Value::Object(mut block) => match block.remove("text") {
                Some(Value::String(text)) => text,
                _ => {
                    return Err(Error::MalformedResponse(
                        "first content block has no text".to_string(),
                    ))
                }
            },
            _ => {
                return Err(Error::MalformedResponse(
                    "first content block is not an object".to_string(),
                ))
            }
        };

        if self.is_error {
            Err(Error::UpstreamTool(text))
        } else {
            Ok(text)
        }
    }
}

/// Status document served by the upstream's `/health` endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub tools: Vec<String>,
}

pub struct UpstreamClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        // Keep any path prefix when joining endpoint paths
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("selin-mcp/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.api_base, config.timeout())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid upstream URL: {}", e)))
    }

    fn classify(err: reqwest::Error, timeout: Duration) -> Error {
        if err.is_timeout() {
            Error::UpstreamTimeout(timeout)
        } else {
            Error::Http(err)
        }
    }

    async fn check_status(response: Response, timeout: Duration) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .map_err(|e| Self::classify(e, timeout))?;
        Err(Error::UpstreamHttp {
            status: status.as_u16(),
            body,
        })
    }

    /// Forward one tool call and unwrap the envelope.
    pub async fn call(
        &self,
        discriminator: &str,
        arguments: &HashMap<String, Value>,
    ) -> Result<String> {
        let url = self.endpoint(CALL_PATH)?;
        let request = CallRequest {
            name: discriminator,
            arguments,
        };
        debug!("POST {} name={}", url, discriminator);

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::classify(e, self.timeout))?;
        let response = Self::check_status(response, self.timeout).await?;
        let body = response
            .text()
            .await
            .map_err(|e| Self::classify(e, self.timeout))?;

        let envelope: UpstreamEnvelope = serde_json::from_str(&body)
            .map_err(|e| Error::MalformedResponse(e.to_string()))?;
        envelope.into_text()
    }

    /// Query the upstream health endpoint, bounded by [`HEALTH_TIMEOUT`].
    pub async fn health(&self) -> Result<HealthStatus> {
        let url = self.endpoint(HEALTH_PATH)?;
        let timeout = self.timeout.min(HEALTH_TIMEOUT);
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::classify(e, timeout))?;
        let response = Self::check_status(response, timeout).await?;
        let body = response
            .text()
            .await
            .map_err(|e| Self::classify(e, timeout))?;
        serde_json::from_str(&body).map_err(|e| Error::MalformedResponse(e.to_string()))
    }
}
