//! Gateway client for attested queries
//!
//! Fetching an attestation has no bridge-side effects until its result is
//! pinned or submitted, so callers may retry freely.

use std::time::Duration;

use serde::Serialize;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::error::{BridgeError, Result};
use crate::types::Attestation;

/// Response header carrying the gateway's JSON attestation.
pub const ATTESTATION_HEADER: &str = "graph-attestation";

#[derive(Serialize)]
struct GatewayRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

/// Raw response text plus the signed attestation that binds it to the query.
///
/// The body is kept verbatim: its content hash must reproduce the
/// attestation's response CID downstream.
#[derive(Debug, Clone)]
pub struct AttestedResponse {
    pub attestation: Attestation,
    pub response: String,
}

pub struct GatewayClient {
    endpoint: String,
    client: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
    request_timeout: Duration,
}

impl GatewayClient {
    pub fn new(endpoint: &str, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()?,
            max_retries,
            retry_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// POST `query` to the gateway and return the attested response,
    /// retrying transient failures with linear backoff.
    pub async fn fetch_attested_response(&self, query: &str) -> Result<AttestedResponse> {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            debug!("Gateway attempt {}/{} to {}", attempt, self.max_retries, self.endpoint);

            match timeout(self.request_timeout, self.execute_query(query)).await {
                Ok(Ok(result)) => {
                    if attempt > 1 {
                        info!("Gateway request succeeded on attempt {}", attempt);
                    }
                    return Ok(result);
                }
                Ok(Err(e)) => {
                    warn!("Gateway request failed on attempt {}: {}", attempt, e);
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!("Gateway request timed out on attempt {}", attempt);
                    last_error = Some(BridgeError::Gateway("request timeout".to_string()));
                }
            }

            if attempt < self.max_retries {
                let delay = self.retry_delay * attempt;
                debug!("Waiting {:?} before retry...", delay);
                sleep(delay).await;
            }
        }

        error!("Gateway request failed after {} attempts", self.max_retries);
        Err(last_error
            .unwrap_or_else(|| BridgeError::Gateway("all retry attempts failed".to_string())))
    }

    async fn execute_query(&self, query: &str) -> Result<AttestedResponse> {
        let request = GatewayRequest {
            query,
            variables: serde_json::json!({}),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());

            if status.as_u16() >= 502 && status.as_u16() <= 504 {
                return Err(BridgeError::Gateway(format!(
                    "gateway busy ({}): {}",
                    status, error_text
                )));
            }
            return Err(BridgeError::Gateway(format!(
                "HTTP error ({}): {}",
                status, error_text
            )));
        }

        let header = response
            .headers()
            .get(ATTESTATION_HEADER)
            .ok_or_else(|| {
                BridgeError::Gateway(format!("response carries no {} header", ATTESTATION_HEADER))
            })?
            .to_str()
            .map_err(|e| BridgeError::Gateway(format!("attestation header is not text: {}", e)))?
            .to_string();
        let attestation: Attestation = serde_json::from_str(&header)?;

        let body = response.text().await?;
        Ok(AttestedResponse {
            attestation,
            response: body,
        })
    }
}
