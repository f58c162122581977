//! HTTP client for a remote gatekeeper.
//!
//! Wire API: `GET /version`, `GET /did/{did}` (optional `atTime` query),
//! `POST /did` with the signed operation as the JSON body. Errors come
//! back as non-2xx with a text body.

use crate::{Gatekeeper, GatekeeperError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mdip_core::{MdipDocument, Operation};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

/// Default per-call timeout.
const TIMEOUT: Duration = Duration::from_secs(30);

/// A gatekeeper reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGatekeeper {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SubmitResponse {
    did: String,
    /// False when the registry had already applied this operation.
    #[serde(default = "default_applied")]
    applied: bool,
}

fn default_applied() -> bool {
    true
}

impl HttpGatekeeper {
    /// Connect to a gatekeeper at `base_url` (e.g. `http://localhost:4224`).
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Protocol version reported by the gatekeeper.
    pub async fn version(&self) -> Result<u32> {
        let response = self
            .client
            .get(format!("{}/version", self.base_url))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn submit(&self, operation: &Operation) -> Result<SubmitResponse> {
        let response = self
            .client
            .post(format!("{}/did", self.base_url))
            .json(operation)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

/// Map non-2xx responses onto gatekeeper errors, preserving the text body.
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        Err(GatekeeperError::NotFound(body))
    } else if status.is_server_error() {
        Err(GatekeeperError::Unavailable(body))
    } else {
        Err(GatekeeperError::InvalidOperation(body))
    }
}

#[async_trait]
impl Gatekeeper for HttpGatekeeper {
    async fn create_did(&self, operation: &Operation) -> Result<String> {
        Ok(self.submit(operation).await?.did)
    }

    async fn resolve_did_at(
        &self,
        did: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<MdipDocument> {
        let mut url = format!("{}/did/{}", self.base_url, urlencoding::encode(did));
        if let Some(at) = at {
            url = format!("{}?atTime={}", url, urlencoding::encode(&at.to_rfc3339()));
        }

        let response = self.client.get(url).send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn update_did(&self, operation: &Operation) -> Result<bool> {
        Ok(self.submit(operation).await?.applied)
    }

    async fn delete_did(&self, operation: &Operation) -> Result<bool> {
        Ok(self.submit(operation).await?.applied)
    }
}
