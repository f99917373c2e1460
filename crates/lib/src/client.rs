//! Client for a running controller (http://127.0.0.1:8081 by default).
//! Non-2xx responses that still carry the `{status, message}` body are returned as-is,
//! so callers see the captured command output on failures too.

use serde::Serialize;
use std::time::Duration;

use crate::api::ApiResponse;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8081";

/// Longest operation (deploy, 5m by default) plus slack.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(360);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("controller request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("controller returned {status} without a JSON body: {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Serialize)]
struct ChannelBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
}

/// `POST /chaincode/deploy` body. Optional fields are omitted so the server applies defaults.
#[derive(Debug, Clone, Serialize)]
pub struct DeployParams {
    pub name: String,
    pub path: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// `POST /chaincode/invoke` and `/chaincode/query` body.
#[derive(Debug, Clone, Serialize)]
pub struct CallParams {
    pub channel: String,
    pub chaincode: String,
    pub function: String,
    pub args: Vec<String>,
}

#[derive(Clone)]
pub struct ControllerClient {
    base_url: String,
    client: reqwest::Client,
}

impl ControllerClient {
    pub fn new(base_url: Option<String>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    fn with_timeout(base_url: Option<String>, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, client })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<ApiResponse, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.post(&url);
        if let Some(b) = body {
            req = req.json(b);
        }
        let res = req.send().await?;
        let status = res.status();
        let text = res.text().await?;
        serde_json::from_str(&text).map_err(|_| ClientError::Api {
            status: status.as_u16(),
            body: text,
        })
    }

    /// POST /network/up
    pub async fn network_up(&self) -> Result<ApiResponse, ClientError> {
        self.post::<()>("/network/up", None).await
    }

    /// POST /network/down
    pub async fn network_down(&self) -> Result<ApiResponse, ClientError> {
        self.post::<()>("/network/down", None).await
    }

    /// POST /channel/create; None lets the server pick the default channel.
    pub async fn create_channel(&self, channel: Option<&str>) -> Result<ApiResponse, ClientError> {
        self.post("/channel/create", Some(&ChannelBody { channel }))
            .await
    }

    pub async fn deploy(&self, params: &DeployParams) -> Result<ApiResponse, ClientError> {
        self.post("/chaincode/deploy", Some(params)).await
    }

    pub async fn invoke(&self, params: &CallParams) -> Result<ApiResponse, ClientError> {
        self.post("/chaincode/invoke", Some(params)).await
    }

    pub async fn query(&self, params: &CallParams) -> Result<ApiResponse, ClientError> {
        self.post("/chaincode/query", Some(params)).await
    }
}
