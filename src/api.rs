//! Remote search API client

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::proto::PROTOBUF_CONTENT_TYPE;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::ACCEPT;
use tracing::debug;

/// Remote search capability: one request per query, protobuf-encoded response
#[async_trait]
pub trait RemoteSearch: Send + Sync {
    async fn search(&self, q: &str) -> Result<Bytes, ClientError>;
}

/// `GET {endpoint}?q=<query>` with `Accept: application/protobuf`
pub struct HttpSearchApi {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSearchApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, &config.api_url))
    }

    pub fn with_client(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl RemoteSearch for HttpSearchApi {
    async fn search(&self, q: &str) -> Result<Bytes, ClientError> {
        debug!(query = q, endpoint = %self.endpoint, "remote search");
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", q)])
            .header(ACCEPT, PROTOBUF_CONTENT_TYPE)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Network(format!(
                "Search failed: HTTP {}",
                response.status()
            )));
        }

        Ok(response.bytes().await?)
    }
}
