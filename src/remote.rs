//! Transport to the remote conversion server.

use crate::config::EndpointConfig;
use crate::error::{ConverterError, Result};
use crate::probe::{ServerInfo, RESOURCE_PATH};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

/// Outcome of a conversion request the server answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionReply {
    /// The converted document.
    Converted(Bytes),
    /// The server refused the document as unconvertible.
    Rejected { status: u16 },
}

/// Remote calls issued by the converter.
///
/// [`HttpConversionService`] is the production implementation; the seam lets
/// callers plug in their own transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversionService: Send + Sync {
    /// Fetches the server's operational status and protocol version.
    async fn server_info(&self) -> Result<ServerInfo>;

    /// Sends a document and returns the server's answer.
    async fn convert(&self, payload: Bytes) -> Result<ConversionReply>;

    /// Human-readable location of the service, used in diagnostics.
    fn endpoint(&self) -> String;
}

/// reqwest-based client for the conversion server's HTTP interface.
pub struct HttpConversionService {
    client: Client,
    resource_url: Url,
}

impl HttpConversionService {
    /// Creates a client whose every request is bounded by the configured timeout.
    pub fn new(config: &EndpointConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                ConverterError::configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            resource_url: config.resource_url(RESOURCE_PATH),
        })
    }
}

#[async_trait]
impl ConversionService for HttpConversionService {
    async fn server_info(&self) -> Result<ServerInfo> {
        let response = self
            .client
            .get(self.resource_url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(server_error(status, response).await);
        }

        Ok(response.json::<ServerInfo>().await?)
    }

    async fn convert(&self, payload: Bytes) -> Result<ConversionReply> {
        debug!(url = %self.resource_url, bytes = payload.len(), "Sending conversion request");

        let response = self
            .client
            .post(self.resource_url.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let output = response.bytes().await?;
            debug!(bytes = output.len(), "Received converted document");
            Ok(ConversionReply::Converted(output))
        } else if is_rejection(status) {
            Ok(ConversionReply::Rejected {
                status: status.as_u16(),
            })
        } else {
            Err(server_error(status, response).await)
        }
    }

    fn endpoint(&self) -> String {
        self.resource_url.to_string()
    }
}

/// Statuses by which the server refuses a document it cannot convert.
fn is_rejection(status: StatusCode) -> bool {
    status == StatusCode::UNPROCESSABLE_ENTITY || status == StatusCode::UNSUPPORTED_MEDIA_TYPE
}

async fn server_error(status: StatusCode, response: reqwest::Response) -> ConverterError {
    let body = response.text().await.unwrap_or_default();
    ConverterError::Server {
        status: status.as_u16(),
        message: body.chars().take(200).collect(),
    }
}
