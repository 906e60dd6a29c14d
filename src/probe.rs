//! Handshake with the conversion server.
//!
//! The probe asks the server for its operational status, its own request
//! timeout and the protocol version it speaks. Version skew is logged but
//! never fatal: rejecting an incompatible payload is the server's job.

use crate::error::{ConverterError, Result};
use crate::remote::ConversionService;
use crate::telemetry::Telemetry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Resource path of the converter below the configured base URI.
pub const RESOURCE_PATH: &str = "converter";

/// Protocol version this client speaks.
pub const CURRENT_PROTOCOL_VERSION: u32 = 1;

/// Status report of the conversion server. Fetched fresh on every probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub operational: bool,
    /// Server-side conversion timeout in milliseconds.
    pub timeout: u64,
    pub protocol_version: u32,
}

impl ServerInfo {
    /// Compares the server's protocol version with [`CURRENT_PROTOCOL_VERSION`].
    pub fn check_protocol(&self) -> Result<()> {
        if self.protocol_version == CURRENT_PROTOCOL_VERSION {
            Ok(())
        } else {
            Err(ConverterError::ProtocolMismatch {
                server: self.protocol_version,
                client: CURRENT_PROTOCOL_VERSION,
            })
        }
    }
}

/// Synchronous status request against the conversion server.
#[derive(Clone)]
pub struct HandshakeProbe {
    service: Arc<dyn ConversionService>,
    telemetry: Telemetry,
}

impl HandshakeProbe {
    pub fn new(service: Arc<dyn ConversionService>, telemetry: Telemetry) -> Self {
        Self { service, telemetry }
    }

    /// Fetches the current server information.
    pub async fn fetch(&self) -> Result<ServerInfo> {
        let result = self.service.server_info().await;
        self.telemetry.record_probe(&self.service.endpoint(), &result);
        result
    }

    /// Fetches and logs the server information for diagnostics.
    ///
    /// Never fails: an unreachable server only produces a warning.
    pub async fn log_server_information(&self) -> Option<ServerInfo> {
        match self.fetch().await {
            Ok(server_info) => {
                info!("Currently operational @ conversion server: {}", server_info.operational);
                info!("Request timeout @ conversion server: {} ms", server_info.timeout);
                info!("Protocol version @ conversion server: {}", server_info.protocol_version);
                if let Err(e) = server_info.check_protocol() {
                    warn!("{}", e);
                }
                Some(server_info)
            }
            Err(e) => {
                warn!(
                    endpoint = %self.service.endpoint(),
                    error = %e,
                    "Cannot connect to remote converter"
                );
                None
            }
        }
    }

    /// Reports whether the server is reachable and operational.
    ///
    /// Any failure is logged and reported as `false`.
    pub async fn is_operational(&self) -> bool {
        match self.fetch().await {
            Ok(server_info) => server_info.operational,
            Err(e) => {
                info!(
                    endpoint = %self.service.endpoint(),
                    error = %e,
                    "Remote converter is not operational"
                );
                false
            }
        }
    }
}
