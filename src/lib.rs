//! Remote Converter Client Library
//!
//! This library submits document conversion requests to a remote conversion
//! server and delivers the results asynchronously. Jobs carry a client-side
//! priority that decides the order in which a bounded worker pool sends them.
//!
//! ## Module Overview
//!
//! - `config`: Endpoint and worker pool configuration
//! - `converter`: The `RemoteConverter` facade and its builder
//! - `engine`: Priority-ordered worker pool and job handles
//! - `job`: Job identifiers, priorities and lifecycle records
//! - `probe`: Handshake with the conversion server
//! - `queue`: Priority queue of waiting jobs
//! - `remote`: HTTP transport to the conversion server
//! - `source`: Document sources and result consumers
//! - `stage`: Staged job construction
//! - `telemetry`: OpenTelemetry integration and structured logging
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use remote_converter::{converter::RemoteConverter, job::Priority};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> remote_converter::error::Result<()> {
//!     remote_converter::telemetry::init_tracing();
//!
//!     let converter = RemoteConverter::builder()
//!         .base_uri("http://localhost:9998")
//!         .request_timeout(Duration::from_secs(30))
//!         .build()
//!         .await?;
//!
//!     let handle = converter
//!         .convert_file("/tmp/report.docx")
//!         .to_file("/tmp/report.pdf")
//!         .prioritize_with(Priority::HIGH)
//!         .schedule()?;
//!
//!     let converted = handle.wait().await?;
//!     assert!(converted);
//!
//!     converter.shut_down();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod converter;
pub mod engine;
pub mod error;
pub mod job;
pub mod probe;
pub mod queue;
pub mod remote;
pub mod source;
pub mod stage;
pub mod telemetry;
