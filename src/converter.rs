//! Client facade for a remote conversion server.

use crate::config::{EndpointConfig, EndpointConfigBuilder};
use crate::engine::Engine;
use crate::error::Result;
use crate::probe::{HandshakeProbe, ServerInfo};
use crate::remote::{ConversionService, HttpConversionService};
use crate::source::{DocumentSource, FileSource};
use crate::stage::SourceSpecified;
use crate::telemetry::Telemetry;
use reqwest::Url;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Converter that delegates conversions to a remote server.
///
/// Owns the endpoint configuration and the worker pool. Jobs are created with
/// [`convert`](Self::convert) and executed in priority order. Dropping the
/// converter shuts it down.
pub struct RemoteConverter {
    config: EndpointConfig,
    engine: Engine,
    probe: HandshakeProbe,
}

impl RemoteConverter {
    /// Creates a new builder instance.
    pub fn builder() -> RemoteConverterBuilder {
        RemoteConverterBuilder::default()
    }

    /// Creates a converter with default configuration.
    pub async fn make(base_uri: impl Into<String>) -> Result<Self> {
        Self::builder().base_uri(base_uri).build().await
    }

    /// Starts a job converting the given document.
    pub fn convert(&self, source: impl DocumentSource + 'static) -> SourceSpecified {
        SourceSpecified::new(self.engine.clone(), Arc::new(source))
    }

    /// Starts a job converting the file at `path`, read when the job runs.
    pub fn convert_file(&self, path: impl Into<PathBuf>) -> SourceSpecified {
        self.convert(FileSource::new(path))
    }

    /// True if the converter accepts jobs and the server reports itself
    /// operational. Never fails; errors are logged and reported as `false`.
    pub async fn is_operational(&self) -> bool {
        !self.engine.is_shut_down() && self.probe.is_operational().await
    }

    /// Fetches the server's current status report.
    pub async fn server_info(&self) -> Result<ServerInfo> {
        self.probe.fetch().await
    }

    /// Stops accepting jobs and cancels queued ones. Running jobs finish.
    ///
    /// Calling it again has no effect.
    pub fn shut_down(&self) {
        if self.engine.shut_down() {
            info!(
                "Remote converter has shut down successfully (URI: {})",
                self.config.base_uri()
            );
        }
    }

    /// Waits until all workers have exited. Returns only after [`shut_down`](Self::shut_down).
    pub async fn await_termination(&self) {
        self.engine.await_termination().await;
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Number of jobs waiting for a worker.
    pub fn queued_jobs(&self) -> usize {
        self.engine.queue_length()
    }

    /// Number of live workers, between the core and maximum pool size.
    pub fn active_workers(&self) -> usize {
        self.engine.worker_count()
    }
}

impl Drop for RemoteConverter {
    fn drop(&mut self) {
        self.shut_down();
    }
}

/// Builder for [`RemoteConverter`].
///
/// Endpoint settings are validated by [`build`](Self::build); see
/// [`EndpointConfigBuilder`].
#[derive(Default)]
pub struct RemoteConverterBuilder {
    endpoint: EndpointConfigBuilder,
    telemetry: Option<Telemetry>,
    service: Option<Arc<dyn ConversionService>>,
}

impl RemoteConverterBuilder {
    /// Starts from settings loaded by [`EndpointConfigBuilder::from_env`].
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            endpoint: EndpointConfigBuilder::from_env()?,
            ..Self::default()
        })
    }

    pub fn base_uri(mut self, uri: impl Into<String>) -> Self {
        self.endpoint = self.endpoint.base_uri(uri);
        self
    }

    pub fn base_url(mut self, url: Url) -> Self {
        self.endpoint = self.endpoint.base_url(url);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.endpoint = self.endpoint.request_timeout(timeout);
        self
    }

    pub fn core_pool_size(mut self, size: usize) -> Self {
        self.endpoint = self.endpoint.core_pool_size(size);
        self
    }

    pub fn maximum_pool_size(mut self, size: usize) -> Self {
        self.endpoint = self.endpoint.maximum_pool_size(size);
        self
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.endpoint = self.endpoint.keep_alive(keep_alive);
        self
    }

    /// Telemetry sink handed to every component. Defaults to [`Telemetry::global`].
    pub fn telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Replaces the HTTP transport.
    pub fn service(mut self, service: Arc<dyn ConversionService>) -> Self {
        self.service = Some(service);
        self
    }

    /// Validates the configuration, starts the worker pool and probes the
    /// server once for diagnostics.
    ///
    /// An unreachable server does not fail construction; it only shows up in
    /// the log and in later [`RemoteConverter::is_operational`] calls.
    pub async fn build(self) -> Result<RemoteConverter> {
        let config = self.endpoint.build()?;
        let telemetry = self.telemetry.unwrap_or_default();
        let service = match self.service {
            Some(service) => service,
            None => Arc::new(HttpConversionService::new(&config)?),
        };

        let engine = Engine::start(*config.pool(), Arc::clone(&service), telemetry.clone())?;
        let probe = HandshakeProbe::new(service, telemetry);
        probe.log_server_information().await;

        info!(
            "Remote converter has started successfully (URI: {})",
            config.base_uri()
        );

        Ok(RemoteConverter {
            config,
            engine,
            probe,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConverterError;
    use crate::job::Priority;
    use crate::probe::CURRENT_PROTOCOL_VERSION;
    use crate::remote::{ConversionReply, MockConversionService};
    use bytes::Bytes;
    use std::io;
    use std::sync::Mutex;

    fn mock_service(server_info: Result<ServerInfo>) -> MockConversionService {
        let mut service = MockConversionService::new();
        service
            .expect_server_info()
            .returning(move || server_info.clone());
        service
            .expect_endpoint()
            .returning(|| "mock://converter".to_string());
        service
            .expect_convert()
            .returning(|payload| Ok(ConversionReply::Converted(payload)));
        service
    }

    fn operational(protocol_version: u32) -> Result<ServerInfo> {
        Ok(ServerInfo {
            operational: true,
            timeout: 60_000,
            protocol_version,
        })
    }

    async fn converter_with(service: MockConversionService) -> RemoteConverter {
        RemoteConverter::builder()
            .base_uri("http://localhost:9998")
            .core_pool_size(1)
            .maximum_pool_size(2)
            .service(Arc::new(service))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_build_requires_base_uri() {
        let result = RemoteConverter::builder().build().await;
        assert!(matches!(result, Err(ConverterError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_zero_request_timeout_is_rejected() {
        let result = RemoteConverter::builder()
            .base_uri("http://localhost:9998")
            .request_timeout(Duration::from_secs(0))
            .build()
            .await;
        assert!(matches!(result, Err(ConverterError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_construction_survives_unreachable_server() {
        let converter = converter_with(mock_service(Err(ConverterError::network(
            "connection refused",
        ))))
        .await;

        assert!(!converter.is_operational().await);
    }

    #[tokio::test]
    async fn test_protocol_mismatch_still_operational() {
        let converter = converter_with(mock_service(operational(CURRENT_PROTOCOL_VERSION + 1))).await;

        assert!(converter.is_operational().await);
        assert_eq!(
            converter.server_info().await.unwrap().protocol_version,
            CURRENT_PROTOCOL_VERSION + 1
        );
    }

    #[tokio::test]
    async fn test_convert_to_consumer() {
        let converter = converter_with(mock_service(operational(CURRENT_PROTOCOL_VERSION))).await;
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);

        let handle = converter
            .convert(Bytes::from_static(b"document"))
            .to(move |output: Bytes| -> io::Result<()> {
                sink.lock().unwrap().push(output);
                Ok(())
            })
            .prioritize_with(Priority::HIGH)
            .schedule()
            .unwrap();

        assert_eq!(handle.wait().await, Ok(true));
        assert_eq!(
            received.lock().unwrap().as_slice(),
            &[Bytes::from_static(b"document")]
        );
    }

    #[tokio::test]
    async fn test_shut_down_is_idempotent_and_final() {
        let converter = converter_with(mock_service(operational(CURRENT_PROTOCOL_VERSION))).await;
        let job = converter
            .convert(Bytes::from_static(b"late"))
            .to(|_: Bytes| -> io::Result<()> { Ok(()) });

        converter.shut_down();
        converter.shut_down();

        assert!(!converter.is_operational().await);
        assert!(matches!(
            job.schedule(),
            Err(ConverterError::IllegalState(_))
        ));
        tokio::time::timeout(Duration::from_secs(5), converter.await_termination())
            .await
            .expect("workers did not stop");
    }

    #[tokio::test]
    async fn test_is_operational_skips_probe_after_shutdown() {
        let mut service = MockConversionService::new();
        service.expect_server_info().times(1).returning(|| operational(1));
        service
            .expect_endpoint()
            .returning(|| "mock://converter".to_string());
        let converter = converter_with(service).await;

        // The only server_info call was the startup probe.
        converter.shut_down();
        assert!(!converter.is_operational().await);
    }
}
