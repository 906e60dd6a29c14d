/// Integration tests for the remote converter client.
///
/// These tests run the real HTTP transport against a mock conversion server
/// and verify the complete path from job construction through the worker pool
/// to the result consumer.
///
/// ## Running Tests
///
/// ```bash
/// cargo test --test remote_converter_test
/// ```

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use remote_converter::{
        converter::RemoteConverter,
        error::ConverterError,
        job::{JobStatus, Priority},
        probe::CURRENT_PROTOCOL_VERSION,
    };
    use serde_json::json;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::NamedTempFile;
    use tracing_subscriber::fmt::MakeWriter;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn conversion_server(protocol_version: u32) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/converter"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "operational": true,
                "timeout": 120000,
                "protocolVersion": protocol_version,
            })))
            .mount(&server)
            .await;
        server
    }

    async fn respond_to_conversions(server: &MockServer, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/converter"))
            .respond_with(response)
            .mount(server)
            .await;
    }

    async fn converter_for(server: &MockServer) -> RemoteConverter {
        RemoteConverter::builder()
            .base_uri(server.uri())
            .core_pool_size(1)
            .maximum_pool_size(1)
            .request_timeout(Duration::from_secs(5))
            .build()
            .await
            .unwrap()
    }

    fn ignore_output(_: Bytes) -> io::Result<()> {
        Ok(())
    }

    /// Collects everything the fmt subscriber writes.
    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl LogCapture {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    impl io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogCapture {
        type Writer = LogCapture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Test a document travelling to the server and back into a file.
    #[tokio::test]
    async fn test_convert_document_to_file() -> anyhow::Result<()> {
        let server = conversion_server(CURRENT_PROTOCOL_VERSION).await;
        respond_to_conversions(
            &server,
            ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 converted".to_vec()),
        )
        .await;
        let converter = converter_for(&server).await;
        let target = NamedTempFile::new()?;

        let handle = converter
            .convert(Bytes::from_static(b"word document"))
            .to_file(target.path())
            .schedule()?;

        assert!(handle.wait().await?);
        assert_eq!(handle.status(), JobStatus::Completed);
        assert_eq!(std::fs::read(target.path())?, b"%PDF-1.7 converted");

        let requests = server.received_requests().await.unwrap_or_default();
        let upload = requests
            .iter()
            .find(|r| r.method.as_str() == "POST")
            .expect("no conversion request");
        assert_eq!(upload.body, b"word document");
        assert_eq!(
            upload.headers.get("content-type").and_then(|v| v.to_str().ok()),
            Some("application/octet-stream")
        );
        Ok(())
    }

    /// Test that queued jobs reach the server highest priority first.
    #[tokio::test]
    async fn test_jobs_dispatched_by_priority() -> anyhow::Result<()> {
        let server = conversion_server(CURRENT_PROTOCOL_VERSION).await;
        respond_to_conversions(&server, ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .await;
        let converter = converter_for(&server).await;

        // No await between the schedule calls: all jobs are queued before the
        // single worker runs.
        let mut handles = Vec::new();
        for (payload, priority) in [("p1", 1), ("p10", 10), ("p5", 5)] {
            handles.push(
                converter
                    .convert(Bytes::from_static(payload.as_bytes()))
                    .to(ignore_output)
                    .prioritize_with(priority)
                    .schedule()?,
            );
        }
        for handle in &handles {
            assert!(handle.wait().await?);
        }

        let bodies: Vec<String> = server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.method.as_str() == "POST")
            .map(|r| String::from_utf8_lossy(&r.body).to_string())
            .collect();
        assert_eq!(bodies, vec!["p10", "p5", "p1"]);
        Ok(())
    }

    /// Test that a protocol mismatch is logged but not fatal.
    #[tokio::test]
    async fn test_protocol_mismatch_logs_warning() {
        let server = conversion_server(CURRENT_PROTOCOL_VERSION + 1).await;
        let capture = LogCapture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let converter = converter_for(&server).await;

        let logs = capture.contents();
        assert!(logs.contains("WARN"), "logs: {logs}");
        assert!(
            logs.contains("does not match client protocol version"),
            "logs: {logs}"
        );
        assert!(converter.is_operational().await);
    }

    /// Test that an unreachable server never fails construction or probing.
    #[tokio::test]
    async fn test_unreachable_server() {
        let converter = RemoteConverter::builder()
            .base_uri("http://127.0.0.1:9")
            .request_timeout(Duration::from_secs(2))
            .build()
            .await
            .expect("construction must not depend on the server");

        assert!(!converter.is_operational().await);

        let result = converter
            .convert(Bytes::from_static(b"doc"))
            .to(ignore_output)
            .execute()
            .await;
        assert!(matches!(result, Err(ConverterError::Network(_))));
    }

    /// Test that server failures resolve the affected handle only.
    #[tokio::test]
    async fn test_server_error_surfaces_through_handle() {
        let server = conversion_server(CURRENT_PROTOCOL_VERSION).await;
        respond_to_conversions(&server, ResponseTemplate::new(500).set_body_string("boom")).await;
        let converter = converter_for(&server).await;

        let result = converter
            .convert(Bytes::from_static(b"doc"))
            .to(ignore_output)
            .execute()
            .await;

        assert_eq!(
            result,
            Err(ConverterError::Server {
                status: 500,
                message: "boom".to_string(),
            })
        );
        assert!(converter.is_operational().await);
    }

    /// Test that a rejected document resolves to `false`.
    #[tokio::test]
    async fn test_rejected_document() {
        let server = conversion_server(CURRENT_PROTOCOL_VERSION).await;
        respond_to_conversions(&server, ResponseTemplate::new(422)).await;
        let converter = converter_for(&server).await;

        let result = converter
            .convert(Bytes::from_static(b"corrupt"))
            .to(ignore_output)
            .prioritize_with(Priority::LOW)
            .execute()
            .await;

        assert_eq!(result, Ok(false));
    }

    /// Test that the request timeout bounds each remote call.
    #[tokio::test]
    async fn test_request_timeout() {
        let server = conversion_server(CURRENT_PROTOCOL_VERSION).await;
        respond_to_conversions(
            &server,
            ResponseTemplate::new(200).set_delay(Duration::from_secs(3)),
        )
        .await;
        let converter = RemoteConverter::builder()
            .base_uri(server.uri())
            .request_timeout(Duration::from_millis(200))
            .build()
            .await
            .unwrap();

        let result = converter
            .convert(Bytes::from_static(b"slow"))
            .to(ignore_output)
            .execute()
            .await;

        assert!(matches!(result, Err(ConverterError::Network(_))));
    }

    /// Test that the server is not probed once the converter is shut down.
    #[tokio::test]
    async fn test_not_operational_after_shutdown() {
        let server = conversion_server(CURRENT_PROTOCOL_VERSION).await;
        let converter = converter_for(&server).await;
        assert!(converter.is_operational().await);

        converter.shut_down();

        assert!(!converter.is_operational().await);
        let scheduled = converter
            .convert(Bytes::from_static(b"doc"))
            .to(ignore_output)
            .schedule();
        assert!(matches!(scheduled, Err(ConverterError::IllegalState(_))));
    }
}
