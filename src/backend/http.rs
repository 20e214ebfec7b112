//! HTTP implementation of [`ProbeService`]
//!
//! Every operation is a JSON `POST` to the configured path. Failures are
//! classified so the UI can tell a network outage from a missing probe or
//! a request the service refused.

use super::api::{
    CompileRequest, CompileResponse, ConnectRequest, ConnectResponse, EraseRequest, EraseResponse,
    ErrorBody, FlashRequest, FlashResponse,
};
use super::service::ProbeService;
use crate::config::{ServiceConfig, ServicePaths};
use crate::error::{ConsoleError, OperationKind, RemoteFailure, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Probe service reached over HTTP
pub struct HttpProbeService {
    client: reqwest::Client,
    base_url: String,
    paths: ServicePaths,
}

impl HttpProbeService {
    /// Create a client for the configured service
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        url::Url::parse(&config.base_url).map_err(|e| {
            ConsoleError::Config(format!("Invalid service base_url '{}': {}", config.base_url, e))
        })?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("probescope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConsoleError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            paths: config.paths.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    async fn send<B>(
        &self,
        operation: OperationKind,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = self.endpoint(path);
        debug!("POST {} ({})", url, operation);

        let mut request = self.client.post(&url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = status_error(operation, status, &text);
            warn!("{}", err);
            return Err(err);
        }
        Ok(response)
    }

    async fn post<B, R>(&self, operation: OperationKind, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let response = self.send(operation, path, Some(body)).await?;
        response.json::<R>().await.map_err(|e| {
            ConsoleError::remote(
                operation,
                RemoteFailure::Rejected,
                format!("invalid response from probe service: {}", e),
            )
        })
    }
}

#[async_trait]
impl ProbeService for HttpProbeService {
    async fn connect(&self, request: &ConnectRequest) -> Result<ConnectResponse> {
        self.post(OperationKind::Connect, &self.paths.connect, request)
            .await
    }

    async fn disconnect(&self) -> Result<()> {
        // The acknowledgement body carries nothing we need
        self.send::<()>(OperationKind::Disconnect, &self.paths.disconnect, None)
            .await?;
        Ok(())
    }

    async fn compile(&self, request: &CompileRequest) -> Result<CompileResponse> {
        self.post(OperationKind::Build, &self.paths.compile, request)
            .await
    }

    async fn flash(&self, request: &FlashRequest) -> Result<FlashResponse> {
        self.post(OperationKind::Flash, &self.paths.flash, request)
            .await
    }

    async fn erase(&self, request: &EraseRequest) -> Result<EraseResponse> {
        self.post(OperationKind::Erase, &self.paths.erase, request)
            .await
    }
}

fn transport_error(operation: OperationKind, err: reqwest::Error) -> ConsoleError {
    let message = if err.is_timeout() {
        format!("probe service did not answer: {}", err)
    } else if err.is_connect() {
        format!("cannot reach probe service: {}", err)
    } else {
        err.to_string()
    };
    ConsoleError::remote(operation, RemoteFailure::Network, message)
}

/// Build the error for a non-success HTTP status
fn status_error(operation: OperationKind, status: StatusCode, body: &str) -> ConsoleError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .text()
        .map(str::to_string)
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| status.to_string());

    ConsoleError::Remote {
        operation,
        kind: classify_failure(status, &message),
        message,
        diagnostics: parsed.compile_output,
    }
}

/// Classify a failed HTTP response
pub fn classify_failure(status: StatusCode, message: &str) -> RemoteFailure {
    let lower = message.to_ascii_lowercase();
    let mentions_probe = lower.contains("probe not found")
        || lower.contains("no probe")
        || lower.contains("no debug probe")
        || lower.contains("probe not connected");

    if mentions_probe || status == StatusCode::NOT_FOUND {
        RemoteFailure::ProbeNotFound
    } else if matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    ) {
        RemoteFailure::Network
    } else {
        RemoteFailure::Rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_failure() {
        assert_eq!(
            classify_failure(StatusCode::BAD_REQUEST, "No probe found on USB"),
            RemoteFailure::ProbeNotFound
        );
        assert_eq!(
            classify_failure(StatusCode::NOT_FOUND, "not found"),
            RemoteFailure::ProbeNotFound
        );
        assert_eq!(
            classify_failure(StatusCode::SERVICE_UNAVAILABLE, "upstream down"),
            RemoteFailure::Network
        );
        assert_eq!(
            classify_failure(StatusCode::UNPROCESSABLE_ENTITY, "unknown chip family"),
            RemoteFailure::Rejected
        );
    }

    #[test]
    fn test_status_error_keeps_compile_output() {
        let err = status_error(
            OperationKind::Build,
            StatusCode::BAD_REQUEST,
            r#"{"error":"Compilation failed","compileOutput":"main.c:3:1: error: oops"}"#,
        );
        match err {
            ConsoleError::Remote {
                operation,
                kind,
                message,
                diagnostics,
            } => {
                assert_eq!(operation, OperationKind::Build);
                assert_eq!(kind, RemoteFailure::Rejected);
                assert_eq!(message, "Compilation failed");
                assert_eq!(diagnostics.as_deref(), Some("main.c:3:1: error: oops"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_status_error_plain_text_body() {
        let err = status_error(
            OperationKind::Flash,
            StatusCode::INTERNAL_SERVER_ERROR,
            "verify failed at 0x08000400",
        );
        assert!(err.to_string().contains("verify failed at 0x08000400"));
    }

    #[test]
    fn test_endpoint_join() {
        let mut config = ServiceConfig::default();
        config.base_url = "http://probe.local:9000/".to_string();
        let service = HttpProbeService::new(&config).unwrap();
        assert_eq!(
            service.endpoint("/api/debug/connect"),
            "http://probe.local:9000/api/debug/connect"
        );
        assert_eq!(service.endpoint("erase"), "http://probe.local:9000/erase");
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = ServiceConfig::default();
        config.base_url = "::nope".to_string();
        assert!(HttpProbeService::new(&config).is_err());
    }
}
