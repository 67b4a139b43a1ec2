use common::Retryable;
use faststr::FastStr;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Bootstrap and server errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid config {key}: {value}")]
    InvalidConfig { key: &'static str, value: FastStr },

    #[error("faild to build client: {0}")]
    FailedToBuildClient(reqwest::Error),

    #[error("server stopped: {0}")]
    Serve(FastStr),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyErrorKind {
    Validation,
    Unavailable,
    ConnectionRefused,
    Timeout,
    Upstream,
    Stream,
}

/// Everything that can end a relayed request early. Each variant knows the
/// HTTP status it surfaces as and whether the caller may try again.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Missing endpoint parameter")]
    MissingEndpoint,

    #[error("Request body is not a valid forward request: {0}")]
    InvalidRequest(FastStr),

    #[error("The backend server is not responding. Please ensure it is running.")]
    BackendUnavailable,

    #[error("Cannot connect to backend server at {0}. Is the server running?")]
    ConnectionRefused(FastStr),

    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Upstream request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Upstream returned {status}: {details}")]
    UpstreamStatus { status: StatusCode, details: FastStr },

    #[error("Invalid upstream response body: {0}")]
    InvalidUpstreamBody(#[from] serde_json::Error),

    #[error("Stream setup failed: {0}")]
    StreamSetup(&'static str),

    #[error("Stream error: {0}")]
    Stream(FastStr),

    #[error("Stream timeout after {}ms", .0.as_millis())]
    StreamTimeout(Duration),
}

pub type ProxyResult<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if is_connection_refused(&err) {
            let url = err
                .url()
                .map(|u| FastStr::from(u.to_string()))
                .unwrap_or_else(|| FastStr::from_static_str("backend"));
            return Self::ConnectionRefused(url);
        }
        Self::Request(err)
    }

    pub fn kind(&self) -> ProxyErrorKind {
        match self {
            Self::MissingEndpoint | Self::InvalidRequest(_) => ProxyErrorKind::Validation,
            Self::BackendUnavailable => ProxyErrorKind::Unavailable,
            Self::ConnectionRefused(_) => ProxyErrorKind::ConnectionRefused,
            Self::Timeout(_) => ProxyErrorKind::Timeout,
            Self::Request(_) | Self::UpstreamStatus { .. } | Self::InvalidUpstreamBody(_) => {
                ProxyErrorKind::Upstream
            }
            Self::StreamSetup(_) | Self::Stream(_) | Self::StreamTimeout(_) => {
                ProxyErrorKind::Stream
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingEndpoint | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::BackendUnavailable | Self::ConnectionRefused(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::UpstreamStatus { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Hint for the browser: can the same request succeed later?
    pub fn retry_hint(&self) -> bool {
        !matches!(
            self,
            Self::MissingEndpoint | Self::InvalidRequest(_) | Self::StreamSetup(_)
        )
    }

    pub fn to_body(&self) -> ErrorBody {
        let error = match self {
            Self::MissingEndpoint => "Missing endpoint parameter",
            Self::InvalidRequest(_) => "Invalid request body",
            Self::BackendUnavailable => "Backend service unavailable",
            _ => "Backend request failed",
        };
        ErrorBody {
            error:   error.into(),
            details: self.to_string().into(),
            retry:   self.retry_hint(),
        }
    }
}

impl Retryable for ProxyError {
    fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::MissingEndpoint
                | Self::InvalidRequest(_)
                | Self::BackendUnavailable
                | Self::ConnectionRefused(_)
                | Self::StreamSetup(_)
        )
    }
}

/// JSON shape of every failed relay response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error:   FastStr,
    pub details: FastStr,
    pub retry:   bool,
}

fn is_connection_refused(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = e.source();
    }
    false
}
