use common::Retryable;
use faststr::FastStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("A streaming request is already in progress")]
    Busy,
    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("HTTP error! status: {0}")]
    HttpStatus(u16),
    #[error("No reader available")]
    NoBody,
    #[error("Reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("Invalid utf-8 in stream: {0}")]
    Decode(#[from] std::str::Utf8Error),
    #[error("Stream error: {0}")]
    Stream(FastStr),
    #[error("Invalid request: {0}")]
    Request(#[from] common::error::Error),
    #[error("faild to build client")]
    FailedToBuildClient,
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::HttpStatus(_) | Self::ReqwestError(_) | Self::Stream(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
