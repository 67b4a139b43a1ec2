use faststr::FastStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("serde error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("payload must be a JSON object, got: {0}")]
    PayloadNotObject(FastStr),
}

pub type Result<T> = std::result::Result<T, Error>;
