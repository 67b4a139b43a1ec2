use crate::error::{Error, Result};
use faststr::FastStr;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Display;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[serde(alias = "get")]
    Get,
    #[default]
    #[serde(alias = "post")]
    Post,
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// What the browser-side client posts to the relay: routing fields plus an
/// opaque payload that is forwarded to the upstream as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint:     Option<FastStr>,
    #[serde(default)]
    pub method:       Method,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(flatten)]
    pub payload:      Map<String, Value>,
}

impl ForwardRequest {
    pub fn new<T>(endpoint: T, method: Method, is_streaming: bool) -> Self
    where
        T: Into<FastStr>,
    {
        Self {
            endpoint: Some(endpoint.into()),
            method,
            is_streaming,
            payload: Map::new(),
        }
    }

    /// Replaces the payload with the fields of `body`, which must serialize
    /// to a JSON object.
    pub fn with_payload<B: Serialize>(mut self, body: &B) -> Result<Self> {
        match serde_json::to_value(body)? {
            Value::Object(map) => {
                self.payload = map;
                Ok(self)
            }
            other => Err(Error::PayloadNotObject(other.to_string().into())),
        }
    }

    /// The target path, if present and non-empty.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref().filter(|e| !e.is_empty())
    }

    pub fn body(&self) -> Value {
        Value::Object(self.payload.clone())
    }
}
