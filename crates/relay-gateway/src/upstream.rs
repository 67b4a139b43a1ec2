use crate::error::{ProxyError, ProxyResult};
use crate::tools::build_http_client;
use bytes::{Bytes, BytesMut};
use common::data::Method;
use faststr::FastStr;
use futures_util::{StreamExt, stream::BoxStream};
use reqwest::{
    Client as ReqwestClient, StatusCode,
    header::{CONNECTION, CONTENT_TYPE},
};
use serde_json::Value;

pub type ByteStream = BoxStream<'static, ProxyResult<Bytes>>;

#[derive(Debug, Clone, Copy)]
pub struct UpstreamRequest<'a> {
    pub url:    &'a str,
    pub method: Method,
    /// Only sent for POST.
    pub body:   Option<&'a Value>,
}

pub struct UpstreamResponse {
    pub status: StatusCode,
    /// `None` once the body has been handed off to a reader.
    pub body:   Option<ByteStream>,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, body: ByteStream) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    pub fn take_body(&mut self) -> Option<ByteStream> {
        self.body.take()
    }

    pub async fn bytes(mut self) -> ProxyResult<Bytes> {
        let Some(mut body) = self.take_body() else {
            return Ok(Bytes::new());
        };
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    pub async fn json(self) -> ProxyResult<Value> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Best effort body text, used for error details.
    pub async fn text(self) -> FastStr {
        match self.bytes().await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned().into(),
            Err(e) => e.to_string().into(),
        }
    }
}

/// The chat backend as seen from the relay.
pub trait Upstream: Send + Sync + 'static {
    /// GET `url`, returning whatever status came back.
    fn probe(&self, url: &str) -> impl Future<Output = ProxyResult<StatusCode>> + Send;

    /// One forward attempt. Resolves once response headers are in; the body
    /// is left unread.
    fn send(
        &self,
        request: UpstreamRequest<'_>,
    ) -> impl Future<Output = ProxyResult<UpstreamResponse>> + Send;
}

#[derive(Clone)]
pub struct HttpUpstream {
    client: ReqwestClient,
}

impl HttpUpstream {
    pub fn new() -> crate::error::Result<Self> {
        Ok(Self {
            client: build_http_client()?,
        })
    }
}

impl Upstream for HttpUpstream {
    async fn probe(&self, url: &str) -> ProxyResult<StatusCode> {
        let res = self
            .client
            .get(url)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(ProxyError::from_reqwest)?;
        Ok(res.status())
    }

    async fn send(&self, request: UpstreamRequest<'_>) -> ProxyResult<UpstreamResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url),
            Method::Post => self.client.post(request.url),
        };
        builder = builder
            .header(CONTENT_TYPE, "application/json")
            .header(CONNECTION, "keep-alive");
        if let (Method::Post, Some(body)) = (request.method, request.body) {
            builder = builder.json(body);
        }
        let res = builder.send().await.map_err(ProxyError::from_reqwest)?;
        let status = res.status();
        let body = res
            .bytes_stream()
            .map(|chunk| chunk.map_err(ProxyError::from_reqwest))
            .boxed();
        Ok(UpstreamResponse::new(status, body))
    }
}
