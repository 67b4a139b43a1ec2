use crate::error::{Error, Result};
use bytes::Bytes;
use common::data::ForwardRequest;
use faststr::FastStr;
use futures_util::{StreamExt, stream::BoxStream};
use reqwest::{
    Client as ReqwestClient, StatusCode,
    header::{ACCEPT, CACHE_CONTROL, CONNECTION},
};
use std::time::Duration;

pub type ByteStream = BoxStream<'static, Result<Bytes>>;

const CONNECT_TIMEOUT: u64 = 10;

pub struct TransportResponse {
    pub status: StatusCode,
    pub body:   Option<ByteStream>,
}

impl TransportResponse {
    pub fn new(status: StatusCode, body: ByteStream) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }
}

/// How a turn reaches the relay gateway.
pub trait Transport: Send + Sync + 'static {
    /// Posts `request` and resolves once the response headers are in.
    fn post(
        &self,
        request: &ForwardRequest,
    ) -> impl Future<Output = Result<TransportResponse>> + Send;
}

#[derive(Clone)]
pub struct HttpTransport {
    client:      ReqwestClient,
    gateway_url: FastStr,
}

impl HttpTransport {
    pub fn new(gateway_url: impl Into<FastStr>) -> Result<Self> {
        let client = ReqwestClient::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT))
            .build()
            .map_err(|_| Error::FailedToBuildClient)?;
        Ok(Self::with_client(client, gateway_url))
    }

    pub fn with_client(client: ReqwestClient, gateway_url: impl Into<FastStr>) -> Self {
        Self {
            client,
            gateway_url: gateway_url.into(),
        }
    }

    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }
}

impl Transport for HttpTransport {
    async fn post(&self, request: &ForwardRequest) -> Result<TransportResponse> {
        let res = self
            .client
            .post(self.gateway_url.as_str())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .header(CONNECTION, "keep-alive")
            .json(request)
            .send()
            .await?;
        let status = res.status();
        let body = res.bytes_stream().map(|chunk| Ok(chunk?)).boxed();
        Ok(TransportResponse::new(status, body))
    }
}
