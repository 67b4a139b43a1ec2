use crate::config::GatewayConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::health::{self, HEALTH_PATH};
use crate::tap::{self, OutboundFrame};
use crate::tools::join_url;
use crate::upstream::{HttpUpstream, Upstream, UpstreamRequest, UpstreamResponse};
use common::data::{ForwardRequest, Method};
use common::retry_with_backoff;
use faststr::FastStr;
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

/// What a successful forward hands back to the HTTP layer.
pub enum Relayed {
    Json { status: StatusCode, body: Value },
    Stream(RelayStream),
}

pub struct RelayStream {
    pub request_id: FastStr,
    pub frames:     Receiver<OutboundFrame>,
}

pub type HttpGateway = Gateway<HttpUpstream>;

pub struct Gateway<U> {
    upstream: Arc<U>,
    config:   Arc<GatewayConfig>,
}

impl<U> Clone for Gateway<U> {
    fn clone(&self) -> Self {
        Self {
            upstream: self.upstream.clone(),
            config:   self.config.clone(),
        }
    }
}

impl<U: Upstream> Gateway<U> {
    pub fn new(upstream: U, config: GatewayConfig) -> Self {
        Self {
            upstream: Arc::new(upstream),
            config:   Arc::new(config),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Validate, health-check, forward with retries, then either buffer the
    /// JSON reply or hand back a live re-stream of the upstream body.
    pub async fn forward(&self, request: ForwardRequest, request_id: &FastStr) -> ProxyResult<Relayed> {
        let body_size = request.body().to_string().len();
        info!(
            request_id = %request_id,
            endpoint = ?request.endpoint,
            method = %request.method,
            is_streaming = request.is_streaming,
            body_size,
            "request details"
        );
        let Some(endpoint) = request.endpoint() else {
            warn!(request_id = %request_id, "missing endpoint parameter");
            return Err(ProxyError::MissingEndpoint);
        };

        let url = join_url(&self.config.backend_base_url, endpoint);
        info!(request_id = %request_id, url = %url, "forwarding to backend");

        let health = health::check(
            self.upstream.as_ref(),
            &self.config.backend_base_url,
            self.config.health_timeout,
            request_id,
        )
        .await;
        info!(request_id = %request_id, healthy = health.healthy, "health check result");
        if !health.healthy {
            return Err(ProxyError::BackendUnavailable);
        }

        let method = request.method;
        let payload = match method {
            Method::Post => Some(request.body()),
            Method::Get => None,
        };
        let payload = payload.as_ref();
        let url = url.as_str();
        let mut response = retry_with_backoff(&self.config.retry, |attempt| {
            self.attempt(UpstreamRequest { url, method, body: payload }, attempt, request_id)
        })
        .await?;

        if endpoint == HEALTH_PATH {
            return Ok(Relayed::Json {
                status: StatusCode::OK,
                body:   json!({
                    "status": response.status.as_u16(),
                    "ok": response.status.is_success(),
                }),
            });
        }

        if request.is_streaming {
            let Some(upstream_body) = response.take_body() else {
                return Err(ProxyError::StreamSetup("response body is missing or already taken"));
            };
            info!(
                request_id = %request_id,
                status = response.status.as_u16(),
                "setting up streaming response"
            );
            let frames = tap::spawn(request_id.clone(), upstream_body, self.config.stream_timeout);
            return Ok(Relayed::Stream(RelayStream {
                request_id: request_id.clone(),
                frames,
            }));
        }

        let status = response.status;
        let body = response.json().await?;
        info!(request_id = %request_id, status = status.as_u16(), "returning JSON response");
        Ok(Relayed::Json { status, body })
    }

    async fn attempt(
        &self,
        request: UpstreamRequest<'_>,
        attempt: u32,
        request_id: &str,
    ) -> ProxyResult<UpstreamResponse> {
        let started = Instant::now();
        debug!(
            request_id = %request_id,
            attempt = attempt + 1,
            "starting {} request to: {}",
            request.method,
            request.url
        );
        let fetch_timeout = self.config.fetch_timeout;
        let response = match timeout(fetch_timeout, self.upstream.send(request)).await {
            Ok(response) => response?,
            Err(_) => {
                warn!(
                    request_id = %request_id,
                    url = %request.url,
                    "request timed out after {}ms",
                    fetch_timeout.as_millis()
                );
                return Err(ProxyError::Timeout(fetch_timeout));
            }
        };
        info!(
            request_id = %request_id,
            method = %request.method,
            status = response.status.as_u16(),
            ok = response.status.is_success(),
            duration_ms = started.elapsed().as_millis() as u64,
            "fetch response received"
        );
        if !response.status.is_success() {
            let status = response.status;
            let details = response.text().await;
            return Err(ProxyError::UpstreamStatus { status, details });
        }
        Ok(response)
    }
}
