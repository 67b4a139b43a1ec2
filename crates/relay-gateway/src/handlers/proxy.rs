use crate::error::ProxyError;
use crate::gateway::{HttpGateway, Relayed};
use bytes::Bytes;
use common::{data::ForwardRequest, request_id};
use http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE, TRANSFER_ENCODING};
use reqwest::StatusCode;
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use volo_http::{
    body::Body,
    response::Response,
    server::{
        IntoResponse,
        route::{Router, post},
    },
    utils::Extension,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const ACCEL_BUFFERING_HEADER: &str = "x-accel-buffering";

async fn proxy_handler(Extension(gateway): Extension<HttpGateway>, body: Bytes) -> Response {
    let request_id = request_id();
    info!(request_id = %request_id, "proxy request received");
    let req = match parse_request(&body) {
        Ok(req) => req,
        Err(err) => {
            warn!(request_id = %request_id, error = %err, "rejecting request body");
            return error_response(&err);
        }
    };
    match gateway.forward(req, &request_id).await {
        Ok(relayed) => relayed_response(relayed),
        Err(err) => {
            error!(
                request_id = %request_id,
                kind = ?err.kind(),
                status = err.status().as_u16(),
                error = %err,
                "relay failed"
            );
            error_response(&err)
        }
    }
}

/// Parsed by hand so a malformed body still gets the `{error, details,
/// retry}` shape.
pub fn parse_request(body: &[u8]) -> Result<ForwardRequest, ProxyError> {
    serde_json::from_slice(body).map_err(|e| ProxyError::InvalidRequest(e.to_string().into()))
}

pub fn proxy_router() -> Router {
    Router::new().route("/api/proxy", post(proxy_handler))
}

pub fn relayed_response(relayed: Relayed) -> Response {
    match relayed {
        Relayed::Json { status, body } => json_response(status, &body),
        Relayed::Stream(stream) => {
            let body = Body::from_stream(ReceiverStream::new(stream.frames));
            let res = http::Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "text/event-stream")
                .header(CACHE_CONTROL, "no-cache, no-transform")
                .header(CONNECTION, "keep-alive")
                .header(TRANSFER_ENCODING, "chunked")
                .header(ACCEL_BUFFERING_HEADER, "no")
                .header(REQUEST_ID_HEADER, stream.request_id.as_str())
                .body(body);
            match res {
                Ok(res) => {
                    info!(request_id = %stream.request_id, "stream response created");
                    res
                }
                Err(e) => {
                    error!(request_id = %stream.request_id, "failed to build stream response: {e}");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        }
    }
}

pub fn error_response(err: &ProxyError) -> Response {
    json_response(err.status(), &err.to_body())
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    let text = match serde_json::to_string(body) {
        Ok(text) => text,
        Err(e) => {
            error!("failed to serialize response body: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    http::Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(text))
        .unwrap_or_else(|e| {
            error!("failed to build json response: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}
