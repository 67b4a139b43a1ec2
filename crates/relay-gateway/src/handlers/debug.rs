use super::proxy::json_response;
use crate::diagnostics;
use crate::gateway::HttpGateway;
use reqwest::StatusCode;
use tracing::info;
use volo_http::{
    response::Response,
    server::route::{Router, get},
    utils::Extension,
};

async fn debug_handler(Extension(gateway): Extension<HttpGateway>) -> Response {
    let report = diagnostics::collect(&gateway.config().diagnostics).await;
    info!(
        env_vars = report.env_vars.len(),
        secrets = report.secrets_dir.len(),
        error = ?report.error,
        "environment diagnostics collected"
    );
    json_response(StatusCode::OK, &report)
}

pub fn debug_router() -> Router {
    Router::new().route("/api/debug", get(debug_handler))
}
