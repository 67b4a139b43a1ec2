pub use common::logging_stdout;
use error::{Error, Result};
use std::net::SocketAddr;
use tracing::info;
use volo_http::Address;
use volo_http::server::{Router, Server};
use volo_http::utils::Extension;

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod health;
pub mod tap;
pub mod tools;
pub mod upstream;

pub use config::GatewayConfig;
pub use gateway::{Gateway, HttpGateway, Relayed};
pub use upstream::HttpUpstream;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub async fn run_relay_gateway(gateway: HttpGateway) -> Result<()> {
    let addr: SocketAddr = gateway.config().listen_addr;
    let app = Router::new()
        .merge(handlers::proxy_router())
        .merge(handlers::debug_router())
        .layer(Extension(gateway));
    info!(addr = %addr, "relay gateway listening");
    let addr = Address::from(addr);
    Server::new(app)
        .run(addr)
        .await
        .map_err(|e| Error::Serve(e.to_string().into()))
}
