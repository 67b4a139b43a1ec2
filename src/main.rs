use anyhow::Result;
use dotenvy::dotenv;
use relay_gateway::{Gateway, GatewayConfig, HttpUpstream};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = relay_gateway::logging_stdout();
    dotenv().ok();

    let config = GatewayConfig::from_env()?;
    info!(
        backend = %config.backend_base_url,
        fetch_timeout_secs = config.fetch_timeout.as_secs(),
        stream_timeout_secs = config.stream_timeout.as_secs(),
        "starting relay gateway"
    );

    let gateway = Gateway::new(HttpUpstream::new()?, config);
    relay_gateway::run_relay_gateway(gateway).await?;

    Ok(())
}
