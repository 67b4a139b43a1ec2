use crate::error::{Error, Result};
use reqwest::Client as ReqwestClient;
use std::time::Duration;

const CONNECT_TIMEOUT: u64 = 10;

#[inline]
pub fn build_http_client() -> Result<ReqwestClient> {
    let builder = ReqwestClient::builder();
    let client = builder
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT))
        .build()
        .map_err(Error::FailedToBuildClient)?;
    Ok(client)
}

#[inline]
pub fn join_url(base: &str, endpoint: &str) -> String {
    let base = base.trim_end_matches('/');
    if endpoint.starts_with('/') {
        format!("{base}{endpoint}")
    } else {
        format!("{base}/{endpoint}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://127.0.0.1:1956", "/vac/streaming/bot"),
            "http://127.0.0.1:1956/vac/streaming/bot"
        );
        assert_eq!(join_url("http://h:1/", "/health"), "http://h:1/health");
        assert_eq!(join_url("http://h:1", "health"), "http://h:1/health");
    }
}
