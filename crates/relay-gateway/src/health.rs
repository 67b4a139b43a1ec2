use crate::tools::join_url;
use crate::upstream::Upstream;
use faststr::FastStr;
use reqwest::StatusCode;
use std::time::Duration;
use tokio::time::{Instant, timeout};
use tracing::{info, warn};

pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub healthy: bool,
    /// The probe URL that answered with a 2xx.
    pub url:     Option<FastStr>,
    /// Last status seen from any probe.
    pub status:  Option<StatusCode>,
    pub elapsed: Duration,
}

/// Swaps the loopback host between its literal and hostname forms, so a
/// backend bound to only one of IPv4 / IPv6 is still found.
pub fn loopback_variant(base: &str) -> Option<String> {
    const SWAPS: [(&str, &str); 3] = [
        ("127.0.0.1", "localhost"),
        ("[::1]", "localhost"),
        ("localhost", "127.0.0.1"),
    ];
    SWAPS
        .iter()
        .find(|(from, _)| base.contains(from))
        .map(|(from, to)| base.replacen(from, to, 1))
}

pub fn probe_urls(base: &str) -> Vec<String> {
    let primary = join_url(base, HEALTH_PATH);
    let mut urls = vec![primary];
    if let Some(variant) = loopback_variant(base) {
        let variant = join_url(&variant, HEALTH_PATH);
        if variant != urls[0] {
            urls.push(variant);
        }
    }
    urls
}

/// Probes the backend, trying each URL of [`probe_urls`] in turn. Nothing
/// is cached: the backend may restart between two requests.
pub async fn check<U: Upstream>(
    upstream: &U,
    base: &str,
    probe_timeout: Duration,
    request_id: &str,
) -> HealthStatus {
    let started = Instant::now();
    let mut last_status = None;
    for url in probe_urls(base) {
        info!(request_id = %request_id, url = %url, "checking backend health");
        match timeout(probe_timeout, upstream.probe(&url)).await {
            Ok(Ok(status)) => {
                last_status = Some(status);
                let elapsed = started.elapsed();
                info!(
                    request_id = %request_id,
                    url = %url,
                    status = status.as_u16(),
                    ok = status.is_success(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "health check response"
                );
                if status.is_success() {
                    return HealthStatus {
                        healthy: true,
                        url: Some(url.into()),
                        status: Some(status),
                        elapsed,
                    };
                }
            }
            Ok(Err(e)) => {
                warn!(request_id = %request_id, url = %url, error = %e, "health check failed");
            }
            Err(_) => {
                warn!(
                    request_id = %request_id,
                    url = %url,
                    timeout_ms = probe_timeout.as_millis() as u64,
                    "health check timed out"
                );
            }
        }
    }
    HealthStatus {
        healthy: false,
        url:     None,
        status:  last_status,
        elapsed: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProxyError, ProxyResult};
    use crate::upstream::{UpstreamRequest, UpstreamResponse};
    use std::sync::Mutex;

    #[test]
    fn test_loopback_variant() {
        assert_eq!(
            loopback_variant("http://127.0.0.1:1956").as_deref(),
            Some("http://localhost:1956")
        );
        assert_eq!(
            loopback_variant("http://localhost:1956").as_deref(),
            Some("http://127.0.0.1:1956")
        );
        assert_eq!(
            loopback_variant("http://[::1]:1956").as_deref(),
            Some("http://localhost:1956")
        );
        assert_eq!(loopback_variant("https://vac.example.com"), None);
    }

    #[test]
    fn test_probe_urls() {
        assert_eq!(
            probe_urls("http://127.0.0.1:1956"),
            vec![
                "http://127.0.0.1:1956/health".to_owned(),
                "http://localhost:1956/health".to_owned(),
            ]
        );
        assert_eq!(
            probe_urls("https://vac.example.com"),
            vec!["https://vac.example.com/health".to_owned()]
        );
    }

    /// Answers probes from a script, one entry per call.
    struct ScriptedProbe {
        script: Mutex<Vec<ProxyResult<StatusCode>>>,
        seen:   Mutex<Vec<String>>,
    }

    impl ScriptedProbe {
        fn new(mut script: Vec<ProxyResult<StatusCode>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                seen:   Mutex::new(vec![]),
            }
        }
    }

    impl Upstream for ScriptedProbe {
        async fn probe(&self, url: &str) -> ProxyResult<StatusCode> {
            self.seen.lock().unwrap().push(url.to_owned());
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(ProxyError::BackendUnavailable))
        }

        async fn send(&self, _request: UpstreamRequest<'_>) -> ProxyResult<UpstreamResponse> {
            unreachable!("health checks never forward")
        }
    }

    #[tokio::test]
    async fn test_first_url_healthy() {
        let upstream = ScriptedProbe::new(vec![Ok(StatusCode::OK)]);
        let status = check(&upstream, "http://127.0.0.1:1956", Duration::from_secs(1), "t").await;
        assert!(status.healthy);
        assert_eq!(status.url.as_deref(), Some("http://127.0.0.1:1956/health"));
        assert_eq!(upstream.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_loopback_variant() {
        let upstream = ScriptedProbe::new(vec![
            Err(ProxyError::ConnectionRefused("127.0.0.1".into())),
            Ok(StatusCode::NO_CONTENT),
        ]);
        let status = check(&upstream, "http://127.0.0.1:1956", Duration::from_secs(1), "t").await;
        assert!(status.healthy);
        assert_eq!(status.url.as_deref(), Some("http://localhost:1956/health"));
        assert_eq!(status.status, Some(StatusCode::NO_CONTENT));
    }

    #[tokio::test]
    async fn test_non_2xx_is_unhealthy() {
        let upstream = ScriptedProbe::new(vec![
            Ok(StatusCode::INTERNAL_SERVER_ERROR),
            Ok(StatusCode::SERVICE_UNAVAILABLE),
        ]);
        let status = check(&upstream, "http://127.0.0.1:1956", Duration::from_secs(1), "t").await;
        assert!(!status.healthy);
        assert!(status.url.is_none());
        assert_eq!(status.status, Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(upstream.seen.lock().unwrap().len(), 2);
    }
}
