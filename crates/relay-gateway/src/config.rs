use crate::error::{Error, Result};
use common::RetryPolicy;
use faststr::FastStr;
use std::{net::SocketAddr, time::Duration};

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:1956";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(60);
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_SECRETS_DIR: &str = "/secrets/firebase";
pub const DEFAULT_ENV_PREFIX: &str = "NEXT_PUBLIC_FIREBASE";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_addr:      SocketAddr,
    /// Upstream base, never ends with `/`.
    pub backend_base_url: FastStr,
    /// Bound on each forward attempt until response headers arrive.
    pub fetch_timeout:    Duration,
    /// Bound on the whole re-streamed body.
    pub stream_timeout:   Duration,
    pub health_timeout:   Duration,
    pub retry:            RetryPolicy,
    pub diagnostics:      DiagnosticsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    pub env_file:    Option<FastStr>,
    pub secrets_dir: FastStr,
    pub env_prefix:  FastStr,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            env_file:    None,
            secrets_dir: DEFAULT_SECRETS_DIR.into(),
            env_prefix:  DEFAULT_ENV_PREFIX.into(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr:      SocketAddr::from(([0, 0, 0, 0], 3000)),
            backend_base_url: DEFAULT_BACKEND_URL.into(),
            fetch_timeout:    FETCH_TIMEOUT,
            stream_timeout:   STREAM_TIMEOUT,
            health_timeout:   HEALTH_TIMEOUT,
            retry:            RetryPolicy::default(),
            diagnostics:      DiagnosticsConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_base_url = lookup("BACKEND_URL")
            .or_else(|| lookup("NEXT_PUBLIC_BACKEND_URL"))
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_owned());
        let backend_base_url = backend_base_url.trim().trim_end_matches('/').to_owned();

        let listen_addr = lookup("RELAY_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_owned());
        let listen_addr = listen_addr
            .parse()
            .map_err(|_| Error::InvalidConfig {
                key:   "RELAY_ADDR",
                value: listen_addr.clone().into(),
            })?;

        let diagnostics = DiagnosticsConfig {
            env_file:    lookup("ENV_FILE").map(FastStr::from),
            secrets_dir: lookup("SECRETS_DIR")
                .map(FastStr::from)
                .unwrap_or_else(|| DEFAULT_SECRETS_DIR.into()),
            env_prefix:  lookup("DIAGNOSTICS_ENV_PREFIX")
                .map(FastStr::from)
                .unwrap_or_else(|| DEFAULT_ENV_PREFIX.into()),
        };

        Ok(Self {
            listen_addr,
            backend_base_url: backend_base_url.into(),
            fetch_timeout: secs(&lookup, "FETCH_TIMEOUT_SECS", FETCH_TIMEOUT)?,
            stream_timeout: secs(&lookup, "STREAM_TIMEOUT_SECS", STREAM_TIMEOUT)?,
            health_timeout: HEALTH_TIMEOUT,
            retry: RetryPolicy::default(),
            diagnostics,
        })
    }
}

fn secs<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| Error::InvalidConfig {
                key,
                value: raw.clone().into(),
            }),
    }
}
