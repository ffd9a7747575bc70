//! Terminal configuration loaded from the environment.

use anyhow::{Context, Result};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;
use zeroize::Zeroizing;

/// Sidebar queue refresh interval.
pub const DEFAULT_SIDEBAR_POLL_SECS: u64 = 5;
/// Product grid / order screen refresh interval.
pub const DEFAULT_SCREEN_POLL_SECS: u64 = 15;
/// Default timeout for backend requests.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, PartialEq, Eq)]
pub struct PosConfig {
    pub api_url: String,
    pub api_token: Zeroizing<String>,
    pub cashier_first_name: String,
    pub cashier_last_name: String,
    pub cashier_role: String,
    pub sidebar_poll: Duration,
    pub screen_poll: Duration,
    pub request_timeout: Duration,
}

impl PosConfig {
    /// Read `POS_*` variables. URL and token are mandatory; everything else
    /// falls back to defaults.
    pub fn from_env() -> Result<Self> {
        let api_url = std::env::var("POS_API_URL")
            .context("Missing environment variable: POS_API_URL")?;
        let api_token = std::env::var("POS_API_TOKEN")
            .context("Missing environment variable: POS_API_TOKEN")?;

        Ok(Self {
            api_url: normalize_api_url(&api_url),
            api_token: Zeroizing::new(api_token.trim().to_string()),
            cashier_first_name: env_or("POS_CASHIER_FIRST_NAME", ""),
            cashier_last_name: env_or("POS_CASHIER_LAST_NAME", ""),
            cashier_role: env_or("POS_CASHIER_ROLE", "cashier"),
            sidebar_poll: Duration::from_secs(env_secs(
                "POS_SIDEBAR_POLL_SECS",
                DEFAULT_SIDEBAR_POLL_SECS,
            )?),
            screen_poll: Duration::from_secs(env_secs(
                "POS_SCREEN_POLL_SECS",
                DEFAULT_SCREEN_POLL_SECS,
            )?),
            request_timeout: Duration::from_secs(env_secs(
                "POS_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
        })
    }
}

impl fmt::Debug for PosConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PosConfig")
            .field("api_url", &self.api_url)
            .field("api_token", &"[REDACTED]")
            .field("cashier_first_name", &self.cashier_first_name)
            .field("cashier_last_name", &self.cashier_last_name)
            .field("cashier_role", &self.cashier_role)
            .field("sidebar_poll", &self.sidebar_poll)
            .field("screen_poll", &self.screen_poll)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|_| default.to_string())
}

fn env_secs(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{key} must be a whole number of seconds, got {raw:?}"))?;
            anyhow::ensure!(secs > 0, "{key} must be greater than zero");
            Ok(secs)
        }
        _ => Ok(default),
    }
}

/// Normalise the backend URL: trailing slashes and a trailing `/api` are
/// dropped. Without a scheme, hosts on the shop LAN (localhost, `.local`,
/// loopback or private IPv4) get `http`, everything else `https`.
pub fn normalize_api_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    let url = url.strip_suffix("/api").unwrap_or(url).trim_end_matches('/');
    if url.contains("://") {
        return url.to_string();
    }

    let host = url.split([':', '/']).next().unwrap_or_default();
    let scheme = if is_lan_host(host) { "http" } else { "https" };
    format!("{scheme}://{url}")
}

fn is_lan_host(host: &str) -> bool {
    host == "localhost"
        || host.ends_with(".local")
        || host
            .parse::<Ipv4Addr>()
            .is_ok_and(|ip| ip.is_loopback() || ip.is_private())
}
