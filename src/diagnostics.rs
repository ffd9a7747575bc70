//! Diagnostics for the terminal core.
//!
//! Provides:
//! - **Logging setup**: console plus daily rolling JSON file, old files pruned
//! - **About info**: version, build timestamp, git SHA, platform
//! - **Terminal health**: backend reachability and the pending-order backlog

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::api::ApiClient;
use crate::sync::PendingOrders;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

const APP_IDENTIFIER: &str = "com.kioscorp.pos";
const LOG_PREFIX: &str = "pos";
const DEFAULT_LOG_FILTER: &str = "info,kios_pos_lib=debug";

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Directory holding the rolling log files: `POS_LOG_DIR` when set, else
/// under the XDG data directory of the kiosk user.
pub fn get_log_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("POS_LOG_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    let data_home = std::env::var_os("XDG_DATA_HOME")
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    data_home.join(APP_IDENTIFIER).join("logs")
}

/// Delete all but the `keep` newest log files in `dir`. Returns how many
/// files were removed.
pub fn prune_logs_in(dir: &Path, keep: usize) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = entries
        .flatten()
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(&format!("{LOG_PREFIX}.")))
        })
        .filter(|entry| entry.path().is_file())
        .map(|entry| {
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(std::time::UNIX_EPOCH);
            (entry.path(), modified)
        })
        .collect();

    // newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(keep) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "failed to prune log file"),
        }
    }
    removed
}

pub fn prune_old_logs() {
    prune_logs_in(&get_log_dir(), MAX_LOG_FILES);
}

/// Install the global subscriber: `RUST_LOG`-driven filter, a console layer
/// and a daily rolling JSON file. Keep the returned guard alive until exit;
/// dropping it flushes the file writer.
pub fn init_logging() -> anyhow::Result<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    prune_old_logs();
    let log_dir = get_log_dir();
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

// ---------------------------------------------------------------------------
// About info
// ---------------------------------------------------------------------------

/// Returns version, build timestamp, git SHA, and platform info.
pub fn get_about_info() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": env!("BUILD_TIMESTAMP"),
        "gitSha": env!("BUILD_GIT_SHA"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
    })
}

// ---------------------------------------------------------------------------
// Terminal health
// ---------------------------------------------------------------------------

/// Health snapshot for the status screen. Never includes the API token.
pub async fn get_terminal_health(api: &ApiClient, pending: &PendingOrders) -> Value {
    let connectivity = api.test_connectivity().await;
    let session = api.session();

    json!({
        "online": connectivity.success,
        "latencyMs": connectivity.latency_ms,
        "error": connectivity.error,
        "backend": session.base_url(),
        "sessionId": session.session_id().to_string(),
        "sessionStartedAt": session.started_at().to_rfc3339(),
        "cashier": session.cashier().display_name(),
        "pendingOrders": pending.pending_count(),
        "openOrder": pending.open_order_id(),
        "about": get_about_info(),
    })
}
