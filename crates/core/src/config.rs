use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dimension::Dimension;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_f64(profile: &str, key: &str, default: f64) -> f64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub dispatch: DispatchConfig,
    pub analysis: AnalysisConfig,
    pub notify: NotifyConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `VELO_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("VELO_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            dispatch: DispatchConfig::from_env_profiled(p),
            analysis: AnalysisConfig::from_env_profiled(p),
            notify: NotifyConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:      {}:{}", self.server.host, self.server.port);
        tracing::info!(
            "  dispatch:    heartbeat_timeout={}s, queue_file={}, runner_auth={}",
            self.dispatch.heartbeat_timeout_secs,
            self.dispatch
                .queue_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(memory)".into()),
            if self.dispatch.runner_token.is_some() { "enabled" } else { "disabled" },
        );
        tracing::info!(
            "  analysis:    threshold={}%, min_sigma={}, insignificant={}",
            self.analysis.significance_threshold_percent,
            self.analysis.min_sigma,
            self.analysis.insignificant_dimensions.len(),
        );
        tracing::info!(
            "  notify:      webhook={}",
            if self.notify.webhook_url.is_some() { "configured" } else { "(none)" },
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 7890),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── Dispatch ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Seconds without a pong before a runner is considered dead.
    pub heartbeat_timeout_secs: u64,
    /// Where pending tasks are persisted. `None` keeps them in memory only.
    pub queue_file: Option<PathBuf>,
    /// Shared secret runners must present. `None` disables the check.
    #[serde(skip_serializing)]
    pub runner_token: Option<String>,
    /// Benchmark repository commit pushed to runners on connect.
    pub bench_repo_commit: Option<String>,
}

impl DispatchConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            heartbeat_timeout_secs: profiled_env_u64(p, "HEARTBEAT_TIMEOUT_SECS", 30),
            queue_file: profiled_env_opt(p, "QUEUE_FILE").map(PathBuf::from),
            runner_token: profiled_env_opt(p, "RUNNER_TOKEN"),
            bench_repo_commit: profiled_env_opt(p, "BENCH_REPO_COMMIT"),
        }
    }
}

// ── Analysis ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Minimum |percent change| for a dimension to be flagged.
    pub significance_threshold_percent: f64,
    /// Minimum sigma for a flag, when sigma can be computed.
    pub min_sigma: f64,
    /// Dimensions whose changes are never reported.
    pub insignificant_dimensions: Vec<Dimension>,
}

impl AnalysisConfig {
    fn from_env_profiled(p: &str) -> Self {
        let insignificant_dimensions = profiled_env_opt(p, "INSIGNIFICANT_DIMENSIONS")
            .map(|raw| parse_dimension_list(&raw))
            .unwrap_or_default();
        Self {
            significance_threshold_percent: profiled_env_f64(
                p,
                "SIGNIFICANCE_THRESHOLD_PERCENT",
                5.0,
            ),
            min_sigma: profiled_env_f64(p, "SIGNIFICANCE_MIN_SIGMA", 2.0),
            insignificant_dimensions,
        }
    }
}

/// Parse a comma-separated `benchmark:metric` list, skipping malformed entries.
fn parse_dimension_list(raw: &str) -> Vec<Dimension> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match Dimension::parse(s) {
            Ok(dim) => Some(dim),
            Err(e) => {
                tracing::warn!(entry = s, error = %e, "ignoring malformed dimension");
                None
            }
        })
        .collect()
}

// ── Notify ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    /// Minijinja template for the notification body.
    pub template: Option<String>,
}

impl NotifyConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            webhook_url: profiled_env_opt(p, "WEBHOOK_URL"),
            template: profiled_env_opt(p, "NOTIFY_TEMPLATE"),
        }
    }
}
