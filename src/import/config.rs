use crate::import::parser::LineMode;
use std::env;
use std::time::Duration;

pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CONFIRM_THRESHOLD: usize = 500;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3_600;
pub const DEFAULT_SAMPLE_ROWS: usize = 5;
pub const ACCEPTED_EXTENSIONS: [&str; 4] = ["csv", "xlsx", "xls", "ods"];

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_duration_millis(key: &str, default_millis: u64) -> Duration {
    Duration::from_millis(env_u64(key, default_millis))
}

/// Runtime settings for resident imports.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub max_file_bytes: u64,
    pub accepted_extensions: Vec<String>,
    /// Records written concurrently per batch. Never below 1.
    pub batch_size: usize,
    pub write_timeout: Duration,
    /// Row count above which a run needs explicit confirmation.
    pub confirm_threshold: usize,
    pub line_mode: LineMode,
    pub session_ttl: Duration,
    /// Data rows echoed back in the upload preview.
    pub sample_rows: usize,
}

impl ImportConfig {
    pub fn from_env() -> Self {
        let line_mode = if env_bool("IMPORT_MULTILINE_FIELDS", false) {
            LineMode::QuoteAware
        } else {
            LineMode::Physical
        };

        Self {
            max_file_bytes: env_u64("IMPORT_MAX_FILE_BYTES", DEFAULT_MAX_FILE_BYTES),
            accepted_extensions: default_extensions(),
            batch_size: env_usize("IMPORT_BATCH_SIZE", DEFAULT_BATCH_SIZE).max(1),
            write_timeout: env_duration_millis("IMPORT_WRITE_TIMEOUT_MS", DEFAULT_WRITE_TIMEOUT_MS),
            confirm_threshold: env_usize("IMPORT_CONFIRM_THRESHOLD", DEFAULT_CONFIRM_THRESHOLD),
            line_mode,
            session_ttl: Duration::from_secs(env_u64(
                "IMPORT_SESSION_TTL_SECS",
                DEFAULT_SESSION_TTL_SECS,
            )),
            sample_rows: DEFAULT_SAMPLE_ROWS,
        }
    }

    pub fn accepts(&self, extension: &str) -> bool {
        self.accepted_extensions
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(extension))
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            accepted_extensions: default_extensions(),
            batch_size: DEFAULT_BATCH_SIZE,
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
            confirm_threshold: DEFAULT_CONFIRM_THRESHOLD,
            line_mode: LineMode::Physical,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            sample_rows: DEFAULT_SAMPLE_ROWS,
        }
    }
}

fn default_extensions() -> Vec<String> {
    ACCEPTED_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}
