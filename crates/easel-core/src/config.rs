//! Scheduler configuration, loaded from environment variables at startup.

use tracing_subscriber::EnvFilter;

/// Runtime configuration for the scheduler.
///
/// Every field has a sensible default so the scheduler works out-of-the-box
/// without any environment variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite (or other) database URL (default: `"sqlite://easel.db"`).
    /// Supports any sqlx-compatible SQLite connection string; use
    /// `"sqlite::memory:"` for a throwaway store.
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,sqlx=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Per-request timeout for callback delivery, in seconds.
    pub callback_timeout_secs: u64,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: env_or("EASEL_DATABASE_URL", "sqlite://easel.db"),
            log_level: env_or("EASEL_LOG", "info"),
            log_json: std::env::var("EASEL_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            callback_timeout_secs: parse_env("EASEL_CALLBACK_TIMEOUT", 10),
        }
    }
}

/// Initialise structured tracing for a host process.
///
/// Builds the log-level filter from `RUST_LOG` or [`Config::log_level`],
/// warning loudly if the configured value is not a valid filter expression.
/// Uses `try_init` so embedding applications (and tests) that already
/// installed a subscriber are left alone.
pub fn init_tracing(config: &Config) {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match config.log_level.parse::<EnvFilter>() {
            Ok(filter) => filter,
            Err(e) => {
                eprintln!(
                    "WARN: EASEL_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    config.log_level, e
                );
                EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    if config.log_json {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
