//! Tracing subscriber setup for prompt-eval binaries.
//!
//! Filtering comes from `PROMPT_EVAL_LOG`, then `RUST_LOG`, then the level
//! passed by the caller. `PROMPT_EVAL_LOG_FORMAT=json` switches to
//! newline-delimited JSON, as does the `json` argument.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directives, checked before `RUST_LOG`.
pub const LOG_ENV: &str = "PROMPT_EVAL_LOG";

/// Set to `json` for JSON log lines.
pub const LOG_FORMAT_ENV: &str = "PROMPT_EVAL_LOG_FORMAT";

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

fn json_requested(json: bool) -> bool {
    json || std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Install the global subscriber. Only the first call in a process takes
/// effect; later calls are ignored.
pub fn init_tracing(json: bool, level: Level) {
    let filter = env_filter(level);

    if json_requested(json) {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
    }

    #[test]
    fn explicit_json_flag_wins() {
        assert!(json_requested(true));
    }
}
