//! Runtime configuration read from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `OPENAI_API_KEY` | required |
//! | `OPENAI_BASE_URL` | `https://api.openai.com/v1` |
//! | `PROMPT_EVAL_COMPLETIONS_PER_CASE` | `1` |
//! | `PROMPT_EVAL_MAX_ATTEMPTS` | `4` |
//! | `PROMPT_EVAL_RETRY_DELAY_SECS` | `5` |
//! | `PROMPT_EVAL_ATTEMPT_TIMEOUT_SECS` | `60` (`0` disables) |
//! | `PROMPT_EVAL_HTTP_TIMEOUT_SECS` | `120` |

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::clients::openai::{OpenAiConfig, DEFAULT_BASE_URL};
use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const COMPLETIONS_PER_CASE_ENV: &str = "PROMPT_EVAL_COMPLETIONS_PER_CASE";
pub const MAX_ATTEMPTS_ENV: &str = "PROMPT_EVAL_MAX_ATTEMPTS";
pub const RETRY_DELAY_ENV: &str = "PROMPT_EVAL_RETRY_DELAY_SECS";
pub const ATTEMPT_TIMEOUT_ENV: &str = "PROMPT_EVAL_ATTEMPT_TIMEOUT_SECS";
pub const HTTP_TIMEOUT_ENV: &str = "PROMPT_EVAL_HTTP_TIMEOUT_SECS";

const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} is not set")]
    Missing { name: &'static str },

    #[error("{name}={value:?} is not a valid number")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{name} must be at least {min}")]
    TooSmall { name: &'static str, min: u64 },
}

/// Service connection plus retry behaviour.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    pub openai: OpenAiConfig,
    pub retry: RetryPolicy,
}

impl EvalConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_ENV)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing { name: API_KEY_ENV })?;
        let base_url = lookup(BASE_URL_ENV)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let completions_per_case: u32 = number(&lookup, COMPLETIONS_PER_CASE_ENV, 1)?;
        at_least(COMPLETIONS_PER_CASE_ENV, completions_per_case.into(), 1)?;
        let max_attempts: u32 = number(&lookup, MAX_ATTEMPTS_ENV, DEFAULT_MAX_ATTEMPTS)?;
        at_least(MAX_ATTEMPTS_ENV, max_attempts.into(), 1)?;
        let delay_secs: u64 = number(&lookup, RETRY_DELAY_ENV, DEFAULT_RETRY_DELAY.as_secs())?;
        let attempt_timeout_secs: u64 =
            number(&lookup, ATTEMPT_TIMEOUT_ENV, DEFAULT_ATTEMPT_TIMEOUT_SECS)?;
        let http_timeout_secs: u64 = number(&lookup, HTTP_TIMEOUT_ENV, DEFAULT_HTTP_TIMEOUT_SECS)?;
        at_least(HTTP_TIMEOUT_ENV, http_timeout_secs, 1)?;

        let openai = OpenAiConfig::new(api_key)
            .with_base_url(base_url)
            .with_completions_per_prompt(completions_per_case)
            .with_request_timeout(Duration::from_secs(http_timeout_secs));

        let mut retry = RetryPolicy::new(max_attempts, Duration::from_secs(delay_secs));
        if attempt_timeout_secs > 0 {
            retry = retry.with_attempt_timeout(Duration::from_secs(attempt_timeout_secs));
        }

        Ok(Self { openai, retry })
    }
}

fn number<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
    }
}

fn at_least(name: &'static str, value: u64, min: u64) -> Result<(), ConfigError> {
    if value < min {
        return Err(ConfigError::TooSmall { name, min });
    }
    Ok(())
}
