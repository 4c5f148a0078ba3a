//! Where the result store lives, resolved from `SURREALDB_*` variables.
//!
//! Resolution order:
//!
//! 1. `SURREALDB_ENDPOINT` set: a remote server. `SURREALDB_USERNAME` and
//!    `SURREALDB_PASSWORD` are then required; a missing one is an error,
//!    never a silent fallback to local storage.
//! 2. `SURREALDB_URL` set: any SurrealDB URL, no sign-in.
//! 3. Otherwise: local persistence under `.prompt-eval/db`.
//!
//! Blank values count as unset.

use std::path::PathBuf;

use crate::error::StateError;

pub const ENDPOINT_ENV: &str = "SURREALDB_ENDPOINT";
pub const USERNAME_ENV: &str = "SURREALDB_USERNAME";
pub const PASSWORD_ENV: &str = "SURREALDB_PASSWORD";
pub const NAMESPACE_ENV: &str = "SURREALDB_NAMESPACE";
pub const DATABASE_ENV: &str = "SURREALDB_DATABASE";
pub const ROOT_ENV: &str = "SURREALDB_ROOT";
pub const URL_ENV: &str = "SURREALDB_URL";

pub const DEFAULT_NAMESPACE: &str = "prompt_eval";
pub const DEFAULT_DATABASE: &str = "main";
pub const DEFAULT_LOCAL_PATH: &str = ".prompt-eval/db";

/// Which credentials a remote sign-in uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthLevel {
    /// Database user scoped to the configured namespace and database
    #[default]
    Database,
    /// Root user
    Root,
}

/// Remote server connection and credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
    pub auth: AuthLevel,
}

impl RemoteConfig {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            auth: AuthLevel::Database,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_auth(mut self, auth: AuthLevel) -> Self {
        self.auth = auth;
        self
    }
}

// Keeps the password out of logs and panics.
impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .field("auth", &self.auth)
            .finish()
    }
}

/// Resolved store location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    Remote(RemoteConfig),
    Url(String),
    Local(PathBuf),
}

impl StoreTarget {
    pub fn from_env() -> Result<Self, StateError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve using `lookup` in place of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = var(ENDPOINT_ENV) {
            let required = |name: &'static str| {
                var(name).ok_or(StateError::MissingSetting {
                    name,
                    required_by: ENDPOINT_ENV,
                })
            };
            let username = required(USERNAME_ENV)?;
            let password = required(PASSWORD_ENV)?;

            let auth = match var(ROOT_ENV) {
                None => AuthLevel::Database,
                Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => AuthLevel::Root,
                    "false" | "0" => AuthLevel::Database,
                    _ => {
                        return Err(StateError::InvalidSetting {
                            name: ROOT_ENV,
                            value,
                        })
                    }
                },
            };

            let mut remote = RemoteConfig::new(endpoint, username, password).with_auth(auth);
            if let Some(namespace) = var(NAMESPACE_ENV) {
                remote = remote.with_namespace(namespace);
            }
            if let Some(database) = var(DATABASE_ENV) {
                remote = remote.with_database(database);
            }
            return Ok(StoreTarget::Remote(remote));
        }

        if let Some(url) = var(URL_ENV) {
            return Ok(StoreTarget::Url(url));
        }

        Ok(StoreTarget::Local(PathBuf::from(DEFAULT_LOCAL_PATH)))
    }
}
