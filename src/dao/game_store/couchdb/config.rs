use super::error::{CouchDaoError, CouchResult};

/// Database used when `COUCH_DB` is not set.
pub const DEFAULT_DATABASE: &str = "pong_arena";

/// Runtime configuration describing how to connect to CouchDB.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    pub base_url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl CouchConfig {
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Read `COUCH_BASE_URL`, `COUCH_DB`, `COUCH_USERNAME` and `COUCH_PASSWORD`.
    ///
    /// Returns `Ok(None)` when no base URL is configured, meaning CouchDB is not in use.
    /// Credentials must come as a pair.
    pub fn from_env() -> CouchResult<Option<Self>> {
        let Ok(base_url) = std::env::var("COUCH_BASE_URL") else {
            return Ok(None);
        };
        let database =
            std::env::var("COUCH_DB").unwrap_or_else(|_| DEFAULT_DATABASE.to_string());
        let config = Self::new(base_url, database);

        match (
            std::env::var("COUCH_USERNAME").ok(),
            std::env::var("COUCH_PASSWORD").ok(),
        ) {
            (Some(username), Some(password)) => {
                Ok(Some(config.with_credentials(username, password)))
            }
            (None, None) => Ok(Some(config)),
            (Some(_), None) => Err(CouchDaoError::MissingEnvVar {
                var: "COUCH_PASSWORD",
            }),
            (None, Some(_)) => Err(CouchDaoError::MissingEnvVar {
                var: "COUCH_USERNAME",
            }),
        }
    }
}
