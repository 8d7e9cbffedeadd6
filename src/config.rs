use std::fmt;

use crate::error::ConfigError;

/// Default PostgreSQL port used when `DB_PORT` is not set.
pub const DEFAULT_PORT: u16 = 5432;

const HOST_KEY: &str = "DB_HOST";
const USER_KEY: &str = "DB_USER";
const PASSWORD_KEY: &str = "DB_PASSWORD";
const DATABASE_KEY: &str = "DB_NAME";
const PORT_KEY: &str = "DB_PORT";
const QUERY_KEY: &str = "DB_QUERY";

/// Connection settings for a single unit of work.
///
/// The value is immutable once built; every unit of work reads it once to
/// open its connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    host: String,
    user: String,
    password: String,
    database: String,
    port: u16,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            database: database.into(),
            port,
        }
    }

    /// Load the settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the settings from an arbitrary key lookup.
    ///
    /// `DB_HOST`, `DB_USER`, `DB_PASSWORD` and `DB_NAME` are required,
    /// `DB_PORT` falls back to [`DEFAULT_PORT`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let port = match lookup(PORT_KEY) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(raw))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            host: require(HOST_KEY)?,
            user: require(USER_KEY)?,
            password: require(PASSWORD_KEY)?,
            database: require(DATABASE_KEY)?,
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `user@host:port/database`, safe to put in logs.
    pub fn target(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("port", &self.port)
            .finish()
    }
}

/// Connection settings plus the raw query the binary runs.
#[derive(Debug, Clone)]
pub struct QuerySettings {
    pub connection: ConnectionConfig,
    pub query: String,
}

impl QuerySettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let connection = ConnectionConfig::from_lookup(&lookup)?;
        let query = lookup(QUERY_KEY).ok_or(ConfigError::Missing(QUERY_KEY))?;
        Ok(Self { connection, query })
    }
}
