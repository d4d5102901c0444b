use crate::error::Error;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use std::time::Duration;

/// Connection pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl PoolConfig {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 3;
    pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

    /// Settings for `database_url` with the default limits.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Self::DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    /// Reads `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS` and
    /// `DATABASE_ACQUIRE_TIMEOUT_SECS` from the environment.
    ///
    /// Loading a `.env` file is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `DATABASE_URL` is unset or a number does not parse.
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> crate::Result<Self> {
        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| Error::Config("DATABASE_URL is not set".into()))?;
        let mut config = Self::new(database_url);

        if let Some(raw) = lookup("DATABASE_MAX_CONNECTIONS") {
            config.max_connections = parse_number("DATABASE_MAX_CONNECTIONS", &raw)?;
        }
        if let Some(raw) = lookup("DATABASE_ACQUIRE_TIMEOUT_SECS") {
            config.acquire_timeout =
                Duration::from_secs(parse_number("DATABASE_ACQUIRE_TIMEOUT_SECS", &raw)?);
        }
        Ok(config)
    }

    fn options(&self) -> MySqlPoolOptions {
        MySqlPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
    }

    /// Opens the pool and checks that one connection can be made.
    pub async fn connect(&self) -> crate::Result<MySqlPool> {
        self.options()
            .connect(&self.database_url)
            .await
            .map_err(Error::Acquisition)
    }

    /// Creates the pool without connecting; connections open on first use.
    pub fn connect_lazy(&self) -> crate::Result<MySqlPool> {
        self.options()
            .connect_lazy(&self.database_url)
            .map_err(|e| Error::Config(e.to_string()))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> crate::Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a number, got `{raw}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PoolConfig::from_lookup(lookup(&[("DATABASE_URL", "mysql://localhost/test")])).unwrap();
        assert_eq!(config, PoolConfig::new("mysql://localhost/test"));
        assert_eq!(config.max_connections, 3);
    }

    #[test]
    fn test_overrides() {
        let config = PoolConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "mysql://db/app"),
            ("DATABASE_MAX_CONNECTIONS", "10"),
            ("DATABASE_ACQUIRE_TIMEOUT_SECS", " 5 "),
        ]))
        .unwrap();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_url() {
        let err = PoolConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_bad_number() {
        let err = PoolConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "mysql://db/app"),
            ("DATABASE_MAX_CONNECTIONS", "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DATABASE_MAX_CONNECTIONS"));
    }
}
