//! Environment configuration

use anyhow::{Context, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub nats_url: Option<String>,
    pub max_connections: u32,
}

impl AppConfig {
    pub const DEFAULT_PORT: u16 = 8083;
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

    /// Reads `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;
        let port = match lookup("PORT") {
            Some(p) => p.parse().with_context(|| format!("invalid PORT {p:?}"))?,
            None => Self::DEFAULT_PORT,
        };
        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(n) => n.parse().with_context(|| format!("invalid DATABASE_MAX_CONNECTIONS {n:?}"))?,
            None => Self::DEFAULT_MAX_CONNECTIONS,
        };
        let nats_url = lookup("NATS_URL").filter(|u| !u.trim().is_empty());
        Ok(Self { database_url, port, nats_url, max_connections })
    }

    pub fn bind_addr(&self) -> String { format!("0.0.0.0:{}", self.port) }
}
