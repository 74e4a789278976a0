use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine in deployed environments
        let _ = dotenv();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections,
        })
    }
}
