use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

use crate::roster::CounterPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    File,
    Memory,
}

/// Admin account created at startup when it does not exist yet.
#[derive(Clone, PartialEq, Eq)]
pub struct SeedAdmin {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for SeedAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedAdmin")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub database_url: String,
    pub data_dir: PathBuf,
    pub storage: StorageBackend,
    pub counter_policy: CounterPolicy,
    pub session_days: i64,
    pub admin: Option<SeedAdmin>,
}

const DEFAULT_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_DATA_DIR: &str = "circle";
const DEFAULT_SESSION_DAYS: i64 = 2;

impl ServerConfig {
    /// Reads `.env` (if any) and the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(err).context("could not read .env");
            }
        }
        Self::from_vars(&std::env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> anyhow::Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let addr = get("MATHCIRCLE_ADDR")
            .unwrap_or(DEFAULT_ADDR)
            .parse()
            .context("MATHCIRCLE_ADDR is not a socket address")?;
        let database_url = get("DATABASE_URL")
            .context("DATABASE_URL must be set")?
            .to_string();
        let data_dir = PathBuf::from(get("MATHCIRCLE_DATA_DIR").unwrap_or(DEFAULT_DATA_DIR));
        let storage = match get("MATHCIRCLE_STORAGE").unwrap_or("file") {
            "file" => StorageBackend::File,
            "memory" => StorageBackend::Memory,
            other => anyhow::bail!("MATHCIRCLE_STORAGE must be `file` or `memory`, got `{}`", other),
        };
        let counter_policy = match get("MATHCIRCLE_COUNTER_POLICY") {
            Some(raw) => raw.parse().context("MATHCIRCLE_COUNTER_POLICY")?,
            None => CounterPolicy::default(),
        };
        let session_days = match get("MATHCIRCLE_SESSION_DAYS") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|days| *days > 0)
                .context("MATHCIRCLE_SESSION_DAYS must be a positive integer")?,
            None => DEFAULT_SESSION_DAYS,
        };
        let admin = match (get("MATHCIRCLE_ADMIN_EMAIL"), get("MATHCIRCLE_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(SeedAdmin {
                email: email.to_string(),
                password: password.to_string(),
            }),
            (None, None) => None,
            _ => anyhow::bail!(
                "MATHCIRCLE_ADMIN_EMAIL and MATHCIRCLE_ADMIN_PASSWORD must be set together"
            ),
        };

        Ok(Self {
            addr,
            database_url,
            data_dir,
            storage,
            counter_policy,
            session_days,
            admin,
        })
    }
}
