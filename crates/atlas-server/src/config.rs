use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "super_secret_key",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub admin: Option<AdminSeed>,
}

/// Credentials of an account to create or promote to admin at startup.
#[derive(Clone)]
pub struct AdminSeed {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeed")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("ATLAS_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("ATLAS_JWT_SECRET is unset or still a placeholder; set it in .env and restart");
        }

        let port = match lookup("ATLAS_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("parsing ATLAS_PORT value `{}`", raw))?,
            None => 3001,
        };

        let token_ttl_hours = match lookup("ATLAS_TOKEN_TTL_HOURS") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|h| *h > 0)
                .with_context(|| format!("ATLAS_TOKEN_TTL_HOURS must be a positive integer, got `{}`", raw))?,
            None => 24,
        };

        let admin = match (lookup("ATLAS_ADMIN_USERNAME"), lookup("ATLAS_ADMIN_PASSWORD")) {
            (Some(username), Some(password)) if !username.trim().is_empty() && !password.is_empty() => {
                Some(AdminSeed {
                    username: username.trim().to_string(),
                    password,
                })
            }
            (None, None) => None,
            _ => bail!("ATLAS_ADMIN_USERNAME and ATLAS_ADMIN_PASSWORD must be set together"),
        };

        Ok(Self {
            host: lookup("ATLAS_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: lookup("ATLAS_DB_PATH")
                .unwrap_or_else(|| "atlas.db".into())
                .into(),
            jwt_secret,
            token_ttl_hours,
            admin,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
