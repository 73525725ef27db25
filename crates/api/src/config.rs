//! Process configuration read from the environment.

use std::net::SocketAddr;

use anyhow::Context;

use bizhub_auth::AuthConfig;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Postgres when set; otherwise a seeded in-memory store.
    pub database_url: Option<String>,
    pub auth: AuthConfig,
}

impl ServerConfig {
    /// `JWT_SECRET`, `BIND_ADDR`, `DATABASE_URL`, `TOKEN_LIFETIME_SECS`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .context("BIND_ADDR must be a socket address")?;

        let mut auth = AuthConfig::new(jwt_secret);
        if let Some(secs) = lookup("TOKEN_LIFETIME_SECS") {
            auth.token_lifetime_secs = secs
                .parse()
                .context("TOKEN_LIFETIME_SECS must be a positive integer")?;
        }

        Ok(Self {
            bind_addr,
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            auth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.auth.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(cfg.auth.token_lifetime_secs, 3600);
    }

    #[test]
    fn explicit_values_win() {
        let cfg = config(&[
            ("JWT_SECRET", "s3cret"),
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("DATABASE_URL", "postgres://localhost/bizhub"),
            ("TOKEN_LIFETIME_SECS", "600"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/bizhub"));
        assert_eq!(cfg.auth.token_lifetime_secs, 600);
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(config(&[("BIND_ADDR", "nowhere")]).is_err());
        assert!(config(&[("TOKEN_LIFETIME_SECS", "soon")]).is_err());
    }
}
