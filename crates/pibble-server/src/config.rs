use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

use pibble_api::state::DEFAULT_MAX_UPLOAD_BYTES;
use pibble_gateway::identity::AdminCredential;
use pibble_gateway::session::PublicPersistPolicy;

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub admins: Vec<AdminCredential>,
    pub public_persist_policy: PublicPersistPolicy,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Read `PIBBLE_*` variables from the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let port = var("PIBBLE_PORT", "3000")
            .parse::<u16>()
            .context("PIBBLE_PORT must be a port number")?;

        let admins = match get("PIBBLE_ADMIN_CREDENTIALS") {
            Some(raw) => AdminCredential::parse_list(&raw).context("invalid PIBBLE_ADMIN_CREDENTIALS")?,
            None => AdminCredential::defaults(),
        };

        let public_persist_policy = match get("PIBBLE_PUBLIC_PERSIST_POLICY") {
            Some(raw) => raw
                .parse::<PublicPersistPolicy>()
                .context("invalid PIBBLE_PUBLIC_PERSIST_POLICY")?,
            None => PublicPersistPolicy::default(),
        };

        let max_upload_bytes = match get("PIBBLE_MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .parse::<usize>()
                .context("PIBBLE_MAX_UPLOAD_BYTES must be a byte count")?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            host: var("PIBBLE_HOST", "0.0.0.0"),
            port,
            db_path: var("PIBBLE_DB_PATH", "pibble.db").into(),
            upload_dir: var("PIBBLE_UPLOAD_DIR", "./uploads").into(),
            admins,
            public_persist_policy,
            max_upload_bytes,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.addr().unwrap().to_string(), "0.0.0.0:3000");
        assert_eq!(cfg.db_path, PathBuf::from("pibble.db"));
        assert_eq!(cfg.upload_dir, PathBuf::from("./uploads"));
        assert_eq!(cfg.admins, AdminCredential::defaults());
        assert_eq!(cfg.public_persist_policy, PublicPersistPolicy::Drop);
        assert_eq!(cfg.max_upload_bytes, 52_428_800);
    }

    #[test]
    fn overrides() {
        let cfg = config(&[
            ("PIBBLE_PORT", "8080"),
            ("PIBBLE_ADMIN_CREDENTIALS", "root:Root"),
            ("PIBBLE_PUBLIC_PERSIST_POLICY", "fail-closed"),
            ("PIBBLE_MAX_UPLOAD_BYTES", "1024"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.admins, vec![AdminCredential::new("root", "Root")]);
        assert_eq!(cfg.public_persist_policy, PublicPersistPolicy::FailClosed);
        assert_eq!(cfg.max_upload_bytes, 1024);
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(config(&[("PIBBLE_PORT", "http")]).is_err());
        assert!(config(&[("PIBBLE_PUBLIC_PERSIST_POLICY", "retry")]).is_err());
    }
}
