use crate::application_port::ReusePolicy;
use anyhow::{Result, anyhow};
use config::{Config, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub auth: Auth,
    pub http: Http,
    pub idempotency: Idempotency,
    pub log: Log,
    pub session: Session,
    pub store: Store,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Auth {
    pub issuer: String,
    pub audience: String,
    /// Name of the environment variable holding the JWT signing key.
    pub signing_key_env: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    #[serde(default)]
    pub reuse_policy: ReusePolicy,
    pub min_username_len: usize,
    pub min_password_len: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Http {
    pub address: String,
    /// TLS is enabled only when both paths are set.
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Idempotency {
    pub retention_secs: u64,
    pub purge_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub backend: String, // "memory", "mysql" or "redis"
    pub redis_dsn: Option<String>,
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Store {
    pub backend: String, // "memory" or "mysql"
    pub mysql_dsn: Option<String>,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_settings_parse() {
        let settings = parse_settings(Some(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/settings/dev.toml"
        )))
        .unwrap();
        assert_eq!(settings.store.backend, "memory");
        assert_eq!(settings.auth.reuse_policy, ReusePolicy::Reject);
        assert_eq!(settings.auth.access_ttl_secs, 15 * 60);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(parse_settings(Some("settings/does-not-exist.toml")).is_err());
    }
}
