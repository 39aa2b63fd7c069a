use pier_core::MatchPolicy;
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_LOG_FILTER: &str = "info,pier=debug,pier_core=debug";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: IpAddr,
    pub port: u16,
    /// Empty means any origin is accepted.
    pub allowed_origins: Vec<String>,
    pub policy: MatchPolicy,
    pub requeue_orphans: bool,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind = match lookup("PIER_BIND_ADDR") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "PIER_BIND_ADDR",
                reason: format!("'{raw}' is not an IP address"),
            })?,
            None => defaults.bind,
        };
        let port = lookup("PIER_PORT")
            .or_else(|| lookup("PORT"))
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(defaults.port);
        let allowed_origins = lookup("PIER_ALLOWED_ORIGINS")
            .map(|raw| parse_origins(&raw))
            .unwrap_or(defaults.allowed_origins);
        let policy = match lookup("PIER_MATCH_POLICY") {
            Some(raw) => parse_policy(&raw)?,
            None => defaults.policy,
        };
        let requeue_orphans = lookup("PIER_REQUEUE_ORPHANS")
            .map(|value| parse_flag(&value))
            .unwrap_or(defaults.requeue_orphans);
        let log_filter = lookup("RUST_LOG").unwrap_or(defaults.log_filter);

        Ok(Self {
            bind,
            port,
            allowed_origins,
            policy,
            requeue_orphans,
            log_filter,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            allowed_origins: vec![DEFAULT_ORIGIN.to_string()],
            policy: MatchPolicy::Pairwise,
            requeue_orphans: false,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

pub fn parse_policy(raw: &str) -> Result<MatchPolicy, ConfigError> {
    raw.parse().map_err(|reason| ConfigError::Invalid {
        key: "PIER_MATCH_POLICY",
        reason,
    })
}

pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| origin.trim_end_matches('/').to_string())
        .collect()
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.policy, MatchPolicy::Pairwise);
        assert_eq!(config.allowed_origins, vec![DEFAULT_ORIGIN.to_string()]);
        assert!(!config.requeue_orphans);
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:5001");
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PIER_BIND_ADDR", "127.0.0.1"),
            ("PIER_PORT", "9000"),
            ("PIER_MATCH_POLICY", "room"),
            ("PIER_REQUEUE_ORPHANS", "true"),
            (
                "PIER_ALLOWED_ORIGINS",
                "https://chat.example.com/, http://localhost:5173 ,,",
            ),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr().to_string(), "127.0.0.1:9000");
        assert_eq!(config.policy, MatchPolicy::Room);
        assert!(config.requeue_orphans);
        assert_eq!(
            config.allowed_origins,
            vec![
                "https://chat.example.com".to_string(),
                "http://localhost:5173".to_string()
            ]
        );
    }

    #[test]
    fn empty_origin_list_is_allowed() {
        let config = Config::from_lookup(lookup(&[("PIER_ALLOWED_ORIGINS", "")])).unwrap();
        assert!(config.allowed_origins.is_empty());
    }

    #[test]
    fn rejects_unknown_policy() {
        let err = Config::from_lookup(lookup(&[("PIER_MATCH_POLICY", "mesh")])).unwrap_err();
        assert!(err.to_string().contains("PIER_MATCH_POLICY"));
    }

    #[test]
    fn falls_back_to_plain_port_var() {
        let config = Config::from_lookup(lookup(&[("PORT", "7000")])).unwrap();
        assert_eq!(config.port, 7000);
    }
}
