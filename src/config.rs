use std::{env, fmt::Display, net::SocketAddr, path::PathBuf, str::FromStr};

use chrono::Duration;
use log::info;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Environment variable {0} is required")]
    Missing(&'static str),
    #[error("Invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind: SocketAddr,
    pub secret: String,
    pub token_ttl: Duration,
    pub media_root: PathBuf,
    pub media_url: String,
    pub max_connections: u32,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token_ttl_hours: i64 = try_load(&lookup, "FOODGRAM_TOKEN_TTL_HOURS", "24")?;
        if token_ttl_hours < 1 {
            return Err(ConfigError::Invalid {
                key: "FOODGRAM_TOKEN_TTL_HOURS",
                value: token_ttl_hours.to_string(),
                reason: String::from("must be at least 1"),
            });
        }

        Ok(Self {
            database_url: require(&lookup, "DATABASE_URL")?,
            bind: try_load(&lookup, "FOODGRAM_BIND", "0.0.0.0:8000")?,
            secret: require(&lookup, "FOODGRAM_SECRET")?,
            token_ttl: Duration::hours(token_ttl_hours),
            media_root: try_load(&lookup, "FOODGRAM_MEDIA_ROOT", "media")?,
            media_url: try_load(&lookup, "FOODGRAM_MEDIA_URL", "/media/")?,
            max_connections: try_load(&lookup, "FOODGRAM_MAX_CONNECTIONS", "5")?,
        })
    }
}

fn require(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    lookup(key)
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_fill_optional_values() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/foodgram"),
            ("FOODGRAM_SECRET", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(config.bind, "0.0.0.0:8000".parse().unwrap());
        assert_eq!(config.token_ttl, Duration::hours(24));
        assert_eq!(config.media_root, PathBuf::from("media"));
        assert_eq!(config.media_url, "/media/");
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn missing_secret_is_an_error() {
        let err = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://x")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("FOODGRAM_SECRET"));
    }

    #[test]
    fn unparseable_values_name_the_key() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("FOODGRAM_SECRET", "s"),
            ("FOODGRAM_BIND", "not an address"),
        ]))
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { key: "FOODGRAM_BIND", .. }));
    }
}
