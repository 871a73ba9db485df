//! Server configuration parsed from environment variables.

use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("gallery directory does not exist: {0}")]
    GalleryMissing(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    /// Directory of prebuilt snapshot files served under `/gallery`.
    pub gallery_dir: Option<PathBuf>,
    /// Outbound frames buffered per connection before fan-out drops.
    pub client_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_owned(),
            port: DEFAULT_PORT,
            gallery_dir: None,
            client_queue_capacity: DEFAULT_CLIENT_QUEUE_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Build config from the process environment.
    ///
    /// Optional:
    /// - `PORT`: default 8080
    /// - `BIND_ADDR`: default `0.0.0.0`
    /// - `GALLERY_DIR`: gallery disabled when absent
    /// - `CLIENT_QUEUE_CAPACITY`: default 256
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unparsable values or a missing gallery dir.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`ServerConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = parse_or("PORT", lookup("PORT"), defaults.port)?;
        let bind_addr = lookup("BIND_ADDR")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.bind_addr);
        let client_queue_capacity =
            parse_or("CLIENT_QUEUE_CAPACITY", lookup("CLIENT_QUEUE_CAPACITY"), defaults.client_queue_capacity)?;
        if client_queue_capacity == 0 {
            return Err(ConfigError::Invalid { key: "CLIENT_QUEUE_CAPACITY", value: "0".into() });
        }

        let gallery_dir = lookup("GALLERY_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        if let Some(dir) = &gallery_dir {
            if !dir.is_dir() {
                return Err(ConfigError::GalleryMissing(dir.clone()));
            }
        }

        Ok(Self { bind_addr, port, gallery_dir, client_queue_capacity })
    }

    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(default);
    };
    raw.trim()
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid { key, value: raw })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
