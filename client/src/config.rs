//! Client connection settings and server URL selection.
//!
//! The server listens on a well-known port. The URL scheme follows the page
//! that hosts the editor: `wss` when the page was loaded over `https`, `ws`
//! otherwise. Without a page URL the client connects over plain `ws`.

pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 8080;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// URL of the page hosting the editor, if any.
    pub page_url: Option<String>,
    pub server_host: String,
    pub server_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { page_url: None, server_host: DEFAULT_SERVER_HOST.to_owned(), server_port: DEFAULT_SERVER_PORT }
    }
}

impl ClientConfig {
    /// Read `VOXEL_PAGE_URL`, `VOXEL_SERVER_HOST`, and `VOXEL_SERVER_PORT`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unparsable port.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. When no host is given but
    /// a page URL is, the page's host is used.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let page_url = lookup("VOXEL_PAGE_URL").filter(|s| !s.trim().is_empty());
        let server_host = lookup("VOXEL_SERVER_HOST")
            .filter(|s| !s.trim().is_empty())
            .or_else(|| page_url.as_deref().and_then(page_host).map(str::to_owned))
            .unwrap_or_else(|| DEFAULT_SERVER_HOST.to_owned());
        let server_port = match lookup("VOXEL_SERVER_PORT").filter(|s| !s.trim().is_empty()) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key: "VOXEL_SERVER_PORT", value: raw })?,
            None => DEFAULT_SERVER_PORT,
        };
        Ok(Self { page_url, server_host, server_port })
    }

    /// Whether the hosting page is served over TLS.
    #[must_use]
    pub fn is_secure_page(&self) -> bool {
        self.page_url
            .as_deref()
            .is_some_and(|url| url.trim_start().get(..6).is_some_and(|s| s.eq_ignore_ascii_case("https:")))
    }

    /// WebSocket URL of the room server.
    #[must_use]
    pub fn ws_url(&self) -> String {
        let scheme = if self.is_secure_page() { "wss" } else { "ws" };
        format!("{scheme}://{}:{}/ws", self.server_host, self.server_port)
    }

    /// HTTP base URL of the room server, for health checks and the gallery.
    #[must_use]
    pub fn http_url(&self) -> String {
        let scheme = if self.is_secure_page() { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.server_host, self.server_port)
    }
}

/// Host part of a page URL, without port or path.
fn page_host(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next()?;
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = if authority.starts_with('[') {
        authority.split_once(']').map(|(h, _)| &authority[..=h.len()])?
    } else {
        authority.split(':').next()?
    };
    (!host.is_empty()).then_some(host)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
