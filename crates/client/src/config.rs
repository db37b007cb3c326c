//! Client configuration and gateway endpoint resolution
//!
//! `config.toml` lives in the data directory:
//!
//! ```toml
//! server_url = "https://gateway.example.com"
//!
//! [[hosts]]
//! id = 1
//! name = "web"
//! address = "10.0.0.5"
//! port = 22
//! username = "deploy"
//! authType = "password"
//! password = "..."
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shellgate_protocol::HostConfig;
use thiserror::Error;
use url::Url;

/// Path the gateway serves terminal WebSockets on
pub const TERMINAL_WS_PATH: &str = "/ws";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no gateway server URL configured")]
    MissingServerUrl,

    #[error("invalid gateway server URL {url:?}: {reason}")]
    InvalidServerUrl { url: String, reason: String },

    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

impl ClientConfig {
    /// Load from disk. A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Look a host up by name, falling back to its numeric id.
    pub fn find_host(&self, key: &str) -> Option<&HostConfig> {
        self.hosts
            .iter()
            .find(|h| h.name == key)
            .or_else(|| {
                key.parse::<u64>()
                    .ok()
                    .and_then(|id| self.hosts.iter().find(|h| h.id == id))
            })
    }
}

/// Synchronous "where do I dial" accessor handed to every transport.
pub trait EndpointProvider: Send + Sync + 'static {
    fn endpoint(&self) -> Result<String, ConfigError>;
}

impl<T: EndpointProvider + ?Sized> EndpointProvider for Arc<T> {
    fn endpoint(&self) -> Result<String, ConfigError> {
        (**self).endpoint()
    }
}

/// Endpoint derived from a fixed gateway base URL.
#[derive(Debug, Clone, Default)]
pub struct ServerUrl(Option<String>);

impl ServerUrl {
    pub fn new(url: Option<String>) -> Self {
        Self(url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()))
    }
}

impl EndpointProvider for ServerUrl {
    fn endpoint(&self) -> Result<String, ConfigError> {
        let base = self.0.as_deref().ok_or(ConfigError::MissingServerUrl)?;
        derive_endpoint(base).map(String::from)
    }
}

/// `http(s)://host[:port]/anything` → `ws(s)://host[:port]/ws`
pub fn derive_endpoint(server_url: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidServerUrl {
        url: server_url.to_string(),
        reason: reason.to_string(),
    };

    let candidate = if server_url.contains("://") {
        server_url.to_string()
    } else {
        format!("https://{server_url}")
    };
    let mut url = Url::parse(&candidate).map_err(|e| invalid(&e.to_string()))?;
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(&format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid("cannot switch to a WebSocket scheme"))?;
    url.set_path(TERMINAL_WS_PATH);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use shellgate_protocol::AuthMethod;

    use super::*;

    #[test]
    fn derives_ws_schemes_and_fixed_path() {
        assert_eq!(
            derive_endpoint("http://gw.local:8080").unwrap().as_str(),
            "ws://gw.local:8080/ws"
        );
        assert_eq!(
            derive_endpoint("https://gw.example.com/app/?x=1#frag")
                .unwrap()
                .as_str(),
            "wss://gw.example.com/ws"
        );
        assert_eq!(
            derive_endpoint("wss://gw.example.com").unwrap().as_str(),
            "wss://gw.example.com/ws"
        );
        assert_eq!(
            derive_endpoint("gw.example.com").unwrap().as_str(),
            "wss://gw.example.com/ws"
        );
    }

    #[test]
    fn rejects_unusable_urls() {
        assert!(matches!(
            derive_endpoint("ftp://gw.example.com"),
            Err(ConfigError::InvalidServerUrl { .. })
        ));
        assert!(matches!(
            derive_endpoint("http://"),
            Err(ConfigError::InvalidServerUrl { .. })
        ));
    }

    #[test]
    fn missing_server_url_is_a_config_error() {
        assert!(matches!(
            ServerUrl::new(None).endpoint(),
            Err(ConfigError::MissingServerUrl)
        ));
        assert!(matches!(
            ServerUrl::new(Some("   ".into())).endpoint(),
            Err(ConfigError::MissingServerUrl)
        ));
        assert_eq!(
            ServerUrl::new(Some("http://127.0.0.1:4000".into()))
                .endpoint()
                .unwrap(),
            "ws://127.0.0.1:4000/ws"
        );
    }

    #[test]
    fn missing_config_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load(&dir.path().join("config.toml")).unwrap();
        assert!(config.server_url.is_none());
        assert!(config.hosts.is_empty());
    }

    #[test]
    fn loads_hosts_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
server_url = "https://gw.example.com"

[[hosts]]
id = 1
name = "web"
address = "10.0.0.5"
username = "deploy"
authType = "password"
password = "pw"

[[hosts]]
id = 2
name = "db"
address = "10.0.0.6"
port = 2200
username = "postgres"
authType = "privateKey"
privateKey = "KEY"
keyType = "rsa"
"#
        )
        .unwrap();

        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.server_url.as_deref(), Some("https://gw.example.com"));
        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.hosts[0].port, 22);
        assert_eq!(config.find_host("db").map(|h| h.port), Some(2200));
        assert_eq!(config.find_host("1").map(|h| h.name.as_str()), Some("web"));
        assert!(config.find_host("nope").is_none());
        assert!(matches!(
            config.hosts[1].auth,
            AuthMethod::PrivateKey { ref key_type, .. } if key_type.as_deref() == Some("rsa")
        ));
    }

    #[test]
    fn malformed_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server_url = [").unwrap();
        match ClientConfig::load(&path) {
            Err(ConfigError::Parse { path: p, .. }) => assert!(p.ends_with("config.toml")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
