//! Adapter configuration.
//!
//! `AdapterConfig` is the option table handed to the adapter at setup time.
//! It is validated into an [`Endpoint`] and a shared [`HandlerConfig`] before
//! any socket is bound or connected.

use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5555;
pub const DEFAULT_PROTOCOL: &str = "tcp";
/// Largest stream frame accepted from a peer.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Transport family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Tcp,
    Udp,
}

impl FromStr for Family {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Family::Tcp),
            "udp" => Ok(Family::Udp),
            other => Err(ConfigError::UnsupportedFamily(other.to_owned())),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Tcp => f.write_str("tcp"),
            Family::Udp => f.write_str("udp"),
        }
    }
}

/// A parsed `family[:host:port]` protocol descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protocol {
    pub family: Family,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl Protocol {
    pub fn parse(protocol: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidProtocol {
            protocol: protocol.to_owned(),
            reason: reason.to_owned(),
        };

        let (family, rest) = match protocol.split_once(':') {
            Some((family, rest)) => (family, Some(rest)),
            None => (protocol, None),
        };
        let family = family.parse()?;

        let Some(rest) = rest else {
            return Ok(Protocol {
                family,
                host: None,
                port: None,
            });
        };

        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected family:host:port"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        let port = port.parse::<u16>().map_err(|_| invalid("bad port"))?;

        Ok(Protocol {
            family,
            host: Some(host.to_owned()),
            port: Some(port),
        })
    }
}

/// Where to listen or connect, after protocol overrides have been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub family: Family,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.family, self.host, self.port)
    }
}

/// Per handler defaults merged into every outgoing event.
///
/// Built once and never mutated; handlers share it behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerConfig {
    tags: BTreeSet<String>,
    attributes: BTreeMap<String, String>,
}

impl HandlerConfig {
    pub fn new<T, A, K, V>(tags: T, attributes: A) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        A: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        HandlerConfig {
            tags: tags.into_iter().map(Into::into).collect(),
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}

/// Options recognised by the adapter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub tags: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub max_frame_len: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        AdapterConfig {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            protocol: DEFAULT_PROTOCOL.to_owned(),
            tags: Vec::new(),
            attributes: BTreeMap::new(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl AdapterConfig {
    /// Parses a TOML table, filling in defaults for missing keys.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Resolves the protocol descriptor against `host` and `port`.
    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        let protocol = Protocol::parse(&self.protocol)?;
        Ok(Endpoint {
            family: protocol.family,
            host: protocol.host.unwrap_or_else(|| self.host.clone()),
            port: protocol.port.unwrap_or(self.port),
        })
    }

    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig::new(self.tags.iter().cloned(), self.attributes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AdapterConfig::default();
        let endpoint = config.endpoint().unwrap();
        assert_eq!(endpoint.family, Family::Tcp);
        assert_eq!(endpoint.host, "localhost");
        assert_eq!(endpoint.port, 5555);
        assert_eq!(config.max_frame_len, DEFAULT_MAX_FRAME_LEN);
    }

    #[test]
    fn protocol_overrides_host_and_port() {
        let config = AdapterConfig {
            protocol: "udp:collector.local:6000".to_owned(),
            ..Default::default()
        };
        let endpoint = config.endpoint().unwrap();
        assert_eq!(endpoint.family, Family::Udp);
        assert_eq!(endpoint.host, "collector.local");
        assert_eq!(endpoint.port, 6000);
    }

    #[test]
    fn ipv6_host() {
        let protocol = Protocol::parse("tcp:[::1]:5555").unwrap();
        assert_eq!(protocol.host.as_deref(), Some("::1"));
        assert_eq!(protocol.port, Some(5555));
    }

    #[test]
    fn unsupported_family() {
        assert_eq!(
            Protocol::parse("sctp"),
            Err(ConfigError::UnsupportedFamily("sctp".to_owned()))
        );
        assert_eq!(
            Protocol::parse("http:localhost:80"),
            Err(ConfigError::UnsupportedFamily("http".to_owned()))
        );
    }

    #[test]
    fn malformed_protocol() {
        assert!(matches!(
            Protocol::parse("tcp:localhost"),
            Err(ConfigError::InvalidProtocol { .. })
        ));
        assert!(matches!(
            Protocol::parse("tcp:localhost:port"),
            Err(ConfigError::InvalidProtocol { .. })
        ));
        assert!(matches!(
            Protocol::parse("tcp::5555"),
            Err(ConfigError::InvalidProtocol { .. })
        ));
    }

    #[test]
    fn from_toml() {
        let config = AdapterConfig::from_toml_str(
            r#"
            protocol = "udp"
            port = 5556
            tags = ["env", "env", "prod"]

            [attributes]
            dc = "us"
            "#,
        )
        .unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5556);

        let handler = config.handler_config();
        assert_eq!(handler.tags().len(), 2);
        assert_eq!(handler.attributes().get("dc").map(String::as_str), Some("us"));
    }

    #[test]
    fn from_toml_rejects_bad_types() {
        assert!(matches!(
            AdapterConfig::from_toml_str("port = \"high\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
