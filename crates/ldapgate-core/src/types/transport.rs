//! Transport types: TLS strategy and directory endpoint

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How TLS is established with the directory server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsStrategy {
    /// Plain connection upgraded with StartTLS before any credentials are sent
    #[default]
    BeforeBind,
    /// TLS from the first byte (LDAPS), deprecated in LDAP v3
    OnConnect,
    /// No TLS at all
    Insecure,
}

impl TlsStrategy {
    /// Map the strategy to concrete connection parameters
    pub fn transport(&self) -> TransportConfig {
        match self {
            TlsStrategy::OnConnect => TransportConfig {
                use_direct_tls: true,
                tls_before_bind: false,
                default_port: crate::LDAPS_PORT,
            },
            TlsStrategy::BeforeBind => TransportConfig {
                use_direct_tls: false,
                tls_before_bind: true,
                default_port: crate::LDAP_PORT,
            },
            TlsStrategy::Insecure => TransportConfig {
                use_direct_tls: false,
                tls_before_bind: false,
                default_port: crate::LDAP_PORT,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TlsStrategy::BeforeBind => "before_bind",
            TlsStrategy::OnConnect => "on_connect",
            TlsStrategy::Insecure => "insecure",
        }
    }
}

impl fmt::Display for TlsStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TlsStrategy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "before_bind" => Ok(TlsStrategy::BeforeBind),
            "on_connect" => Ok(TlsStrategy::OnConnect),
            "insecure" => Ok(TlsStrategy::Insecure),
            other => Err(crate::Error::InvalidConfig(format!(
                "Unknown tls_strategy '{}', expected before_bind, on_connect or insecure",
                other
            ))),
        }
    }
}

/// Connection parameters derived from a [`TlsStrategy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    pub use_direct_tls: bool,
    pub tls_before_bind: bool,
    pub default_port: u16,
}

/// Where and how to reach the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEndpoint {
    pub address: String,
    pub port: u16,
    pub tls_strategy: TlsStrategy,
}

impl DirectoryEndpoint {
    /// Build an endpoint, falling back to the strategy's default port
    pub fn new(address: impl Into<String>, port: Option<u16>, tls_strategy: TlsStrategy) -> Self {
        Self {
            address: address.into(),
            port: port.unwrap_or_else(|| tls_strategy.transport().default_port),
            tls_strategy,
        }
    }

    pub fn transport(&self) -> TransportConfig {
        self.tls_strategy.transport()
    }

    /// LDAP URL for this endpoint (`ldaps://` when TLS starts on connect)
    pub fn url(&self) -> String {
        let scheme = if self.transport().use_direct_tls {
            "ldaps"
        } else {
            "ldap"
        };
        format!("{}://{}:{}", scheme, self.address, self.port)
    }
}
