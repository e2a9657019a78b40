//! Tunnel address specifications
//!
//! An [`AddressSpec`] pairs a local listen address with the remote
//! `host:port` the server should dial. The textual form is the one of
//! `ssh -L`: `[bind_address:]port:host:hostport`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Address the listener binds to when none is given
pub const ANY_INTERFACE: &str = "0.0.0.0";

/// One local listener and the remote target it tunnels to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AddressSpec {
    /// Local bind host, `None` for any interface
    pub bind_host: Option<String>,
    /// Local port
    pub bind_port: u16,
    /// Remote host, resolved by the server
    pub remote_host: String,
    /// Remote port
    pub remote_port: u16,
}

impl AddressSpec {
    /// Create a spec listening on all interfaces
    pub fn new(bind_port: u16, remote_host: impl Into<String>, remote_port: u16) -> Self {
        Self {
            bind_host: None,
            bind_port,
            remote_host: remote_host.into(),
            remote_port,
        }
    }

    /// Restrict the listener to one local host
    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = Some(host.into());
        self
    }

    /// Parse an explicit `[bind:]port:host:hostport` argument
    ///
    /// An empty bind (`:port:host:hostport`) means any interface.
    pub fn parse(arg: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidAddress {
            arg: arg.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = arg.split(':').collect();
        let (bind, port, host, hostport) = match parts.as_slice() {
            [port, host, hostport] => (None, *port, *host, *hostport),
            [bind, port, host, hostport] => {
                let bind = (!bind.is_empty()).then(|| bind.to_string());
                (bind, *port, *host, *hostport)
            }
            _ => return Err(invalid("expected [bind_address:]port:host:hostport")),
        };

        let bind_port = parse_port(port).ok_or_else(|| invalid("invalid local port"))?;
        if host.is_empty() {
            return Err(invalid("missing remote host"));
        }
        let remote_port = parse_port(hostport).ok_or_else(|| invalid("invalid remote port"))?;

        Ok(Self {
            bind_host: bind,
            bind_port,
            remote_host: host.to_string(),
            remote_port,
        })
    }

    /// Local bind host, [`ANY_INTERFACE`] when none was given
    pub fn bind_interface(&self) -> &str {
        self.bind_host.as_deref().unwrap_or(ANY_INTERFACE)
    }

    /// Address the local listener binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_interface(), self.bind_port)
    }

    /// Whether both specs describe the same tunnel once the bind host is
    /// spelled out
    pub fn same_tunnel(&self, other: &Self) -> bool {
        self.bind_interface() == other.bind_interface()
            && self.bind_port == other.bind_port
            && self.remote_host == other.remote_host
            && self.remote_port == other.remote_port
    }

    /// Whether the two listeners would fight over a local address
    ///
    /// A wildcard host holds the port on every interface.
    pub fn binds_overlap(&self, other: &Self) -> bool {
        if self.bind_port != other.bind_port {
            return false;
        }
        let (a, b) = (self.bind_interface(), other.bind_interface());
        a == b || is_wildcard(a) || is_wildcard(b)
    }

    /// Target address sent to the server as stream metadata
    pub fn remote_address(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_port)
    }
}

fn is_wildcard(host: &str) -> bool {
    matches!(host, ANY_INTERFACE | "::")
}

fn parse_port(s: &str) -> Option<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl fmt::Display for AddressSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(host) = &self.bind_host {
            write!(f, "{}:", host)?;
        }
        write!(
            f,
            "{}:{}:{}",
            self.bind_port, self.remote_host, self.remote_port
        )
    }
}

impl FromStr for AddressSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AddressSpec {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<AddressSpec> for String {
    fn from(spec: AddressSpec) -> Self {
        spec.to_string()
    }
}
