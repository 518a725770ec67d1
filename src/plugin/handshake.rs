//! go-plugin handshake negotiation.
//!
//! The host passes a magic cookie and the protocol versions it accepts through
//! the child's environment. The plugin answers with a single stdout line:
//!
//! ```text
//! CORE-PROTOCOL-VERSION|APP-PROTOCOL-VERSION|NETWORK|ADDRESS|PROTOCOL[|SERVER-CERT]
//! ```

use std::fmt;
use std::str::FromStr;

use super::PluginError;

pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

pub const CORE_PROTOCOL_VERSION: u32 = 1;
pub const PLUGIN_PROTOCOL_VERSION: u32 = 5;

pub const DEFAULT_MIN_PORT: u16 = 10000;
pub const DEFAULT_MAX_PORT: u16 = 25000;

/// Environment handed to the plugin process.
pub fn plugin_env(min_port: u16, max_port: u16) -> Vec<(&'static str, String)> {
    vec![
        (MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE.to_string()),
        ("PLUGIN_PROTOCOL_VERSIONS", PLUGIN_PROTOCOL_VERSION.to_string()),
        ("PLUGIN_MIN_PORT", min_port.to_string()),
        ("PLUGIN_MAX_PORT", max_port.to_string()),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Unix,
    Tcp,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Unix => f.write_str("unix"),
            Network::Tcp => f.write_str("tcp"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub core_version: u32,
    pub protocol_version: u32,
    pub network: Network,
    pub address: String,
    /// Base64 DER certificate when the plugin runs with AutoMTLS.
    pub server_cert: Option<String>,
}

impl FromStr for Handshake {
    type Err = PluginError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let fail = |reason: String| PluginError::Handshake {
            line: line.to_string(),
            reason,
        };

        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() < 5 || parts.len() > 6 {
            return Err(fail(format!(
                "expected 5 or 6 fields, got {}",
                parts.len()
            )));
        }

        let core_version: u32 = parts[0]
            .parse()
            .map_err(|_| fail(format!("bad core protocol version {:?}", parts[0])))?;
        if core_version != CORE_PROTOCOL_VERSION {
            return Err(fail(format!(
                "incompatible core protocol version {}, expected {}",
                core_version, CORE_PROTOCOL_VERSION
            )));
        }

        let protocol_version: u32 = parts[1]
            .parse()
            .map_err(|_| fail(format!("bad plugin protocol version {:?}", parts[1])))?;
        if protocol_version != PLUGIN_PROTOCOL_VERSION {
            return Err(fail(format!(
                "incompatible plugin protocol version {}, expected {}",
                protocol_version, PLUGIN_PROTOCOL_VERSION
            )));
        }

        let network = match parts[2] {
            "unix" => Network::Unix,
            "tcp" => Network::Tcp,
            other => return Err(fail(format!("unsupported network {:?}", other))),
        };

        let address = parts[3].to_string();
        if address.is_empty() {
            return Err(fail("empty address".to_string()));
        }

        match parts[4] {
            "grpc" => {}
            "netrpc" | "" => {
                return Err(fail(
                    "plugin speaks net/rpc; only gRPC plugins are supported".to_string(),
                ));
            }
            other => return Err(fail(format!("unknown protocol {:?}", other))),
        }

        let server_cert = parts
            .get(5)
            .map(|cert| cert.to_string())
            .filter(|cert| !cert.is_empty());

        Ok(Self {
            core_version,
            protocol_version,
            network,
            address,
            server_cert,
        })
    }
}
