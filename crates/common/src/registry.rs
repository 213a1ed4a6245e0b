//! Server registry
//!
//! Maps a (protocol, address space) pair to the web server that tests can
//! reach it on. The registry is built once from the deployment's port table
//! and never changes afterwards.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// IP address space a server lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressSpace {
    Loopback,
    OtherLoopback,
    /// The private address space.
    Local,
    Public,
}

impl AddressSpace {
    pub const ALL: [AddressSpace; 4] = [
        AddressSpace::Loopback,
        AddressSpace::OtherLoopback,
        AddressSpace::Local,
        AddressSpace::Public,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AddressSpace::Loopback => "loopback",
            AddressSpace::OtherLoopback => "other-loopback",
            AddressSpace::Local => "local",
            AddressSpace::Public => "public",
        }
    }

    /// Privacy rank: lower is more private. Both loopback servers share a rank.
    pub fn rank(&self) -> u8 {
        match self {
            AddressSpace::Loopback | AddressSpace::OtherLoopback => 0,
            AddressSpace::Local => 1,
            AddressSpace::Public => 2,
        }
    }

    /// Whether a request from `self` into `target` crosses into a more private space.
    pub fn is_more_public_than(&self, target: AddressSpace) -> bool {
        self.rank() > target.rank()
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressSpace {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        AddressSpace::ALL
            .into_iter()
            .find(|space| space.as_str() == s)
            .ok_or(())
    }
}

/// Protocol spoken by a server, without the trailing colon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Ws,
    Wss,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [Protocol::Http, Protocol::Https, Protocol::Ws, Protocol::Wss];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Ws => "ws",
            Protocol::Wss => "wss",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Protocol::ALL
            .into_iter()
            .find(|protocol| protocol.as_str() == s)
            .ok_or(())
    }
}

/// A web server accessible by tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub address_space: AddressSpace,
    /// Human-readable name, e.g. `https-public`
    pub name: String,
    pub port: u16,
    /// Protocol including the trailing colon, e.g. `https:`
    pub protocol: String,
}

impl ServerDescriptor {
    fn new(protocol: Protocol, address_space: AddressSpace, port: u16) -> Self {
        Self {
            address_space,
            name: format!("{}-{}", protocol, address_space),
            port,
            protocol: format!("{}:", protocol),
        }
    }

    /// Protocol without the trailing colon
    pub fn scheme(&self) -> &str {
        self.protocol.trim_end_matches(':')
    }
}

/// Ports a single protocol is served on, per address space
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProtocolPorts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loopback: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_loopback: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<u16>,
}

impl ProtocolPorts {
    pub fn get(&self, address_space: AddressSpace) -> Option<u16> {
        match address_space {
            AddressSpace::Loopback => self.loopback,
            AddressSpace::OtherLoopback => self.other_loopback,
            AddressSpace::Local => self.local,
            AddressSpace::Public => self.public,
        }
    }
}

/// Port allocation of the test deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortTable {
    pub http: ProtocolPorts,
    pub https: ProtocolPorts,
    pub ws: ProtocolPorts,
    pub wss: ProtocolPorts,
}

impl Default for PortTable {
    fn default() -> Self {
        Self {
            http: ProtocolPorts {
                loopback: Some(8000),
                other_loopback: None,
                local: Some(8002),
                public: Some(8003),
            },
            https: ProtocolPorts {
                loopback: Some(8443),
                other_loopback: Some(8444),
                local: Some(8445),
                public: Some(8446),
            },
            ws: ProtocolPorts {
                loopback: Some(8666),
                ..Default::default()
            },
            wss: ProtocolPorts {
                loopback: Some(8667),
                ..Default::default()
            },
        }
    }
}

impl PortTable {
    pub fn ports(&self, protocol: Protocol) -> &ProtocolPorts {
        match protocol {
            Protocol::Http => &self.http,
            Protocol::Https => &self.https,
            Protocol::Ws => &self.ws,
            Protocol::Wss => &self.wss,
        }
    }
}

static GLOBAL: OnceCell<ServerRegistry> = OnceCell::new();

/// Immutable lookup of the servers available to tests
#[derive(Debug, Clone)]
pub struct ServerRegistry {
    servers: HashMap<(Protocol, AddressSpace), ServerDescriptor>,
}

impl ServerRegistry {
    /// Build the registry from a port table
    pub fn from_ports(table: &PortTable) -> Self {
        let mut servers = HashMap::new();
        for protocol in Protocol::ALL {
            let ports = table.ports(protocol);
            for address_space in AddressSpace::ALL {
                if let Some(port) = ports.get(address_space) {
                    servers.insert(
                        (protocol, address_space),
                        ServerDescriptor::new(protocol, address_space, port),
                    );
                }
            }
        }
        debug!("Server registry built with {} servers", servers.len());
        Self { servers }
    }

    /// Install the process-wide registry. Returns false if one was already installed.
    pub fn install(registry: ServerRegistry) -> bool {
        GLOBAL.set(registry).is_ok()
    }

    /// Process-wide registry, built from the default port table if none was installed
    pub fn global() -> &'static ServerRegistry {
        GLOBAL.get_or_init(|| ServerRegistry::from_ports(&PortTable::default()))
    }

    /// Look up a server. Absent combinations yield `None`.
    pub fn get(&self, protocol: Protocol, address_space: AddressSpace) -> Option<&ServerDescriptor> {
        self.servers.get(&(protocol, address_space))
    }

    /// Look up a server by textual protocol and address space names
    pub fn get_str(&self, protocol: &str, address_space: &str) -> Option<&ServerDescriptor> {
        let protocol = protocol.parse().ok()?;
        let address_space = address_space.parse().ok()?;
        self.get(protocol, address_space)
    }

    /// Find the server listening on `port`
    pub fn by_port(&self, port: u16) -> Option<&ServerDescriptor> {
        self.servers.values().find(|server| server.port == port)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn http_local(&self) -> Option<&ServerDescriptor> {
        self.get(Protocol::Http, AddressSpace::Loopback)
    }

    pub fn http_private(&self) -> Option<&ServerDescriptor> {
        self.get(Protocol::Http, AddressSpace::Local)
    }

    pub fn http_public(&self) -> Option<&ServerDescriptor> {
        self.get(Protocol::Http, AddressSpace::Public)
    }

    pub fn https_local(&self) -> Option<&ServerDescriptor> {
        self.get(Protocol::Https, AddressSpace::Loopback)
    }

    pub fn other_https_local(&self) -> Option<&ServerDescriptor> {
        self.get(Protocol::Https, AddressSpace::OtherLoopback)
    }

    pub fn https_private(&self) -> Option<&ServerDescriptor> {
        self.get(Protocol::Https, AddressSpace::Local)
    }

    pub fn https_public(&self) -> Option<&ServerDescriptor> {
        self.get(Protocol::Https, AddressSpace::Public)
    }

    pub fn ws_local(&self) -> Option<&ServerDescriptor> {
        self.get(Protocol::Ws, AddressSpace::Loopback)
    }

    pub fn wss_local(&self) -> Option<&ServerDescriptor> {
        self.get(Protocol::Wss, AddressSpace::Loopback)
    }
}
