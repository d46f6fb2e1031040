//! Known connection server endpoints
//!
//! Persisted alongside the package cache so a restart can reconnect
//! without first asking a directory service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport a server endpoint speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerProtocol {
    Tcp,
    Udp,
    WebSocket,
}

/// One server endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    /// `host:port` or websocket URL
    pub endpoint: String,

    /// Transport protocol
    pub protocol: ServerProtocol,
}

impl ServerRecord {
    /// Create a new server record
    pub fn new(endpoint: impl Into<String>, protocol: ServerProtocol) -> Self {
        Self {
            endpoint: endpoint.into(),
            protocol,
        }
    }
}

/// Server list sub-document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerList {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<ServerRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ServerList {
    /// Build a list stamped with the current time
    pub fn from_servers(servers: Vec<ServerRecord>) -> Self {
        Self {
            servers,
            last_updated: Some(Utc::now()),
        }
    }

    /// Whether the list holds no endpoints
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Whether the endpoints match, ignoring timestamps
    pub fn same_servers(&self, other: &ServerList) -> bool {
        self.servers == other.servers
    }
}
