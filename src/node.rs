use std::{fmt, net::SocketAddr};

use serde::{Deserialize, Serialize};

/// Identity of one cooperating process.
///
/// Nodes are recreated for every view snapshot, so equality and hashing are
/// by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub address: SocketAddr,
}

impl Node {
    pub fn new(name: impl Into<String>, address: SocketAddr) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.address)
    }
}
