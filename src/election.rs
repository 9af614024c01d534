//! Singleton election: choosing the one node that owns a cluster-wide
//! responsibility.
//!
//! Policies are pure functions of the candidate list. Every process that sees
//! the same view elects the same node without talking to the others.

use std::net::SocketAddr;

use crate::node::Node;

pub trait SingletonElectionPolicy: Send + Sync {
    /// Returns `None` only when `candidates` is empty.
    fn elect<'a>(&self, candidates: &'a [Node]) -> Option<&'a Node>;
}

/// Elects the candidate at a fixed position, wrapping around.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimpleSingletonElectionPolicy {
    position: usize,
}

impl SimpleSingletonElectionPolicy {
    pub fn new(position: usize) -> Self {
        Self { position }
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

impl SingletonElectionPolicy for SimpleSingletonElectionPolicy {
    fn elect<'a>(&self, candidates: &'a [Node]) -> Option<&'a Node> {
        if candidates.is_empty() {
            return None;
        }
        candidates.get(self.position % candidates.len())
    }
}

pub trait Preference: Send + Sync {
    fn preferred(&self, node: &Node) -> bool;
}

impl<F> Preference for F
where
    F: Fn(&Node) -> bool + Send + Sync,
{
    fn preferred(&self, node: &Node) -> bool {
        self(node)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePreference {
    name: String,
}

impl NamePreference {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Preference for NamePreference {
    fn preferred(&self, node: &Node) -> bool {
        node.name == self.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketAddressPreference {
    address: SocketAddr,
}

impl SocketAddressPreference {
    pub fn new(address: SocketAddr) -> Self {
        Self { address }
    }
}

impl Preference for SocketAddressPreference {
    fn preferred(&self, node: &Node) -> bool {
        node.address == self.address
    }
}

/// Elects the first candidate matching the earliest preference, and defers to
/// `fallback` when no preference matches.
///
/// Preference order beats candidate order: a candidate matching the first
/// preference wins even if it comes last in the list.
pub struct PreferredSingletonElectionPolicy {
    fallback: Box<dyn SingletonElectionPolicy>,
    preferences: Vec<Box<dyn Preference>>,
}

impl PreferredSingletonElectionPolicy {
    pub fn new(
        fallback: Box<dyn SingletonElectionPolicy>,
        preferences: Vec<Box<dyn Preference>>,
    ) -> Self {
        Self {
            fallback,
            preferences,
        }
    }
}

impl SingletonElectionPolicy for PreferredSingletonElectionPolicy {
    fn elect<'a>(&self, candidates: &'a [Node]) -> Option<&'a Node> {
        self.preferences
            .iter()
            .find_map(|preference| {
                candidates
                    .iter()
                    .find(|candidate| preference.preferred(candidate))
            })
            .or_else(|| self.fallback.elect(candidates))
    }
}
