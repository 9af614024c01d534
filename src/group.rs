use std::sync::Arc;

use tokio::sync::watch;

use crate::{
    membership::{MembershipListener, Registration},
    node::Node,
};

/// Immutable, ordered snapshot of the group membership.
///
/// Everything that computes targets or elects owners works on one of these
/// rather than re-reading the live view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    epoch: u64,
    nodes: Arc<[Node]>,
}

impl View {
    pub fn new(epoch: u64, nodes: Vec<Node>) -> Self {
        Self {
            epoch,
            nodes: nodes.into(),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.nodes.contains(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Members of this view that are not in `excluded`, in view order.
    pub fn without(&self, excluded: &[Node]) -> Vec<Node> {
        self.nodes
            .iter()
            .filter(|node| !excluded.contains(node))
            .cloned()
            .collect()
    }
}

/// Membership of the cooperating processes, as seen from this process.
pub trait Group: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn local_node(&self) -> &Node;

    /// The current view. Two calls within one epoch return the same order.
    fn view(&self) -> View;

    /// A receiver that observes every view installed from now on.
    fn watch(&self) -> watch::Receiver<View>;

    /// Registers a listener for view changes. Dropping the returned handle
    /// unregisters it.
    fn register(&self, listener: Arc<dyn MembershipListener>) -> Registration;

    fn coordinator(&self) -> Option<Node> {
        self.view().nodes().first().cloned()
    }

    fn is_coordinator(&self) -> bool {
        self.coordinator().as_ref() == Some(self.local_node())
    }
}
