use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::info;

use crate::{
    group::{Group, View},
    membership::{ListenerRegistry, MembershipEvent, MembershipListener, Registration},
    node::Node,
};

/// A group whose views are installed explicitly by whatever detects
/// membership: a failure detector, a static configuration, or a test.
pub struct ManagedGroup {
    name: String,
    local: Node,
    views: watch::Sender<View>,
    listeners: Arc<ListenerRegistry>,
    // Serializes installs so events are published in the order views change.
    installing: Mutex<()>,
}

impl ManagedGroup {
    /// Starts with a view holding only the local node.
    pub fn new(name: impl Into<String>, local: Node) -> Self {
        let (views, _) = watch::channel(View::new(0, vec![local.clone()]));
        Self {
            name: name.into(),
            local,
            views,
            listeners: ListenerRegistry::new(),
            installing: Mutex::new(()),
        }
    }

    /// Replaces the view. Duplicate nodes keep their first position.
    pub fn install_view(&self, nodes: Vec<Node>) -> MembershipEvent {
        self.install(nodes, Vec::new())
    }

    /// Installs the union of previously partitioned views, in partition
    /// order. With fewer than two partitions this is an ordinary install.
    pub fn merge_views(&self, partitions: Vec<Vec<Node>>) -> MembershipEvent {
        let nodes = partitions.iter().flatten().cloned().collect();
        let merge_groups = if partitions.len() > 1 {
            partitions
        } else {
            Vec::new()
        };
        self.install(nodes, merge_groups)
    }

    fn install(&self, nodes: Vec<Node>, merge_groups: Vec<Vec<Node>>) -> MembershipEvent {
        let _installing = self.installing.lock();

        let mut seen = HashSet::new();
        let nodes = nodes
            .into_iter()
            .filter(|node| seen.insert(node.clone()))
            .collect();

        let previous = self.views.borrow().clone();
        let next = View::new(previous.epoch() + 1, nodes);
        let event = MembershipEvent::between(&previous, &next, merge_groups);

        info!(
            "Group {} installed view {} with {} members ({} joined, {} left{})",
            self.name,
            next.epoch(),
            next.len(),
            event.new_nodes.len(),
            event.dead_nodes.len(),
            if event.is_merge() { ", merged" } else { "" }
        );

        self.views.send_replace(next);
        self.listeners.notify(&event);
        event
    }
}

impl Group for ManagedGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn local_node(&self) -> &Node {
        &self.local
    }

    fn view(&self) -> View {
        self.views.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<View> {
        self.views.subscribe()
    }

    fn register(&self, listener: Arc<dyn MembershipListener>) -> Registration {
        self.listeners.register(listener)
    }
}
