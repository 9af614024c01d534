//! View-change events and their delivery to listeners.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, error, warn};

use crate::{group::View, node::Node};

pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Difference between two consecutive views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipEvent {
    pub view: View,
    pub dead_nodes: Vec<Node>,
    pub new_nodes: Vec<Node>,
    /// Former partitions, when `view` is the result of a merge. Empty for an
    /// ordinary join or leave.
    pub merge_groups: Vec<Vec<Node>>,
}

impl MembershipEvent {
    pub fn between(previous: &View, next: &View, merge_groups: Vec<Vec<Node>>) -> Self {
        let before: HashSet<&Node> = previous.nodes().iter().collect();
        let after: HashSet<&Node> = next.nodes().iter().collect();

        let dead_nodes = previous
            .nodes()
            .iter()
            .filter(|node| !after.contains(node))
            .cloned()
            .collect();
        let new_nodes = next
            .nodes()
            .iter()
            .filter(|node| !before.contains(node))
            .cloned()
            .collect();

        Self {
            view: next.clone(),
            dead_nodes,
            new_nodes,
            merge_groups,
        }
    }

    pub fn is_merge(&self) -> bool {
        !self.merge_groups.is_empty()
    }
}

#[async_trait]
pub trait MembershipListener: Send + Sync + 'static {
    async fn membership_changed(&self, event: &MembershipEvent) -> Result<(), ListenerError>;
}

/// Fans view changes out to registered listeners.
///
/// Every listener owns a queue drained by its own task, so one listener sees
/// events in order and never concurrently, while a slow or failing listener
/// holds up nobody else.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    queues: Mutex<HashMap<u64, UnboundedSender<MembershipEvent>>>,
}

impl ListenerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Must be called from within a tokio runtime.
    pub fn register(self: &Arc<Self>, listener: Arc<dyn MembershipListener>) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = unbounded_channel::<MembershipEvent>();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let listener = listener.clone();
                let epoch = event.view.epoch();
                let outcome =
                    tokio::spawn(async move { listener.membership_changed(&event).await }).await;
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Membership listener {} failed on view {}: {}", id, epoch, e),
                    Err(e) => error!("Membership listener {} panicked on view {}: {}", id, epoch, e),
                }
            }
            debug!("Membership listener {} unregistered", id);
        });

        self.queues.lock().insert(id, tx);
        Registration {
            id,
            registry: Arc::downgrade(self),
        }
    }

    pub fn notify(&self, event: &MembershipEvent) {
        self.queues
            .lock()
            .retain(|_, queue| queue.send(event.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.queues.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn unregister(&self, id: u64) {
        self.queues.lock().remove(&id);
    }
}

/// Keeps a listener registered for as long as it is alive.
pub struct Registration {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl Registration {
    /// Unregisters the listener now rather than when the registration drops.
    /// Events already queued for it are still delivered.
    pub fn close(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }
}
