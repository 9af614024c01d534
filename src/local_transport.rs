use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    channel::ChannelRegistry,
    error::DispatchError,
    message::{Envelope, Reply},
    node::Node,
    transport::Transport,
};

/// Simulated one-way delay, chosen uniformly per message.
#[derive(Debug, Copy, Clone)]
pub struct Latency {
    min: Duration,
    max: Duration,
}

impl Latency {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
        }
    }

    fn choose(&self) -> Duration {
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

/// Routes envelopes between registries living in the same process.
#[derive(Default)]
pub struct LocalTransport {
    nodes: RwLock<HashMap<Node, Arc<ChannelRegistry>>>,
    latency: Option<Latency>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Latency) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            latency: Some(latency),
        }
    }

    pub async fn register(&self, registry: Arc<ChannelRegistry>) {
        self.nodes
            .write()
            .await
            .insert(registry.node().clone(), registry);
    }

    /// Makes `node` unreachable, as if its process had died.
    pub async fn deregister(&self, node: &Node) {
        self.nodes.write().await.remove(node);
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send(&self, target: &Node, envelope: Envelope) -> Result<Reply, DispatchError> {
        if let Some(latency) = self.latency {
            let delay = latency.choose();
            debug!("Delivering {} to {} after {:?}", envelope.command, target, delay);
            tokio::time::sleep(delay).await;
        }
        let registry = self.nodes.read().await.get(target).cloned();
        match registry {
            Some(registry) => Ok(registry.dispatch(envelope).await),
            None => Err(DispatchError::NodeUnavailable(target.clone())),
        }
    }
}
