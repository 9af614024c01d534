use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{
    channel::{Channel, ChannelRegistry, LocalChannel},
    command::{Command, CommandHandle, CommandResponse},
    error::{CommandError, DispatchError, UsageError},
    group::{Group, View},
    message::Envelope,
    node::Node,
    transport::Transport,
};

pub type ClusterResponses<R, E> = HashMap<Node, CommandResponse<R, E>>;
pub type ClusterHandles<R, E> = HashMap<Node, CommandHandle<R, E>>;

/// Sends commands over one logical channel, identified by `id`, to the nodes
/// of a group.
///
/// Every submission spawns one task per target node onto the current tokio
/// runtime. The `execute_*` methods simply await those tasks.
pub struct CommandDispatcher<C> {
    id: String,
    channel: Arc<LocalChannel<C>>,
    group: Arc<dyn Group>,
    transport: Arc<dyn Transport>,
    registry: Arc<ChannelRegistry>,
    closed: AtomicBool,
}

impl<C: Send + Sync + 'static> CommandDispatcher<C> {
    pub(crate) fn new(
        id: String,
        channel: Arc<LocalChannel<C>>,
        group: Arc<dyn Group>,
        transport: Arc<dyn Transport>,
        registry: Arc<ChannelRegistry>,
    ) -> Self {
        Self {
            id,
            channel,
            group,
            transport,
            registry,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context(&self) -> &C {
        self.channel.context()
    }

    /// Lets this node execute commands of type `T` sent on this channel.
    pub fn register<T: Command<C>>(&self) {
        self.channel.register::<T>();
    }

    pub async fn execute_on_node<T: Command<C>>(
        &self,
        command: &T,
        node: &Node,
    ) -> Result<CommandResponse<T::Output, T::Error>, UsageError> {
        let handle = self.submit_on_node(command, node)?;
        Ok(handle.await.into())
    }

    /// Runs `command` on every member of the current view except `excluded`
    /// and waits until each of them has replied or failed.
    pub async fn execute_on_cluster<T: Command<C>>(
        &self,
        command: &T,
        excluded: &[Node],
    ) -> Result<ClusterResponses<T::Output, T::Error>, UsageError> {
        let handles = self.submit_on_cluster(command, excluded)?;
        let mut responses = HashMap::with_capacity(handles.len());
        for (node, handle) in handles {
            responses.insert(node, handle.await.into());
        }
        Ok(responses)
    }

    /// Returns as soon as the dispatch task is spawned.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit_on_node<T: Command<C>>(
        &self,
        command: &T,
        node: &Node,
    ) -> Result<CommandHandle<T::Output, T::Error>, UsageError> {
        self.ensure_open()?;
        let envelope = self.envelope(command);
        Ok(self.spawn::<T>(node.clone(), envelope))
    }

    /// Targets are the members of the view current at the time of this call.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit_on_cluster<T: Command<C>>(
        &self,
        command: &T,
        excluded: &[Node],
    ) -> Result<ClusterHandles<T::Output, T::Error>, UsageError> {
        self.ensure_open()?;
        let envelope = self.envelope(command);
        let targets = self.group.view().without(excluded);
        debug!(
            "Submitting {} on dispatcher {} to {} nodes",
            T::NAME,
            self.id,
            targets.len()
        );
        Ok(targets
            .into_iter()
            .map(|node| {
                let handle = self.spawn::<T>(node.clone(), envelope.clone());
                (node, handle)
            })
            .collect())
    }

    /// Stops this dispatcher from issuing new commands. Commands already in
    /// flight run to completion. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.registry.release(&self.id);
        info!("Command dispatcher {} closed", self.id);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), UsageError> {
        if self.is_closed() {
            Err(UsageError::Closed(self.id.clone()))
        } else {
            Ok(())
        }
    }

    fn envelope<T: Command<C>>(&self, command: &T) -> Result<Envelope, DispatchError> {
        let payload =
            serde_json::to_value(command).map_err(|e| DispatchError::Codec(e.to_string()))?;
        Ok(Envelope {
            id: self.id.clone(),
            command: T::NAME.to_string(),
            payload,
        })
    }

    fn spawn<T: Command<C>>(
        &self,
        node: Node,
        envelope: Result<Envelope, DispatchError>,
    ) -> CommandHandle<T::Output, T::Error> {
        let local = if self.group.local_node() == &node {
            Some(self.channel.clone() as Arc<dyn Channel>)
        } else {
            None
        };
        let delivery = Delivery {
            local,
            target: node.clone(),
            transport: self.transport.clone(),
            views: self.group.watch(),
        };
        CommandHandle::new(node, tokio::spawn(delivery.run(envelope)))
    }
}

/// Everything one per-node dispatch task needs, detached from the dispatcher
/// so the task outlives a close.
///
/// A local target runs on the dispatcher's own channel, which stays alive for
/// the task even after the registry has released it.
struct Delivery {
    local: Option<Arc<dyn Channel>>,
    target: Node,
    transport: Arc<dyn Transport>,
    views: watch::Receiver<View>,
}

impl Delivery {
    async fn run<R: DeserializeOwned, E: DeserializeOwned>(
        mut self,
        envelope: Result<Envelope, DispatchError>,
    ) -> Result<R, CommandError<E>> {
        let envelope = envelope?;
        if let Some(channel) = self.local {
            return channel
                .invoke(&envelope.command, envelope.payload)
                .await
                .decode();
        }

        let member = self.views.borrow_and_update().contains(&self.target);
        if !member {
            return Err(DispatchError::NodeUnavailable(self.target).into());
        }

        let target = &self.target;
        tokio::select! {
            biased;
            reply = self.transport.send(target, envelope) => reply?.decode(),
            _ = departure(&mut self.views, target) => {
                debug!("{} left the view before replying", target);
                Err(DispatchError::NodeUnavailable(target.clone()).into())
            }
        }
    }
}

impl<C> Drop for CommandDispatcher<C> {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.registry.release(&self.id);
            debug!("Command dispatcher {} released on drop", self.id);
        }
    }
}

/// Resolves once `node` is no longer a member of the watched view.
async fn departure(views: &mut watch::Receiver<View>, node: &Node) {
    loop {
        if views.changed().await.is_err() {
            // The group is gone; no further view can remove the node.
            std::future::pending::<()>().await;
        }
        let member = views.borrow_and_update().contains(node);
        if !member {
            return;
        }
    }
}
