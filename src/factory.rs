use std::sync::Arc;

use tracing::info;

use crate::{
    channel::ChannelRegistry,
    dispatcher::CommandDispatcher,
    error::UsageError,
    group::Group,
    transport::Transport,
};

/// Creates command dispatchers over one group.
///
/// Dispatchers created with the same id on different processes form one
/// logical channel: a command sent under that id runs against the context
/// each process supplied for it.
#[derive(Clone)]
pub struct CommandDispatcherFactory {
    group: Arc<dyn Group>,
    transport: Arc<dyn Transport>,
    registry: Arc<ChannelRegistry>,
}

impl CommandDispatcherFactory {
    /// `registry` must be the one the transport serves for the group's local
    /// node.
    pub fn new(
        group: Arc<dyn Group>,
        transport: Arc<dyn Transport>,
        registry: Arc<ChannelRegistry>,
    ) -> Self {
        debug_assert_eq!(group.local_node(), registry.node());
        Self {
            group,
            transport,
            registry,
        }
    }

    pub fn group(&self) -> &Arc<dyn Group> {
        &self.group
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Fails if `id` is already open on this process with a different context
    /// type.
    pub fn create_command_dispatcher<C: Send + Sync + 'static>(
        &self,
        id: impl Into<String>,
        context: C,
    ) -> Result<CommandDispatcher<C>, UsageError> {
        let id = id.into();
        let channel = self.registry.open(&id, context)?;
        info!(
            "Created command dispatcher {} in group {}",
            id,
            self.group.name()
        );
        Ok(CommandDispatcher::new(
            id,
            channel,
            self.group.clone(),
            self.transport.clone(),
            self.registry.clone(),
        ))
    }
}
