//! The receiving side of dispatch: which dispatcher ids are open on this
//! process, with which context, accepting which commands.

use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    command::Command,
    error::{DispatchError, UsageError},
    message::{Envelope, Reply},
    node::Node,
};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type Handler<C> = Arc<dyn Fn(Arc<C>, Value) -> BoxFuture<Reply> + Send + Sync>;

#[async_trait]
pub(crate) trait Channel: Send + Sync {
    async fn invoke(&self, command: &str, payload: Value) -> Reply;
}

/// One open dispatcher id on this process.
pub(crate) struct LocalChannel<C> {
    id: String,
    node: Node,
    context: Arc<C>,
    handlers: RwLock<HashMap<&'static str, Handler<C>>>,
}

impl<C: Send + Sync + 'static> LocalChannel<C> {
    fn new(id: String, node: Node, context: C) -> Self {
        Self {
            id,
            node,
            context: Arc::new(context),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn context(&self) -> &C {
        &self.context
    }

    pub(crate) fn register<T: Command<C>>(&self) {
        let handler: Handler<C> = Arc::new(|context: Arc<C>, payload: Value| {
            Box::pin(async move {
                let command: T = match serde_json::from_value(payload) {
                    Ok(command) => command,
                    Err(e) => return Reply::Rejected(DispatchError::Codec(e.to_string())),
                };
                match command.execute(&context).await {
                    Ok(result) => Reply::success(&result),
                    Err(e) => Reply::failure(&e),
                }
            }) as BoxFuture<Reply>
        });
        self.handlers.write().insert(T::NAME, handler);
        debug!("Dispatcher {} accepts command {}", self.id, T::NAME);
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> Channel for LocalChannel<C> {
    async fn invoke(&self, command: &str, payload: Value) -> Reply {
        let handler = {
            let handlers = self.handlers.read();
            handlers.get(command).cloned()
        };
        match handler {
            Some(handler) => handler(self.context.clone(), payload).await,
            None => Reply::Rejected(DispatchError::UnknownCommand {
                node: self.node.clone(),
                id: self.id.clone(),
                command: command.to_string(),
            }),
        }
    }
}

struct Entry {
    context_type: TypeId,
    context_name: &'static str,
    channel: Arc<dyn Channel>,
    typed: Arc<dyn Any + Send + Sync>,
    references: usize,
}

/// Process-wide table of open dispatcher ids.
///
/// Entries are opened by the factory and released when the dispatchers that
/// opened them close.
pub struct ChannelRegistry {
    node: Node,
    channels: RwLock<HashMap<String, Entry>>,
}

impl ChannelRegistry {
    pub fn new(node: Node) -> Arc<Self> {
        Arc::new(Self {
            node,
            channels: RwLock::new(HashMap::new()),
        })
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn contains(&self, id: &str) -> bool {
        self.channels.read().contains_key(id)
    }

    /// Opens `id`, or joins it if it is already open with the same context
    /// type. A joining caller's context is dropped: the first one stays in
    /// effect until every dispatcher for `id` has closed.
    pub(crate) fn open<C: Send + Sync + 'static>(
        &self,
        id: &str,
        context: C,
    ) -> Result<Arc<LocalChannel<C>>, UsageError> {
        let mut channels = self.channels.write();

        if let Some(entry) = channels.get_mut(id) {
            if entry.context_type != TypeId::of::<C>() {
                return Err(UsageError::ContextMismatch {
                    id: id.to_string(),
                    existing: entry.context_name,
                    requested: type_name::<C>(),
                });
            }
            let channel = entry
                .typed
                .clone()
                .downcast::<LocalChannel<C>>()
                .map_err(|_| UsageError::ContextMismatch {
                    id: id.to_string(),
                    existing: entry.context_name,
                    requested: type_name::<C>(),
                })?;
            entry.references += 1;
            debug!("Dispatcher {} joined, {} references", id, entry.references);
            return Ok(channel);
        }

        let channel = Arc::new(LocalChannel::new(id.to_string(), self.node.clone(), context));
        channels.insert(
            id.to_string(),
            Entry {
                context_type: TypeId::of::<C>(),
                context_name: type_name::<C>(),
                channel: channel.clone(),
                typed: channel.clone(),
                references: 1,
            },
        );
        info!("Opened command dispatcher {} on {}", id, self.node);
        Ok(channel)
    }

    pub(crate) fn release(&self, id: &str) {
        let mut channels = self.channels.write();
        if let Some(entry) = channels.get_mut(id) {
            entry.references -= 1;
            if entry.references == 0 {
                channels.remove(id);
                info!("Closed command dispatcher {} on {}", id, self.node);
            }
        }
    }

    /// Runs an incoming envelope against the matching local channel.
    pub async fn dispatch(&self, envelope: Envelope) -> Reply {
        let channel = {
            let channels = self.channels.read();
            channels.get(&envelope.id).map(|entry| entry.channel.clone())
        };
        match channel {
            Some(channel) => {
                debug!(
                    "Executing {} on dispatcher {} of {}",
                    envelope.command, envelope.id, self.node
                );
                channel.invoke(&envelope.command, envelope.payload).await
            }
            None => {
                debug!("No dispatcher {} on {}", envelope.id, self.node);
                Reply::Rejected(DispatchError::NoSuchDispatcher {
                    node: self.node.clone(),
                    id: envelope.id,
                })
            }
        }
    }
}
