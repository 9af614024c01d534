use std::{
    future::Future,
    pin::Pin,
    task::{ready, Context, Poll},
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::task::JoinHandle;

use crate::{
    error::{CommandError, DispatchError},
    node::Node,
};

/// A unit of work that can be shipped to another node and executed there
/// against that node's context.
///
/// `NAME` tags the payload on the wire. It must be unique among the commands
/// registered with one dispatcher.
#[async_trait]
pub trait Command<C>: Serialize + DeserializeOwned + Send + Sync + 'static
where
    C: Send + Sync + 'static,
{
    type Output: Serialize + DeserializeOwned + Send + 'static;
    type Error: std::error::Error + Serialize + DeserializeOwned + Send + 'static;

    const NAME: &'static str;

    async fn execute(&self, context: &C) -> Result<Self::Output, Self::Error>;
}

/// The settled result of one command on one node.
#[derive(Debug)]
pub struct CommandResponse<R, E> {
    result: Result<R, CommandError<E>>,
}

impl<R, E> CommandResponse<R, E> {
    pub fn get(self) -> Result<R, CommandError<E>> {
        self.result
    }

    pub fn as_result(&self) -> &Result<R, CommandError<E>> {
        &self.result
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

impl<R, E> From<Result<R, CommandError<E>>> for CommandResponse<R, E> {
    fn from(result: Result<R, CommandError<E>>) -> Self {
        Self { result }
    }
}

/// Completes once the command has settled on its target node.
///
/// Dropping the handle does not cancel the command, and there is no timeout:
/// wrap it in `tokio::time::timeout` for a bounded wait.
#[derive(Debug)]
pub struct CommandHandle<R, E> {
    node: Node,
    task: JoinHandle<Result<R, CommandError<E>>>,
}

impl<R, E> CommandHandle<R, E> {
    pub(crate) fn new(node: Node, task: JoinHandle<Result<R, CommandError<E>>>) -> Self {
        Self { node, task }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<R, E> Future for CommandHandle<R, E> {
    type Output = Result<R, CommandError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match ready!(Pin::new(&mut this.task).poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(e) => Poll::Ready(Err(CommandError::Dispatch(DispatchError::Interrupted {
                node: this.node.clone(),
                reason: e.to_string(),
            }))),
        }
    }
}
