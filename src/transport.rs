use async_trait::async_trait;

use crate::{
    error::DispatchError,
    message::{Envelope, Reply},
    node::Node,
};

/// Delivers an envelope to a remote node's channel registry and brings the
/// reply back.
///
/// An `Err` means the command never reached the target or its reply was lost.
/// Rejections decided by the target itself travel inside the `Reply`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, target: &Node, envelope: Envelope) -> Result<Reply, DispatchError>;
}
