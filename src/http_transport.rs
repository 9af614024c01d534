use async_trait::async_trait;
use tracing::{debug, error};

use crate::{
    error::DispatchError,
    message::{Envelope, Reply},
    node::Node,
    routes::DISPATCH_PATH,
    transport::Transport,
};

/// Posts envelopes as JSON to the target's `/dispatch` route.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, target: &Node, envelope: Envelope) -> Result<Reply, DispatchError> {
        let url = target.url(DISPATCH_PATH);
        debug!("Sending {} to {}", envelope.command, url);

        let response = self
            .client
            .post(&url)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| {
                error!("Error sending {} to {}: {}", envelope.command, url, e);
                DispatchError::Unreachable {
                    node: target.clone(),
                    reason: e.to_string(),
                }
            })?;

        if !response.status().is_success() {
            error!("Error sending {} to {}: {}", envelope.command, url, response.status());
            return Err(DispatchError::Unreachable {
                node: target.clone(),
                reason: format!("unexpected status {}", response.status()),
            });
        }

        response
            .json::<Reply>()
            .await
            .map_err(|e| DispatchError::Codec(e.to_string()))
    }
}
