use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::{
    channel::ChannelRegistry,
    message::{Envelope, Reply},
};

pub const DISPATCH_PATH: &str = "/dispatch";

/// Serves this process's registry to `HttpTransport` peers.
pub fn make_router(registry: Arc<ChannelRegistry>) -> Router {
    Router::new()
        .route(DISPATCH_PATH, post(dispatch_handler))
        .with_state(registry)
        .layer(TraceLayer::new_for_http())
}

async fn dispatch_handler(
    State(registry): State<Arc<ChannelRegistry>>,
    Json(envelope): Json<Envelope>,
) -> Json<Reply> {
    debug!("Received {} for dispatcher {}", envelope.command, envelope.id);
    Json(registry.dispatch(envelope).await)
}
