use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use cluster_dispatch::{
    config::ClusterConfig, http_transport::HttpTransport, routes, ChannelRegistry, Command,
    CommandDispatcherFactory, Group, ManagedGroup, Singleton, SingletonService,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

struct NodeStatus {
    name: String,
    started: Instant,
}

#[derive(Serialize, Deserialize)]
struct Uptime;

#[derive(Debug, Error, Serialize, Deserialize)]
#[error("{0}")]
struct StatusError(String);

#[async_trait]
impl Command<NodeStatus> for Uptime {
    type Output = (String, u64);
    type Error = StatusError;

    const NAME: &'static str = "uptime";

    async fn execute(&self, context: &NodeStatus) -> Result<Self::Output, Self::Error> {
        Ok((context.name.clone(), context.started.elapsed().as_secs()))
    }
}

struct LoggingSingleton(String);

#[async_trait]
impl Singleton for LoggingSingleton {
    async fn start(&self) {
        info!("Singleton {} is now running on this node", self.0);
    }

    async fn stop(&self) {
        info!("Singleton {} stopped on this node", self.0);
    }
}

#[tokio::main]
async fn main() {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).unwrap();

    let path = std::env::args().nth(1).expect("config path required");
    let config = ClusterConfig::load(&path).expect("invalid configuration");

    let registry = ChannelRegistry::new(config.node.clone());
    let group = Arc::new(ManagedGroup::new(config.group.clone(), config.node.clone()));
    group.install_view(config.members.clone());

    let factory = CommandDispatcherFactory::new(
        group.clone(),
        Arc::new(HttpTransport::new()),
        registry.clone(),
    );

    let status = factory
        .create_command_dispatcher(
            "status",
            NodeStatus {
                name: config.node.name.clone(),
                started: Instant::now(),
            },
        )
        .expect("status dispatcher");
    status.register::<Uptime>();

    let singleton = config.singleton.as_ref().map(|singleton| {
        SingletonService::new(
            singleton.name.clone(),
            group.clone(),
            singleton.policy.build(),
            Arc::new(LoggingSingleton(singleton.name.clone())),
        )
        .with_quorum(singleton.quorum)
    });
    if let Some(singleton) = &singleton {
        singleton.start().await;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(10));
        loop {
            interval.tick().await;
            let local = status.context().name.clone();
            match status.execute_on_cluster(&Uptime, &[]).await {
                Ok(responses) => {
                    for (node, response) in responses {
                        match response.get() {
                            Ok((name, secs)) => info!("{} sees {} up for {}s", local, name, secs),
                            Err(e) => warn!("{} could not query {}: {}", local, node, e),
                        }
                    }
                }
                Err(e) => warn!("{}", e),
            }
        }
    });

    let router = routes::make_router(registry);
    let address = group.local_node().address;
    let listener = TcpListener::bind(address).await.unwrap();
    info!("Node {} listening on {}", config.node.name, address);
    axum::serve(listener, router.into_make_service())
        .await
        .unwrap();
}
