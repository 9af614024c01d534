#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use cluster_dispatch::{
    local_transport::LocalTransport, ChannelRegistry, Command, CommandDispatcher,
    CommandDispatcherFactory, ManagedGroup, Node,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;

pub const CHANNEL: &str = "greeter";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn node(name: &str, port: u16) -> Node {
    Node::new(name, ([127, 0, 0, 1], port).into())
}

/// Per-node state that commands run against.
pub struct Counter {
    pub name: String,
    pub executed: AtomicUsize,
    pub gate: Notify,
}

impl Counter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            executed: AtomicUsize::new(0),
            gate: Notify::new(),
        }
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GreetError {
    #[error("refused: {0}")]
    Refused(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Greet {
    pub greeting: String,
}

impl Greet {
    pub fn new(greeting: &str) -> Self {
        Self {
            greeting: greeting.to_string(),
        }
    }
}

#[async_trait]
impl Command<Counter> for Greet {
    type Output = String;
    type Error = GreetError;

    const NAME: &'static str = "greet";

    async fn execute(&self, context: &Counter) -> Result<String, GreetError> {
        context.executed.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{} from {}", self.greeting, context.name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refuse {
    pub reason: String,
}

#[async_trait]
impl Command<Counter> for Refuse {
    type Output = ();
    type Error = GreetError;

    const NAME: &'static str = "refuse";

    async fn execute(&self, context: &Counter) -> Result<(), GreetError> {
        context.executed.fetch_add(1, Ordering::SeqCst);
        Err(GreetError::Refused(self.reason.clone()))
    }
}

/// Blocks until the target's gate is opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stall;

#[async_trait]
impl Command<Counter> for Stall {
    type Output = String;
    type Error = GreetError;

    const NAME: &'static str = "stall";

    async fn execute(&self, context: &Counter) -> Result<String, GreetError> {
        context.gate.notified().await;
        context.executed.fetch_add(1, Ordering::SeqCst);
        Ok(context.name.clone())
    }
}

/// Registered nowhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unknown;

#[async_trait]
impl Command<Counter> for Unknown {
    type Output = ();
    type Error = GreetError;

    const NAME: &'static str = "unknown";

    async fn execute(&self, _: &Counter) -> Result<(), GreetError> {
        Ok(())
    }
}

pub struct TestNode {
    pub node: Node,
    pub group: Arc<ManagedGroup>,
    pub registry: Arc<ChannelRegistry>,
    pub factory: CommandDispatcherFactory,
}

impl TestNode {
    pub fn open(&self) -> CommandDispatcher<Counter> {
        let dispatcher = self
            .factory
            .create_command_dispatcher(CHANNEL, Counter::new(&self.node.name))
            .unwrap();
        dispatcher.register::<Greet>();
        dispatcher.register::<Refuse>();
        dispatcher.register::<Stall>();
        dispatcher
    }
}

/// Builds one process per name, all sharing `transport`, each with a view of
/// every node in the given order.
pub async fn cluster(transport: Arc<LocalTransport>, names: &[&str]) -> Vec<TestNode> {
    let nodes: Vec<Node> = names
        .iter()
        .enumerate()
        .map(|(i, name)| node(name, 7600 + i as u16))
        .collect();

    let mut members = Vec::new();
    for node in &nodes {
        let registry = ChannelRegistry::new(node.clone());
        transport.register(registry.clone()).await;

        let group = Arc::new(ManagedGroup::new("test", node.clone()));
        group.install_view(nodes.clone());

        let factory = CommandDispatcherFactory::new(
            group.clone(),
            transport.clone(),
            registry.clone(),
        );
        members.push(TestNode {
            node: node.clone(),
            group,
            registry,
            factory,
        });
    }
    members
}
