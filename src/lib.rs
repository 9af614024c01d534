//! Cluster coordination core: command dispatch across nodes, membership-change
//! notification, and singleton election.

pub mod channel;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod election;
pub mod error;
pub mod factory;
pub mod group;
pub mod http_transport;
pub mod local_transport;
pub mod managed_group;
pub mod membership;
pub mod message;
pub mod node;
pub mod routes;
pub mod singleton;
pub mod transport;

pub use channel::ChannelRegistry;
pub use command::{Command, CommandHandle, CommandResponse};
pub use dispatcher::CommandDispatcher;
pub use election::{
    NamePreference, Preference, PreferredSingletonElectionPolicy, SimpleSingletonElectionPolicy,
    SingletonElectionPolicy, SocketAddressPreference,
};
pub use error::{CommandError, DispatchError, UsageError};
pub use factory::CommandDispatcherFactory;
pub use group::{Group, View};
pub use managed_group::ManagedGroup;
pub use membership::{MembershipEvent, MembershipListener, Registration};
pub use node::Node;
pub use singleton::{Singleton, SingletonService};
pub use transport::Transport;
