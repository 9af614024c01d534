//! Runs a service on exactly one member of the group, re-electing the owner
//! whenever membership changes.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::{
    election::SingletonElectionPolicy,
    group::{Group, View},
    membership::{ListenerError, MembershipEvent, MembershipListener, Registration},
    node::Node,
};

/// The service that only the elected node runs.
#[async_trait]
pub trait Singleton: Send + Sync + 'static {
    async fn start(&self);
    async fn stop(&self);
}

struct Election {
    /// Set while the service is not started. Events still queued for the
    /// elector when it stops are dropped instead of electing.
    stopped: bool,
    epoch: Option<u64>,
    primary: Option<Node>,
}

struct Elector {
    name: String,
    group: Arc<dyn Group>,
    policy: Arc<dyn SingletonElectionPolicy>,
    quorum: usize,
    singleton: Arc<dyn Singleton>,
    election: AsyncMutex<Election>,
    running: watch::Sender<bool>,
}

impl Elector {
    async fn elect(&self, view: &View) {
        let mut election = self.election.lock().await;
        if election.stopped {
            debug!("Singleton {} is stopped, ignoring view {}", self.name, view.epoch());
            return;
        }
        if election.epoch.is_some_and(|epoch| epoch >= view.epoch()) {
            debug!("Singleton {} ignoring stale view {}", self.name, view.epoch());
            return;
        }
        election.epoch = Some(view.epoch());

        let primary = if view.len() < self.quorum {
            warn!(
                "Singleton {} has {} of {} required members, electing nobody",
                self.name,
                view.len(),
                self.quorum
            );
            None
        } else {
            self.policy.elect(view.nodes()).cloned()
        };

        let local = self.group.local_node();
        let was_running = *self.running.borrow();
        let should_run = primary.as_ref() == Some(local);
        election.primary = primary;

        if should_run && !was_running {
            info!("Singleton {} elected {}, starting", self.name, local);
            self.singleton.start().await;
            self.running.send_replace(true);
        } else if !should_run && was_running {
            info!("Singleton {} no longer elects {}, stopping", self.name, local);
            self.singleton.stop().await;
            self.running.send_replace(false);
        }
    }

    async fn resume(&self) {
        self.election.lock().await.stopped = false;
    }

    async fn shutdown(&self) {
        let mut election = self.election.lock().await;
        election.stopped = true;
        election.epoch = None;
        election.primary = None;
        let running = *self.running.borrow();
        if running {
            info!("Singleton {} stopping on {}", self.name, self.group.local_node());
            self.singleton.stop().await;
            self.running.send_replace(false);
        }
    }
}

#[async_trait]
impl MembershipListener for Elector {
    async fn membership_changed(&self, event: &MembershipEvent) -> Result<(), ListenerError> {
        self.elect(&event.view).await;
        Ok(())
    }
}

/// Elects an owner on start and on every view change, and starts or stops
/// the local [`Singleton`] accordingly.
pub struct SingletonService {
    elector: Arc<Elector>,
    registration: Mutex<Option<Registration>>,
}

impl SingletonService {
    pub fn new(
        name: impl Into<String>,
        group: Arc<dyn Group>,
        policy: Arc<dyn SingletonElectionPolicy>,
        singleton: Arc<dyn Singleton>,
    ) -> Self {
        let (running, _) = watch::channel(false);
        Self {
            elector: Arc::new(Elector {
                name: name.into(),
                group,
                policy,
                quorum: 1,
                singleton,
                election: AsyncMutex::new(Election {
                    stopped: true,
                    epoch: None,
                    primary: None,
                }),
                running,
            }),
            registration: Mutex::new(None),
        }
    }

    /// Minimum number of members required to elect anybody.
    ///
    /// Must be set before the service is started.
    pub fn with_quorum(mut self, quorum: usize) -> Self {
        if let Some(elector) = Arc::get_mut(&mut self.elector) {
            elector.quorum = quorum.max(1);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.elector.name
    }

    pub async fn start(&self) {
        {
            let mut registration = self.registration.lock();
            if registration.is_some() {
                return;
            }
            *registration = Some(self.elector.group.register(self.elector.clone()));
        }
        self.elector.resume().await;
        let view = self.elector.group.view();
        self.elector.elect(&view).await;
    }

    /// Stops the local singleton if it runs here. The service can be started
    /// again later.
    pub async fn stop(&self) {
        let registration = self.registration.lock().take();
        drop(registration);
        self.elector.shutdown().await;
    }

    pub fn is_primary(&self) -> bool {
        *self.elector.running.borrow()
    }

    /// The node elected by the most recent election, if any.
    pub async fn primary_provider(&self) -> Option<Node> {
        self.elector.election.lock().await.primary.clone()
    }

    pub fn watch_primary(&self) -> watch::Receiver<bool> {
        self.elector.running.subscribe()
    }
}
