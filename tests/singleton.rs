mod common;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use cluster_dispatch::{
    Group, ManagedGroup, NamePreference, Node, Preference, PreferredSingletonElectionPolicy,
    SimpleSingletonElectionPolicy, Singleton, SingletonElectionPolicy, SingletonService,
};
use common::*;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Tracked {
    starts: AtomicUsize,
    stops: AtomicUsize,
}

#[async_trait]
impl Singleton for Tracked {
    async fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

struct Member {
    group: Arc<ManagedGroup>,
    singleton: Arc<Tracked>,
    service: SingletonService,
}

fn members(
    names: &[&str],
    policy: impl Fn() -> Arc<dyn SingletonElectionPolicy>,
    quorum: usize,
) -> (Vec<Node>, Vec<Member>) {
    let nodes: Vec<Node> = names
        .iter()
        .enumerate()
        .map(|(i, name)| node(name, 7800 + i as u16))
        .collect();
    let members = nodes
        .iter()
        .map(|local| {
            let group = Arc::new(ManagedGroup::new("test", local.clone()));
            group.install_view(nodes.clone());
            let singleton = Arc::new(Tracked::default());
            let service =
                SingletonService::new("scheduler", group.clone(), policy(), singleton.clone())
                    .with_quorum(quorum);
            Member {
                group,
                singleton,
                service,
            }
        })
        .collect();
    (nodes, members)
}

fn simple() -> Arc<dyn SingletonElectionPolicy> {
    Arc::new(SimpleSingletonElectionPolicy::default())
}

async fn until_primary(member: &Member, primary: bool) {
    let mut running = member.service.watch_primary();
    timeout(WAIT, running.wait_for(|running| *running == primary))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn exactly_one_member_runs_the_singleton() {
    init_tracing();
    let (nodes, members) = members(&["a", "b", "c"], simple, 1);
    for member in &members {
        member.service.start().await;
    }

    assert!(members[0].service.is_primary());
    assert!(!members[1].service.is_primary());
    assert!(!members[2].service.is_primary());
    assert_eq!(members[0].singleton.starts.load(Ordering::SeqCst), 1);
    assert_eq!(members[1].singleton.starts.load(Ordering::SeqCst), 0);
    for member in &members {
        assert_eq!(member.service.primary_provider().await, Some(nodes[0].clone()));
    }
}

#[tokio::test]
async fn ownership_moves_when_the_primary_leaves() {
    init_tracing();
    let (nodes, members) = members(&["a", "b", "c"], simple, 1);
    for member in &members {
        member.service.start().await;
    }

    for member in &members[1..] {
        member.group.install_view(nodes[1..].to_vec());
    }
    members[0].group.install_view(vec![nodes[0].clone()]);

    until_primary(&members[1], true).await;
    assert_eq!(members[1].singleton.starts.load(Ordering::SeqCst), 1);
    assert!(!members[2].service.is_primary());
    // a is alone in its own view, so it still elects itself
    assert!(members[0].service.is_primary());
}

#[tokio::test]
async fn preferences_override_view_order() {
    init_tracing();
    let preferred = || -> Arc<dyn SingletonElectionPolicy> {
        Arc::new(PreferredSingletonElectionPolicy::new(
            Box::new(SimpleSingletonElectionPolicy::default()),
            vec![Box::new(NamePreference::new("c")) as Box<dyn Preference>],
        ))
    };
    let (nodes, members) = members(&["a", "b", "c"], preferred, 1);
    for member in &members {
        member.service.start().await;
    }

    assert!(members[2].service.is_primary());
    assert!(!members[0].service.is_primary());

    for member in &members[..2] {
        member.group.install_view(nodes[..2].to_vec());
    }
    until_primary(&members[0], true).await;
}

#[tokio::test]
async fn losing_quorum_stops_the_singleton() {
    init_tracing();
    let (nodes, members) = members(&["a", "b"], simple, 2);
    let a = &members[0];
    a.group.install_view(vec![nodes[0].clone()]);

    a.service.start().await;
    assert!(!a.service.is_primary());
    assert_eq!(a.service.primary_provider().await, None);

    a.group.install_view(nodes.clone());
    until_primary(a, true).await;

    a.group.install_view(vec![nodes[0].clone()]);
    until_primary(a, false).await;
    assert_eq!(a.singleton.starts.load(Ordering::SeqCst), 1);
    assert_eq!(a.singleton.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stopping_the_service_stops_the_singleton_and_ignores_later_views() {
    init_tracing();
    let (nodes, members) = members(&["a", "b"], simple, 1);
    let a = &members[0];
    a.service.start().await;
    assert!(a.service.is_primary());

    a.service.stop().await;
    assert!(!a.service.is_primary());
    assert_eq!(a.singleton.stops.load(Ordering::SeqCst), 1);

    a.group.install_view(vec![nodes[0].clone()]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!a.service.is_primary());
    assert_eq!(a.singleton.starts.load(Ordering::SeqCst), 1);
    assert_eq!(a.group.view().len(), 1);
}

#[tokio::test]
async fn a_stopped_service_can_be_started_again() {
    init_tracing();
    let (nodes, members) = members(&["a", "b"], simple, 1);
    let a = &members[0];

    a.service.start().await;
    a.service.stop().await;
    assert_eq!(a.service.primary_provider().await, None);

    a.service.start().await;
    assert!(a.service.is_primary());
    assert_eq!(a.service.primary_provider().await, Some(nodes[0].clone()));
    assert_eq!(a.singleton.starts.load(Ordering::SeqCst), 2);
    assert_eq!(a.singleton.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn views_queued_before_stop_do_not_restart_the_singleton() {
    init_tracing();
    let (nodes, members) = members(&["a", "b"], simple, 1);
    let a = &members[0];
    a.service.start().await;

    a.group.install_view(vec![nodes[0].clone()]);
    a.service.stop().await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!a.service.is_primary());
    assert_eq!(a.singleton.starts.load(Ordering::SeqCst), 1);
    assert_eq!(a.singleton.stops.load(Ordering::SeqCst), 1);
}
