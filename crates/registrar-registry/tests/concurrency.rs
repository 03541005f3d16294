//! Registry behavior under concurrent writers and live subscribers.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::thread;

use registrar_holder::OriginCounters;
use registrar_registry::{RegistryConfig, SourcedRegistry};
use registrar_types::{
    ChangeKind, ChangeNotification, InstanceInfo, InstanceInfoBuilder, InstanceStatus, Origin,
    SourceIdentity,
};
use tokio::sync::broadcast::error::TryRecvError;

fn registry() -> Arc<SourcedRegistry<InstanceInfo>> {
    let config = RegistryConfig::parse("notifications:\n  buffer: 65536\n").unwrap();
    Arc::new(SourcedRegistry::new(&config, Arc::new(OriginCounters::new())))
}

fn instance(id: &str, port: u16) -> InstanceInfo {
    InstanceInfoBuilder::new(id)
        .app("checkout")
        .port(port)
        .status(InstanceStatus::Up)
        .build()
}

fn drain(
    rx: &mut tokio::sync::broadcast::Receiver<ChangeNotification<InstanceInfo>>,
) -> Vec<ChangeNotification<InstanceInfo>> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(notification) => out.push(notification),
            Err(TryRecvError::Empty | TryRecvError::Closed) => return out,
            Err(TryRecvError::Lagged(skipped)) => panic!("subscriber lagged by {skipped}"),
        }
    }
}

#[test]
fn writers_on_distinct_entities_do_not_interfere() {
    let registry = registry();
    thread::scope(|scope| {
        for worker in 0..8_u16 {
            let registry = &registry;
            scope.spawn(move || {
                let source = SourceIdentity::new(Origin::Replicated, "r1", format!("x{worker}"));
                for n in 0..50_u16 {
                    let id = format!("w{worker}-{n}");
                    registry.register(source.clone(), instance(&id, n)).unwrap();
                }
            });
        }
    });
    assert_eq!(registry.size().unwrap(), 400);
}

#[test]
fn register_and_unregister_race_on_one_entity() {
    let registry = registry();
    let mut rx = registry.subscribe();
    let sources: Vec<SourceIdentity> = (0..4)
        .map(|n| SourceIdentity::new(Origin::Replicated, format!("r{n}"), "x1"))
        .collect();

    thread::scope(|scope| {
        for source in &sources {
            let registry = &registry;
            scope.spawn(move || {
                for round in 0..100_u16 {
                    registry.register(source.clone(), instance("i-1", round)).unwrap();
                    registry.unregister("i-1", source).unwrap();
                }
            });
        }
    });

    // Every writer removed its own copy last, so the entity is gone.
    assert_eq!(registry.size().unwrap(), 0);
    assert!(registry.get("i-1").unwrap().is_none());

    // The notification stream alternates between present and absent.
    let mut present = false;
    for notification in drain(&mut rx) {
        match notification.kind() {
            ChangeKind::Add if !present => present = true,
            ChangeKind::Add | ChangeKind::Modify => assert!(present),
            ChangeKind::Delete => {
                assert!(present);
                present = false;
            }
        }
    }
    assert!(!present);
}

#[tokio::test]
async fn subscriber_receives_lifecycle_in_order() {
    let registry = registry();
    let mut rx = registry.subscribe();
    let replica = SourceIdentity::new(Origin::Replicated, "r1", "x1");
    let local = SourceIdentity::new(Origin::Local, "l1", "y1");

    registry.register(replica.clone(), instance("i-1", 80)).unwrap();
    registry.register(replica.clone(), instance("i-1", 81)).unwrap();
    registry.register(local.clone(), instance("i-1", 81)).unwrap();
    registry.unregister("i-1", &local).unwrap();
    registry.unregister("i-1", &replica).unwrap();

    let mut kinds = Vec::new();
    for _ in 0..6 {
        kinds.push(rx.recv().await.unwrap().kind());
    }
    assert_eq!(
        kinds,
        vec![
            ChangeKind::Add,
            ChangeKind::Modify,
            ChangeKind::Add,
            ChangeKind::Delete,
            ChangeKind::Add,
            ChangeKind::Delete,
        ]
    );
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn snapshot_then_subscribe_covers_current_state() {
    let registry = registry();
    let replica = SourceIdentity::new(Origin::Replicated, "r1", "x1");
    registry.register(replica.clone(), instance("a", 80)).unwrap();
    registry.register(replica.clone(), instance("b", 80)).unwrap();

    let mut rx = registry.subscribe();
    let snapshot = registry.for_snapshot().unwrap();
    assert_eq!(snapshot.len(), 2);

    registry.evict_source(&replica).unwrap();
    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.kind(), ChangeKind::Delete);
    assert_eq!(first.data().id(), "a");
    assert_eq!(second.data().id(), "b");
}
