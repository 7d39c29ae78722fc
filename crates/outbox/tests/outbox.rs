//! End-to-end behavior of the outbox: durability, ordering, halting,
//! idempotent replies and single-flight drains.

use std::sync::Arc;
use std::time::Duration;

use outbox::store::{MemoryStore, SqliteStore, Store};
use outbox::sync::{HttpRemote, HttpRemoteConfig, MemoryRemote, Reply};
use outbox::{Event, Handled, ObserverRequest, Outbox, OutboxConfig, OutboxError};
use outbox_testkit::fixtures::{make_params, progress_of, wait_for_event};
use outbox_testkit::generators::new_operation;
use proptest::prelude::*;

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn memory_outbox(remote: MemoryRemote) -> Outbox<MemoryStore, Arc<MemoryRemote>> {
    Outbox::new(MemoryStore::new(), Arc::new(remote), OutboxConfig::default())
}

fn endpoints(outbox: &Outbox<impl Store, Arc<MemoryRemote>>) -> Vec<String> {
    outbox
        .engine()
        .remote()
        .calls()
        .into_iter()
        .map(|op| op.endpoint)
        .collect()
}

#[tokio::test]
async fn test_pending_operations_survive_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outbox.db");

    {
        let outbox = Outbox::new(
            SqliteStore::open(&path).unwrap(),
            Arc::new(MemoryRemote::with_fallback(Reply::unreachable())),
            OutboxConfig::default(),
        );
        outbox.enqueue("/api/attendance/mark", make_params(1)).await.unwrap();
        outbox.enqueue("/api/attendance/mark", make_params(2)).await.unwrap();

        let report = outbox.flush().await.unwrap();
        assert!(report.halted);
        assert_eq!(report.remaining, 2);
    }

    let outbox = Outbox::new(
        SqliteStore::open(&path).unwrap(),
        Arc::new(MemoryRemote::new()),
        OutboxConfig::default(),
    );
    let pending = outbox.all().await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].parameters, make_params(1));
    assert_eq!(pending[0].tries, 1);
    assert!(outbox.last_sync().await.unwrap().is_some());

    let report = outbox.flush().await.unwrap();
    assert!(report.success);
    assert_eq!(report.delivered, 2);
    assert_eq!(outbox.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_replay_follows_enqueue_order() {
    let outbox = memory_outbox(MemoryRemote::new());
    for name in ["a", "b", "c"] {
        outbox.enqueue(format!("/api/{}", name), make_params(0)).await.unwrap();
    }

    outbox.flush().await.unwrap();
    assert_eq!(endpoints(&outbox), vec!["/api/a", "/api/b", "/api/c"]);
}

#[tokio::test]
async fn test_transport_failure_then_retry() {
    let remote = MemoryRemote::new();
    remote.push_reply(Reply::ok());
    remote.push_reply(Reply::unreachable());
    let outbox = memory_outbox(remote);
    let mut events = outbox.subscribe();
    for name in ["a", "b", "c"] {
        outbox.enqueue(format!("/api/{}", name), make_params(0)).await.unwrap();
    }
    events.drain_pending();

    let first = outbox.flush().await.unwrap();
    assert!(first.halted);
    assert_eq!(first.delivered, 1);
    assert_eq!(first.remaining, 2);

    let status = wait_for_event(&mut events, Event::is_status, WAIT).await.unwrap();
    assert_eq!(
        status,
        Event::QueueStatus {
            pending: 2,
            last_sync: first.last_sync,
            info: Some("offline: 2 pending".into()),
        }
    );

    let second = outbox.flush().await.unwrap();
    assert!(second.success);
    assert_eq!(second.total, 2);
    assert_eq!(
        endpoints(&outbox),
        vec!["/api/a", "/api/b", "/api/b", "/api/c"]
    );
}

#[tokio::test]
async fn test_failure_on_first_operation_then_retry() {
    let remote = MemoryRemote::new();
    remote.push_reply(Reply::unreachable());
    let outbox = memory_outbox(remote);
    let mut events = outbox.subscribe();
    outbox.enqueue("/api/a", make_params(0)).await.unwrap();
    outbox.enqueue("/api/b", make_params(0)).await.unwrap();
    events.drain_pending();

    let first = outbox.flush().await.unwrap();
    assert!(first.halted);
    assert_eq!(progress_of(&events.drain_pending()), vec![(0, 2)]);
    let left: Vec<_> = outbox.all().await.unwrap().into_iter().map(|op| op.endpoint).collect();
    assert_eq!(left, vec!["/api/a", "/api/b"]);

    let second = outbox.flush().await.unwrap();
    assert!(second.success);
    assert_eq!(progress_of(&events.drain_pending()), vec![(0, 2), (1, 2), (2, 2)]);
    assert_eq!(endpoints(&outbox), vec!["/api/a", "/api/a", "/api/b"]);
    assert_eq!(outbox.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unsendable_endpoint_stays_queued() {
    let outbox = Outbox::new(
        MemoryStore::new(),
        HttpRemote::new(HttpRemoteConfig::default()).unwrap(),
        OutboxConfig::default(),
    );
    outbox.enqueue("/api/mark", make_params(1)).await.unwrap();

    let report = outbox.flush().await.unwrap();
    assert!(report.halted);
    assert!(!report.success);
    assert_eq!(report.rejected, 0);
    assert_eq!(outbox.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_already_marked_counts_as_delivered() {
    let remote = MemoryRemote::new();
    remote.push_reply(Reply::already_marked());
    let outbox = memory_outbox(remote);
    outbox.enqueue("/api/attendance/mark", make_params(7)).await.unwrap();

    let report = outbox.flush().await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(report.rejected, 0);
    assert!(report.success);
    assert_eq!(outbox.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_rejected_operation_is_dropped() {
    let remote = MemoryRemote::new();
    remote.push_reply(Reply::rejected("unknown student"));
    let outbox = memory_outbox(remote);
    let mut events = outbox.subscribe();
    outbox.enqueue("/api/attendance/mark", make_params(99)).await.unwrap();
    outbox.enqueue("/api/attendance/mark", make_params(1)).await.unwrap();
    events.drain_pending();

    let report = outbox.flush().await.unwrap();
    assert_eq!(report.rejected, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.remaining, 0);

    let status = wait_for_event(&mut events, Event::is_status, WAIT).await.unwrap();
    assert!(matches!(
        status,
        Event::QueueStatus { pending: 0, info: Some(ref info), .. } if info == "1 rejected"
    ));
}

#[tokio::test]
async fn test_empty_drain_reports_nothing_to_sync() {
    let outbox = memory_outbox(MemoryRemote::new());
    let mut events = outbox.subscribe();

    let report = outbox.flush().await.unwrap();
    assert_eq!(report.total, 0);
    assert!(report.success);
    assert_eq!(outbox.engine().remote().call_count(), 0);

    let events = events.drain_pending();
    assert_eq!(
        events,
        vec![
            Event::QueueStatus {
                pending: 0,
                last_sync: report.last_sync,
                info: Some("nothing to sync".into()),
            },
            Event::SyncDone,
        ]
    );
}

#[tokio::test]
async fn test_removing_twice_is_harmless() {
    let outbox = memory_outbox(MemoryRemote::new());
    let key = outbox.enqueue("/api/a", make_params(0)).await.unwrap();

    outbox.remove(key).await.unwrap();
    outbox.remove(key).await.unwrap();
    assert_eq!(outbox.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_flushes_share_one_drain() {
    let outbox = memory_outbox(MemoryRemote::new().with_delay(Duration::from_millis(50)));
    for n in 0..3 {
        outbox.enqueue("/api/attendance/mark", make_params(n)).await.unwrap();
    }

    let (first, second) = tokio::join!(outbox.flush(), outbox.flush());
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(outbox.engine().remote().call_count(), 3);
    assert_eq!(first.delivered, 3);
    assert_eq!(second.delivered, 3);
    assert!(first.joined != second.joined);
}

#[tokio::test]
async fn test_enqueue_schedules_a_drain() {
    init_tracing();
    let mut outbox = memory_outbox(MemoryRemote::new());
    let scheduler = outbox.start();
    let mut events = outbox.subscribe();

    outbox.enqueue("/api/attendance/mark", make_params(3)).await.unwrap();

    let done = wait_for_event(&mut events, |e| *e == Event::SyncDone, WAIT).await;
    assert!(done.is_some());
    assert_eq!(outbox.pending_count().await.unwrap(), 0);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_connectivity_restored_drains_backlog() {
    let remote = MemoryRemote::with_fallback(Reply::unreachable());
    let mut outbox = memory_outbox(remote);
    outbox.enqueue("/api/a", make_params(0)).await.unwrap();
    outbox.enqueue("/api/b", make_params(0)).await.unwrap();
    outbox.flush().await.unwrap();
    assert_eq!(outbox.pending_count().await.unwrap(), 2);

    let scheduler = outbox.start();
    let mut events = outbox.subscribe();
    outbox.engine().remote().set_fallback(Reply::ok());
    outbox.connectivity_restored().unwrap();

    let status = wait_for_event(
        &mut events,
        |e| matches!(e, Event::QueueStatus { pending: 0, .. }),
        WAIT,
    )
    .await;
    assert!(status.is_some());

    scheduler.shutdown().await;
    assert!(outbox.request_flush().is_err());
}

#[tokio::test]
async fn test_observer_requests_from_json() {
    let outbox = memory_outbox(MemoryRemote::new());

    let enqueue = ObserverRequest::from_json(
        r#"{"type":"enqueue","endpoint":"/api/attendance/mark","parameters":{"student":4,"status":"present"}}"#,
    )
    .unwrap();
    let handled = outbox.handle(enqueue).await.unwrap();
    assert!(matches!(handled, Handled::Enqueued(_)));
    assert_eq!(outbox.all().await.unwrap()[0].parameters, make_params(4));

    let status = ObserverRequest::from_json(r#"{"type":"status"}"#).unwrap();
    match outbox.handle(status).await.unwrap() {
        Handled::Status(event) => {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], "queue-status");
            assert_eq!(json["pending"], 1);
        }
        other => panic!("unexpected {:?}", other),
    }

    let flush: ObserverRequest = serde_json::from_str(r#"{"type":"flush"}"#).unwrap();
    match outbox.handle(flush).await.unwrap() {
        Handled::Flushed(report) => assert_eq!(report.delivered, 1),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_enqueue_is_rejected_and_announced() {
    let outbox = memory_outbox(MemoryRemote::new());
    let mut events = outbox.subscribe();

    let err = outbox.enqueue("", make_params(0)).await.unwrap_err();
    assert!(matches!(err, OutboxError::Validation(_)));
    assert_eq!(outbox.pending_count().await.unwrap(), 0);

    let status = wait_for_event(&mut events, Event::is_status, WAIT).await.unwrap();
    assert!(matches!(
        status,
        Event::QueueStatus { info: Some(ref info), .. } if info.starts_with("enqueue failed")
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn stored_operations_replay_unchanged(ops in prop::collection::vec(new_operation(), 1..6)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let outbox = memory_outbox(MemoryRemote::new());
            for op in &ops {
                outbox.enqueue(op.endpoint.clone(), op.parameters.clone()).await.unwrap();
            }
            outbox.flush().await.unwrap();

            let sent = outbox.engine().remote().calls();
            assert_eq!(sent.len(), ops.len());
            for (sent, op) in sent.iter().zip(&ops) {
                assert_eq!(sent.endpoint, op.endpoint);
                assert_eq!(sent.parameters, op.parameters);
            }
        });
    }
}
