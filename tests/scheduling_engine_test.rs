use aging_queue::core::engine::{EngineSettings, SchedulingEngine};
use aging_queue::core::{
    Direction, HistoryLog, HistoryRecord, JoinOutcome, Notification, NotificationKind, Notifier,
    Outcome, PriorityTier, QueueEntry, QueueStore, Service,
};
use aging_queue::{
    InMemoryHistoryLog, InMemoryQueueStore, InMemoryServiceRegistry, ManualClock,
    NotificationCenter, QueueError,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

type Engine = SchedulingEngine<InMemoryQueueStore, InMemoryServiceRegistry>;

struct Fixture {
    engine: Engine,
    clock: Arc<ManualClock>,
    history: Arc<InMemoryHistoryLog>,
    inbox: Arc<NotificationCenter>,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn services() -> Vec<Service> {
    vec![
        Service::new("s1", "Front desk", 10).with_default_priority(PriorityTier::Medium),
        Service::new("s2", "Registration", 5),
        Service::new("closed", "Pharmacy", 5).closed(),
    ]
}

fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(t0()));
    let history = Arc::new(InMemoryHistoryLog::new());
    let inbox = Arc::new(NotificationCenter::in_memory());
    let engine = SchedulingEngine::new(
        InMemoryQueueStore::new(),
        InMemoryServiceRegistry::new(services()),
        history.clone(),
        inbox.clone(),
    )
    .with_clock(clock.clone());

    Fixture {
        engine,
        clock,
        history,
        inbox,
    }
}

async fn ranked_ids(engine: &Engine, service_id: &str) -> Vec<String> {
    engine
        .rank(service_id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.entry.entrant_id)
        .collect()
}

async fn members(engine: &Engine, service_id: &str) -> Vec<String> {
    let mut ids: Vec<String> = engine
        .queue_snapshot(service_id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.entrant_id)
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_join_uses_given_or_default_priority() {
    let f = fixture();

    let outcome = f
        .engine
        .join("s1", "u1", Some("John Doe"), Some(PriorityTier::High))
        .await
        .unwrap();
    assert!(outcome.is_new());
    assert_eq!(outcome.entry().display_name, "John Doe");
    assert_eq!(outcome.entry().priority_tier, PriorityTier::High);
    assert_eq!(outcome.entry().joined_at, t0());

    let outcome = f.engine.join("s1", "u2", None, None).await.unwrap();
    assert_eq!(outcome.entry().priority_tier, PriorityTier::Medium);
    assert_eq!(outcome.entry().display_name, "u2");

    let joined = f
        .inbox
        .list()
        .await
        .into_iter()
        .filter(|n| n.kind == NotificationKind::Joined)
        .count();
    assert_eq!(joined, 2);
}

#[tokio::test]
async fn test_duplicate_join_is_idempotent() {
    let f = fixture();
    f.engine.join("s1", "u1", None, Some(PriorityTier::Low)).await.unwrap();
    f.clock.advance_minutes(5);

    let again = f
        .engine
        .join("s1", "u1", None, Some(PriorityTier::High))
        .await
        .unwrap();
    match again {
        JoinOutcome::AlreadyQueued(entry) => {
            assert_eq!(entry.priority_tier, PriorityTier::Low);
            assert_eq!(entry.joined_at, t0());
        }
        other => panic!("expected AlreadyQueued, got {:?}", other),
    }
    assert_eq!(f.engine.queue_snapshot("s1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_entrant_may_wait_in_several_services() {
    let f = fixture();
    f.engine.join("s1", "u1", None, None).await.unwrap();
    f.engine.join("s2", "u1", None, None).await.unwrap();

    assert_eq!(members(&f.engine, "s1").await, vec!["u1"]);
    assert_eq!(members(&f.engine, "s2").await, vec!["u1"]);
}

#[tokio::test]
async fn test_closed_and_unknown_services_reject_joins() {
    let f = fixture();

    let err = f.engine.join("closed", "u1", None, None).await.unwrap_err();
    assert!(matches!(err, QueueError::ServiceClosed { .. }));

    let err = f
        .engine
        .admin_add("closed", "Walk In", PriorityTier::Low, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::ServiceClosed { .. }));

    let err = f.engine.join("nope", "u1", None, None).await.unwrap_err();
    assert!(matches!(err, QueueError::ServiceNotFound { .. }));

    assert!(f.engine.queue_snapshot("closed").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_add_generates_unique_walk_in_ids() {
    let f = fixture();
    let a = f
        .engine
        .admin_add(
            "s1",
            "Jane",
            PriorityTier::High,
            Some("555-0100".to_string()),
            Some("wheelchair".to_string()),
        )
        .await
        .unwrap();
    let b = f
        .engine
        .admin_add("s1", "Jane", PriorityTier::Low, Some("  ".to_string()), None)
        .await
        .unwrap();

    assert!(a.is_walk_in);
    assert!(a.entrant_id.starts_with("walkin_"));
    assert_ne!(a.entrant_id, b.entrant_id);
    assert_eq!(a.contact.as_deref(), Some("555-0100"));
    assert_eq!(a.notes.as_deref(), Some("wheelchair"));
    assert_eq!(b.contact, None);
    assert_eq!(f.engine.queue_snapshot("s1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_walk_in_ids_skip_ids_already_queued() {
    // A queue written by an earlier process that used the same sequence numbers.
    let taken: Vec<String> = (0..5)
        .map(|seq| format!("walkin_{}_{}", t0().timestamp_millis(), seq))
        .collect();
    let store = InMemoryQueueStore::new();
    store
        .put_queue(
            "s1",
            taken
                .iter()
                .map(|id| QueueEntry::new(id.as_str(), "Earlier", PriorityTier::Low, t0()))
                .collect(),
        )
        .await
        .unwrap();
    let engine = SchedulingEngine::new(
        store,
        InMemoryServiceRegistry::new(services()),
        Arc::new(InMemoryHistoryLog::new()),
        Arc::new(NotificationCenter::in_memory()),
    )
    .with_clock(Arc::new(ManualClock::new(t0())));

    let walk_in = engine
        .admin_add("s1", "Jane", PriorityTier::Medium, None, None)
        .await
        .unwrap();
    assert!(!taken.contains(&walk_in.entrant_id));

    let mut ids = members(&engine, "s1").await;
    ids.dedup();
    assert_eq!(ids.len(), 6);
    assert!(ids.contains(&walk_in.entrant_id));
}

#[tokio::test]
async fn test_walk_in_prefix_comes_from_settings() {
    let f = fixture();
    let engine = f.engine.with_settings(EngineSettings {
        next_up_alerts: 2,
        walk_in_prefix: "guest".to_string(),
    });
    let entry = engine
        .admin_add("s1", "Jane", PriorityTier::Low, None, None)
        .await
        .unwrap();
    assert!(entry.entrant_id.starts_with("guest_"));
}

#[tokio::test]
async fn test_join_then_leave_restores_membership() {
    let f = fixture();
    f.engine.join("s1", "a", None, None).await.unwrap();
    let before = members(&f.engine, "s1").await;

    f.engine.join("s1", "u", Some("Una"), None).await.unwrap();
    let left = f.engine.leave("s1", "u").await.unwrap();
    assert_eq!(left.map(|e| e.entrant_id), Some("u".to_string()));

    assert_eq!(members(&f.engine, "s1").await, before);
    let records: Vec<HistoryRecord> = f.history.for_entrant("u").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::Left);
    assert_eq!(records[0].service_name, "Front desk");
    assert_eq!(records[0].display_name, "Una");
}

#[tokio::test]
async fn test_leave_and_remove_absent_are_noops() {
    let f = fixture();
    assert!(f.engine.leave("s1", "ghost").await.unwrap().is_none());
    assert!(f.engine.remove("s1", "ghost").await.unwrap().is_none());
    assert!(f.engine.leave("nope", "ghost").await.unwrap().is_none());
    assert!(f.history.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_writes_no_history() {
    let f = fixture();
    f.engine.join("s1", "u1", None, None).await.unwrap();
    assert!(f.engine.remove("s1", "u1").await.unwrap().is_some());
    assert!(f.engine.queue_snapshot("s1").await.unwrap().is_empty());
    assert!(f.history.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_low_priority_overtakes_fresh_high() {
    let f = fixture();
    f.engine.join("s1", "b", None, Some(PriorityTier::Low)).await.unwrap();

    f.clock.advance_minutes(29);
    f.engine.join("s1", "a", None, Some(PriorityTier::High)).await.unwrap();
    let ranked = f.engine.rank("s1").await.unwrap();
    assert_eq!(ranked[0].entry.entrant_id, "a");
    assert!((ranked[0].score - 30.0).abs() < 1e-9);
    assert!((ranked[1].score - 29.0).abs() < 1e-9);

    // Two minutes later b has 31 against a's 32, but a fresh high arrival
    // at that moment would sit at 30, behind b.
    f.clock.advance_minutes(2);
    f.engine.join("s1", "c", None, Some(PriorityTier::High)).await.unwrap();
    assert_eq!(ranked_ids(&f.engine, "s1").await, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_rank_at_is_deterministic_and_empty_for_unknown() {
    let f = fixture();
    for (id, tier) in [
        ("x", PriorityTier::Low),
        ("y", PriorityTier::Low),
        ("z", PriorityTier::Medium),
    ] {
        f.engine.join("s1", id, None, Some(tier)).await.unwrap();
    }
    let now = t0() + chrono::Duration::minutes(3);
    let first = f.engine.rank_at("s1", now).await.unwrap();
    let second = f.engine.rank_at("s1", now).await.unwrap();
    assert_eq!(first, second);
    let ids: Vec<&str> = first.iter().map(|r| r.entry.entrant_id.as_str()).collect();
    assert_eq!(ids, vec!["z", "x", "y"]);

    assert!(f.engine.rank("nope").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_serve_next_removes_rank_head_and_alerts() {
    let f = fixture();
    f.engine.join("s1", "low", Some("Lo"), Some(PriorityTier::Low)).await.unwrap();
    f.clock.advance_minutes(1);
    f.engine.join("s1", "med", Some("Me"), Some(PriorityTier::Medium)).await.unwrap();
    f.clock.advance_minutes(1);
    f.engine.join("s1", "high", Some("Hi"), Some(PriorityTier::High)).await.unwrap();

    let expected_head = ranked_ids(&f.engine, "s1").await[0].clone();
    let served = f.engine.serve_next("s1").await.unwrap().unwrap();
    assert_eq!(served.entrant_id, expected_head);
    assert_eq!(served.entrant_id, "high");
    assert_eq!(f.engine.queue_snapshot("s1").await.unwrap().len(), 2);

    let records = f.history.all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::Served);
    assert_eq!(records[0].resolved_at, t0() + chrono::Duration::minutes(2));

    let inbox: Vec<Notification> = f.inbox.list().await;
    // Newest first: almost-ready, next-up, served.
    assert_eq!(inbox[0].kind, NotificationKind::AlmostReady);
    assert!(inbox[0].message.contains("Lo"));
    assert!(inbox[0].message.contains("#2"));
    assert_eq!(inbox[1].kind, NotificationKind::NextUp);
    assert!(inbox[1].message.starts_with("Me:"));
    assert_eq!(inbox[2].kind, NotificationKind::Served);
    assert!(inbox[2].message.contains("Hi"));
}

#[tokio::test]
async fn test_serve_next_on_empty_queue() {
    let f = fixture();
    assert!(f.engine.serve_next("s1").await.unwrap().is_none());
    assert!(f.history.all().await.unwrap().is_empty());
    assert!(f.inbox.list().await.is_empty());
}

#[tokio::test]
async fn test_boost_swaps_scoring_inputs_with_neighbor() {
    let f = fixture();
    // At t0+10: A=10, B=8, C=5.
    f.engine.join("s1", "A", None, Some(PriorityTier::Low)).await.unwrap();
    f.clock.advance_minutes(2);
    f.engine.join("s1", "B", None, Some(PriorityTier::Low)).await.unwrap();
    f.clock.advance_minutes(3);
    f.engine.join("s1", "C", None, Some(PriorityTier::Low)).await.unwrap();
    f.clock.advance_minutes(5);
    assert_eq!(ranked_ids(&f.engine, "s1").await, vec!["A", "B", "C"]);

    assert!(f.engine.boost("s1", "C", Direction::Up).await.unwrap());

    let ranked = f.engine.rank("s1").await.unwrap();
    let ids: Vec<&str> = ranked.iter().map(|r| r.entry.entrant_id.as_str()).collect();
    assert_eq!(ids, vec!["A", "C", "B"]);
    assert!((ranked[1].score - 8.0).abs() < 1e-9);
    assert!((ranked[2].score - 5.0).abs() < 1e-9);

    // The swap survives further aging.
    f.clock.advance_minutes(60);
    assert_eq!(ranked_ids(&f.engine, "s1").await, vec!["A", "C", "B"]);
    assert_eq!(members(&f.engine, "s1").await, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_boost_without_neighbor_is_noop() {
    let f = fixture();
    f.engine.join("s1", "A", None, Some(PriorityTier::High)).await.unwrap();
    f.engine.join("s1", "B", None, Some(PriorityTier::Low)).await.unwrap();

    assert!(!f.engine.boost("s1", "A", Direction::Up).await.unwrap());
    assert!(!f.engine.boost("s1", "B", Direction::Down).await.unwrap());
    assert!(!f.engine.boost("s1", "ghost", Direction::Up).await.unwrap());
    assert_eq!(ranked_ids(&f.engine, "s1").await, vec!["A", "B"]);

    assert!(f.engine.boost("s1", "A", Direction::Down).await.unwrap());
    assert_eq!(ranked_ids(&f.engine, "s1").await, vec!["B", "A"]);
}

#[tokio::test]
async fn test_move_to_top_swaps_with_head() {
    let f = fixture();
    f.engine.join("s1", "A", None, Some(PriorityTier::High)).await.unwrap();
    f.engine.join("s1", "B", None, Some(PriorityTier::Medium)).await.unwrap();
    f.engine.join("s1", "C", None, Some(PriorityTier::Low)).await.unwrap();
    f.clock.advance_minutes(1);

    assert!(!f.engine.move_to_top("s1", "A").await.unwrap());
    assert!(!f.engine.move_to_top("s1", "ghost").await.unwrap());
    assert!(!f.engine.move_to_top("s2", "A").await.unwrap());

    assert!(f.engine.move_to_top("s1", "C").await.unwrap());
    assert_eq!(ranked_ids(&f.engine, "s1").await, vec!["C", "B", "A"]);

    let snapshot = f.engine.queue_snapshot("s1").await.unwrap();
    let c = snapshot.iter().find(|e| e.entrant_id == "C").unwrap();
    let a = snapshot.iter().find(|e| e.entrant_id == "A").unwrap();
    assert_eq!(c.priority_tier, PriorityTier::High);
    assert_eq!(a.priority_tier, PriorityTier::Low);
    assert_eq!(members(&f.engine, "s1").await, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_change_priority_keeps_aging_credit() {
    let f = fixture();
    f.engine.join("s1", "u1", None, Some(PriorityTier::Low)).await.unwrap();
    f.clock.advance_minutes(10);

    assert!(f
        .engine
        .change_priority("s1", "u1", PriorityTier::High)
        .await
        .unwrap());
    let ranked = f.engine.rank("s1").await.unwrap();
    assert_eq!(ranked[0].entry.joined_at, t0());
    assert!((ranked[0].score - 40.0).abs() < 1e-9);

    assert!(!f
        .engine
        .change_priority("s1", "ghost", PriorityTier::High)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_status_for_reports_position_and_wait() {
    let f = fixture();
    f.engine.join("s1", "first", None, Some(PriorityTier::High)).await.unwrap();
    f.engine.join("s1", "second", None, Some(PriorityTier::Medium)).await.unwrap();
    f.engine.join("s1", "third", None, Some(PriorityTier::Low)).await.unwrap();
    f.clock.advance_minutes(4);

    let head = f.engine.status_for("first").await.unwrap().unwrap();
    assert_eq!(head.position, 1);
    assert_eq!(head.estimated_wait_minutes, 0);
    assert_eq!(head.total_in_queue, 3);
    assert_eq!(head.service_name, "Front desk");

    let third = f.engine.status_for("third").await.unwrap().unwrap();
    assert_eq!(third.position, 3);
    assert_eq!(third.estimated_wait_minutes, 20);
    assert!((third.score - 4.0).abs() < 1e-9);

    assert!(f.engine.status_for("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn test_status_for_scans_services_in_catalog_order() {
    let f = fixture();
    f.engine.join("s2", "u1", None, None).await.unwrap();
    f.engine.join("s1", "u1", None, None).await.unwrap();

    let status = f.engine.status_for("u1").await.unwrap().unwrap();
    assert_eq!(status.service_id, "s1");
}

#[tokio::test]
async fn test_discard_queue_drops_entries_without_history() {
    let f = fixture();
    f.engine.join("s1", "u1", None, None).await.unwrap();
    f.engine.discard_queue("s1").await.unwrap();
    assert!(f.engine.queue_snapshot("s1").await.unwrap().is_empty());
    assert!(f.engine.history().await.unwrap().is_empty());
}

struct BrokenHistory;

#[async_trait]
impl HistoryLog for BrokenHistory {
    async fn append(&self, _record: HistoryRecord) -> aging_queue::Result<()> {
        Err(QueueError::StoreError {
            message: "history offline".to_string(),
        })
    }

    async fn all(&self) -> aging_queue::Result<Vec<HistoryRecord>> {
        Ok(Vec::new())
    }
}

struct BrokenNotifier;

#[async_trait]
impl Notifier for BrokenNotifier {
    async fn emit(&self, _notification: Notification) -> aging_queue::Result<()> {
        Err(QueueError::StoreError {
            message: "notifier offline".to_string(),
        })
    }
}

#[tokio::test]
async fn test_auxiliary_failures_do_not_roll_back_queue() {
    let engine = SchedulingEngine::new(
        InMemoryQueueStore::new(),
        InMemoryServiceRegistry::new(services()),
        Arc::new(BrokenHistory),
        Arc::new(BrokenNotifier),
    );

    engine.join("s1", "u1", None, None).await.unwrap();
    engine.join("s1", "u2", None, None).await.unwrap();
    assert!(engine.serve_next("s1").await.unwrap().is_some());
    assert!(engine.leave("s1", "u2").await.unwrap().is_some());
    assert!(engine.queue_snapshot("s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_mutations_on_one_service_are_serialized() {
    let f = fixture();
    let engine = Arc::new(f.engine);

    let mut handles = Vec::new();
    for i in 0..40 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let id = format!("u{:02}", i);
            engine.join("s1", &id, None, None).await.unwrap();
            engine.join("s2", &id, None, None).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(engine.queue_snapshot("s1").await.unwrap().len(), 40);
    assert_eq!(engine.queue_snapshot("s2").await.unwrap().len(), 40);

    let mut handles = Vec::new();
    for i in 0..20 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                engine.serve_next("s1").await.unwrap();
            } else {
                engine.move_to_top("s1", &format!("u{:02}", 39 - i)).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let remaining = engine.queue_snapshot("s1").await.unwrap();
    assert_eq!(remaining.len(), 30);
    let mut ids: Vec<&str> = remaining.iter().map(|e| e.entrant_id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 30);
    assert_eq!(f.history.all().await.unwrap().len(), 10);
}
