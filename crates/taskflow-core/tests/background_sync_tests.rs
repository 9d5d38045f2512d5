//! Background sync behaviour against a mocked persistence layer.

use async_trait::async_trait;
use mockall::mock;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskflow_core::{
    BackgroundSync, CoreError, Edge, EdgeId, EdgeKind, FailurePolicy, GraphId, GraphPersistence,
    Node, NodeId, NodeType, NodeUpdate, Position, RetryPolicy, SyncConfig, SyncMode,
    SyncOperation, SyncOperationKind, SyncOutcome, TaskId, TaskPatch, TaskPayload,
};

mock! {
    pub Persistence {}

    #[async_trait]
    impl GraphPersistence for Persistence {
        async fn fetch_nodes(&self, graph_id: &GraphId) -> Result<Vec<Node>, CoreError>;
        async fn fetch_edges(&self, graph_id: &GraphId) -> Result<Vec<Edge>, CoreError>;
        async fn create_node(&self, graph_id: &GraphId, node: &Node) -> Result<Node, CoreError>;
        async fn update_node(&self, graph_id: &GraphId, node_id: &NodeId, update: &NodeUpdate) -> Result<Node, CoreError>;
        async fn delete_node(&self, graph_id: &GraphId, node_id: &NodeId) -> Result<(), CoreError>;
        async fn create_edge(&self, graph_id: &GraphId, edge: &Edge) -> Result<Edge, CoreError>;
        async fn create_edges_bulk(&self, graph_id: &GraphId, edges: &[Edge]) -> Result<Vec<Edge>, CoreError>;
        async fn delete_edges(&self, graph_id: &GraphId, edge_ids: &[EdgeId]) -> Result<(), CoreError>;
        async fn update_task(&self, graph_id: &GraphId, task_id: &TaskId, patch: &TaskPatch) -> Result<TaskPayload, CoreError>;
    }
}

fn node(id: &str) -> Node {
    Node::new(
        NodeId::from(id),
        NodeType::task(),
        Position::new(400.0, 0.0),
        TaskPayload::titled(id),
    )
}

fn edge(id: &str, source: &str, target: &str) -> Edge {
    Edge::with_id(
        EdgeId::from(id),
        NodeId::from(source),
        NodeId::from(target),
        EdgeKind::Next,
    )
}

fn fast_retry(max_retries: u32) -> FailurePolicy {
    FailurePolicy::Retry(RetryPolicy {
        max_retries,
        initial_delay_ms: 1,
        backoff_multiplier: 2.0,
        max_delay_ms: 5,
    })
}

fn sync_with(persistence: impl GraphPersistence + 'static, config: SyncConfig) -> BackgroundSync {
    BackgroundSync::new(GraphId::from("flow-1"), Arc::new(persistence), config).unwrap()
}

#[tokio::test]
async fn test_edges_skipped_when_node_creation_fails() {
    let mut persistence = MockPersistence::new();
    persistence
        .expect_create_node()
        .times(1)
        .returning(|_, _| Err(CoreError::PersistenceError("503".to_string())));
    persistence.expect_create_edges_bulk().times(0);

    let sync = sync_with(persistence, SyncConfig::default());
    let ticket = sync.submit(SyncOperation::CreateNodeWithEdges {
        node: node("b"),
        edges: vec![edge("e1", "a", "b")],
    });

    let event = ticket.outcome().await.unwrap();
    assert_eq!(event.operation, SyncOperationKind::CreateNodeWithEdges);
    assert_eq!(event.node_id, Some(NodeId::from("b")));
    assert!(!event.node_created);
    assert_eq!(
        event.outcome,
        SyncOutcome::Failed {
            error: "Persistence error: 503".to_string()
        }
    );

    let dead_letters = sync.dead_letters().await;
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].operation.kind(), SyncOperationKind::CreateNodeWithEdges);
}

#[tokio::test]
async fn test_retry_after_node_success_only_retries_edges() {
    let edge_calls = Arc::new(AtomicUsize::new(0));
    let counter = edge_calls.clone();

    let mut persistence = MockPersistence::new();
    persistence
        .expect_create_node()
        .times(1)
        .returning(|_, node| Ok(node.clone()));
    persistence
        .expect_create_edges_bulk()
        .times(2)
        .returning(move |_, edges| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(CoreError::CommunicationError("reset".to_string()))
            } else {
                Ok(edges.to_vec())
            }
        });

    let sync = sync_with(
        persistence,
        SyncConfig {
            failure_policy: fast_retry(3),
            ..SyncConfig::default()
        },
    );
    let event = sync
        .submit(SyncOperation::CreateNodeWithEdges {
            node: node("b"),
            edges: vec![edge("e1", "a", "b")],
        })
        .outcome()
        .await
        .unwrap();

    assert!(event.is_success());
    assert!(event.node_created);
    assert_eq!(event.attempts, 2);
    assert_eq!(edge_calls.load(Ordering::SeqCst), 2);
    assert!(sync.dead_letters().await.is_empty());
}

#[tokio::test]
async fn test_best_effort_does_not_retry() {
    let mut persistence = MockPersistence::new();
    persistence
        .expect_update_task()
        .times(1)
        .returning(|_, _, _| Err(CoreError::NotFound("Task t1".to_string())));

    let sync = sync_with(persistence, SyncConfig::default());
    let event = sync
        .submit(SyncOperation::UpdateTask {
            task_id: TaskId::from("t1"),
            patch: TaskPatch::title("x"),
        })
        .outcome()
        .await
        .unwrap();

    assert_eq!(event.attempts, 1);
    assert_eq!(event.event_type(), "sync.failed");
}

#[tokio::test]
async fn test_retry_gives_up_after_max_retries() {
    let mut persistence = MockPersistence::new();
    persistence
        .expect_delete_node()
        .times(3)
        .returning(|_, _| Err(CoreError::CommunicationError("down".to_string())));

    let sync = sync_with(
        persistence,
        SyncConfig {
            failure_policy: fast_retry(2),
            ..SyncConfig::default()
        },
    );
    let event = sync
        .submit(SyncOperation::DeleteNode {
            id: NodeId::from("a"),
        })
        .outcome()
        .await
        .unwrap();

    assert!(!event.is_success());
    assert_eq!(event.attempts, 3);
    assert_eq!(sync.dead_letters().await[0].attempts, 3);
}

#[tokio::test]
async fn test_replay_dead_letters_resubmits() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let mut persistence = MockPersistence::new();
    persistence
        .expect_delete_edges()
        .withf(|_, ids| ids.to_vec() == vec![EdgeId::from("e1"), EdgeId::from("e2")])
        .times(2)
        .returning(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(CoreError::PersistenceError("500".to_string()))
            } else {
                Ok(())
            }
        });

    let sync = sync_with(persistence, SyncConfig::default());
    let failed = sync
        .submit(SyncOperation::DeleteEdges(vec![EdgeId::from("e1"), EdgeId::from("e2")]))
        .outcome()
        .await
        .unwrap();
    assert!(!failed.is_success());

    let tickets = sync.replay_dead_letters().await;
    assert_eq!(tickets.len(), 1);
    for ticket in tickets {
        assert!(ticket.outcome().await.unwrap().is_success());
    }
    assert!(sync.dead_letters().await.is_empty());
}

#[tokio::test]
async fn test_dead_letter_buffer_is_bounded() {
    let mut persistence = MockPersistence::new();
    persistence
        .expect_delete_node()
        .returning(|_, _| Err(CoreError::PersistenceError("500".to_string())));

    let sync = sync_with(
        persistence,
        SyncConfig {
            mode: SyncMode::Ordered,
            dead_letter_capacity: 2,
            ..SyncConfig::default()
        },
    );
    for id in ["a", "b", "c"] {
        sync.submit(SyncOperation::DeleteNode {
            id: NodeId::from(id),
        });
    }
    sync.wait_idle().await;

    let kept: Vec<String> = sync
        .dead_letters()
        .await
        .into_iter()
        .map(|failed| failed.operation.subject())
        .collect();
    assert_eq!(kept, vec!["b".to_string(), "c".to_string()]);
}

#[tokio::test]
async fn test_subscribers_see_every_outcome() {
    let mut persistence = MockPersistence::new();
    persistence
        .expect_create_edge()
        .returning(|_, edge| Ok(edge.clone()));

    let sync = sync_with(persistence, SyncConfig::default());
    let mut events = sync.subscribe();

    let first = sync.submit(SyncOperation::CreateEdge(edge("e1", "a", "b")));
    let second = sync.submit(SyncOperation::CreateEdge(edge("e2", "b", "c")));
    assert!(second.sequence() > first.sequence());

    sync.wait_idle().await;
    let mut sequences = vec![
        events.recv().await.unwrap().sequence,
        events.recv().await.unwrap().sequence,
    ];
    sequences.sort();
    assert_eq!(sequences, vec![first.sequence(), second.sequence()]);
    assert_eq!(sync.in_flight(), 0);
}

/// Slow first call, fast second call
struct LatencyPersistence {
    applied: Mutex<Vec<String>>,
}

#[async_trait]
impl GraphPersistence for LatencyPersistence {
    async fn fetch_nodes(&self, _: &GraphId) -> Result<Vec<Node>, CoreError> {
        Ok(vec![])
    }

    async fn fetch_edges(&self, _: &GraphId) -> Result<Vec<Edge>, CoreError> {
        Ok(vec![])
    }

    async fn create_node(&self, _: &GraphId, node: &Node) -> Result<Node, CoreError> {
        Ok(node.clone())
    }

    async fn update_node(&self, _: &GraphId, id: &NodeId, update: &NodeUpdate) -> Result<Node, CoreError> {
        if id.as_str() == "slow" {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.applied.lock().unwrap().push(id.to_string());
        let mut updated = node(id.as_str());
        updated.position = update.position.unwrap_or_default();
        Ok(updated)
    }

    async fn delete_node(&self, _: &GraphId, _: &NodeId) -> Result<(), CoreError> {
        Ok(())
    }

    async fn create_edge(&self, _: &GraphId, edge: &Edge) -> Result<Edge, CoreError> {
        Ok(edge.clone())
    }

    async fn create_edges_bulk(&self, _: &GraphId, edges: &[Edge]) -> Result<Vec<Edge>, CoreError> {
        Ok(edges.to_vec())
    }

    async fn delete_edges(&self, _: &GraphId, _: &[EdgeId]) -> Result<(), CoreError> {
        Ok(())
    }

    async fn update_task(&self, _: &GraphId, _: &TaskId, _: &TaskPatch) -> Result<TaskPayload, CoreError> {
        Ok(TaskPayload::default())
    }
}

async fn apply_slow_then_fast(mode: SyncMode) -> Vec<String> {
    let persistence = Arc::new(LatencyPersistence {
        applied: Mutex::new(Vec::new()),
    });
    let sync = BackgroundSync::new(
        GraphId::from("flow-1"),
        persistence.clone(),
        SyncConfig {
            mode,
            ..SyncConfig::default()
        },
    )
    .unwrap();

    for id in ["slow", "fast"] {
        sync.submit(SyncOperation::UpdateNode {
            id: NodeId::from(id),
            update: NodeUpdate::position(Position::new(1.0, 1.0)),
        });
    }
    sync.wait_idle().await;

    let applied = persistence.applied.lock().unwrap().clone();
    applied
}

#[tokio::test]
async fn test_ordered_mode_preserves_submission_order() {
    assert_eq!(
        apply_slow_then_fast(SyncMode::Ordered).await,
        vec!["slow".to_string(), "fast".to_string()]
    );
}

#[tokio::test]
async fn test_concurrent_mode_does_not_wait_for_earlier_operations() {
    assert_eq!(
        apply_slow_then_fast(SyncMode::Concurrent).await,
        vec!["fast".to_string(), "slow".to_string()]
    );
}

#[tokio::test]
async fn test_wait_idle_returns_immediately_when_nothing_submitted() {
    let sync = sync_with(MockPersistence::new(), SyncConfig::default());
    tokio::time::timeout(Duration::from_millis(100), sync.wait_idle())
        .await
        .expect("idle sync handle should not block");
}
