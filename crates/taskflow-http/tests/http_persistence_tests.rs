use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use taskflow_core::{
    CoreError, Edge, EdgeId, EdgeKind, GraphId, GraphPersistence, Node, NodeId, NodeType,
    NodeUpdate, Position, TaskId, TaskPatch, TaskPayload, TaskPriority,
};
use taskflow_http::{HttpGraphPersistence, HttpPersistenceConfig};

/// Helper function to start a mock server and create a client pointing to it
async fn setup_test_client() -> (MockServer, HttpGraphPersistence) {
    let mock_server = MockServer::start().await;
    let client = HttpGraphPersistence::with_url_and_timeout(mock_server.uri(), 5).unwrap();
    (mock_server, client)
}

fn graph() -> GraphId {
    GraphId::from("flow-1")
}

#[tokio::test]
async fn test_fetch_nodes_unwraps_envelope() {
    let (mock_server, client) = setup_test_client().await;

    Mock::given(method("GET"))
        .and(path("/api/taskflows/flow-1/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "id": "n1",
                "type": "task",
                "position": { "x": 400.0, "y": 200.0 },
                "data": { "title": "Draft", "priority": "high", "assigneeIds": ["u1"] }
            }],
            "error": null
        })))
        .mount(&mock_server)
        .await;

    let nodes = client.fetch_nodes(&graph()).await.unwrap();

    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].id, NodeId::from("n1"));
    assert_eq!(nodes[0].position, Position::new(400.0, 200.0));
    assert_eq!(nodes[0].data.priority, TaskPriority::High);
    assert_eq!(nodes[0].data.assignee_ids, vec!["u1".to_string()]);
}

#[tokio::test]
async fn test_create_node_posts_camel_case_body() {
    let (mock_server, client) = setup_test_client().await;
    let node = Node::new(
        NodeId::from("n2"),
        NodeType::task(),
        Position::new(0.0, 0.0),
        TaskPayload::titled("Review"),
    );

    Mock::given(method("POST"))
        .and(path("/api/taskflows/flow-1/nodes"))
        .and(body_json(json!({
            "id": "n2",
            "type": "task",
            "position": { "x": 0.0, "y": 0.0 },
            "data": { "title": "Review", "priority": "medium", "assigneeIds": [] },
            "selected": false,
            "dragging": false
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "data": node })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let created = client.create_node(&graph(), &node).await.unwrap();
    assert_eq!(created.id, node.id);
}

#[tokio::test]
async fn test_update_node_sends_partial_body() {
    let (mock_server, client) = setup_test_client().await;

    Mock::given(method("PATCH"))
        .and(path("/api/taskflows/flow-1/nodes/n1"))
        .and(body_json(json!({ "position": { "x": 10.0, "y": 20.0 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "id": "n1",
                "type": "task",
                "position": { "x": 10.0, "y": 20.0 },
                "data": { "title": "Draft" }
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let updated = client
        .update_node(
            &graph(),
            &NodeId::from("n1"),
            &NodeUpdate::position(Position::new(10.0, 20.0)),
        )
        .await
        .unwrap();
    assert_eq!(updated.position, Position::new(10.0, 20.0));
}

#[tokio::test]
async fn test_delete_edges_sends_id_list() {
    let (mock_server, client) = setup_test_client().await;

    Mock::given(method("DELETE"))
        .and(path("/api/taskflows/flow-1/edges"))
        .and(body_json(json!({ "ids": ["e1", "e3"] })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    client
        .delete_edges(&graph(), &[EdgeId::from("e1"), EdgeId::from("e3")])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_edges_bulk() {
    let (mock_server, client) = setup_test_client().await;
    let edges = vec![Edge::with_id(
        EdgeId::from("e1"),
        NodeId::from("a"),
        NodeId::from("b"),
        EdgeKind::OptionalNext,
    )];

    Mock::given(method("POST"))
        .and(path("/api/taskflows/flow-1/edges/bulk"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "data": edges })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let created = client.create_edges_bulk(&graph(), &edges).await.unwrap();
    assert_eq!(created, edges);
}

#[tokio::test]
async fn test_update_task_returns_payload() {
    let (mock_server, client) = setup_test_client().await;

    Mock::given(method("PATCH"))
        .and(path("/api/taskflows/flow-1/tasks/n1"))
        .and(body_json(json!({ "status": "done" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "title": "Draft", "status": "done" }
        })))
        .mount(&mock_server)
        .await;

    let payload = client
        .update_task(
            &graph(),
            &TaskId::from("n1"),
            &TaskPatch {
                status: Some("done".to_string()),
                ..TaskPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(payload.status.as_deref(), Some("done"));
}

#[tokio::test]
async fn test_not_found_maps_to_not_found_error() {
    let (mock_server, client) = setup_test_client().await;

    Mock::given(method("DELETE"))
        .and(path("/api/taskflows/flow-1/nodes/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let result = client.delete_node(&graph(), &NodeId::from("ghost")).await;
    assert_eq!(result, Err(CoreError::NotFound("Node ghost".to_string())));
}

#[tokio::test]
async fn test_server_error_maps_to_persistence_error() {
    let (mock_server, client) = setup_test_client().await;

    Mock::given(method("GET"))
        .and(path("/api/taskflows/flow-1/edges"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "data": null, "error": "database unavailable" })),
        )
        .mount(&mock_server)
        .await;

    let result = client.fetch_edges(&graph()).await;
    assert_eq!(
        result,
        Err(CoreError::PersistenceError("HTTP 500: database unavailable".to_string()))
    );
}

#[tokio::test]
async fn test_error_envelope_on_success_status() {
    let (mock_server, client) = setup_test_client().await;

    Mock::given(method("GET"))
        .and(path("/api/taskflows/flow-1/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": null, "error": "archived" })))
        .mount(&mock_server)
        .await;

    let result = client.fetch_nodes(&graph()).await;
    assert_eq!(result, Err(CoreError::PersistenceError("archived".to_string())));
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let mock_server = MockServer::start().await;
    let client = HttpGraphPersistence::new(HttpPersistenceConfig {
        base_url: mock_server.uri(),
        timeout_secs: 5,
        api_token: Some("secret".to_string()),
    })
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/api/taskflows/flow-1/edges"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(1)
        .mount(&mock_server)
        .await;

    assert!(client.fetch_edges(&graph()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_connection_failure_maps_to_communication_error() {
    // Nothing listens on port 9 locally.
    let client = HttpGraphPersistence::with_url_and_timeout("http://127.0.0.1:9", 1).unwrap();

    let result = client.fetch_nodes(&graph()).await;
    assert!(matches!(result, Err(CoreError::CommunicationError(_))));
}

#[tokio::test]
async fn test_ids_with_reserved_characters_stay_in_one_segment() {
    let (mock_server, client) = setup_test_client().await;

    Mock::given(method("DELETE"))
        .and(path("/api/taskflows/flow-1/nodes/a%2Fb%3Fc"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    client
        .delete_node(&graph(), &NodeId::from("a/b?c"))
        .await
        .unwrap();
}
