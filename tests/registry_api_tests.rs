mod common;

use serde_json::{json, Map};
use visitgate::client::TrackingPayload;
use visitgate::console::{ConsoleError, DashboardClient};
use visitgate::registry::AccessStatus;

use common::{client_config, spawn_registry};

fn page_view(visitor_id: &str) -> TrackingPayload {
    TrackingPayload {
        visitor_id: visitor_id.to_string(),
        event_type: "page_view".to_string(),
        url: "http://site.test/".to_string(),
        target_resource: String::new(),
        metadata: Map::new(),
        encoded_info: String::new(),
    }
}

#[tokio::test]
async fn test_force_login_then_block_last_write_wins() {
    let server = spawn_registry(None).await;
    server.state.registry.ingest(page_view("V1"), Some("198.51.100.4".into())).unwrap();
    let dashboard = DashboardClient::new(&client_config(&server.base_url));

    // 1. allow -> force_login
    let updated = dashboard.update_access_status("V1", AccessStatus::ForceLogin).await.unwrap();
    assert_eq!(updated.access_status, AccessStatus::ForceLogin);
    let detail = dashboard.visitor_detail("V1").await.unwrap();
    assert_eq!(detail.visitor.access_status, AccessStatus::ForceLogin);

    // 2. force_login -> block
    dashboard.update_access_status("V1", AccessStatus::Block).await.unwrap();
    let detail = dashboard.visitor_detail("V1").await.unwrap();
    assert_eq!(detail.visitor.access_status, AccessStatus::Block);
}

#[tokio::test]
async fn test_status_patch_alters_nothing_else() {
    let server = spawn_registry(None).await;
    server.state.registry.ingest(page_view("V1"), Some("198.51.100.4".into())).unwrap();
    let dashboard = DashboardClient::new(&client_config(&server.base_url));

    let before = dashboard.visitor_detail("V1").await.unwrap().visitor;
    dashboard.update_access_status("V1", AccessStatus::Block).await.unwrap();
    let after = dashboard.visitor_detail("V1").await.unwrap().visitor;

    assert_eq!(after.access_status, AccessStatus::Block);
    let mut expected = before.clone();
    expected.access_status = AccessStatus::Block;
    assert_eq!(after, expected, "only access_status may change");

    // Repeating the same value is a successful no-op
    let again = dashboard.update_access_status("V1", AccessStatus::Block).await.unwrap();
    assert_eq!(again, expected);
}

#[tokio::test]
async fn test_detail_accepts_numeric_primary_key() {
    let server = spawn_registry(None).await;
    server.state.registry.ingest(page_view("0f8fad5b-d9cb-469f-a165-70867728950e"), None).unwrap();
    let dashboard = DashboardClient::new(&client_config(&server.base_url));

    let by_pk = dashboard.visitor_detail("1").await.unwrap();
    assert_eq!(by_pk.visitor.visitor_id, "0f8fad5b-d9cb-469f-a165-70867728950e");
    assert_eq!(by_pk.recent_events.len(), 1);

    dashboard.update_access_status("1", AccessStatus::ForceLogin).await.unwrap();
    let by_uuid = dashboard
        .visitor_detail("0f8fad5b-d9cb-469f-a165-70867728950e")
        .await
        .unwrap();
    assert_eq!(by_uuid.visitor.access_status, AccessStatus::ForceLogin);
}

#[tokio::test]
async fn test_unknown_visitor_and_bad_body_are_rejected() {
    let server = spawn_registry(None).await;
    server.state.registry.ingest(page_view("V1"), None).unwrap();
    let dashboard = DashboardClient::new(&client_config(&server.base_url));

    match dashboard.update_access_status("nobody", AccessStatus::Block).await {
        Err(ConsoleError::Status { status, .. }) => assert_eq!(status, 404),
        other => panic!("expected 404, got {:?}", other),
    }

    let resp = reqwest::Client::new()
        .patch(format!("{}/tracking/dashboard/visitors/V1/", server.base_url))
        .json(&json!({ "access_status": "banned" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(
        server.state.registry.get("V1").unwrap().access_status,
        AccessStatus::Allow,
        "failed transition leaves the record untouched"
    );
}

#[tokio::test]
async fn test_ingest_validation_and_forwarded_ip() {
    let server = spawn_registry(None).await;
    let http = reqwest::Client::new();
    let url = format!("{}/tracking/track/", server.base_url);

    let resp = http
        .post(&url)
        .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
        .json(&page_view("V9"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    assert_eq!(
        server.state.registry.get("V9").unwrap().ip_address.as_deref(),
        Some("203.0.113.9")
    );

    let resp = http.post(&url).json(&page_view("")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let resp = http.post(&url).body("not json").send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(server.state.registry.visitor_count(), 1);
}

#[tokio::test]
async fn test_list_is_most_recent_first() {
    let server = spawn_registry(None).await;
    server.state.registry.ingest(page_view("old"), None).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    server.state.registry.ingest(page_view("new"), None).unwrap();

    let dashboard = DashboardClient::new(&client_config(&server.base_url));
    let ids: Vec<_> = dashboard
        .list_visitors()
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.visitor_id)
        .collect();
    assert_eq!(ids, vec!["new", "old"]);
}

#[tokio::test]
async fn test_dashboard_requires_token_when_configured() {
    let server = spawn_registry(Some("s3cret")).await;
    server.state.registry.ingest(page_view("V1"), None).unwrap();

    let anonymous = DashboardClient::new(&client_config(&server.base_url));
    match anonymous.list_visitors().await {
        Err(ConsoleError::Status { status, .. }) => assert_eq!(status, 401),
        other => panic!("expected 401, got {:?}", other),
    }

    let mut config = client_config(&server.base_url);
    config.admin_token = Some("s3cret".to_string());
    let operator = DashboardClient::new(&config);
    assert_eq!(operator.list_visitors().await.unwrap().len(), 1);
    operator.update_access_status("V1", AccessStatus::Block).await.unwrap();

    // Ingestion stays open
    let resp = reqwest::Client::new()
        .post(format!("{}/tracking/track/", server.base_url))
        .json(&page_view("V2"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
}
