//! Integration tests driving the external interface (§6) over real HTTP
//! against the fixture project in `tests/fixtures/basic`.

mod helpers;

use helpers::TestHarness;
use serde_json::Value;

#[tokio::test]
async fn health_reports_ok_status() {
    let harness = TestHarness::from_fixture("basic").await;
    let resp = reqwest::get(harness.url("/health")).await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn suggest_returns_prefix_matches_from_the_other_index() {
    let harness = TestHarness::from_fixture("basic").await;
    let resp = reqwest::get(harness.url("/suggest?q=widg&limit=5")).await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    let suggestions = body["suggestions"].as_array().unwrap();
    assert!(suggestions.iter().any(|s| s.as_str().unwrap_or("").contains("widget")));
}

#[tokio::test]
async fn search_finds_the_widget_handler_function() {
    let harness = TestHarness::from_fixture("basic").await;
    let resp = reqwest::get(harness.url("/search?q=widget_handler&mode=or&limit=10")).await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    let results = body["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().any(|r| r["path"].as_str().unwrap_or("").ends_with("helpers.py")));
}

#[tokio::test]
async fn file_handler_returns_content_and_rejects_escaping_paths() {
    let harness = TestHarness::from_fixture("basic").await;

    let resp = reqwest::get(harness.url("/file?path=pkg/widget.py")).await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert!(body["content"].as_str().unwrap().contains("handle_widget_request"));

    let resp = reqwest::get(harness.url("/file?path=../../etc/passwd")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn files_handler_lists_indexed_paths() {
    let harness = TestHarness::from_fixture("basic").await;
    let resp = reqwest::get(harness.url("/files")).await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    let files = body["files"].as_array().unwrap();
    assert!(files.iter().any(|f| f.as_str().unwrap_or("").ends_with("widget.py")));
}

#[tokio::test]
async fn init_status_reflects_completed_ingestion() {
    let harness = TestHarness::from_fixture("basic").await;
    assert!(harness.state.is_init_completed());

    let client = reqwest::Client::new();
    let resp = client.post(harness.url("/update")).send().await.unwrap();
    assert!(resp.status().is_success());
    let _ = resp.text().await.unwrap();

    let resp = reqwest::get(harness.url("/init_status")).await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["initialization_completed"], true);
}

#[tokio::test]
async fn agent_endpoint_resolves_an_issue_to_a_file() {
    let harness = TestHarness::from_fixture("basic").await;
    let client = reqwest::Client::new();
    let resp = client
        .post(harness.url("/agent"))
        .json(&serde_json::json!({ "issue": "widget handler", "search_keywords": "widget" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert!(body["agent_response"].as_str().unwrap().len() > 0);
    assert!(body["request_id"].as_str().unwrap().starts_with("req_"));
}

#[tokio::test]
async fn config_round_trips_end_point_and_api_key() {
    let harness = TestHarness::from_fixture("basic").await;
    let client = reqwest::Client::new();
    let resp = client
        .post(harness.url("/config"))
        .json(&serde_json::json!({ "end_point": "https://example.test", "api_key": "secret" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let resp = reqwest::get(harness.url("/config")).await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["end_point"], "https://example.test");
    assert_eq!(body["api_key"], "secret");
}
