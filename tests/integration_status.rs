#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc, clippy::must_use_candidate, missing_debug_implementations, unreachable_pub)]
use axum::http::StatusCode;
mod common;

#[tokio::test]
async fn test_status_of_delivered_submission() {
    let p1 = common::TestSender::new("Provider1", false);
    let app = common::TestApp::spawn(common::senders(&[&p1])).await;

    let sent: serde_json::Value = app.send(common::message_body("client-1", None)).await.json().await.unwrap();
    let resp = app.status(sent["submissionId"].as_str().unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["provider"], "Provider1");
    assert_eq!(body["messageId"], sent["messageId"]);
    assert_eq!(body["attempts"][0]["messageId"], sent["messageId"]);
    assert_eq!(body["statistics"]["successRate"], 100.0);
    assert!(body["timings"]["startedAt"].is_string());
    assert!(body["timings"]["completedAt"].is_string());
    assert!(body["timings"]["durationMs"].is_number());
}

#[tokio::test]
async fn test_unknown_submission_is_not_found() {
    let app = common::TestApp::spawn(Vec::new()).await;

    let resp = app.status(&format!("status_{}", uuid::Uuid::now_v7())).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], 404);
    assert_eq!(body["error"], "Status not found");
}

#[tokio::test]
async fn test_malformed_submission_id_is_bad_request() {
    let app = common::TestApp::spawn(Vec::new()).await;

    for raw in ["not-an-id", "status_123", "msg_0190b6a4-7e2a-7c3e-9f1a-2b3c4d5e6f70"] {
        let resp = app.status(raw).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "id {raw}");

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Invalid status ID format");
    }
}

#[tokio::test]
async fn test_livez() {
    let app = common::TestApp::spawn(Vec::new()).await;

    let resp = app.client.get(format!("{}/livez", app.mgmt_url)).send().await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
}
