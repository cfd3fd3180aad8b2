mod common;

use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;

use common::TestApp;

#[tokio::test]
async fn test_event_stream_delivers_stage_events() {
    let app = TestApp::new();
    app.activated_config("apify", json!({}))
        .await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let mut response = reqwest::Client::new()
        .get(format!("http://{address}/events"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while app.bus.subscriber_count() == 0 {
        assert!(tokio::time::Instant::now() < deadline, "事件流未订阅");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let (_, website) = app
        .post(
            "/websites",
            json!({ "name": "示例博客", "url": "https://blog.example.com" }),
        )
        .await;
    let website_id = website["data"]["id"].as_str().unwrap().to_string();
    app.post_empty(&format!("/websites/{website_id}/extract-urls-and-save"))
        .await;

    let mut received = String::new();
    let read = tokio::time::timeout(Duration::from_secs(5), async {
        while !received.contains("event: extraction-completed") {
            match response.chunk().await.unwrap() {
                Some(chunk) => received.push_str(&String::from_utf8_lossy(&chunk)),
                None => break,
            }
        }
    })
    .await;
    assert!(read.is_ok(), "未收到完成事件: {received}");

    assert!(received.contains("event: extraction-started"));
    assert!(received.contains("event: extraction-completed"));
    assert!(received.contains(&website_id));
    assert!(received.contains("\"postsExtracted\":1"));
}
