mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use common::{json_body, json_request, setup, setup_with, test_config};

fn hit() -> serde_json::Value {
    json!({
        "domain": "Example.com",
        "path": "/pricing",
        "query": "utm_source=ads&utm_source=mail",
        "eventName": "pageview",
        "referrer": "https://News.ycombinator.com/item?id=1",
        "clientIp": ["1.0.0.10", "10.0.0.1"],
        "clientUserAgent": "Mozilla/5.0",
        "duration": 0,
        "statusCode": 200
    })
}

#[tokio::test]
async fn test_ingest_buffers_until_flush() {
    let (state, app) = setup();

    let response = app
        .oneshot(json_request("POST", "/ingest", &hit()))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["ok"], true);

    assert_eq!(state.buffer.lock().await.events.len(), 1);
    state.flush_buffer().await;
    assert!(state.buffer.lock().await.is_empty());

    let conn = state.db.conn_for_test().await;
    let row: (String, String, String, Option<String>, Option<String>, Option<i64>) = conn
        .query_row(
            "SELECT domain, country, visitor_id, referrer_domain, query_params, duration_ms FROM events",
            [],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )
        .expect("event row");
    assert_eq!(row.0, "example.com");
    assert_eq!(row.1, "AU");
    assert_eq!(row.2.len(), 16);
    assert_eq!(row.3.as_deref(), Some("news.ycombinator.com"));
    assert_eq!(row.4.as_deref(), Some(r#"{"utm_source":"ads"}"#));
    assert_eq!(row.5, None);

    let (primary, secondary): (String, String) = conn
        .query_row("SELECT primary_ip, secondary_ips FROM requests", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .expect("request row");
    assert_eq!(primary, "1.0.0.10");
    assert_eq!(secondary, r#"["10.0.0.1"]"#);
}

#[tokio::test]
async fn test_ingest_keeps_client_visitor_id() {
    let (state, app) = setup();

    let mut body = hit();
    body["visitorId"] = json!("client-visitor");
    let response = app
        .oneshot(json_request("POST", "/api/ingest", &body))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let buf = state.buffer.lock().await;
    assert_eq!(buf.events[0].visitor_id, "client-visitor");
}

#[tokio::test]
async fn test_full_buffer_flushes_immediately() {
    let mut config = test_config();
    config.buffer_max_size = 1;
    let (state, app) = setup_with(config);

    let response = app
        .oneshot(json_request("POST", "/ingest", &hit()))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.buffer.lock().await.is_empty());

    let conn = state.db.conn_for_test().await;
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
        .expect("count");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_ingest_rejects_non_json_content_type() {
    let (_state, app) = setup();

    let request = Request::builder()
        .method("POST")
        .uri("/ingest")
        .header("content-type", "text/plain")
        .body(Body::from(hit().to_string()))
        .expect("build request");
    let response = app.oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "unsupported_media_type");
}

#[tokio::test]
async fn test_ingest_requires_client_ip() {
    let (state, app) = setup();

    let mut body = hit();
    body["clientIp"] = json!([]);
    let response = app
        .oneshot(json_request("POST", "/ingest", &body))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "validation_error");
    assert_eq!(json["error"]["field"], "clientIp");
    assert!(state.buffer.lock().await.is_empty());
}

#[tokio::test]
async fn test_ingest_rejects_missing_event_name() {
    let (_state, app) = setup();

    let mut body = hit();
    body.as_object_mut().expect("object").remove("eventName");
    let response = app
        .oneshot(json_request("POST", "/ingest", &body))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
