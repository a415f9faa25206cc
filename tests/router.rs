mod common;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use storefront_api::app::build_router;
use tower::ServiceExt; // for `oneshot`

async fn send(request: Request<Body>) -> (StatusCode, Value) {
    let app = build_router(common::offline_state()).expect("router");
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_reports_ok_even_when_database_is_down() {
    let (status, body) = send(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["database"], "down");
    assert_eq!(body["data"]["online_users"], 0);
}

#[tokio::test]
async fn protected_routes_reject_missing_token() {
    for uri in ["/api/cart", "/api/orders", "/api/users", "/api/roles", "/api/messages/users"] {
        let (status, body) = send(get(uri)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["message"], "Token not provided", "{uri}");
    }
}

#[tokio::test]
async fn non_bearer_and_garbage_tokens_are_unauthorized() {
    let basic = Request::builder()
        .uri("/api/cart")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(basic).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let garbage = Request::builder()
        .uri("/api/orders")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(garbage).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_validates_before_touching_the_database() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "name": "A", "email": "nope", "password": "123" }).to_string(),
        ))
        .unwrap();

    let (status, body) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errors = body["data"]["errors"].as_array().expect("field errors");
    assert_eq!(errors.len(), 3);
}

#[tokio::test]
async fn unknown_routes_fall_back_to_404() {
    let (status, body) = send(get("/api/nothing-here")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"]["path"], "/api/nothing-here");
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = build_router(common::offline_state()).expect("router");
    let response = app.oneshot(get("/health")).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn docs_are_served() {
    let app = build_router(common::offline_state()).expect("router");
    let response = app.oneshot(get("/docs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn mistyped_json_body_gets_the_error_envelope() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "name": 5, "email": "a@b.co", "password": "secret123" }).to_string(),
        ))
        .unwrap();

    let (status, body) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());
    assert_eq!(body["data"]["error"], body["message"]);
}

#[tokio::test]
async fn broken_json_and_wrong_content_type_are_enveloped() {
    let broken = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"email\":"))
        .unwrap();
    let (status, body) = send(broken).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["data"]["error"].is_string());

    let plain = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("hello"))
        .unwrap();
    let (status, body) = send(plain).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["data"]["error"].is_string());
}

#[tokio::test]
async fn malformed_path_id_gets_the_error_envelope() {
    let (status, body) = send(get("/api/products/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());
    assert!(body["data"]["error"].is_string());
}

#[tokio::test]
async fn malformed_query_gets_the_error_envelope() {
    let (status, body) = send(get("/api/products?page=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["data"]["error"].is_string());

    // Larger than i64 does not parse at all.
    let (status, body) = send(get("/api/products?page=99999999999999999999")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["data"]["error"].is_string());
}

#[tokio::test]
async fn extreme_page_numbers_do_not_crash_the_listing() {
    // The database is unreachable, so the listing fails with a 500 envelope
    // only after paging has been computed.
    for uri in [
        "/api/products?page=9223372036854775807&per_page=100",
        "/api/products?page=-9223372036854775808",
    ] {
        let (status, body) = send(get(uri)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
        assert!(body["message"].is_string(), "{uri}");
    }
}
