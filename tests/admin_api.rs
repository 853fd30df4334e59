//! Management API exercised in-process through the axum router.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use scoped_proxy::admin::{setup_admin_router, AdminState};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

fn admin(api_key: Option<&str>) -> Router {
    setup_admin_router(AdminState::new(
        common::proxy(),
        api_key.map(str::to_string),
    ))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let text = common::body_string(response).await;
    let value = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_status_and_catalog() {
    let app = admin(None);

    let (status, body) = call(&app, "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "operational");
    assert_eq!(body["proxy"]["name"], "test-proxy");
    assert_eq!(body["instances"], 0);

    let (status, body) = call(&app, "GET", "/catalog", None).await;
    assert_eq!(status, StatusCode::OK);
    let plugins: Vec<&str> = body["plugins"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert!(plugins.contains(&"logger"));
    let rules: Vec<&str> = body["rules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(rules, vec!["header", "method", "path", "vhost"]);
}

#[tokio::test]
async fn test_hierarchy_lifecycle() {
    let app = admin(None);

    let (status, instance) = call(
        &app,
        "POST",
        "/instances",
        Some(json!({ "name": "public", "description": "edge traffic" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let instance_id = instance["id"].as_str().unwrap().to_string();
    let instance_uri = format!("/instances/{instance_id}");

    let (status, scope) = call(
        &app,
        "POST",
        &format!("{instance_uri}/scopes"),
        Some(json!({ "name": "api" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let scope_uri = format!("{instance_uri}/scopes/{}", scope["id"].as_str().unwrap());

    let (status, rule) = call(
        &app,
        "POST",
        &format!("{scope_uri}/rules"),
        Some(json!({ "name": "path", "config": { "path": "/api" } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rule["enabled"], true);

    let (status, plugin) = call(
        &app,
        "POST",
        &format!("{scope_uri}/plugins"),
        Some(json!({ "name": "logger", "metadata": { "owner": "ops" } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(plugin["metadata"]["owner"], "ops");
    let plugin_uri = format!("{scope_uri}/plugins/{}", plugin["id"].as_str().unwrap());

    let (status, updated) = call(&app, "PATCH", &plugin_uri, Some(json!({ "enabled": false }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["enabled"], false);

    let (status, view) = call(&app, "GET", &instance_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["description"], "edge traffic");
    assert_eq!(view["scopes"][0]["rules"][0]["name"], "path");
    assert_eq!(view["scopes"][0]["plugins"][0]["enabled"], false);

    let (status, _) = call(&app, "DELETE", &plugin_uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = call(&app, "GET", &plugin_uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = call(&app, "DELETE", &scope_uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "DELETE", &instance_uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(&app, "GET", "/instances", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_factory_errors() {
    let app = admin(None);
    let (_, instance) = call(&app, "POST", "/instances", Some(json!({ "name": "i" }))).await;
    let (_, scope) = call(
        &app,
        "POST",
        &format!("/instances/{}/scopes", instance["id"].as_str().unwrap()),
        Some(json!({ "name": "s" })),
    )
    .await;
    let scope_uri = format!(
        "/instances/{}/scopes/{}",
        instance["id"].as_str().unwrap(),
        scope["id"].as_str().unwrap()
    );

    let (status, body) = call(
        &app,
        "POST",
        &format!("{scope_uri}/plugins"),
        Some(json!({ "name": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "UNKNOWN_FACTORY");

    let (status, body) = call(
        &app,
        "POST",
        &format!("{scope_uri}/rules"),
        Some(json!({ "name": "path", "config": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_CONFIG");

    let (_, view) = call(&app, "GET", &scope_uri, None).await;
    assert_eq!(view["plugins"], json!([]));
    assert_eq!(view["rules"], json!([]));

    let (status, _) = call(&app, "GET", "/instances/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let app = admin(Some("secret"));

    let (status, _) = call(&app, "GET", "/instances", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/instances")
        .header(header::AUTHORIZATION, "Bearer secret")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
