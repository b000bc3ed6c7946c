#![allow(dead_code)]
use axum::{
    body::Body,
    http::{header, Method, Request, Response},
    Router,
};
use identity_backend::{
    build_router,
    config::Config,
    models::Client,
    repositories::MemoryStore,
    services::{ClientRegistry, IdentityCache},
    utils::keys::KeyMaterial,
    AppState,
};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tower::ServiceExt;

pub const PRIVATE_PEM: &str = include_str!("../fixtures/keys/private.pem");
pub const PUBLIC_PEM: &str = include_str!("../fixtures/keys/public.pem");

pub const WEB_CLIENT: &str = "web-console";
pub const IOS_CLIENT: &str = "ios-app";
pub const PASSWORD: &str = "Sup3r$ecret";

pub fn test_config_with(pairs: &[(&str, &str)]) -> Config {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(move |key| map.get(key).cloned()).expect("test config")
}

pub fn test_config() -> Config {
    test_config_with(&[])
}

pub fn test_keys() -> Arc<KeyMaterial> {
    Arc::new(KeyMaterial::from_pem(PRIVATE_PEM.as_bytes(), PUBLIC_PEM.as_bytes()).expect("keys"))
}

pub fn test_clients() -> ClientRegistry {
    ClientRegistry::from_clients(
        vec![client(WEB_CLIENT, "Web Console"), client(IOS_CLIENT, "iOS App")],
        "x-client-id",
    )
    .expect("client registry")
}

pub fn client(id: &str, name: &str) -> Client {
    Client {
        id: id.to_string(),
        name: name.to_string(),
    }
}

pub fn test_state(config: Config, cache: IdentityCache) -> AppState {
    AppState::new(
        config,
        test_keys(),
        Arc::new(MemoryStore::new()),
        test_clients(),
        cache,
    )
}

/// Router and state over a fresh in-process store with caching disabled.
pub fn test_app() -> (Router, AppState) {
    let state = test_state(test_config(), IdentityCache::disabled());
    (build_router(state.clone()), state)
}

pub fn request(
    method: Method,
    uri: &str,
    client_id: Option<&str>,
    access_token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(client_id) = client_id {
        builder = builder.header("x-client-id", client_id);
    }
    if let Some(token) = access_token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.expect("router response")
}

pub async fn response_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Registers a principal through the HTTP surface and returns the token pair.
pub async fn sign_up(app: &Router, email: &str) -> Value {
    let response = send(
        app,
        request(
            Method::POST,
            "/v1/auth/sign-up",
            Some(WEB_CLIENT),
            None,
            Some(serde_json::json!({
                "name": "Test User",
                "email": email,
                "password": PASSWORD,
            })),
        ),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    response_json(response).await
}

pub fn access_token(pair: &Value) -> String {
    pair["access_token"].as_str().expect("access token").to_string()
}

pub fn refresh_token(pair: &Value) -> String {
    pair["refresh_token"].as_str().expect("refresh token").to_string()
}
