use axum::http::{Method, StatusCode};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use identity_backend::{
    build_router,
    middleware::{
        methods::{USER_GET, USER_LIST},
        MethodTable,
    },
    types::PrincipalId,
};
use serde_json::json;

mod support;

use support::{
    access_token, refresh_token, request, response_json, send, sign_up, test_app, IOS_CLIENT,
    PASSWORD, WEB_CLIENT,
};

fn flip_signature_byte(token: &str) -> String {
    let (signed, signature) = token.rsplit_once('.').expect("three segments");
    let mut bytes = URL_SAFE_NO_PAD.decode(signature).expect("signature b64");
    bytes[0] ^= 0x01;
    format!("{}.{}", signed, URL_SAFE_NO_PAD.encode(bytes))
}

#[tokio::test]
async fn sign_up_then_protected_call_succeeds() {
    let (app, _) = test_app();
    let pair = sign_up(&app, "Alice@Example.com").await;
    assert_eq!(pair["token_type"], "Bearer");
    assert_eq!(pair["expires_in"], 900);

    let response = send(
        &app,
        request(Method::GET, "/v1/users/me", Some(WEB_CLIENT), Some(&access_token(&pair)), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["email"], "alice@example.com");
    assert!(json.get("password_hash").is_none());
}

#[tokio::test]
async fn response_carries_request_id() {
    let (app, _) = test_app();
    let mut req = request(Method::GET, "/v1/sessions", Some(WEB_CLIENT), None, None);
    req.headers_mut()
        .insert("x-request-id", "req-123".parse().expect("header"));
    let response = send(&app, req).await;
    assert_eq!(
        response.headers().get("x-request-id").and_then(|v| v.to_str().ok()),
        Some("req-123")
    );
}

#[tokio::test]
async fn missing_client_header_is_rejected_before_anything_else() {
    let (app, _) = test_app();
    let response = send(
        &app,
        request(
            Method::POST,
            "/v1/auth/sign-in",
            None,
            None,
            Some(json!({"email": "alice@example.com", "password": PASSWORD})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_json(response).await["code"], "CLIENT_REQUIRED");
}

#[tokio::test]
async fn unknown_client_is_rejected() {
    let (app, _) = test_app();
    let response = send(
        &app,
        request(Method::GET, "/v1/users/me", Some("toaster"), None, None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_json(response).await["code"], "INVALID_CLIENT");
}

#[tokio::test]
async fn protected_call_without_credential_is_rejected() {
    let (app, _) = test_app();
    let response = send(
        &app,
        request(Method::GET, "/v1/users/me", Some(WEB_CLIENT), None, None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_json(response).await["code"], "CREDENTIAL_MISSING");
}

#[tokio::test]
async fn wrong_scheme_counts_as_missing_credential() {
    let (app, _) = test_app();
    let pair = sign_up(&app, "scheme@example.com").await;
    let mut req = request(Method::GET, "/v1/users/me", Some(WEB_CLIENT), None, None);
    req.headers_mut().insert(
        "authorization",
        format!("Token {}", access_token(&pair)).parse().expect("header"),
    );
    let response = send(&app, req).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_json(response).await["code"], "CREDENTIAL_MISSING");
}

#[tokio::test]
async fn tampered_signature_is_rejected() {
    let (app, _) = test_app();
    let pair = sign_up(&app, "bob@example.com").await;
    let tampered = flip_signature_byte(&access_token(&pair));

    let response = send(
        &app,
        request(Method::GET, "/v1/users/me", Some(WEB_CLIENT), Some(&tampered), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response_json(response).await["code"],
        "CREDENTIAL_INVALID_SIGNATURE"
    );
}

#[tokio::test]
async fn expired_credential_is_rejected_with_expiry_code() {
    let (app, state) = test_app();
    let issued = state
        .issuer
        .issue_at(PrincipalId::new(), Utc::now() - Duration::hours(2))
        .expect("issue");

    let response = send(
        &app,
        request(Method::GET, "/v1/sessions", Some(WEB_CLIENT), Some(&issued.token), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = response_json(response).await;
    assert_eq!(json["code"], "CREDENTIAL_EXPIRED");
    assert_eq!(json["error"], "Token expired");
}

#[tokio::test]
async fn garbage_credential_is_malformed() {
    let (app, _) = test_app();
    let response = send(
        &app,
        request(Method::GET, "/v1/users/me", Some(WEB_CLIENT), Some("not-a-jwt"), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_json(response).await["code"], "CREDENTIAL_MALFORMED");
}

#[tokio::test]
async fn sign_in_checks_password() {
    let (app, _) = test_app();
    sign_up(&app, "carol@example.com").await;

    let response = send(
        &app,
        request(
            Method::POST,
            "/v1/auth/sign-in",
            Some(IOS_CLIENT),
            None,
            Some(json!({"email": "carol@example.com", "password": "Wr0ng!pass"})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        &app,
        request(
            Method::POST,
            "/v1/auth/sign-in",
            Some(IOS_CLIENT),
            None,
            Some(json!({"email": " CAROL@example.com ", "password": PASSWORD})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let pair = response_json(response).await;
    assert!(!access_token(&pair).is_empty());
}

#[tokio::test]
async fn duplicate_sign_up_conflicts() {
    let (app, _) = test_app();
    sign_up(&app, "dave@example.com").await;

    let response = send(
        &app,
        request(
            Method::POST,
            "/v1/auth/sign-up",
            Some(WEB_CLIENT),
            None,
            Some(json!({"name": "Dave Again", "email": "DAVE@example.com", "password": PASSWORD})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn weak_password_fails_validation() {
    let (app, _) = test_app();
    let response = send(
        &app,
        request(
            Method::POST,
            "/v1/auth/sign-up",
            Some(WEB_CLIENT),
            None,
            Some(json!({"name": "Eve Weak", "email": "eve@example.com", "password": "password"})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn refresh_yields_new_pair_and_retires_old_token() {
    let (app, _) = test_app();
    let pair = sign_up(&app, "frank@example.com").await;
    let old_refresh = refresh_token(&pair);

    let response = send(
        &app,
        request(
            Method::POST,
            "/v1/auth/refresh",
            Some(WEB_CLIENT),
            None,
            Some(json!({"refresh_token": old_refresh})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = response_json(response).await;
    assert_ne!(refresh_token(&rotated), old_refresh);

    let response = send(
        &app,
        request(Method::GET, "/v1/users/me", Some(WEB_CLIENT), Some(&access_token(&rotated)), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &app,
        request(
            Method::POST,
            "/v1/auth/refresh",
            Some(WEB_CLIENT),
            None,
            Some(json!({"refresh_token": old_refresh})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response_json(response).await["code"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn refresh_from_another_client_is_refused() {
    let (app, _) = test_app();
    let pair = sign_up(&app, "grace@example.com").await;

    let response = send(
        &app,
        request(
            Method::POST,
            "/v1/auth/refresh",
            Some(IOS_CLIENT),
            None,
            Some(json!({"refresh_token": refresh_token(&pair)})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response_json(response).await["code"], "INVALID_CLIENT");
}

#[tokio::test]
async fn unknown_paths_are_not_found_with_or_without_a_client() {
    let (app, _) = test_app();
    for client in [None, Some(WEB_CLIENT)] {
        let response = send(
            &app,
            request(Method::GET, "/v1/does-not-exist", client, None, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response_json(response).await["code"], "NOT_FOUND");
    }
}

#[tokio::test]
async fn method_table_overrides_decide_whether_the_gate_demands_a_credential() {
    let (_, state) = test_app();
    let open = build_router(
        state
            .clone()
            .with_methods(MethodTable::standard().public(USER_LIST)),
    );
    let response = send(
        &open,
        request(Method::GET, "/v1/users", Some(WEB_CLIENT), None, None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Handlers that need a principal still refuse an unauthenticated call.
    let open = build_router(state.with_methods(MethodTable::standard().public(USER_GET)));
    let response = send(
        &open,
        request(Method::GET, "/v1/users/me", Some(WEB_CLIENT), None, None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn verify_token_rotates_only_the_callers_own_session() {
    let (app, _) = test_app();
    let owner = sign_up(&app, "vera@example.com").await;
    let other = sign_up(&app, "walt@example.com").await;
    let verify = |access: &str, refresh: &str| {
        request(
            Method::POST,
            "/v1/users/me/verify-token",
            Some(WEB_CLIENT),
            Some(access),
            Some(json!({"refresh_token": refresh})),
        )
    };

    let response = send(&app, verify(&access_token(&other), &refresh_token(&owner))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&app, verify(&access_token(&owner), &refresh_token(&owner))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = response_json(response).await;
    assert_ne!(refresh_token(&rotated), refresh_token(&owner));

    let response = send(&app, verify(&access_token(&owner), &refresh_token(&owner))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(
        &app,
        request(
            Method::POST,
            "/v1/users/me/verify-token",
            Some(WEB_CLIENT),
            None,
            Some(json!({"refresh_token": refresh_token(&rotated)})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
