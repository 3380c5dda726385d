use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use tower::util::ServiceExt;

mod common;

#[tokio::test]
async fn registration_and_login_edge_cases() -> Result<()> {
    let t = common::setup().await?;

    let (status, _) = t
        .request("POST", "/auth/register", None, Some(json!({ "name": "Short", "email": "short@example.com", "password": "short" })))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "short passwords must be rejected");

    let user = t.register("Valid User", "Valid@Example.com").await?;

    let (status, _) = t
        .request("POST", "/auth/register", None, Some(json!({ "name": "Again", "email": "valid@example.com", "password": "password123" })))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT, "duplicate email must conflict");

    let (status, _) = t
        .request("POST", "/auth/login", None, Some(json!({ "email": "valid@example.com", "password": "wrongpassword" })))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t
        .request("POST", "/auth/login", None, Some(json!({ "email": "nobody@example.com", "password": "password123" })))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = t
        .request("POST", "/auth/login", None, Some(json!({ "email": "valid@example.com", "password": "password123" })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], user.id.to_string());
    assert_eq!(body["user"]["role"]["name"], "MEMBER");

    Ok(())
}

#[tokio::test]
async fn protected_routes_need_a_session() -> Result<()> {
    let t = common::setup().await?;

    for uri in ["/api/projects", "/api/roles", "/api/permissions", "/auth/me"] {
        let (status, _) = t.request("GET", uri, None, None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} should require a session", uri);
    }

    let (status, _) = t.request("GET", "/api/projects", Some("not-a-jwt"), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn session_cookie_is_accepted_and_cleared_on_logout() -> Result<()> {
    let t = common::setup().await?;

    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "name": "Cookie", "email": "cookie@example.com", "password": "password123" }).to_string()))?;
    let resp = t.app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let set_cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(set_cookie.contains("HttpOnly"), "cookie flags missing: {}", set_cookie);
    let pair = set_cookie.split(';').next().unwrap_or_default().to_string();

    let req = Request::builder()
        .method("GET")
        .uri("/auth/me")
        .header(header::COOKIE, pair)
        .body(Body::empty())?;
    let resp = t.app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK, "cookie session was not accepted");

    let req = Request::builder().method("POST").uri("/auth/logout").body(Body::empty())?;
    let resp = t.app.clone().oneshot(req).await?;
    let cleared = resp
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(cleared.contains("Max-Age=0"), "logout did not clear the cookie: {}", cleared);

    Ok(())
}

#[tokio::test]
async fn me_reflects_role_changes_without_a_new_token() -> Result<()> {
    let t = common::setup().await?;
    let user = t.register("Pat", "pat@example.com").await?;

    let (_, me) = t.request("GET", "/auth/me", Some(&user.token), None).await?;
    assert_eq!(me["role"], "MEMBER");
    assert_eq!(me["permissions"].as_array().map(Vec::len), Some(0));

    t.set_role(user.id, "PROJECT_MANAGER").await?;

    let (_, me) = t.request("GET", "/auth/me", Some(&user.token), None).await?;
    assert_eq!(me["role"], "PROJECT_MANAGER");
    assert!(me["permissions"].as_array().unwrap().iter().any(|p| p == "CREATE_PROJECT"));

    let (status, refreshed) = t.request("POST", "/auth/refresh", Some(&user.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(refreshed["token"].as_str().is_some());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_registrations_for_one_email_conflict_instead_of_failing() -> Result<()> {
    let t = Arc::new(common::setup().await?);

    let mut handles = Vec::new();
    for i in 0..6 {
        let t = t.clone();
        handles.push(tokio::spawn(async move {
            t.request(
                "POST",
                "/auth/register",
                None,
                Some(json!({ "name": format!("Twin {}", i), "email": "twin@example.com", "password": "password123" })),
            )
            .await
        }));
    }

    let mut created = 0;
    for handle in handles {
        let (status, body) = handle.await??;
        match status {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => {}
            other => panic!("unexpected {}: {}", other, body),
        }
    }
    assert_eq!(created, 1);

    Ok(())
}
