use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::http::StatusCode;
use intermax::jwt::JwtConfig;

mod common;

const REFRESH_SECS: i64 = 5;

fn jwt_with_refresh_window() -> JwtConfig {
    JwtConfig {
        secret: Arc::new(b"test-secret".to_vec()),
        exp_hours: 24,
        refresh_secs: REFRESH_SECS,
    }
}

#[tokio::test]
async fn embedded_claims_are_trusted_until_the_refresh_marker_passes() -> Result<()> {
    let t = common::setup_with_jwt(jwt_with_refresh_window()).await?;
    let user = t.register("Rae", "rae@example.com").await?;

    t.set_role(user.id, "ADMIN").await?;

    let (status, me) = t.request("GET", "/auth/me", Some(&user.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "MEMBER", "fresh token keeps its embedded role");

    let (status, _) = t.request("GET", "/api/roles", Some(&user.token), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN, "embedded permissions still apply");

    let (status, refreshed) = t.request("POST", "/auth/refresh", Some(&user.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refreshed["user"]["role"]["name"], "ADMIN");
    let new_token = refreshed["token"].as_str().unwrap_or_default().to_string();

    let (_, me) = t.request("GET", "/auth/me", Some(&new_token), None).await?;
    assert_eq!(me["role"], "ADMIN");
    let (status, _) = t.request("GET", "/api/roles", Some(&new_token), None).await?;
    assert_eq!(status, StatusCode::OK);

    tokio::time::sleep(Duration::from_secs(REFRESH_SECS as u64 + 1)).await;

    let (status, me) = t.request("GET", "/auth/me", Some(&user.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "ADMIN", "stale token is reloaded from the database");

    Ok(())
}

#[tokio::test]
async fn stale_claims_of_a_deleted_user_are_rejected() -> Result<()> {
    let t = common::setup_with_jwt(JwtConfig {
        refresh_secs: 0,
        ..jwt_with_refresh_window()
    })
    .await?;
    let user = t.register("Gone", "gone@example.com").await?;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user.id)
        .execute(&t.pool)
        .await?;

    let (status, _) = t.request("GET", "/auth/me", Some(&user.token), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}
