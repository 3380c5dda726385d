#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;
use uuid::Uuid;

use intermax::create_app_with_config;
use intermax::jwt::JwtConfig;

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    _dir: TempDir,
}

pub struct TestUser {
    pub id: Uuid,
    pub token: String,
}

pub async fn setup() -> Result<TestApp> {
    std::env::set_var("JWT_SECRET", "test-secret");
    setup_with_jwt(JwtConfig::from_env()?).await
}

/// Same as `setup`, with an explicit token configuration.
pub async fn setup_with_jwt(jwt: JwtConfig) -> Result<TestApp> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator =
        sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    let app = create_app_with_config(pool.clone(), jwt).await?;

    Ok(TestApp { app, pool, _dir: dir })
}

impl TestApp {
    pub async fn request(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let resp = self.app.clone().oneshot(req).await?;
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, value))
    }

    pub async fn register(&self, name: &str, email: &str) -> Result<TestUser> {
        let (status, body) = self
            .request(
                "POST",
                "/auth/register",
                None,
                Some(serde_json::json!({ "name": name, "email": email, "password": "password123" })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);

        let token = body["token"].as_str().context("token missing")?.to_string();
        let id = body["user"]["id"].as_str().context("user id missing")?.parse()?;
        Ok(TestUser { id, token })
    }

    /// Gives the user a role directly in the database.
    pub async fn set_role(&self, user_id: Uuid, role: &str) -> Result<()> {
        sqlx::query("UPDATE users SET role_id = (SELECT id FROM roles WHERE name = ?) WHERE id = ?")
            .bind(role)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn admin(&self) -> Result<TestUser> {
        let user = self.register("Admin", "admin@example.com").await?;
        self.set_role(user.id, "ADMIN").await?;
        Ok(user)
    }

    pub async fn role_id(&self, name: &str) -> Result<Uuid> {
        Ok(sqlx::query_scalar("SELECT id FROM roles WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?)
    }
}
