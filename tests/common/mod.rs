#![allow(dead_code)]

use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

use opsdesk::config::EngineConfig;
use opsdesk::jwt::JwtConfig;

pub const SECRET: &str = "test-secret";

/// Fresh migrated database in a temp dir. Keep the `TempDir` alive for the test's duration.
pub async fn setup_pool() -> Result<(SqlitePool, TempDir)> {
    let dir = tempfile::tempdir()?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    Ok((pool, dir))
}

pub async fn app(pool: &SqlitePool) -> Result<Router> {
    app_with(pool, EngineConfig::default()).await
}

pub async fn app_with(pool: &SqlitePool, config: EngineConfig) -> Result<Router> {
    Ok(opsdesk::create_app_with_config(pool.clone(), JwtConfig::new(SECRET, 1), config).await?)
}

pub fn token(principal_id: &str) -> String {
    JwtConfig::new(SECRET, 1).encode(principal_id).expect("token")
}

pub async fn send(app: &Router, method: &str, uri: &str, principal: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(principal) = principal {
        builder = builder.header("authorization", format!("Bearer {}", token(principal)));
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

// -----------------------------------------------------------------------------
// Seed helpers. The directory tables are owned by the HR sync, so tests write them directly.
// -----------------------------------------------------------------------------

pub async fn add_role(pool: &SqlitePool, code: &str, category: &str, department: Option<&str>) -> Result<()> {
    sqlx::query(
        "INSERT INTO roles (code, name, department, category, created_at, updated_at) VALUES (?, ?, ?, ?, datetime('now'), datetime('now'))",
    )
    .bind(code)
    .bind(code)
    .bind(department)
    .bind(category)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn add_principal(pool: &SqlitePool, id: &str, role_code: Option<&str>, department: Option<&str>, teams: &[&str]) -> Result<()> {
    sqlx::query("INSERT INTO principals (id, name, role_code, department, active) VALUES (?, ?, ?, ?, 1)")
        .bind(id)
        .bind(id)
        .bind(role_code)
        .bind(department)
        .execute(pool)
        .await?;
    for team in teams {
        sqlx::query("INSERT INTO principal_teams (principal_id, team) VALUES (?, ?)")
            .bind(id)
            .bind(team)
            .execute(pool)
            .await?;
    }
    Ok(())
}

pub async fn add_item(pool: &SqlitePool, id: i64, branch: &str, business_date: Option<&str>, origin_agent: Option<&str>) -> Result<()> {
    sqlx::query("INSERT INTO work_items (id, branch, business_date, origin_agent, status) VALUES (?, ?, ?, ?, 'paid')")
        .bind(id)
        .bind(branch)
        .bind(business_date)
        .bind(origin_agent)
        .execute(pool)
        .await?;
    Ok(())
}

/// An admin principal `root` plus the `north` team of agents.
pub async fn seed_admin_and_team(pool: &SqlitePool, agents: &[&str]) -> Result<()> {
    add_role(pool, "admin", "admin", None).await?;
    add_role(pool, "agent", "employee", Some("sales")).await?;
    add_principal(pool, "root", Some("admin"), None, &[]).await?;
    for agent in agents {
        add_principal(pool, agent, Some("agent"), Some("sales"), &["north"]).await?;
    }
    Ok(())
}

pub async fn owners(pool: &SqlitePool, branch: &str) -> Result<Vec<(i64, Option<String>)>> {
    Ok(sqlx::query_as("SELECT id, owner FROM work_items WHERE branch = ? ORDER BY id")
        .bind(branch)
        .fetch_all(pool)
        .await?)
}

pub fn count_for(owners: &[(i64, Option<String>)], agent: &str) -> usize {
    owners.iter().filter(|(_, owner)| owner.as_deref() == Some(agent)).count()
}
