mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{add_principal, add_role, app, app_with, send, setup_pool};
use opsdesk::authz::AuthzMode;
use opsdesk::config::EngineConfig;

async fn seed(pool: &sqlx::SqlitePool) -> Result<()> {
    add_role(pool, "admin", "admin", None).await?;
    add_role(pool, "clerk", "employee", Some("sales")).await?;
    add_principal(pool, "root", Some("admin"), None, &[]).await?;
    add_principal(pool, "sam", Some("clerk"), Some("sales"), &[]).await?;
    Ok(())
}

#[tokio::test]
async fn role_lifecycle() -> Result<()> {
    let (pool, _dir) = setup_pool().await?;
    seed(&pool).await?;
    let app = app(&pool).await?;

    let (status, body) = send(
        &app,
        "POST",
        "/rbac/roles",
        Some("root"),
        Some(json!({ "code": "lead", "name": "Team lead", "category": "manager" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["category"], "partner");

    let (status, _) = send(
        &app,
        "POST",
        "/rbac/roles",
        Some("root"),
        Some(json!({ "code": "lead", "name": "Again", "category": "partner" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, "GET", "/rbac/roles", Some("root"), None).await?;
    assert_eq!(status, StatusCode::OK);
    let codes: Vec<&str> = body.as_array().unwrap().iter().map(|r| r["code"].as_str().unwrap()).collect();
    assert_eq!(codes, vec!["admin", "clerk", "lead"]);

    // clerk is still assigned to sam
    let (status, body) = send(&app, "DELETE", "/rbac/roles/clerk", Some("root"), None).await?;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, _) = send(&app, "DELETE", "/rbac/roles/lead", Some("root"), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "GET", "/rbac/roles/lead", Some("root"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn non_admin_is_forbidden_in_strict_mode_only() -> Result<()> {
    let (pool, _dir) = setup_pool().await?;
    seed(&pool).await?;

    let strict = app(&pool).await?;
    let (status, body) = send(&strict, "GET", "/rbac/roles", Some("sam"), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let advisory = app_with(&pool, EngineConfig { authz_mode: AuthzMode::Advisory, ..EngineConfig::default() }).await?;
    let (status, _) = send(&advisory, "GET", "/rbac/roles", Some("sam"), None).await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn permission_write_invalidates_cached_decision() -> Result<()> {
    let (pool, _dir) = setup_pool().await?;
    seed(&pool).await?;
    // Long TTL: only invalidation can make the new rule visible
    let app = app_with(
        &pool,
        EngineConfig { permission_cache_ttl: std::time::Duration::from_secs(3600), ..EngineConfig::default() },
    )
    .await?;

    let check = json!({ "principal_id": "sam", "menu_id": "orders" });
    let (_, body) = send(&app, "POST", "/access/menu", Some("sam"), Some(check.clone())).await?;
    assert_eq!(body["reason"], "not_configured");

    let (status, body) = send(
        &app,
        "PUT",
        "/rbac/menus/orders",
        Some("root"),
        Some(json!({ "allowed_roles": ["employee"], "allowed_departments": ["sales"] })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, body) = send(&app, "POST", "/access/menu", Some("sam"), Some(check.clone())).await?;
    assert_eq!(body["allowed"], true);

    let (status, _) = send(&app, "DELETE", "/rbac/menus/orders", Some("root"), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&app, "POST", "/access/menu", Some("sam"), Some(check)).await?;
    assert_eq!(body["allowed"], false);
    assert_eq!(body["reason"], "not_configured");

    Ok(())
}

#[tokio::test]
async fn empty_department_list_denies_employees() -> Result<()> {
    let (pool, _dir) = setup_pool().await?;
    seed(&pool).await?;
    let app = app(&pool).await?;

    send(
        &app,
        "PUT",
        "/rbac/menus/payroll",
        Some("root"),
        Some(json!({ "allowed_roles": ["employee"], "allowed_departments": [] })),
    )
    .await?;

    let (_, body) = send(&app, "GET", "/access/me/menus/payroll", Some("sam"), None).await?;
    assert_eq!(body["allowed"], false);
    assert_eq!(body["reason"], "department_not_allowed");

    Ok(())
}

#[tokio::test]
async fn column_toggle_collapses_to_all_and_back() -> Result<()> {
    let (pool, _dir) = setup_pool().await?;
    seed(&pool).await?;
    let app = app(&pool).await?;

    let (status, body) = send(
        &app,
        "PUT",
        "/rbac/resources/orders",
        Some("root"),
        Some(json!({ "name": "Orders", "columns": ["amount", "customer_phone", "order_no"] })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = send(
        &app,
        "PUT",
        "/rbac/roles/clerk/resources/orders",
        Some("root"),
        Some(json!({ "can_view": true, "allowed_columns": { "mode": "set", "columns": ["amount", "order_no"] } })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["allowed_columns"]["mode"], "set");

    let toggle = "/rbac/roles/clerk/resources/orders/columns/toggle";

    // Selecting the last missing column collapses to All
    let (_, body) = send(&app, "POST", toggle, Some("root"), Some(json!({ "column": "customer_phone" }))).await?;
    assert_eq!(body["allowed_columns"], json!({ "mode": "all" }));
    assert_eq!(body["can_view"], true);

    // Deselecting from All expands the universe first
    let (_, body) = send(&app, "POST", toggle, Some("root"), Some(json!({ "column": "customer_phone" }))).await?;
    assert_eq!(body["allowed_columns"], json!({ "mode": "set", "columns": ["amount", "order_no"] }));

    let (_, body) = send(&app, "POST", toggle, Some("root"), Some(json!({ "column": "customer_phone" }))).await?;
    assert_eq!(body["allowed_columns"], json!({ "mode": "all" }));

    let (status, _) = send(&app, "POST", toggle, Some("root"), Some(json!({ "column": "ssn" }))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The resolver sees the stored column set
    let (_, body) = send(
        &app,
        "POST",
        "/access/resource",
        Some("sam"),
        Some(json!({ "principal_id": "sam", "resource_code": "orders", "action": "view" })),
    )
    .await?;
    assert_eq!(body["allowed"], true);
    assert_eq!(body["columns"], json!({ "mode": "all" }));

    let (status, body) = send(&app, "GET", "/rbac/roles/clerk/resources", Some("root"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "DELETE", "/rbac/roles/clerk/resources/orders", Some("root"), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", "/rbac/roles/clerk/resources/orders", Some("root"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}
