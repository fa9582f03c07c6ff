mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{add_principal, add_role, app, send, setup_pool};

async fn seed(pool: &sqlx::SqlitePool) -> Result<()> {
    add_role(pool, "admin", "admin", None).await?;
    add_role(pool, "lead", "partner", None).await?;
    add_role(pool, "clerk", "employee", Some("sales")).await?;

    add_principal(pool, "root", Some("admin"), None, &[]).await?;
    add_principal(pool, "pat", Some("lead"), None, &[]).await?;
    add_principal(pool, "sam", Some("clerk"), Some("sales"), &[]).await?;
    add_principal(pool, "wes", Some("clerk"), Some("warehouse"), &[]).await?;
    add_principal(pool, "ghost", Some("deleted_role"), Some("sales"), &[]).await?;

    sqlx::query(
        "INSERT INTO menu_permissions (menu_id, allowed_roles, allowed_departments, updated_at) VALUES (?, ?, ?, datetime('now'))",
    )
    .bind("orders")
    .bind(r#"["employee","partner"]"#)
    .bind(r#"["sales"]"#)
    .execute(pool)
    .await?;
    sqlx::query(
        "INSERT INTO menu_permissions (menu_id, allowed_roles, allowed_departments, updated_at) VALUES (?, ?, NULL, datetime('now'))",
    )
    .bind("reports")
    .bind(r#"["employee"]"#)
    .execute(pool)
    .await?;
    sqlx::query(
        "INSERT INTO resource_permissions (role_code, resource_code, can_view, can_edit, can_delete, allowed_columns, updated_at)
         VALUES ('clerk', 'orders', 1, 0, 0, ?, datetime('now'))",
    )
    .bind(r#"{"mode":"set","columns":["amount","order_no"]}"#)
    .execute(pool)
    .await?;
    Ok(())
}

async fn menu(app: &axum::Router, principal: &str, menu_id: &str) -> Result<serde_json::Value> {
    let (status, body) = send(
        app,
        "POST",
        "/access/menu",
        Some("root"),
        Some(json!({ "principal_id": principal, "menu_id": menu_id })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    Ok(body)
}

#[tokio::test]
async fn menu_access_follows_category_and_department() -> Result<()> {
    let (pool, _dir) = setup_pool().await?;
    seed(&pool).await?;
    let app = app(&pool).await?;

    // admin passes even menus nobody declared
    let body = menu(&app, "root", "never-declared").await?;
    assert_eq!(body["allowed"], true);
    assert_eq!(body["reason"], "admin_override");

    assert_eq!(menu(&app, "pat", "orders").await?["allowed"], true);
    assert_eq!(menu(&app, "sam", "orders").await?["allowed"], true);

    let body = menu(&app, "wes", "orders").await?;
    assert_eq!(body["allowed"], false);
    assert_eq!(body["reason"], "department_not_allowed");

    // departments absent -> no employee
    let body = menu(&app, "sam", "reports").await?;
    assert_eq!(body["allowed"], false);

    let body = menu(&app, "pat", "never-declared").await?;
    assert_eq!(body["reason"], "not_configured");

    let body = menu(&app, "ghost", "orders").await?;
    assert_eq!(body["allowed"], false);
    assert_eq!(body["reason"], "no_role");

    let body = menu(&app, "nobody", "orders").await?;
    assert_eq!(body["reason"], "unknown_principal");

    Ok(())
}

#[tokio::test]
async fn resource_access_returns_flags_and_columns() -> Result<()> {
    let (pool, _dir) = setup_pool().await?;
    seed(&pool).await?;
    let app = app(&pool).await?;

    let (status, body) = send(
        &app,
        "POST",
        "/access/resource",
        Some("sam"),
        Some(json!({ "principal_id": "sam", "resource_code": "orders", "action": "view" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);
    assert_eq!(body["columns"], json!({ "mode": "set", "columns": ["amount", "order_no"] }));

    let (_, body) = send(
        &app,
        "POST",
        "/access/resource",
        Some("sam"),
        Some(json!({ "principal_id": "sam", "resource_code": "orders", "action": "delete" })),
    )
    .await?;
    assert_eq!(body["allowed"], false);
    assert_eq!(body["reason"], "action_not_permitted");

    let (_, body) = send(
        &app,
        "POST",
        "/access/resource",
        Some("sam"),
        Some(json!({ "principal_id": "pat", "resource_code": "orders", "action": "view" })),
    )
    .await?;
    assert_eq!(body["allowed"], false);
    assert_eq!(body["reason"], "not_configured");
    assert_eq!(body["columns"], json!({ "mode": "set", "columns": [] }));

    let (_, body) = send(
        &app,
        "POST",
        "/access/resource",
        Some("sam"),
        Some(json!({ "principal_id": "root", "resource_code": "anything", "action": "edit" })),
    )
    .await?;
    assert_eq!(body["allowed"], true);
    assert_eq!(body["columns"], json!({ "mode": "all" }));

    Ok(())
}

#[tokio::test]
async fn me_endpoint_checks_the_caller() -> Result<()> {
    let (pool, _dir) = setup_pool().await?;
    seed(&pool).await?;
    let app = app(&pool).await?;

    let (status, body) = send(&app, "GET", "/access/me/menus/orders", Some("sam"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);

    let (_, body) = send(&app, "GET", "/access/me/menus/orders", Some("wes"), None).await?;
    assert_eq!(body["allowed"], false);

    Ok(())
}

#[tokio::test]
async fn missing_token_is_unauthorized() -> Result<()> {
    let (pool, _dir) = setup_pool().await?;
    let app = app(&pool).await?;

    let (status, body) = send(
        &app,
        "POST",
        "/access/menu",
        None,
        Some(json!({ "principal_id": "sam", "menu_id": "orders" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    Ok(())
}

#[tokio::test]
async fn closed_store_is_unavailable_not_denied() -> Result<()> {
    let (pool, _dir) = setup_pool().await?;
    seed(&pool).await?;
    let app = app(&pool).await?;

    pool.close().await;

    let (status, body) = send(
        &app,
        "POST",
        "/access/menu",
        Some("sam"),
        Some(json!({ "principal_id": "sam", "menu_id": "orders" })),
    )
    .await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{body}");
    assert_eq!(body["error"], "store_unavailable");

    Ok(())
}
