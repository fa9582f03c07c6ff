mod common;

use anyhow::Result;
use serde_json::json;
use sqlx::SqlitePool;

use common::{add_item, app, send, seed_admin_and_team, setup_pool};
use opsdesk::events::chain_hash;

/// The listener writes asynchronously; poll until `expected` rows exist or give up.
async fn wait_for_events(pool: &SqlitePool, expected: i64) -> Result<i64> {
    let mut count = 0;
    for _ in 0..20 {
        tokio::time::sleep(tokio::time::Duration::from_millis(150)).await;
        count = sqlx::query_scalar("SELECT COUNT(*) FROM event_store").fetch_one(pool).await?;
        if count >= expected {
            break;
        }
    }
    Ok(count)
}

#[tokio::test]
async fn test_activity_log_flow() -> Result<()> {
    let (pool, _dir) = setup_pool().await?;
    seed_admin_and_team(&pool, &["ana", "ben"]).await?;
    add_item(&pool, 1, "north", Some("2026-03-02"), None).await?;
    let app = app(&pool).await?;

    send(
        &app,
        "POST",
        "/rbac/roles",
        Some("root"),
        Some(json!({ "code": "lead", "name": "Team lead", "category": "partner" })),
    )
    .await?;
    send(
        &app,
        "PUT",
        "/rbac/menus/orders",
        Some("root"),
        Some(json!({ "allowed_roles": ["partner"] })),
    )
    .await?;
    send(
        &app,
        "POST",
        "/assignments/run",
        Some("root"),
        Some(json!({ "policy": "load_aware", "pool": { "branch": "north" } })),
    )
    .await?;

    assert_eq!(wait_for_events(&pool, 3).await?, 3);

    let rows: Vec<(String, Option<String>, Option<String>, String)> =
        sqlx::query_as("SELECT event_name, actor_id, subject_id, severity FROM activity_log ORDER BY occurred_at")
            .fetch_all(&pool)
            .await?;
    let names: Vec<&str> = rows.iter().map(|r| r.0.as_str()).collect();
    assert!(names.contains(&"role.created"), "{names:?}");
    assert!(names.contains(&"menu_permission.updated"), "{names:?}");
    assert!(names.contains(&"assignment_run.completed"), "{names:?}");

    let role = rows.iter().find(|r| r.0 == "role.created").unwrap();
    assert_eq!(role.1.as_deref(), Some("root"));
    assert_eq!(role.2.as_deref(), Some("lead"));
    assert_eq!(role.3, "critical");

    let run = rows.iter().find(|r| r.0 == "assignment_run.completed").unwrap();
    assert_eq!(run.2.as_deref(), Some("north"));
    assert_eq!(run.3, "important");

    Ok(())
}

#[tokio::test]
async fn event_store_hash_chain_is_intact() -> Result<()> {
    let (pool, _dir) = setup_pool().await?;
    seed_admin_and_team(&pool, &["ana"]).await?;
    let app = app(&pool).await?;

    for code in ["one", "two", "three"] {
        send(
            &app,
            "POST",
            "/rbac/roles",
            Some("root"),
            Some(json!({ "code": code, "name": code, "category": "employee" })),
        )
        .await?;
    }
    assert_eq!(wait_for_events(&pool, 3).await?, 3);

    let chain: Vec<(i64, String, Option<String>, String)> =
        sqlx::query_as("SELECT seq, payload, prev_hash, hash FROM event_store ORDER BY seq")
            .fetch_all(&pool)
            .await?;

    let mut previous: Option<String> = None;
    for (index, (seq, payload, prev_hash, hash)) in chain.iter().enumerate() {
        assert_eq!(*seq, index as i64 + 1);
        assert_eq!(prev_hash, &previous);
        assert_eq!(hash, &chain_hash(previous.as_deref(), payload));
        previous = Some(hash.clone());
    }

    Ok(())
}
