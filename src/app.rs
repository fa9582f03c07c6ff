use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::assignment::AssignmentRunner;
use crate::authz::{AuthorizationResolver, PermissionCache};
use crate::config::EngineConfig;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{access, assignments, health, rbac};
use crate::store::{DirectoryAdapter, PermissionStore, SqliteDirectory, SqlitePermissionStore};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub config: Arc<EngineConfig>,
    pub event_bus: EventBus,
    pub permissions: SqlitePermissionStore,
    pub resolver: AuthorizationResolver,
    pub runner: AssignmentRunner,
}

impl AppState {
    /// Wires stores, cache and runner over one pool and starts the activity listener.
    /// Must be called inside a tokio runtime.
    pub fn new(pool: SqlitePool, jwt: JwtConfig, config: EngineConfig) -> Self {
        let (event_bus, rx) = init_event_bus();
        tokio::spawn(start_activity_listener(rx, pool.clone()));

        let permissions = SqlitePermissionStore::new(pool.clone());
        let directory: Arc<dyn DirectoryAdapter> = Arc::new(SqliteDirectory::new(pool.clone()));
        let store: Arc<dyn PermissionStore> = Arc::new(permissions.clone());
        let cache = Arc::new(PermissionCache::new(store, config.permission_cache_ttl));

        Self {
            resolver: AuthorizationResolver::new(cache, directory.clone()),
            runner: AssignmentRunner::new(pool.clone(), directory, event_bus.clone(), &config),
            pool,
            jwt: Arc::new(jwt),
            config: Arc::new(config),
            event_bus,
            permissions,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let config = EngineConfig::from_env()?;
    create_app_with_config(pool, jwt_config, config).await
}

pub async fn create_app_with_config(pool: SqlitePool, jwt: JwtConfig, config: EngineConfig) -> Result<Router, AppError> {
    Ok(router(AppState::new(pool, jwt, config)))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/access", access::routes())
        .nest("/assignments", assignments::routes())
        .nest("/rbac", rbac::routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
