//! Durable stores behind the engine.
//!
//! The resolver and the assignment runner talk to the traits here; SQLite implementations
//! live in the submodules.

mod cursor;
mod directory;
mod permissions;
mod work;

pub use cursor::CursorStore;
pub use directory::SqliteDirectory;
pub use permissions::SqlitePermissionStore;
pub use work::{ClaimOutcome, WorkStore};

use async_trait::async_trait;

use crate::errors::AppResult;
use crate::models::directory::DirectoryEntry;
use crate::models::rbac::{MenuPermission, ResourcePermission, Role};

/// Read side of the permission tables.
///
/// Absence is returned as `None`, never as an error. Errors mean the store itself failed.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn role(&self, code: &str) -> AppResult<Option<Role>>;

    async fn resource_permission(&self, role_code: &str, resource_code: &str) -> AppResult<Option<ResourcePermission>>;

    async fn menu_permission(&self, menu_id: &str) -> AppResult<Option<MenuPermission>>;
}

/// Read-only view of the HR/identity directory.
#[async_trait]
pub trait DirectoryAdapter: Send + Sync {
    async fn principal(&self, id: &str) -> AppResult<Option<DirectoryEntry>>;

    /// Active members of a team, sorted by id.
    async fn roster(&self, team: &str) -> AppResult<Vec<String>>;
}
