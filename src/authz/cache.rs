use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::errors::{AppError, AppResult};
use crate::models::rbac::{MenuPermission, ResourcePermission, Role};
use crate::store::PermissionStore;

/// Message published on every permission write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionsChanged;

#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    loaded_at: Instant,
}

#[derive(Debug, Default)]
struct Entries {
    /// Bumped on every clear so a read that raced an invalidation is not stored.
    generation: u64,
    roles: HashMap<String, Cached<Option<Role>>>,
    resources: HashMap<(String, String), Cached<Option<ResourcePermission>>>,
    menus: HashMap<String, Cached<Option<MenuPermission>>>,
}

impl Entries {
    fn clear(&mut self) {
        self.generation += 1;
        self.roles.clear();
        self.resources.clear();
        self.menus.clear();
    }
}

fn fresh<K, V>(map: &HashMap<K, Cached<V>>, key: &K, ttl: Duration) -> Option<V>
where
    K: Eq + Hash,
    V: Clone,
{
    map.get(key)
        .filter(|entry| entry.loaded_at.elapsed() < ttl)
        .map(|entry| entry.value.clone())
}

/// TTL cache in front of a [`PermissionStore`].
///
/// Absent rows are cached as `None`, so a missing permission is not re-read on every check.
/// Any write path calls [`PermissionCache::invalidate`]; other holders of the sender obtained
/// through [`PermissionCache::invalidation_sender`] can do the same.
pub struct PermissionCache {
    store: Arc<dyn PermissionStore>,
    ttl: Duration,
    entries: Mutex<Entries>,
    invalidations: broadcast::Sender<PermissionsChanged>,
    listener: Mutex<broadcast::Receiver<PermissionsChanged>>,
}

impl PermissionCache {
    pub fn new(store: Arc<dyn PermissionStore>, ttl: Duration) -> Self {
        let (invalidations, listener) = broadcast::channel(64);
        Self {
            store,
            ttl,
            entries: Mutex::new(Entries::default()),
            invalidations,
            listener: Mutex::new(listener),
        }
    }

    pub fn invalidation_sender(&self) -> broadcast::Sender<PermissionsChanged> {
        self.invalidations.clone()
    }

    /// Drops every cached entry, here and for every other subscriber of the channel.
    pub fn invalidate(&self) {
        self.entries().clear();
        // Our own listener also receives this; clearing twice is harmless.
        let _ = self.invalidations.send(PermissionsChanged);
        tracing::debug!("permission cache invalidated");
    }

    pub async fn role(&self, code: &str) -> AppResult<Option<Role>> {
        let key = code.to_string();
        let generation = match self.lookup(|e| fresh(&e.roles, &key, self.ttl)) {
            Ok(hit) => return Ok(hit),
            Err(generation) => generation,
        };

        let value = self.store.role(code).await.map_err(refresh_failed)?;
        self.store_if_current(generation, |e| {
            e.roles.insert(key, Cached { value: value.clone(), loaded_at: Instant::now() });
        });
        Ok(value)
    }

    pub async fn resource_permission(&self, role_code: &str, resource_code: &str) -> AppResult<Option<ResourcePermission>> {
        let key = (role_code.to_string(), resource_code.to_string());
        let generation = match self.lookup(|e| fresh(&e.resources, &key, self.ttl)) {
            Ok(hit) => return Ok(hit),
            Err(generation) => generation,
        };

        let value = self
            .store
            .resource_permission(role_code, resource_code)
            .await
            .map_err(refresh_failed)?;
        self.store_if_current(generation, |e| {
            e.resources.insert(key, Cached { value: value.clone(), loaded_at: Instant::now() });
        });
        Ok(value)
    }

    pub async fn menu_permission(&self, menu_id: &str) -> AppResult<Option<MenuPermission>> {
        let key = menu_id.to_string();
        let generation = match self.lookup(|e| fresh(&e.menus, &key, self.ttl)) {
            Ok(hit) => return Ok(hit),
            Err(generation) => generation,
        };

        let value = self.store.menu_permission(menu_id).await.map_err(refresh_failed)?;
        self.store_if_current(generation, |e| {
            e.menus.insert(key, Cached { value: value.clone(), loaded_at: Instant::now() });
        });
        Ok(value)
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies pending invalidations, then probes the cache. A miss returns the generation
    /// the caller must present when storing the refreshed value.
    fn lookup<T>(&self, probe: impl FnOnce(&Entries) -> Option<T>) -> Result<T, u64> {
        self.drain_invalidations();
        let entries = self.entries();
        probe(&entries).ok_or(entries.generation)
    }

    fn store_if_current(&self, generation: u64, insert: impl FnOnce(&mut Entries)) {
        self.drain_invalidations();
        let mut entries = self.entries();
        if entries.generation == generation {
            insert(&mut entries);
        }
    }

    fn drain_invalidations(&self) {
        let mut listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        let mut changed = false;
        loop {
            match listener.try_recv() {
                Ok(PermissionsChanged) | Err(broadcast::error::TryRecvError::Lagged(_)) => changed = true,
                Err(broadcast::error::TryRecvError::Empty) | Err(broadcast::error::TryRecvError::Closed) => break,
            }
        }
        drop(listener);

        if changed {
            self.entries().clear();
        }
    }
}

/// Any database failure while gathering authorization inputs means the decision cannot be made.
pub(crate) fn refresh_failed(err: AppError) -> AppError {
    match err {
        AppError::Database(inner) => {
            tracing::error!(error = %inner, "authorization lookup failed");
            AppError::store_unavailable(inner.to_string())
        }
        other => other,
    }
}
