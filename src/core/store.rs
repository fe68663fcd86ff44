//! Key/value persistence for per-user engine state.
//!
//! [`KeyValueStore`] is the persistence capability the engine consumes. [`DbStore`] backs it
//! with the `kv_store` table. [`UserStore`] binds a store to one user namespace and turns
//! failures into logged no-ops so that an I/O problem never breaks the in-memory state.

use crate::{
    entities::{KvEntry, kv_entry},
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{Set, prelude::*};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::{trace, warn};

/// Namespaced durable key to string storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, if any.
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>>;

    /// Writes `value` under `key`, replacing any previous value.
    async fn set(&self, namespace: &str, key: &str, value: String) -> Result<()>;

    /// Deletes the value stored under `key`. Missing keys are not an error.
    async fn remove(&self, namespace: &str, key: &str) -> Result<()>;
}

/// `SeaORM` backed [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct DbStore {
    db: DatabaseConnection,
}

impl DbStore {
    /// Wraps an open connection. Tables must already exist.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find_entry(&self, namespace: &str, key: &str) -> Result<Option<kv_entry::Model>> {
        KvEntry::find()
            .filter(kv_entry::Column::Namespace.eq(namespace))
            .filter(kv_entry::Column::Key.eq(key))
            .one(&self.db)
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl KeyValueStore for DbStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        Ok(self.find_entry(namespace, key).await?.map(|entry| entry.value))
    }

    async fn set(&self, namespace: &str, key: &str, value: String) -> Result<()> {
        let now = Utc::now().naive_utc();

        if let Some(entry) = self.find_entry(namespace, key).await? {
            let mut active_model: kv_entry::ActiveModel = entry.into();
            active_model.value = Set(value);
            active_model.updated_at = Set(now);
            active_model.update(&self.db).await?;
        } else {
            let new_entry = kv_entry::ActiveModel {
                namespace: Set(namespace.to_string()),
                key: Set(key.to_string()),
                value: Set(value),
                updated_at: Set(now),
                ..Default::default()
            };
            new_entry.insert(&self.db).await?;
        }

        Ok(())
    }

    async fn remove(&self, namespace: &str, key: &str) -> Result<()> {
        KvEntry::delete_many()
            .filter(kv_entry::Column::Namespace.eq(namespace))
            .filter(kv_entry::Column::Key.eq(key))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}

/// A [`KeyValueStore`] bound to one user namespace.
///
/// Values are stored as JSON. Reads that fail or hold undecodable data yield `None`;
/// writes that fail are logged and reported as `false`.
#[derive(Clone)]
pub struct UserStore {
    inner: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl std::fmt::Debug for UserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl UserStore {
    /// Binds `inner` to the namespace of `user_id`.
    #[must_use]
    pub fn new(inner: Arc<dyn KeyValueStore>, user_id: &str) -> Self {
        Self {
            inner,
            namespace: user_id.to_string(),
        }
    }

    /// The user namespace this handle writes to.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Loads and decodes the record under `key`.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.inner.get(&self.namespace, key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(namespace = %self.namespace, key, "Failed to read stored value: {e}");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(namespace = %self.namespace, key, "Discarding undecodable stored value: {e}");
                None
            }
        }
    }

    /// Encodes and writes `value` under `key`. Returns whether the write reached the store.
    pub async fn save<T: Serialize + Sync>(&self, key: &str, value: &T) -> bool {
        match self.try_save(key, value).await {
            Ok(()) => {
                trace!(namespace = %self.namespace, key, "Persisted value");
                true
            }
            Err(e) => {
                warn!(namespace = %self.namespace, key, "Keeping in-memory state only: {e}");
                false
            }
        }
    }

    /// Removes the record under `key`. Returns whether the removal reached the store.
    pub async fn remove(&self, key: &str) -> bool {
        match self.inner.remove(&self.namespace, key).await {
            Ok(()) => true,
            Err(e) => {
                warn!(namespace = %self.namespace, key, "Failed to remove stored value: {e}");
                false
            }
        }
    }

    async fn try_save<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_string(value)?;
        self.inner
            .set(&self.namespace, key, encoded)
            .await
            .map_err(|e| match e {
                Error::Persistence { .. } => e,
                other => Error::Persistence {
                    message: other.to_string(),
                },
            })
    }
}
