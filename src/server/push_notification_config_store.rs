//! Push-notification config store (C7) — persists per-task webhook
//! configuration. Delivery itself (the actual HTTP push) is out of scope;
//! this module only stores and retrieves the configuration a client
//! registers via `tasks/pushNotificationConfig/{set,get,list,delete}`.
//!
//! New module: the teacher repo has no equivalent — push-notification
//! config handling was previously a hardcoded `UnsupportedOperation` in
//! `request_handler.rs`. Structured after [`super::task_store::TaskStore`]
//! and [`super::file_task_store::FileTaskStore`]'s trait/in-memory/file-backed
//! split.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{A2AError, A2AResult};
use crate::types::PushNotificationConfig;

/// Trait for persisting push-notification configuration per task.
#[async_trait]
pub trait PushNotificationConfigStore: Send + Sync {
    /// Store (or update) a config for `task_id`. Assigns an `id` if the
    /// caller didn't supply one. Returns the stored config.
    async fn set(&self, task_id: &str, config: PushNotificationConfig) -> A2AResult<PushNotificationConfig>;

    /// Retrieve a single config by id, or the sole config if `config_id` is
    /// `None` and exactly one is registered.
    async fn get(&self, task_id: &str, config_id: Option<&str>) -> A2AResult<Option<PushNotificationConfig>>;

    /// List every config registered for a task.
    async fn get_all(&self, task_id: &str) -> A2AResult<Vec<PushNotificationConfig>>;

    /// Delete a config by id. Silently succeeds if it does not exist.
    async fn delete(&self, task_id: &str, config_id: &str) -> A2AResult<()>;
}

/// In-memory push-notification config store.
#[derive(Debug, Default)]
pub struct InMemoryPushNotificationConfigStore {
    configs: RwLock<HashMap<String, Vec<PushNotificationConfig>>>,
}

impl InMemoryPushNotificationConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn assign_id(mut config: PushNotificationConfig) -> PushNotificationConfig {
    if config.id.is_none() {
        config.id = Some(Uuid::new_v4().to_string());
    }
    config
}

#[async_trait]
impl PushNotificationConfigStore for InMemoryPushNotificationConfigStore {
    async fn set(&self, task_id: &str, config: PushNotificationConfig) -> A2AResult<PushNotificationConfig> {
        let config = assign_id(config);
        let mut configs = self.configs.write().await;
        let entry = configs.entry(task_id.to_string()).or_default();
        if let Some(existing) = entry.iter_mut().find(|c| c.id == config.id) {
            *existing = config.clone();
        } else {
            entry.push(config.clone());
        }
        debug!(task_id = %task_id, config_id = ?config.id, "Push notification config set");
        Ok(config)
    }

    async fn get(&self, task_id: &str, config_id: Option<&str>) -> A2AResult<Option<PushNotificationConfig>> {
        let configs = self.configs.read().await;
        let Some(entries) = configs.get(task_id) else {
            return Ok(None);
        };
        match config_id {
            Some(id) => Ok(entries.iter().find(|c| c.id.as_deref() == Some(id)).cloned()),
            None => Ok(entries.first().cloned()),
        }
    }

    async fn get_all(&self, task_id: &str) -> A2AResult<Vec<PushNotificationConfig>> {
        let configs = self.configs.read().await;
        Ok(configs.get(task_id).cloned().unwrap_or_default())
    }

    async fn delete(&self, task_id: &str, config_id: &str) -> A2AResult<()> {
        let mut configs = self.configs.write().await;
        if let Some(entries) = configs.get_mut(task_id) {
            entries.retain(|c| c.id.as_deref() != Some(config_id));
        }
        debug!(task_id = %task_id, config_id = %config_id, "Push notification config deleted");
        Ok(())
    }
}

/// File-backed push-notification config store: one JSON file per task at
/// `<dir>/<TaskId>.json`, containing the full list of configs for that
/// task. Writes are atomic (temp file + fsync + rename), matching
/// [`super::file_task_store::FileTaskStore`] and [`super::event_store::FileEventStore`].
pub struct FilePushNotificationConfigStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Vec<PushNotificationConfig>>>,
}

impl FilePushNotificationConfigStore {
    pub async fn new(dir: impl Into<PathBuf>) -> A2AResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| A2AError::internal_error(format!("failed to create pushConfigs dir: {e}")))?;

        let store = Self {
            dir,
            cache: RwLock::new(HashMap::new()),
        };
        store.load_from_disk().await?;
        Ok(store)
    }

    fn path_for(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{task_id}.json"))
    }

    async fn load_from_disk(&self) -> A2AResult<()> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| A2AError::internal_error(format!("failed to read pushConfigs dir: {e}")))?;

        let mut cache = self.cache.write().await;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(task_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(contents) = fs::read_to_string(&path).await {
                if let Ok(configs) = serde_json::from_str::<Vec<PushNotificationConfig>>(&contents) {
                    cache.insert(task_id.to_string(), configs);
                }
            }
        }
        Ok(())
    }

    async fn write_to_disk(&self, task_id: &str, configs: &[PushNotificationConfig]) -> A2AResult<()> {
        let path = self.path_for(task_id);
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(configs)
            .map_err(|e| A2AError::internal_error(format!("failed to serialize configs: {e}")))?;

        {
            use tokio::io::AsyncWriteExt;
            let mut file = fs::File::create(&tmp_path)
                .await
                .map_err(|e| A2AError::internal_error(format!("failed to create tmp file: {e}")))?;
            file.write_all(json.as_bytes())
                .await
                .map_err(|e| A2AError::internal_error(format!("failed to write tmp file: {e}")))?;
            file.sync_all()
                .await
                .map_err(|e| A2AError::internal_error(format!("failed to fsync tmp file: {e}")))?;
        }

        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| A2AError::internal_error(format!("failed to rename config file: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl PushNotificationConfigStore for FilePushNotificationConfigStore {
    async fn set(&self, task_id: &str, config: PushNotificationConfig) -> A2AResult<PushNotificationConfig> {
        let config = assign_id(config);
        let configs = {
            let mut cache = self.cache.write().await;
            let entry = cache.entry(task_id.to_string()).or_default();
            if let Some(existing) = entry.iter_mut().find(|c| c.id == config.id) {
                *existing = config.clone();
            } else {
                entry.push(config.clone());
            }
            entry.clone()
        };
        self.write_to_disk(task_id, &configs).await?;
        Ok(config)
    }

    async fn get(&self, task_id: &str, config_id: Option<&str>) -> A2AResult<Option<PushNotificationConfig>> {
        let cache = self.cache.read().await;
        let Some(entries) = cache.get(task_id) else {
            return Ok(None);
        };
        match config_id {
            Some(id) => Ok(entries.iter().find(|c| c.id.as_deref() == Some(id)).cloned()),
            None => Ok(entries.first().cloned()),
        }
    }

    async fn get_all(&self, task_id: &str) -> A2AResult<Vec<PushNotificationConfig>> {
        let cache = self.cache.read().await;
        Ok(cache.get(task_id).cloned().unwrap_or_default())
    }

    async fn delete(&self, task_id: &str, config_id: &str) -> A2AResult<()> {
        let configs = {
            let mut cache = self.cache.write().await;
            if let Some(entries) = cache.get_mut(task_id) {
                entries.retain(|c| c.id.as_deref() != Some(config_id));
                entries.clone()
            } else {
                return Ok(());
            }
        };
        self.write_to_disk(task_id, &configs).await?;
        Ok(())
    }
}
