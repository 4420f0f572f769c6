//! File-based task store — persists tasks as JSON files.
//!
//! Each task is saved as `<dir>/<TaskId>.json`, where `<dir>` is the
//! `tasks/` subdirectory of a file-backed deployment's data root —
//! `DefaultRequestHandler::with_file_backed_stores` composes that layout
//! alongside `events/` and `pushConfigs/` for the other two stores. Writes
//! are atomic: the task is
//! serialized to a sibling `.tmp` file, fsynced, then renamed over the
//! target — a crash can never leave a partially-written task file in
//! place. Suitable for development, debugging, and visualization with
//! external tools (e.g., a TUI watching the directory).
//!
//! Thread-safe via `tokio::sync::RwLock`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{A2AError, A2AResult};
use crate::server::task_store::{merge_artifact, paginate, TaskListParams, TaskListResponse, TaskStore};
use crate::types::{Artifact, Message, Task, TaskStatus};

/// File-based task store that persists tasks as individual JSON files.
///
/// Each task is saved as `{task_id}.json` in the specified directory.
/// This allows external tools (like a TUI) to watch the directory and
/// visualize task updates in real-time.
///
/// Thread-safe via `tokio::sync::RwLock`.
#[derive(Debug, Clone)]
pub struct FileTaskStore {
    /// Directory where task JSON files are stored.
    tasks_dir: PathBuf,
    /// In-memory cache for faster listing/filtering.
    /// Maps task_id -> Task
    cache: Arc<RwLock<HashMap<String, Task>>>,
    /// Insertion order for deterministic listing/pagination.
    insertion_order: Arc<RwLock<Vec<String>>>,
}

impl FileTaskStore {
    /// Create a new file-based task store.
    ///
    /// Creates the directory if it doesn't exist, and reconstructs the
    /// in-memory cache from whatever task files are already present.
    ///
    /// # Example
    /// ```no_run
    /// use a2a_rs::server::FileTaskStore;
    /// use std::path::PathBuf;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = FileTaskStore::new(PathBuf::from("./data/tasks")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(tasks_dir: impl Into<PathBuf>) -> A2AResult<Self> {
        let tasks_dir = tasks_dir.into();
        fs::create_dir_all(&tasks_dir)
            .await
            .map_err(|e| A2AError::internal_error(format!("failed to create tasks dir: {e}")))?;

        let store = Self {
            tasks_dir,
            cache: Arc::new(RwLock::new(HashMap::new())),
            insertion_order: Arc::new(RwLock::new(Vec::new())),
        };

        store.load_from_disk().await?;
        Ok(store)
    }

    fn task_file_path(&self, task_id: &str) -> PathBuf {
        self.tasks_dir.join(format!("{task_id}.json"))
    }

    fn task_tmp_path(&self, task_id: &str) -> PathBuf {
        self.tasks_dir.join(format!("{task_id}.json.tmp"))
    }

    /// Load all existing tasks from disk into the cache.
    async fn load_from_disk(&self) -> A2AResult<()> {
        let mut entries = fs::read_dir(&self.tasks_dir)
            .await
            .map_err(|e| A2AError::internal_error(format!("failed to read tasks dir: {e}")))?;

        let mut cache = self.cache.write().await;
        let mut order = self.insertion_order.write().await;

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            match fs::read_to_string(&path).await {
                Ok(contents) => match serde_json::from_str::<Task>(&contents) {
                    Ok(task) => {
                        let task_id = task.id.clone();
                        if !cache.contains_key(&task_id) {
                            order.push(task_id.clone());
                        }
                        cache.insert(task_id, task);
                    }
                    Err(e) => {
                        warn!(path = ?path, error = %e, "Failed to parse task JSON file");
                    }
                },
                Err(e) => {
                    warn!(path = ?path, error = %e, "Failed to read task file");
                }
            }
        }

        debug!(count = cache.len(), "Loaded tasks from disk");
        Ok(())
    }

    /// Write a task to disk atomically: serialize to a `.tmp` sibling,
    /// fsync, then rename over the target.
    async fn write_to_disk(&self, task: &Task) -> A2AResult<()> {
        let path = self.task_file_path(&task.id);
        let tmp_path = self.task_tmp_path(&task.id);

        let json = serde_json::to_string_pretty(task)
            .map_err(|e| A2AError::internal_error(format!("failed to serialize task: {e}")))?;

        {
            let mut file = fs::File::create(&tmp_path)
                .await
                .map_err(|e| A2AError::internal_error(format!("failed to create task tmp file: {e}")))?;
            use tokio::io::AsyncWriteExt;
            file.write_all(json.as_bytes())
                .await
                .map_err(|e| A2AError::internal_error(format!("failed to write task tmp file: {e}")))?;
            file.sync_all()
                .await
                .map_err(|e| A2AError::internal_error(format!("failed to fsync task tmp file: {e}")))?;
        }

        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| A2AError::internal_error(format!("failed to rename task file: {e}")))?;

        debug!(task_id = %task.id, path = ?path, "Task written to disk (atomic)");
        Ok(())
    }

    async fn delete_from_disk(&self, task_id: &str) -> A2AResult<()> {
        let path = self.task_file_path(task_id);

        match fs::remove_file(&path).await {
            Ok(_) => {
                debug!(task_id = %task_id, path = ?path, "Task file deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(A2AError::internal_error(format!(
                "failed to delete task file: {e}"
            ))),
        }
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn save(&self, task: Task) -> A2AResult<()> {
        let task_id = task.id.clone();

        self.write_to_disk(&task).await?;

        let mut cache = self.cache.write().await;
        let is_new = !cache.contains_key(&task_id);
        cache.insert(task_id.clone(), task);

        if is_new {
            let mut order = self.insertion_order.write().await;
            order.push(task_id.clone());
        }

        debug!(task_id = %task_id, is_new = is_new, "Task saved");
        Ok(())
    }

    async fn get(&self, task_id: &str) -> A2AResult<Option<Task>> {
        let cache = self.cache.read().await;
        let task = cache.get(task_id).cloned();
        debug!(task_id = %task_id, found = task.is_some(), "Task lookup");
        Ok(task)
    }

    async fn delete(&self, task_id: &str) -> A2AResult<()> {
        self.delete_from_disk(task_id).await?;

        let mut cache = self.cache.write().await;
        if cache.remove(task_id).is_some() {
            let mut order = self.insertion_order.write().await;
            order.retain(|id| id != task_id);
            debug!(task_id = %task_id, "Task deleted");
        } else {
            warn!(task_id = %task_id, "Attempted to delete non-existent task");
        }
        Ok(())
    }

    async fn list(&self, params: &TaskListParams) -> A2AResult<TaskListResponse> {
        let cache = self.cache.read().await;
        let order = self.insertion_order.read().await;
        let response = paginate(&order, |id| cache.get(id).cloned(), params);
        debug!(
            count = response.tasks.len(),
            total_size = response.total_size,
            has_more = response.next_page_token.is_some(),
            "Listed tasks"
        );
        Ok(response)
    }

    async fn update_status(&self, task_id: &str, status: TaskStatus) -> A2AResult<Task> {
        let task = {
            let mut cache = self.cache.write().await;
            let task = cache
                .get_mut(task_id)
                .ok_or_else(|| A2AError::task_not_found(task_id))?;
            task.status = status;
            task.clone()
        };
        self.write_to_disk(&task).await?;
        debug!(task_id = %task_id, state = ?task.status.state, "Task status updated");
        Ok(task)
    }

    async fn append_history(&self, task_id: &str, message: Message) -> A2AResult<Task> {
        let task = {
            let mut cache = self.cache.write().await;
            let task = cache
                .get_mut(task_id)
                .ok_or_else(|| A2AError::task_not_found(task_id))?;
            task.history.get_or_insert_with(Vec::new).push(message);
            task.clone()
        };
        self.write_to_disk(&task).await?;
        debug!(task_id = %task_id, "History appended");
        Ok(task)
    }

    async fn upsert_artifact(&self, task_id: &str, artifact: Artifact, append: bool) -> A2AResult<Task> {
        let task = {
            let mut cache = self.cache.write().await;
            let task = cache
                .get_mut(task_id)
                .ok_or_else(|| A2AError::task_not_found(task_id))?;
            merge_artifact(task, artifact, append);
            task.clone()
        };
        self.write_to_disk(&task).await?;
        debug!(task_id = %task_id, "Artifact upserted");
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskState;

    fn sample_task(id: &str, context_id: &str) -> Task {
        Task {
            id: id.to_string(),
            context_id: context_id.to_string(),
            kind: "task".to_string(),
            status: TaskStatus::new(TaskState::Submitted),
            artifacts: None,
            history: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn save_persists_under_dir_directly() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTaskStore::new(dir.path()).await.unwrap();
        store.save(sample_task("t1", "ctx1")).await.unwrap();

        let expected = dir.path().join("t1.json");
        assert!(expected.exists());
        assert!(!dir.path().join("t1.json.tmp").exists());
    }

    #[tokio::test]
    async fn reload_recovers_tasks_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileTaskStore::new(dir.path()).await.unwrap();
            store.save(sample_task("t1", "ctx1")).await.unwrap();
            store.save(sample_task("t2", "ctx2")).await.unwrap();
        }

        let reopened = FileTaskStore::new(dir.path()).await.unwrap();
        assert!(reopened.get("t1").await.unwrap().is_some());
        assert!(reopened.get("t2").await.unwrap().is_some());
        let listed = reopened.list(&TaskListParams::default()).await.unwrap();
        assert_eq!(listed.total_size, 2);
    }

    #[tokio::test]
    async fn update_status_rewrites_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTaskStore::new(dir.path()).await.unwrap();
        store.save(sample_task("t1", "ctx1")).await.unwrap();
        store
            .update_status("t1", TaskStatus::new(TaskState::Completed))
            .await
            .unwrap();

        let reopened = FileTaskStore::new(dir.path()).await.unwrap();
        let task = reopened.get("t1").await.unwrap().unwrap();
        assert_eq!(task.status.state, TaskState::Completed);
        assert!(!dir.path().join("t1.json.tmp").exists());
    }

    #[tokio::test]
    async fn update_status_fails_for_missing_task() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTaskStore::new(dir.path()).await.unwrap();
        let err = store
            .update_status("missing", TaskStatus::new(TaskState::Working))
            .await;
        assert!(matches!(err, Err(A2AError::TaskNotFound { .. })));
    }

    #[tokio::test]
    async fn delete_missing_task_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTaskStore::new(dir.path()).await.unwrap();
        store.delete("missing").await.unwrap();
    }
}
