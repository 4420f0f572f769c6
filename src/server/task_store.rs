//! Task store — persistence layer for A2A tasks.
//!
//! Mirrors Python SDK's `TaskStore(ABC)` and `InMemoryTaskStore` from
//! `a2a.server.tasks.task_store` and `a2a.server.tasks.inmemory_task_store`.
//!
//! The task store is responsible for persisting and retrieving [`Task`] objects.
//! The [`InMemoryTaskStore`] is provided for development and testing; production
//! deployments should implement the [`TaskStore`] trait backed by a database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{A2AError, A2AResult};
use crate::types::{Artifact, Message, Task, TaskState, TaskStatus};

/// Parameters for listing tasks with optional filtering and pagination.
#[derive(Debug, Clone, Default)]
pub struct TaskListParams {
    /// Filter tasks by context ID.
    pub context_id: Option<String>,

    /// Filter tasks by state.
    pub status: Option<Vec<TaskState>>,

    /// Maximum number of tasks to return per page.
    pub page_size: Option<usize>,

    /// Opaque token for pagination — the task ID to start after.
    pub page_token: Option<String>,
}

/// Response for a task listing request.
#[derive(Debug, Clone)]
pub struct TaskListResponse {
    /// The tasks matching the query, after pagination.
    pub tasks: Vec<Task>,

    /// Total number of tasks matching the filter, before pagination.
    pub total_size: usize,

    /// Token for the next page, if more results are available.
    pub next_page_token: Option<String>,
}

/// Trait for persisting and retrieving A2A tasks.
///
/// Implementations must be `Send + Sync` for use in async server contexts.
/// All methods take `&self` and use interior mutability for thread safety.
///
/// # Provided implementations
///
/// - [`InMemoryTaskStore`] — simple in-memory store (data lost on restart)
/// - [`super::file_task_store::FileTaskStore`] — one JSON file per task,
///   atomic writes
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Save or update a task in the store.
    ///
    /// If a task with the same ID already exists, it is overwritten.
    async fn save(&self, task: Task) -> A2AResult<()>;

    /// Retrieve a task by its ID.
    ///
    /// Returns `None` if the task does not exist.
    async fn get(&self, task_id: &str) -> A2AResult<Option<Task>>;

    /// Delete a task by its ID.
    ///
    /// Silently succeeds if the task does not exist.
    async fn delete(&self, task_id: &str) -> A2AResult<()>;

    /// List tasks matching the given parameters.
    ///
    /// Supports filtering by context ID and status, and pagination via
    /// `page_size` and `page_token`.
    async fn list(&self, params: &TaskListParams) -> A2AResult<TaskListResponse>;

    /// Update a task's status in place.
    ///
    /// Fails with [`A2AError::TaskNotFound`] if the task does not exist.
    async fn update_status(&self, task_id: &str, status: TaskStatus) -> A2AResult<Task>;

    /// Append a message to a task's history.
    ///
    /// Fails with [`A2AError::TaskNotFound`] if the task does not exist.
    async fn append_history(&self, task_id: &str, message: Message) -> A2AResult<Task>;

    /// Replace-or-append an artifact by `artifact_id`.
    ///
    /// If an artifact with the same id already exists: `append = true` pushes
    /// `artifact`'s parts onto it, `append = false` replaces it outright.
    /// If no artifact with that id exists yet, it is pushed as a new entry
    /// regardless of `append` — an `append = true` first chunk creates.
    ///
    /// Fails with [`A2AError::TaskNotFound`] if the task does not exist.
    async fn upsert_artifact(&self, task_id: &str, artifact: Artifact, append: bool) -> A2AResult<Task>;
}

/// Shared replace-or-append-by-id logic for [`TaskStore::upsert_artifact`].
pub(crate) fn merge_artifact(task: &mut Task, artifact: Artifact, append: bool) {
    let artifacts = task.artifacts.get_or_insert_with(Vec::new);
    if let Some(existing) = artifacts
        .iter_mut()
        .find(|a| a.artifact_id == artifact.artifact_id)
    {
        if append {
            existing.parts.extend(artifact.parts);
        } else {
            *existing = artifact;
        }
    } else {
        artifacts.push(artifact);
    }
}

/// In-memory task store backed by a `HashMap`.
///
/// Suitable for development, testing, and short-lived server instances.
/// All task data is lost when the process exits.
///
/// Thread-safe via `tokio::sync::RwLock`.
#[derive(Debug)]
pub struct InMemoryTaskStore {
    tasks: Arc<RwLock<HashMap<String, Task>>>,
    /// Insertion order for deterministic listing/pagination.
    insertion_order: Arc<RwLock<Vec<String>>>,
}

impl InMemoryTaskStore {
    /// Create a new empty in-memory task store.
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            insertion_order: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `(context_id, status)` filters and pagination over a snapshot,
/// shared by every `TaskStore::list` implementation.
pub(crate) fn paginate(
    order: &[String],
    lookup: impl Fn(&str) -> Option<Task>,
    params: &TaskListParams,
) -> TaskListResponse {
    let matches = |task: &Task| {
        if let Some(ref ctx_id) = params.context_id {
            if task.context_id != *ctx_id {
                return false;
            }
        }
        if let Some(ref statuses) = params.status {
            if !statuses.contains(&task.status.state) {
                return false;
            }
        }
        true
    };

    let total_size = order
        .iter()
        .filter_map(|id| lookup(id))
        .filter(matches)
        .count();

    let start_idx = if let Some(ref token) = params.page_token {
        match order.iter().position(|id| id == token) {
            Some(pos) => pos + 1,
            None => {
                warn!(page_token = %token, "Invalid page token, starting from beginning");
                0
            }
        }
    } else {
        0
    };

    let page_size = params.page_size.unwrap_or(usize::MAX);
    let mut result_tasks = Vec::new();
    let mut last_id: Option<String> = None;

    for id in order.iter().skip(start_idx) {
        if result_tasks.len() >= page_size {
            break;
        }
        if let Some(task) = lookup(id) {
            if !matches(&task) {
                continue;
            }
            last_id = Some(id.clone());
            result_tasks.push(task);
        }
    }

    let next_page_token = if result_tasks.len() == page_size {
        last_id.and_then(|last| {
            let last_pos = order.iter().position(|id| *id == last).unwrap_or(0);
            (last_pos + 1 < order.len()).then_some(last)
        })
    } else {
        None
    };

    TaskListResponse {
        tasks: result_tasks,
        total_size,
        next_page_token,
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save(&self, task: Task) -> A2AResult<()> {
        let task_id = task.id.clone();
        let mut tasks = self.tasks.write().await;
        let is_new = !tasks.contains_key(&task_id);
        tasks.insert(task_id.clone(), task);

        if is_new {
            let mut order = self.insertion_order.write().await;
            order.push(task_id.clone());
        }

        debug!(task_id = %task_id, is_new = is_new, "Task saved");
        Ok(())
    }

    async fn get(&self, task_id: &str) -> A2AResult<Option<Task>> {
        let tasks = self.tasks.read().await;
        let task = tasks.get(task_id).cloned();
        debug!(task_id = %task_id, found = task.is_some(), "Task lookup");
        Ok(task)
    }

    async fn delete(&self, task_id: &str) -> A2AResult<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.remove(task_id).is_some() {
            let mut order = self.insertion_order.write().await;
            order.retain(|id| id != task_id);
            debug!(task_id = %task_id, "Task deleted");
        } else {
            warn!(task_id = %task_id, "Attempted to delete non-existent task");
        }
        Ok(())
    }

    async fn list(&self, params: &TaskListParams) -> A2AResult<TaskListResponse> {
        let tasks = self.tasks.read().await;
        let order = self.insertion_order.read().await;
        let response = paginate(&order, |id| tasks.get(id).cloned(), params);
        debug!(
            count = response.tasks.len(),
            total_size = response.total_size,
            has_more = response.next_page_token.is_some(),
            "Listed tasks"
        );
        Ok(response)
    }

    async fn update_status(&self, task_id: &str, status: TaskStatus) -> A2AResult<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| A2AError::task_not_found(task_id))?;
        task.status = status;
        debug!(task_id = %task_id, state = ?task.status.state, "Task status updated");
        Ok(task.clone())
    }

    async fn append_history(&self, task_id: &str, message: Message) -> A2AResult<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| A2AError::task_not_found(task_id))?;
        task.history.get_or_insert_with(Vec::new).push(message);
        debug!(task_id = %task_id, "History appended");
        Ok(task.clone())
    }

    async fn upsert_artifact(&self, task_id: &str, artifact: Artifact, append: bool) -> A2AResult<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| A2AError::task_not_found(task_id))?;
        merge_artifact(task, artifact, append);
        debug!(task_id = %task_id, "Artifact upserted");
        Ok(task.clone())
    }
}
