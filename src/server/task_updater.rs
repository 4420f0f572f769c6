//! Task updater — the sole writer of a task's event log and task record.
//!
//! Mirrors the teacher's `task_updater.rs` shape (a thread-safe helper the
//! agent handler holds for the lifetime of one task) but rewired onto the
//! durable [`super::event_store::EventStore`]/[`super::event_subscriber::EventSubscriber`]
//! pair instead of a broadcast `EventQueue`, and onto the [`super::task_store::TaskStore`]
//! directly rather than relying on a separate projector to catch up later.
//!
//! Every public operation performs exactly one event-log append (via
//! [`EventSubscriber::publish`]) followed by exactly one task-store mutation,
//! in that order: the event is durable before the store is touched, so a
//! store failure after a successful append never loses history — a replay
//! from the log can always reconstruct it.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{A2AError, A2AResult};
use crate::types::{Artifact, Message, Part, Role, TaskState, TaskStatus};

use super::event_subscriber::EventSubscriber;
use super::task_store::TaskStore;

/// Returns `true` if a transition from `from` to `to` is permitted.
///
/// Terminal states (`Completed`, `Failed`, `Canceled`, `Rejected`) allow no
/// outgoing transitions at all. A state is always allowed to transition to
/// itself (repeated `Working` progress updates, for instance).
fn allowed(from: TaskState, to: TaskState) -> bool {
    use TaskState::*;

    if from == to {
        return !is_terminal(from);
    }

    match from {
        Submitted => matches!(
            to,
            Working | InputRequired | AuthRequired | Completed | Failed | Canceled | Rejected
        ),
        Working => matches!(
            to,
            InputRequired | AuthRequired | Completed | Failed | Canceled
        ),
        InputRequired | AuthRequired => matches!(to, Working | Completed | Failed | Canceled),
        Completed | Failed | Canceled | Rejected => false,
        // `Unknown` is a wire-only catch-all never assigned locally; treat
        // it like a non-terminal state that can go anywhere `Submitted` can.
        Unknown => matches!(
            to,
            Working | InputRequired | AuthRequired | Completed | Failed | Canceled | Rejected
        ),
    }
}

fn is_terminal(state: TaskState) -> bool {
    matches!(
        state,
        TaskState::Completed | TaskState::Failed | TaskState::Canceled | TaskState::Rejected
    )
}

/// Thread-safe task state transition helper.
///
/// Tracks the task's current state and the last emitted event timestamp so
/// it can enforce the A2A state machine and guarantee strictly increasing
/// per-task timestamps, even under concurrent callers.
///
/// # Thread safety
///
/// All mutation is protected by a `tokio::sync::Mutex`, making it safe to
/// share across tasks via `Arc<TaskUpdater>`.
pub struct TaskUpdater {
    event_subscriber: Arc<EventSubscriber>,
    task_store: Arc<dyn TaskStore>,
    task_id: String,
    context_id: String,
    state: Mutex<UpdaterState>,
}

struct UpdaterState {
    current: TaskState,
    last_timestamp_ms: i64,
}

impl TaskUpdater {
    /// Create a new task updater. `initial_state` should match the task's
    /// current state in the store (typically `Submitted` for a fresh task).
    pub fn new(
        event_subscriber: Arc<EventSubscriber>,
        task_store: Arc<dyn TaskStore>,
        task_id: String,
        context_id: String,
        initial_state: TaskState,
    ) -> Self {
        Self {
            event_subscriber,
            task_store,
            task_id,
            context_id,
            state: Mutex::new(UpdaterState {
                current: initial_state,
                last_timestamp_ms: 0,
            }),
        }
    }

    /// Returns `true` if the task has reached a terminal state.
    pub async fn is_terminal(&self) -> bool {
        is_terminal(self.state.lock().await.current)
    }

    /// Transition the task to `task_state`, publishing a `status-update`
    /// event and persisting the new status.
    ///
    /// `final` is forced to `true` whenever `task_state` is terminal,
    /// regardless of the caller-supplied value.
    ///
    /// # Errors
    ///
    /// Returns [`A2AError::UnsupportedOperation`] if the transition from the
    /// current state to `task_state` is not permitted.
    pub async fn update_status(
        &self,
        task_state: TaskState,
        message: Option<Message>,
        r#final: bool,
        metadata: Option<Value>,
    ) -> A2AResult<()> {
        let is_final = r#final || is_terminal(task_state);

        let timestamp_ms = {
            let mut state = self.state.lock().await;
            if !allowed(state.current, task_state) {
                warn!(
                    task_id = %self.task_id,
                    from = ?state.current,
                    to = ?task_state,
                    "Rejected disallowed state transition"
                );
                return Err(A2AError::unsupported_operation(format!(
                    "task {} cannot transition from {:?} to {:?}",
                    self.task_id, state.current, task_state
                )));
            }

            let now = crate::utils::now_millis();
            let ts = now.max(state.last_timestamp_ms + 1);
            state.last_timestamp_ms = ts;
            state.current = task_state;
            ts
        };

        let timestamp = crate::utils::millis_to_rfc3339(timestamp_ms);
        let status = TaskStatus {
            state: task_state,
            message: message.clone(),
            timestamp: Some(timestamp.clone()),
        };

        self.event_subscriber
            .publish(
                &self.task_id,
                "status-update",
                serde_json::json!({
                    "taskId": self.task_id,
                    "contextId": self.context_id,
                    "kind": "status-update",
                    "status": status,
                    "final": is_final,
                    "metadata": metadata,
                }),
            )
            .await?;

        self.task_store
            .update_status(&self.task_id, status)
            .await?;

        if is_final {
            self.event_subscriber.close(&self.task_id).await?;
        }

        debug!(
            task_id = %self.task_id,
            state = ?task_state,
            r#final = is_final,
            "Status update published"
        );

        Ok(())
    }

    /// Publish a status update with an optional text message, role `agent`.
    pub async fn update_status_text(
        &self,
        task_state: TaskState,
        message: Option<&str>,
        metadata: Option<Value>,
    ) -> A2AResult<()> {
        let status_message =
            message.map(|text| self.new_agent_message(vec![Part::text(text)], None));
        self.update_status(task_state, status_message, false, metadata)
            .await
    }

    /// Append a user or agent message to the task's history without
    /// changing its status.
    pub async fn append_message(&self, message: Message) -> A2AResult<()> {
        self.event_subscriber
            .publish(&self.task_id, "message", serde_json::to_value(&message)?)
            .await?;
        self.task_store
            .append_history(&self.task_id, message)
            .await?;
        Ok(())
    }

    /// Add or extend an artifact on the task.
    ///
    /// Publishes an `artifact-update` event, then replaces or appends the
    /// artifact on the task record by `artifact_id` (generating one if not
    /// supplied). `append = true` against a not-yet-existing `artifact_id`
    /// creates it as the first chunk rather than being a no-op.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_artifact(
        &self,
        parts: Vec<Part>,
        artifact_id: Option<String>,
        name: Option<String>,
        metadata: Option<Value>,
        append: Option<bool>,
        last_chunk: Option<bool>,
        extensions: Option<Vec<String>>,
    ) -> A2AResult<()> {
        if self.is_terminal().await {
            return Err(A2AError::unsupported_operation(format!(
                "task {} is in a terminal state and cannot accept further artifact updates",
                self.task_id
            )));
        }

        let artifact_id = artifact_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let append = append.unwrap_or(false);

        let artifact = Artifact {
            artifact_id: artifact_id.clone(),
            parts,
            name,
            description: None,
            metadata: metadata.clone(),
            extensions,
        };

        self.event_subscriber
            .publish(
                &self.task_id,
                "artifact-update",
                serde_json::json!({
                    "taskId": self.task_id,
                    "contextId": self.context_id,
                    "kind": "artifact-update",
                    "artifact": artifact,
                    "append": append,
                    "lastChunk": last_chunk,
                    "metadata": metadata,
                }),
            )
            .await?;

        self.task_store
            .upsert_artifact(&self.task_id, artifact, append)
            .await?;

        debug!(
            task_id = %self.task_id,
            artifact_id = %artifact_id,
            append = append,
            "Artifact update published"
        );

        Ok(())
    }

    // ---- Convenience methods for common state transitions ----

    /// Transition to `submitted`.
    pub async fn submit(&self, message: Option<Message>) -> A2AResult<()> {
        self.update_status(TaskState::Submitted, message, false, None)
            .await
    }

    /// Transition to `working`.
    pub async fn start_work(&self, message: Option<Message>) -> A2AResult<()> {
        self.update_status(TaskState::Working, message, false, None)
            .await
    }

    /// Transition to `input-required`.
    pub async fn require_input(&self, message: Option<Message>, r#final: bool) -> A2AResult<()> {
        self.update_status(TaskState::InputRequired, message, r#final, None)
            .await
    }

    /// Transition to `auth-required`.
    pub async fn require_auth(&self, message: Option<Message>, r#final: bool) -> A2AResult<()> {
        self.update_status(TaskState::AuthRequired, message, r#final, None)
            .await
    }

    /// Transition to `completed`. Terminal.
    pub async fn complete(&self, message: Option<Message>) -> A2AResult<()> {
        self.update_status(TaskState::Completed, message, true, None)
            .await
    }

    /// Transition to `failed`. Terminal.
    pub async fn fail(&self, message: Option<Message>) -> A2AResult<()> {
        self.update_status(TaskState::Failed, message, true, None)
            .await
    }

    /// Transition to `canceled`. Terminal.
    pub async fn cancel(&self, message: Option<Message>) -> A2AResult<()> {
        self.update_status(TaskState::Canceled, message, true, None)
            .await
    }

    /// Transition to `rejected`. Terminal.
    pub async fn reject(&self, message: Option<Message>) -> A2AResult<()> {
        self.update_status(TaskState::Rejected, message, true, None)
            .await
    }

    /// Transition to `completed` with a text message.
    pub async fn complete_with_text(&self, text: &str) -> A2AResult<()> {
        self.update_status_text(TaskState::Completed, Some(text), None)
            .await
    }

    /// Transition to `failed` with a text message.
    pub async fn fail_with_text(&self, text: &str) -> A2AResult<()> {
        self.update_status_text(TaskState::Failed, Some(text), None)
            .await
    }

    /// Transition to `working` with a text message.
    pub async fn start_work_with_text(&self, text: &str) -> A2AResult<()> {
        self.update_status_text(TaskState::Working, Some(text), None)
            .await
    }

    /// Build a new agent-authored message (without publishing it).
    pub fn new_agent_message(&self, parts: Vec<Part>, metadata: Option<Value>) -> Message {
        Message {
            message_id: Uuid::new_v4().to_string(),
            role: Role::Agent,
            kind: "message".to_string(),
            parts,
            context_id: Some(self.context_id.clone()),
            task_id: Some(self.task_id.clone()),
            metadata,
            extensions: None,
            reference_task_ids: None,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::event_store::InMemoryEventStore;
    use crate::server::task_store::InMemoryTaskStore;
    use crate::types::Task;

    async fn setup(task_id: &str, context_id: &str) -> TaskUpdater {
        let task_store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        task_store
            .save(Task {
                id: task_id.to_string(),
                context_id: context_id.to_string(),
                kind: "task".to_string(),
                status: TaskStatus::new(TaskState::Submitted),
                artifacts: None,
                history: None,
                metadata: None,
            })
            .await
            .unwrap();

        let subscriber = Arc::new(EventSubscriber::new(Arc::new(InMemoryEventStore::new())));
        TaskUpdater::new(
            subscriber,
            task_store,
            task_id.to_string(),
            context_id.to_string(),
            TaskState::Submitted,
        )
    }

    #[tokio::test]
    async fn start_work_then_complete_succeeds() {
        let updater = setup("t1", "ctx1").await;
        updater.start_work(None).await.unwrap();
        updater.complete(None).await.unwrap();
        assert!(updater.is_terminal().await);
    }

    #[tokio::test]
    async fn update_after_terminal_is_rejected() {
        let updater = setup("t1", "ctx1").await;
        updater.complete(None).await.unwrap();
        let err = updater.start_work(None).await;
        assert!(matches!(err, Err(A2AError::UnsupportedOperation { .. })));
    }

    #[tokio::test]
    async fn submitted_cannot_jump_to_working_then_back_to_submitted() {
        let updater = setup("t1", "ctx1").await;
        updater.start_work(None).await.unwrap();
        let err = updater.submit(None).await;
        assert!(matches!(err, Err(A2AError::UnsupportedOperation { .. })));
    }

    #[tokio::test]
    async fn timestamps_strictly_increase() {
        let updater = setup("t1", "ctx1").await;
        updater.start_work(None).await.unwrap();
        let first = updater.state.lock().await.last_timestamp_ms;
        updater.require_input(None, false).await.unwrap();
        let second = updater.state.lock().await.last_timestamp_ms;
        assert!(second > first);
    }

    #[tokio::test]
    async fn add_artifact_append_on_missing_id_creates() {
        let updater = setup("t1", "ctx1").await;
        updater
            .add_artifact(
                vec![Part::text("chunk one")],
                Some("a1".to_string()),
                None,
                None,
                Some(true),
                Some(false),
                None,
            )
            .await
            .unwrap();

        let task = updater.task_store.get("t1").await.unwrap().unwrap();
        let artifacts = task.artifacts.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].parts.len(), 1);
    }

    #[tokio::test]
    async fn add_artifact_append_twice_accumulates_parts() {
        let updater = setup("t1", "ctx1").await;
        updater
            .add_artifact(
                vec![Part::text("a")],
                Some("a1".to_string()),
                None,
                None,
                Some(true),
                Some(false),
                None,
            )
            .await
            .unwrap();
        updater
            .add_artifact(
                vec![Part::text("b")],
                Some("a1".to_string()),
                None,
                None,
                Some(true),
                Some(true),
                None,
            )
            .await
            .unwrap();

        let task = updater.task_store.get("t1").await.unwrap().unwrap();
        let artifacts = task.artifacts.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].parts.len(), 2);
    }

    #[tokio::test]
    async fn completing_closes_the_event_log() {
        let updater = setup("t1", "ctx1").await;
        updater.complete(None).await.unwrap();
        assert!(updater.event_subscriber.is_closed("t1").await.unwrap());
    }
}
