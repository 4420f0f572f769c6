//! Task manager — the orchestrator (C6): accepts messages, drives the
//! user-supplied [`AgentExecutor`] to completion, and exposes task
//! lifecycle operations over the durable [`super::task_store::TaskStore`]
//! and [`super::event_store::EventStore`]/[`super::event_subscriber::EventSubscriber`]
//! pair.
//!
//! The teacher's original `task_manager.rs` was an event→store projector
//! bolted onto a push-based `EventQueue`; `request_handler.rs`'s
//! `DefaultRequestHandler` was the closer structural ancestor of this type.
//! This module now hosts the real orchestrator, with `request_handler.rs`
//! kept as the thin transport-facing seam that delegates here.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{A2AError, A2AResult};
use crate::types::{Message, SendMessageResponse, StreamResponse, Task, TaskState, TaskStatus};
use crate::utils::apply_history_length;

use super::agent_executor::{AgentExecutor, RequestContext};
use super::event_store::EventTail;
use super::event_subscriber::EventSubscriber;
use super::request_handler::{
    CancelTaskParams, GetTaskParams, SendMessageConfiguration, SendMessageParams,
};
use super::task_store::{TaskListParams, TaskListResponse, TaskStore};
use super::task_updater::TaskUpdater;

fn is_terminal(state: TaskState) -> bool {
    matches!(
        state,
        TaskState::Completed | TaskState::Failed | TaskState::Canceled | TaskState::Rejected
    )
}

/// Decodes a `StreamResponse` back from the raw JSON payload an
/// [`super::event_store::EventLogRecord`] carries, for replay/stream delivery.
pub(crate) fn record_to_stream_response(
    record: &super::event_store::EventLogRecord,
) -> Option<StreamResponse> {
    match record.kind.as_str() {
        "task" => serde_json::from_value(record.payload.clone())
            .ok()
            .map(StreamResponse::Task),
        "status-update" => serde_json::from_value(record.payload.clone())
            .ok()
            .map(StreamResponse::StatusUpdate),
        "artifact-update" => serde_json::from_value(record.payload.clone())
            .ok()
            .map(StreamResponse::ArtifactUpdate),
        "message" => serde_json::from_value(record.payload.clone())
            .ok()
            .map(StreamResponse::Message),
        other => {
            warn!(kind = %other, "Unrecognized event-log record kind, skipping");
            None
        }
    }
}

/// Orchestrates task lifecycle: accepting messages, spawning agent
/// execution, and exposing the task + event-log surface to callers.
pub struct TaskManager {
    task_store: Arc<dyn TaskStore>,
    event_subscriber: Arc<EventSubscriber>,
    executor: Arc<dyn AgentExecutor>,
    running: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TaskManager {
    pub fn new(
        task_store: Arc<dyn TaskStore>,
        event_subscriber: Arc<EventSubscriber>,
        executor: Arc<dyn AgentExecutor>,
    ) -> Self {
        Self {
            task_store,
            event_subscriber,
            executor,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// `message/send` — run the agent to completion and return the final task.
    pub async fn send_message(&self, params: SendMessageParams) -> A2AResult<SendMessageResponse> {
        let task = self.get_or_create_task(&params).await?;
        let updater = self
            .spawn_executor(&task, Some(&params.message), params.configuration.as_ref())
            .await?;

        let mut tail = self.event_subscriber.subscribe(&task.id, 0).await?;
        while (tail.next().await).is_some() {}

        self.running.lock().await.remove(&task.id);

        let mut final_task = self
            .task_store
            .get(&task.id)
            .await?
            .ok_or_else(|| A2AError::task_not_found(&task.id))?;

        let history_length = params
            .configuration
            .as_ref()
            .and_then(|c| c.history_length);
        final_task = apply_history_length(final_task, history_length);

        let _ = updater;
        Ok(SendMessageResponse::Task(final_task))
    }

    /// `message/stream` — run the agent and return a live tail of its events.
    pub async fn send_message_stream(&self, params: SendMessageParams) -> A2AResult<EventTail> {
        let task = self.get_or_create_task(&params).await?;
        self.spawn_executor(&task, Some(&params.message), params.configuration.as_ref())
            .await?;
        self.event_subscriber.subscribe(&task.id, 0).await
    }

    /// `tasks/get`.
    ///
    /// Negative `historyLength` is rejected at the wire-decoding boundary
    /// (see `axum_integration::parse_get_task_params`) before it ever
    /// reaches here as a `usize`.
    pub async fn get_task(&self, params: GetTaskParams) -> A2AResult<Task> {
        let task = self
            .task_store
            .get(&params.id)
            .await?
            .ok_or_else(|| A2AError::task_not_found(&params.id))?;

        Ok(apply_history_length(task, params.history_length))
    }

    /// `tasks/list`.
    pub async fn list_tasks(&self, params: TaskListParams) -> A2AResult<TaskListResponse> {
        self.task_store.list(&params).await
    }

    /// Confirms a task id refers to a task this manager's store knows
    /// about. Used by push-notification-config handlers, which otherwise
    /// have no `TaskStore` handle of their own.
    pub async fn ensure_task_exists(&self, task_id: &str) -> A2AResult<()> {
        self.task_store
            .get(task_id)
            .await?
            .ok_or_else(|| A2AError::task_not_found(task_id))?;
        Ok(())
    }

    /// `tasks/cancel`.
    pub async fn cancel_task(&self, params: CancelTaskParams) -> A2AResult<Task> {
        let task = self
            .task_store
            .get(&params.id)
            .await?
            .ok_or_else(|| A2AError::task_not_found(&params.id))?;

        if is_terminal(task.status.state) {
            return Err(A2AError::task_not_cancelable(format!(
                "task cannot be canceled — current state: {:?}",
                task.status.state
            )));
        }

        let updater = Arc::new(TaskUpdater::new(
            Arc::clone(&self.event_subscriber),
            Arc::clone(&self.task_store),
            task.id.clone(),
            task.context_id.clone(),
            task.status.state,
        ));

        let context = RequestContext {
            task_id: task.id.clone(),
            context_id: task.context_id.clone(),
            message: None,
            task: Some(task.clone()),
            configuration: None,
            related_tasks: Vec::new(),
            metadata: params.metadata,
            call_context: None,
        };

        if let Err(e) = self.executor.cancel(context, Arc::clone(&updater)).await {
            warn!(task_id = %task.id, error = %e, "agent cancel() returned an error; proceeding with cancellation");
        }

        if let Some(handle) = self.running.lock().await.remove(&params.id) {
            handle.abort();
        }

        let final_task = self
            .task_store
            .get(&params.id)
            .await?
            .ok_or_else(|| A2AError::task_not_found(&params.id))?;

        if final_task.status.state != TaskState::Canceled {
            return Err(A2AError::task_not_cancelable(format!(
                "task cannot be canceled — current state: {:?}",
                final_task.status.state
            )));
        }

        Ok(final_task)
    }

    /// `tasks/subscribe` / `tasks/resubscribe` — tail a task's event log
    /// from the beginning. Unlike the teacher's handler, this never requires
    /// a live in-process agent: a terminal or already-closed task simply
    /// replays its full history and the stream ends immediately.
    pub async fn resubscribe_task(&self, task_id: &str) -> A2AResult<EventTail> {
        self.task_store
            .get(task_id)
            .await?
            .ok_or_else(|| A2AError::task_not_found(task_id))?;
        self.event_subscriber.subscribe(task_id, 0).await
    }

    /// Decode the full historical log for a task as `StreamResponse`s, in order.
    pub async fn replay_events(&self, task_id: &str) -> A2AResult<Vec<StreamResponse>> {
        let records = self.event_subscriber.replay_all(task_id).await?;
        Ok(records.iter().filter_map(record_to_stream_response).collect())
    }

    async fn get_or_create_task(&self, params: &SendMessageParams) -> A2AResult<Task> {
        if let Some(ref task_id) = params.message.task_id {
            let task = self
                .task_store
                .get(task_id)
                .await?
                .ok_or_else(|| A2AError::task_not_found(task_id))?;

            if is_terminal(task.status.state) {
                return Err(A2AError::unsupported_operation(format!(
                    "task {} is in terminal state {:?} and cannot accept new messages",
                    task_id, task.status.state
                )));
            }

            self.task_store
                .append_history(task_id, params.message.clone())
                .await
        } else {
            let task_id = Uuid::new_v4().to_string();
            let context_id = params
                .message
                .context_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());

            let task = Task {
                id: task_id.clone(),
                context_id,
                kind: "task".to_string(),
                status: TaskStatus::new(TaskState::Submitted),
                artifacts: None,
                history: Some(vec![params.message.clone()]),
                metadata: params.metadata.clone(),
            };

            self.task_store.save(task.clone()).await?;
            self.event_subscriber
                .publish(&task_id, "task", serde_json::to_value(&task)?)
                .await?;

            info!(task_id = %task_id, "Created new task");
            Ok(task)
        }
    }

    async fn spawn_executor(
        &self,
        task: &Task,
        message: Option<&Message>,
        configuration: Option<&SendMessageConfiguration>,
    ) -> A2AResult<Arc<TaskUpdater>> {
        let types_config = configuration.map(|c| crate::types::SendMessageConfiguration {
            accepted_output_modes: c.accepted_output_modes.clone(),
            push_notification_config: c
                .push_notification_config
                .as_ref()
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            history_length: c.history_length.map(|h| h as i32),
            blocking: c.blocking,
        });

        let updater = Arc::new(TaskUpdater::new(
            Arc::clone(&self.event_subscriber),
            Arc::clone(&self.task_store),
            task.id.clone(),
            task.context_id.clone(),
            task.status.state,
        ));

        let context = RequestContext {
            task_id: task.id.clone(),
            context_id: task.context_id.clone(),
            message: message.cloned(),
            task: Some(task.clone()),
            configuration: types_config,
            related_tasks: Vec::new(),
            metadata: task.metadata.clone(),
            call_context: None,
        };

        let executor = Arc::clone(&self.executor);
        let updater_for_task = Arc::clone(&updater);
        let task_id = task.id.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = executor.execute(context, Arc::clone(&updater_for_task)).await {
                error!(task_id = %task_id, error = %e, "Agent execution failed");
                if !updater_for_task.is_terminal().await {
                    let _ = updater_for_task
                        .fail_with_text(&format!("Agent execution failed: {e}"))
                        .await;
                }
            }
        });

        self.running.lock().await.insert(task.id.clone(), handle);
        debug!(task_id = %task.id, "Agent execution spawned");

        Ok(updater)
    }
}
