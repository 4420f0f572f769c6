//! Request handler — the transport-facing seam between the axum JSON-RPC
//! dispatch and the [`TaskManager`] orchestrator.
//!
//! The teacher's `DefaultRequestHandler` owned the running-agent registry
//! and the event→store projection logic directly. That responsibility now
//! lives in [`TaskManager`] (C6); `DefaultRequestHandler` is a thin
//! delegate so the [`RequestHandler`] trait remains the stable interface
//! `axum_integration.rs` dispatches against.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;

use crate::error::{A2AError, A2AResult};
use crate::types::{SendMessageResponse, StreamResponse, Task};

use super::agent_executor::AgentExecutor;
use super::event_subscriber::EventSubscriber;
use super::task_manager::{record_to_stream_response, TaskManager};
use super::task_store::{TaskListParams, TaskListResponse, TaskStore};

/// Parameters for `message/send` and `message/stream`.
#[derive(Debug, Clone)]
pub struct SendMessageParams {
    pub message: crate::types::Message,
    pub configuration: Option<SendMessageConfiguration>,
    pub metadata: Option<serde_json::Value>,
    pub tenant: Option<String>,
}

/// Configuration options for message sending (handler-facing; converted to
/// `crate::types::SendMessageConfiguration` before reaching an [`AgentExecutor`]).
#[derive(Debug, Clone)]
pub struct SendMessageConfiguration {
    pub accepted_output_modes: Option<Vec<String>>,
    pub blocking: Option<bool>,
    pub history_length: Option<usize>,
    pub push_notification_config: Option<serde_json::Value>,
}

/// Parameters for `tasks/get`.
#[derive(Debug, Clone)]
pub struct GetTaskParams {
    pub id: String,
    pub history_length: Option<usize>,
    pub metadata: Option<serde_json::Value>,
    pub tenant: Option<String>,
}

/// Parameters for `tasks/cancel`.
#[derive(Debug, Clone)]
pub struct CancelTaskParams {
    pub id: String,
    pub metadata: Option<serde_json::Value>,
    pub tenant: Option<String>,
}

/// Parameters for `tasks/subscribe` / `tasks/resubscribe`.
#[derive(Debug, Clone)]
pub struct SubscribeToTaskParams {
    pub id: String,
    pub metadata: Option<serde_json::Value>,
    pub tenant: Option<String>,
}

/// Trait for handling A2A JSON-RPC requests. Each method corresponds to a
/// JSON-RPC method; the axum integration layer dispatches incoming requests
/// to these methods.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn on_message_send(&self, params: SendMessageParams) -> A2AResult<SendMessageResponse>;

    /// Handle `message/stream` — returns the full event sequence the agent
    /// produces for this message, from the start of the log.
    async fn on_message_send_stream(
        &self,
        params: SendMessageParams,
    ) -> A2AResult<Vec<StreamResponse>>;

    async fn on_get_task(&self, params: GetTaskParams) -> A2AResult<Task>;

    async fn on_list_tasks(&self, params: TaskListParams) -> A2AResult<TaskListResponse>;

    async fn on_cancel_task(&self, params: CancelTaskParams) -> A2AResult<Task>;

    /// Handle `tasks/resubscribe`. Works for any task regardless of whether
    /// an agent is still actively running for it.
    async fn on_resubscribe_to_task(
        &self,
        params: SubscribeToTaskParams,
    ) -> A2AResult<Vec<StreamResponse>> {
        let _ = params;
        Err(A2AError::unsupported_operation("tasks/resubscribe is not supported"))
    }

    async fn on_subscribe_to_task(
        &self,
        params: SubscribeToTaskParams,
    ) -> A2AResult<Vec<StreamResponse>>;

    async fn on_set_task_push_notification_config(
        &self,
        _task_id: &str,
        _config: crate::types::PushNotificationConfig,
    ) -> A2AResult<crate::types::PushNotificationConfig> {
        Err(push_notification_not_supported())
    }

    async fn on_get_task_push_notification_config(
        &self,
        _task_id: &str,
        _config_id: Option<&str>,
    ) -> A2AResult<Option<crate::types::PushNotificationConfig>> {
        Err(push_notification_not_supported())
    }

    async fn on_list_task_push_notification_config(
        &self,
        _task_id: &str,
    ) -> A2AResult<Vec<crate::types::PushNotificationConfig>> {
        Err(push_notification_not_supported())
    }

    async fn on_delete_task_push_notification_config(
        &self,
        _task_id: &str,
        _config_id: &str,
    ) -> A2AResult<()> {
        Err(push_notification_not_supported())
    }
}

fn push_notification_not_supported() -> A2AError {
    A2AError::push_notification_not_supported("push notification is not configured for this agent")
}

/// Default request handler — wires a [`TaskManager`] and an optional
/// [`super::push_notification_config_store::PushNotificationConfigStore`]
/// into the [`RequestHandler`] surface.
pub struct DefaultRequestHandler {
    manager: TaskManager,
    push_config_store: Option<Arc<dyn super::push_notification_config_store::PushNotificationConfigStore>>,
}

impl DefaultRequestHandler {
    pub fn new(executor: Arc<dyn AgentExecutor>, task_store: Arc<dyn TaskStore>) -> Self {
        let event_subscriber = Arc::new(EventSubscriber::new(Arc::new(
            super::event_store::InMemoryEventStore::new(),
        )));
        Self {
            manager: TaskManager::new(task_store, event_subscriber, executor),
            push_config_store: None,
        }
    }

    /// Build a file-backed handler rooted at `data_dir`, composing the
    /// documented `<dir>/tasks/`, `<dir>/events/`, `<dir>/pushConfigs/`
    /// subdirectory layout. Safe to call again after a restart against the
    /// same `data_dir` — each store reconstructs its state from disk.
    pub async fn with_file_backed_stores(
        executor: Arc<dyn AgentExecutor>,
        data_dir: impl AsRef<std::path::Path>,
    ) -> A2AResult<Self> {
        let data_dir = data_dir.as_ref();
        let task_store: Arc<dyn TaskStore> = Arc::new(
            super::file_task_store::FileTaskStore::new(data_dir.join("tasks")).await?,
        );
        let event_store = Arc::new(
            super::event_store::FileEventStore::new(data_dir.join("events")).await?,
        );
        let event_subscriber = Arc::new(EventSubscriber::new(event_store));
        let push_config_store: Arc<dyn super::push_notification_config_store::PushNotificationConfigStore> =
            Arc::new(
                super::push_notification_config_store::FilePushNotificationConfigStore::new(
                    data_dir.join("pushConfigs"),
                )
                .await?,
            );

        Ok(Self::with_stores(
            executor,
            task_store,
            event_subscriber,
            Some(push_config_store),
        ))
    }

    /// Build with explicit store/event/push-config backends — used by
    /// file-backed deployments.
    pub fn with_stores(
        executor: Arc<dyn AgentExecutor>,
        task_store: Arc<dyn TaskStore>,
        event_subscriber: Arc<EventSubscriber>,
        push_config_store: Option<Arc<dyn super::push_notification_config_store::PushNotificationConfigStore>>,
    ) -> Self {
        Self {
            manager: TaskManager::new(task_store, event_subscriber, executor),
            push_config_store,
        }
    }
}

#[async_trait]
impl RequestHandler for DefaultRequestHandler {
    async fn on_message_send(&self, params: SendMessageParams) -> A2AResult<SendMessageResponse> {
        self.manager.send_message(params).await
    }

    async fn on_message_send_stream(
        &self,
        params: SendMessageParams,
    ) -> A2AResult<Vec<StreamResponse>> {
        let mut tail = self.manager.send_message_stream(params).await?;
        let mut events = Vec::new();
        while let Some(record) = tail.next().await {
            if let Some(event) = record_to_stream_response(&record) {
                events.push(event);
            }
        }
        Ok(events)
    }

    async fn on_get_task(&self, params: GetTaskParams) -> A2AResult<Task> {
        self.manager.get_task(params).await
    }

    async fn on_list_tasks(&self, params: TaskListParams) -> A2AResult<TaskListResponse> {
        self.manager.list_tasks(params).await
    }

    async fn on_cancel_task(&self, params: CancelTaskParams) -> A2AResult<Task> {
        self.manager.cancel_task(params).await
    }

    async fn on_subscribe_to_task(
        &self,
        params: SubscribeToTaskParams,
    ) -> A2AResult<Vec<StreamResponse>> {
        self.on_resubscribe_to_task(params).await
    }

    async fn on_resubscribe_to_task(
        &self,
        params: SubscribeToTaskParams,
    ) -> A2AResult<Vec<StreamResponse>> {
        let mut tail = self.manager.resubscribe_task(&params.id).await?;
        let mut events = Vec::new();
        while let Some(record) = tail.next().await {
            if let Some(event) = record_to_stream_response(&record) {
                events.push(event);
            }
        }
        Ok(events)
    }

    async fn on_set_task_push_notification_config(
        &self,
        task_id: &str,
        config: crate::types::PushNotificationConfig,
    ) -> A2AResult<crate::types::PushNotificationConfig> {
        self.manager.ensure_task_exists(task_id).await?;
        let store = self
            .push_config_store
            .as_ref()
            .ok_or_else(push_notification_not_supported)?;
        store.set(task_id, config).await
    }

    async fn on_get_task_push_notification_config(
        &self,
        task_id: &str,
        config_id: Option<&str>,
    ) -> A2AResult<Option<crate::types::PushNotificationConfig>> {
        self.manager.ensure_task_exists(task_id).await?;
        let store = self
            .push_config_store
            .as_ref()
            .ok_or_else(push_notification_not_supported)?;
        store.get(task_id, config_id).await
    }

    async fn on_list_task_push_notification_config(
        &self,
        task_id: &str,
    ) -> A2AResult<Vec<crate::types::PushNotificationConfig>> {
        self.manager.ensure_task_exists(task_id).await?;
        let store = self
            .push_config_store
            .as_ref()
            .ok_or_else(push_notification_not_supported)?;
        store.get_all(task_id).await
    }

    async fn on_delete_task_push_notification_config(
        &self,
        task_id: &str,
        config_id: &str,
    ) -> A2AResult<()> {
        self.manager.ensure_task_exists(task_id).await?;
        let store = self
            .push_config_store
            .as_ref()
            .ok_or_else(push_notification_not_supported)?;
        store.delete(task_id, config_id).await
    }
}
