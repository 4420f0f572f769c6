//! A2A server framework — traits and implementations for building A2A agents.
//!
//! Mirrors the Python SDK's server module architecture:
//!
//! - [`AgentExecutor`] trait — implement your agent logic
//! - [`RequestContext`] — execution context with task IDs, message, metadata
//! - [`ServerCallContext`] — per-request context with extensions and state
//! - [`RequestContextBuilder`] trait + [`SimpleRequestContextBuilder`] — build contexts
//! - [`TaskStore`] trait + [`InMemoryTaskStore`] / [`file_task_store::FileTaskStore`] — task persistence
//! - [`TaskUpdater`] — the single writer of task state: enforces the state
//!   machine, persists to the [`TaskStore`], and publishes to the [`EventSubscriber`]
//! - [`EventStore`] trait + in-memory/file-backed impls — durable, ordered,
//!   replayable per-task event log
//! - [`EventSubscriber`] — publish/subscribe façade over an [`EventStore`]
//! - [`PushNotificationConfigStore`] trait + in-memory/file-backed impls — webhook config storage
//! - [`RequestHandler`] trait + [`DefaultRequestHandler`] — JSON-RPC dispatch
//! - [`TaskManager`] — orchestrates message handling, agent execution, and task lifecycle
//! - [`a2a_router`] — ready-made axum routes for A2A servers
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use a2a_rs::server::*;
//! use a2a_rs::types::AgentCard;
//!
//! // 1. Implement your agent logic.
//! struct MyAgent;
//!
//! #[async_trait::async_trait]
//! impl AgentExecutor for MyAgent {
//!     async fn execute(&self, ctx: RequestContext, updater: Arc<TaskUpdater>) -> a2a_rs::A2AResult<()> {
//!         updater.start_work(Some("Processing...")).await?;
//!         // ... do work ...
//!         updater.complete_with_text("Done!").await?;
//!         Ok(())
//!     }
//!
//!     async fn cancel(&self, ctx: RequestContext, updater: Arc<TaskUpdater>) -> a2a_rs::A2AResult<()> {
//!         updater.cancel(None).await?;
//!         Ok(())
//!     }
//! }
//!
//! // 2. Wire up the server.
//! let executor: Arc<dyn AgentExecutor> = Arc::new(MyAgent);
//! let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
//! let handler: Arc<dyn RequestHandler> = Arc::new(
//!     DefaultRequestHandler::new(executor, store)
//! );
//!
//! // 3. Create the router and serve.
//! let app = a2a_router(handler, agent_card);
//! ```

pub mod agent_executor;
pub mod axum_integration;
pub mod event_store;
pub mod event_subscriber;
pub mod file_task_store;
pub mod push_notification_config_store;
pub mod request_handler;
pub mod task_manager;
pub mod task_store;
pub mod task_updater;

// Re-export key types at the server module level for convenience.
pub use crate::types::SendMessageResponse;
pub use agent_executor::{
    AgentExecutor, RequestContext, RequestContextBuilder, ServerCallContext,
    SimpleRequestContextBuilder,
};
pub use axum_integration::a2a_router;
pub use event_store::{EventLogRecord, EventStore, EventTail, FileEventStore, InMemoryEventStore};
pub use event_subscriber::EventSubscriber;
pub use file_task_store::FileTaskStore;
pub use push_notification_config_store::{
    FilePushNotificationConfigStore, InMemoryPushNotificationConfigStore,
    PushNotificationConfigStore,
};
pub use request_handler::{
    CancelTaskParams, DefaultRequestHandler, GetTaskParams, RequestHandler,
    SendMessageConfiguration, SendMessageParams, SubscribeToTaskParams,
};
pub use task_manager::TaskManager;
pub use task_store::{InMemoryTaskStore, TaskListParams, TaskListResponse, TaskStore};
pub use task_updater::TaskUpdater;
