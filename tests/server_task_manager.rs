//! External integration tests for TaskManager — covers orchestration
//! behavior (agent spawn/cancel/stream/replay) through the public
//! `RequestHandler` param structs, the way the axum layer drives it.

use std::sync::Arc;

use a2a_rs::error::A2AError;
use a2a_rs::server::{
    AgentExecutor, CancelTaskParams, EventSubscriber, GetTaskParams, InMemoryEventStore,
    InMemoryTaskStore, RequestContext, SendMessageConfiguration, SendMessageParams, TaskManager,
    TaskStore, TaskUpdater,
};
use a2a_rs::types::*;
use async_trait::async_trait;
use futures::StreamExt;
use uuid::Uuid;

fn user_message(text: &str) -> Message {
    Message {
        message_id: Uuid::new_v4().to_string(),
        role: Role::User,
        kind: "message".to_string(),
        parts: vec![Part::text(text)],
        context_id: None,
        task_id: None,
        metadata: None,
        extensions: None,
        reference_task_ids: None,
    }
}

fn send_params(message: Message) -> SendMessageParams {
    SendMessageParams {
        message,
        configuration: None,
        metadata: None,
        tenant: None,
    }
}

/// Echoes the user's text back as an artifact, then completes.
struct EchoAgent;

#[async_trait]
impl AgentExecutor for EchoAgent {
    async fn execute(&self, ctx: RequestContext, updater: Arc<TaskUpdater>) -> a2a_rs::A2AResult<()> {
        updater.start_work(None).await?;
        let text = ctx.get_user_input(" ");
        updater
            .add_artifact(
                vec![Part::text(format!("echo: {text}"))],
                None,
                None,
                None,
                None,
                Some(true),
                None,
            )
            .await?;
        updater.complete(None).await?;
        Ok(())
    }

    async fn cancel(&self, _ctx: RequestContext, updater: Arc<TaskUpdater>) -> a2a_rs::A2AResult<()> {
        updater.cancel(None).await?;
        Ok(())
    }
}

/// Never finishes on its own — only responds to cancellation. Used to
/// exercise `cancel_task` against a task that's still running.
struct HangingAgent;

#[async_trait]
impl AgentExecutor for HangingAgent {
    async fn execute(&self, _ctx: RequestContext, updater: Arc<TaskUpdater>) -> a2a_rs::A2AResult<()> {
        updater.start_work(None).await?;
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok(())
    }

    async fn cancel(&self, _ctx: RequestContext, updater: Arc<TaskUpdater>) -> a2a_rs::A2AResult<()> {
        updater.cancel(None).await?;
        Ok(())
    }
}

/// Always fails with an internal error.
struct FailingAgent;

#[async_trait]
impl AgentExecutor for FailingAgent {
    async fn execute(&self, _ctx: RequestContext, _updater: Arc<TaskUpdater>) -> a2a_rs::A2AResult<()> {
        Err(A2AError::internal_error("boom"))
    }

    async fn cancel(&self, _ctx: RequestContext, updater: Arc<TaskUpdater>) -> a2a_rs::A2AResult<()> {
        updater.cancel(None).await?;
        Ok(())
    }
}

fn manager_with(executor: Arc<dyn AgentExecutor>) -> TaskManager {
    let task_store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    let event_subscriber = Arc::new(EventSubscriber::new(Arc::new(InMemoryEventStore::new())));
    TaskManager::new(task_store, event_subscriber, executor)
}

#[tokio::test]
async fn send_message_creates_and_completes_task() {
    let mgr = manager_with(Arc::new(EchoAgent));
    let resp = mgr.send_message(send_params(user_message("hi"))).await.unwrap();

    match resp {
        SendMessageResponse::Task(task) => {
            assert_eq!(task.status.state, TaskState::Completed);
            let artifacts = task.artifacts.unwrap();
            assert_eq!(artifacts.len(), 1);
            match &artifacts[0].parts[0] {
                Part::Text { text, .. } => assert_eq!(text, "echo: hi"),
                _ => panic!("expected text part"),
            }
        }
        _ => panic!("expected Task response"),
    }
}

#[tokio::test]
async fn send_message_agent_failure_yields_failed_task() {
    let mgr = manager_with(Arc::new(FailingAgent));
    let resp = mgr.send_message(send_params(user_message("hi"))).await.unwrap();
    match resp {
        SendMessageResponse::Task(task) => assert_eq!(task.status.state, TaskState::Failed),
        _ => panic!("expected Task response"),
    }
}

#[tokio::test]
async fn send_message_to_nonexistent_task_id_errors() {
    let mgr = manager_with(Arc::new(EchoAgent));
    let mut msg = user_message("hi");
    msg.task_id = Some("does-not-exist".to_string());

    let err = mgr.send_message(send_params(msg)).await;
    assert!(matches!(err, Err(A2AError::TaskNotFound { .. })));
}

#[tokio::test]
async fn send_message_to_terminal_task_is_rejected() {
    let mgr = manager_with(Arc::new(EchoAgent));
    let resp = mgr.send_message(send_params(user_message("hi"))).await.unwrap();
    let task_id = match resp {
        SendMessageResponse::Task(t) => t.id,
        _ => unreachable!(),
    };

    let mut follow_up = user_message("again");
    follow_up.task_id = Some(task_id);

    let err = mgr.send_message(send_params(follow_up)).await;
    assert!(matches!(err, Err(A2AError::UnsupportedOperation { .. })));
}

#[tokio::test]
async fn get_task_applies_history_length() {
    let mgr = manager_with(Arc::new(EchoAgent));
    let resp = mgr.send_message(send_params(user_message("hi"))).await.unwrap();
    let task_id = match resp {
        SendMessageResponse::Task(t) => t.id,
        _ => unreachable!(),
    };

    let task = mgr
        .get_task(GetTaskParams {
            id: task_id,
            history_length: Some(1),
            metadata: None,
            tenant: None,
        })
        .await
        .unwrap();
    assert_eq!(task.history.unwrap().len(), 1);
}

#[tokio::test]
async fn get_task_missing_returns_task_not_found() {
    let mgr = manager_with(Arc::new(EchoAgent));
    let err = mgr
        .get_task(GetTaskParams {
            id: "missing".to_string(),
            history_length: None,
            metadata: None,
            tenant: None,
        })
        .await;
    assert!(matches!(err, Err(A2AError::TaskNotFound { .. })));
}

#[tokio::test]
async fn list_tasks_reflects_created_tasks() {
    let mgr = manager_with(Arc::new(EchoAgent));
    mgr.send_message(send_params(user_message("hi"))).await.unwrap();
    mgr.send_message(send_params(user_message("there"))).await.unwrap();

    let listed = mgr.list_tasks(a2a_rs::server::TaskListParams::default()).await.unwrap();
    assert_eq!(listed.total_size, 2);
}

#[tokio::test]
async fn cancel_task_transitions_to_canceled() {
    let mgr = manager_with(Arc::new(HangingAgent));
    let resp = mgr.send_message_stream(send_params(user_message("hi"))).await;
    let mut tail = resp.unwrap();

    // Wait for the agent to reach `working` before canceling.
    let _ = tail.next().await;

    let task_id = {
        let listed = mgr.list_tasks(a2a_rs::server::TaskListParams::default()).await.unwrap();
        listed.tasks[0].id.clone()
    };

    let canceled = mgr
        .cancel_task(CancelTaskParams {
            id: task_id,
            metadata: None,
            tenant: None,
        })
        .await
        .unwrap();
    assert_eq!(canceled.status.state, TaskState::Canceled);
}

#[tokio::test]
async fn cancel_already_terminal_task_errors() {
    let mgr = manager_with(Arc::new(EchoAgent));
    let resp = mgr.send_message(send_params(user_message("hi"))).await.unwrap();
    let task_id = match resp {
        SendMessageResponse::Task(t) => t.id,
        _ => unreachable!(),
    };

    let err = mgr
        .cancel_task(CancelTaskParams {
            id: task_id,
            metadata: None,
            tenant: None,
        })
        .await;
    assert!(matches!(err, Err(A2AError::TaskNotCancelable { .. })));
}

#[tokio::test]
async fn cancel_missing_task_errors() {
    let mgr = manager_with(Arc::new(EchoAgent));
    let err = mgr
        .cancel_task(CancelTaskParams {
            id: "missing".to_string(),
            metadata: None,
            tenant: None,
        })
        .await;
    assert!(matches!(err, Err(A2AError::TaskNotFound { .. })));
}

#[tokio::test]
async fn send_message_stream_surfaces_every_event_in_order() {
    let mgr = manager_with(Arc::new(EchoAgent));
    let mut tail = mgr.send_message_stream(send_params(user_message("hi"))).await.unwrap();

    let mut records = Vec::new();
    while let Some(record) = tail.next().await {
        records.push(record);
    }

    let kinds: Vec<&str> = records.iter().map(|r| r.kind.as_str()).collect();
    assert_eq!(kinds, vec!["task", "status-update", "artifact-update", "status-update"]);
}

#[tokio::test]
async fn resubscribe_after_completion_replays_full_log_and_terminates() {
    let mgr = manager_with(Arc::new(EchoAgent));
    let resp = mgr.send_message(send_params(user_message("hi"))).await.unwrap();
    let task_id = match resp {
        SendMessageResponse::Task(t) => t.id,
        _ => unreachable!(),
    };

    let mut tail = mgr.resubscribe_task(&task_id).await.unwrap();
    let mut count = 0;
    while tail.next().await.is_some() {
        count += 1;
    }
    assert!(count > 0);
}

#[tokio::test]
async fn resubscribe_missing_task_errors() {
    let mgr = manager_with(Arc::new(EchoAgent));
    let err = mgr.resubscribe_task("missing").await;
    assert!(matches!(err, Err(A2AError::TaskNotFound { .. })));
}

#[tokio::test]
async fn replay_events_decodes_full_history() {
    let mgr = manager_with(Arc::new(EchoAgent));
    let resp = mgr.send_message(send_params(user_message("hi"))).await.unwrap();
    let task_id = match resp {
        SendMessageResponse::Task(t) => t.id,
        _ => unreachable!(),
    };

    let events = mgr.replay_events(&task_id).await.unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, StreamResponse::StatusUpdate(u) if u.status.state == TaskState::Completed)));
    assert!(events
        .iter()
        .any(|e| matches!(e, StreamResponse::ArtifactUpdate(_))));
}

#[tokio::test]
async fn send_message_with_zero_history_length_truncates_to_empty() {
    // historyLength=N returns at most N messages; N=0 means an empty history.
    let mgr = manager_with(Arc::new(EchoAgent));
    let params = SendMessageParams {
        message: user_message("hi"),
        configuration: Some(SendMessageConfiguration {
            accepted_output_modes: None,
            blocking: Some(true),
            history_length: Some(0),
            push_notification_config: None,
        }),
        metadata: None,
        tenant: None,
    };

    let resp = mgr.send_message(params).await.unwrap();
    match resp {
        SendMessageResponse::Task(task) => {
            assert_eq!(task.history.unwrap().len(), 0);
        }
        _ => panic!("expected Task response"),
    }
}
