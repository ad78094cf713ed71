//! Sub-agent tasks end to end: the task manager driving a model-backed
//! runner against the mock provider.

use std::sync::Arc;

use async_trait::async_trait;
use integration_tests::{MockProvider, MockResponse, chat_completion};
use llm::{CallOptions, Message, ProviderSet};
use tools::{ResumeOutcome, SubagentRunner, TaskInfo, TaskManager, TaskStatus};

/// Minimal production-shaped runner: one prompt, one model call, the
/// reply text is the task result.
struct ModelSubagentRunner {
    providers: Arc<ProviderSet>,
    models: config::TierModels,
}

#[async_trait]
impl SubagentRunner for ModelSubagentRunner {
    async fn run(&self, task: &TaskInfo) -> tools::Result<String> {
        let reference = self
            .models
            .get(task.tier)
            .ok_or_else(|| tools::Error::Execution("no model for tier".to_string()))?;

        let model = self
            .providers
            .language_model(reference)
            .map_err(|e| tools::Error::Execution(e.to_string()))?;

        let messages = vec![
            Message::system(format!("You are a {} sub-agent.", task.subagent_type)),
            Message::user(task.prompt.clone()),
        ];

        let response = model
            .generate(&messages, &CallOptions::default())
            .await
            .map_err(|e| tools::Error::Execution(e.to_string()))?;

        Ok(response.text())
    }
}

fn manager_for(mock: &MockProvider) -> TaskManager {
    let config = mock.config();
    TaskManager::new(Arc::new(ModelSubagentRunner {
        providers: Arc::new(mock.provider_set()),
        models: config.orchestrator.models,
    }))
}

#[tokio::test]
async fn background_task_is_queryable_before_and_after_completion() {
    let mock = MockProvider::spawn(vec![MockResponse::Json(chat_completion(
        "Analysis complete: the flaky test races on the shared port.",
    ))])
    .await;

    let manager = manager_for(&mock);

    let id = manager
        .start(
            "analyze flaky test",
            "debugger",
            config::ModelTier::Large,
            "Why does test_port_reuse flake?",
            true,
        )
        .await;

    // Non-blocking query observes a non-terminal state or the final one,
    // never an error.
    let early = manager.query(&id, false, 0).await.unwrap();
    assert!(matches!(
        early.status,
        TaskStatus::Pending | TaskStatus::Running | TaskStatus::Completed
    ));

    let done = manager.query(&id, true, 5_000).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert!(done.result.as_deref().unwrap().contains("shared port"));
    assert!(done.completed_at.unwrap() >= done.started_at);

    assert_eq!(
        manager.resume(&id).await.unwrap(),
        ResumeOutcome::Completed(done.result.unwrap())
    );
}

#[tokio::test]
async fn provider_failure_marks_the_task_failed() {
    let mock = MockProvider::spawn(vec![MockResponse::Error(
        503,
        serde_json::json!({"error": {"message": "overloaded"}}),
    )])
    .await;

    let manager = manager_for(&mock);

    let id = manager
        .start("doomed", "worker", config::ModelTier::Small, "work", false)
        .await;

    let task = manager.query(&id, false, 0).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.as_deref().unwrap().contains("overloaded"));
}

#[tokio::test]
async fn sub_agent_prompt_reaches_the_provider() {
    let mock = MockProvider::spawn(vec![MockResponse::Json(chat_completion("ok"))]).await;
    let manager = manager_for(&mock);

    manager
        .start(
            "summarize diff",
            "reviewer",
            config::ModelTier::Small,
            "Summarize the staged changes.",
            false,
        )
        .await;

    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0]["messages"][0]["content"],
        "You are a reviewer sub-agent."
    );
    assert_eq!(
        requests[0]["messages"][1]["content"],
        "Summarize the staged changes."
    );
}
