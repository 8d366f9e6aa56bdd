//! Hive 演示入口
//!
//! 加载配置、初始化日志，注册两个 echo agent，分配模型，执行一个两步工作流并输出统计。

use std::sync::Arc;

use anyhow::Context;
use hive::agents::{AgentDefinition, AgentRegistry, AgentType, Capability, EchoHandler, MemoryType};
use hive::config::load_config;
use hive::execution::ExecutionManager;
use hive::llm::{AgentLlmConfig, LlmAssignmentPolicy, ModelDescriptor, StaticModelProvider};
use hive::storage::{FileStore, KeyValueStore, MemoryStore};
use hive::workflow::{WorkflowBuilder, WorkflowRunner};
use serde_json::{json, Map};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let config = load_config(None).context("Failed to load config")?;

    let store: Arc<dyn KeyValueStore> = match &config.llm.storage_path {
        Some(path) => Arc::new(FileStore::new(path)),
        None => Arc::new(MemoryStore::new()),
    };
    let policy = Arc::new(
        LlmAssignmentPolicy::new(store)
            .with_storage_key(config.llm.storage_key.clone())
            .with_defaults(config.llm.seed_assignments()),
    );
    let models = Arc::new(StaticModelProvider::new(vec![
        ModelDescriptor::new("m1", "openai").with_max_tokens(4096),
        ModelDescriptor::new("m2", "deepseek").with_max_tokens(8192),
    ]));

    let registry = Arc::new(AgentRegistry::new());
    registry
        .register_agent(
            AgentDefinition::new("echo", "Echo", AgentType::Utility)
                .with_description("Echoes the task back")
                .with_specialization("echo")
                .with_capability(Capability::new("echo").with_cost(0.01))
                .with_memory(MemoryType::Session, Some(60_000), Some(10)),
            Arc::new(EchoHandler::new().with_cost(0.01)),
            vec![],
        )
        .await?;
    registry
        .register_agent(
            AgentDefinition::new("summarizer", "Summarizer", AgentType::Analytical)
                .with_specialization("echo")
                .with_dependency("echo"),
            Arc::new(EchoHandler::new().with_cost(0.02)),
            vec![],
        )
        .await?;

    policy.update_llm_assignment("echo", AgentLlmConfig::new("m1", 10)).await?;
    policy
        .set_agent_llm_config(
            "summarizer",
            vec![AgentLlmConfig::new("m2", 10).with_temperature(0.2)],
            Some("m1".to_string()),
        )
        .await?;

    let manager = Arc::new(
        ExecutionManager::new(registry.clone(), policy.clone(), models).with_settings(config.executor.clone()),
    );
    let runner = WorkflowRunner::with_settings(manager.clone(), config.workflow.clone());
    let loaded = runner.load_workflows().await?;
    if loaded > 0 {
        tracing::info!(loaded, "workflow definitions loaded");
    }

    runner
        .register_workflow(
            WorkflowBuilder::with_id("demo", "Echo then summarize")
                .step("echo", "echo", "ping")
                .step("summarize", "summarizer", "summarize the echo")
                .sequential("echo", "summarize")
                .build()?,
        )
        .await?;

    let mut initial = Map::new();
    initial.insert("user".to_string(), json!("demo"));
    let session_id = runner.create_session(None).await;
    let result = runner.execute_workflow(&session_id, "demo", initial).await?;

    tracing::info!(
        status = ?result.status,
        steps = result.summary.executed_steps,
        cost = result.summary.total_cost,
        "workflow result"
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    println!(
        "{}",
        serde_json::to_string_pretty(&registry.get_registry_statistics().await)?
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&manager.get_agent_performance_stats("echo").await)?
    );

    registry.shutdown().await;
    Ok(())
}
