//! Echo handler（测试与演示用）

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::context::{ExecutionContext, ExecutionResult};
use super::handler::{AgentHandler, HandlerCapabilities};
use super::types::Capability;

/// 回显任务文本；拒绝空任务
#[derive(Debug, Clone, Default)]
pub struct EchoHandler {
    cost: f64,
    capabilities: Vec<Capability>,
}

impl EchoHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次调用上报的成本
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }
}

#[async_trait]
impl AgentHandler for EchoHandler {
    async fn execute(&self, context: &ExecutionContext) -> anyhow::Result<ExecutionResult> {
        let model = context
            .llm()
            .and_then(|llm| llm.get("modelKey"))
            .cloned()
            .unwrap_or(Value::Null);
        Ok(ExecutionResult::success(json!({
            "echo": context.task,
            "model": model,
        }))
        .with_cost(self.cost))
    }

    fn validate_task(&self, task: &str, _parameters: &Map<String, Value>) -> bool {
        !task.trim().is_empty()
    }

    fn capabilities(&self) -> HandlerCapabilities {
        HandlerCapabilities {
            capabilities: self.capabilities.clone(),
            supported_tasks: vec!["echo".to_string()],
        }
    }
}
