//! 工作流构建器
//!
//! 提供流畅的API来构建工作流

use serde_json::Value;

use crate::core::AgentResult;
use crate::workflow::types::*;

/// 工作流构建器
pub struct WorkflowBuilder {
    id: WorkflowId,
    name: String,
    description: Option<String>,
    steps: Vec<WorkflowStep>,
}

impl WorkflowBuilder {
    /// 创建新的工作流构建器，id 自动生成
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(format!("wf_{}", uuid::Uuid::new_v4()), name)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            steps: Vec::new(),
        }
    }

    /// 设置描述
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// 追加步骤（执行顺序即追加顺序）
    pub fn step(mut self, id: impl Into<StepId>, agent_id: impl Into<String>, task: impl Into<String>) -> Self {
        self.steps.push(WorkflowStep::new(id, agent_id, task));
        self
    }

    /// 声明依赖（仅记录）
    pub fn depends_on(mut self, step_id: impl Into<StepId>, deps: Vec<StepId>) -> Self {
        let id = step_id.into();
        if let Some(step) = self.steps.iter_mut().find(|s| s.id == id) {
            step.dependencies = deps;
        }
        self
    }

    /// 设置顺序依赖：to 依赖 from
    pub fn sequential(self, from: impl Into<StepId>, to: impl Into<StepId>) -> Self {
        self.depends_on(to, vec![from.into()])
    }

    pub fn timeout(mut self, step_id: impl Into<StepId>, timeout_ms: u64) -> Self {
        let id = step_id.into();
        if let Some(step) = self.steps.iter_mut().find(|s| s.id == id) {
            step.timeout_ms = Some(timeout_ms);
        }
        self
    }

    pub fn parameter(mut self, step_id: impl Into<StepId>, key: impl Into<String>, value: Value) -> Self {
        let id = step_id.into();
        if let Some(step) = self.steps.iter_mut().find(|s| s.id == id) {
            step.parameters.insert(key.into(), value);
        }
        self
    }

    /// 构建并校验
    pub fn build(self) -> AgentResult<WorkflowDefinition> {
        let workflow = WorkflowDefinition {
            id: self.id,
            name: self.name,
            description: self.description,
            steps: self.steps,
        };
        workflow.validate()?;
        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_simple_workflow() {
        let workflow = WorkflowBuilder::new("Test Workflow")
            .description("A test workflow")
            .step("draft", "writer", "Write a draft")
            .step("review", "editor", "Review the draft")
            .sequential("draft", "review")
            .timeout("review", 5_000)
            .parameter("draft", "words", json!(200))
            .build()
            .expect("Failed to build workflow");

        assert!(workflow.id.starts_with("wf_"));
        assert_eq!(workflow.name, "Test Workflow");
        assert_eq!(workflow.steps.len(), 2);
        assert_eq!(workflow.steps[1].dependencies, vec!["draft".to_string()]);
        assert_eq!(workflow.steps[1].timeout_ms, Some(5_000));
        assert_eq!(workflow.steps[0].parameters["words"], json!(200));
    }

    #[test]
    fn test_build_without_steps_fails() {
        let result = WorkflowBuilder::new("Test").build();
        assert!(result.is_err());
    }
}
