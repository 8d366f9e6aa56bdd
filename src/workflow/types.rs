//! 工作流类型定义
//!
//! 定义工作流、步骤、编排会话与执行结果

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agents::{AgentId, ExecutionResult};
use crate::core::{AgentError, AgentResult};

pub type WorkflowId = String;
pub type StepId = String;

/// 工作流步骤：绑定一个 agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: StepId,
    pub agent_id: AgentId,
    pub task: String,
    /// 仅作记录，执行严格按声明顺序，不做拓扑排序
    #[serde(default)]
    pub dependencies: Vec<StepId>,
    /// 透传给 agent 的超时（毫秒）
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// 步骤自带的额外参数
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, agent_id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent_id: agent_id.into(),
            task: task.into(),
            dependencies: Vec::new(),
            timeout_ms: None,
            parameters: Map::new(),
        }
    }
}

/// 工作流定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDefinition {
    /// 结构校验：id 非空、至少一个步骤、步骤 id 唯一且非空、agent 非空。
    /// 依赖指向未知步骤同样视为无效；依赖指向后声明的步骤是允许的（执行时拿不到结果）。
    pub fn validate(&self) -> AgentResult<()> {
        let invalid = |msg: String| Err(AgentError::InvalidWorkflow(format!("{}: {}", self.id, msg)));

        if self.id.trim().is_empty() {
            return Err(AgentError::InvalidWorkflow("workflow id is empty".to_string()));
        }
        if self.steps.is_empty() {
            return invalid("workflow has no steps".to_string());
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return invalid("step id is empty".to_string());
            }
            if step.agent_id.trim().is_empty() {
                return invalid(format!("step {} has no agent", step.id));
            }
            if !seen.insert(step.id.as_str()) {
                return invalid(format!("duplicate step id {}", step.id));
            }
        }

        for step in &self.steps {
            if let Some(dep) = step.dependencies.iter().find(|d| !seen.contains(d.as_str())) {
                return invalid(format!("step {} depends on unknown step {}", step.id, dep));
            }
        }
        Ok(())
    }

    pub fn agent_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for step in &self.steps {
            if !ids.contains(&step.agent_id.as_str()) {
                ids.push(step.agent_id.as_str());
            }
        }
        ids
    }
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Initialized,
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

/// 编排会话：挂载的 agent、按步骤收集的结果、状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationSession {
    pub id: String,
    pub workflow_id: Option<WorkflowId>,
    pub agents: Vec<AgentId>,
    pub results: BTreeMap<StepId, ExecutionResult>,
    pub status: SessionStatus,
    pub errors: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl OrchestrationSession {
    pub fn new(id: impl Into<String>, now: i64) -> Self {
        Self {
            id: id.into(),
            workflow_id: None,
            agents: Vec::new(),
            results: BTreeMap::new(),
            status: SessionStatus::Initialized,
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn attach(&mut self, agent_id: &str) {
        if !self.agents.iter().any(|a| a == agent_id) {
            self.agents.push(agent_id.to_string());
        }
    }
}

/// 汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub total_steps: usize,
    pub executed_steps: usize,
    pub successful_steps: usize,
    pub failed_steps: usize,
    pub total_cost: f64,
    pub total_execution_time: u64,
    /// 最后一个已执行步骤的输出
    pub final_output: Option<Value>,
}

/// 一次工作流执行的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub session_id: String,
    pub workflow_id: WorkflowId,
    /// 按 agent id 存放；同一 agent 出现在多个步骤时保留最后一次
    pub results: BTreeMap<AgentId, ExecutionResult>,
    pub summary: WorkflowSummary,
    pub status: SessionStatus,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow(steps: Vec<WorkflowStep>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf".into(),
            name: "wf".into(),
            description: None,
            steps,
        }
    }

    #[test]
    fn test_validate() {
        assert!(workflow(vec![]).validate().is_err());
        assert!(workflow(vec![WorkflowStep::new("a", "x", "t"), WorkflowStep::new("a", "y", "t")])
            .validate()
            .is_err());
        assert!(workflow(vec![WorkflowStep::new("a", "", "t")]).validate().is_err());

        let mut dangling = WorkflowStep::new("a", "x", "t");
        dangling.dependencies.push("zzz".into());
        assert!(workflow(vec![dangling]).validate().is_err());

        // 依赖后声明的步骤是合法的
        let mut forward = WorkflowStep::new("a", "x", "t");
        forward.dependencies.push("b".into());
        assert!(workflow(vec![forward, WorkflowStep::new("b", "y", "t")]).validate().is_ok());
    }

    #[test]
    fn test_agent_ids_dedup_in_order() {
        let wf = workflow(vec![
            WorkflowStep::new("1", "b", "t"),
            WorkflowStep::new("2", "a", "t"),
            WorkflowStep::new("3", "b", "t"),
        ]);
        assert_eq!(wf.agent_ids(), vec!["b", "a"]);
    }

    #[test]
    fn test_terminal_status() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(!SessionStatus::Running.is_terminal());
        assert!(!SessionStatus::Initialized.is_terminal());
    }
}
