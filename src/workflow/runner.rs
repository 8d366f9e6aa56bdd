//! Workflow Runner
//!
//! 按声明顺序执行步骤：每步把运行上下文、步骤任务和此前所有步骤结果合并成参数，调用目标 agent，
//! 结果按 agent id 存入 WorkflowResult、按步骤 id 合并回运行上下文；每步之后评估提前终止条件
//! （默认：累计错误数超过 max_errors）。Execution Manager 返回 Err 时会话标记为 failed 并立即结束。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use super::loader::load_workflow_dir;
use super::types::{
    OrchestrationSession, SessionStatus, WorkflowDefinition, WorkflowResult, WorkflowSummary,
};
use crate::agents::ExecutionResult;
use crate::config::WorkflowSection;
use crate::core::{AgentError, AgentResult, Clock};
use crate::execution::{ExecutionManager, ExecutionRequest};

/// 每步之后调用；返回 true 表示提前终止
pub type TerminationPredicate = Arc<dyn Fn(&WorkflowResult) -> bool + Send + Sync>;

pub struct WorkflowRunner {
    manager: Arc<ExecutionManager>,
    clock: Arc<dyn Clock>,
    settings: WorkflowSection,
    termination: TerminationPredicate,
    workflows: RwLock<BTreeMap<String, WorkflowDefinition>>,
    sessions: RwLock<HashMap<String, OrchestrationSession>>,
}

impl WorkflowRunner {
    pub fn new(manager: Arc<ExecutionManager>) -> Self {
        Self::with_settings(manager, WorkflowSection::default())
    }

    pub fn with_settings(manager: Arc<ExecutionManager>, settings: WorkflowSection) -> Self {
        let max_errors = settings.max_errors;
        Self {
            clock: manager.registry().clock(),
            manager,
            settings,
            termination: Arc::new(move |progress: &WorkflowResult| progress.errors.len() > max_errors),
            workflows: RwLock::new(BTreeMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// 替换默认的提前终止条件
    pub fn with_termination(mut self, predicate: impl Fn(&WorkflowResult) -> bool + Send + Sync + 'static) -> Self {
        self.termination = Arc::new(predicate);
        self
    }

    /// 校验结构与目标 agent 均已注册；同 id 覆盖
    pub async fn register_workflow(&self, workflow: WorkflowDefinition) -> AgentResult<()> {
        workflow.validate()?;
        let registry = self.manager.registry();
        for agent_id in workflow.agent_ids() {
            if !registry.contains(agent_id).await {
                return Err(AgentError::InvalidWorkflow(format!(
                    "{}: agent {} is not registered",
                    workflow.id, agent_id
                )));
            }
        }
        tracing::info!(workflow = %workflow.id, steps = workflow.steps.len(), "workflow registered");
        self.workflows.write().await.insert(workflow.id.clone(), workflow);
        Ok(())
    }

    /// 加载配置目录中的工作流；返回注册数量
    pub async fn load_workflows(&self) -> AgentResult<usize> {
        let Some(dir) = self.settings.definitions_dir.clone() else {
            return Ok(0);
        };
        let workflows = load_workflow_dir(dir)?;
        let count = workflows.len();
        for workflow in workflows {
            self.register_workflow(workflow).await?;
        }
        Ok(count)
    }

    pub async fn get_workflow(&self, id: &str) -> Option<WorkflowDefinition> {
        self.workflows.read().await.get(id).cloned()
    }

    /// 按 id 排序
    pub async fn list_workflows(&self) -> Vec<WorkflowDefinition> {
        self.workflows.read().await.values().cloned().collect()
    }

    /// 创建会话；未给 id 时生成 uuid。已存在同 id 会话时原样返回其 id
    pub async fn create_session(&self, session_id: Option<String>) -> String {
        let id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let now = self.clock.now_millis();
        self.sessions
            .write()
            .await
            .entry(id.clone())
            .or_insert_with(|| OrchestrationSession::new(id.clone(), now));
        id
    }

    pub async fn add_agent_to_session(&self, session_id: &str, agent_id: &str) -> AgentResult<()> {
        if !self.manager.registry().contains(agent_id).await {
            return Err(AgentError::AgentNotFound(agent_id.to_string()));
        }
        let now = self.clock.now_millis();
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| AgentError::SessionNotFound(session_id.to_string()))?;
        session.attach(agent_id);
        session.updated_at = now;
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> Option<OrchestrationSession> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// 按创建时间排序
    pub async fn list_sessions(&self) -> Vec<OrchestrationSession> {
        let mut sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    /// 删除已结束且创建时间早于 now - max_age 的会话；返回删除数量
    pub async fn cleanup_sessions(&self, max_age: Duration) -> usize {
        let cutoff = self.clock.now_millis() - max_age.as_millis() as i64;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !(s.status.is_terminal() && s.created_at < cutoff));
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(removed, "orchestration sessions cleaned up");
        }
        removed
    }

    /// 使用配置中的 session_max_age_secs
    pub async fn cleanup_expired_sessions(&self) -> usize {
        self.cleanup_sessions(Duration::from_secs(self.settings.session_max_age_secs))
            .await
    }

    /// 工作流不存在时返回 Err；执行中的失败都体现在返回结果的 status / errors 中
    pub async fn execute_workflow(
        &self,
        session_id: &str,
        workflow_id: &str,
        initial_context: Map<String, Value>,
    ) -> AgentResult<WorkflowResult> {
        let workflow = self
            .get_workflow(workflow_id)
            .await
            .ok_or_else(|| AgentError::WorkflowNotFound(workflow_id.to_string()))?;

        self.create_session(Some(session_id.to_string())).await;
        self.update_session(session_id, |s| {
            s.workflow_id = Some(workflow.id.clone());
            s.status = SessionStatus::Running;
        })
        .await;

        tracing::info!(workflow = %workflow.id, session = %session_id, "workflow started");

        let mut progress = WorkflowResult {
            session_id: session_id.to_string(),
            workflow_id: workflow.id.clone(),
            results: BTreeMap::new(),
            summary: WorkflowSummary {
                total_steps: workflow.steps.len(),
                ..WorkflowSummary::default()
            },
            status: SessionStatus::Running,
            errors: Vec::new(),
        };
        let mut running = initial_context;
        let mut previous: Map<String, Value> = Map::new();

        for step in &workflow.steps {
            let mut parameters = running.clone();
            parameters.extend(step.parameters.clone());
            parameters.insert("stepId".to_string(), json!(step.id));
            parameters.insert("task".to_string(), json!(step.task));
            parameters.insert("previousResults".to_string(), Value::Object(previous.clone()));

            let mut request = ExecutionRequest::new(&step.agent_id, &step.task)
                .with_session(session_id)
                .with_parameters(parameters);
            request.timeout_ms = step.timeout_ms;

            let result = match self.manager.execute_agent(request).await {
                Ok(result) => result,
                Err(err) => {
                    let message = format!("step {} ({}): {}", step.id, step.agent_id, err);
                    tracing::warn!(workflow = %workflow.id, error = %message, "workflow aborted");
                    progress.errors.push(message);
                    progress.status = SessionStatus::Failed;
                    break;
                }
            };

            record_step(&mut progress.summary, &result);
            if !result.success {
                progress.errors.push(format!(
                    "step {} ({}): {}",
                    step.id,
                    step.agent_id,
                    result.error.as_deref().unwrap_or("failed")
                ));
            }

            let output = result.data.clone().unwrap_or(Value::Null);
            running.insert(step.id.clone(), output.clone());
            previous.insert(step.id.clone(), output);
            progress.results.insert(step.agent_id.clone(), result.clone());

            let agent_id = step.agent_id.clone();
            let step_id = step.id.clone();
            self.update_session(session_id, move |s| {
                s.attach(&agent_id);
                s.results.insert(step_id, result);
            })
            .await;

            if (self.termination)(&progress) {
                progress
                    .errors
                    .push(format!("workflow terminated early after step {}", step.id));
                progress.status = SessionStatus::Failed;
                tracing::warn!(workflow = %workflow.id, step = %step.id, "workflow terminated early");
                break;
            }
        }

        if progress.status == SessionStatus::Running {
            progress.status = SessionStatus::Completed;
        }

        let status = progress.status;
        let errors = progress.errors.clone();
        self.update_session(session_id, move |s| {
            s.status = status;
            s.errors = errors;
        })
        .await;

        tracing::info!(
            workflow = %workflow.id,
            session = %session_id,
            status = ?progress.status,
            executed = progress.summary.executed_steps,
            "workflow finished"
        );
        Ok(progress)
    }

    async fn update_session(&self, session_id: &str, f: impl FnOnce(&mut OrchestrationSession)) {
        let now = self.clock.now_millis();
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            f(session);
            session.updated_at = now;
        }
    }
}

fn record_step(summary: &mut WorkflowSummary, result: &ExecutionResult) {
    summary.executed_steps += 1;
    if result.success {
        summary.successful_steps += 1;
    } else {
        summary.failed_steps += 1;
    }
    summary.total_cost += result.cost;
    summary.total_execution_time += result.execution_time;
    summary.final_output = result.data.clone();
}
