//! Execution Manager
//!
//! 把注册表、分配策略和模型提供方组合起来：解析模型 → 构造上下文（注入 `_llm`）→
//! 带指数退避地重试执行 → 写入执行历史。
//!
//! 错误分工：agent 不存在、没有分配、没有可用模型在调用 handler 之前直接返回 Err；
//! 调度前置失败与 handler 失败在重试耗尽后统一变成 success = false 的结果。

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use super::history::{ExecutionHistory, ExecutionRecord, PerformanceStats};
use crate::agents::{AgentId, AgentRegistry, ExecutionContext, ExecutionResult, Priority, LLM_PARAM_KEY};
use crate::config::ExecutorSection;
use crate::core::{AgentError, AgentResult, Clock, Sleeper, TokioSleeper};
use crate::llm::{LlmAssignmentPolicy, ModelProvider};

/// 单次请求的选项
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// 跳过分配策略，直接使用该模型
    pub force_model: Option<String>,
    /// 总尝试次数；未设置时使用配置的默认值
    pub retry_count: Option<u32>,
}

/// 一次执行请求
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub agent_id: AgentId,
    pub task: String,
    pub parameters: Map<String, Value>,
    /// 未设置时生成 uuid
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub tools: Option<Vec<String>>,
    pub timeout_ms: Option<u64>,
    pub priority: Priority,
    pub context: Option<Map<String, Value>>,
    pub options: ExecutionOptions,
}

impl ExecutionRequest {
    pub fn new(agent_id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            task: task.into(),
            parameters: Map::new(),
            session_id: None,
            user_id: None,
            tools: None,
            timeout_ms: None,
            priority: Priority::default(),
            context: None,
            options: ExecutionOptions::default(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.options.retry_count = Some(retry_count);
        self
    }

    pub fn with_force_model(mut self, model_key: impl Into<String>) -> Self {
        self.options.force_model = Some(model_key.into());
        self
    }
}

pub struct ExecutionManager {
    registry: Arc<AgentRegistry>,
    policy: Arc<LlmAssignmentPolicy>,
    models: Arc<dyn ModelProvider>,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
    settings: ExecutorSection,
    history: RwLock<ExecutionHistory>,
}

impl ExecutionManager {
    pub fn new(
        registry: Arc<AgentRegistry>,
        policy: Arc<LlmAssignmentPolicy>,
        models: Arc<dyn ModelProvider>,
    ) -> Self {
        let settings = ExecutorSection::default();
        Self {
            clock: registry.clock(),
            registry,
            policy,
            models,
            sleeper: Arc::new(TokioSleeper),
            history: RwLock::new(ExecutionHistory::new(settings.history_limit)),
            settings,
        }
    }

    pub fn with_settings(mut self, settings: ExecutorSection) -> Self {
        self.history = RwLock::new(ExecutionHistory::new(settings.history_limit));
        self.settings = settings;
        self
    }

    /// 替换退避休眠（测试中用 RecordingSleeper）
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &Arc<LlmAssignmentPolicy> {
        &self.policy
    }

    pub async fn execute_agent(&self, request: ExecutionRequest) -> AgentResult<ExecutionResult> {
        let agent_id = request.agent_id.clone();
        if !self.registry.contains(&agent_id).await {
            return Err(AgentError::AgentNotFound(agent_id));
        }
        if self.policy.get_assignment(&agent_id).await?.is_none() {
            return Err(AgentError::NoLlmConfig(agent_id));
        }

        let model_key = self.resolve_model(&agent_id, request.options.force_model.as_deref()).await?;
        let model = self
            .models
            .model(&model_key)
            .await
            .ok_or_else(|| AgentError::ModelNotFound(model_key.clone()))?;
        let params = self.policy.get_llm_params_for_agent(&agent_id, &model_key).await?;

        let context = self.build_context(&request, json!({
            "modelKey": model_key,
            "model": model,
            "params": params,
        }));

        let attempts = request
            .options
            .retry_count
            .unwrap_or(self.settings.default_retry_count)
            .max(1);
        let started_at = self.clock.now_millis();
        let (result, used) = self.run_with_retry(&context, attempts).await;

        self.history.write().await.push(ExecutionRecord {
            agent_id: agent_id.clone(),
            session_id: context.session_id.clone(),
            task: context.task.clone(),
            model_key,
            success: result.success,
            execution_time: result.execution_time,
            cost: result.cost,
            error: result.error.clone(),
            attempts: used,
            timestamp: self.clock.now_millis(),
        });

        if !result.success {
            tracing::warn!(
                agent = %agent_id,
                attempts = used,
                elapsed_ms = self.clock.now_millis() - started_at,
                error = result.error.as_deref().unwrap_or(""),
                "execution failed"
            );
        }
        Ok(result)
    }

    async fn resolve_model(&self, agent_id: &str, forced: Option<&str>) -> AgentResult<String> {
        if let Some(forced) = forced {
            return Ok(forced.to_string());
        }
        let available: Vec<String> = self
            .models
            .enabled_models()
            .await
            .into_iter()
            .map(|m| m.key)
            .collect();
        self.policy
            .get_best_llm_for_agent(agent_id, &available)
            .await?
            .ok_or_else(|| AgentError::NoSuitableModel(agent_id.to_string()))
    }

    fn build_context(&self, request: &ExecutionRequest, llm: Value) -> ExecutionContext {
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut parameters = request.parameters.clone();
        parameters.insert(LLM_PARAM_KEY.to_string(), llm);

        ExecutionContext {
            agent_id: request.agent_id.clone(),
            task: request.task.clone(),
            parameters,
            session_id,
            user_id: request.user_id.clone(),
            tools: request.tools.clone(),
            timeout_ms: request.timeout_ms,
            priority: request.priority,
            context: request.context.clone(),
        }
    }

    /// 返回最终结果与实际尝试次数
    async fn run_with_retry(&self, context: &ExecutionContext, attempts: u32) -> (ExecutionResult, u32) {
        let started_at = self.clock.now_millis();
        let mut last_error = String::new();
        let mut used = attempts;

        for attempt in 1..=attempts {
            match self.registry.execute_agent(context).await {
                Ok(result) if result.success => return (result, attempt),
                Ok(result) => {
                    last_error = result.error.unwrap_or_else(|| "unknown error".to_string());
                }
                Err(err) if err.is_dispatch_precondition() => {
                    last_error = err.to_string();
                }
                // 其他错误重试也不会改变结果
                Err(err) => {
                    last_error = err.to_string();
                    used = attempt;
                    break;
                }
            }

            if attempt < attempts {
                let delay = self.settings.backoff_for(attempt);
                tracing::warn!(
                    agent = %context.agent_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "execution attempt failed, retrying"
                );
                self.sleeper.sleep(delay).await;
            }
        }

        let now = self.clock.now_millis();
        let mut failure = ExecutionResult::failure(format!(
            "Agent {} failed after {} attempt(s): {}",
            context.agent_id, used, last_error
        ));
        failure.execution_time = (now - started_at).max(0) as u64;
        failure.metadata.agent_id = context.agent_id.clone();
        failure.metadata.session_id = context.session_id.clone();
        failure.metadata.user_id = context.user_id.clone();
        failure.metadata.timestamp = now;
        (failure, used)
    }

    /// 最近的在前
    pub async fn get_execution_history(&self, agent_id: &str, limit: Option<usize>) -> Vec<ExecutionRecord> {
        self.history.read().await.recent(agent_id, limit)
    }

    pub async fn get_agent_performance_stats(&self, agent_id: &str) -> PerformanceStats {
        self.history.read().await.performance(agent_id)
    }

    /// 历史最佳模型；没有历史时按分配策略解析当前可用模型
    pub async fn recommend_model(&self, agent_id: &str) -> AgentResult<Option<String>> {
        if let Some(model) = self.history.read().await.best_model(agent_id) {
            return Ok(Some(model));
        }
        let available: Vec<String> = self
            .models
            .enabled_models()
            .await
            .into_iter()
            .map(|m| m.key)
            .collect();
        self.policy.get_best_llm_for_agent(agent_id, &available).await
    }

    /// 按成功率降序、平均会话时间升序排序；并列时保持注册顺序
    pub async fn recommend_agents(&self, specialization: &str, limit: usize) -> Vec<AgentId> {
        let mut candidates = self.registry.list_agents_by_specialization(specialization).await;
        candidates.sort_by(|a, b| {
            b.metadata
                .success_rate
                .total_cmp(&a.metadata.success_rate)
                .then(a.metadata.average_session_time.total_cmp(&b.metadata.average_session_time))
        });
        candidates
            .into_iter()
            .take(limit)
            .map(|snapshot| snapshot.definition.id)
            .collect()
    }

    /// agent_id 为 None 时清空全部
    pub async fn clear_history(&self, agent_id: Option<&str>) {
        self.history.write().await.clear(agent_id);
    }
}
