//! 错误类型
//!
//! 分类：注册错误（重复、依赖缺失、初始化失败）、调度前置错误（不存在、忙碌、冷却中、任务校验失败）、
//! 模型策略错误（无配置、无可用模型）、工作流错误，以及存储 / 序列化 / 配置错误。
//! Handler 执行失败不走这里，由 Executor 转为结构化失败结果。

use thiserror::Error;

/// 注册表、执行器、模型策略与工作流共用的错误类型
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Agent {agent} depends on unregistered agent {dependency}")]
    MissingDependency { agent: String, dependency: String },

    #[error("Invalid agent definition: {0}")]
    InvalidDefinition(String),

    #[error("Agent {agent} failed to initialize: {reason}")]
    InitializationFailed { agent: String, reason: String },

    /// 仍被其他 agent 依赖，不能注销
    #[error("Agent {agent} is required by: {}", dependents.join(", "))]
    HasDependents {
        agent: String,
        dependents: Vec<String>,
    },

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent {0} is busy")]
    AgentBusy(String),

    #[error("Agent {agent} is cooling down for another {remaining_ms}ms")]
    CooldownActive { agent: String, remaining_ms: i64 },

    #[error("Agent {agent} rejected task: {task}")]
    TaskRejected { agent: String, task: String },

    /// 执行 task 在收尾前被运行时终止
    #[error("Agent {agent} execution aborted: {reason}")]
    ExecutionAborted { agent: String, reason: String },

    #[error("No LLM configuration for agent {0}")]
    NoLlmConfig(String),

    #[error("No suitable model available for agent {0}")]
    NoSuitableModel(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("Orchestration session not found: {0}")]
    SessionNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    /// 调度前置错误：Execution Manager 会把它们转成结构化失败结果，而不是向上抛出
    pub fn is_dispatch_precondition(&self) -> bool {
        matches!(
            self,
            AgentError::AgentNotFound(_)
                | AgentError::AgentBusy(_)
                | AgentError::CooldownActive { .. }
                | AgentError::TaskRejected { .. }
        )
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for AgentError {
    fn from(err: config::ConfigError) -> Self {
        AgentError::Config(err.to_string())
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
