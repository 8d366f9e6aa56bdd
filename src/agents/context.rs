//! 执行上下文与执行结果
//!
//! ExecutionContext 传入 handler；Execution Manager 会在 parameters 中注入私有的 `_llm` 子对象。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 注入已解析模型信息的参数键
pub const LLM_PARAM_KEY: &str = "_llm";

/// 优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// 单次调用的上下文
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub agent_id: String,
    pub task: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    /// 仅作为元数据，执行器不强制
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

impl ExecutionContext {
    pub fn new(agent_id: impl Into<String>, task: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            task: task.into(),
            parameters: Map::new(),
            session_id: session_id.into(),
            user_id: None,
            tools: None,
            timeout_ms: None,
            priority: Priority::default(),
            context: None,
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// 读取注入的模型信息
    pub fn llm(&self) -> Option<&Value> {
        self.parameters.get(LLM_PARAM_KEY)
    }
}

/// 结果元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub agent_id: String,
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub timestamp: i64,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub tokens_used: Option<u64>,
}

/// 执行结果：成功 / 失败都以此结构返回
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    /// 耗时（毫秒）
    pub execution_time: u64,
    pub cost: f64,
    pub metadata: ResultMetadata,
}

impl ExecutionResult {
    /// handler 侧构造成功结果；耗时、时间戳、agent/session 由执行器补齐
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Self::default()
        }
    }

    /// 结构化失败结果（cost 为 0）
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.metadata.tokens_used = Some(tokens);
        self
    }

    pub fn with_tools_used(mut self, tools: Vec<String>) -> Self {
        self.metadata.tools_used = tools;
        self
    }

    /// 用上下文补齐元数据中的 agent / session / user
    pub(crate) fn stamp(mut self, ctx: &ExecutionContext, execution_time: u64, timestamp: i64) -> Self {
        self.execution_time = execution_time;
        self.metadata.agent_id = ctx.agent_id.clone();
        self.metadata.session_id = ctx.session_id.clone();
        self.metadata.user_id = ctx.user_id.clone();
        self.metadata.timestamp = timestamp;
        self
    }
}
