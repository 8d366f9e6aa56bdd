//! Agent 数据模型
//!
//! AgentDefinition 注册后不可变；AgentMetadata / AgentRuntimeState 由执行器、状态存储与统计模块维护。

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{AgentError, AgentResult};

pub type AgentId = String;

/// Agent 类型（固定枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Orchestrator,
    Specialist,
    Utility,
    Creative,
    Analytical,
    Communicator,
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentType::Orchestrator => "orchestrator",
            AgentType::Specialist => "specialist",
            AgentType::Utility => "utility",
            AgentType::Creative => "creative",
            AgentType::Analytical => "analytical",
            AgentType::Communicator => "communicator",
        };
        f.write_str(name)
    }
}

/// 定义层的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    #[default]
    Active,
    Inactive,
    Maintenance,
    Deprecated,
}

/// 运行时状态：idle → busy → {idle, error}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Busy,
    Error,
}

/// 记忆策略类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    #[default]
    None,
    Session,
    Persistent,
}

/// 记忆策略：类型 + 保留时长（毫秒）+ 最大条目数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryPolicy {
    #[serde(default, rename = "type")]
    pub memory_type: MemoryType,
    /// 超过该时长的条目在下次写入时被淘汰；None 表示不按时间淘汰
    #[serde(default)]
    pub retention_ms: Option<i64>,
    /// 条目数上限；None 表示不限
    #[serde(default)]
    pub max_size: Option<usize>,
}

/// 能力声明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cost: f64,
    /// 执行结束后的冷却时长（毫秒）
    #[serde(default)]
    pub cooldown_ms: Option<i64>,
    #[serde(default)]
    pub max_usage: Option<u64>,
}

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            cost: 0.0,
            cooldown_ms: None,
            max_usage: None,
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_cooldown(mut self, cooldown_ms: i64) -> Self {
        self.cooldown_ms = Some(cooldown_ms);
        self
    }
}

/// 默认模型描述
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSpec {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Agent 定义（注册后不可变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub id: AgentId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    #[serde(default)]
    pub specialization: BTreeSet<String>,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub model: ModelSpec,
    /// 超时（毫秒），仅作为元数据传给下游
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    #[serde(default)]
    pub memory: MemoryPolicy,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<AgentId>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub status: LifecycleStatus,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_concurrency() -> u32 {
    1
}

impl AgentDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            agent_type,
            specialization: BTreeSet::new(),
            capabilities: Vec::new(),
            model: ModelSpec::default(),
            timeout_ms: default_timeout_ms(),
            max_concurrency: default_max_concurrency(),
            memory: MemoryPolicy::default(),
            permissions: Vec::new(),
            dependencies: Vec::new(),
            tags: BTreeSet::new(),
            status: LifecycleStatus::Active,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_specialization(mut self, spec: impl Into<String>) -> Self {
        self.specialization.insert(spec.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_memory(mut self, memory_type: MemoryType, retention_ms: Option<i64>, max_size: Option<usize>) -> Self {
        self.memory = MemoryPolicy {
            memory_type,
            retention_ms,
            max_size,
        };
        self
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    /// 第一个声明了 cooldown 的能力决定冷却时长
    pub fn cooldown_ms(&self) -> Option<i64> {
        self.capabilities.iter().find_map(|c| c.cooldown_ms)
    }

    /// 结构校验；枚举字段由类型系统保证
    pub fn validate(&self) -> AgentResult<()> {
        if self.id.trim().is_empty() {
            return Err(AgentError::InvalidDefinition("id must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(AgentError::InvalidDefinition(format!(
                "agent {} has an empty name",
                self.id
            )));
        }
        if self.timeout_ms == 0 {
            return Err(AgentError::InvalidDefinition(format!(
                "agent {} timeout must be positive",
                self.id
            )));
        }
        if self.max_concurrency == 0 {
            return Err(AgentError::InvalidDefinition(format!(
                "agent {} maxConcurrency must be at least 1",
                self.id
            )));
        }
        if self.memory.max_size == Some(0) {
            return Err(AgentError::InvalidDefinition(format!(
                "agent {} memory maxSize must be positive",
                self.id
            )));
        }
        if matches!(self.memory.retention_ms, Some(r) if r < 0) {
            return Err(AgentError::InvalidDefinition(format!(
                "agent {} memory retention must not be negative",
                self.id
            )));
        }
        for cap in &self.capabilities {
            if !cap.cost.is_finite() || cap.cost < 0.0 {
                return Err(AgentError::InvalidDefinition(format!(
                    "capability {} of agent {} has invalid cost {}",
                    cap.name, self.id, cap.cost
                )));
            }
            if matches!(cap.cooldown_ms, Some(c) if c < 0) {
                return Err(AgentError::InvalidDefinition(format!(
                    "capability {} of agent {} has negative cooldown",
                    cap.name, self.id
                )));
            }
        }
        if self.dependencies.iter().any(|d| d == &self.id) {
            return Err(AgentError::InvalidDefinition(format!(
                "agent {} depends on itself",
                self.id
            )));
        }
        Ok(())
    }
}

/// 运行元数据（统计）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetadata {
    pub registered_at: i64,
    pub last_active: Option<i64>,
    pub total_sessions: u64,
    pub average_session_time: f64,
    pub success_rate: f64,
    pub total_cost: f64,
    pub status: AgentStatus,
    pub last_error: Option<String>,
}

impl AgentMetadata {
    pub fn new(registered_at: i64) -> Self {
        Self {
            registered_at,
            last_active: None,
            total_sessions: 0,
            average_session_time: 0.0,
            success_rate: 0.0,
            total_cost: 0.0,
            status: AgentStatus::Idle,
            last_error: None,
        }
    }
}

/// 记忆条目：值 + 写入时间戳；sequence 用于同一时间戳下的先后顺序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub value: Value,
    pub timestamp: i64,
    #[serde(default)]
    pub sequence: u64,
}

/// 运行时状态：记忆、活跃会话、冷却截止时间
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRuntimeState {
    pub memory: HashMap<String, MemoryEntry>,
    pub active_sessions: BTreeSet<String>,
    pub cooldown_until: Option<i64>,
    #[serde(skip)]
    pub(crate) next_sequence: u64,
}

/// get_agent 返回的只读快照（在 agent 锁内一次性拷贝）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSnapshot {
    pub definition: AgentDefinition,
    pub tools: Vec<String>,
    pub metadata: AgentMetadata,
    pub runtime: AgentRuntimeState,
}

impl AgentSnapshot {
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn status(&self) -> AgentStatus {
        self.metadata.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_defaults_from_json() {
        let def: AgentDefinition = serde_json::from_value(serde_json::json!({
            "id": "writer",
            "name": "Writer",
            "type": "creative"
        }))
        .unwrap();
        assert_eq!(def.timeout_ms, 30_000);
        assert_eq!(def.max_concurrency, 1);
        assert_eq!(def.memory.memory_type, MemoryType::None);
        assert_eq!(def.status, LifecycleStatus::Active);
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_unknown_type_rejected_by_schema() {
        let parsed: Result<AgentDefinition, _> = serde_json::from_value(serde_json::json!({
            "id": "x",
            "name": "X",
            "type": "wizard"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut def = AgentDefinition::new("a", "A", AgentType::Utility);
        def.max_concurrency = 0;
        assert!(matches!(def.validate(), Err(AgentError::InvalidDefinition(_))));

        let def = AgentDefinition::new("a", "A", AgentType::Utility)
            .with_capability(Capability::new("x").with_cost(-1.0));
        assert!(def.validate().is_err());

        let def = AgentDefinition::new("a", "A", AgentType::Utility).with_dependency("a");
        assert!(def.validate().is_err());

        let def = AgentDefinition::new(" ", "A", AgentType::Utility);
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_cooldown_from_first_declaring_capability() {
        let def = AgentDefinition::new("a", "A", AgentType::Utility)
            .with_capability(Capability::new("plain"))
            .with_capability(Capability::new("slow").with_cooldown(5_000))
            .with_capability(Capability::new("slower").with_cooldown(9_000));
        assert_eq!(def.cooldown_ms(), Some(5_000));
        assert_eq!(AgentDefinition::new("b", "B", AgentType::Utility).cooldown_ms(), None);
    }
}
