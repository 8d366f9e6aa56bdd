//! Agent 注册与执行核心
//!
//! - **types**: 定义、元数据、运行时状态、快照
//! - **context**: 执行上下文与结果
//! - **handler**: AgentHandler trait
//! - **state**: 实例与状态存储（busy 守卫、记忆淘汰）
//! - **index**: 类型 / 专长 / 标签索引
//! - **statistics**: 单 agent 与注册表级统计
//! - **executor**: 单次调用状态机
//! - **registry**: 注册表（唯一的修改入口）
//! - **echo**: 回显 handler

pub mod context;
pub mod echo;
pub mod executor;
pub mod handler;
pub mod index;
pub mod registry;
pub mod state;
pub mod statistics;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::{ExecutionContext, ExecutionResult, Priority, ResultMetadata, LLM_PARAM_KEY};
pub use echo::EchoHandler;
pub use executor::{AgentExecutor, AllowAll, PermissionCheck};
pub use handler::{AgentHandler, HandlerCapabilities};
pub use index::AgentIndex;
pub use registry::AgentRegistry;
pub use state::{AgentInstance, StateStore};
pub use statistics::{AgentStatistics, RegistryStatistics, StatisticsCollector};
pub use types::{
    AgentDefinition, AgentId, AgentMetadata, AgentRuntimeState, AgentSnapshot, AgentStatus,
    AgentType, Capability, LifecycleStatus, MemoryEntry, MemoryPolicy, MemoryType, ModelSpec,
};
