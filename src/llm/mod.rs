//! 模型分配
//!
//! - **model**: 模型描述与 ModelProvider（当前启用的模型集合）
//! - **assignment**: agent 的候选模型配置与参数包
//! - **policy**: 分配策略（按优先级解析、持久化）

pub mod assignment;
pub mod model;
pub mod policy;

pub use assignment::{AgentLlmAssignment, AgentLlmConfig, LlmParams, ParamValue};
pub use model::{ModelDescriptor, ModelProvider, StaticModelProvider};
pub use policy::{LlmAssignmentPolicy, DEFAULT_STORAGE_KEY};
