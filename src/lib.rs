//! Hive - Rust 智能体注册与执行核心
//!
//! 模块划分：
//! - **agents**: 注册表、执行器、状态存储、索引、统计
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、时钟与休眠注入
//! - **execution**: Execution Manager（模型解析、重试退避、执行历史）
//! - **llm**: 模型提供方与 LLM 分配策略
//! - **observability**: tracing 初始化
//! - **storage**: 键值存储（内存 / 文件）
//! - **workflow**: 多步工作流（定义、加载、执行、编排会话）

pub mod agents;
pub mod config;
pub mod core;
pub mod execution;
pub mod llm;
pub mod observability;
pub mod storage;
pub mod workflow;

pub use agents::{AgentDefinition, AgentHandler, AgentRegistry, ExecutionContext, ExecutionResult};
pub use core::{AgentError, AgentResult};
pub use execution::{ExecutionManager, ExecutionRequest};
pub use llm::LlmAssignmentPolicy;
pub use workflow::WorkflowRunner;
