//! 执行管理：模型解析、重试退避、执行历史
//!
//! - **manager**: ExecutionManager（组合注册表、分配策略与模型提供方）
//! - **history**: 每个 agent 的有界执行记录与基于历史的统计

pub mod history;
pub mod manager;

pub use history::{ExecutionHistory, ExecutionRecord, PerformanceStats};
pub use manager::{ExecutionManager, ExecutionOptions, ExecutionRequest};
