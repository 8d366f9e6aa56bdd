//! 多步工作流
//!
//! - **types**: 工作流定义、编排会话、执行结果
//! - **builder**: 流式构建
//! - **loader**: 从 TOML 加载
//! - **runner**: 顺序执行、上下文传递、提前终止

pub mod builder;
pub mod loader;
pub mod runner;
pub mod types;

pub use builder::WorkflowBuilder;
pub use loader::{load_workflow_dir, load_workflow_file, parse_workflow};
pub use runner::{TerminationPredicate, WorkflowRunner};
pub use types::*;
