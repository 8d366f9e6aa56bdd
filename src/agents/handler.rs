//! Agent handler 抽象
//!
//! 每个 agent 绑定一个实现 AgentHandler 的对象：execute / validate_task / capabilities / initialize / cleanup。
//! initialize 失败会中止注册；execute 失败由执行器转为结构化失败结果，不会向上抛出。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::context::{ExecutionContext, ExecutionResult};
use super::types::Capability;

/// handler 自报的能力描述
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerCapabilities {
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub supported_tasks: Vec<String>,
}

#[async_trait]
pub trait AgentHandler: Send + Sync {
    /// 执行任务；返回 Err 时执行器记录 last_error 并返回失败结果
    async fn execute(&self, context: &ExecutionContext) -> anyhow::Result<ExecutionResult>;

    /// 任务校验，返回 false 时执行器以 TaskRejected 拒绝
    fn validate_task(&self, task: &str, parameters: &Map<String, Value>) -> bool;

    fn capabilities(&self) -> HandlerCapabilities;

    /// 注册时调用，失败则不保存实例
    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// 注销时调用
    async fn cleanup(&self) {}
}
