//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__EXECUTOR__DEFAULT_RETRY_COUNT=3`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::llm::{AgentLlmAssignment, AgentLlmConfig};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub executor: ExecutorSection,
    pub workflow: WorkflowSection,
    pub llm: LlmSection,
}

/// [executor] 段：重试、退避与历史上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    /// 未指定 retry_count 时的尝试次数
    pub default_retry_count: u32,
    /// 第 n 次失败后等待 backoff_base_ms × 2^n
    pub backoff_base_ms: u64,
    /// 每个 agent 保留的执行记录条数
    pub history_limit: usize,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            default_retry_count: 1,
            backoff_base_ms: 1000,
            history_limit: 100,
        }
    }
}

impl ExecutorSection {
    /// 第 attempt 次（从 1 开始）失败后的退避时长
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

/// [workflow] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowSection {
    /// 累计错误数超过该值即提前终止
    pub max_errors: usize,
    /// cleanup_expired_sessions 使用的会话最大存活时间（秒）
    pub session_max_age_secs: u64,
    /// 启动时加载其中的 *.toml 工作流定义
    pub definitions_dir: Option<PathBuf>,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_errors: 3,
            session_max_age_secs: 3600,
            definitions_dir: None,
        }
    }
}

/// [llm] 段：分配表的存储位置与初始种子
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub storage_key: String,
    /// 设置时使用文件存储，否则只存在内存里
    pub storage_path: Option<PathBuf>,
    pub default_assignments: Vec<DefaultAssignment>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            storage_key: crate::llm::DEFAULT_STORAGE_KEY.to_string(),
            storage_path: None,
            default_assignments: Vec::new(),
        }
    }
}

/// [[llm.default_assignments]]：一个 agent 的一个候选模型
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultAssignment {
    pub agent_id: String,
    pub model_key: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub fallback_model: Option<String>,
}

impl LlmSection {
    /// 同一 agent 的多行合并为一份分配
    pub fn seed_assignments(&self) -> Vec<AgentLlmAssignment> {
        let mut out: Vec<AgentLlmAssignment> = Vec::new();
        for row in &self.default_assignments {
            let idx = match out.iter().position(|a| a.agent_id == row.agent_id) {
                Some(idx) => idx,
                None => {
                    out.push(AgentLlmAssignment::new(&row.agent_id));
                    out.len() - 1
                }
            };
            let assignment = &mut out[idx];
            assignment.upsert(AgentLlmConfig::new(&row.model_key, row.priority));
            if row.fallback_model.is_some() {
                assignment.fallback_model = row.fallback_model.clone();
            }
        }
        out
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
