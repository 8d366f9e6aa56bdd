//! LLM 分配策略
//!
//! 维护 agent → AgentLlmAssignment 的表，并把整张表序列化为 JSON 存到 KeyValueStore 的一个固定 key 下。
//! 初始化是惰性的：第一个调用者触发「加载，或写入默认种子」，并发调用者等待同一次初始化。
//! 每次修改后都会规范化（agent_id、优先级排序）并立即持久化。

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{OnceCell, RwLock};

use super::assignment::{AgentLlmAssignment, AgentLlmConfig, LlmParams};
use crate::core::{AgentError, AgentResult};
use crate::storage::KeyValueStore;

pub const DEFAULT_STORAGE_KEY: &str = "agent_llm_configs";

pub struct LlmAssignmentPolicy {
    store: Arc<dyn KeyValueStore>,
    storage_key: String,
    defaults: Vec<AgentLlmAssignment>,
    table: RwLock<BTreeMap<String, AgentLlmAssignment>>,
    initialized: OnceCell<()>,
}

impl LlmAssignmentPolicy {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            defaults: Vec::new(),
            table: RwLock::new(BTreeMap::new()),
            initialized: OnceCell::new(),
        }
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// 存储中没有配置时写入的种子
    pub fn with_defaults(mut self, defaults: Vec<AgentLlmAssignment>) -> Self {
        self.defaults = defaults;
        self
    }

    async fn ensure_initialized(&self) -> AgentResult<()> {
        self.initialized.get_or_try_init(|| self.load_or_seed()).await?;
        Ok(())
    }

    async fn load_or_seed(&self) -> AgentResult<()> {
        let stored = self
            .store
            .get(&self.storage_key)
            .await
            .map_err(|e| AgentError::Storage(e.to_string()))?;

        let mut table = self.table.write().await;
        match stored {
            Some(json) => {
                let assignments: Vec<AgentLlmAssignment> = serde_json::from_str(&json)?;
                for mut assignment in assignments {
                    assignment.normalize();
                    table.insert(assignment.agent_id.clone(), assignment);
                }
                tracing::info!(assignments = table.len(), "LLM assignments loaded");
            }
            None => {
                let mut seeded = BTreeMap::new();
                for mut assignment in self.defaults.iter().cloned() {
                    assignment.normalize();
                    seeded.insert(assignment.agent_id.clone(), assignment);
                }
                self.persist(&seeded).await?;
                *table = seeded;
                tracing::info!(assignments = table.len(), "LLM assignments seeded with defaults");
            }
        }
        Ok(())
    }

    async fn persist(&self, table: &BTreeMap<String, AgentLlmAssignment>) -> AgentResult<()> {
        let rows: Vec<&AgentLlmAssignment> = table.values().collect();
        let json = serde_json::to_string(&rows)?;
        self.store
            .set(&self.storage_key, json)
            .await
            .map_err(|e| AgentError::Storage(e.to_string()))
    }

    /// 在写锁内修改副本、规范化并持久化；持久化成功后才替换内存表
    async fn mutate<T>(
        &self,
        agent_id: &str,
        f: impl FnOnce(&mut BTreeMap<String, AgentLlmAssignment>) -> T,
    ) -> AgentResult<T> {
        self.ensure_initialized().await?;
        let mut table = self.table.write().await;
        let mut next = table.clone();
        let out = f(&mut next);
        if let Some(assignment) = next.get_mut(agent_id) {
            assignment.normalize();
        }
        self.persist(&next).await?;
        *table = next;
        Ok(out)
    }

    /// 按优先级取第一个启用且在 available 中的模型；都不满足时取可用的 fallback；否则 None
    pub async fn get_best_llm_for_agent<S: AsRef<str> + Sync>(
        &self,
        agent_id: &str,
        available: &[S],
    ) -> AgentResult<Option<String>> {
        self.ensure_initialized().await?;
        let table = self.table.read().await;
        Ok(table.get(agent_id).and_then(|a| a.resolve(available)))
    }

    /// 只匹配精确的 model_key，不走 fallback
    pub async fn get_llm_params_for_agent(&self, agent_id: &str, model_key: &str) -> AgentResult<Option<LlmParams>> {
        self.ensure_initialized().await?;
        let table = self.table.read().await;
        Ok(table
            .get(agent_id)
            .and_then(|a| a.config_for(model_key))
            .map(AgentLlmConfig::params))
    }

    /// 新增或替换同 model_key 的候选配置
    pub async fn update_llm_assignment(&self, agent_id: &str, config: AgentLlmConfig) -> AgentResult<()> {
        self.mutate(agent_id, |table| {
            table
                .entry(agent_id.to_string())
                .or_insert_with(|| AgentLlmAssignment::new(agent_id))
                .upsert(config);
        })
        .await?;
        tracing::debug!(agent = %agent_id, "LLM assignment updated");
        Ok(())
    }

    /// 移除一个候选模型；不存在时返回 false
    pub async fn remove_llm_assignment(&self, agent_id: &str, model_key: &str) -> AgentResult<bool> {
        self.mutate(agent_id, |table| {
            let Some(assignment) = table.get_mut(agent_id) else {
                return false;
            };
            let before = assignment.configs.len();
            assignment.configs.retain(|c| c.model_key != model_key);
            assignment.configs.len() != before
        })
        .await
    }

    /// 整体替换一个 agent 的分配
    pub async fn set_agent_llm_config(
        &self,
        agent_id: &str,
        configs: Vec<AgentLlmConfig>,
        fallback_model: Option<String>,
    ) -> AgentResult<()> {
        self.mutate(agent_id, |table| {
            table.insert(
                agent_id.to_string(),
                AgentLlmAssignment {
                    agent_id: agent_id.to_string(),
                    configs,
                    fallback_model,
                },
            );
        })
        .await
    }

    pub async fn set_fallback_model(&self, agent_id: &str, fallback_model: Option<String>) -> AgentResult<()> {
        self.mutate(agent_id, |table| {
            table
                .entry(agent_id.to_string())
                .or_insert_with(|| AgentLlmAssignment::new(agent_id))
                .fallback_model = fallback_model;
        })
        .await
    }

    pub async fn remove_agent_assignments(&self, agent_id: &str) -> AgentResult<bool> {
        self.mutate(agent_id, |table| table.remove(agent_id).is_some()).await
    }

    pub async fn get_assignment(&self, agent_id: &str) -> AgentResult<Option<AgentLlmAssignment>> {
        self.ensure_initialized().await?;
        Ok(self.table.read().await.get(agent_id).cloned())
    }

    /// 按 agent id 排序
    pub async fn list_assignments(&self) -> AgentResult<Vec<AgentLlmAssignment>> {
        self.ensure_initialized().await?;
        Ok(self.table.read().await.values().cloned().collect())
    }
}
