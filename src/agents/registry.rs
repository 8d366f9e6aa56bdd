//! Agent 注册表
//!
//! 唯一持有 AgentInstance 的地方：注册 / 注销、查询、执行委托、记忆与统计读写都从这里进入。
//! 主表与索引在同一把 RwLock 下修改，读者不会看到两者不一致的中间状态。

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::RwLock;

use super::context::{ExecutionContext, ExecutionResult};
use super::executor::{AgentExecutor, AllowAll, PermissionCheck};
use super::handler::AgentHandler;
use super::index::AgentIndex;
use super::state::{AgentInstance, StateStore};
use super::statistics::{AgentStatistics, RegistryStatistics, StatisticsCollector};
use super::types::{AgentDefinition, AgentId, AgentSnapshot, AgentStatus, AgentType, MemoryEntry};
use crate::core::{AgentError, AgentResult, Clock, SystemClock};

/// 主表 + 索引
#[derive(Default)]
pub struct AgentTable {
    pub(crate) agents: HashMap<AgentId, Arc<AgentInstance>>,
    pub(crate) index: AgentIndex,
}

impl AgentTable {
    fn dependents_of(&self, id: &str) -> Vec<AgentId> {
        self.index
            .ids()
            .iter()
            .filter(|other| other.as_str() != id)
            .filter(|other| {
                self.agents
                    .get(*other)
                    .is_some_and(|inst| inst.definition.dependencies.iter().any(|d| d == id))
            })
            .cloned()
            .collect()
    }

    fn check_registrable(&self, definition: &AgentDefinition) -> AgentResult<()> {
        if self.agents.contains_key(&definition.id) {
            return Err(AgentError::DuplicateAgent(definition.id.clone()));
        }
        if let Some(missing) = definition
            .dependencies
            .iter()
            .find(|dep| !self.agents.contains_key(*dep))
        {
            return Err(AgentError::MissingDependency {
                agent: definition.id.clone(),
                dependency: missing.clone(),
            });
        }
        Ok(())
    }

    fn ordered_instances(&self, ids: &[AgentId]) -> Vec<Arc<AgentInstance>> {
        ids.iter().filter_map(|id| self.agents.get(id).cloned()).collect()
    }
}

pub struct AgentRegistry {
    table: RwLock<AgentTable>,
    executor: AgentExecutor,
    state_store: Arc<StateStore>,
    statistics: Arc<StatisticsCollector>,
    clock: Arc<dyn Clock>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_permissions(clock, Arc::new(AllowAll))
    }

    /// 指定时钟与权限检查策略
    pub fn with_permissions(clock: Arc<dyn Clock>, permissions: Arc<dyn PermissionCheck>) -> Self {
        let state_store = Arc::new(StateStore::new(clock.clone()));
        let statistics = Arc::new(StatisticsCollector::new(clock.clone()));
        Self {
            table: RwLock::new(AgentTable::default()),
            executor: AgentExecutor::new(state_store.clone(), statistics.clone(), permissions),
            state_store,
            statistics,
            clock,
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// 注册：校验定义 → 检查重复与依赖 → handler.initialize → 写入主表与索引。
    /// 任一步失败都不会留下实例。
    pub async fn register_agent(
        &self,
        definition: AgentDefinition,
        handler: Arc<dyn AgentHandler>,
        tools: Vec<String>,
    ) -> AgentResult<AgentId> {
        definition.validate()?;
        self.table.read().await.check_registrable(&definition)?;

        handler
            .initialize()
            .await
            .map_err(|e| AgentError::InitializationFailed {
                agent: definition.id.clone(),
                reason: e.to_string(),
            })?;

        let mut table = self.table.write().await;
        // initialize 期间可能有并发注册
        if let Err(err) = table.check_registrable(&definition) {
            drop(table);
            handler.cleanup().await;
            return Err(err);
        }

        let id = definition.id.clone();
        table.index.insert(&definition);
        let instance = AgentInstance::new(definition, handler, tools, self.clock.now_millis());
        table.agents.insert(id.clone(), Arc::new(instance));

        tracing::info!(agent = %id, "agent registered");
        Ok(id)
    }

    /// 注销：不存在返回 false；忙碌或仍被依赖时报错；否则 cleanup 后移除
    pub async fn unregister_agent(&self, id: &str) -> AgentResult<bool> {
        let mut table = self.table.write().await;
        let Some(instance) = table.agents.get(id).cloned() else {
            return Ok(false);
        };

        if instance.status().await == AgentStatus::Busy {
            return Err(AgentError::AgentBusy(id.to_string()));
        }

        let dependents = table.dependents_of(id);
        if !dependents.is_empty() {
            return Err(AgentError::HasDependents {
                agent: id.to_string(),
                dependents,
            });
        }

        instance.handler.cleanup().await;
        table.index.remove(&instance.definition);
        table.agents.remove(id);

        tracing::info!(agent = %id, "agent unregistered");
        Ok(true)
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.table.read().await.agents.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.agents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get_agent(&self, id: &str) -> Option<AgentSnapshot> {
        let instance = self.instance(id).await?;
        Some(instance.snapshot().await)
    }

    /// 按注册顺序
    pub async fn list_agents(&self) -> Vec<AgentSnapshot> {
        let instances = {
            let table = self.table.read().await;
            table.ordered_instances(table.index.ids())
        };
        snapshots(instances).await
    }

    pub async fn list_agents_by_type(&self, agent_type: AgentType) -> Vec<AgentSnapshot> {
        let instances = {
            let table = self.table.read().await;
            table.ordered_instances(&table.index.by_type(agent_type))
        };
        snapshots(instances).await
    }

    pub async fn list_agents_by_specialization(&self, specialization: &str) -> Vec<AgentSnapshot> {
        let instances = {
            let table = self.table.read().await;
            table.ordered_instances(&table.index.by_specialization(specialization))
        };
        snapshots(instances).await
    }

    pub async fn list_agents_by_tag(&self, tag: &str) -> Vec<AgentSnapshot> {
        let instances = {
            let table = self.table.read().await;
            table.ordered_instances(&table.index.by_tag(tag))
        };
        snapshots(instances).await
    }

    pub async fn search_agents(&self, query: &str) -> Vec<AgentSnapshot> {
        let instances = {
            let table = self.table.read().await;
            let ids = table
                .index
                .search(query, |id| table.agents.get(id).map(|i| &i.definition));
            table.ordered_instances(&ids)
        };
        snapshots(instances).await
    }

    /// 委托给执行器
    pub async fn execute_agent(&self, context: &ExecutionContext) -> AgentResult<ExecutionResult> {
        self.executor.execute(&self.table, context).await
    }

    pub async fn update_agent_memory(&self, id: &str, key: &str, value: Value) -> AgentResult<()> {
        let instance = self.require(id).await?;
        let mut state = instance.state.lock().await;
        self.state_store
            .update_memory(&mut state.runtime, &instance.definition.memory, key, value);
        Ok(())
    }

    pub async fn get_agent_memory(&self, id: &str, key: &str) -> AgentResult<Option<MemoryEntry>> {
        let instance = self.require(id).await?;
        let state = instance.state.lock().await;
        Ok(self.state_store.memory_entry(&state.runtime, key))
    }

    pub async fn get_agent_memory_snapshot(&self, id: &str) -> AgentResult<HashMap<String, MemoryEntry>> {
        let instance = self.require(id).await?;
        let state = instance.state.lock().await;
        Ok(self.state_store.memory_snapshot(&state.runtime))
    }

    pub async fn update_agent_metadata(&self, id: &str, execution_time: u64, cost: f64, success: bool) -> AgentResult<()> {
        let instance = self.require(id).await?;
        let mut state = instance.state.lock().await;
        self.statistics
            .update_agent_metadata(&mut state.metadata, execution_time, cost, success);
        Ok(())
    }

    pub async fn get_agent_statistics(&self, id: &str) -> Option<AgentStatistics> {
        let instance = self.instance(id).await?;
        let state = instance.state.lock().await;
        Some(self.statistics.agent_statistics(id, &state))
    }

    pub async fn get_registry_statistics(&self) -> RegistryStatistics {
        let instances = {
            let table = self.table.read().await;
            table.ordered_instances(table.index.ids())
        };
        let mut rows = Vec::with_capacity(instances.len());
        for instance in &instances {
            let metadata = instance.state.lock().await.metadata.clone();
            rows.push((instance.definition.id.as_str(), instance.definition.agent_type, metadata));
        }
        self.statistics
            .registry_statistics(rows.iter().map(|(id, t, m)| (*id, *t, m)))
    }

    /// 并发调用所有 handler 的 cleanup 并清空注册表
    pub async fn shutdown(&self) {
        let mut table = self.table.write().await;
        let instances: Vec<Arc<AgentInstance>> = table.agents.drain().map(|(_, i)| i).collect();
        table.index = AgentIndex::new();
        drop(table);

        join_all(instances.iter().map(|i| i.handler.cleanup())).await;
        tracing::info!(agents = instances.len(), "registry shut down");
    }

    async fn instance(&self, id: &str) -> Option<Arc<AgentInstance>> {
        self.table.read().await.agents.get(id).cloned()
    }

    async fn require(&self, id: &str) -> AgentResult<Arc<AgentInstance>> {
        self.instance(id)
            .await
            .ok_or_else(|| AgentError::AgentNotFound(id.to_string()))
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn snapshots(instances: Vec<Arc<AgentInstance>>) -> Vec<AgentSnapshot> {
    let mut out = Vec::with_capacity(instances.len());
    for instance in instances {
        out.push(instance.snapshot().await);
    }
    out
}
