//! Agent 状态存储
//!
//! 每个 AgentInstance 持有一把 tokio Mutex 保护 metadata + runtime。
//! idle → busy 的检查与切换在同一临界区内完成，同一 agent 的并发调用不会同时进入 busy。
//! 记忆写入后立即淘汰：先按 TTL，再按容量（最旧优先）。

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use super::handler::AgentHandler;
use super::types::{
    AgentDefinition, AgentMetadata, AgentRuntimeState, AgentSnapshot, AgentStatus, MemoryEntry,
    MemoryPolicy,
};
use crate::core::{AgentError, AgentResult, Clock};

/// 受锁保护的可变部分
#[derive(Debug, Clone)]
pub struct AgentState {
    pub metadata: AgentMetadata,
    pub runtime: AgentRuntimeState,
}

/// 注册表中的 agent 实例：定义 + handler + 工具列表 + 可变状态
pub struct AgentInstance {
    pub(crate) definition: AgentDefinition,
    pub(crate) handler: Arc<dyn AgentHandler>,
    pub(crate) tools: Vec<String>,
    pub(crate) state: Mutex<AgentState>,
}

impl AgentInstance {
    pub(crate) fn new(
        definition: AgentDefinition,
        handler: Arc<dyn AgentHandler>,
        tools: Vec<String>,
        registered_at: i64,
    ) -> Self {
        Self {
            definition,
            handler,
            tools,
            state: Mutex::new(AgentState {
                metadata: AgentMetadata::new(registered_at),
                runtime: AgentRuntimeState::default(),
            }),
        }
    }

    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    pub async fn status(&self) -> AgentStatus {
        self.state.lock().await.metadata.status
    }

    /// 在锁内一次性拷贝
    pub async fn snapshot(&self) -> AgentSnapshot {
        let state = self.state.lock().await;
        AgentSnapshot {
            definition: self.definition.clone(),
            tools: self.tools.clone(),
            metadata: state.metadata.clone(),
            runtime: state.runtime.clone(),
        }
    }
}

/// 记忆读写与会话状态切换
pub struct StateStore {
    clock: Arc<dyn Clock>,
}

impl StateStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// 写入记忆后执行淘汰
    pub fn update_memory(
        &self,
        runtime: &mut AgentRuntimeState,
        policy: &MemoryPolicy,
        key: impl Into<String>,
        value: Value,
    ) {
        let now = self.clock.now_millis();
        let sequence = runtime.next_sequence;
        runtime.next_sequence += 1;
        runtime.memory.insert(
            key.into(),
            MemoryEntry {
                value,
                timestamp: now,
                sequence,
            },
        );
        evict(runtime, policy, now);
    }

    pub fn memory_entry(&self, runtime: &AgentRuntimeState, key: &str) -> Option<MemoryEntry> {
        runtime.memory.get(key).cloned()
    }

    pub fn memory_snapshot(&self, runtime: &AgentRuntimeState) -> HashMap<String, MemoryEntry> {
        runtime.memory.clone()
    }

    /// 必须是 idle 且不在冷却期（冷却截止时间等于当前时间视为已结束）
    pub fn ensure_available(&self, agent_id: &str, state: &AgentState) -> AgentResult<()> {
        if state.metadata.status != AgentStatus::Idle {
            return Err(AgentError::AgentBusy(agent_id.to_string()));
        }
        if let Some(until) = state.runtime.cooldown_until {
            let now = self.clock.now_millis();
            if until > now {
                return Err(AgentError::CooldownActive {
                    agent: agent_id.to_string(),
                    remaining_ms: until.saturating_sub(now),
                });
            }
        }
        Ok(())
    }

    /// idle → busy：检查状态与冷却，登记活跃会话。返回开始时间。
    pub fn begin_session(&self, agent_id: &str, state: &mut AgentState, session_id: &str) -> AgentResult<i64> {
        self.ensure_available(agent_id, state)?;
        let now = self.clock.now_millis();
        state.metadata.status = AgentStatus::Busy;
        state.runtime.active_sessions.insert(session_id.to_string());
        Ok(now)
    }

    /// 任何出口都要调用：回到 idle、移除会话、按需设置冷却
    pub fn end_session(&self, state: &mut AgentState, session_id: &str, cooldown_ms: Option<i64>) {
        state.metadata.status = AgentStatus::Idle;
        state.runtime.active_sessions.remove(session_id);
        if let Some(cooldown) = cooldown_ms {
            state.runtime.cooldown_until = Some(self.clock.now_millis().saturating_add(cooldown));
        }
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }
}

fn evict(runtime: &mut AgentRuntimeState, policy: &MemoryPolicy, now: i64) {
    if let Some(retention) = policy.retention_ms {
        let cutoff = now.saturating_sub(retention);
        runtime.memory.retain(|_, entry| entry.timestamp >= cutoff);
    }

    if let Some(max_size) = policy.max_size {
        if runtime.memory.len() > max_size {
            let mut by_age: Vec<(i64, u64, String)> = runtime
                .memory
                .iter()
                .map(|(k, e)| (e.timestamp, e.sequence, k.clone()))
                .collect();
            by_age.sort();
            let excess = runtime.memory.len() - max_size;
            for (_, _, key) in by_age.into_iter().take(excess) {
                runtime.memory.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::types::MemoryType;
    use crate::core::ManualClock;
    use serde_json::json;

    fn store(clock: &Arc<ManualClock>) -> StateStore {
        StateStore::new(clock.clone())
    }

    fn policy(retention_ms: Option<i64>, max_size: Option<usize>) -> MemoryPolicy {
        MemoryPolicy {
            memory_type: MemoryType::Session,
            retention_ms,
            max_size,
        }
    }

    #[test]
    fn test_capacity_eviction_keeps_newest() {
        let clock = Arc::new(ManualClock::new(0));
        let store = store(&clock);
        let mut runtime = AgentRuntimeState::default();
        let policy = policy(None, Some(3));

        for i in 0..5 {
            clock.advance(10);
            store.update_memory(&mut runtime, &policy, format!("k{i}"), json!(i));
        }

        assert_eq!(runtime.memory.len(), 3);
        for key in ["k2", "k3", "k4"] {
            assert!(runtime.memory.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn test_capacity_eviction_uses_insertion_order_on_equal_timestamps() {
        let clock = Arc::new(ManualClock::new(100));
        let store = store(&clock);
        let mut runtime = AgentRuntimeState::default();
        let policy = policy(None, Some(2));

        for i in 0..4 {
            store.update_memory(&mut runtime, &policy, format!("k{i}"), json!(i));
        }

        let mut keys: Vec<_> = runtime.memory.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["k2", "k3"]);
    }

    #[test]
    fn test_ttl_eviction_drops_stale_entry() {
        let clock = Arc::new(ManualClock::new(0));
        let store = store(&clock);
        let mut runtime = AgentRuntimeState::default();
        let policy = policy(Some(1_000), None);

        store.update_memory(&mut runtime, &policy, "old", json!("a"));
        clock.advance(1_001);
        store.update_memory(&mut runtime, &policy, "new", json!("b"));

        assert!(!runtime.memory.contains_key("old"));
        assert!(runtime.memory.contains_key("new"));
    }

    #[test]
    fn test_ttl_boundary_keeps_entry_at_exact_retention() {
        let clock = Arc::new(ManualClock::new(0));
        let store = store(&clock);
        let mut runtime = AgentRuntimeState::default();
        let policy = policy(Some(1_000), None);

        store.update_memory(&mut runtime, &policy, "old", json!("a"));
        clock.advance(1_000);
        store.update_memory(&mut runtime, &policy, "new", json!("b"));

        assert_eq!(runtime.memory.len(), 2);
    }

    #[test]
    fn test_begin_session_rejects_busy_and_cooldown() {
        let clock = Arc::new(ManualClock::new(0));
        let store = store(&clock);
        let mut state = AgentState {
            metadata: AgentMetadata::new(0),
            runtime: AgentRuntimeState::default(),
        };

        store.begin_session("a", &mut state, "s1").unwrap();
        assert_eq!(state.metadata.status, AgentStatus::Busy);
        assert!(matches!(
            store.begin_session("a", &mut state, "s2"),
            Err(AgentError::AgentBusy(_))
        ));

        store.end_session(&mut state, "s1", Some(5_000));
        assert_eq!(state.metadata.status, AgentStatus::Idle);
        assert!(state.runtime.active_sessions.is_empty());

        clock.advance(4_999);
        assert!(matches!(
            store.begin_session("a", &mut state, "s3"),
            Err(AgentError::CooldownActive { remaining_ms: 1, .. })
        ));

        clock.advance(1);
        assert!(store.begin_session("a", &mut state, "s3").is_ok());
    }

    #[test]
    fn test_extreme_cooldown_and_retention_saturate() {
        let clock = Arc::new(ManualClock::new(-10));
        let store = store(&clock);
        let mut state = AgentState {
            metadata: AgentMetadata::new(0),
            runtime: AgentRuntimeState::default(),
        };

        store.begin_session("a", &mut state, "s1").unwrap();
        clock.set(10);
        store.end_session(&mut state, "s1", Some(i64::MAX));
        assert_eq!(state.runtime.cooldown_until, Some(i64::MAX));
        assert!(matches!(
            store.begin_session("a", &mut state, "s2"),
            Err(AgentError::CooldownActive { .. })
        ));

        clock.set(-10);
        store.update_memory(&mut state.runtime, &policy(Some(i64::MAX), None), "k", json!(1));
        assert!(state.runtime.memory.contains_key("k"));
    }

    #[test]
    fn test_memory_reads_do_not_mutate() {
        let clock = Arc::new(ManualClock::new(0));
        let store = store(&clock);
        let mut runtime = AgentRuntimeState::default();
        store.update_memory(&mut runtime, &MemoryPolicy::default(), "k", json!(1));

        let before = runtime.clone();
        assert_eq!(store.memory_entry(&runtime, "k").unwrap().value, json!(1));
        assert!(store.memory_entry(&runtime, "missing").is_none());
        assert_eq!(store.memory_snapshot(&runtime).len(), 1);
        assert_eq!(runtime, before);
    }
}
