//! 统计收集
//!
//! 单 agent：会话数、平均耗时（滚动均值）、成功率、累计成本。
//! 成功率按「隐含的整数成功次数 / 总次数」计算：round(旧成功率 × (n-1)) + 本次，再除以 n。
//! 注册表级：agent 数、类型数、总会话数、平均成功率（简单算术平均）、最活跃 agent、忙碌数。

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::state::AgentState;
use super::types::{AgentMetadata, AgentStatus, AgentType};
use crate::core::Clock;

/// 单个 agent 的统计视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatistics {
    pub agent_id: String,
    pub total_sessions: u64,
    pub success_rate: f64,
    pub average_session_time: f64,
    pub total_cost: f64,
    pub last_active: Option<i64>,
    pub status: AgentStatus,
    pub last_error: Option<String>,
    pub memory_entries: usize,
    pub active_sessions: usize,
}

/// 注册表级汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatistics {
    pub total_agents: usize,
    pub agent_types: usize,
    pub total_sessions: u64,
    pub average_success_rate: f64,
    pub most_active_agent: Option<String>,
    pub busy_agents: usize,
}

pub struct StatisticsCollector {
    clock: Arc<dyn Clock>,
}

impl StatisticsCollector {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// 记录一次执行
    pub fn update_agent_metadata(&self, metadata: &mut AgentMetadata, execution_time: u64, cost: f64, success: bool) {
        metadata.total_sessions += 1;
        let n = metadata.total_sessions as f64;

        metadata.total_cost += cost;
        metadata.average_session_time = (metadata.average_session_time * (n - 1.0) + execution_time as f64) / n;

        let prior_successes = (metadata.success_rate * (n - 1.0)).round();
        metadata.success_rate = (prior_successes + if success { 1.0 } else { 0.0 }) / n;

        metadata.last_active = Some(self.clock.now_millis());
    }

    pub fn agent_statistics(&self, agent_id: &str, state: &AgentState) -> AgentStatistics {
        let m = &state.metadata;
        AgentStatistics {
            agent_id: agent_id.to_string(),
            total_sessions: m.total_sessions,
            success_rate: m.success_rate,
            average_session_time: m.average_session_time,
            total_cost: m.total_cost,
            last_active: m.last_active,
            status: m.status,
            last_error: m.last_error.clone(),
            memory_entries: state.runtime.memory.len(),
            active_sessions: state.runtime.active_sessions.len(),
        }
    }

    /// agents 按注册顺序传入；最活跃 agent 并列时取先出现者
    pub fn registry_statistics<'a, I>(&self, agents: I) -> RegistryStatistics
    where
        I: IntoIterator<Item = (&'a str, AgentType, &'a AgentMetadata)>,
    {
        let mut stats = RegistryStatistics::default();
        let mut types = BTreeSet::new();
        let mut rate_sum = 0.0;
        let mut most_active: Option<(&str, u64)> = None;

        for (id, agent_type, metadata) in agents {
            stats.total_agents += 1;
            types.insert(agent_type);
            stats.total_sessions += metadata.total_sessions;
            rate_sum += metadata.success_rate;
            if metadata.status == AgentStatus::Busy {
                stats.busy_agents += 1;
            }
            match most_active {
                Some((_, best)) if metadata.total_sessions <= best => {}
                _ => most_active = Some((id, metadata.total_sessions)),
            }
        }

        stats.agent_types = types.len();
        if stats.total_agents > 0 {
            stats.average_success_rate = rate_sum / stats.total_agents as f64;
        }
        stats.most_active_agent = most_active.map(|(id, _)| id.to_string());
        stats
    }
}
