//! 执行历史
//!
//! 每个 agent 一个有界队列（默认 100 条，满了丢最旧的），与 StatisticsCollector 的滚动统计相互独立，
//! 用于事后查询、性能统计和模型推荐。

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

/// 一次请求（含全部重试）的结果记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub agent_id: String,
    pub session_id: String,
    pub task: String,
    pub model_key: String,
    pub success: bool,
    pub execution_time: u64,
    pub cost: f64,
    pub error: Option<String>,
    pub attempts: u32,
    pub timestamp: i64,
}

/// 基于历史的性能统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub agent_id: String,
    pub total_executions: usize,
    pub successful_executions: usize,
    pub failed_executions: usize,
    pub success_rate: f64,
    pub average_execution_time: f64,
    pub total_cost: f64,
    pub model_usage: BTreeMap<String, usize>,
    pub last_execution: Option<i64>,
}

#[derive(Debug)]
pub struct ExecutionHistory {
    limit: usize,
    records: HashMap<String, VecDeque<ExecutionRecord>>,
}

impl ExecutionHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            records: HashMap::new(),
        }
    }

    pub fn push(&mut self, record: ExecutionRecord) {
        let queue = self.records.entry(record.agent_id.clone()).or_default();
        queue.push_back(record);
        while queue.len() > self.limit {
            queue.pop_front();
        }
    }

    /// 最近的在前
    pub fn recent(&self, agent_id: &str, limit: Option<usize>) -> Vec<ExecutionRecord> {
        let Some(queue) = self.records.get(agent_id) else {
            return Vec::new();
        };
        queue
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn performance(&self, agent_id: &str) -> PerformanceStats {
        let mut stats = PerformanceStats {
            agent_id: agent_id.to_string(),
            ..PerformanceStats::default()
        };
        let Some(queue) = self.records.get(agent_id) else {
            return stats;
        };

        let mut total_time = 0u64;
        for record in queue {
            stats.total_executions += 1;
            if record.success {
                stats.successful_executions += 1;
            } else {
                stats.failed_executions += 1;
            }
            total_time += record.execution_time;
            stats.total_cost += record.cost;
            *stats.model_usage.entry(record.model_key.clone()).or_default() += 1;
            stats.last_execution = Some(stats.last_execution.map_or(record.timestamp, |t| t.max(record.timestamp)));
        }

        if stats.total_executions > 0 {
            let n = stats.total_executions as f64;
            stats.success_rate = stats.successful_executions as f64 / n;
            stats.average_execution_time = total_time as f64 / n;
        }
        stats
    }

    /// 历史成功率最高的模型；并列时取执行次数多的，再并列取 key 较小的
    pub fn best_model(&self, agent_id: &str) -> Option<String> {
        let queue = self.records.get(agent_id)?;
        let mut per_model: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for record in queue {
            let entry = per_model.entry(record.model_key.as_str()).or_default();
            entry.0 += 1;
            if record.success {
                entry.1 += 1;
            }
        }

        let mut best: Option<(&str, f64, usize)> = None;
        for (model, (total, ok)) in per_model {
            let rate = ok as f64 / total as f64;
            let better = match best {
                None => true,
                Some((_, best_rate, best_total)) => rate > best_rate || (rate == best_rate && total > best_total),
            };
            if better {
                best = Some((model, rate, total));
            }
        }
        best.map(|(model, _, _)| model.to_string())
    }

    pub fn clear(&mut self, agent_id: Option<&str>) {
        match agent_id {
            Some(id) => {
                self.records.remove(id);
            }
            None => self.records.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(agent: &str, model: &str, success: bool, time: u64, ts: i64) -> ExecutionRecord {
        ExecutionRecord {
            agent_id: agent.into(),
            session_id: "s".into(),
            task: "t".into(),
            model_key: model.into(),
            success,
            execution_time: time,
            cost: if success { 0.5 } else { 0.0 },
            error: None,
            attempts: 1,
            timestamp: ts,
        }
    }

    #[test]
    fn test_bounded_per_agent() {
        let mut history = ExecutionHistory::new(3);
        for i in 0..5 {
            history.push(record("a", "m1", true, 10, i));
        }
        history.push(record("b", "m1", true, 10, 0));

        let recent = history.recent("a", None);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].timestamp, 4);
        assert_eq!(recent[2].timestamp, 2);
        assert_eq!(history.recent("a", Some(1)).len(), 1);
        assert_eq!(history.recent("b", None).len(), 1);
        assert!(history.recent("c", None).is_empty());
    }

    #[test]
    fn test_performance_stats() {
        let mut history = ExecutionHistory::new(100);
        history.push(record("a", "m1", true, 10, 1));
        history.push(record("a", "m2", false, 30, 3));
        history.push(record("a", "m1", true, 20, 2));

        let stats = history.performance("a");
        assert_eq!(stats.total_executions, 3);
        assert_eq!(stats.successful_executions, 2);
        assert_eq!(stats.failed_executions, 1);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((stats.average_execution_time - 20.0).abs() < 1e-9);
        assert!((stats.total_cost - 1.0).abs() < 1e-9);
        assert_eq!(stats.model_usage["m1"], 2);
        assert_eq!(stats.last_execution, Some(3));

        assert_eq!(history.performance("none").total_executions, 0);
    }

    #[test]
    fn test_best_model_prefers_rate_then_volume() {
        let mut history = ExecutionHistory::new(100);
        history.push(record("a", "m1", true, 10, 1));
        history.push(record("a", "m2", true, 10, 2));
        history.push(record("a", "m2", true, 10, 3));
        history.push(record("a", "m3", false, 10, 4));
        assert_eq!(history.best_model("a").as_deref(), Some("m2"));

        history.push(record("a", "m2", false, 10, 5));
        assert_eq!(history.best_model("a").as_deref(), Some("m1"));
        assert!(history.best_model("b").is_none());
    }

    #[test]
    fn test_clear() {
        let mut history = ExecutionHistory::new(10);
        history.push(record("a", "m1", true, 1, 1));
        history.push(record("b", "m1", true, 1, 1));
        history.clear(Some("a"));
        assert!(history.recent("a", None).is_empty());
        assert_eq!(history.recent("b", None).len(), 1);
        history.clear(None);
        assert!(history.recent("b", None).is_empty());
    }
}
