//! Agent 执行器：单次调用的状态机
//!
//! 1. 查找实例，检查 idle 与冷却
//! 2. handler.validate_task
//! 3. 权限检查（PermissionCheck 扩展点，默认放行）
//! 4. idle → busy，登记会话
//! 5. handler.execute（在独立 task 中运行，panic 也会被收敛为失败）
//! 6/7. 成功写记忆与统计；失败记录 last_error 并返回结构化失败结果
//! 8. 无论成败：回到 idle、移除会话、按能力声明设置冷却
//!
//! 第 1–4 步在注册表读锁 + agent 锁内完成，检查与切换是原子的。执行器内部不重试。

use std::sync::Arc;

use serde_json::json;
use tokio::sync::RwLock;

use super::context::{ExecutionContext, ExecutionResult};
use super::registry::AgentTable;
use super::state::{AgentInstance, StateStore};
use super::statistics::StatisticsCollector;
use super::types::{AgentDefinition, MemoryType};
use crate::core::{AgentError, AgentResult};

/// 权限检查扩展点
pub trait PermissionCheck: Send + Sync {
    fn check(&self, definition: &AgentDefinition, context: &ExecutionContext) -> AgentResult<()>;
}

/// 默认策略：全部放行
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl PermissionCheck for AllowAll {
    fn check(&self, _definition: &AgentDefinition, _context: &ExecutionContext) -> AgentResult<()> {
        Ok(())
    }
}

pub struct AgentExecutor {
    state_store: Arc<StateStore>,
    statistics: Arc<StatisticsCollector>,
    permissions: Arc<dyn PermissionCheck>,
}

impl AgentExecutor {
    pub fn new(
        state_store: Arc<StateStore>,
        statistics: Arc<StatisticsCollector>,
        permissions: Arc<dyn PermissionCheck>,
    ) -> Self {
        Self {
            state_store,
            statistics,
            permissions,
        }
    }

    /// 前置条件失败返回 Err；handler 失败返回 Ok(success = false)
    ///
    /// handler 与收尾在同一个独立 task 中完成，调用方中途放弃等待（timeout / select!）也不会让 agent 停在 busy。
    pub async fn execute(&self, table: &RwLock<AgentTable>, context: &ExecutionContext) -> AgentResult<ExecutionResult> {
        let (instance, started_at) = self.begin(table, context).await?;

        tracing::debug!(agent = %context.agent_id, session = %context.session_id, "agent execution started");

        let state_store = Arc::clone(&self.state_store);
        let statistics = Arc::clone(&self.statistics);
        let ctx = context.clone();
        let run = tokio::spawn(async move {
            let handler = Arc::clone(&instance.handler);
            let handler_ctx = ctx.clone();
            let outcome = match tokio::spawn(async move { handler.execute(&handler_ctx).await }).await {
                Ok(result) => result,
                Err(join_err) => Err(anyhow::anyhow!("handler panicked: {join_err}")),
            };
            finish(&state_store, &statistics, &instance, &ctx, started_at, outcome).await
        });

        run.await.map_err(|join_err| AgentError::ExecutionAborted {
            agent: context.agent_id.clone(),
            reason: join_err.to_string(),
        })
    }

    async fn begin(
        &self,
        table: &RwLock<AgentTable>,
        context: &ExecutionContext,
    ) -> AgentResult<(Arc<AgentInstance>, i64)> {
        let table = table.read().await;
        let instance = table
            .agents
            .get(&context.agent_id)
            .cloned()
            .ok_or_else(|| AgentError::AgentNotFound(context.agent_id.clone()))?;

        let mut state = instance.state.lock().await;
        self.state_store.ensure_available(&context.agent_id, &state)?;

        if !instance.handler.validate_task(&context.task, &context.parameters) {
            return Err(AgentError::TaskRejected {
                agent: context.agent_id.clone(),
                task: context.task.clone(),
            });
        }

        self.permissions.check(&instance.definition, context)?;

        let started_at = self
            .state_store
            .begin_session(&context.agent_id, &mut state, &context.session_id)?;
        drop(state);

        Ok((instance, started_at))
    }
}

async fn finish(
    state_store: &StateStore,
    statistics: &StatisticsCollector,
    instance: &AgentInstance,
    context: &ExecutionContext,
    started_at: i64,
    outcome: anyhow::Result<ExecutionResult>,
) -> ExecutionResult {
    let definition = &instance.definition;
    let now = state_store.now_millis();
    let elapsed = now.saturating_sub(started_at).max(0) as u64;

    let mut state = instance.state.lock().await;
    let result = match outcome {
        Ok(result) => {
            if result.success && definition.memory.memory_type != MemoryType::None {
                state_store.update_memory(
                    &mut state.runtime,
                    &definition.memory,
                    format!("session_{}", context.session_id),
                    json!({
                        "task": context.task,
                        "parameters": context.parameters,
                        "result": result.data,
                        "timestamp": now,
                    }),
                );
            }
            statistics.update_agent_metadata(&mut state.metadata, elapsed, result.cost, result.success);
            state.metadata.last_error = if result.success { None } else { result.error.clone() };
            result.stamp(context, elapsed, now)
        }
        Err(err) => {
            let message = err.to_string();
            tracing::warn!(agent = %context.agent_id, error = %message, "agent execution failed");
            statistics.update_agent_metadata(&mut state.metadata, elapsed, 0.0, false);
            state.metadata.last_error = Some(message.clone());
            ExecutionResult::failure(message).stamp(context, elapsed, now)
        }
    };

    state_store.end_session(&mut state, &context.session_id, definition.cooldown_ms());

    tracing::debug!(
        agent = %context.agent_id,
        success = result.success,
        elapsed_ms = elapsed,
        "agent execution finished"
    );
    result
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use crate::agents::registry::AgentRegistry;
    use crate::agents::test_support::{ScriptedHandler, Step};
    use crate::agents::types::{AgentDefinition, AgentStatus, AgentType, Capability, MemoryType};
    use crate::agents::ExecutionContext;
    use crate::core::{AgentError, ManualClock};

    use super::*;

    struct DenyAll;

    impl PermissionCheck for DenyAll {
        fn check(&self, definition: &AgentDefinition, _context: &ExecutionContext) -> AgentResult<()> {
            Err(AgentError::TaskRejected {
                agent: definition.id.clone(),
                task: "denied".into(),
            })
        }
    }

    fn def(id: &str) -> AgentDefinition {
        AgentDefinition::new(id, id, AgentType::Utility)
    }

    #[tokio::test]
    async fn test_successful_execution_updates_state() {
        let clock = Arc::new(ManualClock::new(1_000));
        let registry = AgentRegistry::with_clock(clock.clone());
        let handler = ScriptedHandler::with_steps(vec![Step::Succeed { cost: 0.2, advance_ms: 40 }])
            .with_clock(clock.clone());
        registry
            .register_agent(
                def("a").with_memory(MemoryType::Session, None, Some(10)),
                Arc::new(handler),
                vec![],
            )
            .await
            .unwrap();

        let ctx = ExecutionContext::new("a", "summarize", "s1").with_parameter("len", json!(3));
        let result = registry.execute_agent(&ctx).await.unwrap();

        assert!(result.success);
        assert_eq!(result.execution_time, 40);
        assert_eq!(result.metadata.session_id, "s1");
        assert_eq!(result.metadata.timestamp, 1_040);

        let snap = registry.get_agent("a").await.unwrap();
        assert_eq!(snap.status(), AgentStatus::Idle);
        assert!(snap.runtime.active_sessions.is_empty());
        assert_eq!(snap.metadata.total_sessions, 1);
        assert!((snap.metadata.success_rate - 1.0).abs() < 1e-9);
        assert!((snap.metadata.total_cost - 0.2).abs() < 1e-9);

        let entry = snap.runtime.memory.get("session_s1").unwrap();
        assert_eq!(entry.value["task"], json!("summarize"));
        assert_eq!(entry.value["parameters"]["len"], json!(3));
        assert_eq!(entry.value["result"]["task"], json!("summarize"));
    }

    #[tokio::test]
    async fn test_handler_failure_becomes_result() {
        let registry = AgentRegistry::new();
        let handler = ScriptedHandler::with_steps(vec![
            Step::Succeed { cost: 0.0, advance_ms: 0 },
            Step::Fail("boom".into()),
            Step::Succeed { cost: 0.0, advance_ms: 0 },
        ]);
        registry
            .register_agent(def("a").with_memory(MemoryType::Session, None, None), Arc::new(handler), vec![])
            .await
            .unwrap();

        for (i, expect) in [true, false, true].into_iter().enumerate() {
            let ctx = ExecutionContext::new("a", "t", format!("s{i}"));
            let result = registry.execute_agent(&ctx).await.unwrap();
            assert_eq!(result.success, expect);
            if !expect {
                assert_eq!(result.error.as_deref(), Some("boom"));
                let snap = registry.get_agent("a").await.unwrap();
                assert_eq!(snap.metadata.last_error.as_deref(), Some("boom"));
                assert_eq!(snap.status(), AgentStatus::Idle);
                assert!(!snap.runtime.memory.contains_key("session_s1"));
            }
        }

        let stats = registry.get_agent_statistics("a").await.unwrap();
        assert_eq!(stats.total_sessions, 3);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!(stats.last_error.is_none());
    }

    #[tokio::test]
    async fn test_no_memory_written_when_memory_disabled() {
        let registry = AgentRegistry::new();
        registry
            .register_agent(def("a"), Arc::new(ScriptedHandler::new()), vec![])
            .await
            .unwrap();
        registry
            .execute_agent(&ExecutionContext::new("a", "t", "s1"))
            .await
            .unwrap();
        assert!(registry.get_agent_memory_snapshot("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_preconditions_fail_without_invoking_handler() {
        let registry = AgentRegistry::new();
        let handler = Arc::new(ScriptedHandler::new());
        registry.register_agent(def("a"), handler.clone(), vec![]).await.unwrap();

        let missing = registry.execute_agent(&ExecutionContext::new("nope", "t", "s")).await;
        assert!(matches!(missing, Err(AgentError::AgentNotFound(_))));

        let rejected = registry.execute_agent(&ExecutionContext::new("a", "invalid", "s")).await;
        assert!(matches!(rejected, Err(AgentError::TaskRejected { .. })));

        assert_eq!(handler.calls(), 0);
        let snap = registry.get_agent("a").await.unwrap();
        assert_eq!(snap.metadata.total_sessions, 0);
        assert_eq!(snap.status(), AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_permission_check_blocks_execution() {
        let registry = AgentRegistry::with_permissions(Arc::new(ManualClock::new(0)), Arc::new(DenyAll));
        let handler = Arc::new(ScriptedHandler::new());
        registry.register_agent(def("a"), handler.clone(), vec![]).await.unwrap();

        let result = registry.execute_agent(&ExecutionContext::new("a", "t", "s")).await;
        assert!(result.is_err());
        assert_eq!(handler.calls(), 0);
        assert_eq!(registry.get_agent("a").await.unwrap().status(), AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_cooldown_window() {
        let clock = Arc::new(ManualClock::new(0));
        let registry = AgentRegistry::with_clock(clock.clone());
        registry
            .register_agent(
                def("a").with_capability(Capability::new("draft").with_cooldown(5_000)),
                Arc::new(ScriptedHandler::new()),
                vec![],
            )
            .await
            .unwrap();

        let first = registry.execute_agent(&ExecutionContext::new("a", "t", "s1")).await.unwrap();
        assert!(first.success);

        clock.advance(4_999);
        let blocked = registry.execute_agent(&ExecutionContext::new("a", "t", "s2")).await;
        assert!(matches!(blocked, Err(AgentError::CooldownActive { remaining_ms: 1, .. })));

        clock.advance(1);
        let second = registry.execute_agent(&ExecutionContext::new("a", "t", "s3")).await.unwrap();
        assert!(second.success);
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_single_flight() {
        let registry = Arc::new(AgentRegistry::new());
        let handler = Arc::new(ScriptedHandler::new().with_delay(Duration::from_millis(50)));
        registry.register_agent(def("a"), handler.clone(), vec![]).await.unwrap();

        let r1 = registry.clone();
        let r2 = registry.clone();
        let (a, b) = tokio::join!(
            async move { r1.execute_agent(&ExecutionContext::new("a", "t", "s1")).await },
            async move { r2.execute_agent(&ExecutionContext::new("a", "t", "s2")).await },
        );

        let outcomes = [a, b];
        let ok = outcomes.iter().filter(|r| r.is_ok()).count();
        let busy = outcomes
            .iter()
            .filter(|r| matches!(r, Err(AgentError::AgentBusy(_))))
            .count();
        assert_eq!(ok, 1);
        assert_eq!(busy, 1);
        assert_eq!(handler.max_in_flight.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(registry.get_agent("a").await.unwrap().metadata.total_sessions, 1);
    }

    #[tokio::test]
    async fn test_unregister_refused_while_busy() {
        let registry = Arc::new(AgentRegistry::new());
        let handler = Arc::new(ScriptedHandler::new().with_delay(Duration::from_millis(100)));
        registry.register_agent(def("a"), handler, vec![]).await.unwrap();

        let running = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.execute_agent(&ExecutionContext::new("a", "t", "s1")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(registry.unregister_agent("a").await, Err(AgentError::AgentBusy(_))));
        assert!(running.await.unwrap().unwrap().success);
        assert!(registry.unregister_agent("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_abandoned_call_still_returns_agent_to_idle() {
        let registry = AgentRegistry::new();
        let handler = Arc::new(ScriptedHandler::new().with_delay(Duration::from_millis(50)));
        registry.register_agent(def("a"), handler.clone(), vec![]).await.unwrap();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            registry.execute_agent(&ExecutionContext::new("a", "t", "s1")),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;

        let snap = registry.get_agent("a").await.unwrap();
        assert_eq!(handler.calls(), 1);
        assert_eq!(snap.status(), AgentStatus::Idle);
        assert!(snap.runtime.active_sessions.is_empty());
        assert_eq!(snap.metadata.total_sessions, 1);

        let next = registry.execute_agent(&ExecutionContext::new("a", "t", "s2")).await.unwrap();
        assert!(next.success);
        assert!(registry.unregister_agent("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_unbounded_cooldown_does_not_overflow() {
        let clock = Arc::new(ManualClock::new(1_000));
        let registry = AgentRegistry::with_clock(clock.clone());
        registry
            .register_agent(
                def("a")
                    .with_capability(Capability::new("forever").with_cooldown(i64::MAX))
                    .with_memory(MemoryType::Session, Some(i64::MAX), None),
                Arc::new(ScriptedHandler::new()),
                vec![],
            )
            .await
            .unwrap();

        let first = registry.execute_agent(&ExecutionContext::new("a", "t", "s1")).await.unwrap();
        assert!(first.success);

        let snap = registry.get_agent("a").await.unwrap();
        assert_eq!(snap.status(), AgentStatus::Idle);
        assert_eq!(snap.runtime.cooldown_until, Some(i64::MAX));
        assert!(snap.runtime.memory.contains_key("session_s1"));

        clock.advance(1_000_000);
        let blocked = registry.execute_agent(&ExecutionContext::new("a", "t", "s2")).await;
        assert!(matches!(blocked, Err(AgentError::CooldownActive { .. })));
    }

    #[tokio::test]
    async fn test_declined_result_writes_no_memory() {
        let registry = AgentRegistry::new();
        let handler = ScriptedHandler::with_steps(vec![
            Step::Decline("out of scope".into()),
            Step::Succeed { cost: 0.0, advance_ms: 0 },
        ]);
        registry
            .register_agent(def("a").with_memory(MemoryType::Session, None, None), Arc::new(handler), vec![])
            .await
            .unwrap();

        let declined = registry.execute_agent(&ExecutionContext::new("a", "t", "s1")).await.unwrap();
        assert!(!declined.success);
        let snap = registry.get_agent("a").await.unwrap();
        assert!(snap.runtime.memory.is_empty());
        assert_eq!(snap.metadata.last_error.as_deref(), Some("out of scope"));

        registry.execute_agent(&ExecutionContext::new("a", "t", "s2")).await.unwrap();
        let memory = registry.get_agent_memory_snapshot("a").await.unwrap();
        assert_eq!(memory.len(), 1);
        assert!(memory.contains_key("session_s2"));
    }
}
