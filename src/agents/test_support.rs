//! 单元测试用的可编排 handler

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::context::{ExecutionContext, ExecutionResult};
use super::handler::{AgentHandler, HandlerCapabilities};
use crate::core::ManualClock;

#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// 成功：上报成本，并把手动时钟推进 advance_ms（模拟耗时）
    Succeed { cost: f64, advance_ms: i64 },
    Fail(String),
    /// handler 正常返回，但结果标记为失败
    Decline(String),
}

#[derive(Default)]
pub(crate) struct ScriptedHandler {
    script: Mutex<VecDeque<Step>>,
    clock: Option<Arc<ManualClock>>,
    delay: Option<Duration>,
    fail_init: bool,
    pub calls: AtomicUsize,
    pub cleanups: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            ..Self::default()
        }
    }

    pub fn with_clock(mut self, clock: Arc<ManualClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_init() -> Self {
        Self {
            fail_init: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentHandler for ScriptedHandler {
    async fn execute(&self, context: &ExecutionContext) -> anyhow::Result<ExecutionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Succeed { cost: 0.0, advance_ms: 0 });
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match step {
            Step::Succeed { cost, advance_ms } => {
                if let Some(clock) = &self.clock {
                    clock.advance(advance_ms);
                }
                Ok(ExecutionResult::success(json!({ "task": context.task })).with_cost(cost))
            }
            Step::Fail(message) => Err(anyhow::anyhow!(message)),
            Step::Decline(message) => Ok(ExecutionResult::failure(message)),
        }
    }

    fn validate_task(&self, task: &str, _parameters: &Map<String, Value>) -> bool {
        task != "invalid"
    }

    fn capabilities(&self) -> HandlerCapabilities {
        HandlerCapabilities::default()
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        if self.fail_init {
            anyhow::bail!("init failed");
        }
        Ok(())
    }

    async fn cleanup(&self) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}
