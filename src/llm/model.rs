//! 模型描述与模型提供方
//!
//! 执行核心只关心「当前启用了哪些模型」和「按 key 取模型配置」，具体调用 LLM 的服务不在这里。

use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 模型描述（key 全局唯一）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub key: String,
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// 每千 token 成本
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ModelDescriptor {
    pub fn new(key: impl Into<String>, provider: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            provider: provider.into(),
            max_tokens: None,
            cost_per_1k_tokens: 0.0,
            enabled: true,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_cost(mut self, cost_per_1k_tokens: f64) -> Self {
        self.cost_per_1k_tokens = cost_per_1k_tokens;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// 模型提供方
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// 当前启用的模型
    async fn enabled_models(&self) -> Vec<ModelDescriptor>;

    /// 按 key 查找（不论是否启用）
    async fn model(&self, key: &str) -> Option<ModelDescriptor>;
}

/// 静态模型表，按加入顺序返回
#[derive(Debug, Default)]
pub struct StaticModelProvider {
    models: RwLock<Vec<ModelDescriptor>>,
}

impl StaticModelProvider {
    pub fn new(models: Vec<ModelDescriptor>) -> Self {
        Self {
            models: RwLock::new(models),
        }
    }

    /// 加入或替换同 key 的模型
    pub fn upsert(&self, model: ModelDescriptor) {
        if let Ok(mut models) = self.models.write() {
            match models.iter_mut().find(|m| m.key == model.key) {
                Some(existing) => *existing = model,
                None => models.push(model),
            }
        }
    }

    pub fn enable(&self, key: &str) -> bool {
        self.set_enabled(key, true)
    }

    pub fn disable(&self, key: &str) -> bool {
        self.set_enabled(key, false)
    }

    fn set_enabled(&self, key: &str, enabled: bool) -> bool {
        let Ok(mut models) = self.models.write() else {
            return false;
        };
        match models.iter_mut().find(|m| m.key == key) {
            Some(model) => {
                model.enabled = enabled;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ModelProvider for StaticModelProvider {
    async fn enabled_models(&self) -> Vec<ModelDescriptor> {
        self.models
            .read()
            .map(|models| models.iter().filter(|m| m.enabled).cloned().collect())
            .unwrap_or_default()
    }

    async fn model(&self, key: &str) -> Option<ModelDescriptor> {
        self.models
            .read()
            .ok()
            .and_then(|models| models.iter().find(|m| m.key == key).cloned())
    }
}
