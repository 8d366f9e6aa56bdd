//! Agent 的模型分配数据
//!
//! 每个 agent 一份 AgentLlmAssignment：按优先级降序排列的候选模型配置 + 可选 fallback 模型。
//! agent_params 是不透明的参数包，执行核心只透传、不解释。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 参数包里允许出现的值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

impl From<&ParamValue> for Value {
    fn from(value: &ParamValue) -> Self {
        match value {
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Integer(i) => Value::from(*i),
            ParamValue::Float(f) => Value::from(*f),
            ParamValue::Text(s) => Value::String(s.clone()),
            ParamValue::List(items) => Value::Array(items.iter().map(Value::from).collect()),
            ParamValue::Map(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect()),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Integer(i)
    }
}

impl From<f64> for ParamValue {
    fn from(f: f64) -> Self {
        ParamValue::Float(f)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

/// 单个候选模型配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentLlmConfig {
    /// 写入时由所属 assignment 覆盖，不信任输入
    #[serde(default)]
    pub agent_id: String,
    pub model_key: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub agent_params: BTreeMap<String, ParamValue>,
}

fn default_enabled() -> bool {
    true
}

impl AgentLlmConfig {
    pub fn new(model_key: impl Into<String>, priority: i32) -> Self {
        Self {
            agent_id: String::new(),
            model_key: model_key.into(),
            priority,
            enabled: true,
            max_tokens: None,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            agent_params: BTreeMap::new(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_stop_sequences(mut self, stop: Vec<String>) -> Self {
        self.stop_sequences = Some(stop);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.agent_params.insert(key.into(), value.into());
        self
    }

    /// 投影为调用参数
    pub fn params(&self) -> LlmParams {
        LlmParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            stop_sequences: self.stop_sequences.clone(),
            agent_params: self.agent_params.clone(),
        }
    }
}

/// 一个 agent 的全部分配
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentLlmAssignment {
    pub agent_id: String,
    #[serde(default)]
    pub configs: Vec<AgentLlmConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,
}

impl AgentLlmAssignment {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            configs: Vec::new(),
            fallback_model: None,
        }
    }

    pub fn with_config(mut self, config: AgentLlmConfig) -> Self {
        self.configs.push(config);
        self.normalize();
        self
    }

    pub fn with_fallback(mut self, model_key: impl Into<String>) -> Self {
        self.fallback_model = Some(model_key.into());
        self
    }

    /// 覆盖每个条目的 agent_id，并按优先级降序稳定排序
    pub fn normalize(&mut self) {
        for config in &mut self.configs {
            config.agent_id = self.agent_id.clone();
        }
        self.configs.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// 同 model_key 的条目被替换
    pub fn upsert(&mut self, config: AgentLlmConfig) {
        match self.configs.iter_mut().find(|c| c.model_key == config.model_key) {
            Some(existing) => *existing = config,
            None => self.configs.push(config),
        }
        self.normalize();
    }

    pub fn config_for(&self, model_key: &str) -> Option<&AgentLlmConfig> {
        self.configs.iter().find(|c| c.model_key == model_key)
    }

    /// 按优先级取第一个启用且可用的模型，否则取可用的 fallback
    pub fn resolve<S: AsRef<str>>(&self, available: &[S]) -> Option<String> {
        let is_available = |key: &str| available.iter().any(|a| a.as_ref() == key);
        self.configs
            .iter()
            .find(|c| c.enabled && is_available(&c.model_key))
            .map(|c| c.model_key.clone())
            .or_else(|| {
                self.fallback_model
                    .as_ref()
                    .filter(|fallback| is_available(fallback))
                    .cloned()
            })
    }
}

/// 注入执行上下文的模型参数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default)]
    pub agent_params: BTreeMap<String, ParamValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_overrides_agent_id_and_sorts() {
        let mut config = AgentLlmConfig::new("low", 1);
        config.agent_id = "someone-else".into();
        let assignment = AgentLlmAssignment::new("writer")
            .with_config(config)
            .with_config(AgentLlmConfig::new("high", 9))
            .with_config(AgentLlmConfig::new("mid", 5));

        let keys: Vec<_> = assignment.configs.iter().map(|c| c.model_key.as_str()).collect();
        assert_eq!(keys, vec!["high", "mid", "low"]);
        assert!(assignment.configs.iter().all(|c| c.agent_id == "writer"));
    }

    #[test]
    fn test_upsert_replaces_same_model() {
        let mut assignment = AgentLlmAssignment::new("a").with_config(AgentLlmConfig::new("m1", 1));
        assignment.upsert(AgentLlmConfig::new("m1", 7).with_temperature(0.2));
        assert_eq!(assignment.configs.len(), 1);
        assert_eq!(assignment.configs[0].priority, 7);
        assert_eq!(assignment.config_for("m1").unwrap().temperature, Some(0.2));
    }

    #[test]
    fn test_param_value_round_trips_through_json() {
        let raw = json!({ "style": "terse", "retries": 2, "ratio": 0.5, "flags": [true, "x"], "nested": { "k": 1 } });
        let params: BTreeMap<String, ParamValue> = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(params["retries"], ParamValue::Integer(2));
        assert_eq!(params["ratio"], ParamValue::Float(0.5));

        let back: serde_json::Map<String, Value> = params.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect();
        assert_eq!(Value::Object(back), raw);
    }

    #[test]
    fn test_params_projection_skips_unset_fields() {
        let params = AgentLlmConfig::new("m1", 1)
            .with_max_tokens(256)
            .with_param("tone", "formal")
            .params();
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value, json!({ "maxTokens": 256, "agentParams": { "tone": "formal" } }));
    }
}
