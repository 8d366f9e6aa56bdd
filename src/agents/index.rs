//! Agent 二级索引：按类型、专长、标签查找，并记录注册顺序
//!
//! 只由 AgentRegistry 在持有写锁时修改，与主表保持同步。

use std::collections::{BTreeSet, HashMap};

use super::types::{AgentDefinition, AgentId, AgentType};

#[derive(Debug, Default)]
pub struct AgentIndex {
    order: Vec<AgentId>,
    by_type: HashMap<AgentType, BTreeSet<AgentId>>,
    by_specialization: HashMap<String, BTreeSet<AgentId>>,
    by_tag: HashMap<String, BTreeSet<AgentId>>,
}

impl AgentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, definition: &AgentDefinition) {
        let id = &definition.id;
        if !self.order.contains(id) {
            self.order.push(id.clone());
        }
        self.by_type
            .entry(definition.agent_type)
            .or_default()
            .insert(id.clone());
        for spec in &definition.specialization {
            self.by_specialization
                .entry(spec.to_lowercase())
                .or_default()
                .insert(id.clone());
        }
        for tag in &definition.tags {
            self.by_tag
                .entry(tag.to_lowercase())
                .or_default()
                .insert(id.clone());
        }
    }

    pub fn remove(&mut self, definition: &AgentDefinition) {
        let id = &definition.id;
        self.order.retain(|x| x != id);
        remove_from(&mut self.by_type, &definition.agent_type, id);
        for spec in &definition.specialization {
            remove_from(&mut self.by_specialization, &spec.to_lowercase(), id);
        }
        for tag in &definition.tags {
            remove_from(&mut self.by_tag, &tag.to_lowercase(), id);
        }
    }

    /// 注册顺序
    pub fn ids(&self) -> &[AgentId] {
        &self.order
    }

    pub fn by_type(&self, agent_type: AgentType) -> Vec<AgentId> {
        self.ordered(self.by_type.get(&agent_type))
    }

    pub fn by_specialization(&self, specialization: &str) -> Vec<AgentId> {
        self.ordered(self.by_specialization.get(&specialization.to_lowercase()))
    }

    pub fn by_tag(&self, tag: &str) -> Vec<AgentId> {
        self.ordered(self.by_tag.get(&tag.to_lowercase()))
    }

    /// 不区分大小写的子串匹配：id、名称、描述、标签、专长
    pub fn search<'a, F>(&self, query: &str, lookup: F) -> Vec<AgentId>
    where
        F: Fn(&str) -> Option<&'a AgentDefinition>,
    {
        let needle = query.trim().to_lowercase();
        self.order
            .iter()
            .filter(|id| {
                let Some(def) = lookup(id.as_str()) else {
                    return false;
                };
                if needle.is_empty() {
                    return true;
                }
                def.id.to_lowercase().contains(&needle)
                    || def.name.to_lowercase().contains(&needle)
                    || def.description.to_lowercase().contains(&needle)
                    || def.tags.iter().any(|t| t.to_lowercase().contains(&needle))
                    || def
                        .specialization
                        .iter()
                        .any(|s| s.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }

    fn ordered(&self, set: Option<&BTreeSet<AgentId>>) -> Vec<AgentId> {
        match set {
            Some(set) => self.order.iter().filter(|id| set.contains(*id)).cloned().collect(),
            None => Vec::new(),
        }
    }
}

fn remove_from<K: std::hash::Hash + Eq>(map: &mut HashMap<K, BTreeSet<AgentId>>, key: &K, id: &str) {
    if let Some(set) = map.get_mut(key) {
        set.remove(id);
        if set.is_empty() {
            map.remove(key);
        }
    }
}
