//! 从 TOML 文件加载工作流定义
//!
//! ```toml
//! id = "review"
//! name = "Draft and review"
//!
//! [[steps]]
//! id = "draft"
//! agent_id = "writer"
//! task = "Write a draft"
//!
//! [[steps]]
//! id = "review"
//! agent_id = "editor"
//! task = "Review the draft"
//! dependencies = ["draft"]
//! ```

use std::path::Path;

use super::types::WorkflowDefinition;
use crate::core::{AgentError, AgentResult};

pub fn parse_workflow(content: &str) -> AgentResult<WorkflowDefinition> {
    let workflow: WorkflowDefinition =
        toml::from_str(content).map_err(|e| AgentError::InvalidWorkflow(e.to_string()))?;
    workflow.validate()?;
    Ok(workflow)
}

pub fn load_workflow_file(path: impl AsRef<Path>) -> AgentResult<WorkflowDefinition> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| AgentError::Storage(format!("{}: {}", path.display(), e)))?;
    parse_workflow(&content)
}

/// 目录下所有 *.toml，按文件名排序；目录不存在时返回空
pub fn load_workflow_dir(dir: impl AsRef<Path>) -> AgentResult<Vec<WorkflowDefinition>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| AgentError::Storage(format!("{}: {}", dir.display(), e)))?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    paths.sort();

    paths.iter().map(load_workflow_file).collect()
}
