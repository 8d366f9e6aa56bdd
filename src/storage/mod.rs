//! 键值存储
//!
//! LLM 分配策略只通过 KeyValueStore 持久化自己的配置表（单个固定 key，值为 JSON 字符串）。
//! - **memory**: 进程内存储（测试 / 无持久化需求时）
//! - **file**: 单文件 JSON 对象存储

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

/// 持久化键值存储
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn set(&self, key: &str, value: String) -> anyhow::Result<()>;

    /// 删除不存在的 key 不报错
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}
