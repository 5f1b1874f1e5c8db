// 扫描富化结果的持久缓存
//
// 已到最终状态的交易富化结果（输入输出、区块信息）写入这里，
// 下次扫描直接复用，不再请求提供方

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::error::{BlocksoftError, Result};

#[async_trait]
pub trait TxEnrichmentStore: Send + Sync {
    async fn get_cache(&self, key: &str) -> Result<Option<serde_json::Value>>;

    async fn save_cache(&self, key: &str, value: serde_json::Value) -> Result<()>;
}

/// 内存实现（进程退出即丢失）
#[derive(Default)]
pub struct MemoryEnrichmentStore {
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryEnrichmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl TxEnrichmentStore for MemoryEnrichmentStore {
    async fn get_cache(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn save_cache(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// JSON 文件实现：整表读入内存，每次写入后整体落盘
pub struct JsonFileEnrichmentStore {
    path: PathBuf,
    entries: Mutex<Option<HashMap<String, serde_json::Value>>>,
}

impl JsonFileEnrichmentStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: Mutex::new(None),
        }
    }

    async fn load(&self) -> Result<HashMap<String, serde_json::Value>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(HashMap::new()),
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => Ok(map),
                Err(e) => {
                    // 损坏的缓存文件直接丢弃，重新富化即可
                    tracing::warn!(path = ?self.path, error = %e, "Discarding unreadable scan cache file");
                    Ok(HashMap::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(BlocksoftError::storage(format!(
                "read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn persist(&self, entries: &HashMap<String, serde_json::Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| BlocksoftError::storage(format!("mkdir {}: {}", parent.display(), e)))?;
            }
        }
        let content = serde_json::to_string(entries)
            .map_err(|e| BlocksoftError::storage(format!("encode scan cache: {}", e)))?;

        // 先写临时文件再 rename，避免半截文件
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| BlocksoftError::storage(format!("write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| BlocksoftError::storage(format!("rename {}: {}", self.path.display(), e)))
    }
}

#[async_trait]
impl TxEnrichmentStore for JsonFileEnrichmentStore {
    async fn get_cache(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        Ok(guard.as_ref().and_then(|m| m.get(key).cloned()))
    }

    async fn save_cache(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let mut guard = self.entries.lock().await;
        let mut entries = match guard.take() {
            Some(map) => map,
            None => self.load().await?,
        };
        entries.insert(key.to_string(), value);
        let result = self.persist(&entries).await;
        *guard = Some(entries);
        result
    }
}
