//! 限时结果缓存
//!
//! 按地址（或 地址+交易哈希）缓存提供方结果：
//! - 只有 `now - fetched_at < ttl` 的条目可用
//! - 链高度更低的结果不会覆盖已有条目

use std::{
    collections::HashMap,
    sync::RwLock,
    time::Duration,
};

use crate::infrastructure::clock::SharedClock;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub payload: T,
    pub fetched_at_ms: i64,
    pub provider: String,
    pub scan_block: Option<u64>,
}

/// 写入结果
#[derive(Debug, Clone, PartialEq)]
pub enum CacheWrite<T> {
    Stored(CacheEntry<T>),
    /// 已有条目链高度更高，新结果被丢弃
    KeptNewer(CacheEntry<T>),
}

impl<T> CacheWrite<T> {
    pub fn into_entry(self) -> CacheEntry<T> {
        match self {
            Self::Stored(entry) | Self::KeptNewer(entry) => entry,
        }
    }
}

pub struct ResultCache<T> {
    name: &'static str,
    ttl: Duration,
    clock: SharedClock,
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> ResultCache<T> {
    pub fn new(name: &'static str, ttl: Duration, clock: SharedClock) -> Self {
        Self {
            name,
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &CacheEntry<T>) -> bool {
        let age_ms = self.clock.now_ms() - entry.fetched_at_ms;
        age_ms < self.ttl.as_millis() as i64
    }

    /// TTL 内的条目
    pub fn get_fresh(&self, key: &str) -> Option<CacheEntry<T>> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let hit = entries.get(key).filter(|e| self.is_fresh(e)).cloned();
        if hit.is_some() {
            crate::metrics::inc_cache_hit(self.name);
        } else {
            crate::metrics::inc_cache_miss(self.name);
        }
        hit
    }

    /// 不论是否过期
    pub fn get_any(&self, key: &str) -> Option<CacheEntry<T>> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.get(key).cloned()
    }

    /// 原子写入；拒绝链高度回退
    pub fn store(
        &self,
        key: &str,
        payload: T,
        provider: &str,
        scan_block: Option<u64>,
    ) -> CacheWrite<T> {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(existing) = entries.get(key) {
            if let (Some(old), Some(new)) = (existing.scan_block, scan_block) {
                if old > new {
                    tracing::debug!(
                        cache = self.name,
                        key = %key,
                        cached_block = old,
                        fetched_block = new,
                        "Ignoring stale provider result"
                    );
                    return CacheWrite::KeptNewer(existing.clone());
                }
            }
        }

        let entry = CacheEntry {
            payload,
            fetched_at_ms: self.clock.now_ms(),
            provider: provider.to_string(),
            scan_block,
        };
        entries.insert(key.to_string(), entry.clone());
        CacheWrite::Stored(entry)
    }

    pub fn invalidate(&self, key: &str) {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.remove(key);
    }

    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
