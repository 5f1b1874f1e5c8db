//! 会话内助记词缓存
//!
//! 容量和存活时间都有上限；淘汰、过期、clear 时值被清零

use std::{collections::VecDeque, time::Duration};

use zeroize::Zeroizing;

use crate::infrastructure::SharedClock;

struct CachedMnemonic {
    wallet_hash: String,
    mnemonic: Zeroizing<String>,
    inserted_at_ms: i64,
}

pub struct MnemonicCache {
    capacity: usize,
    ttl: Duration,
    clock: SharedClock,
    // 队首最旧
    entries: VecDeque<CachedMnemonic>,
}

impl MnemonicCache {
    pub fn new(capacity: usize, ttl: Duration, clock: SharedClock) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            clock,
            entries: VecDeque::new(),
        }
    }

    fn evict_expired(&mut self) {
        let now = self.clock.now_ms();
        let ttl_ms = self.ttl.as_millis() as i64;
        self.entries.retain(|e| now - e.inserted_at_ms < ttl_ms);
    }

    pub fn get(&mut self, wallet_hash: &str) -> Option<Zeroizing<String>> {
        self.evict_expired();
        self.entries
            .iter()
            .find(|e| e.wallet_hash == wallet_hash)
            .map(|e| e.mnemonic.clone())
    }

    pub fn insert(&mut self, wallet_hash: &str, mnemonic: Zeroizing<String>) {
        self.evict_expired();
        self.entries.retain(|e| e.wallet_hash != wallet_hash);
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(CachedMnemonic {
            wallet_hash: wallet_hash.to_string(),
            mnemonic,
            inserted_at_ms: self.clock.now_ms(),
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
