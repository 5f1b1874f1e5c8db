//! 重复提交保护
//!
//! 每个币种记住最近一次成功提交的 {收款地址, 金额, 时间}；
//! 窗口期内向同一地址再次提交会被拒绝，除非 UI 已经让用户确认过

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use crate::{
    error::{BlocksoftError, Result},
    infrastructure::SharedClock,
};

/// 最近一次成功提交
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRecord {
    pub address_to: String,
    pub amount: String,
    pub submitted_at_ms: i64,
}

#[derive(Default)]
struct GuardState {
    last_sent: HashMap<String, SendRecord>,
    /// 已预留但尚未被网络接受的提交
    in_flight: HashMap<String, Vec<String>>,
}

struct GuardInner {
    window: Duration,
    clock: SharedClock,
    state: Mutex<GuardState>,
}

impl GuardInner {
    fn lock(&self) -> MutexGuard<'_, GuardState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// 进程级共享，按币种隔离
#[derive(Clone)]
pub struct DoubleSendGuard {
    inner: Arc<GuardInner>,
}

impl DoubleSendGuard {
    pub fn new(window: Duration, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                window,
                clock,
                state: Mutex::new(GuardState::default()),
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// 预留一次提交
    ///
    /// `check = false` 时跳过重复检查（用户已确认），但仍会登记
    pub fn reserve(
        &self,
        currency_code: &str,
        address_to: &str,
        amount: &str,
        check: bool,
    ) -> Result<GuardTicket> {
        let mut state = self.inner.lock();

        if check {
            let now = self.inner.clock.now_ms();
            let window_ms = self.inner.window.as_millis() as i64;
            let recent = state.last_sent.get(currency_code).is_some_and(|r| {
                r.address_to == address_to && now - r.submitted_at_ms < window_ms
            });
            let pending = state
                .in_flight
                .get(currency_code)
                .is_some_and(|list| list.iter().any(|a| a == address_to));

            if recent || pending {
                crate::metrics::inc_double_send_blocked(currency_code);
                tracing::warn!(
                    currency = %currency_code,
                    address_to = %crate::infrastructure::log_redact::redact_address(address_to),
                    in_flight = pending,
                    "Duplicate submission blocked"
                );
                return Err(BlocksoftError::DuplicateSubmission {
                    currency_code: currency_code.to_string(),
                    address_to: address_to.to_string(),
                });
            }
        }

        state
            .in_flight
            .entry(currency_code.to_string())
            .or_default()
            .push(address_to.to_string());

        Ok(GuardTicket {
            inner: self.inner.clone(),
            currency_code: currency_code.to_string(),
            address_to: address_to.to_string(),
            amount: amount.to_string(),
            settled: false,
        })
    }

    pub fn last_sent(&self, currency_code: &str) -> Option<SendRecord> {
        self.inner.lock().last_sent.get(currency_code).cloned()
    }
}

/// 预留凭证：commit 后写入记录；未 commit 就 Drop 则撤销预留
pub struct GuardTicket {
    inner: Arc<GuardInner>,
    currency_code: String,
    address_to: String,
    amount: String,
    settled: bool,
}

impl GuardTicket {
    fn release(&self, state: &mut GuardState) {
        if let Some(list) = state.in_flight.get_mut(&self.currency_code) {
            if let Some(pos) = list.iter().position(|a| *a == self.address_to) {
                list.remove(pos);
            }
            if list.is_empty() {
                state.in_flight.remove(&self.currency_code);
            }
        }
    }

    /// 网络已接受
    pub fn commit(mut self) {
        let now = self.inner.clock.now_ms();
        let mut state = self.inner.lock();
        self.release(&mut state);
        state.last_sent.insert(
            self.currency_code.clone(),
            SendRecord {
                address_to: self.address_to.clone(),
                amount: self.amount.clone(),
                submitted_at_ms: now,
            },
        );
        drop(state);
        self.settled = true;
    }
}

impl Drop for GuardTicket {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let inner = self.inner.clone();
        let mut state = inner.lock();
        self.release(&mut state);
    }
}
