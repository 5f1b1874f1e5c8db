//! 进程内指标，按 Prometheus 文本格式导出

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, OnceLock},
};

static METRICS: OnceLock<Mutex<MetricsState>> = OnceLock::new();

#[derive(Default)]
struct MetricsState {
    // 提供方成功/失败与时延统计（毫秒）
    provider_ok: HashMap<String, u64>,
    provider_err: HashMap<String, u64>,
    provider_latency_sum_ms: u128,
    // 简易直方图分桶（毫秒）：<50, <100, <250, <500, <1000, >=1000
    provider_hist_buckets: [u64; 6],
    cache_hits: HashMap<&'static str, u64>,
    cache_misses: HashMap<&'static str, u64>,
    double_send_blocked: HashMap<String, u64>,
    tx_submitted: HashMap<String, u64>,
    tx_failed: HashMap<String, u64>,
}

fn state() -> MutexGuard<'static, MetricsState> {
    let lock = METRICS.get_or_init(|| Mutex::new(MetricsState::default()));
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(), // 避免因锁污染导致 panic
    }
}

fn bucket_index(latency_ms: u128) -> usize {
    if latency_ms < 50 {
        0
    } else if latency_ms < 100 {
        1
    } else if latency_ms < 250 {
        2
    } else if latency_ms < 500 {
        3
    } else if latency_ms < 1000 {
        4
    } else {
        5
    }
}

pub fn observe_provider_latency_ms(provider: &str, latency_ms: u128, ok: bool) {
    let mut s = state();
    let counter = if ok {
        &mut s.provider_ok
    } else {
        &mut s.provider_err
    };
    *counter.entry(provider.to_string()).or_insert(0) += 1;
    s.provider_latency_sum_ms += latency_ms;
    s.provider_hist_buckets[bucket_index(latency_ms)] += 1;
}

pub fn inc_cache_hit(cache: &'static str) {
    *state().cache_hits.entry(cache).or_insert(0) += 1;
}

pub fn inc_cache_miss(cache: &'static str) {
    *state().cache_misses.entry(cache).or_insert(0) += 1;
}

pub fn inc_double_send_blocked(currency_code: &str) {
    *state()
        .double_send_blocked
        .entry(currency_code.to_string())
        .or_insert(0) += 1;
}

pub fn inc_tx_submitted(currency_code: &str) {
    *state()
        .tx_submitted
        .entry(currency_code.to_string())
        .or_insert(0) += 1;
}

pub fn inc_tx_failed(currency_code: &str) {
    *state()
        .tx_failed
        .entry(currency_code.to_string())
        .or_insert(0) += 1;
}

pub fn double_send_blocked_total(currency_code: &str) -> u64 {
    state()
        .double_send_blocked
        .get(currency_code)
        .copied()
        .unwrap_or(0)
}

fn push_labeled<K: std::fmt::Display>(
    out: &mut String,
    name: &str,
    help: &str,
    label: &str,
    values: &HashMap<K, u64>,
) {
    out.push_str(&format!("# HELP {} {}\n", name, help));
    out.push_str(&format!("# TYPE {} counter\n", name));
    let mut rows: Vec<_> = values.iter().map(|(k, v)| (k.to_string(), *v)).collect();
    rows.sort();
    for (k, v) in rows {
        out.push_str(&format!("{}{{{}=\"{}\"}} {}\n", name, label, k, v));
    }
}

pub fn render_prometheus() -> String {
    let s = state();
    let mut out = String::new();

    push_labeled(
        &mut out,
        "blocksoft_provider_requests_ok_total",
        "Successful provider requests",
        "provider",
        &s.provider_ok,
    );
    push_labeled(
        &mut out,
        "blocksoft_provider_requests_err_total",
        "Failed provider requests",
        "provider",
        &s.provider_err,
    );

    out.push_str("# HELP blocksoft_provider_latency_ms_sum Sum of provider latency in ms\n");
    out.push_str("# TYPE blocksoft_provider_latency_ms_sum counter\n");
    out.push_str(&format!(
        "blocksoft_provider_latency_ms_sum {}\n",
        s.provider_latency_sum_ms
    ));

    out.push_str("# HELP blocksoft_provider_latency_ms_bucket Provider latency histogram buckets\n");
    out.push_str("# TYPE blocksoft_provider_latency_ms_bucket histogram\n");
    let bounds = [50, 100, 250, 500, 1000];
    let mut cumulative = 0u64;
    for (i, bound) in bounds.iter().enumerate() {
        cumulative += s.provider_hist_buckets[i];
        out.push_str(&format!(
            "blocksoft_provider_latency_ms_bucket{{le=\"{}\"}} {}\n",
            bound, cumulative
        ));
    }
    out.push_str(&format!(
        "blocksoft_provider_latency_ms_bucket{{le=\"+Inf\"}} {}\n",
        s.provider_hist_buckets.iter().sum::<u64>()
    ));

    push_labeled(
        &mut out,
        "blocksoft_cache_hits_total",
        "Result cache hits",
        "cache",
        &s.cache_hits,
    );
    push_labeled(
        &mut out,
        "blocksoft_cache_misses_total",
        "Result cache misses",
        "cache",
        &s.cache_misses,
    );
    push_labeled(
        &mut out,
        "blocksoft_double_send_blocked_total",
        "Submissions rejected by the double-send window",
        "currency",
        &s.double_send_blocked,
    );
    push_labeled(
        &mut out,
        "blocksoft_tx_submitted_total",
        "Transactions accepted by the network",
        "currency",
        &s.tx_submitted,
    );
    push_labeled(
        &mut out,
        "blocksoft_tx_failed_total",
        "Transaction submissions that failed",
        "currency",
        &s.tx_failed,
    );

    out
}
