//! 统计模块 - 全局锁获取延迟采集
//!
//! 默认关闭，关闭时热路径上只剩一次 relaxed 原子读。

pub mod lock_metrics;

pub use lock_metrics::{LockMetricsSnapshot, LockStatsRecorder, ModeSnapshot};

use crate::types::LockMode;
use once_cell::sync::Lazy;
use std::time::{Duration, Instant};

static GLOBAL_RECORDER: Lazy<LockStatsRecorder> = Lazy::new(LockStatsRecorder::new);

/// 打开全局采集
pub fn enable_stats() {
    GLOBAL_RECORDER.set_enabled(true);
}

/// 关闭全局采集
pub fn disable_stats() {
    GLOBAL_RECORDER.set_enabled(false);
}

pub fn stats_enabled() -> bool {
    GLOBAL_RECORDER.enabled()
}

/// 采集开启时返回计时起点
pub(crate) fn acquire_timer() -> Option<Instant> {
    if GLOBAL_RECORDER.enabled() {
        Some(Instant::now())
    } else {
        None
    }
}

/// 记录一次真实加锁的耗时，计时器为空时什么都不做
pub(crate) fn record_lock_acquire(mode: LockMode, timer: Option<Instant>) {
    if let Some(start) = timer {
        GLOBAL_RECORDER.record(mode, start.elapsed());
    }
}

/// 直接记录一段耗时，测试与外部采集器使用
pub fn record_lock_duration(mode: LockMode, elapsed: Duration) {
    if GLOBAL_RECORDER.enabled() {
        GLOBAL_RECORDER.record(mode, elapsed);
    }
}

/// 获取统计快照
pub fn lock_stats_snapshot() -> LockMetricsSnapshot {
    GLOBAL_RECORDER.snapshot()
}

/// 重置所有统计
pub fn reset_stats() {
    GLOBAL_RECORDER.reset();
}

/// 导出 Prometheus 格式指标
pub fn export_prometheus() -> String {
    GLOBAL_RECORDER.export_prometheus()
}
