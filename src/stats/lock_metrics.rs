// src/stats/lock_metrics.rs
//! 锁获取延迟计数器 - 按模式累计次数与耗时

use crate::types::LockMode;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Default)]
struct ModeCounters {
    count: AtomicU64,
    total_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl ModeCounters {
    fn record(&self, elapsed: Duration) {
        let nanos = elapsed.as_nanos().min(u64::MAX as u128) as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.max_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.total_nanos.store(0, Ordering::Relaxed);
        self.max_nanos.store(0, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ModeSnapshot {
        ModeSnapshot {
            count: self.count.load(Ordering::Relaxed),
            total_nanos: self.total_nanos.load(Ordering::Relaxed),
            max_nanos: self.max_nanos.load(Ordering::Relaxed),
        }
    }
}

/// 单一模式的统计快照
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeSnapshot {
    pub count: u64,
    pub total_nanos: u64,
    pub max_nanos: u64,
}

impl ModeSnapshot {
    /// 平均获取耗时（纳秒）
    pub fn average_nanos(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total_nanos as f64 / self.count as f64
    }
}

/// 读写两种模式的统计快照
#[derive(Debug, Clone, Copy, Default)]
pub struct LockMetricsSnapshot {
    pub read: ModeSnapshot,
    pub write: ModeSnapshot,
}

/// 锁延迟记录器
pub struct LockStatsRecorder {
    enabled: AtomicBool,
    read: ModeCounters,
    write: ModeCounters,
}

impl LockStatsRecorder {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            read: ModeCounters::default(),
            write: ModeCounters::default(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::Relaxed);
    }

    pub fn record(&self, mode: LockMode, elapsed: Duration) {
        match mode {
            LockMode::Read => self.read.record(elapsed),
            LockMode::Write => self.write.record(elapsed),
        }
    }

    pub fn reset(&self) {
        self.read.reset();
        self.write.reset();
    }

    pub fn snapshot(&self) -> LockMetricsSnapshot {
        LockMetricsSnapshot {
            read: self.read.snapshot(),
            write: self.write.snapshot(),
        }
    }

    pub fn export_prometheus(&self) -> String {
        let snap = self.snapshot();
        let mut output = String::new();
        for (mode, s) in [(LockMode::Read, snap.read), (LockMode::Write, snap.write)] {
            output.push_str(&format!(
                "chained_lock_acquire_count{{mode=\"{}\"}} {}\n",
                mode.label(),
                s.count
            ));
            output.push_str(&format!(
                "chained_lock_acquire_nanos_total{{mode=\"{}\"}} {}\n",
                mode.label(),
                s.total_nanos
            ));
            output.push_str(&format!(
                "chained_lock_acquire_nanos_max{{mode=\"{}\"}} {}\n",
                mode.label(),
                s.max_nanos
            ));
        }
        output
    }
}

impl Default for LockStatsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
