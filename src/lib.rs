//! 高并发链式哈希表库
//!
//! 提供细粒度读写锁保护的泛型并发哈希表，面向读多写少、各工作线程
//! 操作互不相交键区间的场景。
//!
//! ## 主要特性
//! - 容器 / 桶 / 槽位三级锁层次，不同桶的操作完全独立
//! - 墓碑删除加桶内压缩，迭代器存活期间槽位不被回收
//! - 线程本地锁注册表，同线程持迭代器再修改同一桶不自死锁
//! - 质数阶梯扩容重哈希
//! - 可选的锁获取延迟统计与 Prometheus 导出
//!
//! ## 快速开始
//!
//! ```rust
//! use chained_hashtable::ChainedMap;
//!
//! let map: ChainedMap<u64, String> = ChainedMap::new();
//!
//! // 插入键值对
//! let (_it, inserted) = map.insert(7, "seven".to_string());
//! assert!(inserted);
//!
//! // 查找
//! let it = map.find(&7);
//! assert_eq!(it.value().unwrap(), "seven");
//! drop(it);
//!
//! // 删除
//! assert!(map.erase(&7));
//! assert!(map.find(&7).is_end());
//! assert_eq!(map.size(), 0);
//! ```

#![warn(clippy::all)]

#[cfg(feature = "logging")]
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        log::debug!($($arg)*)
    };
}

#[cfg(feature = "logging")]
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        log::info!($($arg)*)
    };
}

#[cfg(feature = "logging")]
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        log::warn!($($arg)*)
    };
}

#[cfg(feature = "logging")]
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        log::error!($($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "logging"))]
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "logging"))]
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "logging"))]
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {};
}

// 核心模块导出
pub mod error;
pub mod hash;
pub mod lock;
pub mod map;
pub mod stats;
pub mod types;

// 公共接口导出
pub use crate::{
    error::MapError,
    hash::{is_prime, next_prime, HashAlgorithm, SelectableBuildHasher, PRIME_LADDER},
    map::{
        ChainedMap, ChainedMapConfig, ChainedMapStats, Iter, PairIter, DEFAULT_BUCKET_COUNT,
        DEFAULT_ERASE_THRESHOLD,
    },
    stats::{
        disable_stats, enable_stats, export_prometheus, lock_stats_snapshot, reset_stats,
        stats_enabled, LockMetricsSnapshot,
    },
    types::{Key, LockMode, Value},
};

// 简化默认类型别名
pub type DefaultMap = ChainedMap<String, String>;
