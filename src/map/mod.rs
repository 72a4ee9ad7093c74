//! 哈希表核心模块 - 容器、桶、槽位与迭代器

pub mod bucket;
pub mod chained_map;
pub mod iterator;
pub mod slot;

pub use bucket::Bucket;
pub use chained_map::{ChainedMap, ChainedMapConfig, ChainedMapStats};
pub use iterator::{Iter, PairIter};
pub use slot::Slot;

use once_cell::sync::Lazy;

/// 全局默认配置
pub static DEFAULT_CONFIG: Lazy<ChainedMapConfig> = Lazy::new(ChainedMapConfig::default);

/// 默认桶数量，取自质数阶梯
pub const DEFAULT_BUCKET_COUNT: usize = 1361;

/// 默认压缩阈值：桶内存活密度低于 0.7 时删除后压缩
pub const DEFAULT_ERASE_THRESHOLD: f64 = 0.7;
