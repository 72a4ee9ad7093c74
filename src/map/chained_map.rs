//! 链式哈希表核心实现
//!
//! 固定桶向量加细粒度读写锁：容器级锁只有重哈希独占，其余操作在调
//! 用期间共享持有；桶锁串行化同桶的修改；槽位锁保护单个键值对并支
//! 撑迭代器的生存期。删除走墓碑路径，密度不足时由桶压缩回收。

use crate::error::MapError;
use crate::hash::{self, next_prime, HashAlgorithm, SelectableBuildHasher};
use crate::map::bucket::Bucket;
use crate::map::iterator::{Iter, PairIter};
use crate::map::slot::Slot;
use crate::map::{DEFAULT_BUCKET_COUNT, DEFAULT_CONFIG, DEFAULT_ERASE_THRESHOLD};
use crate::types::{Key, LockMode, Value};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// 哈希表配置
#[derive(Clone, Debug)]
pub struct ChainedMapConfig {
    /// 初始桶数量，建议取质数阶梯上的值
    pub bucket_count: usize,
    /// 桶内存活密度低于该阈值时删除后触发压缩
    pub erase_threshold: f64,
    /// 内置哈希算法选择，自定义 BuildHasher 时被忽略
    pub hash_algorithm: HashAlgorithm,
}

impl Default for ChainedMapConfig {
    fn default() -> Self {
        Self {
            bucket_count: DEFAULT_BUCKET_COUNT,
            erase_threshold: DEFAULT_ERASE_THRESHOLD,
            hash_algorithm: HashAlgorithm::AHash,
        }
    }
}

impl ChainedMapConfig {
    pub fn validate(&self) -> Result<(), MapError> {
        if self.bucket_count == 0 {
            return Err(MapError::InvalidConfig {
                reason: "bucket_count 不能为 0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.erase_threshold) {
            return Err(MapError::InvalidConfig {
                reason: format!("erase_threshold {} 超出 [0,1]", self.erase_threshold),
            });
        }
        if !hash::is_prime(self.bucket_count as u64) {
            crate::log_warn!("桶数量 {} 不是质数，哈希分布质量可能下降", self.bucket_count);
        }
        Ok(())
    }
}

/// 哈希表统计信息
#[derive(Debug, Clone, Default)]
pub struct ChainedMapStats {
    pub size: usize,
    pub bucket_count: usize,
    pub live_total: u64,
    pub erased_total: u64,
    pub allocated_slots: usize,
    pub active_iterators: usize,
}

/// 链式并发哈希表
///
/// 键经哈希函子定位到唯一的桶；同键操作由桶锁线性化，不同桶的操作
/// 完全独立。`size` 是最终一致的估计值，并发修改期间可能读到中间值。
///
/// 重哈希会使全部既有迭代器失效，调用方必须保证重哈希时没有存活的
/// 迭代器；debug 构建下违反此约定会触发断言。
pub struct ChainedMap<K: Key, V: Value, S = SelectableBuildHasher> {
    buckets: RwLock<Vec<Bucket<K, V>>>,
    hash_builder: S,
    live_total: AtomicU64,
    erased_total: AtomicU64,
    erase_threshold: f64,
    active_iterators: AtomicUsize,
}

impl<K: Key, V: Value> ChainedMap<K, V, SelectableBuildHasher> {
    /// 默认配置的哈希表
    pub fn new() -> Self {
        Self::build(&DEFAULT_CONFIG, SelectableBuildHasher::default())
    }

    /// 指定桶数量，其余取默认
    pub fn with_bucket_count(bucket_count: usize) -> Self {
        let config = ChainedMapConfig {
            // 桶数量至少为 1，避免取模除零
            bucket_count: bucket_count.max(1),
            ..ChainedMapConfig::default()
        };
        Self::build(&config, SelectableBuildHasher::new(config.hash_algorithm))
    }

    /// 从配置构建，内置算法由 `hash_algorithm` 决定
    pub fn with_config(config: ChainedMapConfig) -> Result<Self, MapError> {
        config.validate()?;
        let hasher = SelectableBuildHasher::new(config.hash_algorithm);
        Ok(Self::build(&config, hasher))
    }
}

impl<K: Key, V: Value> Default for ChainedMap<K, V, SelectableBuildHasher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key, V: Value, S: BuildHasher + Send + Sync> ChainedMap<K, V, S> {
    /// 从配置与外部哈希函子构建
    ///
    /// 函子须是纯函数且线程安全；配置中的 `hash_algorithm` 在此路径
    /// 下不生效。
    pub fn with_hasher(config: ChainedMapConfig, hash_builder: S) -> Result<Self, MapError> {
        config.validate()?;
        Ok(Self::build(&config, hash_builder))
    }

    fn build(config: &ChainedMapConfig, hash_builder: S) -> Self {
        let buckets = (0..config.bucket_count).map(|_| Bucket::new()).collect();
        Self {
            buckets: RwLock::new(buckets),
            hash_builder,
            live_total: AtomicU64::new(0),
            erased_total: AtomicU64::new(0),
            erase_threshold: config.erase_threshold,
            active_iterators: AtomicUsize::new(0),
        }
    }

    fn bucket_index_for(&self, key: &K, bucket_count: usize) -> usize {
        hash::bucket_index(&self.hash_builder, key, bucket_count)
    }

    /// 插入键值对
    ///
    /// 键已存活时不覆盖，返回指向既有槽位的迭代器与 `false`；命中墓
    /// 碑则复活改写；否则追加。返回的迭代器持写模式槽位锁，可直接通
    /// 过它改写值。
    pub fn insert(&self, key: K, value: V) -> (Iter<'_, K, V, S>, bool) {
        let buckets = self.buckets.read();
        let idx = self.bucket_index_for(&key, buckets.len());
        let (parts, inserted) = buckets[idx].insert(idx, key, value);
        drop(buckets);
        if inserted {
            self.live_total.fetch_add(1, Ordering::Release);
        }
        (Iter::live(self, parts), inserted)
    }

    /// 查找，返回持读模式槽位锁的迭代器，未命中为 end
    pub fn find(&self, key: &K) -> Iter<'_, K, V, S> {
        self.find_with_mode(key, LockMode::Read)
    }

    /// 查找，返回持写模式槽位锁的迭代器，可就地修改值而无需再次哈希
    pub fn find_mut(&self, key: &K) -> Iter<'_, K, V, S> {
        self.find_with_mode(key, LockMode::Write)
    }

    fn find_with_mode(&self, key: &K, mode: LockMode) -> Iter<'_, K, V, S> {
        let buckets = self.buckets.read();
        let idx = self.bucket_index_for(key, buckets.len());
        match buckets[idx].find(idx, key, mode) {
            Some(parts) => {
                drop(buckets);
                Iter::live(self, parts)
            }
            None => {
                drop(buckets);
                self.end()
            }
        }
    }

    /// 删除键，成功后对所在桶做 best-effort 压缩
    pub fn erase(&self, key: &K) -> bool {
        let buckets = self.buckets.read();
        let idx = self.bucket_index_for(key, buckets.len());
        match buckets[idx].erase(key) {
            Some(_) => {
                self.erased_total.fetch_add(1, Ordering::Release);
                buckets[idx].compact(self.erase_threshold);
                true
            }
            None => false,
        }
    }

    /// 删除迭代器指向的元素，等价于按其键删除
    ///
    /// 同线程持有该迭代器时经由锁注册表升级，不会自死锁。
    pub fn erase_iter(&self, it: &Iter<'_, K, V, S>) -> bool {
        match it.key() {
            Some(key) => {
                let key = key.clone();
                self.erase(&key)
            }
            None => false,
        }
    }

    /// 扩容到质数阶梯的下一档并重新分布所有存活槽位
    ///
    /// 持容器级写锁进行，期间阻塞全部并发操作。既有迭代器一律失效，
    /// 调用前必须全部析构。墓碑不迁移，计数器随之重置。哈希函子在迁
    /// 移途中 panic 时新桶向量被放弃，原向量保持不变。
    pub fn rehash(&self) {
        let mut buckets = self.buckets.write();
        debug_assert_eq!(
            self.active_iterators.load(Ordering::Acquire),
            0,
            "重哈希期间不允许存在存活迭代器"
        );
        let old_count = buckets.len();
        let new_count = next_prime(old_count as u64) as usize;
        crate::log_info!("重哈希: {} -> {} 个桶", old_count, new_count);

        let staged: Vec<Vec<(usize, Slot<K, V>)>> = buckets
            .par_iter()
            .map(|bucket| bucket.extract_live(new_count, &self.hash_builder))
            .collect();

        let mut groups: Vec<Vec<Slot<K, V>>> = (0..new_count).map(|_| Vec::new()).collect();
        let mut live = 0u64;
        for (idx, slot) in staged.into_iter().flatten() {
            groups[idx].push(slot);
            live += 1;
        }
        let new_buckets: Vec<Bucket<K, V>> = groups.into_iter().map(Bucket::from_slots).collect();

        self.live_total.store(live, Ordering::Release);
        self.erased_total.store(0, Ordering::Release);
        *buckets = new_buckets;
    }
}

impl<K: Key, V: Value, S> ChainedMap<K, V, S> {
    /// 元素个数的最终一致估计
    pub fn size(&self) -> usize {
        let live = self.live_total.load(Ordering::Acquire);
        let erased = self.erased_total.load(Ordering::Acquire);
        live.saturating_sub(erased) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }

    /// 指向首个存活槽位的迭代器，按桶下标顺序扫描
    pub fn begin(&self) -> Iter<'_, K, V, S> {
        let buckets = self.buckets.read();
        for (idx, bucket) in buckets.iter().enumerate() {
            if bucket.live_count() == 0 {
                continue;
            }
            if let Some(parts) = bucket.begin(idx) {
                return Iter::live(self, parts);
            }
        }
        self.end()
    }

    /// end 哨兵迭代器，不持任何锁
    ///
    /// 同一容器的两个 end 迭代器相等，end 不等于任何存活迭代器。
    pub fn end(&self) -> Iter<'_, K, V, S> {
        Iter::end_of(self)
    }

    /// 标准迭代器适配，逐桶快照式遍历存活键值对
    pub fn iter(&self) -> PairIter<'_, K, V, S> {
        PairIter {
            inner: self.begin(),
            primed: false,
        }
    }

    /// 推进迭代器：当前桶内找下一个存活槽位，耗尽则逐桶向后
    pub(crate) fn advance_iter(&self, it: &mut Iter<'_, K, V, S>) {
        if it.end {
            return;
        }
        let buckets = self.buckets.read();
        let mut idx = it.bucket_idx;
        while idx < buckets.len() {
            if buckets[idx].advance(it, idx) {
                return;
            }
            idx += 1;
        }
        drop(buckets);
        it.become_end();
    }

    /// 当前统计快照
    pub fn stats(&self) -> ChainedMapStats {
        let buckets = self.buckets.read();
        let allocated_slots = buckets.iter().map(|b| b.allocated_slots()).sum();
        ChainedMapStats {
            size: self.size(),
            bucket_count: buckets.len(),
            live_total: self.live_total.load(Ordering::Acquire),
            erased_total: self.erased_total.load(Ordering::Acquire),
            allocated_slots,
            active_iterators: self.active_iterators.load(Ordering::Acquire),
        }
    }

    /// 当前存活迭代器数量
    pub fn active_iterators(&self) -> usize {
        self.active_iterators.load(Ordering::Acquire)
    }

    pub(crate) fn iterator_minted(&self) {
        self.active_iterators.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn iterator_released(&self) {
        self.active_iterators.fetch_sub(1, Ordering::Release);
    }
}
