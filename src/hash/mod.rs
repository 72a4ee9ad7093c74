//! 哈希模块 - 可选哈希算法与桶定位

pub mod prime;

pub use prime::{is_prime, next_prime, PRIME_LADDER};

use std::collections::hash_map::DefaultHasher;
use std::hash::{BuildHasher, Hash, Hasher};

const XXHASH_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// 哈希算法选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    AHash,
    XxHash,
    Default,
}

/// 按配置分派到具体算法的 BuildHasher
///
/// 每个容器实例持有一份，种子在构造时固定，此后对同一键的哈希
/// 结果保持确定。
#[derive(Clone)]
pub struct SelectableBuildHasher {
    algorithm: HashAlgorithm,
    ahash_state: ahash::RandomState,
    sip_state: std::collections::hash_map::RandomState,
}

impl SelectableBuildHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            ahash_state: ahash::RandomState::new(),
            sip_state: std::collections::hash_map::RandomState::new(),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

impl Default for SelectableBuildHasher {
    fn default() -> Self {
        Self::new(HashAlgorithm::AHash)
    }
}

impl BuildHasher for SelectableBuildHasher {
    type Hasher = SelectedHasher;

    fn build_hasher(&self) -> SelectedHasher {
        match self.algorithm {
            HashAlgorithm::AHash => SelectedHasher::AHash(self.ahash_state.build_hasher()),
            HashAlgorithm::XxHash => {
                SelectedHasher::XxHash(twox_hash::XxHash64::with_seed(XXHASH_SEED))
            }
            HashAlgorithm::Default => SelectedHasher::Sip(self.sip_state.build_hasher()),
        }
    }
}

/// 枚举分派的哈希器
pub enum SelectedHasher {
    AHash(ahash::AHasher),
    XxHash(twox_hash::XxHash64),
    Sip(DefaultHasher),
}

impl Hasher for SelectedHasher {
    fn finish(&self) -> u64 {
        match self {
            Self::AHash(h) => h.finish(),
            Self::XxHash(h) => h.finish(),
            Self::Sip(h) => h.finish(),
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        match self {
            Self::AHash(h) => h.write(bytes),
            Self::XxHash(h) => h.write(bytes),
            Self::Sip(h) => h.write(bytes),
        }
    }
}

/// 计算键归属的桶下标
pub fn bucket_index<S: BuildHasher, K: Hash + ?Sized>(
    hash_builder: &S,
    key: &K,
    bucket_count: usize,
) -> usize {
    let mut hasher = hash_builder.build_hasher();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % bucket_count
}
