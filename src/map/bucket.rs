// src/map/bucket.rs
//! 桶 - 槽位序列与桶级读写锁
//!
//! 桶内查找是线性探测。槽位只追加不重排，唯一的例外是压缩：在桶写
//! 锁下重建序列丢弃墓碑。所有加锁都经过线程本地注册表，本线程重入
//! 时复用已持有的句柄。

use crate::lock;
use crate::map::iterator::{Iter, IterParts};
use crate::map::slot::Slot;
use crate::types::{Key, LockMode, Value};
use parking_lot::RwLock;
use std::sync::Arc;

/// 桶锁保护下的槽位序列
pub struct BucketCore<K: Key, V: Value> {
    pub(crate) slots: Vec<Slot<K, V>>,
    pub(crate) live_count: usize,
}

/// 桶 - 哈希表顶层向量的一个单元
pub struct Bucket<K: Key, V: Value> {
    core: Arc<RwLock<BucketCore<K, V>>>,
}

impl<K: Key, V: Value> Bucket<K, V> {
    pub(crate) fn new() -> Self {
        Self::from_slots(Vec::new())
    }

    pub(crate) fn from_slots(slots: Vec<Slot<K, V>>) -> Self {
        let live_count = slots.len();
        Self {
            core: Arc::new(RwLock::new(BucketCore { slots, live_count })),
        }
    }

    /// 存活槽位数，桶读锁下读取
    pub(crate) fn live_count(&self) -> usize {
        let handle = lock::acquire(&self.core, LockMode::Read);
        let n = handle.data().live_count;
        n
    }

    /// 已分配槽位数（含墓碑）
    pub(crate) fn allocated_slots(&self) -> usize {
        let handle = lock::acquire(&self.core, LockMode::Read);
        let n = handle.data().slots.len();
        n
    }

    /// 桶写锁下插入
    ///
    /// 三种情形：键已存活，返回指向既有槽位的迭代器且 inserted=false；
    /// 命中墓碑，就地复活改写；无匹配则追加新槽位。返回前槽位先以写
    /// 模式锁定，桶锁随迭代器交给调用方。
    pub(crate) fn insert(
        &self,
        bucket_idx: usize,
        key: K,
        value: V,
    ) -> (IterParts<K, V>, bool) {
        let bucket_lock = lock::acquire(&self.core, LockMode::Write);

        let found = {
            let core = bucket_lock.data();
            core.slots.iter().position(|s| s.key_equals(&key))
        };

        match found {
            Some(i) => {
                let live = {
                    let core = bucket_lock.data();
                    core.slots[i].is_live()
                };
                if live {
                    let (key, slot_lock) = {
                        let core = bucket_lock.data();
                        core.slots[i].mint_lock_with_key(LockMode::Write)
                    };
                    (
                        IterParts {
                            key,
                            bucket_idx,
                            slot_idx: i,
                            slot_lock,
                            bucket_lock,
                        },
                        false,
                    )
                } else {
                    // 墓碑复活：改写原槽位，已分配槽位数不增长
                    {
                        let core = bucket_lock.data();
                        core.slots[i].revive(value);
                    }
                    bucket_lock.data_mut().live_count += 1;
                    let (key, slot_lock) = {
                        let core = bucket_lock.data();
                        core.slots[i].mint_lock_with_key(LockMode::Write)
                    };
                    (
                        IterParts {
                            key,
                            bucket_idx,
                            slot_idx: i,
                            slot_lock,
                            bucket_lock,
                        },
                        true,
                    )
                }
            }
            None => {
                let i = {
                    let mut core = bucket_lock.data_mut();
                    core.slots.push(Slot::new(key, value));
                    core.live_count += 1;
                    core.slots.len() - 1
                };
                let (key, slot_lock) = {
                    let core = bucket_lock.data();
                    core.slots[i].mint_lock_with_key(LockMode::Write)
                };
                (
                    IterParts {
                        key,
                        bucket_idx,
                        slot_idx: i,
                        slot_lock,
                        bucket_lock,
                    },
                    true,
                )
            }
        }
    }

    /// 桶读锁下线性探测，命中存活槽位则按请求模式锁定并铸造迭代器
    pub(crate) fn find(
        &self,
        bucket_idx: usize,
        key: &K,
        mode: LockMode,
    ) -> Option<IterParts<K, V>> {
        let bucket_lock = lock::acquire(&self.core, LockMode::Read);
        let len = bucket_lock.data().slots.len();
        for i in 0..len {
            // 探测用读锁，命中的槽位才按请求模式加锁
            let matched = {
                let core = bucket_lock.data();
                core.slots[i].compare_key(key)
            };
            if !matched {
                continue;
            }
            let minted = {
                let core = bucket_lock.data();
                core.slots[i].mint_for_key(key, mode)
            };
            if let Some((key, slot_lock)) = minted {
                return Some(IterParts {
                    key,
                    bucket_idx,
                    slot_idx: i,
                    slot_lock,
                    bucket_lock,
                });
            }
        }
        None
    }

    /// 桶写锁下删除第一个匹配的存活槽位，返回其下标
    pub(crate) fn erase(&self, key: &K) -> Option<usize> {
        let bucket_lock = lock::acquire(&self.core, LockMode::Write);
        let pos = {
            let core = bucket_lock.data();
            core.slots.iter().position(|s| s.compare_key(key))
        }?;
        let erased = {
            let core = bucket_lock.data();
            core.slots[pos].erase()
        };
        if !erased {
            return None;
        }
        bucket_lock.data_mut().live_count -= 1;
        Some(pos)
    }

    /// 第一个存活槽位的迭代器，桶无存活槽位时为 `None`
    pub(crate) fn begin(&self, bucket_idx: usize) -> Option<IterParts<K, V>> {
        let bucket_lock = lock::acquire(&self.core, LockMode::Read);
        let first = {
            let core = bucket_lock.data();
            (0..core.slots.len()).find(|&i| core.slots[i].is_live())
        }?;
        let (key, slot_lock) = {
            let core = bucket_lock.data();
            core.slots[first].mint_lock_with_key(LockMode::Read)
        };
        Some(IterParts {
            key,
            bucket_idx,
            slot_idx: first,
            slot_lock,
            bucket_lock,
        })
    }

    /// 把迭代器推进到本桶的下一个存活槽位
    ///
    /// 迭代器已在本桶时从 `slot_idx + 1` 继续，注册表直接返回其已持有
    /// 的桶锁；来自前一个桶时取本桶读锁从头找。新槽位锁先取得，旧槽
    /// 位锁随字段赋值释放。无存活槽位返回 false，调用方移向下一个桶。
    pub(crate) fn advance<S>(&self, it: &mut Iter<'_, K, V, S>, bucket_idx: usize) -> bool {
        let bucket_lock = lock::acquire(&self.core, LockMode::Read);
        let start = if it.bucket_idx == bucket_idx && !it.is_end() {
            it.slot_idx + 1
        } else {
            0
        };
        let next = {
            let core = bucket_lock.data();
            (start..core.slots.len()).find(|&i| core.slots[i].is_live())
        };
        let next = match next {
            Some(i) => i,
            None => return false,
        };
        let (key, slot_lock) = {
            let core = bucket_lock.data();
            core.slots[next].mint_lock_with_key(LockMode::Read)
        };
        it.slot_lock = Some(slot_lock);
        it.bucket_lock = Some(bucket_lock);
        it.key = Some(key);
        it.bucket_idx = bucket_idx;
        it.slot_idx = next;
        true
    }

    /// 墓碑密度达到阈值时重建槽位序列
    ///
    /// best-effort：桶忙（含本线程以读模式持有桶锁）或任一槽位仍被
    /// 锁句柄引用时放弃，返回当时的存活计数。
    pub(crate) fn compact(&self, threshold: f64) -> usize {
        let live_before = {
            let handle = lock::acquire(&self.core, LockMode::Read);
            let core = handle.data();
            if core.slots.is_empty()
                || (core.live_count as f64) > (core.slots.len() as f64) * threshold
            {
                return core.live_count;
            }
            core.live_count
        };

        let bucket_lock = match lock::try_acquire_write(&self.core) {
            Some(handle) => handle,
            None => return live_before,
        };
        let mut core = bucket_lock.data_mut();
        if core.slots.iter().any(|s| s.is_pinned()) {
            return core.live_count;
        }
        core.slots.retain(|s| s.is_live());
        core.live_count = core.slots.len();
        core.live_count
    }

    /// 桶写锁下取出所有存活槽位及其新桶下标，重哈希专用
    pub(crate) fn extract_live<S: std::hash::BuildHasher>(
        &self,
        new_bucket_count: usize,
        hash_builder: &S,
    ) -> Vec<(usize, Slot<K, V>)> {
        let bucket_lock = lock::acquire(&self.core, LockMode::Write);
        let core = bucket_lock.data();
        core.slots
            .iter()
            .filter_map(|slot| {
                let key = slot.live_key()?;
                let idx = crate::hash::bucket_index(hash_builder, &key, new_bucket_count);
                Some((idx, slot.clone_handle()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket() -> Bucket<u64, String> {
        Bucket::new()
    }

    #[test]
    fn test_insert_appends_and_counts() {
        let b = bucket();
        let (parts, inserted) = b.insert(0, 1, "a".to_string());
        assert!(inserted);
        assert_eq!(parts.slot_idx, 0);
        drop(parts);
        assert_eq!(b.live_count(), 1);
        assert_eq!(b.allocated_slots(), 1);
    }

    #[test]
    fn test_insert_duplicate_returns_existing() {
        let b = bucket();
        let (first, _) = b.insert(0, 1, "a".to_string());
        drop(first);
        let (second, inserted) = b.insert(0, 1, "b".to_string());
        assert!(!inserted);
        assert_eq!(second.slot_idx, 0);
        drop(second);
        // 原值未被覆盖
        let found = b.find(0, &1, LockMode::Read).expect("键应存在");
        assert_eq!(found.slot_lock.data().value, "a");
    }

    #[test]
    fn test_insert_revives_tombstone_without_growth() {
        let b = bucket();
        drop(b.insert(0, 1, "a".to_string()));
        assert_eq!(b.erase(&1), Some(0));
        assert_eq!(b.live_count(), 0);
        let (parts, inserted) = b.insert(0, 1, "b".to_string());
        assert!(inserted);
        assert_eq!(parts.slot_idx, 0);
        drop(parts);
        // 复活而不是追加
        assert_eq!(b.allocated_slots(), 1);
        assert_eq!(b.live_count(), 1);
    }

    #[test]
    fn test_erase_missing_returns_none() {
        let b = bucket();
        drop(b.insert(0, 1, "a".to_string()));
        assert_eq!(b.erase(&2), None);
        assert_eq!(b.erase(&1), Some(0));
        // 二次删除无匹配存活槽位
        assert_eq!(b.erase(&1), None);
    }

    #[test]
    fn test_find_skips_tombstones() {
        let b = bucket();
        drop(b.insert(0, 1, "a".to_string()));
        drop(b.insert(0, 2, "b".to_string()));
        b.erase(&1);
        assert!(b.find(0, &1, LockMode::Read).is_none());
        let found = b.find(0, &2, LockMode::Write).expect("键应存在");
        assert_eq!(found.slot_idx, 1);
    }

    #[test]
    fn test_begin_skips_leading_tombstones() {
        let b = bucket();
        drop(b.insert(0, 1, "a".to_string()));
        drop(b.insert(0, 2, "b".to_string()));
        b.erase(&1);
        let parts = b.begin(0).expect("桶中仍有存活槽位");
        assert_eq!(parts.slot_idx, 1);
        drop(parts);
        b.erase(&2);
        assert!(b.begin(0).is_none());
    }

    #[test]
    fn test_compact_drops_tombstones() {
        let b = bucket();
        drop(b.insert(0, 1, "a".to_string()));
        drop(b.insert(0, 2, "b".to_string()));
        drop(b.insert(0, 3, "c".to_string()));
        b.erase(&1);
        b.erase(&2);
        assert_eq!(b.allocated_slots(), 3);
        // 1/3 存活，低于阈值 0.7，压缩生效
        assert_eq!(b.compact(0.7), 1);
        assert_eq!(b.allocated_slots(), 1);
        assert!(b.find(0, &3, LockMode::Read).is_some());
    }

    #[test]
    fn test_compact_skipped_above_threshold() {
        let b = bucket();
        drop(b.insert(0, 1, "a".to_string()));
        drop(b.insert(0, 2, "b".to_string()));
        b.erase(&1);
        // 1/2 存活，阈值 0.3 时不压缩
        assert_eq!(b.compact(0.3), 1);
        assert_eq!(b.allocated_slots(), 2);
    }

    #[test]
    fn test_compact_skipped_while_slot_pinned() {
        let b = bucket();
        drop(b.insert(0, 1, "a".to_string()));
        drop(b.insert(0, 2, "b".to_string()));
        b.erase(&1);
        let pinned = b.find(0, &2, LockMode::Read).expect("键应存在");
        // 迭代器钉住桶锁，压缩必须让路
        assert_eq!(b.compact(0.7), 1);
        assert_eq!(b.allocated_slots(), 2);
        drop(pinned);
        assert_eq!(b.compact(0.7), 1);
        assert_eq!(b.allocated_slots(), 1);
    }
}
