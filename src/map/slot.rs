// src/map/slot.rs
//! 槽位 - 单个键值单元及其读写锁
//!
//! 槽位被删除时只打墓碑标记，单元本身保留到桶压缩为止。迭代器通过
//! 锁句柄钉住槽位：句柄存活期间槽位既不会被析构也不会被压缩移走。

use crate::lock::{self, SharedLockHandle};
use crate::types::{Key, LockMode, Value};
use parking_lot::RwLock;
use std::sync::Arc;

/// 锁保护下的槽位数据
pub struct SlotCore<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) tombstoned: bool,
}

/// 槽位 - 键值对、墓碑标记与独立读写锁
pub struct Slot<K: Key, V: Value> {
    core: Arc<RwLock<SlotCore<K, V>>>,
}

impl<K: Key, V: Value> Slot<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self {
            core: Arc::new(RwLock::new(SlotCore {
                key,
                value,
                tombstoned: false,
            })),
        }
    }

    /// 存活且键相等时为真
    pub fn compare_key(&self, key: &K) -> bool {
        let handle = lock::acquire(&self.core, LockMode::Read);
        let core = handle.data();
        !core.tombstoned && core.key == *key
    }

    /// 键相等即为真，忽略墓碑标记
    ///
    /// 插入扫描用它定位同键的墓碑槽位，维持每键至多一个槽位的不变量。
    pub fn key_equals(&self, key: &K) -> bool {
        let handle = lock::acquire(&self.core, LockMode::Read);
        let core = handle.data();
        core.key == *key
    }

    /// 读锁下拷贝键值对，墓碑槽位返回 `None`
    pub fn snapshot(&self) -> Option<(K, V)> {
        let handle = lock::acquire(&self.core, LockMode::Read);
        let core = handle.data();
        if core.tombstoned {
            return None;
        }
        Some((core.key.clone(), core.value.clone()))
    }

    /// 打墓碑标记，已是墓碑时返回 false
    pub fn erase(&self) -> bool {
        let handle = lock::acquire(&self.core, LockMode::Write);
        let mut core = handle.data_mut();
        if core.tombstoned {
            return false;
        }
        core.tombstoned = true;
        true
    }

    /// 清除墓碑并改写值，两者在同一临界区内完成
    pub fn revive(&self, value: V) {
        let handle = lock::acquire(&self.core, LockMode::Write);
        let mut core = handle.data_mut();
        core.tombstoned = false;
        core.value = value;
    }

    /// 写锁下改写值
    pub fn set_value(&self, value: V) {
        let handle = lock::acquire(&self.core, LockMode::Write);
        handle.data_mut().value = value;
    }

    pub fn is_live(&self) -> bool {
        let handle = lock::acquire(&self.core, LockMode::Read);
        let live = !handle.data().tombstoned;
        live
    }

    /// 是否有槽位锁句柄在外引用此槽位
    ///
    /// 压缩的安全闸门。持有桶写锁时，额外的强引用只可能来自本线程
    /// 的迭代器句柄，其余线程在桶锁外等待。
    pub fn is_pinned(&self) -> bool {
        Arc::strong_count(&self.core) > 1
    }

    /// 以指定模式铸造锁句柄并拷贝键，迭代器创建路径
    pub(crate) fn mint_lock_with_key(&self, mode: LockMode) -> (K, SharedLockHandle<SlotCore<K, V>>) {
        let handle = lock::acquire(&self.core, mode);
        let key = handle.data().key.clone();
        (key, handle)
    }

    /// 键匹配且存活时铸造锁句柄，否则句柄当场释放
    pub(crate) fn mint_for_key(
        &self,
        key: &K,
        mode: LockMode,
    ) -> Option<(K, SharedLockHandle<SlotCore<K, V>>)> {
        let handle = lock::acquire(&self.core, mode);
        let matched = {
            let core = handle.data();
            !core.tombstoned && core.key == *key
        };
        matched.then(|| (key.clone(), handle))
    }

    /// 存活槽位的键拷贝，重哈希的再分配路径
    pub(crate) fn live_key(&self) -> Option<K> {
        let handle = lock::acquire(&self.core, LockMode::Read);
        let core = handle.data();
        if core.tombstoned {
            return None;
        }
        Some(core.key.clone())
    }

    pub(crate) fn clone_handle(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_slot_is_live() {
        let slot = Slot::new(1u64, "a".to_string());
        assert!(slot.is_live());
        assert!(slot.compare_key(&1));
        assert!(!slot.compare_key(&2));
        assert_eq!(slot.snapshot(), Some((1, "a".to_string())));
    }

    #[test]
    fn test_erase_is_idempotent() {
        let slot = Slot::new(1u64, "a".to_string());
        assert!(slot.erase());
        assert!(!slot.erase());
        assert!(!slot.is_live());
        assert!(slot.snapshot().is_none());
    }

    #[test]
    fn test_tombstone_hides_key_from_compare() {
        let slot = Slot::new(1u64, "a".to_string());
        slot.erase();
        // compare_key 过滤墓碑，key_equals 不过滤
        assert!(!slot.compare_key(&1));
        assert!(slot.key_equals(&1));
    }

    #[test]
    fn test_revive_clears_tombstone_and_overwrites() {
        let slot = Slot::new(1u64, "a".to_string());
        slot.erase();
        slot.revive("b".to_string());
        assert!(slot.is_live());
        assert_eq!(slot.snapshot(), Some((1, "b".to_string())));
    }

    #[test]
    fn test_mint_for_key_filters_tombstone_and_mismatch() {
        let slot = Slot::new(1u64, "a".to_string());
        assert!(slot.mint_for_key(&2, LockMode::Read).is_none());
        assert!(slot.mint_for_key(&1, LockMode::Read).is_some());
        slot.erase();
        assert!(slot.mint_for_key(&1, LockMode::Read).is_none());
    }

    #[test]
    fn test_pinned_while_handle_alive() {
        let slot = Slot::new(1u64, "a".to_string());
        assert!(!slot.is_pinned());
        let (_key, handle) = slot.mint_lock_with_key(LockMode::Read);
        assert!(slot.is_pinned());
        drop(handle);
        assert!(!slot.is_pinned());
    }
}
