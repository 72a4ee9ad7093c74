//! 迭代器 - 持锁的单槽位句柄
//!
//! 存活迭代器持有槽位锁与桶读锁的共享句柄，存活期间槽位被钉住：
//! 不会被析构，也不会被压缩移走。克隆共享锁所有权；析构先放槽位锁
//! 再放桶锁。end 迭代器不持任何锁，解引用以 `MapError` 拒绝。
//!
//! 相等性只看所属容器与键：两个 end 相等；两个存活迭代器键相等即
//! 相等，桶与槽位下标刻意不参与比较，压缩重排下标不影响判等。

use crate::error::MapError;
use crate::hash::SelectableBuildHasher;
use crate::lock::SharedLockHandle;
use crate::map::bucket::BucketCore;
use crate::map::chained_map::ChainedMap;
use crate::map::slot::SlotCore;
use crate::types::{Key, LockMode, Value};

/// 桶内铸造迭代器所需的全部组成
pub(crate) struct IterParts<K: Key, V: Value> {
    pub(crate) key: K,
    pub(crate) bucket_idx: usize,
    pub(crate) slot_idx: usize,
    pub(crate) slot_lock: SharedLockHandle<SlotCore<K, V>>,
    pub(crate) bucket_lock: SharedLockHandle<BucketCore<K, V>>,
}

/// 哈希表迭代器
///
/// 字段顺序决定析构顺序：槽位锁先于桶锁释放。
pub struct Iter<'m, K: Key, V: Value, S = SelectableBuildHasher> {
    pub(crate) map: &'m ChainedMap<K, V, S>,
    pub(crate) key: Option<K>,
    pub(crate) bucket_idx: usize,
    pub(crate) slot_idx: usize,
    pub(crate) slot_lock: Option<SharedLockHandle<SlotCore<K, V>>>,
    pub(crate) bucket_lock: Option<SharedLockHandle<BucketCore<K, V>>>,
    pub(crate) end: bool,
    pub(crate) counted: bool,
}

impl<'m, K: Key, V: Value, S> Iter<'m, K, V, S> {
    pub(crate) fn live(map: &'m ChainedMap<K, V, S>, parts: IterParts<K, V>) -> Self {
        map.iterator_minted();
        Self {
            map,
            key: Some(parts.key),
            bucket_idx: parts.bucket_idx,
            slot_idx: parts.slot_idx,
            slot_lock: Some(parts.slot_lock),
            bucket_lock: Some(parts.bucket_lock),
            end: false,
            counted: true,
        }
    }

    pub(crate) fn end_of(map: &'m ChainedMap<K, V, S>) -> Self {
        Self {
            map,
            key: None,
            bucket_idx: 0,
            slot_idx: 0,
            slot_lock: None,
            bucket_lock: None,
            end: true,
            counted: false,
        }
    }

    pub fn is_end(&self) -> bool {
        self.end
    }

    /// 迭代器创建时拷贝的键
    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    /// 槽位锁的当前模式，end 迭代器为 `None`
    pub fn lock_mode(&self) -> Option<LockMode> {
        self.slot_lock.as_ref().map(|handle| handle.mode())
    }

    /// 持锁拷贝键值对
    pub fn pair(&self) -> Result<(K, V), MapError> {
        let handle = self.slot_lock.as_ref().ok_or(MapError::EndIterator)?;
        let core = handle.data();
        Ok((core.key.clone(), core.value.clone()))
    }

    /// 持锁拷贝值
    pub fn value(&self) -> Result<V, MapError> {
        let handle = self.slot_lock.as_ref().ok_or(MapError::EndIterator)?;
        let value = handle.data().value.clone();
        Ok(value)
    }

    /// 通过写模式槽位锁改写值
    pub fn set_value(&self, value: V) -> Result<(), MapError> {
        let handle = self.slot_lock.as_ref().ok_or(MapError::EndIterator)?;
        if handle.mode() != LockMode::Write {
            return Err(MapError::ReadOnlyIterator);
        }
        handle.data_mut().value = value;
        Ok(())
    }

    /// 写模式下就地修改值
    ///
    /// 闭包内不得回调本容器的操作，锁单元的内部借用在闭包期间保持。
    pub fn update_value<R>(&self, f: impl FnOnce(&mut V) -> R) -> Result<R, MapError> {
        let handle = self.slot_lock.as_ref().ok_or(MapError::EndIterator)?;
        if handle.mode() != LockMode::Write {
            return Err(MapError::ReadOnlyIterator);
        }
        let result = f(&mut handle.data_mut().value);
        Ok(result)
    }

    /// 推进到下一个存活槽位
    ///
    /// 返回到达 end 前是否仍指向存活槽位；对 end 迭代器是空操作。
    pub fn advance(&mut self) -> bool {
        if self.end {
            return false;
        }
        let map = self.map;
        map.advance_iter(self);
        !self.end
    }

    /// 原地退化为 end 迭代器，释放全部锁
    pub(crate) fn become_end(&mut self) {
        self.slot_lock = None;
        self.bucket_lock = None;
        self.key = None;
        self.end = true;
        if self.counted {
            self.counted = false;
            self.map.iterator_released();
        }
    }
}

impl<'m, K: Key, V: Value, S> Clone for Iter<'m, K, V, S> {
    fn clone(&self) -> Self {
        if !self.end {
            self.map.iterator_minted();
        }
        Self {
            map: self.map,
            key: self.key.clone(),
            bucket_idx: self.bucket_idx,
            slot_idx: self.slot_idx,
            slot_lock: self.slot_lock.clone(),
            bucket_lock: self.bucket_lock.clone(),
            end: self.end,
            counted: !self.end,
        }
    }
}

impl<'m, K: Key, V: Value, S> Drop for Iter<'m, K, V, S> {
    fn drop(&mut self) {
        if self.counted {
            self.map.iterator_released();
        }
    }
}

impl<'m, K: Key, V: Value, S> std::fmt::Debug for Iter<'m, K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.end {
            return write!(f, "Iter(end)");
        }
        write!(f, "Iter(bucket={}, slot={})", self.bucket_idx, self.slot_idx)
    }
}

impl<'m, K: Key, V: Value, S> PartialEq for Iter<'m, K, V, S> {
    fn eq(&self, other: &Self) -> bool {
        if !std::ptr::eq(self.map, other.map) {
            return false;
        }
        match (self.end, other.end) {
            (true, true) => true,
            (true, false) | (false, true) => false,
            (false, false) => self.key == other.key,
        }
    }
}

impl<'m, K: Key, V: Value, S> Eq for Iter<'m, K, V, S> {}

/// 标准迭代器适配层，逐个产出键值对拷贝
pub struct PairIter<'m, K: Key, V: Value, S = SelectableBuildHasher> {
    pub(crate) inner: Iter<'m, K, V, S>,
    pub(crate) primed: bool,
}

impl<'m, K: Key, V: Value, S> Iterator for PairIter<'m, K, V, S> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        if self.primed {
            self.inner.advance();
        } else {
            self.primed = true;
        }
        if self.inner.is_end() {
            return None;
        }
        self.inner.pair().ok()
    }
}
