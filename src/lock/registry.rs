// src/lock/registry.rs
//! 线程本地锁注册表 - 同线程重入时复用或升级已持有的锁
//!
//! 每个线程维护一张从锁地址到弱句柄的映射。同一线程在持有某把锁的
//! 句柄时再次请求该锁，注册表直接返回已有句柄而不是重新加锁，从而
//! 避免在不可重入的读写锁上自死锁。句柄是共享所有权的：最后一个
//! 持有者析构时释放锁并把注册表条目删除。条目只保留弱引用，未被
//! 持有的锁不会让自身存活。

use crate::stats;
use crate::types::LockMode;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};
use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

type ArcReadGuard<T> = ArcRwLockReadGuard<RawRwLock, T>;
type ArcWriteGuard<T> = ArcRwLockWriteGuard<RawRwLock, T>;

/// 共享锁句柄 - 克隆即共享锁所有权
pub type SharedLockHandle<T> = Arc<VariantLockCell<T>>;

/// 读或写守卫的二选一包装
enum VariantLock<T: 'static> {
    Read(ArcReadGuard<T>),
    Write(ArcWriteGuard<T>),
}

/// 可就地升级的锁单元
///
/// 升级读锁为写锁时直接替换内部守卫，所有共享同一单元的迭代器
/// 随之观察到写模式。内部的 `Option` 仅在升级的瞬间为空。
pub struct VariantLockCell<T: 'static> {
    guard: RefCell<Option<VariantLock<T>>>,
    key: usize,
}

struct RegistryEntry {
    // Box<Weak<VariantLockCell<T>>>，按具体类型向下转型取回
    handle: Box<dyn Any>,
    mode: LockMode,
}

thread_local! {
    static LOCK_REGISTRY: RefCell<HashMap<usize, RegistryEntry>> =
        RefCell::new(HashMap::new());
}

impl<T: 'static> VariantLockCell<T> {
    fn acquire_fresh(lock: &Arc<RwLock<T>>, mode: LockMode, key: usize) -> Self {
        let timer = stats::acquire_timer();
        let guard = match mode {
            LockMode::Read => VariantLock::Read(lock.read_arc()),
            LockMode::Write => VariantLock::Write(lock.write_arc()),
        };
        stats::record_lock_acquire(mode, timer);
        Self {
            guard: RefCell::new(Some(guard)),
            key,
        }
    }

    fn try_acquire_write(lock: &Arc<RwLock<T>>, key: usize) -> Option<Self> {
        let timer = stats::acquire_timer();
        let guard = lock.try_write_arc()?;
        stats::record_lock_acquire(LockMode::Write, timer);
        Some(Self {
            guard: RefCell::new(Some(VariantLock::Write(guard))),
            key,
        })
    }

    /// 当前锁模式
    pub fn mode(&self) -> LockMode {
        match &*self.guard.borrow() {
            Some(VariantLock::Read(_)) => LockMode::Read,
            Some(VariantLock::Write(_)) => LockMode::Write,
            None => unreachable!("锁单元仅在升级瞬间为空"),
        }
    }

    /// 借用受保护数据
    pub fn data(&self) -> Ref<'_, T> {
        Ref::map(self.guard.borrow(), |v| match v {
            Some(VariantLock::Read(g)) => &**g,
            Some(VariantLock::Write(g)) => &**g,
            None => unreachable!("锁单元仅在升级瞬间为空"),
        })
    }

    /// 可变借用受保护数据，要求写模式
    pub(crate) fn data_mut(&self) -> RefMut<'_, T> {
        RefMut::map(self.guard.borrow_mut(), |v| match v {
            Some(VariantLock::Write(g)) => &mut **g,
            Some(VariantLock::Read(_)) => panic!("在读模式锁上请求可变访问"),
            None => unreachable!("锁单元仅在升级瞬间为空"),
        })
    }

    /// 就地升级为写锁
    ///
    /// 先释放读守卫再阻塞获取写守卫。释放与重取之间其他线程可能插入
    /// 写操作，调用方的外层锁（桶锁之于槽位锁）负责排除这种情况。
    fn upgrade_in_place(&self) {
        let mut slot = self.guard.borrow_mut();
        let rwlock = match slot.take() {
            Some(VariantLock::Read(g)) => {
                let rwlock = Arc::clone(ArcRwLockReadGuard::rwlock(&g));
                drop(g);
                rwlock
            }
            Some(other) => {
                *slot = Some(other);
                return;
            }
            None => unreachable!("锁单元仅在升级瞬间为空"),
        };
        let timer = stats::acquire_timer();
        *slot = Some(VariantLock::Write(rwlock.write_arc()));
        stats::record_lock_acquire(LockMode::Write, timer);
    }
}

impl<T: 'static> Drop for VariantLockCell<T> {
    fn drop(&mut self) {
        // 线程退出阶段 TLS 可能已析构，忽略失败
        let _ = LOCK_REGISTRY.try_with(|r| {
            r.borrow_mut().remove(&self.key);
        });
    }
}

/// 注册表查找，命中则返回已有句柄与其模式
///
/// 弱引用失效的残留条目在此处自愈删除。
fn lookup<T: 'static>(key: usize) -> Option<(SharedLockHandle<T>, LockMode)> {
    LOCK_REGISTRY.with(|r| {
        let mut map = r.borrow_mut();
        let (upgraded, mode) = {
            let entry = map.get(&key)?;
            let upgraded = entry
                .handle
                .downcast_ref::<Weak<VariantLockCell<T>>>()
                .and_then(Weak::upgrade);
            (upgraded, entry.mode)
        };
        match upgraded {
            Some(cell) => Some((cell, mode)),
            None => {
                map.remove(&key);
                None
            }
        }
    })
}

fn register<T: 'static>(key: usize, cell: &SharedLockHandle<T>, mode: LockMode) {
    LOCK_REGISTRY.with(|r| {
        let previous = r.borrow_mut().insert(
            key,
            RegistryEntry {
                handle: Box::new(Arc::downgrade(cell)),
                mode,
            },
        );
        debug_assert!(previous.is_none(), "注册表中已有同地址条目");
    });
}

fn set_mode(key: usize, mode: LockMode) {
    LOCK_REGISTRY.with(|r| {
        if let Some(entry) = r.borrow_mut().get_mut(&key) {
            entry.mode = mode;
        }
    });
}

/// 获取锁句柄，经由线程本地注册表
///
/// 已持有同模式（或写模式覆盖读请求）时复用既有句柄；读升写时就地
/// 升级，共享该句柄的迭代器一并进入写模式；从不自动降级。
pub(crate) fn acquire<T: 'static>(lock: &Arc<RwLock<T>>, mode: LockMode) -> SharedLockHandle<T> {
    let key = Arc::as_ptr(lock) as usize;
    if let Some((cell, held_mode)) = lookup::<T>(key) {
        if held_mode.covers(mode) {
            return cell;
        }
        cell.upgrade_in_place();
        set_mode(key, LockMode::Write);
        return cell;
    }
    let cell = Arc::new(VariantLockCell::acquire_fresh(lock, mode, key));
    register(key, &cell, mode);
    cell
}

/// 写锁的非阻塞获取，桶压缩的 best-effort 路径使用
///
/// 注册表命中读模式条目时视为繁忙，返回 `None` 而不是阻塞升级。
pub(crate) fn try_acquire_write<T: 'static>(lock: &Arc<RwLock<T>>) -> Option<SharedLockHandle<T>> {
    let key = Arc::as_ptr(lock) as usize;
    if let Some((cell, held_mode)) = lookup::<T>(key) {
        return match held_mode {
            LockMode::Write => Some(cell),
            LockMode::Read => None,
        };
    }
    let cell = Arc::new(VariantLockCell::try_acquire_write(lock, key)?);
    register(key, &cell, LockMode::Write);
    Some(cell)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_lock(v: u32) -> Arc<RwLock<u32>> {
        Arc::new(RwLock::new(v))
    }

    #[test]
    fn test_fresh_acquire_and_release() {
        let lock = new_lock(7);
        {
            let handle = acquire(&lock, LockMode::Read);
            assert_eq!(handle.mode(), LockMode::Read);
            assert_eq!(*handle.data(), 7);
        }
        // 句柄析构后锁已释放
        assert!(lock.try_write().is_some());
    }

    #[test]
    fn test_same_mode_reuses_handle() {
        let lock = new_lock(1);
        let a = acquire(&lock, LockMode::Read);
        let b = acquire(&lock, LockMode::Read);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_write_handle_serves_read_request() {
        let lock = new_lock(1);
        let w = acquire(&lock, LockMode::Write);
        let r = acquire(&lock, LockMode::Read);
        // 不降级：读请求拿到的仍是写句柄
        assert!(Arc::ptr_eq(&w, &r));
        assert_eq!(r.mode(), LockMode::Write);
    }

    #[test]
    fn test_upgrade_in_place_shared_by_all_holders() {
        let lock = new_lock(1);
        let reader = acquire(&lock, LockMode::Read);
        let writer = acquire(&lock, LockMode::Write);
        assert!(Arc::ptr_eq(&reader, &writer));
        // 升级对所有共享者可见
        assert_eq!(reader.mode(), LockMode::Write);
        *writer.data_mut() = 2;
        assert_eq!(*reader.data(), 2);
    }

    #[test]
    fn test_entry_removed_after_last_drop() {
        let lock = new_lock(1);
        let a = acquire(&lock, LockMode::Write);
        drop(a);
        // 条目已删除，重新获取是一把新句柄且不会自死锁
        let b = acquire(&lock, LockMode::Read);
        assert_eq!(b.mode(), LockMode::Read);
    }

    #[test]
    fn test_try_acquire_write_busy_on_read_entry() {
        let lock = new_lock(1);
        let _r = acquire(&lock, LockMode::Read);
        assert!(try_acquire_write(&lock).is_none());
    }

    #[test]
    fn test_try_acquire_write_reuses_write_entry() {
        let lock = new_lock(1);
        let w = acquire(&lock, LockMode::Write);
        let t = try_acquire_write(&lock).expect("写句柄应可复用");
        assert!(Arc::ptr_eq(&w, &t));
    }

    #[test]
    fn test_cross_thread_write_blocks() {
        let lock = new_lock(0);
        let handle = acquire(&lock, LockMode::Read);
        let lock2 = Arc::clone(&lock);
        let joined = std::thread::spawn(move || {
            // 另一线程的注册表为空，走真实加锁路径
            lock2.try_write_arc().is_none()
        })
        .join()
        .expect("线程不应崩溃");
        assert!(joined);
        drop(handle);
    }
}
