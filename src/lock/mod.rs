//! 锁模块 - 共享锁句柄与线程本地锁注册表

pub mod registry;

pub use registry::{SharedLockHandle, VariantLockCell};

pub(crate) use registry::{acquire, try_acquire_write};
