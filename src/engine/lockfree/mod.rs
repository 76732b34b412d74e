//! ### English
//! Lock-free primitives shared across the bridge.
//!
//! These utilities are designed for hot paths (atomics, bounded allocation, spin/yield backoff).
//!
//! ### 中文
//! 帧桥内复用的无锁原语。
//!
//! 这些工具面向热路径设计（原子操作、有界分配、短自旋/让出调度退避）。
mod backoff;
mod coalesced;

pub(crate) use backoff::Backoff;
pub(crate) use coalesced::LatestSlot;
