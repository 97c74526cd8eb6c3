//! Core module: resource bersama antar worker
//!
//! Prinsip desain:
//! - No-Allocation di steady state: buffer message didaur ulang lewat pool
//! - Lock-Free: pool dan latency tracker hanya memakai atomic / MPMC queue
//! - Shared: satu instance dipakai semua worker lewat `Arc`

mod buffer_pool;
mod latency;

pub use buffer_pool::{Buffer, BufferPool, PoolStats};
pub use latency::{LatencySummary, LatencyTracker, WRITE_SUFFIX};
