//! fuseloop - Kernel-Facing FUSE Request Loop
//!
//! Arsitektur:
//! - Zero-Copy: request dibaca ke buffer pool, decode via offset
//! - Lock-Free: buffer pool MPMC dan latency tracker atomic-only
//! - No-Allocation: buffer dan reply di-reuse per worker
//! - Flat Wire Format: header fixed-size, host byte order
//!
//! Alur satu request:
//! `read → decode → dispatch → encode → write → recycle`

pub mod channel;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod session;

pub use channel::{Channel, DeviceChannel, MemoryChannel, ReadFailure};
pub use config::SessionConfig;
pub use dispatch::{Handler, OpSpec, OperationRegistry, RegistryBuilder};
pub use error::{ConfigError, Result, SessionError};
pub use protocol::{opcode, OutputSlot, RequestView, Status};
pub use session::{Mounter, RunReport, Session, StopReason};
