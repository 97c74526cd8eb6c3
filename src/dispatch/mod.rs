//! Dispatch Layer: registry opcode dan pemanggilan handler
//!
//! Registry adalah object eksplisit yang dibuat saat startup dan
//! dibagikan ke control loop, bukan tabel global.

mod dispatcher;
mod registry;

pub use dispatcher::dispatch;
pub use registry::{Handler, OpSpec, Operation, OperationRegistry, RegistryBuilder};
