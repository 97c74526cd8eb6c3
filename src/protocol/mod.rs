//! Protocol Layer: Zero-Copy Kernel Wire Format
//!
//! Prinsip desain:
//! - Fixed-size headers: layout diketahui, decode via offset
//! - Bounds-checked: input dari kernel tidak pernah di-cast langsung
//! - No allocation: decode menghasilkan range, encode menulis in-place

mod codec;
mod message;
mod request;

pub use codec::{decode, encode_reply, DecodeError, Decoded};
pub use message::{
    opcode, opcode_name, BatchForgetIn, ForgetIn, GetattrIn, InHeader, OutHeader, ReadIn, Status,
    WireStruct, WriteIn, IN_HEADER_SIZE, OUT_HEADER_SIZE,
};
pub use request::{OutputSlot, Request, RequestView, Stage};
