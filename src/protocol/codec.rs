//! Zero-Copy Decoder/Encoder untuk message kernel
//!
//! Decode hanya menghasilkan range di atas input buffer; encode menulis
//! `OutHeader` langsung ke reply buffer yang region output-nya sudah diisi
//! handler. Tidak ada alokasi di hot path.

use std::ops::Range;

use thiserror::Error;

use super::message::{InHeader, OutHeader, Status, WireStruct, IN_HEADER_SIZE, OUT_HEADER_SIZE};
use crate::dispatch::{Operation, OperationRegistry};

/// Alasan message ditolak sebelum handler dipanggil
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("short read for input header: {len} bytes")]
    ShortHeader { len: usize },

    #[error("unknown opcode {opcode}")]
    Unsupported { header: InHeader, opcode: u32 },

    #[error("short read for opcode {opcode}: need {need} argument bytes, got {got}")]
    ShortArgument {
        header: InHeader,
        opcode: u32,
        need: usize,
        got: usize,
    },
}

impl DecodeError {
    /// Status reply untuk error ini
    pub fn status(&self) -> Status {
        match self {
            DecodeError::Unsupported { .. } => Status::ENOSYS,
            DecodeError::ShortHeader { .. } | DecodeError::ShortArgument { .. } => Status::EIO,
        }
    }

    /// Header lengkap, jika sempat ter-decode
    pub fn header(&self) -> Option<InHeader> {
        match self {
            DecodeError::ShortHeader { .. } => None,
            DecodeError::Unsupported { header, .. } | DecodeError::ShortArgument { header, .. } => {
                Some(*header)
            }
        }
    }
}

/// Hasil decode yang sukses
#[derive(Clone)]
pub struct Decoded<'r> {
    pub header: InHeader,
    pub operation: &'r Operation,
    /// Fixed argument di dalam input buffer
    pub arg: Range<usize>,
    /// Variable tail di dalam input buffer
    pub tail: Range<usize>,
}

/// Decode satu message.
///
/// 1. Kurang dari `IN_HEADER_SIZE` byte: `ShortHeader`, registry tidak disentuh.
/// 2. Opcode tidak terdaftar: `Unsupported`.
/// 3. Argument region lebih pendek dari `input_size`: `ShortArgument`.
/// 4. Selain itu: split jadi fixed argument + tail.
#[inline]
pub fn decode<'r>(input: &[u8], registry: &'r OperationRegistry) -> Result<Decoded<'r>, DecodeError> {
    let header = match InHeader::decode(input) {
        Some(h) => h,
        None => return Err(DecodeError::ShortHeader { len: input.len() }),
    };

    let operation = match registry.lookup(header.opcode) {
        Some(op) => op,
        None => {
            return Err(DecodeError::Unsupported {
                header,
                opcode: header.opcode,
            })
        }
    };

    let need = operation.spec().input_size;
    let got = input.len() - IN_HEADER_SIZE;
    if need > got {
        return Err(DecodeError::ShortArgument {
            header,
            opcode: header.opcode,
            need,
            got,
        });
    }

    let arg_end = IN_HEADER_SIZE + need;
    Ok(Decoded {
        header,
        operation,
        arg: IN_HEADER_SIZE..arg_end,
        tail: arg_end..input.len(),
    })
}

/// Tulis reply header ke `reply` dan potong ke panjang yang dikirim.
///
/// `reply` berisi `OutHeader` + fixed output region. `payload_len` dan
/// `flat_len` sudah melewati aturan omission (0 jika status bukan OK).
/// Returns total panjang reply yang dideklarasikan di header.
#[inline]
pub fn encode_reply(
    reply: &mut Vec<u8>,
    unique: u64,
    status: Status,
    payload_len: usize,
    flat_len: usize,
) -> u32 {
    let (payload_len, flat_len) = if status.is_ok() {
        (payload_len, flat_len)
    } else {
        (0, 0)
    };

    // Region payload mungkin belum disiapkan (misalnya decode gagal)
    reply.resize(OUT_HEADER_SIZE + payload_len, 0);

    let total = (OUT_HEADER_SIZE + payload_len + flat_len) as u32;
    let header = OutHeader {
        len: total,
        error: status.wire_code(),
        unique,
    };
    header.encode_into(&mut reply[..OUT_HEADER_SIZE]);
    total
}
