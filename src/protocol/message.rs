//! Wire Schema: layout FUSE kernel protocol
//!
//! Layout request:
//! ┌─────────────────────────────────────────────────────┐
//! │ InHeader (40 bytes, fixed)                          │
//! ├─────────────────────────────────────────────────────┤
//! │ Fixed argument (ukuran dari registry per opcode)    │
//! ├─────────────────────────────────────────────────────┤
//! │ Tail (variable: nama, path, NUL-separated strings)  │
//! └─────────────────────────────────────────────────────┘
//!
//! Layout reply:
//! ┌─────────────────────────────────────────────────────┐
//! │ OutHeader (16 bytes, fixed)                         │
//! ├─────────────────────────────────────────────────────┤
//! │ Fixed output (opsional)                             │
//! └─────────────────────────────────────────────────────┘
//!   + flat payload (buffer terpisah, dikirim via writev)
//!
//! Channel hanya lokal di satu mesin, jadi semua angka memakai
//! host-native byte order. Tidak ada pointer cast: setiap field dibaca
//! lewat offset yang sudah di-bounds-check.

#![allow(dead_code)] // Opcode table dan arg structs adalah bagian dari schema API

use std::fmt;

/// Ukuran `InHeader` di wire.
pub const IN_HEADER_SIZE: usize = 40;
/// Ukuran `OutHeader` di wire.
pub const OUT_HEADER_SIZE: usize = 16;
/// Minimal byte yang dibutuhkan untuk membaca `opcode`.
pub const OPCODE_END: usize = 8;
/// Minimal byte yang dibutuhkan untuk membaca `unique`.
pub const UNIQUE_END: usize = 16;

#[inline(always)]
fn read_u32(buf: &[u8], off: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[off..off + 4]);
    u32::from_ne_bytes(raw)
}

#[inline(always)]
fn read_i32(buf: &[u8], off: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[off..off + 4]);
    i32::from_ne_bytes(raw)
}

#[inline(always)]
fn read_u64(buf: &[u8], off: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[off..off + 8]);
    u64::from_ne_bytes(raw)
}

/// Fixed-size struct yang bisa di-decode dari wire bytes.
pub trait WireStruct: Sized {
    /// Ukuran struct di wire.
    const SIZE: usize;

    /// Decode dari awal `buf`. `None` jika `buf` lebih pendek dari `SIZE`.
    fn decode(buf: &[u8]) -> Option<Self>;
}

/// Request header - fixed 40 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InHeader {
    /// Total panjang message termasuk header
    pub len: u32,
    pub opcode: u32,
    /// Correlation id, di-echo ke reply
    pub unique: u64,
    /// Target node id
    pub nodeid: u64,
    pub uid: u32,
    pub gid: u32,
    pub pid: u32,
    pub padding: u32,
}

impl WireStruct for InHeader {
    const SIZE: usize = IN_HEADER_SIZE;

    #[inline(always)]
    fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            len: read_u32(buf, 0),
            opcode: read_u32(buf, 4),
            unique: read_u64(buf, 8),
            nodeid: read_u64(buf, 16),
            uid: read_u32(buf, 24),
            gid: read_u32(buf, 28),
            pid: read_u32(buf, 32),
            padding: read_u32(buf, 36),
        })
    }
}

impl InHeader {
    /// Encode header ke `buf` (dipakai oleh tests, benches, dan demo).
    ///
    /// Returns `false` jika `buf` terlalu kecil.
    pub fn encode_into(&self, buf: &mut [u8]) -> bool {
        if buf.len() < IN_HEADER_SIZE {
            return false;
        }
        buf[0..4].copy_from_slice(&self.len.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.opcode.to_ne_bytes());
        buf[8..16].copy_from_slice(&self.unique.to_ne_bytes());
        buf[16..24].copy_from_slice(&self.nodeid.to_ne_bytes());
        buf[24..28].copy_from_slice(&self.uid.to_ne_bytes());
        buf[28..32].copy_from_slice(&self.gid.to_ne_bytes());
        buf[32..36].copy_from_slice(&self.pid.to_ne_bytes());
        buf[36..40].copy_from_slice(&self.padding.to_ne_bytes());
        true
    }

    /// Baca opcode dari message yang terpotong (header belum lengkap).
    #[inline(always)]
    pub fn peek_opcode(buf: &[u8]) -> Option<u32> {
        (buf.len() >= OPCODE_END).then(|| read_u32(buf, 4))
    }

    /// Baca correlation id dari message yang terpotong.
    #[inline(always)]
    pub fn peek_unique(buf: &[u8]) -> Option<u64> {
        (buf.len() >= UNIQUE_END).then(|| read_u64(buf, 8))
    }
}

/// Reply header - fixed 16 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutHeader {
    /// Total panjang reply: header + fixed payload + flat payload
    pub len: u32,
    /// 0 untuk sukses, -errno untuk error
    pub error: i32,
    pub unique: u64,
}

impl WireStruct for OutHeader {
    const SIZE: usize = OUT_HEADER_SIZE;

    #[inline(always)]
    fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            len: read_u32(buf, 0),
            error: read_i32(buf, 4),
            unique: read_u64(buf, 8),
        })
    }
}

impl OutHeader {
    /// Tulis header langsung ke awal reply buffer.
    #[inline(always)]
    pub fn encode_into(&self, buf: &mut [u8]) -> bool {
        if buf.len() < OUT_HEADER_SIZE {
            return false;
        }
        buf[0..4].copy_from_slice(&self.len.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.error.to_ne_bytes());
        buf[8..16].copy_from_slice(&self.unique.to_ne_bytes());
        true
    }
}

/// Argument FORGET
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForgetIn {
    pub nlookup: u64,
}

impl WireStruct for ForgetIn {
    const SIZE: usize = 8;

    fn decode(buf: &[u8]) -> Option<Self> {
        (buf.len() >= Self::SIZE).then(|| Self {
            nlookup: read_u64(buf, 0),
        })
    }
}

/// Argument GETATTR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetattrIn {
    pub getattr_flags: u32,
    pub dummy: u32,
    pub fh: u64,
}

impl WireStruct for GetattrIn {
    const SIZE: usize = 16;

    fn decode(buf: &[u8]) -> Option<Self> {
        (buf.len() >= Self::SIZE).then(|| Self {
            getattr_flags: read_u32(buf, 0),
            dummy: read_u32(buf, 4),
            fh: read_u64(buf, 8),
        })
    }
}

/// Argument READ (layout sama dengan WRITE kecuali semantik flags)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadIn {
    pub fh: u64,
    pub offset: u64,
    pub size: u32,
    pub read_flags: u32,
    pub lock_owner: u64,
    pub flags: u32,
    pub padding: u32,
}

impl WireStruct for ReadIn {
    const SIZE: usize = 40;

    fn decode(buf: &[u8]) -> Option<Self> {
        (buf.len() >= Self::SIZE).then(|| Self {
            fh: read_u64(buf, 0),
            offset: read_u64(buf, 8),
            size: read_u32(buf, 16),
            read_flags: read_u32(buf, 20),
            lock_owner: read_u64(buf, 24),
            flags: read_u32(buf, 32),
            padding: read_u32(buf, 36),
        })
    }
}

/// Argument WRITE; data yang ditulis ada di tail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteIn {
    pub fh: u64,
    pub offset: u64,
    pub size: u32,
    pub write_flags: u32,
    pub lock_owner: u64,
    pub flags: u32,
    pub padding: u32,
}

impl WireStruct for WriteIn {
    const SIZE: usize = 40;

    fn decode(buf: &[u8]) -> Option<Self> {
        (buf.len() >= Self::SIZE).then(|| Self {
            fh: read_u64(buf, 0),
            offset: read_u64(buf, 8),
            size: read_u32(buf, 16),
            write_flags: read_u32(buf, 20),
            lock_owner: read_u64(buf, 24),
            flags: read_u32(buf, 32),
            padding: read_u32(buf, 36),
        })
    }
}

/// Argument BATCH_FORGET; diikuti `count` pasang (nodeid, nlookup) di tail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchForgetIn {
    pub count: u32,
    pub dummy: u32,
}

impl WireStruct for BatchForgetIn {
    const SIZE: usize = 8;

    fn decode(buf: &[u8]) -> Option<Self> {
        (buf.len() >= Self::SIZE).then(|| Self {
            count: read_u32(buf, 0),
            dummy: read_u32(buf, 4),
        })
    }
}

/// Opcode FUSE kernel protocol
pub mod opcode {
    pub const LOOKUP: u32 = 1;
    pub const FORGET: u32 = 2;
    pub const GETATTR: u32 = 3;
    pub const SETATTR: u32 = 4;
    pub const READLINK: u32 = 5;
    pub const SYMLINK: u32 = 6;
    pub const MKNOD: u32 = 8;
    pub const MKDIR: u32 = 9;
    pub const UNLINK: u32 = 10;
    pub const RMDIR: u32 = 11;
    pub const RENAME: u32 = 12;
    pub const LINK: u32 = 13;
    pub const OPEN: u32 = 14;
    pub const READ: u32 = 15;
    pub const WRITE: u32 = 16;
    pub const STATFS: u32 = 17;
    pub const RELEASE: u32 = 18;
    pub const FSYNC: u32 = 20;
    pub const SETXATTR: u32 = 21;
    pub const GETXATTR: u32 = 22;
    pub const LISTXATTR: u32 = 23;
    pub const REMOVEXATTR: u32 = 24;
    pub const FLUSH: u32 = 25;
    pub const INIT: u32 = 26;
    pub const OPENDIR: u32 = 27;
    pub const READDIR: u32 = 28;
    pub const RELEASEDIR: u32 = 29;
    pub const FSYNCDIR: u32 = 30;
    pub const GETLK: u32 = 31;
    pub const SETLK: u32 = 32;
    pub const SETLKW: u32 = 33;
    pub const ACCESS: u32 = 34;
    pub const CREATE: u32 = 35;
    pub const INTERRUPT: u32 = 36;
    pub const BMAP: u32 = 37;
    pub const DESTROY: u32 = 38;
    pub const IOCTL: u32 = 39;
    pub const POLL: u32 = 40;
    pub const NOTIFY_REPLY: u32 = 41;
    pub const BATCH_FORGET: u32 = 42;
    pub const FALLOCATE: u32 = 43;
    pub const READDIRPLUS: u32 = 44;
    pub const RENAME2: u32 = 45;
    pub const LSEEK: u32 = 46;
    pub const COPY_FILE_RANGE: u32 = 47;
    pub const SETUPMAPPING: u32 = 48;
    pub const REMOVEMAPPING: u32 = 49;
    pub const SYNCFS: u32 = 50;
    pub const TMPFILE: u32 = 51;
    pub const STATX: u32 = 52;

    /// Opcode terbesar yang dikenal tabel ini
    pub const MAX_KNOWN: u32 = STATX;
}

/// Nama opcode untuk statistik dan log.
pub fn opcode_name(op: u32) -> &'static str {
    use opcode::*;
    match op {
        LOOKUP => "LOOKUP",
        FORGET => "FORGET",
        GETATTR => "GETATTR",
        SETATTR => "SETATTR",
        READLINK => "READLINK",
        SYMLINK => "SYMLINK",
        MKNOD => "MKNOD",
        MKDIR => "MKDIR",
        UNLINK => "UNLINK",
        RMDIR => "RMDIR",
        RENAME => "RENAME",
        LINK => "LINK",
        OPEN => "OPEN",
        READ => "READ",
        WRITE => "WRITE",
        STATFS => "STATFS",
        RELEASE => "RELEASE",
        FSYNC => "FSYNC",
        SETXATTR => "SETXATTR",
        GETXATTR => "GETXATTR",
        LISTXATTR => "LISTXATTR",
        REMOVEXATTR => "REMOVEXATTR",
        FLUSH => "FLUSH",
        INIT => "INIT",
        OPENDIR => "OPENDIR",
        READDIR => "READDIR",
        RELEASEDIR => "RELEASEDIR",
        FSYNCDIR => "FSYNCDIR",
        GETLK => "GETLK",
        SETLK => "SETLK",
        SETLKW => "SETLKW",
        ACCESS => "ACCESS",
        CREATE => "CREATE",
        INTERRUPT => "INTERRUPT",
        BMAP => "BMAP",
        DESTROY => "DESTROY",
        IOCTL => "IOCTL",
        POLL => "POLL",
        NOTIFY_REPLY => "NOTIFY_REPLY",
        BATCH_FORGET => "BATCH_FORGET",
        FALLOCATE => "FALLOCATE",
        READDIRPLUS => "READDIRPLUS",
        RENAME2 => "RENAME2",
        LSEEK => "LSEEK",
        COPY_FILE_RANGE => "COPY_FILE_RANGE",
        SETUPMAPPING => "SETUPMAPPING",
        REMOVEMAPPING => "REMOVEMAPPING",
        SYNCFS => "SYNCFS",
        TMPFILE => "TMPFILE",
        STATX => "STATX",
        _ => "UNKNOWN",
    }
}

/// Status hasil operasi: 0 atau errno positif.
///
/// Di wire, status dikirim sebagai `-errno`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Status(i32);

impl Status {
    pub const OK: Status = Status(0);
    pub const EIO: Status = Status(libc::EIO);
    pub const ENOSYS: Status = Status(libc::ENOSYS);
    pub const ENOENT: Status = Status(libc::ENOENT);
    pub const EINVAL: Status = Status(libc::EINVAL);
    pub const EACCES: Status = Status(libc::EACCES);
    pub const EPERM: Status = Status(libc::EPERM);
    pub const EBADF: Status = Status(libc::EBADF);
    pub const ENOTDIR: Status = Status(libc::ENOTDIR);
    pub const EISDIR: Status = Status(libc::EISDIR);
    pub const ERANGE: Status = Status(libc::ERANGE);

    /// Status dari errno positif. Nilai negatif dinormalisasi.
    #[inline(always)]
    pub const fn from_errno(errno: i32) -> Self {
        Status(errno.wrapping_abs())
    }

    #[inline(always)]
    pub const fn errno(self) -> i32 {
        self.0
    }

    #[inline(always)]
    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// Nilai yang ditulis ke `OutHeader::error`
    #[inline(always)]
    pub const fn wire_code(self) -> i32 {
        -self.0
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            f.write_str("OK")
        } else {
            write!(f, "{}", std::io::Error::from_raw_os_error(self.0))
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
