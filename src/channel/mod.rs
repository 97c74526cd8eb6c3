//! Channel Layer: device message-framed ke kernel
//!
//! Satu `read` = satu message utuh, satu `write`/`write_vectored` = satu
//! reply. Semua method mengambil `&self` supaya banyak worker bisa
//! membaca channel yang sama secara paralel.
//!
//! Implementasi:
//! - `DeviceChannel`: file descriptor asli (misalnya `/dev/fuse`)
//! - `MemoryChannel`: in-process, untuk tests, demo, dan bench

mod device;
mod memory;

use std::io;

pub use device::DeviceChannel;
pub use memory::{Inbound, MemoryChannel, Reply};

/// Kontrak channel yang dipakai control loop
pub trait Channel: Send + Sync {
    /// Blocking read satu message ke `buf`. Returns jumlah byte.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Kirim reply dalam satu write.
    fn write(&self, bytes: &[u8]) -> io::Result<()>;

    /// Kirim reply dua bagian (header + fixed output, lalu flat payload)
    /// sebagai satu message.
    fn write_vectored(&self, head: &[u8], flat: &[u8]) -> io::Result<()>;

    /// Tutup channel; read berikutnya gagal dengan kondisi terminal.
    fn close(&self);
}

/// Klasifikasi kegagalan read
#[derive(Debug)]
pub enum ReadFailure {
    /// Entry hilang saat message diambil (ENOENT) atau read terinterupsi
    /// signal (EINTR): coba lagi
    Transient,
    /// Mount sudah tidak ada (ENODEV)
    Unmounted,
    /// Kernel tidak mendukung operasi ini (ENOSYS)
    Unsupported,
    /// Error lain; worker berhenti setelah log
    Unknown(io::Error),
}

impl ReadFailure {
    pub fn classify(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::ENOENT) | Some(libc::EINTR) => ReadFailure::Transient,
            Some(libc::ENODEV) => ReadFailure::Unmounted,
            Some(libc::ENOSYS) => ReadFailure::Unsupported,
            _ if err.kind() == io::ErrorKind::Interrupted => ReadFailure::Transient,
            _ => ReadFailure::Unknown(err),
        }
    }

    #[inline(always)]
    pub fn is_transient(&self) -> bool {
        matches!(self, ReadFailure::Transient)
    }
}
