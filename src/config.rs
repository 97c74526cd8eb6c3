//! Session configuration

use crate::error::ConfigError;

/// Ukuran buffer message default (power of two, 64KB)
pub const DEFAULT_BUFFER_SIZE: usize = 1 << 16;
/// Jumlah worker default untuk mode concurrent
pub const DEFAULT_WORKERS: usize = 10;

/// Page size sistem; fallback 4096 jika `sysconf` gagal.
pub fn page_size() -> usize {
    // SAFETY: sysconf tidak menyentuh memori caller
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as usize
    }
}

/// Konfigurasi session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Kapasitas setiap buffer message; kelipatan page size
    pub buffer_size: usize,
    /// Jumlah worker untuk `Session::run`
    pub workers: usize,
    /// Aktifkan latency tracker
    pub record_latency: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE.max(2 * page_size()),
            workers: DEFAULT_WORKERS,
            record_latency: false,
        }
    }
}

impl SessionConfig {
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_latency(mut self, record: bool) -> Self {
        self.record_latency = record;
        self
    }

    /// Validasi terhadap page size sistem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let page = page_size();
        if self.buffer_size % page != 0 {
            return Err(ConfigError::UnalignedBuffer {
                size: self.buffer_size,
                page,
            });
        }
        if self.buffer_size < 2 * page {
            return Err(ConfigError::BufferTooSmall {
                size: self.buffer_size,
                page,
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }

    /// Maksimum data READ/WRITE yang muat: satu page disisakan untuk header.
    pub fn max_read(&self) -> usize {
        self.buffer_size.saturating_sub(page_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.validate(), Ok(()));
        assert_eq!(cfg.max_read(), cfg.buffer_size - page_size());
        assert!(!cfg.record_latency);
    }

    #[test]
    fn test_rejects_unaligned_and_small() {
        let page = page_size();
        assert_eq!(
            SessionConfig::default().with_buffer_size(page * 2 + 1).validate(),
            Err(ConfigError::UnalignedBuffer { size: page * 2 + 1, page })
        );
        assert_eq!(
            SessionConfig::default().with_buffer_size(page).validate(),
            Err(ConfigError::BufferTooSmall { size: page, page })
        );
        assert_eq!(
            SessionConfig::default().with_workers(0).validate(),
            Err(ConfigError::NoWorkers)
        );
    }
}
