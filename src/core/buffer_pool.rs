//! Lock-Free Buffer Pool untuk message dari kernel
//!
//! Setiap buffer punya kapasitas tetap (ukuran maksimum satu message).
//! Pool adalah reuse cache, bukan capacity limiter: jika free list kosong,
//! buffer baru dialokasikan.
//!
//! Ownership `Buffer` pindah ke caller saat `acquire()` dan kembali ke pool
//! saat `release()`, sehingga satu buffer tidak pernah dipegang dua worker.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam_queue::SegQueue;

/// Byte buffer berkapasitas tetap dengan logical length
pub struct Buffer {
    data: Box<[u8]>,
    len: usize,
}

impl Buffer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Kapasitas buffer (tidak pernah berubah)
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Logical length: byte yang sudah diisi
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set logical length setelah data ditulis lewat `spare_mut()`.
    ///
    /// Di-clamp ke kapasitas.
    #[inline(always)]
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.data.len());
    }

    #[inline(always)]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Data yang sudah diisi (zero-copy view)
    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Seluruh kapasitas untuk diisi (misalnya oleh `read(2)`)
    #[inline(always)]
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copy `bytes` ke awal buffer. Returns `false` jika tidak muat.
    #[inline]
    pub fn fill_from(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.data.len() {
            return false;
        }
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
        true
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len)
            .field("capacity", &self.data.len())
            .finish()
    }
}

/// Snapshot statistik pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Kapasitas setiap buffer
    pub buffer_size: usize,
    /// Buffer yang pernah dialokasikan
    pub created: u64,
    /// Acquire yang dilayani dari free list
    pub reused: u64,
    /// Buffer yang sedang dipegang caller
    pub outstanding: usize,
    /// Buffer yang menunggu di free list
    pub idle: usize,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BufferPool(size={} created={} reused={} outstanding={} idle={})",
            self.buffer_size, self.created, self.reused, self.outstanding, self.idle
        )
    }
}

/// Pool buffer MPMC yang aman dipakai semua worker sekaligus
pub struct BufferPool {
    buffer_size: usize,
    free: SegQueue<Box<[u8]>>,
    created: AtomicU64,
    reused: AtomicU64,
    outstanding: AtomicUsize,
}

impl BufferPool {
    /// Membuat pool kosong; buffer dialokasikan saat dibutuhkan.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            free: SegQueue::new(),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Kapasitas buffer yang dibagikan pool ini
    #[inline(always)]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Ambil buffer kosong (len 0) berkapasitas `buffer_size`.
    #[inline]
    pub fn acquire(&self) -> Buffer {
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        match self.free.pop() {
            Some(data) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                Buffer { data, len: 0 }
            }
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                Buffer::with_capacity(self.buffer_size)
            }
        }
    }

    /// Kembalikan buffer ke pool.
    ///
    /// Buffer dengan kapasitas lain di-drop, tidak masuk free list.
    #[inline]
    pub fn release(&self, buffer: Buffer) {
        // saturating: buffer asing tidak boleh membuat counter underflow
        let _ = self
            .outstanding
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));

        if buffer.data.len() == self.buffer_size {
            self.free.push(buffer.data);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            buffer_size: self.buffer_size,
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            outstanding: self.outstanding.load(Ordering::Relaxed),
            idle: self.free.len(),
        }
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.stats(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_acquire_fixed_capacity() {
        let pool = BufferPool::new(4096);
        let buf = pool.acquire();
        assert_eq!(buf.capacity(), 4096);
        assert_eq!(buf.len(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_release_resets_length() {
        let pool = BufferPool::new(256);

        let mut buf = pool.acquire();
        assert!(buf.fill_from(b"hello kernel"));
        assert_eq!(buf.len(), 12);
        pool.release(buf);

        // Reuse cycle beberapa kali, kapasitas tetap
        for _ in 0..10 {
            let buf = pool.acquire();
            assert_eq!(buf.capacity(), 256);
            assert_eq!(buf.len(), 0);
            pool.release(buf);
        }

        let stats = pool.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.reused, 10);
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.idle, 1);
    }

    #[test]
    fn test_foreign_buffer_dropped() {
        let small = BufferPool::new(64);
        let big = BufferPool::new(128);

        let foreign = small.acquire();
        big.release(foreign);
        assert_eq!(big.stats().idle, 0);
        assert_eq!(big.stats().outstanding, 0);

        // buffer berikutnya tetap berkapasitas benar
        assert_eq!(big.acquire().capacity(), 128);
    }

    #[test]
    fn test_fill_and_set_len_bounds() {
        let pool = BufferPool::new(8);
        let mut buf = pool.acquire();
        assert!(!buf.fill_from(&[1u8; 9]));
        buf.set_len(100);
        assert_eq!(buf.len(), 8);
        buf.clear();
        assert!(buf.as_slice().is_empty());
    }

    #[test]
    fn test_concurrent_no_aliasing() {
        const WORKERS: usize = 8;
        const ROUNDS: usize = 2000;

        let pool = Arc::new(BufferPool::new(1024));
        let barrier = Arc::new(Barrier::new(WORKERS));

        let handles: Vec<_> = (0..WORKERS)
            .map(|id| {
                let pool = Arc::clone(&pool);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let tag = id as u8 + 1;
                    for _ in 0..ROUNDS {
                        let mut buf = pool.acquire();
                        assert_eq!(buf.len(), 0);
                        buf.spare_mut().fill(tag);
                        buf.set_len(1024);
                        thread::yield_now();
                        // Tidak ada worker lain yang boleh menulis ke buffer ini
                        assert!(buf.as_slice().iter().all(|&b| b == tag));
                        pool.release(buf);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.created + stats.reused, (WORKERS * ROUNDS) as u64);
    }

    #[test]
    fn test_distinct_buffers_while_held() {
        let pool = BufferPool::new(32);
        let held: Vec<Buffer> = (0..16).map(|_| pool.acquire()).collect();
        let ptrs: HashSet<*const u8> = held.iter().map(|b| b.data.as_ptr()).collect();
        assert_eq!(ptrs.len(), 16);
        assert_eq!(pool.stats().outstanding, 16);
        for b in held {
            pool.release(b);
        }
        assert_eq!(pool.stats().idle, 16);
    }
}
