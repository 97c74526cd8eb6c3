//! Device channel di atas file descriptor
//!
//! Mount helper (di luar crate ini) membuka device dan menyerahkan fd;
//! channel ini hanya melakukan read/write/writev mentah via libc.
//!
//! Read menunggu lewat `poll(2)` pada dua fd: device (non-blocking) dan
//! sisi baca self-pipe. `close()` menulis satu byte ke self-pipe yang tidak
//! pernah dikuras, jadi semua reader yang sedang atau akan menunggu bangun
//! dengan ENODEV. Fd device baru dilepas saat channel di-drop, sehingga
//! nomornya tidak bisa dipakai ulang selama masih ada reader.

use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use super::Channel;

/// Channel ke kernel lewat file descriptor milik sendiri
pub struct DeviceChannel {
    fd: OwnedFd,
    wake_rx: OwnedFd,
    wake_tx: OwnedFd,
    closed: AtomicBool,
}

impl DeviceChannel {
    /// Ambil alih fd yang sudah terhubung ke mount.
    ///
    /// Fd diubah ke mode non-blocking; blocking ditangani lewat `poll`.
    pub fn new(fd: OwnedFd) -> io::Result<Self> {
        set_flags(fd.as_raw_fd(), libc::O_NONBLOCK)?;
        let (wake_rx, wake_tx) = self_pipe()?;
        Ok(Self {
            fd,
            wake_rx,
            wake_tx,
            closed: AtomicBool::new(false),
        })
    }

    /// Buka device (misalnya `/dev/fuse`) read/write.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::new(OwnedFd::from(file))
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[inline(always)]
    fn check_open(&self) -> io::Result<()> {
        if self.is_closed() {
            return Err(unmounted());
        }
        Ok(())
    }

    /// Tunggu sampai device readable atau channel ditutup.
    fn wait_readable(&self) -> io::Result<()> {
        let mut fds = [
            libc::pollfd {
                fd: self.fd.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: self.wake_rx.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];
        // SAFETY: fds valid dan hidup selama call; kedua fd dimiliki self
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if rc < 0 {
            // EINTR diteruskan; control loop menganggapnya transient
            return Err(io::Error::last_os_error());
        }
        if fds[1].revents != 0 || self.is_closed() {
            return Err(unmounted());
        }
        Ok(())
    }

    #[inline(always)]
    fn check_written(written: isize, expected: usize) -> io::Result<()> {
        if written < 0 {
            return Err(io::Error::last_os_error());
        }
        if written as usize != expected {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short reply write: {written} of {expected} bytes"),
            ));
        }
        Ok(())
    }
}

impl Channel for DeviceChannel {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            self.check_open()?;
            self.wait_readable()?;
            // SAFETY: buf valid untuk buf.len() byte selama call
            let n = unsafe {
                libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len())
            };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            // Worker lain sudah mengambil message ini; tunggu lagi
            if err.kind() != io::ErrorKind::WouldBlock {
                return Err(err);
            }
        }
    }

    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        self.check_open()?;
        // SAFETY: bytes valid untuk bytes.len() byte selama call
        let n = unsafe {
            libc::write(self.fd.as_raw_fd(), bytes.as_ptr() as *const libc::c_void, bytes.len())
        };
        Self::check_written(n, bytes.len())
    }

    fn write_vectored(&self, head: &[u8], flat: &[u8]) -> io::Result<()> {
        self.check_open()?;
        let iov = [
            libc::iovec {
                iov_base: head.as_ptr() as *mut libc::c_void,
                iov_len: head.len(),
            },
            libc::iovec {
                iov_base: flat.as_ptr() as *mut libc::c_void,
                iov_len: flat.len(),
            },
        ];
        // SAFETY: kedua iovec menunjuk slice yang hidup selama call;
        // kernel hanya membaca dari buffer ini
        let n = unsafe { libc::writev(self.fd.as_raw_fd(), iov.as_ptr(), iov.len() as libc::c_int) };
        Self::check_written(n, head.len() + flat.len())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(fd = self.fd.as_raw_fd(), "closing channel");
        let byte = 1u8;
        // SAFETY: menulis satu byte dari stack ke pipe milik self
        let n = unsafe {
            libc::write(self.wake_tx.as_raw_fd(), &byte as *const u8 as *const libc::c_void, 1)
        };
        if n != 1 {
            // Reader tetap berhenti di check_open berikutnya
            debug!(error = %io::Error::last_os_error(), "failed to signal self-pipe");
        }
    }
}

fn unmounted() -> io::Error {
    io::Error::from_raw_os_error(libc::ENODEV)
}

/// Tambah status flag (misalnya `O_NONBLOCK`) ke fd.
fn set_flags(fd: RawFd, flags: libc::c_int) -> io::Result<()> {
    // SAFETY: fcntl hanya membaca/mengubah flag fd milik caller
    unsafe {
        let current = libc::fcntl(fd, libc::F_GETFL);
        if current < 0 || libc::fcntl(fd, libc::F_SETFL, current | flags) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Self-pipe non-blocking dan close-on-exec: (sisi baca, sisi tulis).
fn self_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: fds berisi dua slot untuk hasil pipe(2)
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe(2) sukses, kedua fd baru dan belum dimiliki siapa pun
    let (rx, tx) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    for fd in [rx.as_raw_fd(), tx.as_raw_fd()] {
        set_flags(fd, libc::O_NONBLOCK)?;
        // SAFETY: fd valid, dimiliki rx/tx di atas
        if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok((rx, tx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Pipe sebagai pengganti device: satu sisi dibungkus channel.
    fn pipe() -> (OwnedFd, OwnedFd) {
        let mut fds = [0 as libc::c_int; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
    }

    #[test]
    fn test_write_then_read_through_pipe() {
        let (rx, tx) = pipe();
        let writer = DeviceChannel::new(tx).unwrap();
        let reader = DeviceChannel::new(rx).unwrap();

        writer.write_vectored(b"head", b"-flat").unwrap();
        let mut buf = [0u8; 64];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"head-flat");

        writer.write(b"again").unwrap();
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"again");
    }

    #[test]
    fn test_read_after_close_is_unmounted() {
        let (rx, _tx) = pipe();
        let reader = DeviceChannel::new(rx).unwrap();
        reader.close();
        reader.close();

        let err = reader.read(&mut [0u8; 8]).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENODEV));
        assert!(reader.write(b"x").is_err());
    }

    #[test]
    fn test_close_wakes_blocked_reader() {
        let (rx, _tx) = pipe();
        let chan = Arc::new(DeviceChannel::new(rx).unwrap());
        let (done_tx, done_rx) = mpsc::channel();
        {
            let chan = Arc::clone(&chan);
            thread::spawn(move || {
                let _ = done_tx.send(chan.read(&mut [0u8; 64]));
            });
        }

        thread::sleep(Duration::from_millis(100));
        chan.close();

        let result = done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("reader still blocked after close");
        assert_eq!(result.unwrap_err().raw_os_error(), Some(libc::ENODEV));
        assert!(chan.is_closed());
    }

    #[test]
    fn test_close_wakes_every_reader() {
        let (rx, _tx) = pipe();
        let chan = Arc::new(DeviceChannel::new(rx).unwrap());
        let (done_tx, done_rx) = mpsc::channel();
        for _ in 0..4 {
            let chan = Arc::clone(&chan);
            let done_tx = done_tx.clone();
            thread::spawn(move || {
                let _ = done_tx.send(chan.read(&mut [0u8; 64]));
            });
        }

        thread::sleep(Duration::from_millis(50));
        chan.close();

        for _ in 0..4 {
            let result = done_rx
                .recv_timeout(Duration::from_secs(2))
                .expect("reader still blocked after close");
            assert_eq!(result.unwrap_err().raw_os_error(), Some(libc::ENODEV));
        }
    }

    #[test]
    fn test_fd_kept_until_drop() {
        let (rx, _tx) = pipe();
        let chan = DeviceChannel::new(rx).unwrap();
        let fd = chan.raw_fd();
        chan.close();

        // Nomor fd masih milik channel, belum bisa dipakai ulang
        // SAFETY: hanya query flag
        assert!(unsafe { libc::fcntl(fd, libc::F_GETFD) } >= 0);
    }
}
