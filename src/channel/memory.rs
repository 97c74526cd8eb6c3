//! In-process channel dengan perilaku seperti device
//!
//! Inbound message dan error (errno) di-script lebih dulu; read memblok
//! sampai ada item atau channel ditutup. Reply ditangkap untuk diperiksa.

use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::Channel;
use crate::protocol::{OutHeader, WireStruct};

/// Item yang akan dikembalikan oleh `read`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Message(Vec<u8>),
    /// Read gagal dengan errno ini
    Error(i32),
}

/// Reply yang ditulis worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Header + fixed output
    pub head: Vec<u8>,
    /// Flat payload jika dikirim via writev
    pub flat: Option<Vec<u8>>,
}

impl Reply {
    pub fn header(&self) -> Option<OutHeader> {
        OutHeader::decode(&self.head)
    }

    /// Fixed output setelah reply header
    pub fn payload(&self) -> &[u8] {
        self.head.get(OutHeader::SIZE..).unwrap_or(&[])
    }

    /// Total byte yang benar-benar dikirim
    pub fn wire_len(&self) -> usize {
        self.head.len() + self.flat.as_ref().map_or(0, Vec::len)
    }
}

#[derive(Default)]
struct State {
    inbound: VecDeque<Inbound>,
    replies: Vec<Reply>,
    closed: bool,
    /// Begitu inbound habis, read mengembalikan ENODEV
    close_when_drained: bool,
    /// Sisa write yang akan gagal, dengan errno-nya
    failing_writes: usize,
    write_errno: i32,
    reads: u64,
}

/// Channel in-memory yang aman dipakai banyak worker
#[derive(Default)]
pub struct MemoryChannel {
    state: Mutex<State>,
    readable: Condvar,
    replied: Condvar,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Antre satu message utuh.
    pub fn push_message(&self, bytes: impl Into<Vec<u8>>) {
        self.push(Inbound::Message(bytes.into()));
    }

    /// Antre kegagalan read dengan errno tertentu.
    pub fn push_error(&self, errno: i32) {
        self.push(Inbound::Error(errno));
    }

    pub fn push(&self, item: Inbound) {
        self.state.lock().inbound.push_back(item);
        self.readable.notify_one();
    }

    /// Setelah semua inbound terbaca, read berikutnya melaporkan unmount.
    pub fn close_when_drained(&self) {
        self.state.lock().close_when_drained = true;
        self.readable.notify_all();
    }

    /// `count` write berikutnya gagal dengan `errno`.
    pub fn fail_writes(&self, count: usize, errno: i32) {
        let mut state = self.state.lock();
        state.failing_writes = count;
        state.write_errno = errno;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Jumlah read yang sudah dilayani (termasuk yang gagal)
    pub fn read_count(&self) -> u64 {
        self.state.lock().reads
    }

    pub fn pending(&self) -> usize {
        self.state.lock().inbound.len()
    }

    pub fn replies(&self) -> Vec<Reply> {
        self.state.lock().replies.clone()
    }

    pub fn take_replies(&self) -> Vec<Reply> {
        std::mem::take(&mut self.state.lock().replies)
    }

    pub fn reply_count(&self) -> usize {
        self.state.lock().replies.len()
    }

    /// Tunggu sampai setidaknya `count` reply masuk. Returns `false` jika timeout.
    pub fn wait_for_replies(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.replies.len() < count {
            if self.replied.wait_until(&mut state, deadline).timed_out() {
                return state.replies.len() >= count;
            }
        }
        true
    }

    fn store(&self, reply: Reply) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(io::Error::from_raw_os_error(libc::ENODEV));
        }
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(io::Error::from_raw_os_error(state.write_errno));
        }
        state.replies.push(reply);
        drop(state);
        self.replied.notify_all();
        Ok(())
    }
}

impl Channel for MemoryChannel {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(io::Error::from_raw_os_error(libc::ENODEV));
            }
            if let Some(item) = state.inbound.pop_front() {
                state.reads += 1;
                return match item {
                    Inbound::Error(errno) => Err(io::Error::from_raw_os_error(errno)),
                    // Device menolak buffer yang terlalu kecil untuk message
                    Inbound::Message(bytes) if bytes.len() > buf.len() => {
                        Err(io::Error::from_raw_os_error(libc::EINVAL))
                    }
                    Inbound::Message(bytes) => {
                        buf[..bytes.len()].copy_from_slice(&bytes);
                        Ok(bytes.len())
                    }
                };
            }
            if state.close_when_drained {
                return Err(io::Error::from_raw_os_error(libc::ENODEV));
            }
            self.readable.wait(&mut state);
        }
    }

    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        self.store(Reply {
            head: bytes.to_vec(),
            flat: None,
        })
    }

    fn write_vectored(&self, head: &[u8], flat: &[u8]) -> io::Result<()> {
        self.store(Reply {
            head: head.to_vec(),
            flat: Some(flat.to_vec()),
        })
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.readable.notify_all();
        self.replied.notify_all();
    }
}
