//! Control Loop: satu worker = satu loop read → decode → dispatch →
//! encode → write → recycle
//!
//! Worker tidak pernah panic karena input: semua kegagalan decode dan
//! handler diubah jadi status reply, kegagalan channel diubah jadi
//! `StopReason`.

use std::fmt;
use std::time::Instant;

use tracing::{debug, error, trace, warn};

use super::Shared;
use crate::channel::ReadFailure;
use crate::dispatch::dispatch;
use crate::protocol::{decode, encode_reply, opcode_name, DecodeError, Request};

/// Alasan worker keluar dari loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Channel tidak lagi punya mount (ENODEV)
    Unmounted,
    /// Kernel tidak mendukung read pada channel ini (ENOSYS)
    Unsupported,
    /// Read error yang tidak dikenal
    Failed { errno: Option<i32>, message: String },
    /// Thread worker panic
    Panicked,
}

impl StopReason {
    /// Berhenti karena lifecycle normal, bukan anomali
    pub fn is_clean(&self) -> bool {
        matches!(self, StopReason::Unmounted | StopReason::Unsupported)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Unmounted => f.write_str("unmounted"),
            StopReason::Unsupported => f.write_str("unsupported by kernel"),
            StopReason::Failed { message, .. } => write!(f, "read failed: {message}"),
            StopReason::Panicked => f.write_str("worker panicked"),
        }
    }
}

/// State machine worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Stopped(StopReason),
}

/// Satu control loop
pub struct Worker {
    id: usize,
    shared: Shared,
    request: Request,
    state: WorkerState,
}

impl Worker {
    pub(crate) fn new(id: usize, shared: Shared) -> Self {
        Self {
            id,
            shared,
            request: Request::new(),
            state: WorkerState::Running,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> &WorkerState {
        &self.state
    }

    /// Loop sampai channel melaporkan kondisi terminal.
    pub fn run(mut self) -> StopReason {
        debug!(worker = self.id, "worker started");
        loop {
            if let Some(reason) = self.step() {
                debug!(worker = self.id, reason = %reason, "worker stopped");
                return reason;
            }
        }
    }

    /// Satu cycle. Returns `Some` jika worker berhenti.
    pub fn step(&mut self) -> Option<StopReason> {
        if let WorkerState::Stopped(reason) = &self.state {
            return Some(reason.clone());
        }

        self.request.begin(self.shared.pool.acquire());
        match self.shared.channel.read(self.request.input_mut()) {
            Ok(n) => {
                self.request.set_filled(n);
                // Timing dimulai setelah read supaya waktu tunggu input tidak terhitung
                if self.shared.latency.is_some() {
                    self.request.start = Some(Instant::now());
                }
                self.handle();
                self.finish();
                None
            }
            Err(err) => {
                self.request.recycle(&self.shared.pool);
                let reason = match ReadFailure::classify(err) {
                    ReadFailure::Transient => {
                        trace!(worker = self.id, "transient read failure, retrying");
                        return None;
                    }
                    ReadFailure::Unmounted => StopReason::Unmounted,
                    ReadFailure::Unsupported => StopReason::Unsupported,
                    ReadFailure::Unknown(err) => {
                        error!(worker = self.id, error = %err, "failed to read from channel");
                        StopReason::Failed {
                            errno: err.raw_os_error(),
                            message: err.to_string(),
                        }
                    }
                };
                self.state = WorkerState::Stopped(reason.clone());
                Some(reason)
            }
        }
    }

    fn handle(&mut self) {
        let shared = &self.shared;
        let req = &mut self.request;

        match decode(req.input(), &shared.registry) {
            Ok(decoded) => {
                let op = decoded.operation;
                req.set_decoded(decoded.header, decoded.arg, decoded.tail);
                dispatch(op, req, &shared.pool);
            }
            Err(err) => {
                match &err {
                    DecodeError::ShortHeader { len } => {
                        warn!(worker = self.id, len, "short read for input header")
                    }
                    DecodeError::Unsupported { opcode, .. } => {
                        debug!(worker = self.id, opcode, "unknown opcode")
                    }
                    DecodeError::ShortArgument { opcode, need, got, .. } => warn!(
                        worker = self.id,
                        op = opcode_name(*opcode),
                        need,
                        got,
                        "short read for argument"
                    ),
                }
                req.set_rejected(err.header(), err.status());
            }
        }

        if shared.latency.is_some() {
            req.pre_write = Some(Instant::now());
        }

        let opcode = req.opcode();
        if opcode.map_or(false, |op| shared.registry.is_no_reply(op)) {
            return;
        }

        let unique = match req.unique() {
            Some(unique) => unique,
            None => {
                warn!(
                    worker = self.id,
                    len = req.input().len(),
                    "dropping reply: correlation id unreadable"
                );
                return;
            }
        };

        let (status, payload_len, flat_len) = (req.status(), req.payload_len(), req.flat_len());
        encode_reply(req.reply_mut(), unique, status, payload_len, flat_len);
        req.mark_encoded();

        let written = match req.flat_bytes() {
            Some(flat) => shared.channel.write_vectored(req.reply_bytes(), flat),
            None => shared.channel.write(req.reply_bytes()),
        };
        if let Err(err) = written {
            // Tidak ada resend di protokol ini; reply di-drop
            error!(
                worker = self.id,
                op = opcode.map_or("UNKNOWN", opcode_name),
                unique,
                error = %err,
                "reply write failed"
            );
        }
        req.mark_written();
    }

    fn finish(&mut self) {
        if let (Some(tracker), Some(start)) = (&self.shared.latency, self.request.start) {
            if let Some(op) = self.request.opcode() {
                let end = Instant::now();
                let pre_write = self.request.pre_write.unwrap_or(end);
                tracker.record(
                    op,
                    end.saturating_duration_since(start),
                    end.saturating_duration_since(pre_write),
                );
            }
        }
        self.request.recycle(&self.shared.pool);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Buffer yang masih dipegang (misalnya saat unwinding) kembali ke pool
        self.request.recycle(&self.shared.pool);
    }
}
