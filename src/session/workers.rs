//! Worker group: N thread, masing-masing memiliki satu control loop
//!
//! Koordinasi antar worker hanya lewat channel, buffer pool, dan latency
//! tracker yang sudah thread-safe. Group di-join saat shutdown.

use std::thread::{self, JoinHandle};

use tracing::{debug, error};

use super::worker::{StopReason, Worker};
use super::Shared;
use crate::error::{Result, SessionError};

/// Kumpulan worker thread yang sedang jalan
pub struct WorkerGroup {
    handles: Vec<(usize, JoinHandle<StopReason>)>,
}

impl WorkerGroup {
    /// Spawn `count` worker.
    ///
    /// Jika spawn gagal di tengah jalan, channel ditutup dan worker yang
    /// sudah jalan di-join sebelum error dikembalikan.
    pub(crate) fn spawn(count: usize, shared: &Shared) -> Result<Self> {
        let mut group = Self {
            handles: Vec::with_capacity(count),
        };

        for id in 0..count {
            let worker = Worker::new(id, shared.clone());
            let spawned = thread::Builder::new()
                .name(format!("fuseloop-worker-{id}"))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => group.handles.push((id, handle)),
                Err(source) => {
                    error!(worker = id, error = %source, "failed to spawn worker");
                    shared.channel.close();
                    group.join();
                    return Err(SessionError::Spawn { index: id, source });
                }
            }
        }

        debug!(workers = count, "worker group started");
        Ok(group)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Tunggu semua worker selesai; urutan hasil mengikuti id worker.
    pub fn join(self) -> Vec<StopReason> {
        self.handles
            .into_iter()
            .map(|(id, handle)| match handle.join() {
                Ok(reason) => reason,
                Err(_) => {
                    error!(worker = id, "worker thread panicked");
                    StopReason::Panicked
                }
            })
            .collect()
    }
}
