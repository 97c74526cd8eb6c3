//! Session: state satu mount point
//!
//! Menyusun channel, registry, buffer pool, dan latency tracker (opsional)
//! lalu menjalankan control loop, baik satu worker di thread pemanggil
//! maupun `WorkerGroup` berisi N thread.
//!
//! Mount dan unmount sendiri didelegasikan ke `Mounter`.

mod worker;
mod workers;

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::channel::Channel;
use crate::config::SessionConfig;
use crate::core::{BufferPool, LatencyTracker, PoolStats};
use crate::dispatch::OperationRegistry;
use crate::error::{ConfigError, Result, SessionError};

pub use worker::{StopReason, Worker, WorkerState};
pub use workers::WorkerGroup;

/// Kolaborator yang melakukan syscall mount/unmount
pub trait Mounter: Send + Sync {
    /// Mount di `mount_point`; returns channel ke kernel dan path final.
    fn mount(&self, mount_point: &Path) -> io::Result<(Arc<dyn Channel>, PathBuf)>;

    fn unmount(&self, mount_point: &Path) -> io::Result<()>;
}

/// Komponen yang dibagi semua worker
#[derive(Clone)]
pub(crate) struct Shared {
    pub(crate) channel: Arc<dyn Channel>,
    pub(crate) registry: Arc<OperationRegistry>,
    pub(crate) pool: Arc<BufferPool>,
    pub(crate) latency: Option<Arc<LatencyTracker>>,
}

/// Hasil `run`: alasan berhenti setiap worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub stops: Vec<StopReason>,
}

impl RunReport {
    /// Semua worker berhenti karena lifecycle normal
    pub fn is_clean(&self) -> bool {
        self.stops.iter().all(StopReason::is_clean)
    }
}

/// State mount point
pub struct Session {
    config: SessionConfig,
    registry: Arc<OperationRegistry>,
    pool: Arc<BufferPool>,
    latency: Option<Arc<LatencyTracker>>,
    channel: Option<Arc<dyn Channel>>,
    mounter: Option<Arc<dyn Mounter>>,
    mount_point: Option<PathBuf>,
}

impl Session {
    /// Session tanpa channel; panggil `mount` sebelum `run`.
    pub fn new(registry: Arc<OperationRegistry>, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let latency = config
            .record_latency
            .then(|| Arc::new(LatencyTracker::new()));
        Ok(Self {
            pool: Arc::new(BufferPool::new(config.buffer_size)),
            config,
            registry,
            latency,
            channel: None,
            mounter: None,
            mount_point: None,
        })
    }

    /// Session di atas channel yang sudah terhubung (mount dilakukan di luar).
    pub fn with_channel(
        channel: Arc<dyn Channel>,
        registry: Arc<OperationRegistry>,
        config: SessionConfig,
    ) -> Result<Self> {
        let mut session = Self::new(registry, config)?;
        session.channel = Some(channel);
        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn mount_point(&self) -> Option<&Path> {
        self.mount_point.as_deref()
    }

    pub fn is_mounted(&self) -> bool {
        self.mount_point.is_some()
    }

    pub fn mount<P: AsRef<Path>>(&mut self, mounter: Arc<dyn Mounter>, mount_point: P) -> Result<()> {
        if let Some(existing) = &self.mount_point {
            return Err(SessionError::AlreadyMounted(existing.clone()));
        }
        let path = mount_point.as_ref();
        let (channel, resolved) = mounter.mount(path).map_err(|source| SessionError::Mount {
            path: path.to_path_buf(),
            source,
        })?;
        info!(mount_point = %resolved.display(), "mounted");
        self.channel = Some(channel);
        self.mounter = Some(mounter);
        self.mount_point = Some(resolved);
        Ok(())
    }

    /// Unmount; mount point hanya dilepas jika unmount sukses.
    pub fn unmount(&mut self) -> Result<()> {
        let (mounter, path) = match (&self.mounter, &self.mount_point) {
            (Some(mounter), Some(path)) => (Arc::clone(mounter), path.clone()),
            _ => return Err(SessionError::NotMounted),
        };
        mounter
            .unmount(&path)
            .map_err(|source| SessionError::Unmount {
                path: path.clone(),
                source,
            })?;
        info!(mount_point = %path.display(), "unmounted");
        self.mount_point = None;
        Ok(())
    }

    /// Aktifkan atau matikan latency tracker.
    ///
    /// Mematikan membuang statistik yang sudah terkumpul.
    pub fn set_record_statistics(&mut self, record: bool) {
        self.config.record_latency = record;
        self.latency = record.then(|| Arc::new(LatencyTracker::new()));
    }

    pub fn latency_tracker(&self) -> Option<&LatencyTracker> {
        self.latency.as_deref()
    }

    fn shared(&self) -> Result<Shared> {
        let channel = self.channel.clone().ok_or(SessionError::NotMounted)?;
        Ok(Shared {
            channel,
            registry: Arc::clone(&self.registry),
            pool: Arc::clone(&self.pool),
            latency: self.latency.clone(),
        })
    }

    /// Jalankan control loop dengan jumlah worker dari config.
    pub fn run(&self) -> Result<RunReport> {
        self.run_with(self.config.workers)
    }

    /// Jalankan control loop sampai semua worker berhenti.
    ///
    /// `workers == 1`: satu worker di thread pemanggil (deterministik).
    /// `workers > 1`: `WorkerGroup` berisi `workers` thread, di-join di sini.
    /// Channel ditutup setelah semua worker keluar.
    pub fn run_with(&self, workers: usize) -> Result<RunReport> {
        if workers == 0 {
            return Err(ConfigError::NoWorkers.into());
        }
        let shared = self.shared()?;
        info!(workers, buffer_size = self.pool.buffer_size(), "control loop starting");

        let stops = if workers == 1 {
            vec![Worker::new(0, shared.clone()).run()]
        } else {
            WorkerGroup::spawn(workers, &shared)?.join()
        };
        shared.channel.close();

        let report = RunReport { stops };
        if report.is_clean() {
            info!(workers, "control loop stopped");
        } else {
            warn!(workers, stops = ?report.stops, "control loop stopped with failures");
        }
        Ok(report)
    }

    /// Rata-rata latency (ms) per opcode; kosong jika tracker mati.
    pub fn latencies(&self) -> BTreeMap<String, f64> {
        self.latency
            .as_ref()
            .map(|t| t.latencies_ms())
            .unwrap_or_default()
    }

    /// Jumlah request per opcode; kosong jika tracker mati.
    pub fn operation_counts(&self) -> BTreeMap<String, u64> {
        self.latency
            .as_ref()
            .map(|t| t.counts())
            .unwrap_or_default()
    }

    pub fn buffer_pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::protocol::{opcode, InHeader, OutHeader, Status, WireStruct, IN_HEADER_SIZE};
    use crate::dispatch::OpSpec;
    use parking_lot::Mutex;

    fn registry() -> Arc<OperationRegistry> {
        Arc::new(
            OperationRegistry::builder()
                .register_fn(opcode::GETATTR, OpSpec::new(0, 8), |req, out| {
                    out.payload_mut().copy_from_slice(&req.nodeid().to_ne_bytes());
                    Status::OK
                })
                .build(),
        )
    }

    fn getattr(unique: u64, nodeid: u64) -> Vec<u8> {
        let header = InHeader {
            len: IN_HEADER_SIZE as u32,
            opcode: opcode::GETATTR,
            unique,
            nodeid,
            ..Default::default()
        };
        let mut buf = vec![0u8; IN_HEADER_SIZE];
        header.encode_into(&mut buf);
        buf
    }

    struct FakeMounter {
        channel: Arc<MemoryChannel>,
        unmounts: Mutex<Vec<PathBuf>>,
        fail_unmount: bool,
    }

    impl Mounter for FakeMounter {
        fn mount(&self, mount_point: &Path) -> io::Result<(Arc<dyn Channel>, PathBuf)> {
            let channel: Arc<dyn Channel> = self.channel.clone();
            Ok((channel, mount_point.to_path_buf()))
        }

        fn unmount(&self, mount_point: &Path) -> io::Result<()> {
            if self.fail_unmount {
                return Err(io::Error::from_raw_os_error(libc::EBUSY));
            }
            self.unmounts.lock().push(mount_point.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn test_run_requires_channel() {
        let session = Session::new(registry(), SessionConfig::default()).unwrap();
        assert!(matches!(session.run_with(1), Err(SessionError::NotMounted)));
        assert!(matches!(
            session.run_with(0),
            Err(SessionError::Config(ConfigError::NoWorkers))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = SessionConfig::default().with_buffer_size(1000);
        assert!(matches!(
            Session::new(registry(), cfg),
            Err(SessionError::Config(ConfigError::UnalignedBuffer { .. }))
        ));
    }

    #[test]
    fn test_mount_run_unmount() {
        let channel = Arc::new(MemoryChannel::new());
        channel.push_message(getattr(1, 42));
        channel.close_when_drained();

        let mounter = Arc::new(FakeMounter {
            channel: Arc::clone(&channel),
            unmounts: Mutex::new(Vec::new()),
            fail_unmount: false,
        });

        let mut session = Session::new(registry(), SessionConfig::default()).unwrap();
        session.mount(mounter.clone(), "/mnt/test").unwrap();
        assert_eq!(session.mount_point(), Some(Path::new("/mnt/test")));
        assert!(matches!(
            session.mount(mounter.clone(), "/mnt/other"),
            Err(SessionError::AlreadyMounted(_))
        ));

        let report = session.run_with(1).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.stops, vec![StopReason::Unmounted]);
        assert!(channel.is_closed());

        let replies = channel.replies();
        assert_eq!(replies.len(), 1);
        let header = OutHeader::decode(&replies[0].head).unwrap();
        assert_eq!(header.unique, 1);
        assert_eq!(replies[0].payload(), &42u64.to_ne_bytes());

        session.unmount().unwrap();
        assert!(!session.is_mounted());
        assert_eq!(mounter.unmounts.lock().as_slice(), &[PathBuf::from("/mnt/test")]);
        assert!(matches!(session.unmount(), Err(SessionError::NotMounted)));
    }

    #[test]
    fn test_failed_unmount_keeps_mount_point() {
        let mounter = Arc::new(FakeMounter {
            channel: Arc::new(MemoryChannel::new()),
            unmounts: Mutex::new(Vec::new()),
            fail_unmount: true,
        });
        let mut session = Session::new(registry(), SessionConfig::default()).unwrap();
        session.mount(mounter, "/mnt/busy").unwrap();

        assert!(matches!(session.unmount(), Err(SessionError::Unmount { .. })));
        assert!(session.is_mounted());
    }

    #[test]
    fn test_record_statistics_toggle() {
        let channel = Arc::new(MemoryChannel::new());
        for unique in 0..5 {
            channel.push_message(getattr(unique, 1));
        }
        channel.close_when_drained();

        let mut session =
            Session::with_channel(channel, registry(), SessionConfig::default()).unwrap();
        assert!(session.latencies().is_empty());
        session.set_record_statistics(true);
        session.run_with(1).unwrap();

        assert_eq!(session.operation_counts().get("GETATTR"), Some(&5));
        assert!(session.latencies().contains_key("GETATTR"));
        assert!(session.latencies().contains_key("GETATTR-write"));

        session.set_record_statistics(false);
        assert!(session.latency_tracker().is_none());
        assert!(session.operation_counts().is_empty());
    }
}
