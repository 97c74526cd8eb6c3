//! Error types untuk config dan lifecycle session
//!
//! Error decode (`DecodeError`) hidup di `protocol` karena selalu
//! diselesaikan lokal menjadi status reply.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Konfigurasi yang tidak valid
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("buffer size {size} is not a multiple of the page size {page}")]
    UnalignedBuffer { size: usize, page: usize },

    #[error("buffer size {size} must hold at least two pages of {page} bytes")]
    BufferTooSmall { size: usize, page: usize },

    #[error("worker count must be at least 1")]
    NoWorkers,
}

/// Kegagalan lifecycle session (mount, unmount, run)
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session has no channel; mount it first")]
    NotMounted,

    #[error("session is already mounted at {0}")]
    AlreadyMounted(PathBuf),

    #[error("mount of {path} failed")]
    Mount {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unmount of {path} failed")]
    Unmount {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn worker {index}")]
    Spawn {
        index: usize,
        #[source]
        source: io::Error,
    },
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
