//! Setup logging untuk binary
//!
//! Library hanya memakai macro `tracing`; subscriber dipasang di sini.
//! `RUST_LOG` selalu menang atas level default.

use std::io;

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Pasang subscriber global yang menulis ke stderr.
///
/// Stdout dibiarkan untuk output benchmark.
pub fn init(default_level: Level) -> Result<(), tracing_subscriber::util::TryInitError> {
    init_with_writer(default_level, io::stderr)
}

pub fn init_with_writer<W>(
    default_level: Level,
    writer: W,
) -> Result<(), tracing_subscriber::util::TryInitError>
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), default_level))
    });
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_thread_names(true);
    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
}
