//! fuseloop - Control Loop Benchmark
//!
//! Menjalankan control loop di atas `MemoryChannel` dengan filesystem
//! "hello" kecil (satu file di root), lalu mencetak latency per opcode,
//! jumlah request, dan statistik buffer pool.
//!
//! Usage:
//!   cargo run --release -- --workers 4 --requests 200000

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing::{error, Level};

use fuseloop::channel::MemoryChannel;
use fuseloop::config::SessionConfig;
use fuseloop::logging;
use fuseloop::protocol::{
    opcode, ForgetIn, GetattrIn, InHeader, OutputSlot, ReadIn, RequestView, Status, WireStruct,
    IN_HEADER_SIZE,
};
use fuseloop::{Handler, OpSpec, OperationRegistry, Session};

const ROOT_INO: u64 = 1;
const HELLO_INO: u64 = 2;
const HELLO_NAME: &[u8] = b"hello";
const HELLO_CONTENT: &[u8] = b"Hello World!\n";

/// Ukuran fixed output FUSE untuk entry dan attr
const ENTRY_OUT_SIZE: usize = 128;
const ATTR_OUT_SIZE: usize = 104;

#[derive(Parser, Debug)]
#[command(name = "fuseloop", version, about = "FUSE control loop benchmark")]
struct Cli {
    /// Jumlah worker (1 = caller thread)
    #[arg(short, long, env = "FUSELOOP_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Jumlah request yang di-antre ke channel
    #[arg(short, long, default_value_t = 100_000)]
    requests: u64,

    /// Kapasitas buffer message (kelipatan page size)
    #[arg(long, env = "FUSELOOP_BUFFER_SIZE")]
    buffer_size: Option<usize>,

    /// Matikan latency tracker
    #[arg(long)]
    no_latency: bool,

    /// Level log default (RUST_LOG menimpa)
    #[arg(long, default_value = "info")]
    log_level: Level,
}

/// Filesystem read-only dengan satu file `/hello`
struct HelloFs;

impl Handler for HelloFs {
    fn handle(&self, req: &RequestView<'_>, out: &mut OutputSlot<'_>) -> Status {
        match req.opcode() {
            opcode::LOOKUP => {
                if req.nodeid() != ROOT_INO || req.filename() != HELLO_NAME {
                    return Status::ENOENT;
                }
                let entry = out.payload_mut();
                entry[..8].copy_from_slice(&HELLO_INO.to_ne_bytes());
                Status::OK
            }
            opcode::GETATTR => {
                let (ino, size) = match req.nodeid() {
                    ROOT_INO => (ROOT_INO, 0),
                    HELLO_INO => (HELLO_INO, HELLO_CONTENT.len() as u64),
                    _ => return Status::ENOENT,
                };
                // attr_valid(8) attr_valid_nsec(4) dummy(4) lalu attr: ino, size
                let attr = out.payload_mut();
                attr[16..24].copy_from_slice(&ino.to_ne_bytes());
                attr[24..32].copy_from_slice(&size.to_ne_bytes());
                Status::OK
            }
            opcode::READ => {
                if req.nodeid() != HELLO_INO {
                    return Status::ENOENT;
                }
                let Some(arg) = ReadIn::decode(req.arg()) else {
                    return Status::EIO;
                };
                let len = HELLO_CONTENT.len();
                let start = (arg.offset as usize).min(len);
                let end = start.saturating_add(arg.size as usize).min(len);
                match out.set_flat(&HELLO_CONTENT[start..end]) {
                    Ok(()) => Status::OK,
                    Err(status) => status,
                }
            }
            opcode::FORGET => Status::OK,
            _ => Status::ENOSYS,
        }
    }
}

fn hello_registry() -> OperationRegistry {
    let fs: Arc<dyn Handler> = Arc::new(HelloFs);
    OperationRegistry::builder()
        .register_shared(opcode::LOOKUP, OpSpec::new(0, ENTRY_OUT_SIZE), fs.clone())
        .register_shared(opcode::GETATTR, OpSpec::new(GetattrIn::SIZE, ATTR_OUT_SIZE), fs.clone())
        .register_shared(opcode::READ, OpSpec::new(ReadIn::SIZE, 0), fs.clone())
        .register_shared(opcode::FORGET, OpSpec::no_reply(ForgetIn::SIZE), fs)
        .build()
}

fn message(op: u32, unique: u64, nodeid: u64, body: &[u8]) -> Vec<u8> {
    let header = InHeader {
        len: (IN_HEADER_SIZE + body.len()) as u32,
        opcode: op,
        unique,
        nodeid,
        ..Default::default()
    };
    let mut buf = vec![0u8; IN_HEADER_SIZE];
    header.encode_into(&mut buf);
    buf.extend_from_slice(body);
    buf
}

/// Pola request yang berulang: lookup, getattr, read, forget, lookup gagal
fn workload(unique: u64) -> Vec<u8> {
    match unique % 5 {
        0 => message(opcode::LOOKUP, unique, ROOT_INO, b"hello\0"),
        1 => message(opcode::GETATTR, unique, HELLO_INO, &[0u8; GetattrIn::SIZE]),
        2 => {
            let mut arg = [0u8; ReadIn::SIZE];
            arg[16..20].copy_from_slice(&4096u32.to_ne_bytes());
            message(opcode::READ, unique, HELLO_INO, &arg)
        }
        3 => message(opcode::FORGET, unique, HELLO_INO, &1u64.to_ne_bytes()),
        _ => message(opcode::LOOKUP, unique, ROOT_INO, b"missing\0"),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = logging::init(cli.log_level) {
        eprintln!("logging already initialized: {err}");
    }

    println!("🚀 fuseloop - Control Loop Benchmark");
    println!("====================================\n");

    let mut config = SessionConfig::default()
        .with_workers(cli.workers)
        .with_latency(!cli.no_latency);
    if let Some(size) = cli.buffer_size {
        config = config.with_buffer_size(size);
    }

    let channel = Arc::new(MemoryChannel::new());
    let session = match Session::with_channel(channel.clone(), Arc::new(hello_registry()), config) {
        Ok(session) => session,
        Err(err) => {
            error!(error = %err, "invalid session configuration");
            return ExitCode::FAILURE;
        }
    };

    for unique in 1..=cli.requests {
        channel.push_message(workload(unique));
    }
    channel.close_when_drained();

    println!("📊 Control Loop ({} workers)", session.config().workers);
    println!("-----------------------------");

    let start = Instant::now();
    let report = match session.run() {
        Ok(report) => report,
        Err(err) => {
            error!(error = %err, "control loop failed to start");
            return ExitCode::FAILURE;
        }
    };
    let elapsed = start.elapsed();

    let replies = channel.reply_count();
    println!("  Requests: {}", cli.requests);
    println!("  Replies:  {}", replies);
    println!(
        "  Throughput: {:.2} K req/sec",
        cli.requests as f64 / elapsed.as_secs_f64() / 1_000.0
    );
    println!(
        "  Mean cycle: {:.2} ns/req\n",
        elapsed.as_nanos() as f64 / cli.requests.max(1) as f64
    );

    let latencies = session.latencies();
    if !latencies.is_empty() {
        println!("📊 Latency per Opcode");
        println!("---------------------");
        for (name, count) in session.operation_counts() {
            let handling = latencies.get(&name).copied().unwrap_or_default();
            let write = latencies
                .get(&format!("{name}-write"))
                .copied()
                .unwrap_or_default();
            println!(
                "  {:<8} count={:<8} handling={:.3} μs write={:.3} μs",
                name,
                count,
                handling * 1000.0,
                write * 1000.0
            );
        }
        println!();
    }

    println!("📊 {}", session.buffer_pool_stats());
    for (id, stop) in report.stops.iter().enumerate() {
        println!("  worker {id}: {stop}");
    }

    if report.is_clean() {
        println!("\n✅ Benchmark complete!");
        ExitCode::SUCCESS
    } else {
        println!("\n❌ Some workers stopped abnormally");
        ExitCode::FAILURE
    }
}
