//! Criterion benchmark untuk hot path control loop
//!
//! Run dengan: cargo bench

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use fuseloop::channel::MemoryChannel;
use fuseloop::config::SessionConfig;
use fuseloop::core::BufferPool;
use fuseloop::protocol::{
    decode, encode_reply, opcode, GetattrIn, InHeader, Status, WireStruct, IN_HEADER_SIZE,
    OUT_HEADER_SIZE,
};
use fuseloop::{OpSpec, OperationRegistry, Session};

fn registry() -> OperationRegistry {
    OperationRegistry::builder()
        .register_fn(opcode::GETATTR, OpSpec::new(GetattrIn::SIZE, 104), |req, out| {
            out.payload_mut()[16..24].copy_from_slice(&req.nodeid().to_ne_bytes());
            Status::OK
        })
        .build()
}

fn getattr(unique: u64) -> Vec<u8> {
    let header = InHeader {
        len: (IN_HEADER_SIZE + GetattrIn::SIZE) as u32,
        opcode: opcode::GETATTR,
        unique,
        nodeid: 2,
        ..Default::default()
    };
    let mut buf = vec![0u8; IN_HEADER_SIZE + GetattrIn::SIZE];
    header.encode_into(&mut buf);
    buf
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Elements(1));
    let registry = registry();
    let msg = getattr(7);

    group.bench_function("decode", |b| {
        b.iter(|| {
            let decoded = decode(black_box(&msg), &registry);
            black_box(decoded.is_ok());
        });
    });

    group.bench_function("decode_unsupported", |b| {
        let mut unknown = msg.clone();
        unknown[4..8].copy_from_slice(&9999u32.to_ne_bytes());
        b.iter(|| black_box(decode(black_box(&unknown), &registry).is_err()));
    });

    group.bench_function("encode_reply", |b| {
        let mut reply = Vec::with_capacity(OUT_HEADER_SIZE + 104);
        let mut unique = 0u64;
        b.iter(|| {
            unique = unique.wrapping_add(1);
            black_box(encode_reply(&mut reply, unique, Status::OK, 104, 0));
        });
    });

    group.finish();
}

fn bench_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool");
    group.throughput(Throughput::Elements(1));

    group.bench_function("acquire_release", |b| {
        let pool = BufferPool::new(1 << 16);
        b.iter(|| {
            let buf = pool.acquire();
            pool.release(black_box(buf));
        });
    });

    group.finish();
}

fn bench_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("control_loop");

    for batch_size in [100u64, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size));
        group.bench_function(format!("single_worker_{}", batch_size), |b| {
            let registry = Arc::new(registry());
            b.iter_batched(
                || {
                    let channel = Arc::new(MemoryChannel::new());
                    for unique in 0..*batch_size {
                        channel.push_message(getattr(unique));
                    }
                    channel.close_when_drained();
                    channel
                },
                |channel| {
                    let session = Session::with_channel(
                        channel,
                        Arc::clone(&registry),
                        SessionConfig::default(),
                    )
                    .unwrap();
                    black_box(session.run_with(1).unwrap());
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_codec, bench_pool, bench_loop);
criterion_main!(benches);
