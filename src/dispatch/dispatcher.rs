//! Dispatcher: panggil handler tepat satu kali per request

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, error};

use super::registry::Operation;
use crate::core::BufferPool;
use crate::protocol::{Request, Stage, Status};

/// Jalankan handler untuk request yang sudah ter-decode.
///
/// Tidak ada retry dan tidak ada timeout. Panic di handler diubah jadi
/// `EIO` supaya worker tetap lanjut ke reply dan recycle.
pub fn dispatch(op: &Operation, req: &mut Request, pool: &BufferPool) -> Status {
    if req.stage() != Stage::Decoded {
        // Request yang sama tidak boleh di-dispatch dua kali
        return req.status();
    }

    req.prepare_reply(op.spec().output_size);

    let status = {
        let (view, mut slot) = req.split(pool);
        debug!(
            op = op.name(),
            unique = view.header().unique,
            nodeid = view.nodeid(),
            tail_len = view.tail().len(),
            "dispatch"
        );
        match catch_unwind(AssertUnwindSafe(|| op.handler().handle(&view, &mut slot))) {
            Ok(status) => status,
            Err(_) => {
                error!(op = op.name(), unique = view.header().unique, "handler panicked");
                Status::EIO
            }
        }
    };

    req.set_status(status);
    req.mark_dispatched();
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{OpSpec, OperationRegistry};
    use crate::protocol::{decode, opcode, InHeader, IN_HEADER_SIZE};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fill(req: &mut Request, pool: &BufferPool, op: u32, body: &[u8]) {
        req.begin(pool.acquire());
        let header = InHeader {
            len: (IN_HEADER_SIZE + body.len()) as u32,
            opcode: op,
            unique: 99,
            nodeid: 1,
            ..Default::default()
        };
        let input = req.input_mut();
        header.encode_into(input);
        input[IN_HEADER_SIZE..IN_HEADER_SIZE + body.len()].copy_from_slice(body);
        req.set_filled(IN_HEADER_SIZE + body.len());
    }

    #[test]
    fn test_dispatch_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let reg = OperationRegistry::builder()
            .register_fn(opcode::LOOKUP, OpSpec::new(0, 8), move |req, out| {
                counter.fetch_add(1, Ordering::SeqCst);
                assert_eq!(req.filename(), b"foo.txt");
                out.payload_mut().copy_from_slice(&[5u8; 8]);
                Status::OK
            })
            .build();
        let pool = BufferPool::new(256);
        let mut req = Request::new();
        fill(&mut req, &pool, opcode::LOOKUP, b"foo.txt\0");

        let decoded = decode(req.input(), &reg).unwrap();
        let (header, arg, tail) = (decoded.header, decoded.arg.clone(), decoded.tail.clone());
        let op = decoded.operation;
        req.set_decoded(header, arg, tail);

        assert_eq!(dispatch(op, &mut req, &pool), Status::OK);
        assert_eq!(req.stage(), Stage::Dispatched);
        // dispatch kedua diabaikan
        assert_eq!(dispatch(op, &mut req, &pool), Status::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(req.payload_len(), 8);
    }

    #[test]
    fn test_panic_becomes_eio() {
        let reg = OperationRegistry::builder()
            .register_fn(opcode::GETATTR, OpSpec::new(0, 16), |_, _| panic!("boom"))
            .build();
        let pool = BufferPool::new(128);
        let mut req = Request::new();
        fill(&mut req, &pool, opcode::GETATTR, &[]);

        let decoded = decode(req.input(), &reg).unwrap();
        let op = decoded.operation;
        req.set_decoded(decoded.header, decoded.arg, decoded.tail);

        assert_eq!(dispatch(op, &mut req, &pool), Status::EIO);
        assert_eq!(req.status(), Status::EIO);
        assert_eq!(req.payload_len(), 0);
    }
}
