//! Operation Registry: opcode → (input size, output size, handler)
//!
//! Dibangun sekali saat startup lalu dibagikan read-only ke semua worker.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::protocol::{opcode, opcode_name, OutputSlot, RequestView, Status};

/// Handler untuk satu opcode.
///
/// Handler tidak boleh panic untuk kegagalan biasa: kembalikan status error.
pub trait Handler: Send + Sync {
    fn handle(&self, req: &RequestView<'_>, out: &mut OutputSlot<'_>) -> Status;
}

impl<F> Handler for F
where
    F: Fn(&RequestView<'_>, &mut OutputSlot<'_>) -> Status + Send + Sync,
{
    #[inline(always)]
    fn handle(&self, req: &RequestView<'_>, out: &mut OutputSlot<'_>) -> Status {
        self(req, out)
    }
}

/// Ukuran wire dan flag satu opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSpec {
    /// Ukuran fixed argument yang wajib ada setelah header
    pub input_size: usize,
    /// Ukuran fixed output struct di reply
    pub output_size: usize,
    /// Kernel tidak menunggu reply (misalnya FORGET)
    pub no_reply: bool,
}

impl OpSpec {
    pub const fn new(input_size: usize, output_size: usize) -> Self {
        Self {
            input_size,
            output_size,
            no_reply: false,
        }
    }

    pub const fn no_reply(input_size: usize) -> Self {
        Self {
            input_size,
            output_size: 0,
            no_reply: true,
        }
    }
}

/// Entry registry
pub struct Operation {
    opcode: u32,
    spec: OpSpec,
    handler: Arc<dyn Handler>,
}

impl Operation {
    #[inline(always)]
    pub fn opcode(&self) -> u32 {
        self.opcode
    }

    #[inline(always)]
    pub fn spec(&self) -> OpSpec {
        self.spec
    }

    #[inline(always)]
    pub fn name(&self) -> &'static str {
        opcode_name(self.opcode)
    }

    #[inline(always)]
    pub(crate) fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("opcode", &self.name())
            .field("spec", &self.spec)
            .finish()
    }
}

/// Tabel operasi immutable
pub struct OperationRegistry {
    ops: HashMap<u32, Operation>,
    no_reply: HashSet<u32>,
}

impl OperationRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    #[inline(always)]
    pub fn lookup(&self, op: u32) -> Option<&Operation> {
        self.ops.get(&op)
    }

    /// Opcode yang tidak pernah dibalas, terdaftar atau tidak.
    #[inline(always)]
    pub fn is_no_reply(&self, op: u32) -> bool {
        self.no_reply.contains(&op)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.ops.values().map(Operation::name).collect();
        names.sort_unstable();
        f.debug_struct("OperationRegistry")
            .field("ops", &names)
            .finish()
    }
}

/// Builder untuk `OperationRegistry`
pub struct RegistryBuilder {
    ops: HashMap<u32, Operation>,
    no_reply: HashSet<u32>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    /// FORGET dan BATCH_FORGET sudah ditandai no-reply.
    pub fn new() -> Self {
        Self {
            ops: HashMap::new(),
            no_reply: [opcode::FORGET, opcode::BATCH_FORGET].into_iter().collect(),
        }
    }

    /// Daftarkan handler; registrasi kedua untuk opcode yang sama menimpa.
    pub fn register<H>(mut self, op: u32, spec: OpSpec, handler: H) -> Self
    where
        H: Handler + 'static,
    {
        self.insert(op, spec, Arc::new(handler));
        self
    }

    /// Seperti `register`, untuk closure.
    pub fn register_fn<F>(self, op: u32, spec: OpSpec, f: F) -> Self
    where
        F: Fn(&RequestView<'_>, &mut OutputSlot<'_>) -> Status + Send + Sync + 'static,
    {
        self.register(op, spec, f)
    }

    /// Daftarkan handler yang sudah di-share (satu filesystem, banyak opcode).
    pub fn register_shared(mut self, op: u32, spec: OpSpec, handler: Arc<dyn Handler>) -> Self {
        self.insert(op, spec, handler);
        self
    }

    fn insert(&mut self, op: u32, spec: OpSpec, handler: Arc<dyn Handler>) {
        if spec.no_reply {
            self.no_reply.insert(op);
        }
        self.ops.insert(
            op,
            Operation {
                opcode: op,
                spec,
                handler,
            },
        );
    }

    pub fn build(self) -> OperationRegistry {
        OperationRegistry {
            ops: self.ops,
            no_reply: self.no_reply,
        }
    }
}
