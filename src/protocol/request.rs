//! Request Context: state satu message dari read sampai recycle
//!
//! Input buffer berasal dari `BufferPool`; header, argument, dan tail
//! hanya berupa range di atas buffer itu (zero-copy). Reply buffer
//! (header + fixed output) dipakai ulang antar cycle oleh worker yang sama.

use std::ops::Range;
use std::time::Instant;

use super::message::{InHeader, Status, OUT_HEADER_SIZE};
use crate::core::{Buffer, BufferPool};

/// Tahap lifecycle request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Belum ada buffer
    Recycled,
    /// Buffer sudah didapat, belum diisi
    Allocated,
    /// Byte sudah dibaca dari channel
    Filled,
    /// Header dan argument sudah di-split
    Decoded,
    /// Handler sudah jalan
    Dispatched,
    /// Reply header sudah ditulis
    Encoded,
    /// Reply sudah dikirim (atau di-drop karena write gagal)
    Written,
}

/// State satu in-flight message
pub struct Request {
    stage: Stage,
    input: Option<Buffer>,
    header: Option<InHeader>,
    arg: Range<usize>,
    tail: Range<usize>,
    status: Status,
    /// OutHeader + fixed output region
    reply: Vec<u8>,
    output_size: usize,
    has_payload: bool,
    flat: Option<Buffer>,
    pub(crate) start: Option<Instant>,
    pub(crate) pre_write: Option<Instant>,
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    pub fn new() -> Self {
        Self {
            stage: Stage::Recycled,
            input: None,
            header: None,
            arg: 0..0,
            tail: 0..0,
            status: Status::OK,
            reply: Vec::with_capacity(OUT_HEADER_SIZE),
            output_size: 0,
            has_payload: false,
            flat: None,
            start: None,
            pre_write: None,
        }
    }

    /// Pasang buffer kosong untuk cycle baru.
    pub fn begin(&mut self, mut input: Buffer) {
        input.clear();
        self.input = Some(input);
        self.stage = Stage::Allocated;
    }

    /// Seluruh kapasitas input buffer untuk `read(2)`.
    pub fn input_mut(&mut self) -> &mut [u8] {
        match self.input.as_mut() {
            Some(buf) => buf.spare_mut(),
            None => &mut [],
        }
    }

    /// Tandai `n` byte sudah dibaca.
    pub fn set_filled(&mut self, n: usize) {
        if let Some(buf) = self.input.as_mut() {
            buf.set_len(n);
        }
        self.stage = Stage::Filled;
    }

    /// Byte message yang dibaca
    pub fn input(&self) -> &[u8] {
        match self.input.as_ref() {
            Some(buf) => buf.as_slice(),
            None => &[],
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn header(&self) -> Option<&InHeader> {
        self.header.as_ref()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    /// Opcode jika setidaknya field opcode sempat terbaca
    pub fn opcode(&self) -> Option<u32> {
        match self.header {
            Some(h) => Some(h.opcode),
            None => InHeader::peek_opcode(self.input()),
        }
    }

    /// Correlation id jika field `unique` sempat terbaca
    pub fn unique(&self) -> Option<u64> {
        match self.header {
            Some(h) => Some(h.unique),
            None => InHeader::peek_unique(self.input()),
        }
    }

    /// Simpan hasil decode yang sukses.
    pub(crate) fn set_decoded(&mut self, header: InHeader, arg: Range<usize>, tail: Range<usize>) {
        self.header = Some(header);
        self.arg = arg;
        self.tail = tail;
        self.stage = Stage::Decoded;
    }

    /// Decode gagal: header (jika lengkap) tetap disimpan untuk reply.
    pub(crate) fn set_rejected(&mut self, header: Option<InHeader>, status: Status) {
        self.header = header;
        self.status = status;
    }

    /// Siapkan reply buffer: header + `output_size` byte output region.
    pub(crate) fn prepare_reply(&mut self, output_size: usize) {
        self.output_size = output_size;
        self.reply.clear();
        self.reply.resize(OUT_HEADER_SIZE + output_size, 0);
    }

    pub(crate) fn mark_dispatched(&mut self) {
        self.stage = Stage::Dispatched;
    }

    pub(crate) fn mark_written(&mut self) {
        self.stage = Stage::Written;
    }

    /// Split jadi view read-only (untuk handler) dan output slot.
    pub(crate) fn split<'a>(&'a mut self, pool: &'a BufferPool) -> (RequestView<'a>, OutputSlot<'a>) {
        let input: &[u8] = match self.input.as_ref() {
            Some(buf) => buf.as_slice(),
            None => &[],
        };
        let header = self.header.unwrap_or_default();
        let view = RequestView {
            header,
            arg: input.get(self.arg.clone()).unwrap_or(&[]),
            tail: input.get(self.tail.clone()).unwrap_or(&[]),
        };
        let end = (OUT_HEADER_SIZE + self.output_size).min(self.reply.len());
        let payload = match self.reply.get_mut(OUT_HEADER_SIZE..end) {
            Some(region) => region,
            None => &mut [],
        };
        let slot = OutputSlot {
            payload,
            has_payload: &mut self.has_payload,
            flat: &mut self.flat,
            pool,
        };
        (view, slot)
    }

    /// Panjang fixed payload yang benar-benar dikirim.
    pub(crate) fn payload_len(&self) -> usize {
        if self.status.is_ok() && self.has_payload {
            self.output_size
        } else {
            0
        }
    }

    /// Panjang flat payload yang benar-benar dikirim.
    pub(crate) fn flat_len(&self) -> usize {
        match (&self.flat, self.status.is_ok()) {
            (Some(buf), true) => buf.len(),
            _ => 0,
        }
    }

    pub(crate) fn reply_mut(&mut self) -> &mut Vec<u8> {
        &mut self.reply
    }

    pub(crate) fn mark_encoded(&mut self) {
        self.stage = Stage::Encoded;
    }

    /// Reply header + fixed payload yang sudah di-encode
    pub fn reply_bytes(&self) -> &[u8] {
        &self.reply
    }

    /// Flat payload yang akan dikirim sebagai buffer kedua
    pub fn flat_bytes(&self) -> Option<&[u8]> {
        if self.flat_len() == 0 {
            return None;
        }
        self.flat.as_ref().map(Buffer::as_slice)
    }

    /// Kembalikan semua buffer ke pool dan reset state.
    ///
    /// Kapasitas reply buffer dipertahankan untuk cycle berikutnya.
    pub fn recycle(&mut self, pool: &BufferPool) {
        if let Some(buf) = self.input.take() {
            pool.release(buf);
        }
        if let Some(buf) = self.flat.take() {
            pool.release(buf);
        }
        self.header = None;
        self.arg = 0..0;
        self.tail = 0..0;
        self.status = Status::OK;
        self.reply.clear();
        self.output_size = 0;
        self.has_payload = false;
        self.start = None;
        self.pre_write = None;
        self.stage = Stage::Recycled;
    }
}

/// View read-only yang diterima handler
#[derive(Debug, Clone, Copy)]
pub struct RequestView<'a> {
    header: InHeader,
    arg: &'a [u8],
    tail: &'a [u8],
}

impl<'a> RequestView<'a> {
    /// Buat view langsung (dipakai tests dan pemanggil di luar loop).
    pub fn new(header: InHeader, arg: &'a [u8], tail: &'a [u8]) -> Self {
        Self { header, arg, tail }
    }

    pub fn header(&self) -> &InHeader {
        &self.header
    }

    pub fn opcode(&self) -> u32 {
        self.header.opcode
    }

    pub fn nodeid(&self) -> u64 {
        self.header.nodeid
    }

    /// Fixed argument, tepat sebesar `input_size` opcode ini
    pub fn arg(&self) -> &'a [u8] {
        self.arg
    }

    /// Variable tail setelah fixed argument
    pub fn tail(&self) -> &'a [u8] {
        self.tail
    }

    /// Nama tunggal dari tail: seluruh tail tanpa NUL di ujung.
    ///
    /// NUL di tengah tidak dipotong; tail multi-nama pakai `filenames`.
    pub fn filename(&self) -> &'a [u8] {
        let end = self
            .tail
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |last| last + 1);
        &self.tail[..end]
    }

    /// Nama-nama NUL-separated dari tail, maksimal `count` bagian.
    ///
    /// Bagian terakhir berisi sisa tail (tanpa NUL penutup).
    pub fn filenames(&self, count: usize) -> Vec<&'a [u8]> {
        if count == 0 {
            return Vec::new();
        }
        let trimmed = match self.tail.last() {
            Some(0) => &self.tail[..self.tail.len() - 1],
            _ => self.tail,
        };
        trimmed.splitn(count, |&b| b == 0).collect()
    }
}

/// Output yang diisi handler
pub struct OutputSlot<'a> {
    payload: &'a mut [u8],
    has_payload: &'a mut bool,
    flat: &'a mut Option<Buffer>,
    pool: &'a BufferPool,
}

impl<'a> OutputSlot<'a> {
    /// Buat slot di atas region milik caller (untuk tests/bench).
    pub fn new(
        payload: &'a mut [u8],
        has_payload: &'a mut bool,
        flat: &'a mut Option<Buffer>,
        pool: &'a BufferPool,
    ) -> Self {
        Self {
            payload,
            has_payload,
            flat,
            pool,
        }
    }

    /// Ukuran fixed output yang dideklarasikan registry
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Region fixed output; memanggil ini menandai payload sebagai ada.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        *self.has_payload = true;
        self.payload
    }

    pub fn has_payload(&self) -> bool {
        *self.has_payload
    }

    /// Copy data ke flat payload (buffer dari pool).
    ///
    /// Gagal dengan `EIO` jika data lebih besar dari kapasitas buffer.
    pub fn set_flat(&mut self, data: &[u8]) -> Result<(), Status> {
        let pool = self.pool;
        let buf = self.flat.get_or_insert_with(|| pool.acquire());
        if buf.fill_from(data) {
            Ok(())
        } else {
            buf.clear();
            Err(Status::EIO)
        }
    }

    /// Region flat payload sepanjang `len` untuk diisi langsung.
    pub fn flat_mut(&mut self, len: usize) -> Option<&mut [u8]> {
        let pool = self.pool;
        let buf = self.flat.get_or_insert_with(|| pool.acquire());
        if len > buf.capacity() {
            return None;
        }
        buf.set_len(len);
        Some(&mut buf.spare_mut()[..len])
    }

    /// Buang flat payload yang sudah diisi.
    pub fn clear_flat(&mut self) {
        if let Some(buf) = self.flat.take() {
            self.pool.release(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(tail: &[u8]) -> RequestView<'_> {
        RequestView::new(InHeader::default(), &[], tail)
    }

    #[test]
    fn test_filename_trims_nul() {
        assert_eq!(view(b"foo.txt\0").filename(), b"foo.txt");
        assert_eq!(view(b"foo.txt").filename(), b"foo.txt");
        assert_eq!(view(b"").filename(), b"");
        assert_eq!(view(b"\0\0").filename(), b"");
        assert_eq!(view(b"foo.txt\0\0\0").filename(), b"foo.txt");
    }

    #[test]
    fn test_filename_keeps_inner_nul() {
        assert_eq!(view(b"a\0b").filename(), b"a\0b");
        assert_eq!(view(b"a\0b\0").filename(), b"a\0b");
    }

    #[test]
    fn test_filenames_split() {
        let v = view(b"old\0new\0");
        assert_eq!(v.filenames(2), vec![&b"old"[..], &b"new"[..]]);

        // sisa tail tetap di bagian terakhir
        let v = view(b"a\0b\0c\0");
        assert_eq!(v.filenames(2), vec![&b"a"[..], &b"b\0c"[..]]);
        assert!(v.filenames(0).is_empty());
    }

    #[test]
    fn test_output_slot_flat() {
        let pool = BufferPool::new(16);
        let mut payload = [0u8; 4];
        let mut has_payload = false;
        let mut flat = None;

        {
            let mut slot = OutputSlot::new(&mut payload, &mut has_payload, &mut flat, &pool);
            assert!(!slot.has_payload());
            slot.payload_mut().copy_from_slice(&[1, 2, 3, 4]);
            assert!(slot.set_flat(b"file contents").is_ok());
            assert_eq!(slot.set_flat(&[0u8; 17]), Err(Status::EIO));
            assert!(slot.flat_mut(17).is_none());
            let region = slot.flat_mut(3).unwrap();
            region.copy_from_slice(b"xyz");
        }

        assert!(has_payload);
        assert_eq!(payload, [1, 2, 3, 4]);
        assert_eq!(flat.as_ref().map(Buffer::as_slice), Some(&b"xyz"[..]));
        assert_eq!(pool.stats().outstanding, 1);
    }

    #[test]
    fn test_recycle_returns_buffers() {
        let pool = BufferPool::new(64);
        let mut req = Request::new();
        req.begin(pool.acquire());
        assert_eq!(req.stage(), Stage::Allocated);
        req.input_mut()[..3].copy_from_slice(b"abc");
        req.set_filled(3);
        assert_eq!(req.input(), b"abc");
        assert_eq!(req.stage(), Stage::Filled);

        req.prepare_reply(8);
        {
            let (_view, mut slot) = req.split(&pool);
            slot.set_flat(b"data").unwrap();
        }
        assert_eq!(pool.stats().outstanding, 2);

        req.recycle(&pool);
        assert_eq!(req.stage(), Stage::Recycled);
        assert!(req.input().is_empty());
        assert_eq!(pool.stats().outstanding, 0);
        assert_eq!(pool.stats().idle, 2);
    }
}
