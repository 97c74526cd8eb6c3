//! Latency Tracker: statistik per opcode
//!
//! Setiap opcode punya slot atomic sendiri (count, total handling ns,
//! total write ns). Tidak ada lock di hot path; rata-rata dihitung saat
//! query dari total yang sudah terkumpul.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::protocol::{opcode, opcode_name};

/// Slot untuk opcode di luar tabel
const OVERFLOW_SLOT: usize = opcode::MAX_KNOWN as usize + 1;
const SLOT_COUNT: usize = OVERFLOW_SLOT + 1;

/// Suffix nama untuk fase write, mengikuti format `OP-write`
pub const WRITE_SUFFIX: &str = "-write";

#[derive(Default)]
struct OpSlot {
    count: AtomicU64,
    handling_ns: AtomicU64,
    write_ns: AtomicU64,
}

/// Ringkasan satu opcode saat query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySummary {
    pub count: u64,
    /// Rata-rata end-to-end (read selesai sampai recycle)
    pub average: Duration,
    /// Rata-rata fase setelah dispatch (write reply)
    pub write_average: Duration,
}

/// Aggregator latency yang aman dipakai semua worker
pub struct LatencyTracker {
    slots: Box<[OpSlot]>,
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self {
            slots: (0..SLOT_COUNT).map(|_| OpSlot::default()).collect(),
        }
    }

    #[inline(always)]
    fn slot(&self, op: u32) -> &OpSlot {
        let idx = (op as usize).min(OVERFLOW_SLOT);
        &self.slots[idx]
    }

    /// Catat satu request yang selesai.
    ///
    /// Total ns ditambah sebelum count (Release), jadi sampel yang sudah
    /// terhitung selalu ikut di total.
    #[inline]
    pub fn record(&self, op: u32, handling: Duration, write: Duration) {
        let slot = self.slot(op);
        slot.handling_ns
            .fetch_add(handling.as_nanos() as u64, Ordering::Relaxed);
        slot.write_ns
            .fetch_add(write.as_nanos() as u64, Ordering::Relaxed);
        slot.count.fetch_add(1, Ordering::Release);
    }

    /// Snapshot per nama opcode; opcode tanpa request tidak muncul.
    ///
    /// Count dibaca lebih dulu (Acquire), lalu total. Jika `record` jalan
    /// bersamaan, total bisa memuat sampel yang belum terhitung sehingga
    /// rata-rata sesaat sedikit lebih tinggi; tidak pernah lebih rendah.
    pub fn snapshot(&self) -> BTreeMap<&'static str, LatencySummary> {
        let mut out = BTreeMap::new();
        for (idx, slot) in self.slots.iter().enumerate() {
            let count = slot.count.load(Ordering::Acquire);
            if count == 0 {
                continue;
            }
            let handling = slot.handling_ns.load(Ordering::Relaxed);
            let write = slot.write_ns.load(Ordering::Relaxed);
            let name = if idx == OVERFLOW_SLOT {
                "UNKNOWN"
            } else {
                opcode_name(idx as u32)
            };

            // Beberapa opcode di luar tabel bisa berbagi nama "UNKNOWN"
            let entry = out.entry(name).or_insert(LatencySummary {
                count: 0,
                average: Duration::ZERO,
                write_average: Duration::ZERO,
            });
            let prev = entry.count;
            let total = prev + count;
            entry.average = weighted(entry.average, prev, handling, total);
            entry.write_average = weighted(entry.write_average, prev, write, total);
            entry.count = total;
        }
        out
    }

    /// Rata-rata dalam milidetik: `OP` untuk handling, `OP-write` untuk write.
    pub fn latencies_ms(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for (name, summary) in self.snapshot() {
            out.insert(name.to_string(), summary.average.as_secs_f64() * 1e3);
            out.insert(
                format!("{name}{WRITE_SUFFIX}"),
                summary.write_average.as_secs_f64() * 1e3,
            );
        }
        out
    }

    /// Jumlah request per nama opcode
    pub fn counts(&self) -> BTreeMap<String, u64> {
        self.snapshot()
            .into_iter()
            .map(|(name, s)| (name.to_string(), s.count))
            .collect()
    }
}

/// Gabungkan rata-rata lama (`prev` sampel) dengan total ns baru.
fn weighted(avg: Duration, prev: u64, added_ns: u64, total: u64) -> Duration {
    if total == 0 {
        return Duration::ZERO;
    }
    let sum = avg.as_nanos() as u128 * prev as u128 + added_ns as u128;
    Duration::from_nanos((sum / total as u128) as u64)
}
