// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Lightweight in-process counters threaded through a `Series`. Metrics
//! *emission* (a Prometheus/OpenTelemetry backend) is out of scope per the
//! purpose section — this is the shape the teacher carries regardless
//! (`StoreLocalStatistic`-style plain counter structs passed through the
//! read/write path, with no backend dependency baked into the core).

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Counters {
    writes: AtomicU64,
    reads: AtomicU64,
    ticks: AtomicU64,
    merges: AtomicU64,
    sealed: AtomicU64,
    expired: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub writes: u64,
    pub reads: u64,
    pub ticks: u64,
    pub merges: u64,
    pub sealed: u64,
    pub expired: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick(&self, merges: u64, sealed: u64, expired: u64) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.merges.fetch_add(merges, Ordering::Relaxed);
        self.sealed.fetch_add(sealed, Ordering::Relaxed);
        self.expired.fetch_add(expired, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            writes: self.writes.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            merges: self.merges.load(Ordering::Relaxed),
            sealed: self.sealed.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}
