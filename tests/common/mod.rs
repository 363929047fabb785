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

use std::sync::{Arc, Once};

use seriesbuf::iterator::{MergeIterator, MultiReaderIterator};
use seriesbuf::{BlockReader, Datapoint, ManualClock, Options, TimeUnit};

static TRACING_INIT: Once = Once::new();

/// Installs a `tracing` subscriber once per test binary, honoring
/// `RUST_LOG` so `tracing::warn!`/`tracing::debug!` calls in the core
/// (e.g. `Series::tick`'s merge-pass log, `Bucket::merge`'s failure log)
/// are visible with `cargo test -- --nocapture`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Nanoseconds for an `h:m:s` wall-clock offset from an arbitrary epoch —
/// the scenarios only ever compare offsets against each other, never
/// against the real clock.
pub fn hms(h: i64, m: i64, s: i64) -> i64 {
    ((h * 3_600) + (m * 60) + s) * 1_000_000_000
}

pub fn options(block_size_hours: i64, buffer_past_secs: i64, buffer_future_secs: i64) -> Arc<Options> {
    let mut opts = Options::default();
    opts.retention.block_size = block_size_hours * 3_600_000_000_000;
    opts.retention.buffer_past = buffer_past_secs * 1_000_000_000;
    opts.retention.buffer_future = buffer_future_secs * 1_000_000_000;
    Arc::new(opts)
}

pub fn clock(now: i64) -> Arc<ManualClock> {
    Arc::new(ManualClock::new(now))
}

/// Flattens a set of per-window `BlockReader`s (as returned by
/// `Series::read_encoded`/`Buffer::read`) into the single ordered,
/// upsert-resolved value sequence a downstream query layer would produce
/// by running them through the documented multi-reader-iterator contract
/// (later-supplied source wins on a timestamp tie). The core intentionally
/// leaves this fold to the caller — see DESIGN.md.
pub fn merged_values(windows: &[Vec<BlockReader>]) -> Vec<(i64, f64)> {
    let streams: Vec<BlockReader> = windows.iter().flatten().cloned().collect();
    let mut iter = MergeIterator::new();
    iter.reset(streams, 0, 0);
    let mut out = Vec::new();
    while iter.next() {
        let (dp, _, _): (Datapoint, TimeUnit, Vec<u8>) = iter.current().unwrap();
        out.push((dp.timestamp, dp.value));
    }
    out
}
