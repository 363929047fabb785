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

//! The per-block-start container of encoders and bootstrapped blocks.
//! Grounded on the teacher's `StagingVersion` (`imm`/`sst` deques, "newer
//! data comes first") generalized to two write classes plus a bootstrapped
//! overlay per class.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::context::Context;
use crate::datapoint::{Datapoint, MetricClass, TimeUnit};
use crate::encoder::{ColumnarEncoder, Encoder};
use crate::error::{Result, SeriesBufError};
use crate::iterator::{MergeIterator, MultiReaderIterator};
use crate::options::Options;
use crate::pool::{Pool, Poolable};
use crate::stream::BlockReader;

/// A single in-order encoder plus the timestamp of the write that most
/// recently landed in it — the cursor the write algorithm scans against to
/// decide whether a slot may accept the next write.
pub struct InOrderEncoder {
    pub encoder: ColumnarEncoder,
    pub last_write_at: Option<i64>,
}

impl InOrderEncoder {
    /// Draws an encoder from `pool` rather than allocating fresh, the way
    /// `Bucket`'s own slots are drawn from a `Pool<Bucket>` one level up.
    fn from_pool(pool: &Pool<ColumnarEncoder>, start: i64, alloc_size: usize) -> Self {
        let mut encoder = pool.get();
        Encoder::reset(&mut encoder, start, alloc_size);
        Self {
            encoder,
            last_write_at: None,
        }
    }
}

fn new_encoder_pool(options: &Options) -> Pool<ColumnarEncoder> {
    let alloc_size = options.database_block.alloc_size;
    let capacity = options.database_block.pool_capacity;
    Pool::new("columnar_encoder", capacity, move || ColumnarEncoder::new(0, alloc_size))
}

#[derive(Default)]
pub struct MergeReport {
    pub merges: usize,
}

pub struct Bucket {
    start: i64,
    options: Arc<Options>,
    encoders: HashMap<MetricClass, Vec<InOrderEncoder>>,
    bootstrapped: HashMap<MetricClass, Vec<BlockReader>>,
    last_read: AtomicI64,
    encoder_pool: Pool<ColumnarEncoder>,
}

impl Bucket {
    pub fn new(start: i64, options: Arc<Options>) -> Self {
        let encoder_pool = new_encoder_pool(&options);
        Self {
            start,
            options,
            encoders: HashMap::new(),
            bootstrapped: HashMap::new(),
            last_read: AtomicI64::new(0),
            encoder_pool,
        }
    }

    /// Reinitializes this bucket for reuse at a new block start, as if
    /// freshly constructed. Used when drawing a bucket from the pool.
    /// Every encoder slot still held is closed and returned to the encoder
    /// pool rather than silently dropped; the pool itself is only rebuilt
    /// if the new options actually change its shape, so encoders just
    /// released are still reusable on the very next draw.
    pub fn reset_to(&mut self, start: i64, options: Arc<Options>) {
        self.release_all_encoders();
        self.start = start;
        self.bootstrapped.clear();
        self.last_read.store(0, Ordering::Relaxed);
        if options.database_block.alloc_size != self.options.database_block.alloc_size
            || options.database_block.pool_capacity != self.options.database_block.pool_capacity
        {
            self.encoder_pool = new_encoder_pool(&options);
        }
        self.options = options;
    }

    fn release_all_encoders(&mut self) {
        for (_, slots) in self.encoders.drain() {
            for slot in slots {
                let mut encoder = slot.encoder;
                encoder.close();
                self.encoder_pool.put(encoder);
            }
        }
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn last_read(&self) -> i64 {
        self.last_read.load(Ordering::Relaxed)
    }

    pub fn set_last_read(&self, t: i64) {
        self.last_read.store(t, Ordering::Relaxed);
    }

    fn class_slots_len(&self, class: MetricClass) -> usize {
        self.encoders.get(&class).map_or(0, |v| v.len())
    }

    fn bootstrap_slots_len(&self, class: MetricClass) -> usize {
        self.bootstrapped.get(&class).map_or(0, |v| v.len())
    }

    /// See spec.md §4.2 "Write algorithm". Scans every existing slot for an
    /// exact-timestamp match first (duplicate/upsert check); only if none
    /// matches does it look for the first slot strictly behind the new
    /// timestamp. If no slot qualifies, a fresh slot is opened — see
    /// DESIGN.md's decision on the `timestamp < lastWriteAt` fallthrough.
    pub fn write(&mut self, class: MetricClass, dp: &Datapoint, unit: TimeUnit, annotation: &[u8]) -> Result<()> {
        if class == MetricClass::All {
            return Err(SeriesBufError::InvalidMetricClass { op: "write" });
        }

        let slots = self.encoders.entry(class).or_default();

        // Pass 1: exact-timestamp match anywhere is either a silent
        // duplicate no-op, or (different value) ineligible for reuse.
        for slot in slots.iter() {
            if slot.last_write_at == Some(dp.timestamp) {
                let last = slot.encoder.last_encoded()?;
                if last.value == dp.value {
                    return Ok(());
                }
            }
        }

        // Pass 2: first slot strictly behind the new timestamp accepts it.
        if let Some(slot) = slots
            .iter_mut()
            .find(|s| s.last_write_at.map_or(true, |lw| lw < dp.timestamp))
        {
            slot.encoder.encode(dp, unit, annotation)?;
            slot.last_write_at = Some(dp.timestamp);
            return Ok(());
        }

        // No slot qualified: open a new one. Its start matches the
        // bucket's (invariant I1) — the bucket the write landed in was
        // already chosen by the buffer via truncate(timestamp, blockSize).
        let mut new_slot =
            InOrderEncoder::from_pool(&self.encoder_pool, self.start, self.options.database_block.alloc_size);
        new_slot.encoder.encode(dp, unit, annotation)?;
        new_slot.last_write_at = Some(dp.timestamp);
        slots.push(new_slot);
        Ok(())
    }

    /// Assigns `block` to the bootstrapped overlay of the class it
    /// belongs to, based on `now` sampled at bootstrap time. See
    /// DESIGN.md's decision on the Realtime/OutOfOrder bootstrap race:
    /// preserved as specified, not corrected.
    pub fn bootstrap(&mut self, block: BlockReader, block_start: i64, now: i64) {
        let class = if block_start == crate::time::truncate_to_block(now, self.options.retention.block_size) {
            MetricClass::Realtime
        } else {
            MetricClass::OutOfOrder
        };
        self.bootstrapped.entry(class).or_default().push(block);
    }

    /// True unless the bucket is already in one of the four trivial
    /// single-source states described in spec.md §4.2.
    pub fn needs_merge(&self) -> bool {
        let counts = [
            self.class_slots_len(MetricClass::Realtime),
            self.class_slots_len(MetricClass::OutOfOrder),
            self.bootstrap_slots_len(MetricClass::Realtime),
            self.bootstrap_slots_len(MetricClass::OutOfOrder),
        ];
        let nonzero = counts.iter().filter(|&&n| n > 0).count();
        let total: usize = counts.iter().sum();
        !(nonzero <= 1 && total <= 1)
    }

    pub fn is_empty(&self) -> bool {
        MetricClass::WRITE_CLASSES
            .iter()
            .all(|&c| self.class_slots_len(c) == 0 && self.bootstrap_slots_len(c) == 0)
    }

    /// Approximate byte size across every encoder slot and bootstrapped
    /// block, for `Buffer::fetch_blocks_metadata`'s `include_sizes` option.
    pub fn approx_size(&self) -> usize {
        let encoded: usize = self
            .encoders
            .values()
            .flat_map(|slots| slots.iter())
            .map(|s| s.encoder.len())
            .sum();
        let bootstrapped: usize = self
            .bootstrapped
            .values()
            .flat_map(|blocks| blocks.iter())
            .map(|b| b.len() * (std::mem::size_of::<i64>() + std::mem::size_of::<f64>()))
            .sum();
        encoded + bootstrapped
    }

    /// Produces one encoder per class from `(bootstrapped ++ encoders)`,
    /// oldest first, honoring last-write-wins via the merge iterator's
    /// later-source-wins tie-break. Leaves the bucket untouched if any
    /// class fails to re-encode; reports how many sources were consumed.
    pub fn merge(&mut self) -> Result<MergeReport> {
        let mut total_merges = 0usize;
        for &class in &MetricClass::WRITE_CLASSES {
            let bootstrap_sources = self.bootstrapped.get(&class).cloned().unwrap_or_default();
            let encoder_sources: Vec<BlockReader> = self
                .encoders
                .get(&class)
                .map(|slots| slots.iter().filter_map(|s| s.encoder.stream()).collect())
                .unwrap_or_default();

            let source_count = bootstrap_sources.len() + encoder_sources.len();
            if source_count <= 1 {
                // nothing to fold: at most a single source already.
                continue;
            }

            let alloc_hint: usize = bootstrap_sources
                .iter()
                .chain(encoder_sources.iter())
                .map(|s| s.len())
                .sum();
            let mut target = self.encoder_pool.get();
            Encoder::reset(&mut target, self.start, alloc_hint);

            let mut sources = bootstrap_sources.clone();
            sources.extend(encoder_sources.clone());
            let mut iter = MergeIterator::new();
            iter.reset(sources, self.start, self.options.retention.block_size);

            let merge_result: Result<()> = (|| {
                while iter.next() {
                    let (dp, unit, annotation) = iter.current().expect("iterator produced no current after next()=true");
                    target.encode(&dp, unit, &annotation)?;
                }
                Ok(())
            })();

            match merge_result {
                Ok(()) => {
                    let superseded = self.encoders.insert(
                        class,
                        vec![InOrderEncoder {
                            last_write_at: target.last_encoded().ok().map(|dp| dp.timestamp),
                            encoder: target,
                        }],
                    );
                    if let Some(slots) = superseded {
                        for slot in slots {
                            let mut encoder = slot.encoder;
                            encoder.close();
                            self.encoder_pool.put(encoder);
                        }
                    }
                    self.bootstrapped.remove(&class);
                    total_merges += source_count;
                }
                Err(e) => {
                    tracing::warn!(block_start = self.start, class = class.as_str(), error = %e, "bucket merge failed, retaining pre-merge state");
                    self.encoder_pool.put(target);
                    return Err(SeriesBufError::merge_encode(self.start, e));
                }
            }
        }
        Ok(MergeReport { merges: total_merges })
    }

    /// Snapshot streams across the selected class(es), registering a
    /// finalizer per stream on `ctx` (matching the external interface's
    /// promise that acquired streams are released through the context's
    /// lifetime).
    pub fn streams(&self, ctx: &Context, class_filter: MetricClass) -> Vec<BlockReader> {
        let classes: &[MetricClass] = match class_filter {
            MetricClass::All => &MetricClass::WRITE_CLASSES,
            other => std::slice::from_ref(leak_class(other)),
        };

        let mut out = Vec::new();
        for &class in classes {
            if let Some(bs) = self.bootstrapped.get(&class) {
                out.extend(bs.iter().cloned());
            }
            if let Some(slots) = self.encoders.get(&class) {
                out.extend(slots.iter().filter_map(|s| s.encoder.stream()));
            }
        }
        for _ in &out {
            ctx.register_finalizer(|| {});
        }
        out
    }

    /// Merges, then returns the sole remaining stream for `class`.
    /// `Ok(None)` means the class has no data; more than one surviving
    /// stream after a successful merge is an invariant violation.
    pub fn stream(&mut self, ctx: &Context, class: MetricClass) -> Result<Option<BlockReader>> {
        if class == MetricClass::All {
            return Err(SeriesBufError::InvalidMetricClass { op: "stream" });
        }
        self.merge()?;
        let mut remaining = self.streams(ctx, class);
        match remaining.len() {
            0 => Ok(None),
            1 => Ok(Some(remaining.pop().unwrap())),
            _ => Err(SeriesBufError::MoreThanOneStreamAfterMerge { class }),
        }
    }
}

impl Poolable for Bucket {
    /// Drawn from a `Pool<Bucket>` with no target start/options in hand
    /// yet — resets in place, leaving the caller to follow up with
    /// `reset_to` once it knows the block start this draw is for.
    fn reset(&mut self) {
        let start = self.start;
        let options = self.options.clone();
        self.reset_to(start, options);
    }
}

/// `MetricClass::WRITE_CLASSES` needs a stable address for the
/// single-class slice branch of `streams`; classes are `Copy` so this just
/// picks the matching static entry rather than allocating.
fn leak_class(class: MetricClass) -> &'static MetricClass {
    MetricClass::WRITE_CLASSES
        .iter()
        .find(|&&c| c == class)
        .expect("class must be Realtime or OutOfOrder")
}
