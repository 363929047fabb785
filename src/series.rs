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

//! `Series`: wraps a `Buffer` and a sealed-block map, drives the bootstrap
//! state machine, fans reads out across both sources, and drives the
//! flush hand-off. Grounded on the teacher's `LocalHummockStorage`, which
//! wraps a read-version plus an event sender behind one lock and exposes
//! `get`/`update` without the caller ever touching the version internals.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::block::SealedBlock;
use crate::bucket::Bucket;
use crate::buffer::{BlockMetadata, Buffer, FetchMetadataOptions, FetchResult};
use crate::clock::Clock;
use crate::context::{Context, ContextPool};
use crate::datapoint::{MetricClass, TimeUnit};
use crate::error::{Result, SeriesBufError};
use crate::iterator::{MergeIterator, MultiReaderIterator};
use crate::options::Options;
use crate::stats::{Counters, CountersSnapshot};
use crate::stream::BlockReader;
use crate::time::truncate_to_block;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    NotStarted,
    Bootstrapping,
    Bootstrapped,
}

/// A buffer drain recorded before the series finished bootstrapping; see
/// the bootstrap state machine's "any → bufferDrained while not
/// Bootstrapped" row.
struct PendingDrain {
    start: i64,
    segment: BlockReader,
}

struct Inner {
    id: String,
    buffer: Buffer,
    sealed_blocks: HashMap<i64, SealedBlock>,
    pending_bootstrap: Vec<PendingDrain>,
    state: BootstrapState,
    context_pool: ContextPool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub active_blocks: usize,
    pub expired_blocks: usize,
    pub sealed_blocks: usize,
}

pub struct Series {
    options: Arc<Options>,
    clock: Arc<dyn Clock>,
    inner: RwLock<Inner>,
    counters: Counters,
}

impl Series {
    pub fn new(id: impl Into<String>, options: Arc<Options>, clock: Arc<dyn Clock>) -> Self {
        let buffer = Buffer::new(options.clone(), clock.clone());
        let context_pool = crate::context::new_context_pool(options.database_block.pool_capacity);
        Self {
            options,
            clock,
            inner: RwLock::new(Inner {
                id: id.into(),
                buffer,
                sealed_blocks: HashMap::new(),
                pending_bootstrap: Vec::new(),
                state: BootstrapState::NotStarted,
                context_pool,
            }),
            counters: Counters::new(),
        }
    }

    pub fn id(&self) -> String {
        self.inner.read().id.clone()
    }

    pub fn counters(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.inner.read().state == BootstrapState::Bootstrapped
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read();
        inner.buffer.is_empty() && inner.sealed_blocks.is_empty()
    }

    pub fn write(&self, ctx: &Context, timestamp: i64, value: f64, unit: TimeUnit, annotation: &[u8]) -> Result<()> {
        let mut inner = self.inner.write();
        let result = inner.buffer.write(ctx, timestamp, value, unit, annotation);
        if result.is_ok() {
            self.counters.record_write();
        }
        result
    }

    /// Aligns `[start, end)` to block boundaries, clamps to the sealed
    /// block range if narrower, then returns sealed-block streams followed
    /// by buffer streams, one outer entry per distinct block window.
    pub fn read_encoded(&self, ctx: &Context, start: i64, end: i64) -> Result<Vec<Vec<BlockReader>>> {
        if end < start {
            return Err(SeriesBufError::InvalidRange { start, end });
        }
        let inner = self.inner.read();
        let block_size = self.options.retention.block_size;

        let mut aligned_start = truncate_to_block(start, block_size);
        // `end` is exclusive: the last overlapping block is the one
        // containing `end - 1`, not `end` itself, so a caller passing an
        // already block-aligned `end` doesn't pull in one extra block.
        let mut aligned_end = truncate_to_block((end - 1).max(aligned_start), block_size) + block_size;

        if let Some((min_start, max_end)) = sealed_range(&inner.sealed_blocks, block_size) {
            aligned_start = aligned_start.max(min_start);
            aligned_end = aligned_end.min(max_end);
        }

        let mut out = Vec::new();
        let mut block_start = aligned_start;
        while block_start < aligned_end {
            if let Some(sealed) = inner.sealed_blocks.get(&block_start) {
                if !sealed.segment().is_empty() {
                    out.push(vec![sealed.segment().clone()]);
                }
            }
            block_start += block_size;
        }

        drop(inner);
        let mut inner = self.inner.write();
        out.extend(inner.buffer.read(ctx, aligned_start, aligned_end));
        self.counters.record_read();
        Ok(out)
    }

    pub fn fetch_blocks(&self, ctx: &Context, starts: &[i64]) -> Vec<FetchResult> {
        let inner = self.inner.read();
        starts
            .iter()
            .map(|&start| {
                if let Some(sealed) = inner.sealed_blocks.get(&start) {
                    FetchResult {
                        start,
                        result: Ok(vec![sealed.segment().clone()]),
                    }
                } else {
                    inner
                        .buffer
                        .fetch_blocks(ctx, &[start])
                        .into_iter()
                        .next()
                        .expect("fetch_blocks(&[start]) returns exactly one result")
                }
            })
            .collect()
    }

    pub fn fetch_blocks_metadata(&self, start: i64, end: i64, opts: FetchMetadataOptions) -> Vec<BlockMetadata> {
        let inner = self.inner.read();
        let block_size = self.options.retention.block_size;
        let mut out = inner.buffer.fetch_blocks_metadata(start, end, opts);

        let mut block_start = truncate_to_block(start, block_size);
        while block_start < end {
            if let Some(sealed) = inner.sealed_blocks.get(&block_start) {
                out.push(BlockMetadata {
                    block_start,
                    size: opts.include_sizes.then(|| sealed.segment().len() * 16),
                    last_read: None,
                });
            }
            block_start += block_size;
        }
        out
    }

    fn seal_threshold(options: &Options, now: i64) -> i64 {
        let block_size = options.retention.block_size;
        truncate_to_block(now - options.retention.buffer_past - block_size, block_size)
    }

    fn expire_threshold(options: &Options, now: i64) -> i64 {
        let block_size = options.retention.block_size;
        let cutoff = if options.retention.short_expiry {
            now - options.retention.short_expiry_period - block_size
        } else {
            now - options.retention.retention_period
        };
        truncate_to_block(cutoff, block_size)
    }

    fn needs_update(inner: &Inner, options: &Options, now: i64) -> bool {
        let seal_threshold = Self::seal_threshold(options, now);
        let expire_threshold = Self::expire_threshold(options, now);
        let needs_drain = inner.buffer.buckets().any(|(&start, _)| start <= seal_threshold);
        let needs_expire = inner.sealed_blocks.keys().any(|&start| start < expire_threshold);
        needs_drain || needs_expire
    }

    /// Fast path under the shared lock checks whether anything needs
    /// draining or expiring; only then does it upgrade to the exclusive
    /// lock to actually perform the work.
    pub fn tick(&self) -> Result<TickSummary> {
        let now = self.clock.now();
        {
            let inner = self.inner.read();
            if !Self::needs_update(&inner, &self.options, now) {
                return Ok(TickSummary {
                    active_blocks: inner.buffer.buckets().count(),
                    expired_blocks: 0,
                    sealed_blocks: inner.sealed_blocks.len(),
                });
            }
        }

        let mut inner = self.inner.write();
        let merge_report = inner.buffer.tick();
        tracing::debug!(merged = merge_report.merged_ooo_blocks, "series tick: buffer merge pass complete");

        let seal_threshold = Self::seal_threshold(&self.options, now);
        let to_drain: Vec<i64> = inner
            .buffer
            .buckets()
            .filter(|(&start, _)| start <= seal_threshold)
            .map(|(&start, _)| start)
            .collect();

        let mut sealed_this_tick = 0usize;
        for start in to_drain {
            let Some(bucket) = inner.buffer.remove_bucket(start) else {
                continue;
            };
            let ctx = inner.context_pool.get();
            let segment = drained_segment(&bucket, &ctx);
            ctx.close();
            inner.context_pool.put(ctx);
            if let Some(segment) = segment {
                Self::on_buffer_drained(&mut inner, start, segment);
                sealed_this_tick += 1;
            }
            inner.buffer.release_bucket(bucket);
        }

        let expire_threshold = Self::expire_threshold(&self.options, now);
        let expired: Vec<i64> = inner
            .sealed_blocks
            .keys()
            .filter(|&&start| start < expire_threshold)
            .copied()
            .collect();
        for start in &expired {
            inner.sealed_blocks.remove(start);
        }

        let summary = TickSummary {
            active_blocks: inner.buffer.buckets().count(),
            expired_blocks: expired.len(),
            sealed_blocks: sealed_this_tick,
        };

        self.counters.record_tick(
            merge_report.merged_ooo_blocks as u64,
            summary.sealed_blocks as u64,
            summary.expired_blocks as u64,
        );

        if inner.buffer.is_empty() && inner.sealed_blocks.is_empty() {
            return Err(SeriesBufError::AllDatapointsExpired);
        }
        Ok(summary)
    }

    fn on_buffer_drained(inner: &mut Inner, start: i64, segment: BlockReader) {
        if inner.state != BootstrapState::Bootstrapped {
            inner.pending_bootstrap.push(PendingDrain { start, segment });
            return;
        }
        match inner.sealed_blocks.get_mut(&start) {
            Some(existing) => existing.merge_append(&segment),
            None => {
                let mut block = SealedBlock::new(start, segment);
                block.seal();
                inner.sealed_blocks.insert(start, block);
            }
        }
    }

    /// Bootstrap state machine: see spec's transition table. `blocks` are
    /// consumed — any entry handed off to the live buffer (because it
    /// falls within the freshly reset buffer's retention window) is
    /// removed from the list before the remainder commits as the sealed
    /// map.
    pub fn bootstrap(&self, mut blocks: Vec<SealedBlock>) -> Result<()> {
        let mut inner = self.inner.write();
        match inner.state {
            BootstrapState::Bootstrapping => return Err(SeriesBufError::IsBootstrapping),
            BootstrapState::Bootstrapped => return Ok(()),
            BootstrapState::NotStarted => {}
        }
        inner.state = BootstrapState::Bootstrapping;

        // Drain whatever the buffer currently holds before resetting it;
        // these drains are not yet bootstrapped, so they land in
        // `pending_bootstrap` via `on_buffer_drained`'s state check.
        let now = self.clock.now();
        let open_starts: Vec<i64> = inner.buffer.buckets().map(|(&s, _)| s).collect();
        for start in open_starts {
            if let Some(bucket) = inner.buffer.remove_bucket(start) {
                let ctx = inner.context_pool.get();
                let segment = drained_segment(&bucket, &ctx);
                ctx.close();
                inner.context_pool.put(ctx);
                if let Some(segment) = segment {
                    Self::on_buffer_drained(&mut inner, start, segment);
                }
                inner.buffer.release_bucket(bucket);
            }
        }
        inner.buffer.reset(self.options.clone());

        let block_size = self.options.retention.block_size;
        let buffer_min = truncate_to_block(now - self.options.retention.retention_period, block_size);

        let mut retained = Vec::with_capacity(blocks.len());
        for block in blocks.drain(..) {
            if block.start() >= buffer_min {
                inner.buffer.bootstrap(&block);
            } else {
                retained.push(block);
            }
        }

        let pending = std::mem::take(&mut inner.pending_bootstrap);
        for drain in pending {
            match retained.iter_mut().find(|b| b.start() == drain.start) {
                Some(existing) => existing.merge_append(&drain.segment),
                None => {
                    let mut block = SealedBlock::new(drain.start, drain.segment);
                    block.seal();
                    retained.push(block);
                }
            }
        }

        inner.sealed_blocks = retained.into_iter().map(|b| (b.start(), b)).collect();
        inner.state = BootstrapState::Bootstrapped;
        Ok(())
    }

    /// Takes the sealed block's stream under the shared lock, releases
    /// the lock, then invokes `persist_fn` without holding it — matching
    /// the "no suspension while locked" rule of the concurrency model.
    pub fn flush(&self, _ctx: &Context, block_start: i64, persist_fn: impl FnOnce(&str, BlockReader) -> Result<()>) -> Result<()> {
        let (id, segment) = {
            let inner = self.inner.read();
            if inner.state != BootstrapState::Bootstrapped {
                return Err(SeriesBufError::NotBootstrapped);
            }
            let sealed = inner
                .sealed_blocks
                .get(&block_start)
                .ok_or(SeriesBufError::NoStreamForBlock { block_start })?;
            (inner.id.clone(), sealed.segment().clone())
        };
        persist_fn(&id, segment)
    }

    /// Tears down held resources (buffer buckets, sealed blocks, pending
    /// drains) without changing the series' identity or bootstrap state.
    pub fn close(&self) {
        let mut inner = self.inner.write();
        inner.buffer.reset(self.options.clone());
        inner.sealed_blocks.clear();
        inner.pending_bootstrap.clear();
    }

    /// Clears buffer, sealed blocks and pending drains, reassigns `id`,
    /// and resets bootstrap state to `NotStarted` — for reuse from a
    /// series pool.
    pub fn reset(&self, id: impl Into<String>) {
        let mut inner = self.inner.write();
        inner.id = id.into();
        inner.buffer.reset(self.options.clone());
        inner.sealed_blocks.clear();
        inner.pending_bootstrap.clear();
        inner.state = BootstrapState::NotStarted;
    }
}

fn sealed_range(sealed_blocks: &HashMap<i64, SealedBlock>, block_size: i64) -> Option<(i64, i64)> {
    sealed_blocks.keys().fold(None, |acc, &start| match acc {
        None => Some((start, start + block_size)),
        Some((min, max)) => Some((min.min(start), max.max(start + block_size))),
    })
}

/// Flattens a drained bucket's per-class streams into one ordered
/// segment, folding Realtime and OutOfOrder data together the way a
/// `SealedBlock` expects a single stream. `ctx` is the caller's to close.
fn drained_segment(bucket: &Bucket, ctx: &Context) -> Option<BlockReader> {
    let streams = bucket.streams(ctx, MetricClass::All);

    match streams.len() {
        0 => None,
        1 => streams.into_iter().next(),
        _ => {
            let mut iter = MergeIterator::new();
            iter.reset(streams, bucket.start(), 0);
            let mut combined = Vec::new();
            while iter.next() {
                let (dp, _, _) = iter.current().expect("iterator produced no current after next()=true");
                combined.push(dp);
            }
            Some(BlockReader::new(combined))
        }
    }
}
