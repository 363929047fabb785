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

//! `Buffer`: owns the set of buckets spanning the retention window, routes
//! writes by timestamp, and answers reads/metadata queries. Grounded on the
//! teacher's `hummock::store::version` staging routing plus `memory.rs`'s
//! locked in-memory store for the map-of-windows shape.

pub mod cache;

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

pub use cache::BucketCache;

use crate::block::SealedBlock;
use crate::bucket::Bucket;
use crate::clock::Clock;
use crate::context::Context;
use crate::datapoint::{Datapoint, MetricClass, TimeUnit};
use crate::error::{Result, SeriesBufError};
use crate::options::Options;
use crate::pool::Pool;
use crate::stream::BlockReader;
use crate::time::truncate_to_block;

fn new_bucket_pool(options: &Arc<Options>) -> Pool<Bucket> {
    let capacity = options.database_block.pool_capacity;
    let factory_options = options.clone();
    Pool::new("bucket", capacity, move || Bucket::new(0, factory_options.clone()))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub open: usize,
    pub wired: usize,
}

pub struct FetchResult {
    pub start: i64,
    pub result: Result<Vec<BlockReader>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchMetadataOptions {
    pub include_sizes: bool,
    pub include_last_read: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct BlockMetadata {
    pub block_start: i64,
    pub size: Option<usize>,
    pub last_read: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TickReport {
    /// Count of buckets where `merge()` actually folded more than one
    /// source, across both write classes — named `mergedOOOBlocks` to
    /// match spec wording, though it is not limited to the OutOfOrder class.
    pub merged_ooo_blocks: usize,
}

pub struct Buffer {
    buckets: HashMap<i64, Bucket>,
    cache: BucketCache,
    options: Arc<Options>,
    clock: Arc<dyn Clock>,
    bucket_pool: Pool<Bucket>,
}

impl Buffer {
    pub fn new(options: Arc<Options>, clock: Arc<dyn Clock>) -> Self {
        let bucket_pool = new_bucket_pool(&options);
        Self {
            buckets: HashMap::new(),
            cache: BucketCache::new(),
            options,
            clock,
            bucket_pool,
        }
    }

    fn block_start_for(&self, timestamp: i64) -> i64 {
        truncate_to_block(timestamp, self.options.retention.block_size)
    }

    fn touch_cache(&mut self, block_start: i64) {
        let last_read_of = |k: i64| self.buckets.get(&k).map_or(0, |b| b.last_read());
        self.cache.touch(block_start, last_read_of);
    }

    pub fn write(&mut self, _ctx: &Context, timestamp: i64, value: f64, unit: TimeUnit, annotation: &[u8]) -> Result<()> {
        let now = self.clock.now();
        let class = MetricClass::classify(
            timestamp,
            now,
            self.options.retention.buffer_past,
            self.options.retention.buffer_future,
        );
        if class == MetricClass::OutOfOrder && !self.options.allow_out_of_order_writes {
            return Err(SeriesBufError::OutOfOrderWriteDisabled);
        }

        let block_start = self.block_start_for(timestamp);
        let dp = Datapoint {
            timestamp,
            value,
            unit,
            annotation: Bytes::copy_from_slice(annotation),
        };

        if !self.buckets.contains_key(&block_start) {
            let outstanding = self.buckets.len();
            let hard_cap = self.options.database_block.max_open_buckets;
            let mut bucket = self.bucket_pool.try_get_bounded(hard_cap, outstanding)?;
            bucket.reset_to(block_start, self.options.clone());
            self.buckets.insert(block_start, bucket);
        }
        let bucket = self
            .buckets
            .get_mut(&block_start)
            .expect("just inserted or already present");
        bucket.write(class, &dp, unit, annotation)?;

        self.touch_cache(block_start);
        Ok(())
    }

    /// Each inner list is the set of streams covering one overlapping
    /// bucket window; touches `lastRead` on every bucket it visits.
    pub fn read(&mut self, ctx: &Context, start: i64, end: i64) -> Vec<Vec<BlockReader>> {
        let block_size = self.options.retention.block_size;
        let now = self.clock.now();
        let mut out = Vec::new();

        let mut block_start = truncate_to_block(start, block_size);
        while block_start < end {
            if let Some(bucket) = self.buckets.get_mut(&block_start) {
                let streams = bucket.streams(ctx, MetricClass::All);
                bucket.set_last_read(now);
                if !streams.is_empty() {
                    out.push(streams);
                }
            }
            block_start += block_size;
        }

        out
    }

    /// Streams per requested block start, without touching `lastRead`.
    /// Missing buckets produce a `StreamAcquisitionError` isolated to that
    /// block; other requested blocks still succeed.
    pub fn fetch_blocks(&self, ctx: &Context, starts: &[i64]) -> Vec<FetchResult> {
        starts
            .iter()
            .map(|&start| {
                let result = match self.buckets.get(&start) {
                    Some(bucket) => Ok(bucket.streams(ctx, MetricClass::All)),
                    None => Err(SeriesBufError::stream_acquisition(
                        start,
                        SeriesBufError::NoStreamForBlock { block_start: start },
                    )),
                };
                FetchResult { start, result }
            })
            .collect()
    }

    pub fn fetch_blocks_metadata(&self, start: i64, end: i64, opts: FetchMetadataOptions) -> Vec<BlockMetadata> {
        let block_size = self.options.retention.block_size;
        let mut out = Vec::new();
        let mut block_start = truncate_to_block(start, block_size);
        while block_start < end {
            if let Some(bucket) = self.buckets.get(&block_start) {
                out.push(BlockMetadata {
                    block_start,
                    size: opts.include_sizes.then(|| bucket.approx_size()),
                    last_read: opts.include_last_read.then(|| bucket.last_read()),
                });
            }
            block_start += block_size;
        }
        out
    }

    pub fn snapshot(&mut self, ctx: &Context, class: MetricClass, block_start: i64) -> Result<BlockReader> {
        let bucket = self
            .buckets
            .get_mut(&block_start)
            .ok_or(SeriesBufError::NoStreamForBlock { block_start })?;
        match bucket.stream(ctx, class)? {
            Some(reader) => Ok(reader),
            None => Err(SeriesBufError::NoStreamForBlock { block_start }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(|b| b.is_empty())
    }

    pub fn stats(&self) -> BufferStats {
        let wired = self.cache.slots().iter().filter(|s| s.is_some()).count();
        BufferStats {
            open: self.buckets.len(),
            wired,
        }
    }

    /// `(earliest block start, latest block end)` across every open
    /// bucket, or `None` if the buffer holds no buckets.
    pub fn min_max(&self) -> Option<(i64, i64)> {
        let block_size = self.options.retention.block_size;
        self.buckets.keys().fold(None, |acc, &start| match acc {
            None => Some((start, start + block_size)),
            Some((t0, t1)) => Some((t0.min(start), t1.max(start + block_size))),
        })
    }

    pub fn tick(&mut self) -> TickReport {
        let mut merged_ooo_blocks = 0;
        for (&block_start, bucket) in self.buckets.iter_mut() {
            if !bucket.needs_merge() {
                continue;
            }
            match bucket.merge() {
                Ok(report) if report.merges > 0 => merged_ooo_blocks += 1,
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(block_start, %error, "tick: bucket merge failed, retaining pre-merge state");
                }
            }
        }
        TickReport { merged_ooo_blocks }
    }

    /// Routes `block` to the bucket at its start, creating one if absent.
    pub fn bootstrap(&mut self, block: &SealedBlock) {
        let now = self.clock.now();
        let options = self.options.clone();
        let bucket_pool = &self.bucket_pool;
        let bucket = self.buckets.entry(block.start()).or_insert_with(|| {
            let mut bucket = bucket_pool.get();
            bucket.reset_to(block.start(), options);
            bucket
        });
        bucket.bootstrap(block.segment().clone(), block.start(), now);
    }

    /// Clears every open bucket, returning each to the bucket pool rather
    /// than letting it drop (and its encoders with it) uncollected. The
    /// pool itself is only rebuilt if the new options change its shape, so
    /// buckets just released are still reusable on the very next draw.
    pub fn reset(&mut self, options: Arc<Options>) {
        for (_, bucket) in self.buckets.drain() {
            self.bucket_pool.put(bucket);
        }
        self.cache.clear();
        if options.database_block.pool_capacity != self.options.database_block.pool_capacity {
            self.bucket_pool = new_bucket_pool(&options);
        }
        self.options = options;
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&i64, &Bucket)> {
        self.buckets.iter()
    }

    pub fn remove_bucket(&mut self, block_start: i64) -> Option<Bucket> {
        self.cache.invalidate(block_start);
        self.buckets.remove(&block_start)
    }

    /// Returns a bucket removed via `remove_bucket` to the pool once the
    /// caller is done with it (e.g. after extracting its drained segment).
    pub fn release_bucket(&self, bucket: Bucket) {
        self.bucket_pool.put(bucket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn buffer_with_options(options: Options, now: i64) -> (Buffer, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let buffer = Buffer::new(Arc::new(options), clock.clone());
        (buffer, clock)
    }

    fn default_options() -> Options {
        let mut opts = Options::default();
        opts.retention.block_size = 3_600_000_000_000;
        opts.retention.buffer_past = 600_000_000_000;
        opts.retention.buffer_future = 600_000_000_000;
        opts
    }

    #[test]
    fn simple_realtime_write_and_read_round_trips() {
        let t0 = 12 * 3_600 * 1_000_000_000i64;
        let (mut buf, _clock) = buffer_with_options(default_options(), t0);
        let ctx = Context::new();

        buf.write(&ctx, t0, 1.0, TimeUnit::Nanoseconds, b"").unwrap();
        buf.write(&ctx, t0 + 10_000_000_000, 2.0, TimeUnit::Nanoseconds, b"").unwrap();
        buf.write(&ctx, t0 + 20_000_000_000, 3.0, TimeUnit::Nanoseconds, b"").unwrap();

        let windows = buf.read(&ctx, t0, t0 + 60_000_000_000);
        assert_eq!(windows.len(), 1);
        let values: Vec<f64> = windows[0].iter().flat_map(|s| s.as_slice().iter().map(|d| d.value)).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn out_of_order_write_disabled_is_rejected() {
        let mut opts = default_options();
        opts.allow_out_of_order_writes = false;
        let now = 12 * 3_600 * 1_000_000_000i64;
        let (mut buf, _clock) = buffer_with_options(opts, now);
        let ctx = Context::new();

        let err = buf
            .write(&ctx, now - 15 * 60 * 1_000_000_000, 7.0, TimeUnit::Nanoseconds, b"")
            .unwrap_err();
        assert!(matches!(err, SeriesBufError::OutOfOrderWriteDisabled));
    }

    #[test]
    fn tick_merges_upserted_bucket_and_counts_it() {
        let now = 12 * 3_600 * 1_000_000_000i64;
        let (mut buf, _clock) = buffer_with_options(default_options(), now);
        let ctx = Context::new();

        buf.write(&ctx, now + 5_000_000_000, 1.0, TimeUnit::Nanoseconds, b"").unwrap();
        buf.write(&ctx, now + 5_000_000_000, 9.0, TimeUnit::Nanoseconds, b"").unwrap();

        let report = buf.tick();
        assert_eq!(report.merged_ooo_blocks, 1);

        let windows = buf.read(&ctx, now, now + 3_600_000_000_000);
        let values: Vec<f64> = windows[0].iter().flat_map(|s| s.as_slice().iter().map(|d| d.value)).collect();
        assert_eq!(values, vec![9.0]);
    }

    #[test]
    fn bootstrap_routes_to_bucket_at_block_start() {
        let now = 13 * 3_600 * 1_000_000_000i64;
        let (mut buf, _clock) = buffer_with_options(default_options(), now);
        let ctx = Context::new();

        let block_start = 12 * 3_600 * 1_000_000_000i64;
        let boot = SealedBlock::new(
            block_start,
            BlockReader::new(vec![Datapoint::new(block_start + 1_800_000_000_000, 10.0, TimeUnit::Nanoseconds)]),
        );
        buf.bootstrap(&boot);
        buf.write(
            &ctx,
            block_start + 2_700_000_000_000,
            20.0,
            TimeUnit::Nanoseconds,
            b"",
        )
        .unwrap();

        let windows = buf.read(&ctx, block_start, block_start + 3_600_000_000_000);
        assert_eq!(windows.len(), 1);
        let values: Vec<f64> = windows[0].iter().flat_map(|s| s.as_slice().iter().map(|d| d.value)).collect();
        assert_eq!(values, vec![10.0, 20.0]);
    }

    #[test]
    fn write_past_max_open_buckets_is_pool_exhaustion() {
        let mut opts = default_options();
        opts.database_block.max_open_buckets = 1;
        let now = 12 * 3_600 * 1_000_000_000i64;
        let (mut buf, _clock) = buffer_with_options(opts, now);
        let ctx = Context::new();

        buf.write(&ctx, now, 1.0, TimeUnit::Nanoseconds, b"").unwrap();
        let err = buf
            .write(&ctx, now + 3_600_000_000_000, 2.0, TimeUnit::Nanoseconds, b"")
            .unwrap_err();
        assert!(matches!(err, SeriesBufError::PoolExhaustion { pool: "bucket" }));
    }

    #[test]
    fn stats_reports_open_bucket_count() {
        let now = 12 * 3_600 * 1_000_000_000i64;
        let (mut buf, _clock) = buffer_with_options(default_options(), now);
        let ctx = Context::new();
        buf.write(&ctx, now, 1.0, TimeUnit::Nanoseconds, b"").unwrap();
        assert_eq!(buf.stats().open, 1);
        assert_eq!(buf.stats().wired, 1);
    }
}
