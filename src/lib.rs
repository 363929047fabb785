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

//! Per-series in-memory write buffer and sealed-block store for a metrics
//! platform: a streaming columnar encoder, a multi-encoder bucket with
//! upsert/merge semantics, a buffer owning a retention window of buckets,
//! and a series fusing buffer reads with bootstrapped historical blocks.
//!
//! The tree of components, in data-flow order:
//!
//! - [`encoder::Encoder`] / [`encoder::ColumnarEncoder`] — append-only
//!   columnar storage for one in-order run of datapoints.
//! - [`bucket::Bucket`] — per block-aligned start, a set of encoder slots
//!   split by [`datapoint::MetricClass`] plus bootstrapped overlay blocks.
//! - [`buffer::Buffer`] — the set of buckets spanning the retention
//!   window; write routing, the hot-path bucket cache, tick-time merges.
//! - [`series::Series`] — wraps a buffer and a sealed-block map, drives
//!   the bootstrap state machine, fans reads out across both.
//!
//! On-disk persistence, cluster placement, replication, RPC transport,
//! rule matching/aggregation and metrics emission are external
//! collaborators; this crate only defines the interfaces they plug into
//! ([`clock::Clock`], [`context::Context`], [`options::Options`], the
//! `persist_fn` closure taken by [`series::Series::flush`]).

pub mod block;
pub mod bucket;
pub mod buffer;
pub mod clock;
pub mod context;
pub mod datapoint;
pub mod encoder;
pub mod error;
pub mod iterator;
pub mod options;
pub mod pool;
pub mod series;
pub mod stats;
pub mod stream;
pub mod time;

pub use block::SealedBlock;
pub use bucket::{Bucket, MergeReport};
pub use buffer::{BlockMetadata, Buffer, BufferStats, FetchMetadataOptions, FetchResult};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::Context;
pub use datapoint::{Datapoint, MetricClass, TimeUnit};
pub use encoder::{ColumnarEncoder, Encoder};
pub use error::{Result, SeriesBufError};
pub use options::{DatabaseBlockOptions, Options, RetentionOptions};
pub use series::{BootstrapState, Series, TickSummary};
pub use stats::{Counters, CountersSnapshot};
pub use stream::BlockReader;
