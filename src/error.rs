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

//! Error taxonomy for the write buffer and block store core.
//!
//! One enum centralizes every error kind a caller can observe, mirroring how
//! the teacher crate keeps a single error type per component boundary rather
//! than ad hoc `String` errors at each call site.

pub type Result<T> = std::result::Result<T, SeriesBufError>;

#[derive(thiserror::Error, Debug)]
pub enum SeriesBufError {
    /// Raised by `Encoder::encode` when `dp.timestamp < lastEncoded.timestamp`.
    #[error("out of order encode: got timestamp {got}, last encoded {last}")]
    OutOfOrderEncode { got: i64, last: i64 },

    /// Raised by `Encoder::encode` (and any op) once the encoder has been closed.
    #[error("encoder is closed")]
    EncoderClosed,

    /// Raised by `Encoder::lastEncoded` when nothing has been encoded yet.
    #[error("encoder is empty")]
    EncoderEmpty,

    /// Raised by `Buffer::write` when the write classifies as out-of-order
    /// and out-of-order writes are disabled by `Options`.
    #[error("out-of-order writes are disabled")]
    OutOfOrderWriteDisabled,

    /// Raised by `Series::bootstrap` while a prior bootstrap is in flight.
    #[error("series is already bootstrapping")]
    IsBootstrapping,

    /// Raised by `Series::flush` when the series has not finished bootstrap.
    #[error("series has not finished bootstrapping")]
    NotBootstrapped,

    /// Raised by `Series::read_encoded` when `end < start`.
    #[error("invalid range: end {end} before start {start}")]
    InvalidRange { start: i64, end: i64 },

    /// Raised by `Buffer::snapshot` when no bucket exists at the requested block start.
    #[error("no stream for block at {block_start}")]
    NoStreamForBlock { block_start: i64 },

    /// Invariant guard in `Bucket::stream`: merge must leave exactly one
    /// stream per class. Indicates a bug in the merge algorithm if raised.
    #[error("more than one stream remained after merge for class {class:?}")]
    MoreThanOneStreamAfterMerge { class: crate::datapoint::MetricClass },

    /// Raised by `Bucket::write`/`Bucket::stream` when called with
    /// `MetricClass::All`, which is a read-only class filter and must never
    /// select a single write slot or a single-class merge target.
    #[error("MetricClass::All is not valid for {op}")]
    InvalidMetricClass { op: &'static str },

    /// Per-block error isolated into that block's `FetchResult`; other
    /// blocks in the same request still complete.
    #[error("failed to acquire stream for block {block_start}: {source}")]
    StreamAcquisitionError {
        block_start: i64,
        #[source]
        source: Box<SeriesBufError>,
    },

    /// Raised when a bucket merge fails to encode into the target encoder.
    /// The bucket is left in its pre-merge state; logged as transient.
    #[error("merge encode failed for bucket at {block_start}: {source}")]
    MergeEncodeError {
        block_start: i64,
        #[source]
        source: Box<SeriesBufError>,
    },

    /// A bounded pool had no free slot and could not grow further.
    #[error("pool exhausted: {pool}")]
    PoolExhaustion { pool: &'static str },

    /// Sentinel returned by `Series::tick` when every bucket has expired;
    /// signals to the caller that the series is now evictable.
    #[error("all datapoints expired")]
    AllDatapointsExpired,
}

impl SeriesBufError {
    pub fn stream_acquisition(block_start: i64, source: SeriesBufError) -> Self {
        Self::StreamAcquisitionError {
            block_start,
            source: Box::new(source),
        }
    }

    pub fn merge_encode(block_start: i64, source: SeriesBufError) -> Self {
        Self::MergeEncodeError {
            block_start,
            source: Box::new(source),
        }
    }

    /// True for error kinds the caller should treat as transient (pool
    /// pressure, a recoverable merge failure) rather than a stable,
    /// parameter- or state-driven rejection.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SeriesBufError::PoolExhaustion { .. } | SeriesBufError::MergeEncodeError { .. }
        )
    }
}
