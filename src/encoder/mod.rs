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

mod columnar;

pub use columnar::ColumnarEncoder;

use crate::datapoint::{Datapoint, TimeUnit};
use crate::error::Result;
use crate::stream::BlockReader;

/// Append-only columnar encoder for one in-order run of datapoints. Bound
/// at construction to a block-aligned `start` timestamp and a capacity
/// hint. The atomic unit of in-memory storage: every upsert/merge trick at
/// the bucket level rests on the contract below.
pub trait Encoder: Send {
    /// Appends `dp`, failing if it would break strict non-decreasing
    /// timestamp order. Two identical `(timestamp, value)` pairs in a row
    /// collapse to a no-op rather than an error.
    fn encode(&mut self, dp: &Datapoint, unit: TimeUnit, annotation: &[u8]) -> Result<()>;

    /// The most recently encoded datapoint, or `EncoderEmpty` if nothing
    /// has been encoded yet.
    fn last_encoded(&self) -> Result<Datapoint>;

    /// A stream reflecting every datapoint encoded so far, as a snapshot
    /// taken at call time. Returns `None` if nothing has been encoded.
    /// Later writes to this encoder do not affect a stream already
    /// returned — the caller owns that snapshot until it ends the stream's
    /// lifetime (by dropping it, or via a registered `Context` finalizer).
    fn stream(&self) -> Option<BlockReader>;

    /// Number of datapoints encoded so far.
    fn num_encoded(&self) -> usize;

    /// Approximate encoded byte length, used for pool/capacity accounting.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.num_encoded() == 0
    }

    /// Reinitializes the encoder for reuse at a new block-aligned `start`
    /// with a fresh capacity hint, as if newly constructed.
    fn reset(&mut self, start: i64, alloc_size: usize);

    /// Marks the encoder closed; any further `encode` call fails with
    /// `EncoderClosed`.
    fn close(&mut self);

    fn start(&self) -> i64;
}
