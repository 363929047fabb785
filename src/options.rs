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

//! Configuration shape for buffer/series construction. Shaped the way the
//! teacher's option structs are (plain, `Clone + Debug + serde`, nested by
//! concern) even though sourcing them from a file/env is out of scope here
//! — only the shape is ambient, not a CLI or config loader.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionOptions {
    /// Width, in nanoseconds, of one block-aligned bucket window.
    pub block_size: i64,
    /// How far behind `now` a timestamp may be and still classify as Realtime.
    pub buffer_past: i64,
    /// How far ahead of `now` a timestamp may be and still classify as Realtime.
    pub buffer_future: i64,
    /// How long a sealed block is retained before `Series::tick` expires it.
    pub retention_period: i64,
    /// Enables the shorter expiry window below, used for block classes
    /// that should age out faster than the default retention period.
    pub short_expiry: bool,
    pub short_expiry_period: i64,
}

impl Default for RetentionOptions {
    fn default() -> Self {
        // One-hour blocks, ten-minute realtime tolerance either side, a
        // day of retention: reasonable defaults for tests and doctests,
        // not a production recommendation.
        Self {
            block_size: 3_600_000_000_000,
            buffer_past: 600_000_000_000,
            buffer_future: 600_000_000_000,
            retention_period: 86_400_000_000_000,
            short_expiry: false,
            short_expiry_period: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseBlockOptions {
    /// Capacity hint handed to a freshly allocated encoder.
    pub alloc_size: usize,
    /// Soft cap on how many encoders/buckets the pools keep on their free
    /// list before further `put` calls just drop the returned value.
    pub pool_capacity: usize,
    /// Hard cap on how many buckets a `Buffer` may have open (checked out
    /// of its bucket pool, not yet returned) at once. Unlike
    /// `pool_capacity`, exceeding this is a real rejection: `Buffer::write`
    /// returns `PoolExhaustion` rather than growing past it.
    pub max_open_buckets: usize,
}

impl Default for DatabaseBlockOptions {
    fn default() -> Self {
        Self {
            alloc_size: 64,
            pool_capacity: 64,
            max_open_buckets: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    pub retention: RetentionOptions,
    pub database_block: DatabaseBlockOptions,
    /// When `false`, `Buffer::write` rejects any write that classifies as
    /// `OutOfOrder` with `OutOfOrderWriteDisabled`.
    pub allow_out_of_order_writes: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            retention: RetentionOptions::default(),
            database_block: DatabaseBlockOptions::default(),
            allow_out_of_order_writes: true,
        }
    }
}
