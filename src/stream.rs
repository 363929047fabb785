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

//! `BlockReader`: a cheap, immutable handle over a snapshot of encoded
//! datapoints. Cloning a `BlockReader` bumps a refcount, it never copies
//! the underlying column data — the same trade-off the teacher makes with
//! its `Arc`-wrapped `StagingSstableInfo` / `PinnedVersion` snapshots.

use std::sync::Arc;

use crate::datapoint::Datapoint;

/// An immutable, already-ordered run of datapoints taken at a single
/// instant. Two `BlockReader`s built from different sources may still need
/// merging (see `crate::iterator`) to restore a single ordered stream.
#[derive(Clone)]
pub struct BlockReader {
    datapoints: Arc<Vec<Datapoint>>,
}

impl BlockReader {
    pub fn new(datapoints: Vec<Datapoint>) -> Self {
        Self {
            datapoints: Arc::new(datapoints),
        }
    }

    pub fn from_arc(datapoints: Arc<Vec<Datapoint>>) -> Self {
        Self { datapoints }
    }

    pub fn len(&self) -> usize {
        self.datapoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datapoints.is_empty()
    }

    pub fn as_slice(&self) -> &[Datapoint] {
        &self.datapoints
    }

    pub fn cursor(&self) -> StreamCursor {
        StreamCursor {
            datapoints: self.datapoints.clone(),
            pos: 0,
        }
    }
}

/// A single forward-only walk over a `BlockReader`'s datapoints.
pub struct StreamCursor {
    datapoints: Arc<Vec<Datapoint>>,
    pos: usize,
}

impl StreamCursor {
    pub fn peek(&self) -> Option<&Datapoint> {
        self.datapoints.get(self.pos)
    }

    pub fn advance(&mut self) {
        self.pos += 1;
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.datapoints.len()
    }
}
