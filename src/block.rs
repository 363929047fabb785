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

//! `SealedBlock`: an immutable block promoted out of the buffer once its
//! window has aged past `bufferPast`, or handed in at bootstrap as
//! already-recovered history. Grounded on the teacher's
//! `StagingSstableInfo` — immutable once built, tagged with the window it
//! covers, closed rather than mutated.

use crate::stream::BlockReader;

#[derive(Clone)]
pub struct SealedBlock {
    start: i64,
    segment: BlockReader,
    checksum: Option<u32>,
    sealed: bool,
}

impl SealedBlock {
    pub fn new(start: i64, segment: BlockReader) -> Self {
        Self {
            start,
            segment,
            checksum: None,
            sealed: false,
        }
    }

    pub fn with_checksum(mut self, checksum: u32) -> Self {
        self.checksum = Some(checksum);
        self
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn segment(&self) -> &BlockReader {
        &self.segment
    }

    pub fn checksum(&self) -> Option<u32> {
        self.checksum
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Transitions the block to sealed. A no-op if already sealed.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Merge-appends `other`'s datapoints after this block's own, used
    /// when a bootstrap drain delivers more data for a start this series
    /// already has a sealed block for (see `Series::on_buffer_drained`).
    pub fn merge_append(&mut self, other: &BlockReader) {
        // `other` is the newer arrival: put it first so a stable sort by
        // timestamp keeps its value on a tie with the existing segment.
        let mut combined: Vec<_> = other.as_slice().to_vec();
        combined.extend(self.segment.as_slice().iter().cloned());
        combined.sort_by_key(|dp| dp.timestamp);
        combined.dedup_by_key(|dp| dp.timestamp);
        self.segment = BlockReader::new(combined);
    }
}
