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

//! Multi-reader merge iterator: fuses several already-ordered `BlockReader`
//! streams into one ordered stream. On a timestamp tie across sources, the
//! *later-supplied* source wins — the load-bearing property `Bucket`'s
//! merge algorithm rests on to get upsert semantics for free (see
//! `crate::bucket`), matching the teacher's `HummockIteratorUnion` /
//! merge-iterator convention that the "second" input shadows the "first"
//! at equal keys.

use crate::datapoint::{Datapoint, TimeUnit};
use crate::stream::{BlockReader, StreamCursor};

/// The interface external callers (or `Bucket::merge`) drive a merge
/// through. `reset` rebuilds the iterator over a fresh set of sources in
/// append order (oldest/bootstrapped first, most-recently-added last);
/// later indices win ties.
pub trait MultiReaderIterator {
    fn reset(&mut self, streams: Vec<BlockReader>, start: i64, block_size: i64);
    fn next(&mut self) -> bool;
    fn current(&self) -> Option<(Datapoint, TimeUnit, Vec<u8>)>;
    fn close(&mut self);
}

/// Default in-memory implementation: linear scan across a handful of
/// cursors. Bucket merges only ever fuse a few encoders plus at most two
/// bootstrapped blocks per class, so an O(n) scan per step beats the
/// bookkeeping of a binary heap.
#[derive(Default)]
pub struct MergeIterator {
    cursors: Vec<StreamCursor>,
    current: Option<(Datapoint, TimeUnit, Vec<u8>)>,
}

impl MergeIterator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index (into `cursors`, hence into the original `streams` order) of
    /// the winning source for the next emitted datapoint, or `None` if
    /// every cursor is exhausted. On a timestamp tie, the highest index —
    /// the most recently supplied source — wins.
    fn pick_winner(&self) -> Option<usize> {
        let mut winner: Option<(usize, i64)> = None;
        for (idx, cursor) in self.cursors.iter().enumerate() {
            if let Some(dp) = cursor.peek() {
                match winner {
                    None => winner = Some((idx, dp.timestamp)),
                    Some((_, best_ts)) => {
                        if dp.timestamp < best_ts {
                            winner = Some((idx, dp.timestamp));
                        } else if dp.timestamp == best_ts && idx > winner.unwrap().0 {
                            // later-supplied source wins ties
                            winner = Some((idx, dp.timestamp));
                        }
                    }
                }
            }
        }
        winner.map(|(idx, _)| idx)
    }
}

impl MultiReaderIterator for MergeIterator {
    fn reset(&mut self, streams: Vec<BlockReader>, _start: i64, _block_size: i64) {
        self.cursors = streams.iter().map(|s| s.cursor()).collect();
        self.current = None;
    }

    fn next(&mut self) -> bool {
        let Some(winner_idx) = self.pick_winner() else {
            self.current = None;
            return false;
        };
        let winning_ts = self.cursors[winner_idx].peek().unwrap().timestamp;
        let winning_dp = self.cursors[winner_idx].peek().unwrap().clone();
        self.cursors[winner_idx].advance();

        // Shadowed sources: any other cursor sitting on the same
        // timestamp loses and must also be skipped past it, or it would
        // resurface (wrongly) on a later step once the winner moves on.
        for (idx, cursor) in self.cursors.iter_mut().enumerate() {
            if idx == winner_idx {
                continue;
            }
            if cursor.peek().map(|dp| dp.timestamp) == Some(winning_ts) {
                cursor.advance();
            }
        }

        self.current = Some((winning_dp.clone(), winning_dp.unit, winning_dp.annotation.to_vec()));
        true
    }

    fn current(&self) -> Option<(Datapoint, TimeUnit, Vec<u8>)> {
        self.current.clone()
    }

    fn close(&mut self) {
        self.cursors.clear();
        self.current = None;
    }
}
