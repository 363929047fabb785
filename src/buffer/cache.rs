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

//! Two-slot cache of recently used bucket keys for the hot write path. The
//! write path almost always lands in the current or the previous block, so
//! two slots are enough (spec.md §9). The teacher's Go original caches raw
//! bucket pointers to skip the map lookup entirely; a `HashMap<i64, _>`
//! entry behind a single `Series`-wide lock makes that unsound across
//! resizes in safe Rust, so this caches the bucket *key* instead — callers
//! still do one hashmap lookup, but the slot bookkeeping (prefer-empty,
//! else replace-oldest-by-`lastRead`) is the same policy the teacher uses.

pub struct BucketCache {
    slots: [Option<i64>; 2],
}

impl Default for BucketCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BucketCache {
    pub fn new() -> Self {
        Self { slots: [None, None] }
    }

    pub fn contains(&self, block_start: i64) -> bool {
        self.slots.iter().any(|s| *s == Some(block_start))
    }

    pub fn slots(&self) -> [Option<i64>; 2] {
        self.slots
    }

    /// Records `block_start` as recently used. `last_read_of` supplies the
    /// `lastRead` for a given key so the replacement policy can pick the
    /// slot whose bucket was least recently read.
    pub fn touch(&mut self, block_start: i64, last_read_of: impl Fn(i64) -> i64) {
        if self.contains(block_start) {
            return;
        }
        if let Some(idx) = self.slots.iter().position(|s| s.is_none()) {
            self.slots[idx] = Some(block_start);
            return;
        }
        let (idx0, idx1) = (0, 1);
        let lr0 = last_read_of(self.slots[idx0].expect("slot occupied"));
        let lr1 = last_read_of(self.slots[idx1].expect("slot occupied"));
        let victim = if lr0 <= lr1 { idx0 } else { idx1 };
        self.slots[victim] = Some(block_start);
    }

    pub fn invalidate(&mut self, block_start: i64) {
        for slot in self.slots.iter_mut() {
            if *slot == Some(block_start) {
                *slot = None;
            }
        }
    }

    pub fn clear(&mut self) {
        self.slots = [None, None];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_empty_slot_before_evicting() {
        let mut cache = BucketCache::new();
        cache.touch(1, |_| 0);
        cache.touch(2, |_| 0);
        assert_eq!(cache.slots(), [Some(1), Some(2)]);
    }

    #[test]
    fn evicts_the_slot_with_the_older_last_read() {
        let mut cache = BucketCache::new();
        cache.touch(1, |_| 0);
        cache.touch(2, |_| 0);
        let last_read = |k: i64| if k == 1 { 100 } else { 5 };
        cache.touch(3, last_read);
        assert_eq!(cache.slots(), [Some(1), Some(3)]);
    }

    #[test]
    fn touching_a_cached_key_is_a_no_op() {
        let mut cache = BucketCache::new();
        cache.touch(1, |_| 0);
        cache.touch(1, |_| panic!("should not need last_read for an already-cached key"));
        assert_eq!(cache.slots(), [Some(1), None]);
    }
}
