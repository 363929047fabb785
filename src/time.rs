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

//! Nanosecond timestamp arithmetic shared by the buffer and series layers.

/// Truncates `ts` down to the nearest multiple of `block_size`, both in
/// nanoseconds. Negative timestamps truncate towards negative infinity,
/// matching a wall-clock "floor to block boundary" semantic.
pub fn truncate_to_block(ts: i64, block_size: i64) -> i64 {
    debug_assert!(block_size > 0, "block_size must be positive");
    ts.div_euclid(block_size) * block_size
}
