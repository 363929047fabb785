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

//! A small bounded object pool shared by the encoder, bucket and context
//! pools. `get` draws a pooled value or builds a fresh one via the pool's
//! factory; `put` returns it. `put` is idempotent: returning a value that
//! was never drawn from this pool (or returning it twice) just grows or
//! re-fills the free list, it never panics or corrupts state.

use parking_lot::Mutex;

use crate::error::{Result, SeriesBufError};

pub trait Poolable {
    /// Reinitialize `self` for reuse, as if freshly constructed.
    fn reset(&mut self);
}

pub struct Pool<T> {
    name: &'static str,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    free: Mutex<Vec<T>>,
    capacity: usize,
}

impl<T: Poolable> Pool<T> {
    pub fn new(name: &'static str, capacity: usize, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            name,
            factory: Box::new(factory),
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Draws a pooled value if one is free, otherwise builds one via the
    /// factory. Unbounded pools (the common case here — encoders and
    /// buckets are cheap to allocate) never return `PoolExhaustion`;
    /// `capacity` only bounds how large the free list is allowed to grow
    /// in `put`.
    pub fn get(&self) -> T {
        if let Some(mut item) = self.free.lock().pop() {
            item.reset();
            item
        } else {
            (self.factory)()
        }
    }

    /// Returns `item` to the free list, dropping it instead if the pool is
    /// already at capacity. Safe to call more than once for the same
    /// logical slot — at worst it is dropped on a later call.
    pub fn put(&self, item: T) {
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(item);
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// A strict variant used by call sites that want pool exhaustion
    /// surfaced rather than silently falling back to allocation (per
    /// spec.md §7's `PoolExhaustion` row, for a pool configured with a
    /// hard cap rather than a soft free-list cap).
    pub fn try_get_bounded(&self, hard_cap: usize, outstanding: usize) -> Result<T> {
        if outstanding >= hard_cap {
            tracing::warn!(pool = self.name, hard_cap, outstanding, "pool exhausted");
            return Err(SeriesBufError::PoolExhaustion { pool: self.name });
        }
        Ok(self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Widget {
        resets: usize,
        value: u32,
    }

    impl Poolable for Widget {
        fn reset(&mut self) {
            self.resets += 1;
            self.value = 0;
        }
    }

    #[test]
    fn reuses_returned_items_and_resets_them() {
        let pool = Pool::new("widget", 4, Widget::default);
        let mut w = pool.get();
        w.value = 42;
        pool.put(w);

        let w2 = pool.get();
        assert_eq!(w2.value, 0);
        assert_eq!(w2.resets, 1);
    }

    #[test]
    fn put_is_idempotent_up_to_capacity() {
        let pool = Pool::new("widget", 1, Widget::default);
        pool.put(Widget::default());
        pool.put(Widget::default());
        assert_eq!(pool.free.lock().len(), 1);
    }
}
