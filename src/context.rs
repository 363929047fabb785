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

//! Caller-scoped lifetime for read and flush operations. Streams acquired
//! under a `Context` register a finalizer that releases their pooled
//! buffers; `Context::close` runs every registered finalizer exactly once.
//! A child context created with `Context::child` chains into its parent:
//! closing the parent also closes every still-open child.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::pool::{Pool, Poolable};

type Finalizer = Box<dyn FnOnce() + Send>;

struct Inner {
    finalizers: Mutex<Vec<Finalizer>>,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                finalizers: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Registers `f` to run exactly once, at the next `close()`. If the
    /// context is already closed, `f` runs immediately.
    pub fn register_finalizer(&self, f: impl FnOnce() + Send + 'static) {
        if self.inner.closed.load(Ordering::Acquire) {
            f();
            return;
        }
        self.inner.finalizers.lock().push(Box::new(f));
    }

    /// A child context whose close is driven by the parent: it closes
    /// itself (running its own finalizers) when the parent closes, but can
    /// also be closed independently beforehand.
    pub fn child(&self) -> Context {
        let child = Context::new();
        let child_for_parent = child.clone();
        self.register_finalizer(move || child_for_parent.close());
        child
    }

    /// Runs every registered finalizer exactly once. Idempotent: a second
    /// call is a no-op.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let finalizers = std::mem::take(&mut *self.inner.finalizers.lock());
        for f in finalizers {
            f();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl Poolable for Context {
    /// Valid as long as a pooled `Context` is never drawn while a clone
    /// (e.g. a `child()`) is still alive elsewhere — the same assumption
    /// `Buffer`/`Bucket` pooling makes about their own pooled values.
    fn reset(&mut self) {
        self.inner.finalizers.lock().clear();
        self.inner.closed.store(false, Ordering::Release);
    }
}

/// A bounded pool of reusable `Context`s for internal, short-lived
/// acquisitions (e.g. draining a bucket for sealing) where the crate
/// itself needs a context rather than a caller-supplied one — per spec's
/// "context ... pooled" hot-path allocation list.
pub type ContextPool = Pool<Context>;

pub fn new_context_pool(capacity: usize) -> ContextPool {
    Pool::new("context", capacity, Context::new)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn close_runs_every_finalizer_exactly_once() {
        let ctx = Context::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = count.clone();
            ctx.register_finalizer(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        ctx.close();
        ctx.close();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn register_after_close_runs_immediately() {
        let ctx = Context::new();
        ctx.close();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        ctx.register_finalizer(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn closing_parent_closes_child() {
        let parent = Context::new();
        let child = parent.child();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        child.register_finalizer(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        });
        parent.close();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(child.is_closed());
    }
}
