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

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// The unit a datapoint's timestamp was originally expressed in, carried
/// through the encoder but never interpreted by the core — callers agree
/// on a unit out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
}

/// A single `(timestamp, value)` sample plus an opaque annotation payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Datapoint {
    /// Nanoseconds since the Unix epoch.
    pub timestamp: i64,
    pub value: f64,
    pub unit: TimeUnit,
    /// Opaque; may be empty. Not inspected by the core.
    pub annotation: Bytes,
}

impl Datapoint {
    pub fn new(timestamp: i64, value: f64, unit: TimeUnit) -> Self {
        Self {
            timestamp,
            value,
            unit,
            annotation: Bytes::new(),
        }
    }

    pub fn with_annotation(mut self, annotation: Bytes) -> Self {
        self.annotation = annotation;
        self
    }
}

/// Which class of write a datapoint belongs to, based on how far its
/// timestamp sits from `now` at the instant of the write.
///
/// `All` is a read-only classifier used only as a `classFilter` on read
/// paths (`Bucket::streams`); write paths must never construct it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricClass {
    Realtime,
    OutOfOrder,
    All,
}

impl MetricClass {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricClass::Realtime => "realtime",
            MetricClass::OutOfOrder => "out_of_order",
            MetricClass::All => "all",
        }
    }

    /// Classifies `timestamp` given the sampled `now` and the configured
    /// tolerance windows. Never returns `All`.
    pub fn classify(timestamp: i64, now: i64, buffer_past: i64, buffer_future: i64) -> Self {
        let past_limit = now - buffer_past;
        let future_limit = now + buffer_future;
        if past_limit < timestamp && timestamp < future_limit {
            MetricClass::Realtime
        } else {
            MetricClass::OutOfOrder
        }
    }

    /// The concrete, non-`All` write classes, in a stable order used
    /// wherever the implementation needs to iterate "each class".
    pub const WRITE_CLASSES: [MetricClass; 2] = [MetricClass::Realtime, MetricClass::OutOfOrder];
}
