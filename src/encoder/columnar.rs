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

use super::Encoder;
use crate::datapoint::{Datapoint, TimeUnit};
use crate::error::{Result, SeriesBufError};
use crate::pool::Poolable;
use crate::stream::BlockReader;

/// Append-only columnar encoder: parallel columns for timestamp, value and
/// annotation rather than a `Vec<Datapoint>` of structs, the way the
/// teacher's sstable/batch builders lay out a column per field instead of
/// row objects. Enforces strict non-decreasing timestamp order and
/// collapses an exact `(timestamp, value)` repeat into a no-op.
pub struct ColumnarEncoder {
    start: i64,
    timestamps: Vec<i64>,
    values: Vec<f64>,
    units: Vec<TimeUnit>,
    annotations: Vec<Bytes>,
    closed: bool,
}

impl ColumnarEncoder {
    pub fn new(start: i64, alloc_size: usize) -> Self {
        Self {
            start,
            timestamps: Vec::with_capacity(alloc_size),
            values: Vec::with_capacity(alloc_size),
            units: Vec::with_capacity(alloc_size),
            annotations: Vec::with_capacity(alloc_size),
            closed: false,
        }
    }
}

impl Encoder for ColumnarEncoder {
    fn encode(&mut self, dp: &Datapoint, unit: TimeUnit, annotation: &[u8]) -> Result<()> {
        if self.closed {
            return Err(SeriesBufError::EncoderClosed);
        }
        if let Some(&last_ts) = self.timestamps.last() {
            if dp.timestamp < last_ts {
                return Err(SeriesBufError::OutOfOrderEncode {
                    got: dp.timestamp,
                    last: last_ts,
                });
            }
            if dp.timestamp == last_ts {
                let last_value = *self.values.last().unwrap();
                if last_value == dp.value {
                    // identical (timestamp, value) repeat: no-op
                    return Ok(());
                }
                // same timestamp, different value: the bucket's write path
                // is responsible for routing this to a new slot so that
                // merge's "later source wins" tie-break applies — an
                // encoder on its own always appends in place here since
                // dp.timestamp >= last_ts still holds non-decreasing order.
            }
        }
        self.timestamps.push(dp.timestamp);
        self.values.push(dp.value);
        self.units.push(unit);
        self.annotations.push(Bytes::copy_from_slice(annotation));
        Ok(())
    }

    fn last_encoded(&self) -> Result<Datapoint> {
        match self.timestamps.last() {
            Some(&ts) => Ok(Datapoint {
                timestamp: ts,
                value: *self.values.last().unwrap(),
                unit: *self.units.last().unwrap(),
                annotation: self.annotations.last().unwrap().clone(),
            }),
            None => Err(SeriesBufError::EncoderEmpty),
        }
    }

    fn stream(&self) -> Option<BlockReader> {
        if self.timestamps.is_empty() {
            return None;
        }
        let datapoints = self
            .timestamps
            .iter()
            .zip(&self.values)
            .zip(&self.units)
            .zip(&self.annotations)
            .map(|(((&timestamp, &value), &unit), annotation)| Datapoint {
                timestamp,
                value,
                unit,
                annotation: annotation.clone(),
            })
            .collect();
        Some(BlockReader::new(datapoints))
    }

    fn num_encoded(&self) -> usize {
        self.timestamps.len()
    }

    fn len(&self) -> usize {
        self.timestamps.len() * (std::mem::size_of::<i64>() + std::mem::size_of::<f64>())
            + self.annotations.iter().map(|a| a.len()).sum::<usize>()
    }

    fn reset(&mut self, start: i64, alloc_size: usize) {
        self.start = start;
        self.timestamps.clear();
        self.values.clear();
        self.units.clear();
        self.annotations.clear();
        self.timestamps.reserve(alloc_size);
        self.values.reserve(alloc_size);
        self.units.reserve(alloc_size);
        self.annotations.reserve(alloc_size);
        self.closed = false;
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn start(&self) -> i64 {
        self.start
    }
}

impl Poolable for ColumnarEncoder {
    fn reset(&mut self) {
        Encoder::reset(self, self.start, 0);
    }
}
