//! Ordered segment table.
//!
//! The table is stored as `count + 1` boundaries plus one data map per
//! segment. Segment `i` spans `[boundaries[i], boundaries[i + 1]]`.
//!
//! Invariants (hold after every operation, including failed ones):
//! - boundaries are non-decreasing
//! - the first and last boundary are the domain extremes and never move
//! - `1 <= count <= MAX_SEGMENTS`
//! - every structural or data change bumps `revision`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SegmentError;
use crate::params::ParamValue;

/// Upper bound on the number of segments of one curve.
pub const MAX_SEGMENTS: usize = 20;

/// Per-segment bookkeeping values (e.g. the phase step `PHIN`).
pub type SegmentData = BTreeMap<String, ParamValue>;

/// Owned copy of one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub left: f64,
    pub right: f64,
    pub data: SegmentData,
}

impl Segment {
    pub fn is_empty(&self) -> bool {
        is_close(self.left, self.right)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SegmentTableRepr", into = "SegmentTableRepr")]
pub struct SegmentTable {
    boundaries: Vec<f64>,
    data: Vec<SegmentData>,
    revision: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SegmentTableRepr {
    boundaries: Vec<f64>,
    data: Vec<SegmentData>,
}

impl TryFrom<SegmentTableRepr> for SegmentTable {
    type Error = SegmentError;

    fn try_from(repr: SegmentTableRepr) -> Result<Self, Self::Error> {
        let count = repr.data.len();
        if count == 0 || count > MAX_SEGMENTS || repr.boundaries.len() != count + 1 {
            return Err(SegmentError::InvalidCount {
                count,
                max: MAX_SEGMENTS,
            });
        }
        let min = repr.boundaries[0];
        let max = repr.boundaries[count];
        let monotonic = repr.boundaries.windows(2).all(|w| w[0] <= w[1]);
        if !(min.is_finite() && max.is_finite() && min < max) || !monotonic {
            return Err(SegmentError::InvalidDomain { min, max });
        }
        Ok(Self {
            boundaries: repr.boundaries,
            data: repr.data,
            revision: 0,
        })
    }
}

impl From<SegmentTable> for SegmentTableRepr {
    fn from(table: SegmentTable) -> Self {
        Self {
            boundaries: table.boundaries,
            data: table.data,
        }
    }
}

impl Default for SegmentTable {
    fn default() -> Self {
        Self {
            boundaries: vec![0.0, 1.0],
            data: vec![SegmentData::new()],
            revision: 0,
        }
    }
}

/// Relative closeness with the same tolerance the solver front-ends use
/// (`rel_tol = 1e-9`, no absolute tolerance).
pub fn is_close(a: f64, b: f64) -> bool {
    a == b || (a - b).abs() <= 1e-9 * a.abs().max(b.abs())
}

impl SegmentTable {
    /// `count` equal segments over `[0, 1]`, each with a copy of `data`.
    pub fn uniform(count: usize, data: SegmentData) -> Result<Self, SegmentError> {
        Self::with_domain(0.0, 1.0, count, data)
    }

    pub fn with_domain(
        min: f64,
        max: f64,
        count: usize,
        data: SegmentData,
    ) -> Result<Self, SegmentError> {
        if count == 0 || count > MAX_SEGMENTS {
            return Err(SegmentError::InvalidCount {
                count,
                max: MAX_SEGMENTS,
            });
        }
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(SegmentError::InvalidDomain { min, max });
        }
        let step = (max - min) / count as f64;
        let mut boundaries: Vec<f64> = (0..count).map(|i| min + step * i as f64).collect();
        boundaries.push(max);
        Ok(Self {
            boundaries,
            data: vec![data; count],
            revision: 0,
        })
    }

    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.boundaries[0], self.boundaries[self.boundaries.len() - 1])
    }

    fn check_index(&self, index: usize) -> Result<(), SegmentError> {
        if index < self.count() {
            Ok(())
        } else {
            Err(SegmentError::IndexOutOfRange {
                index,
                count: self.count(),
            })
        }
    }

    fn bump(&mut self) {
        self.revision += 1;
    }

    pub fn range(&self, index: usize) -> Result<(f64, f64), SegmentError> {
        self.check_index(index)?;
        Ok((self.boundaries[index], self.boundaries[index + 1]))
    }

    pub fn segment(&self, index: usize) -> Result<Segment, SegmentError> {
        let (left, right) = self.range(index)?;
        Ok(Segment {
            left,
            right,
            data: self.data[index].clone(),
        })
    }

    /// Copies of all segments, in domain order.
    pub fn segments(&self) -> Vec<Segment> {
        self.data
            .iter()
            .enumerate()
            .map(|(i, data)| Segment {
                left: self.boundaries[i],
                right: self.boundaries[i + 1],
                data: data.clone(),
            })
            .collect()
    }

    pub fn is_empty(&self, index: usize) -> Result<bool, SegmentError> {
        let (left, right) = self.range(index)?;
        Ok(is_close(left, right))
    }

    /// Index of the segment with `left <= pos < right`.
    ///
    /// The domain maximum belongs to the last segment.
    pub fn segment_at(&self, pos: f64) -> Result<usize, SegmentError> {
        let (min, max) = self.domain();
        if pos < min && !is_close(pos, min) {
            return Err(SegmentError::PositionOutOfDomain { pos, min, max });
        }
        if let Some(index) = (0..self.count()).find(|&s| self.boundaries[s + 1] > pos) {
            return Ok(index);
        }
        if is_close(pos, max) {
            Ok(self.count() - 1)
        } else {
            Err(SegmentError::PositionOutOfDomain { pos, min, max })
        }
    }

    /// Insert a boundary inside segment `index` and return it.
    ///
    /// Without `divider` the midpoint is used (`left` for an empty segment).
    /// The new segment (to the right) starts with a copy of the data of the
    /// split one.
    pub fn split(&mut self, index: usize, divider: Option<f64>) -> Result<f64, SegmentError> {
        let (left, right) = self.range(index)?;
        if self.count() >= MAX_SEGMENTS {
            return Err(SegmentError::TooManySegments { max: MAX_SEGMENTS });
        }
        let divider = match divider {
            Some(d) if d.is_finite() && left <= d && d <= right => d,
            Some(d) => {
                return Err(SegmentError::DividerOutOfRange {
                    divider: d,
                    left,
                    right,
                });
            }
            None if is_close(left, right) => left,
            None => left + (right - left) / 2.0,
        };
        let data = self.data[index].clone();
        self.boundaries.insert(index + 1, divider);
        self.data.insert(index + 1, data);
        self.bump();
        Ok(divider)
    }

    /// Split the segment containing `pos` at `pos`; returns the split index.
    pub fn split_at(&mut self, pos: f64) -> Result<usize, SegmentError> {
        let index = self.segment_at(pos)?;
        self.split(index, Some(pos))?;
        Ok(index)
    }

    /// Remove segment `index`.
    ///
    /// The removed boundary is the segment's left one, except for the first
    /// segment where it is the right one; the neighbour absorbs the range.
    pub fn delete(&mut self, index: usize) -> Result<(), SegmentError> {
        self.check_index(index)?;
        if self.count() == 1 {
            return Err(SegmentError::LastSegment);
        }
        self.data.remove(index);
        self.boundaries.remove(index.max(1));
        self.bump();
        Ok(())
    }

    /// Remove every zero-width segment while at least one segment remains.
    pub fn delete_empty(&mut self) -> usize {
        let mut removed = 0;
        for index in (0..self.count()).rev() {
            if self.count() > 1 && is_close(self.boundaries[index], self.boundaries[index + 1]) {
                self.data.remove(index);
                self.boundaries.remove(index.max(1));
                removed += 1;
            }
        }
        if removed > 0 {
            self.bump();
        }
        removed
    }

    /// Move the left (`from`) and/or right (`to`) boundary of segment `index`.
    ///
    /// Neighbouring boundaries that would cross the moved one are pushed to
    /// the same value. Domain extremes are never moved; values numerically
    /// equal to the current boundary are ignored. Returns whether anything
    /// changed.
    pub fn set_range(
        &mut self,
        index: usize,
        from: Option<f64>,
        to: Option<f64>,
    ) -> Result<bool, SegmentError> {
        self.check_index(index)?;
        let (min, max) = self.domain();
        for pos in [from, to].into_iter().flatten() {
            if !(pos.is_finite() && min <= pos && pos <= max) {
                return Err(SegmentError::PositionOutOfDomain { pos, min, max });
            }
        }

        let last = self.boundaries.len() - 1;
        let mut modified = false;

        if let Some(value) = from {
            if index > 0 && !is_close(self.boundaries[index], value) && value < max {
                self.boundaries[index] = value;
                self.push_neighbours(index, value, last);
                modified = true;
            }
        }
        if let Some(value) = to {
            if index + 1 < last && !is_close(self.boundaries[index + 1], value) && value > min {
                self.boundaries[index + 1] = value;
                self.push_neighbours(index + 1, value, last);
                modified = true;
            }
        }

        if modified {
            self.bump();
        }
        Ok(modified)
    }

    /// Slide interior boundaries around `moved` so the list stays monotonic.
    fn push_neighbours(&mut self, moved: usize, value: f64, last: usize) {
        for b in (1..moved).rev() {
            if self.boundaries[b] > value {
                self.boundaries[b] = value;
            } else {
                break;
            }
        }
        for b in moved + 1..last {
            if self.boundaries[b] < value {
                self.boundaries[b] = value;
            } else {
                break;
            }
        }
    }

    pub fn data(&self, index: usize) -> Result<&SegmentData, SegmentError> {
        self.check_index(index)?;
        Ok(&self.data[index])
    }

    pub fn data_value(&self, index: usize, key: &str) -> Result<Option<ParamValue>, SegmentError> {
        Ok(self.data(index)?.get(key).copied())
    }

    /// Merge `update` into the data of segment `index`.
    pub fn update_data(&mut self, index: usize, update: SegmentData) -> Result<bool, SegmentError> {
        let mut merged = self.data(index)?.clone();
        merged.extend(update);
        self.set_data(index, merged)
    }

    /// Replace the data of segment `index`; bumps the revision only when it
    /// differs from the current data.
    pub fn set_data(&mut self, index: usize, data: SegmentData) -> Result<bool, SegmentError> {
        self.check_index(index)?;
        if self.data[index] == data {
            return Ok(false);
        }
        self.data[index] = data;
        self.bump();
        Ok(true)
    }
}
