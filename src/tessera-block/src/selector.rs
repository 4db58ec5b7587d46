//! Row and column selectors used to mask blocks.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use common_error::{value_err, TesseraError, TesseraResult};

/// A slice over positions with optional, possibly negative bounds.
///
/// Bounds follow the usual half-open slice rules: negative values count from
/// the end, out-of-range values are clamped, and a negative step walks
/// backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slice {
    start: Option<isize>,
    stop: Option<isize>,
    step: isize,
}

impl Slice {
    /// Create a slice, rejecting a zero step.
    pub fn new(start: Option<isize>, stop: Option<isize>, step: isize) -> TesseraResult<Self> {
        if step == 0 {
            return Err(TesseraError::value_error("slice step cannot be zero"));
        }
        Ok(Self { start, stop, step })
    }

    /// The slice covering every position.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            start: None,
            stop: None,
            step: 1,
        }
    }

    /// A contiguous forward slice over `range`.
    #[must_use]
    pub fn range(range: Range<usize>) -> Self {
        Self {
            start: Some(range.start as isize),
            stop: Some(range.end as isize),
            step: 1,
        }
    }

    /// Start bound.
    #[must_use]
    pub fn start(&self) -> Option<isize> {
        self.start
    }

    /// Stop bound.
    #[must_use]
    pub fn stop(&self) -> Option<isize> {
        self.stop
    }

    /// Step.
    #[must_use]
    pub fn step(&self) -> isize {
        self.step
    }

    /// Whether the slice selects a contiguous forward run.
    #[must_use]
    pub fn is_contiguous(&self) -> bool {
        self.step == 1
    }

    /// Resolve the bounds against a sequence of `len` elements.
    ///
    /// Returns `(start, stop, step)` with both bounds clamped.
    #[must_use]
    pub fn indices(&self, len: usize) -> (isize, isize, isize) {
        let len = len as isize;
        let step = if self.step == 0 { 1 } else { self.step };
        let (lower, upper) = if step < 0 { (-1, len - 1) } else { (0, len) };

        let clamp = |bound: isize| {
            if bound < 0 {
                (bound + len).max(lower)
            } else {
                bound.min(upper)
            }
        };

        let start = self
            .start
            .map_or(if step < 0 { upper } else { lower }, clamp);
        let stop = self
            .stop
            .map_or(if step < 0 { lower } else { upper }, clamp);
        (start, stop, step)
    }

    /// Number of positions this slice selects from a sequence of `len`.
    #[must_use]
    pub fn len_for(&self, len: usize) -> usize {
        let (start, stop, step) = self.indices(len);
        let count = if step > 0 {
            if start < stop {
                (stop - start - 1) / step + 1
            } else {
                0
            }
        } else if stop < start {
            (start - stop - 1) / (-step) + 1
        } else {
            0
        };
        count as usize
    }

    /// Positions this slice selects from a sequence of `len`, in order.
    #[must_use]
    pub fn positions(&self, len: usize) -> Vec<usize> {
        let (start, _, step) = self.indices(len);
        (0..self.len_for(len))
            .map(|i| (start + i as isize * step) as usize)
            .collect()
    }
}

impl Default for Slice {
    fn default() -> Self {
        Self::full()
    }
}

impl From<Range<usize>> for Slice {
    fn from(range: Range<usize>) -> Self {
        Self::range(range)
    }
}

/// Selection along one axis of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Selector {
    /// Every position.
    #[default]
    All,
    /// A slice over positions.
    Slice(Slice),
    /// Explicit positions, in output order.
    Positions(Vec<usize>),
}

impl Selector {
    /// Whether the selector keeps the axis untouched.
    #[must_use]
    pub fn is_all(&self) -> bool {
        match self {
            Self::All => true,
            Self::Slice(slice) => *slice == Slice::full(),
            Self::Positions(_) => false,
        }
    }

    /// Number of positions selected from an axis of `len`.
    #[must_use]
    pub fn len_for(&self, len: usize) -> usize {
        match self {
            Self::All => len,
            Self::Slice(slice) => slice.len_for(len),
            Self::Positions(positions) => positions.len(),
        }
    }

    /// Number of positions selected from an axis of `len`, rejecting
    /// explicit positions that fall outside it.
    pub fn checked_len(&self, len: usize) -> TesseraResult<usize> {
        if let Self::Positions(positions) = self {
            if let Some(bad) = positions.iter().find(|&&p| p >= len) {
                value_err!("position {bad} out of bounds for axis of length {len}");
            }
        }
        Ok(self.len_for(len))
    }

    /// Positions selected from an axis of `len`.
    pub fn positions(&self, len: usize) -> TesseraResult<Vec<usize>> {
        match self {
            Self::All => Ok((0..len).collect()),
            Self::Slice(slice) => Ok(slice.positions(len)),
            Self::Positions(positions) => {
                self.checked_len(len)?;
                Ok(positions.clone())
            }
        }
    }
}

impl From<Slice> for Selector {
    fn from(slice: Slice) -> Self {
        Self::Slice(slice)
    }
}

impl From<Range<usize>> for Selector {
    fn from(range: Range<usize>) -> Self {
        Self::Slice(Slice::range(range))
    }
}

impl From<Vec<usize>> for Selector {
    fn from(positions: Vec<usize>) -> Self {
        Self::Positions(positions)
    }
}
