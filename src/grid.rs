//! Regular time grid anchored on the heart-rate signal.

use thiserror::Error;

use crate::config::ConfigError;
use crate::series::Series;

/// Periodic variable whose observed range defines the grid extent.
pub const ANCHOR_VARIABLE: &str = "heartrate";

/// Upper bound on grid points for one stay.
pub const MAX_GRID_POINTS: usize = 10_000_000;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("stay {patient_id} has no valid heartrate observations to anchor a grid")]
    EmptyAnchor { patient_id: i64 },
    #[error(
        "stay {patient_id} anchor range [{min_offset}, {max_offset}] at step {step} exceeds the grid point limit"
    )]
    RangeTooLarge {
        patient_id: i64,
        min_offset: i64,
        max_offset: i64,
        step: i64,
    },
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Evenly spaced timestamps `start, start + step, ...` over the closed anchor range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeGrid {
    start: i64,
    step: i64,
    len: usize,
}

impl TimeGrid {
    /// Builds the grid over `[min, max]` of the anchor's offsets.
    ///
    /// `step` must be positive; callers validate it through `GridConfig`.
    /// Ranges wider than [`MAX_GRID_POINTS`] points are rejected, so every
    /// timestamp of the returned grid fits in an `i64`.
    pub fn from_anchor(anchor: &Series, step: i64, patient_id: i64) -> Result<Self, GridError> {
        if step <= 0 {
            return Err(ConfigError::InvalidStep(step).into());
        }
        let (min_ts, max_ts) = anchor
            .offset_range()
            .ok_or(GridError::EmptyAnchor { patient_id })?;
        let too_large = GridError::RangeTooLarge {
            patient_id,
            min_offset: min_ts,
            max_offset: max_ts,
            step,
        };
        let len = max_ts
            .checked_sub(min_ts)
            .and_then(|span| usize::try_from(span / step).ok())
            .map(|intervals| intervals.saturating_add(1))
            .filter(|&len| len <= MAX_GRID_POINTS)
            .ok_or(too_large)?;
        Ok(Self {
            start: min_ts,
            step,
            len,
        })
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    /// Last grid timestamp, which may sit below the anchor maximum.
    pub fn end(&self) -> i64 {
        self.start + (self.len as i64 - 1) * self.step
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn timestamps(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.len).map(move |idx| self.start + idx as i64 * self.step)
    }

    pub fn contains_offset(&self, offset: i64) -> bool {
        offset >= self.start && offset <= self.end()
    }

    /// Index of an offset lying exactly on a grid point.
    pub fn index_of(&self, offset: i64) -> Option<usize> {
        if !self.contains_offset(offset) || (offset - self.start) % self.step != 0 {
            return None;
        }
        Some(((offset - self.start) / self.step) as usize)
    }
}
