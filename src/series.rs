//! Per-variable observation series.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub offset: i64,
    pub value: f64,
}

/// Observations of one variable for one stay, ordered by offset.
///
/// The sort is stable, so observations sharing an offset keep the order in
/// which they were recorded. Missing and non-finite values never enter a series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    observations: Vec<Observation>,
}

impl Series {
    pub fn from_observations(observations: impl IntoIterator<Item = Observation>) -> Self {
        let mut observations: Vec<Observation> = observations
            .into_iter()
            .filter(|obs| obs.value.is_finite())
            .collect();
        observations.sort_by_key(|obs| obs.offset);
        Self { observations }
    }

    /// Builds a series from raw `(offset, value)` rows, dropping absent values.
    pub fn from_raw(rows: impl IntoIterator<Item = (i64, Option<f64>)>) -> Self {
        Self::from_observations(
            rows.into_iter()
                .filter_map(|(offset, value)| value.map(|value| Observation { offset, value })),
        )
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn offset_range(&self) -> Option<(i64, i64)> {
        // Sorted, so the ends are the extremes.
        let first = self.observations.first()?;
        let last = self.observations.last()?;
        Some((first.offset, last.offset))
    }
}
