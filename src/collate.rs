//! As-recorded collation of one stay at one-unit resolution.

use tracing::info;

use crate::config::{VariableGroup, VariableSelection};
use crate::grid::{GridError, TimeGrid, ANCHOR_VARIABLE};
use crate::impute::place_exact;
use crate::inputs::StayTables;
use crate::table::{SparseColumn, SparseTable};

/// Grid resolution of the async mode, in offset units.
pub const ASYNC_RESOLUTION: i64 = 1;

/// Places raw values at the exact offsets they were recorded at, with no
/// filling, and keeps only offsets where at least one variable was observed.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsyncCollator;

impl AsyncCollator {
    pub fn collate(
        &self,
        stay: &StayTables,
        selection: &VariableSelection,
    ) -> Result<SparseTable, GridError> {
        selection.validate()?;

        let anchor = stay.series(VariableGroup::Periodic, ANCHOR_VARIABLE);
        let grid = TimeGrid::from_anchor(&anchor, ASYNC_RESOLUTION, stay.patient_id)?;

        let mut populated = vec![false; grid.len()];
        let mut columns: Vec<SparseColumn> = selection
            .iter()
            .map(|(group, name)| {
                let values = place_exact(&stay.series(group, name), &grid);
                for (flag, value) in populated.iter_mut().zip(&values) {
                    *flag |= value.is_some();
                }
                SparseColumn {
                    name: group.column_name(name),
                    values,
                }
            })
            .collect();

        let timestamps: Vec<i64> = grid
            .timestamps()
            .zip(&populated)
            .filter_map(|(ts, keep)| keep.then_some(ts))
            .collect();
        for column in &mut columns {
            column.values = column
                .values
                .iter()
                .zip(&populated)
                .filter_map(|(value, keep)| keep.then_some(*value))
                .collect();
        }

        info!(
            component = "collate",
            event = "timegrid.collate.finish",
            patient_id = stay.patient_id,
            scanned_rows = grid.len(),
            kept_rows = timestamps.len(),
            columns = columns.len()
        );

        Ok(SparseTable {
            patient_id: stay.patient_id,
            timestamps,
            columns,
        })
    }
}
