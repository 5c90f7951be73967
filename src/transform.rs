//! Dense-mode gridding of one stay.

use tracing::{debug, info};

use crate::config::{GridConfig, VariableGroup, VariableSelection};
use crate::grid::{GridError, TimeGrid, ANCHOR_VARIABLE};
use crate::impute::impute;
use crate::inputs::StayTables;
use crate::quantiles::QuantileTable;
use crate::table::{DenseColumn, ImputedTable};

/// Turns one stay's raw tables into an imputed table on a regular grid.
///
/// Holds only a shared reference to the quantile table. Grid step, gap bounds
/// and the patient id flag arrive with every call, so the same transformer can
/// serve many stays at once.
#[derive(Debug, Clone, Copy)]
pub struct GridTransformer<'q> {
    quantiles: &'q QuantileTable,
}

struct ResolvedVariable<'a> {
    group: VariableGroup,
    name: &'a str,
    normal_value: f64,
}

impl<'q> GridTransformer<'q> {
    pub fn new(quantiles: &'q QuantileTable) -> Self {
        Self { quantiles }
    }

    pub fn quantiles(&self) -> &'q QuantileTable {
        self.quantiles
    }

    pub fn transform(
        &self,
        stay: &StayTables,
        config: &GridConfig,
        selection: &VariableSelection,
    ) -> Result<ImputedTable, GridError> {
        config.validate()?;
        selection.validate()?;
        let variables = self.resolve(selection)?;

        debug!(
            component = "transform",
            event = "timegrid.transform.start",
            patient_id = stay.patient_id,
            step = config.step,
            variables = variables.len()
        );

        let anchor = stay.series(VariableGroup::Periodic, ANCHOR_VARIABLE);
        let grid = TimeGrid::from_anchor(&anchor, config.step, stay.patient_id)?;

        let mut columns = Vec::with_capacity(variables.len());
        let mut absent = 0usize;
        for var in &variables {
            let series = stay.series(var.group, var.name);
            if series.is_empty() {
                absent += 1;
            }
            columns.push(DenseColumn {
                name: var.group.column_name(var.name),
                values: impute(
                    &series,
                    &grid,
                    config.max_gap.for_group(var.group),
                    var.normal_value,
                ),
            });
        }

        let table = ImputedTable {
            patient_id: stay.patient_id,
            emit_patient_id: config.emit_patient_id,
            timestamps: grid.timestamps().collect(),
            columns,
        };

        info!(
            component = "transform",
            event = "timegrid.transform.finish",
            patient_id = stay.patient_id,
            grid_start = grid.start(),
            grid_end = grid.end(),
            rows = table.row_count(),
            columns = table.columns.len(),
            absent_variables = absent
        );

        Ok(table)
    }

    /// Looks up every normal value up front so a bad quantile entry fails the
    /// call before any gridding happens.
    fn resolve<'a>(
        &self,
        selection: &'a VariableSelection,
    ) -> Result<Vec<ResolvedVariable<'a>>, GridError> {
        selection
            .iter()
            .map(|(group, name)| -> Result<ResolvedVariable<'a>, GridError> {
                Ok(ResolvedVariable {
                    group,
                    name,
                    normal_value: self.quantiles.normal_value(group, name)?,
                })
            })
            .collect()
    }
}
