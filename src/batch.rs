//! Runs the gridding modes over a batch of stays.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::collate::AsyncCollator;
use crate::config::{GridConfig, VariableSelection};
use crate::grid::GridError;
use crate::inputs::StayTables;
use crate::table::{ImputedTable, SparseTable};
use crate::transform::GridTransformer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    Dense,
    Async,
    Both,
}

impl OutputMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dense" => Some(Self::Dense),
            "async" => Some(Self::Async),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    fn dense(self) -> bool {
        matches!(self, Self::Dense | Self::Both)
    }

    fn sparse(self) -> bool {
        matches!(self, Self::Async | Self::Both)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub stays_total: u64,
    pub stays_gridded: u64,
    pub stays_skipped: u64,
    pub skipped_patient_ids: Vec<i64>,
    pub dense_rows: u64,
    pub sparse_rows: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutput {
    pub dense: Vec<ImputedTable>,
    pub sparse: Vec<SparseTable>,
    pub report: BatchReport,
}

/// Grids every stay in order. A stay without anchor observations, or whose
/// anchor range is too wide to grid, is skipped and reported; configuration
/// errors abort the whole batch.
pub fn run_batch(
    stays: &[StayTables],
    transformer: &GridTransformer<'_>,
    config: &GridConfig,
    selection: &VariableSelection,
    mode: OutputMode,
) -> Result<BatchOutput, GridError> {
    info!(
        component = "batch",
        event = "timegrid.batch.start",
        stays = stays.len(),
        mode = ?mode,
        step = config.step
    );

    let mut out = BatchOutput::default();
    for (idx, stay) in stays.iter().enumerate() {
        out.report.stays_total += 1;

        match grid_stay(stay, transformer, config, selection, mode) {
            Ok((dense, sparse)) => {
                if let Some(table) = dense {
                    out.report.dense_rows += table.row_count() as u64;
                    out.dense.push(table);
                }
                if let Some(table) = sparse {
                    out.report.sparse_rows += table.row_count() as u64;
                    out.sparse.push(table);
                }
                out.report.stays_gridded += 1;
            }
            Err(err) => {
                let Some((patient_id, reason)) = skip_reason(&err) else {
                    return Err(err);
                };
                warn!(
                    component = "batch",
                    event = "timegrid.batch.stay_skipped",
                    patient_id,
                    reason
                );
                out.report.stays_skipped += 1;
                out.report.skipped_patient_ids.push(patient_id);
            }
        }

        if (idx + 1) % 10 == 0 {
            info!(
                component = "batch",
                event = "timegrid.batch.progress",
                done = idx + 1,
                total = stays.len()
            );
        }
    }

    info!(
        component = "batch",
        event = "timegrid.batch.finish",
        stays_total = out.report.stays_total,
        stays_gridded = out.report.stays_gridded,
        stays_skipped = out.report.stays_skipped,
        dense_rows = out.report.dense_rows,
        sparse_rows = out.report.sparse_rows
    );

    Ok(out)
}

/// Per-stay data problems that skip the stay instead of failing the batch.
fn skip_reason(err: &GridError) -> Option<(i64, &'static str)> {
    match err {
        GridError::EmptyAnchor { patient_id } => Some((*patient_id, "empty_anchor")),
        GridError::RangeTooLarge { patient_id, .. } => Some((*patient_id, "range_too_large")),
        GridError::Configuration(_) => None,
    }
}

fn grid_stay(
    stay: &StayTables,
    transformer: &GridTransformer<'_>,
    config: &GridConfig,
    selection: &VariableSelection,
    mode: OutputMode,
) -> Result<(Option<ImputedTable>, Option<SparseTable>), GridError> {
    let dense = if mode.dense() {
        Some(transformer.transform(stay, config, selection)?)
    } else {
        None
    };
    let sparse = if mode.sparse() {
        Some(AsyncCollator.collate(stay, selection)?)
    } else {
        None
    };
    Ok((dense, sparse))
}
