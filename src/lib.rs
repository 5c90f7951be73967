//! Time-gridding of per-stay clinical observations.
//!
//! Current implemented scope:
//! - regular time grid anchored on heart rate
//! - bounded-gap forward fill with population-median fallback (dense mode)
//! - as-recorded minute-resolution collation with empty-row pruning (async mode)
//! - CSV inputs/outputs, quantile lookup, and a per-batch runner

mod batch;
mod collate;
mod config;
mod grid;
mod impute;
mod inputs;
mod observability;
mod quantiles;
mod series;
mod table;
mod transform;

pub use batch::{run_batch, BatchOutput, BatchReport, OutputMode};
pub use collate::{AsyncCollator, ASYNC_RESOLUTION};
pub use config::{
    load_grid_config, read_lab_variable_list, read_variable_list, ConfigError, GapBounds,
    GridConfig, VariableGroup, VariableSelection, DEFAULT_MAX_GAP_LAB, DEFAULT_MAX_GAP_VITALS,
    DEFAULT_STEP,
};
pub use grid::{GridError, TimeGrid, ANCHOR_VARIABLE, MAX_GRID_POINTS};
pub use impute::{impute, place_exact};
pub use inputs::{
    assemble_stays, load_lab_csv, load_vital_csv, InputError, LabRecord, LabTable, StayTables,
    VitalRow, VitalTable, PATIENT_ID_COLUMN,
};
pub use observability::{
    init_logging, log_app_start, log_inputs_selected, log_output_written, logging_config_from_env,
    LogFormat, LoggingConfig, LoggingInitError,
};
pub use quantiles::{QuantileTable, QuantileVector, MEDIAN_INDEX, PERCENTILE_COUNT};
pub use series::{Observation, Series};
pub use table::{
    write_dense_csv, write_sparse_csv, DenseColumn, ImputedTable, OutputError, SparseColumn,
    SparseTable, TableSchema, TS_COLUMN,
};
pub use transform::GridTransformer;
