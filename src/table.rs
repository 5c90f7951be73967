//! Gridded output tables and their CSV writers.

use std::io::Write;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::inputs::PATIENT_ID_COLUMN;

pub const TS_COLUMN: &str = "ts";

/// Ordered column names plus a fingerprint over them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<String>,
    pub fingerprint: String,
}

impl TableSchema {
    pub fn new(columns: Vec<String>) -> Self {
        let fingerprint = schema_fingerprint(&columns);
        Self {
            columns,
            fingerprint,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseColumn {
    pub name: String,
    pub values: Vec<f64>,
}

/// Dense-mode output for one stay; every cell is populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputedTable {
    pub patient_id: i64,
    pub emit_patient_id: bool,
    pub timestamps: Vec<i64>,
    pub columns: Vec<DenseColumn>,
}

impl ImputedTable {
    pub fn row_count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|col| col.name == name)
            .map(|col| col.values.as_slice())
    }

    /// Constant patient id column, present only when enabled.
    pub fn patient_id_column(&self) -> Option<Vec<i64>> {
        self.emit_patient_id
            .then(|| vec![self.patient_id; self.row_count()])
    }

    pub fn schema(&self) -> TableSchema {
        let mut columns = vec![TS_COLUMN.to_string()];
        if self.emit_patient_id {
            columns.push(PATIENT_ID_COLUMN.to_string());
        }
        columns.extend(self.columns.iter().map(|col| col.name.clone()));
        TableSchema::new(columns)
    }

    fn csv_row(&self, idx: usize) -> Vec<String> {
        let mut row = vec![self.timestamps[idx].to_string()];
        if self.emit_patient_id {
            row.push(self.patient_id.to_string());
        }
        row.extend(self.columns.iter().map(|col| col.values[idx].to_string()));
        row
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// As-recorded output for one stay; unset cells stay `None` and every row
/// carries at least one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseTable {
    pub patient_id: i64,
    pub timestamps: Vec<i64>,
    pub columns: Vec<SparseColumn>,
}

impl SparseTable {
    pub fn row_count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|col| col.name == name)
            .map(|col| col.values.as_slice())
    }

    pub fn schema(&self) -> TableSchema {
        let mut columns = vec![TS_COLUMN.to_string()];
        columns.extend(self.columns.iter().map(|col| col.name.clone()));
        TableSchema::new(columns)
    }

    fn csv_row(&self, idx: usize) -> Vec<String> {
        let mut row = vec![self.patient_id.to_string(), self.timestamps[idx].to_string()];
        row.extend(self.columns.iter().map(|col| {
            col.values[idx]
                .map(|value| value.to_string())
                .unwrap_or_default()
        }));
        row
    }
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("schema mismatch for stay {patient_id}: expected {expected}, got {actual}")]
    SchemaMismatch {
        patient_id: i64,
        expected: String,
        actual: String,
    },
}

/// Writes dense tables of one batch into a single CSV. All tables must share
/// one schema. Nothing is written for an empty batch.
pub fn write_dense_csv<W: Write>(tables: &[ImputedTable], writer: W) -> Result<u64, OutputError> {
    let Some(first) = tables.first() else {
        return Ok(0);
    };
    let schema = first.schema();
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(&schema.columns)?;

    let mut rows = 0u64;
    for table in tables {
        ensure_schema(&schema, &table.schema(), table.patient_id)?;
        for idx in 0..table.row_count() {
            out.write_record(table.csv_row(idx))?;
            rows += 1;
        }
    }
    out.flush()?;

    info!(
        component = "table",
        event = "table.dense.written",
        stays = tables.len(),
        rows,
        fingerprint = %schema.fingerprint
    );

    Ok(rows)
}

/// Writes sparse tables of one batch into a single CSV. The stay id leads each
/// row so stays stay distinguishable in the shared file.
pub fn write_sparse_csv<W: Write>(tables: &[SparseTable], writer: W) -> Result<u64, OutputError> {
    let Some(first) = tables.first() else {
        return Ok(0);
    };
    let schema = first.schema();
    let mut out = csv::Writer::from_writer(writer);
    let mut header = vec![PATIENT_ID_COLUMN.to_string()];
    header.extend(schema.columns.iter().cloned());
    out.write_record(&header)?;

    let mut rows = 0u64;
    for table in tables {
        ensure_schema(&schema, &table.schema(), table.patient_id)?;
        for idx in 0..table.row_count() {
            out.write_record(table.csv_row(idx))?;
            rows += 1;
        }
    }
    out.flush()?;

    info!(
        component = "table",
        event = "table.sparse.written",
        stays = tables.len(),
        rows,
        fingerprint = %schema.fingerprint
    );

    Ok(rows)
}

fn ensure_schema(
    expected: &TableSchema,
    actual: &TableSchema,
    patient_id: i64,
) -> Result<(), OutputError> {
    if expected.fingerprint != actual.fingerprint {
        return Err(OutputError::SchemaMismatch {
            patient_id,
            expected: expected.fingerprint.clone(),
            actual: actual.fingerprint.clone(),
        });
    }
    Ok(())
}

fn schema_fingerprint(columns: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update("columns:");
    for column in columns {
        hasher.update(column.as_bytes());
        hasher.update(";");
    }
    hex::encode(hasher.finalize())
}
