//! Per-stay source tables and their CSV loaders.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use csv::StringRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::VariableGroup;
use crate::series::Series;

pub const PATIENT_ID_COLUMN: &str = "patientunitstayid";
pub const VITAL_OFFSET_COLUMN: &str = "observationoffset";
pub const LAB_NAME_COLUMN: &str = "labname";
pub const LAB_OFFSET_COLUMN: &str = "labresultoffset";
pub const LAB_RESULT_COLUMN: &str = "labresult";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabRecord {
    pub lab_name: String,
    pub offset: i64,
    pub result: Option<f64>,
}

/// Long-format lab results of one stay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabTable {
    pub records: Vec<LabRecord>,
}

impl LabTable {
    pub fn series(&self, lab_name: &str) -> Series {
        Series::from_raw(
            self.records
                .iter()
                .filter(|record| record.lab_name == lab_name)
                .map(|record| (record.offset, record.result)),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalRow {
    pub offset: i64,
    pub values: Vec<Option<f64>>,
}

/// Wide-format vital signs of one stay: one column per variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalTable {
    pub variables: Vec<String>,
    pub rows: Vec<VitalRow>,
}

impl VitalTable {
    pub fn new(variables: Vec<String>) -> Self {
        Self {
            variables,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, offset: i64, values: Vec<Option<f64>>) {
        self.rows.push(VitalRow { offset, values });
    }

    /// Series of one column; a column the table does not carry is empty.
    pub fn series(&self, variable: &str) -> Series {
        let Some(col) = self.variables.iter().position(|name| name == variable) else {
            return Series::default();
        };
        Series::from_raw(
            self.rows
                .iter()
                .map(|row| (row.offset, row.values.get(col).copied().flatten())),
        )
    }
}

/// Everything recorded for one patient stay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StayTables {
    pub patient_id: i64,
    pub labs: LabTable,
    pub periodic: VitalTable,
    pub aperiodic: VitalTable,
}

impl StayTables {
    pub fn series(&self, group: VariableGroup, variable: &str) -> Series {
        match group {
            VariableGroup::Periodic => self.periodic.series(variable),
            VariableGroup::Aperiodic => self.aperiodic.series(variable),
            VariableGroup::Lab => self.labs.series(variable),
        }
    }
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("CSV error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("{path} has no column '{column}'")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("failed to parse field {field} value '{value}' in {path}")]
    ParseField {
        path: PathBuf,
        field: String,
        value: String,
    },
}

/// Loads a long-format lab CSV, grouped by stay.
pub fn load_lab_csv(path: &Path) -> Result<BTreeMap<i64, LabTable>, InputError> {
    let mut reader = open_reader(path)?;
    let headers = read_headers(&mut reader, path)?;
    let pid_idx = column_index(&headers, path, PATIENT_ID_COLUMN)?;
    let name_idx = column_index(&headers, path, LAB_NAME_COLUMN)?;
    let offset_idx = column_index(&headers, path, LAB_OFFSET_COLUMN)?;
    let result_idx = column_index(&headers, path, LAB_RESULT_COLUMN)?;

    let mut out: BTreeMap<i64, LabTable> = BTreeMap::new();
    let mut rows = 0u64;
    for record in reader.records() {
        let record = record.map_err(|source| csv_error(path, source))?;
        let patient_id = parse_patient_id(&record, pid_idx, path)?;
        let lab_name = record.get(name_idx).unwrap_or_default().trim().to_string();
        out.entry(patient_id).or_default().records.push(LabRecord {
            lab_name,
            offset: parse_offset(&record, offset_idx, LAB_OFFSET_COLUMN, path)?,
            result: parse_optional_f64(&record, result_idx, LAB_RESULT_COLUMN, path)?,
        });
        rows += 1;
    }

    info!(
        component = "inputs",
        event = "inputs.labs.loaded",
        path = %path.display(),
        rows,
        stays = out.len()
    );

    Ok(out)
}

/// Loads a wide-format vital sign CSV, grouped by stay. Every column other
/// than the stay id and the offset is a variable.
pub fn load_vital_csv(path: &Path) -> Result<BTreeMap<i64, VitalTable>, InputError> {
    let mut reader = open_reader(path)?;
    let headers = read_headers(&mut reader, path)?;
    let pid_idx = column_index(&headers, path, PATIENT_ID_COLUMN)?;
    let offset_idx = column_index(&headers, path, VITAL_OFFSET_COLUMN)?;
    let variable_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != pid_idx && *idx != offset_idx)
        .map(|(idx, name)| (idx, name.trim().to_string()))
        .collect();
    let variables: Vec<String> = variable_cols.iter().map(|(_, name)| name.clone()).collect();

    let mut out: BTreeMap<i64, VitalTable> = BTreeMap::new();
    let mut rows = 0u64;
    for record in reader.records() {
        let record = record.map_err(|source| csv_error(path, source))?;
        let patient_id = parse_patient_id(&record, pid_idx, path)?;
        let offset = parse_offset(&record, offset_idx, VITAL_OFFSET_COLUMN, path)?;
        let values = variable_cols
            .iter()
            .map(|(idx, name)| parse_optional_f64(&record, *idx, name, path))
            .collect::<Result<Vec<_>, _>>()?;
        out.entry(patient_id)
            .or_insert_with(|| VitalTable::new(variables.clone()))
            .push_row(offset, values);
        rows += 1;
    }

    info!(
        component = "inputs",
        event = "inputs.vitals.loaded",
        path = %path.display(),
        rows,
        stays = out.len(),
        variables = variables.len()
    );

    Ok(out)
}

/// Joins the three per-table maps into stays ordered by patient id. A stay
/// missing from a table gets an empty table for it.
pub fn assemble_stays(
    mut labs: BTreeMap<i64, LabTable>,
    mut periodic: BTreeMap<i64, VitalTable>,
    mut aperiodic: BTreeMap<i64, VitalTable>,
) -> Vec<StayTables> {
    let patient_ids: BTreeSet<i64> = labs
        .keys()
        .chain(periodic.keys())
        .chain(aperiodic.keys())
        .copied()
        .collect();

    patient_ids
        .into_iter()
        .map(|patient_id| StayTables {
            patient_id,
            labs: labs.remove(&patient_id).unwrap_or_default(),
            periodic: periodic.remove(&patient_id).unwrap_or_default(),
            aperiodic: aperiodic.remove(&patient_id).unwrap_or_default(),
        })
        .collect()
}

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, InputError> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|source| csv_error(path, source))
}

fn read_headers(
    reader: &mut csv::Reader<std::fs::File>,
    path: &Path,
) -> Result<StringRecord, InputError> {
    reader
        .headers()
        .cloned()
        .map_err(|source| csv_error(path, source))
}

fn column_index(
    headers: &StringRecord,
    path: &Path,
    column: &'static str,
) -> Result<usize, InputError> {
    headers
        .iter()
        .position(|name| name.trim().eq_ignore_ascii_case(column))
        .ok_or_else(|| InputError::MissingColumn {
            path: path.to_path_buf(),
            column,
        })
}

fn csv_error(path: &Path, source: csv::Error) -> InputError {
    InputError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

fn parse_error(path: &Path, field: &str, value: &str) -> InputError {
    InputError::ParseField {
        path: path.to_path_buf(),
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// Offsets are integral; exports sometimes write them as `12.0`.
/// Stay ids are plain integers; `12.0` is not an id.
fn parse_patient_id(record: &StringRecord, idx: usize, path: &Path) -> Result<i64, InputError> {
    let raw = record.get(idx).unwrap_or_default().trim();
    raw.parse::<i64>()
        .map_err(|_| parse_error(path, PATIENT_ID_COLUMN, raw))
}

fn parse_offset(
    record: &StringRecord,
    idx: usize,
    field: &str,
    path: &Path,
) -> Result<i64, InputError> {
    let raw = record.get(idx).unwrap_or_default().trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Ok(value);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 => Ok(value as i64),
        _ => Err(parse_error(path, field, raw)),
    }
}

fn parse_optional_f64(
    record: &StringRecord,
    idx: usize,
    field: &str,
    path: &Path,
) -> Result<Option<f64>, InputError> {
    let raw = record.get(idx).unwrap_or_default().trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| parse_error(path, field, raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vital_series_reads_one_column_and_skips_blanks() {
        let mut table = VitalTable::new(vec!["heartrate".to_string(), "sao2".to_string()]);
        table.push_row(10, vec![Some(80.0), None]);
        table.push_row(5, vec![None, Some(97.0)]);
        table.push_row(0, vec![Some(82.0), Some(96.0)]);

        let hr = table.series("heartrate");
        assert_eq!(hr.offset_range(), Some((0, 10)));
        assert_eq!(hr.len(), 2);
        assert_eq!(table.series("sao2").len(), 2);
        assert!(table.series("cvp").is_empty());
    }

    #[test]
    fn lab_series_filters_by_name() {
        let labs = LabTable {
            records: vec![
                LabRecord {
                    lab_name: "sodium".to_string(),
                    offset: 30,
                    result: Some(139.0),
                },
                LabRecord {
                    lab_name: "potassium".to_string(),
                    offset: 30,
                    result: Some(4.1),
                },
                LabRecord {
                    lab_name: "sodium".to_string(),
                    offset: 90,
                    result: None,
                },
            ],
        };

        let sodium = labs.series("sodium");
        assert_eq!(sodium.len(), 1);
        assert_eq!(sodium.observations()[0].value, 139.0);
        assert!(labs.series("lactate").is_empty());
    }

    #[test]
    fn offsets_accept_integral_floats_only() {
        let record = StringRecord::from(vec!["12", "12.0", "12.5", "x"]);
        let path = Path::new("mem.csv");
        assert_eq!(parse_offset(&record, 0, "o", path).unwrap(), 12);
        assert_eq!(parse_offset(&record, 1, "o", path).unwrap(), 12);
        assert!(matches!(
            parse_offset(&record, 2, "o", path),
            Err(InputError::ParseField { .. })
        ));
        assert!(parse_offset(&record, 3, "o", path).is_err());
    }

    #[test]
    fn patient_ids_must_be_plain_integers() {
        let record = StringRecord::from(vec![" 141765 ", "12.0", ""]);
        let path = Path::new("mem.csv");
        assert_eq!(parse_patient_id(&record, 0, path).unwrap(), 141765);
        for idx in [1, 2] {
            assert!(matches!(
                parse_patient_id(&record, idx, path),
                Err(InputError::ParseField { ref field, .. }) if field == PATIENT_ID_COLUMN
            ));
        }
    }

    #[test]
    fn infinite_vital_values_never_reach_a_series() {
        let mut table = VitalTable::new(vec!["heartrate".to_string()]);
        let record = StringRecord::from(vec!["inf", "-inf", "81"]);
        let path = Path::new("mem.csv");
        for (offset, idx) in [(0, 0), (5, 1), (10, 2)] {
            let value = parse_optional_f64(&record, idx, "heartrate", path).unwrap();
            table.push_row(offset, vec![value]);
        }

        let hr = table.series("heartrate");
        assert_eq!(hr.len(), 1);
        assert_eq!(hr.offset_range(), Some((10, 10)));
    }

    #[test]
    fn assemble_fills_missing_tables_with_empty_ones() {
        let mut periodic = BTreeMap::new();
        periodic.insert(2, VitalTable::new(vec!["heartrate".to_string()]));
        let mut labs = BTreeMap::new();
        labs.insert(1, LabTable::default());

        let stays = assemble_stays(labs, periodic, BTreeMap::new());
        assert_eq!(stays.len(), 2);
        assert_eq!(stays[0].patient_id, 1);
        assert!(stays[0].periodic.variables.is_empty());
        assert_eq!(stays[1].patient_id, 2);
        assert!(stays[1].labs.records.is_empty());
    }
}
