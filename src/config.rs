//! Gridding configuration and variable selection.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_STEP: i64 = 60;
pub const DEFAULT_MAX_GAP_VITALS: i64 = 60;
pub const DEFAULT_MAX_GAP_LAB: i64 = 24 * 60;

/// The three source tables a variable can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableGroup {
    Periodic,
    Aperiodic,
    Lab,
}

impl VariableGroup {
    pub const ALL: [VariableGroup; 3] = [Self::Periodic, Self::Aperiodic, Self::Lab];

    /// Prefix of the quantile table key, e.g. `periodic_heartrate`.
    pub fn quantile_prefix(self) -> &'static str {
        match self {
            Self::Periodic => "periodic",
            Self::Aperiodic => "aperiodic",
            Self::Lab => "lab",
        }
    }

    /// Prefix of the output column, e.g. `vs_heartrate`.
    pub fn column_prefix(self) -> &'static str {
        match self {
            Self::Periodic => "vs",
            Self::Aperiodic => "avs",
            Self::Lab => "lab",
        }
    }

    pub fn quantile_key(self, variable: &str) -> String {
        format!("{}_{variable}", self.quantile_prefix())
    }

    pub fn column_name(self, variable: &str) -> String {
        format!("{}_{variable}", self.column_prefix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapBounds {
    pub periodic: i64,
    pub aperiodic: i64,
    pub lab: i64,
}

impl GapBounds {
    pub fn for_group(&self, group: VariableGroup) -> i64 {
        match group {
            VariableGroup::Periodic => self.periodic,
            VariableGroup::Aperiodic => self.aperiodic,
            VariableGroup::Lab => self.lab,
        }
    }
}

impl Default for GapBounds {
    fn default() -> Self {
        Self {
            periodic: DEFAULT_MAX_GAP_VITALS,
            aperiodic: DEFAULT_MAX_GAP_VITALS,
            lab: DEFAULT_MAX_GAP_LAB,
        }
    }
}

/// Dense-mode gridding parameters, in the offset unit of the input tables.
///
/// Passed by reference to every transform call; nothing in the crate mutates
/// it, so one value can serve any number of concurrent stays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub step: i64,
    pub max_gap: GapBounds,
    pub emit_patient_id: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            step: DEFAULT_STEP,
            max_gap: GapBounds::default(),
            emit_patient_id: true,
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step <= 0 {
            return Err(ConfigError::InvalidStep(self.step));
        }
        for group in VariableGroup::ALL {
            let bound = self.max_gap.for_group(group);
            if bound < 0 {
                return Err(ConfigError::InvalidGapBound { group, bound });
            }
        }
        Ok(())
    }
}

/// Which variables of each group end up as output columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSelection {
    pub periodic: Vec<String>,
    pub aperiodic: Vec<String>,
    pub lab: Vec<String>,
}

impl VariableSelection {
    pub fn group(&self, group: VariableGroup) -> &[String] {
        match group {
            VariableGroup::Periodic => &self.periodic,
            VariableGroup::Aperiodic => &self.aperiodic,
            VariableGroup::Lab => &self.lab,
        }
    }

    /// `(group, variable)` pairs in output column order.
    pub fn iter(&self) -> impl Iterator<Item = (VariableGroup, &str)> {
        VariableGroup::ALL.into_iter().flat_map(move |group| {
            self.group(group)
                .iter()
                .map(move |variable| (group, variable.as_str()))
        })
    }

    pub fn len(&self) -> usize {
        self.periodic.len() + self.aperiodic.len() + self.lab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.iter()
            .map(|(group, variable)| group.column_name(variable))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for group in VariableGroup::ALL {
            let mut seen = HashSet::new();
            for variable in self.group(group) {
                if variable.trim().is_empty() {
                    return Err(ConfigError::InvalidSelection(format!(
                        "empty {} variable name",
                        group.quantile_prefix()
                    )));
                }
                if !seen.insert(variable.as_str()) {
                    return Err(ConfigError::InvalidSelection(format!(
                        "duplicate {} variable '{variable}'",
                        group.quantile_prefix()
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("grid step must be > 0, got {0}")]
    InvalidStep(i64),
    #[error("max gap for {group:?} must be >= 0, got {bound}")]
    InvalidGapBound { group: VariableGroup, bound: i64 },
    #[error("invalid variable selection: {0}")]
    InvalidSelection(String),
    #[error("no quantile entry for '{key}'")]
    MissingQuantile { key: String },
    #[error("malformed quantile entry for '{key}': {reason}")]
    MalformedQuantile { key: String, reason: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("CSV error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
}

pub fn load_grid_config(path: &Path) -> Result<GridConfig, ConfigError> {
    let raw = read_to_string(path)?;
    let config: GridConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    debug!(
        component = "config",
        event = "config.grid.loaded",
        path = %path.display(),
        step = config.step,
        max_gap = ?config.max_gap,
        emit_patient_id = config.emit_patient_id
    );
    Ok(config)
}

/// Reads a plain variable list: one name per line, blank lines ignored.
pub fn read_variable_list(path: &Path) -> Result<Vec<String>, ConfigError> {
    let raw = read_to_string(path)?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Reads the tab-separated lab list; names sit in the first column after a
/// header row.
pub fn read_lab_variable_list(path: &Path) -> Result<Vec<String>, ConfigError> {
    let csv_err = |source| ConfigError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let mut out = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        if let Some(name) = record.get(0).map(str::trim).filter(|name| !name.is_empty()) {
            out.push(name.to_string());
        }
    }
    Ok(out)
}

fn read_to_string(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
