//! Read-only population percentile lookup.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{ConfigError, VariableGroup};

pub const PERCENTILE_COUNT: usize = 99;
pub const MEDIAN_INDEX: usize = 49;

/// Percentiles 1..=99 of one variable's population distribution.
///
/// Entries may be null (or a bare `NaN`/`Infinity` token in the file) when the
/// population was empty; only the median is checked, and only when a variable
/// actually asks for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuantileVector(Vec<Option<f64>>);

impl QuantileVector {
    pub fn new(values: Vec<Option<f64>>) -> Self {
        Self(values)
    }

    pub fn percentile(&self, p: usize) -> Option<f64> {
        if p == 0 {
            return None;
        }
        self.0.get(p - 1).copied().flatten()
    }

    fn median(&self, key: &str) -> Result<f64, ConfigError> {
        if self.0.len() != PERCENTILE_COUNT {
            return Err(ConfigError::MalformedQuantile {
                key: key.to_string(),
                reason: format!(
                    "expected {PERCENTILE_COUNT} percentiles, found {}",
                    self.0.len()
                ),
            });
        }
        match self.0[MEDIAN_INDEX] {
            Some(median) if median.is_finite() => Ok(median),
            other => Err(ConfigError::MalformedQuantile {
                key: key.to_string(),
                reason: format!("median is {other:?}"),
            }),
        }
    }
}

/// Mapping from `"<group>_<variable>"` to its percentile vector.
///
/// Loaded once and shared by reference across stays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuantileTable {
    entries: HashMap<String, QuantileVector>,
}

impl QuantileTable {
    pub fn from_entries(entries: impl IntoIterator<Item = (String, QuantileVector)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Parses the percentile file. Bare `NaN`, `Infinity` and `-Infinity`
    /// tokens are read as missing entries.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(&non_finite_tokens_to_null(raw))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_json_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        info!(
            component = "quantiles",
            event = "quantiles.loaded",
            path = %path.display(),
            entries = table.len()
        );

        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&QuantileVector> {
        self.entries.get(key)
    }

    /// Normal value of a variable: the median of its population.
    pub fn normal_value(&self, group: VariableGroup, variable: &str) -> Result<f64, ConfigError> {
        let key = group.quantile_key(variable);
        self.entries
            .get(&key)
            .ok_or_else(|| ConfigError::MissingQuantile { key: key.clone() })?
            .median(&key)
    }
}

const NON_FINITE_TOKENS: [&str; 3] = ["-Infinity", "Infinity", "NaN"];

/// Replaces non-finite number tokens outside string literals with `null`.
fn non_finite_tokens_to_null(raw: &str) -> Cow<'_, str> {
    if !NON_FINITE_TOKENS.iter().any(|token| raw.contains(token)) {
        return Cow::Borrowed(raw);
    }

    let bytes = raw.as_bytes();
    let mut out = String::with_capacity(raw.len());
    let mut copied = 0;
    let mut idx = 0;
    let mut in_string = false;
    let mut escaped = false;

    while idx < bytes.len() {
        let byte = bytes[idx];
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            idx += 1;
            continue;
        }
        if byte == b'"' {
            in_string = true;
            idx += 1;
            continue;
        }
        match NON_FINITE_TOKENS
            .iter()
            .find(|token| bytes[idx..].starts_with(token.as_bytes()))
        {
            Some(token) => {
                out.push_str(&raw[copied..idx]);
                out.push_str("null");
                idx += token.len();
                copied = idx;
            }
            None => idx += 1,
        }
    }
    out.push_str(&raw[copied..]);

    Cow::Owned(out)
}
