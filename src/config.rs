//! Run configuration (`Params`): the external surface the pipeline
//! consumes. One JSON document per run, immutable once loaded.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read params file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse params file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("required input raster '{0}' is not configured")]
    MissingInput(String),
}

/// Parameters of one pipeline run.
///
/// `inputs` is a flat mapping from input name to raster path, one entry per
/// raw raster the budget model reads (~40 entries, listed in
/// [`crate::model`]). Absence of a required entry surfaces as a fatal
/// [`ConfigError::MissingInput`] when the engine first asks for it.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    pub year: i32,
    pub output_dir: PathBuf,
    /// Mask raster defining the active spatial domain; omit to run unmasked.
    #[serde(default)]
    pub mask: Option<PathBuf>,
    /// Write output artifacts gzip-compressed (`.asc.gz`).
    #[serde(default)]
    pub compress: bool,
    pub inputs: BTreeMap<String, PathBuf>,
}

impl Params {
    pub fn from_file(path: &Path) -> Result<Params, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Path of a named input raster.
    pub fn input(&self, name: &str) -> Result<&Path, ConfigError> {
        self.inputs
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| ConfigError::MissingInput(name.to_string()))
    }
}
