//! Input files of tdrdm.
//!
//! An input file is a YAML document with two sections: a `logbook` describing the calculation
//! that produced the sampled RDMs, and a list of `tasks` to be carried out on them, *e.g.*
//!
//! ```yaml
//! logbook:
//!   n_core: 2
//!   n_cas: 10
//!   nel_cas: 9
//!   orb_path: orbitals.npy
//!   sample_dir: [run-a, run-b]
//!   xyz: molecule.xyz
//! tasks:
//!   - !LocalCorrelation
//!     parameters:
//!       table: corr_id
//! ```

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{self, format_err, Context};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::auxiliary::molecule::Molecule;
use crate::interfaces::InputHandle;
use crate::io::format::{log_subtitle, log_title, tdrdm_output, TdRdmOutput};
use crate::io::{read_npy_array, read_tdrdm_yaml, write_npy_array};
use crate::timeseries::collect_time_series;

pub mod logbook;
pub mod task;

use logbook::{resolve_logbook, Logbook};
use task::{Task, TaskContext};

#[cfg(test)]
#[path = "input_tests.rs"]
mod input_tests;

// ==================
// Error definitions
// ==================

/// Error for invalid or inconsistent user configuration.
#[derive(Debug, Clone)]
pub struct ConfigurationError(pub String);

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Configuration error: {}", self.0)
    }
}

impl Error for ConfigurationError {}

// ==================
// Struct definitions
// ==================

/// A structure containing tdrdm input parameters which can be serialised into and deserialised
/// from a YAML input file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Input {
    /// The description of the calculation that produced the sampled RDMs.
    pub logbook: Logbook,

    /// The tasks to be carried out, in order.
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Input {
    /// Parses an input from a YAML string. Previous logbooks referenced by relative paths are
    /// looked up relative to the current directory.
    pub fn from_yaml_str(contents: &str) -> Result<Self, anyhow::Error> {
        let value: Value = serde_yaml::from_str(contents).map_err(|err| format_err!(err))?;
        Self::from_value(value, None)
    }

    /// Reads an input from a YAML file and resolves its previous logbooks.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let value: Value = read_tdrdm_yaml(path)
            .with_context(|| format!("Unable to read input file `{}`", path.display()))?;
        Self::from_value(value, Some(path))
    }

    fn from_value(mut value: Value, origin: Option<&Path>) -> Result<Self, anyhow::Error> {
        match value.get_mut("logbook") {
            Some(Value::Mapping(logbook)) => resolve_logbook(logbook, origin)?,
            Some(_) => {
                return Err(format_err!(ConfigurationError(
                    "the `logbook` section must be a mapping".to_string()
                )))
            }
            None => {
                return Err(format_err!(ConfigurationError(
                    "no `logbook` section found".to_string()
                )))
            }
        }
        serde_yaml::from_value(value)
            .map_err(|err| format_err!(ConfigurationError(err.to_string())))
    }

    /// Returns an input with a placeholder logbook and one task of each kind with default
    /// parameters.
    pub fn template() -> Self {
        Self {
            logbook: Logbook::default(),
            tasks: Task::templates(),
        }
    }

    /// Writes the grid points of every task that evaluates AOs, so that AO values can be
    /// tabulated on exactly these points. The points of task `#i` are written to
    /// `<prefix>-task<i>.npy` as a `(number of points, 3)` array in bohr.
    ///
    /// # Returns
    ///
    /// The files written, in task order.
    pub fn export_grid_points(&self, prefix: &Path) -> Result<Vec<PathBuf>, anyhow::Error> {
        let molecule = self
            .logbook
            .xyz
            .as_ref()
            .map(Molecule::from_xyz)
            .transpose()?;
        let mut written = vec![];
        for (i, task) in self.tasks.iter().enumerate() {
            let points = task
                .grid_points(molecule.as_ref())
                .with_context(|| format!("Unable to build the grid of task #{}", i + 1))?;
            if let Some(points) = points {
                let mut name = prefix.as_os_str().to_owned();
                name.push(format!("-task{}.npy", i + 1));
                let path = PathBuf::from(name);
                write_npy_array(&path, &points)?;
                tdrdm_output!(
                    "Grid points of task #{}: {} points written to `{}`",
                    i + 1,
                    points.nrows(),
                    path.display()
                );
                written.push(path);
            }
        }
        if written.is_empty() {
            tdrdm_output!("No task requires AO values on a grid.");
        }
        Ok(written)
    }

    /// Loads the data shared by all tasks.
    fn prepare_context(&self) -> Result<TaskContext, anyhow::Error> {
        let logbook = &self.logbook;
        let active_space = logbook.active_space()?;
        let sampling = logbook.sampling()?;
        let orbitals = read_npy_array(&logbook.orb_path).with_context(|| {
            format!("Unable to read orbitals from `{}`", logbook.orb_path.display())
        })?;
        let molecule = logbook.xyz.as_ref().map(Molecule::from_xyz).transpose()?;
        let series = if self.tasks.iter().any(Task::needs_series) {
            let series = collect_time_series(&logbook.sample_directories())?;
            tdrdm_output!(
                "Time points collected: {} in {} sample directories",
                series.len(),
                logbook.sample_directories().len()
            );
            tdrdm_output!("");
            Some(series)
        } else {
            None
        };
        Ok(TaskContext {
            active_space,
            sampling,
            orbitals,
            series,
            molecule,
        })
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::template()
    }
}

impl InputHandle for Input {
    fn handle(&self) -> Result<(), anyhow::Error> {
        if self.logbook.print_inputs {
            log_subtitle("Input parameters");
            tdrdm_output!("");
            self.logbook.log_output_display();
            tdrdm_output!("");
        }
        if self.tasks.is_empty() {
            tdrdm_output!("No tasks requested.");
            return Ok(());
        }
        let context = self.prepare_context()?;
        for (i, task) in self.tasks.iter().enumerate() {
            task.run(&context)
                .with_context(|| format!("Task #{} failed", i + 1))?;
        }
        log_title("All tasks completed");
        Ok(())
    }
}
