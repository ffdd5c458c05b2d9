//! The logbook section of a tdrdm input file, which describes the calculation whose sampled
//! RDMs are being analysed.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{self, bail, format_err, Context};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::drivers::{ActiveSpace, SamplingSettings};
use crate::interfaces::input::ConfigurationError;
use crate::io::format::nice_bool;
use crate::io::read_tdrdm_yaml;
use crate::rdm::SpinLabel;
use crate::timeseries::scan::DEFAULT_RDM_FILENAME;
use crate::timeseries::DEFAULT_SIMTIME_THRESHOLD;

/// The key under which a previous logbook is referenced.
pub const PREV_LOGBOOK_KEY: &str = "prev_logbook";

/// Logbook keys holding file-system paths.
const PATH_KEYS: [&str; 3] = ["orb_path", "sample_dir", "xyz"];

fn default_simtime_thr() -> f64 {
    DEFAULT_SIMTIME_THRESHOLD
}

fn default_rdm_filename() -> String {
    DEFAULT_RDM_FILENAME.to_string()
}

// ==================
// Struct definitions
// ==================

/// The sample directories given in a logbook, either as a single path or as a list of paths.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleDirectories {
    /// A single sample directory.
    Single(PathBuf),

    /// Several sample directories.
    Multiple(Vec<PathBuf>),
}

impl SampleDirectories {
    /// Returns the sample directories as a list.
    pub fn to_paths(&self) -> Vec<PathBuf> {
        match self {
            SampleDirectories::Single(dir) => vec![dir.clone()],
            SampleDirectories::Multiple(dirs) => dirs.clone(),
        }
    }
}

/// A structure describing the calculation that produced the sampled RDMs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Logbook {
    /// The number of core orbitals.
    #[serde(default)]
    pub n_core: usize,

    /// The number of active orbitals.
    pub n_cas: usize,

    /// The number of active electrons.
    pub nel_cas: f64,

    /// The NumPy `.npy` file of the orbital coefficients in the AO basis, one orbital per
    /// column.
    pub orb_path: PathBuf,

    /// The sample directories, each containing `tevo-*` subdirectories.
    pub sample_dir: SampleDirectories,

    /// The XYZ file of the molecular geometry, required for cube output.
    #[serde(default)]
    pub xyz: Option<PathBuf>,

    /// The threshold (fs) below or at which consecutive time points are regarded as identical.
    #[serde(default = "default_simtime_thr")]
    pub simtime_thr: f64,

    /// The spin-label convention of the stored RDMs.
    #[serde(default)]
    pub spin_label: SpinLabel,

    /// The name of the RDM file inside each per-time-point directory.
    #[serde(default = "default_rdm_filename")]
    pub rdm_filename: String,

    /// Boolean indicating if the resolved logbook is to be printed before the tasks run.
    #[serde(default)]
    pub print_inputs: bool,

    /// A previous logbook file whose entries fill in those missing from this logbook. This has
    /// already been resolved when a logbook is read through [`resolve_logbook`]. Relative
    /// `orb_path`, `sample_dir`, and `xyz` entries taken from a previous logbook are anchored at
    /// the directory of that logbook; those of the current logbook are left as given.
    #[serde(default)]
    pub prev_logbook: Option<PathBuf>,
}

impl Logbook {
    /// Returns the active space described by this logbook.
    pub fn active_space(&self) -> Result<ActiveSpace, anyhow::Error> {
        ActiveSpace::builder()
            .n_core(self.n_core)
            .n_cas(self.n_cas)
            .nel_cas(self.nel_cas)
            .build()
            .map_err(|err| format_err!(ConfigurationError(err.to_string())))
    }

    /// Returns the settings for reading the sampled RDMs described by this logbook.
    pub fn sampling(&self) -> Result<SamplingSettings, anyhow::Error> {
        if !self.simtime_thr.is_finite() || self.simtime_thr < 0.0 {
            bail!(ConfigurationError(format!(
                "the time similarity threshold must be non-negative, but {} given",
                self.simtime_thr
            )));
        }
        SamplingSettings::builder()
            .simtime_thr(self.simtime_thr)
            .rdm_filename(self.rdm_filename.as_str())
            .spin_label(self.spin_label)
            .build()
            .map_err(|err| format_err!(ConfigurationError(err.to_string())))
    }

    /// Returns the sample directories as a list.
    pub fn sample_directories(&self) -> Vec<PathBuf> {
        self.sample_dir.to_paths()
    }
}

impl Default for Logbook {
    fn default() -> Self {
        Self {
            n_core: 0,
            n_cas: 1,
            nel_cas: 1.0,
            orb_path: PathBuf::from("orbitals.npy"),
            sample_dir: SampleDirectories::Single(PathBuf::from("sample")),
            xyz: None,
            simtime_thr: DEFAULT_SIMTIME_THRESHOLD,
            spin_label: SpinLabel::SU2,
            rdm_filename: DEFAULT_RDM_FILENAME.to_string(),
            print_inputs: false,
            prev_logbook: None,
        }
    }
}

impl fmt::Display for Logbook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "n_core = {}", self.n_core)?;
        writeln!(f, "n_cas = {}", self.n_cas)?;
        writeln!(f, "nel_cas = {}", self.nel_cas)?;
        writeln!(f, "orb_path = {}", self.orb_path.display())?;
        for (i, dir) in self.sample_directories().iter().enumerate() {
            writeln!(f, "sample_dir[{i}] = {}", dir.display())?;
        }
        writeln!(
            f,
            "xyz = {}",
            self.xyz
                .as_ref()
                .map(|xyz| xyz.display().to_string())
                .unwrap_or_else(|| "--".to_string())
        )?;
        writeln!(f, "simtime_thr = {:.3e}", self.simtime_thr)?;
        writeln!(f, "spin_label = {}", self.spin_label)?;
        writeln!(f, "rdm_filename = {}", self.rdm_filename)?;
        writeln!(f, "print_inputs = {}", nice_bool(self.print_inputs))?;
        if let Some(prev) = self.prev_logbook.as_ref() {
            writeln!(f, "prev_logbook = {}", prev.display())?;
        }
        Ok(())
    }
}

// =========
// Functions
// =========

/// Fills in the entries of `target` absent from `source`. Nested mappings present in both are
/// merged recursively, and entries already in `target` are never overwritten.
pub fn merge_missing(target: &mut Mapping, source: &Mapping) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (None, _) => {
                target.insert(key.clone(), value.clone());
            }
            (Some(Value::Mapping(target_inner)), Value::Mapping(source_inner)) => {
                merge_missing(target_inner, source_inner);
            }
            (Some(_), _) => {}
        }
    }
}

/// Prefixes the relative paths held by the path-valued entries of a logbook mapping with
/// `base_dir`.
fn anchor_relative_paths(logbook: &mut Mapping, base_dir: &Path) {
    let anchor = |value: &mut Value| {
        if let Value::String(path) = value {
            if Path::new(path.as_str()).is_relative() {
                *path = base_dir.join(path.as_str()).display().to_string();
            }
        }
    };
    for key in PATH_KEYS {
        match logbook.get_mut(key) {
            Some(Value::Sequence(paths)) => paths.iter_mut().for_each(anchor),
            Some(value) => anchor(value),
            None => {}
        }
    }
}

/// Extracts the logbook mapping from a previous logbook file. The file may contain either a
/// bare logbook or a full input with a `logbook` section.
fn read_previous_logbook(path: &Path) -> Result<Mapping, anyhow::Error> {
    let value: Value = read_tdrdm_yaml(path)
        .with_context(|| format!("Unable to read previous logbook `{}`", path.display()))?;
    match value {
        Value::Mapping(mut mapping) => match mapping.remove("logbook") {
            Some(Value::Mapping(logbook)) => Ok(logbook),
            Some(_) => bail!(ConfigurationError(format!(
                "the `logbook` section of `{}` is not a mapping",
                path.display()
            ))),
            None => Ok(mapping),
        },
        _ => bail!(ConfigurationError(format!(
            "the previous logbook `{}` is not a mapping",
            path.display()
        ))),
    }
}

/// Resolves the chain of previous logbooks referenced by a logbook mapping.
///
/// Each previous logbook only fills in entries that are still missing, so entries closer to the
/// current logbook take precedence. Relative paths of previous logbooks are interpreted with
/// respect to the directory of the file referencing them, and relative data paths inherited
/// from a previous logbook with respect to the directory of that previous logbook.
///
/// # Arguments
///
/// * `logbook` - The logbook mapping to be completed in place.
/// * `origin` - The file from which `logbook` has been read, if any. This takes part in cycle
/// detection and anchors relative paths.
///
/// # Errors
///
/// Errors if a previous logbook cannot be read or if a logbook references itself, directly or
/// indirectly.
pub fn resolve_logbook(logbook: &mut Mapping, origin: Option<&Path>) -> Result<(), anyhow::Error> {
    let mut visited = IndexSet::<PathBuf>::new();
    if let Some(origin) = origin {
        visited.insert(fs::canonicalize(origin).unwrap_or_else(|_| origin.to_path_buf()));
    }
    let mut base_dir = origin
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let mut next = logbook.remove(PREV_LOGBOOK_KEY);
    let mut chain = vec![];
    while let Some(prev) = next.take() {
        let prev = match prev {
            Value::Null => break,
            Value::String(prev) => PathBuf::from(prev),
            other => bail!(ConfigurationError(format!(
                "`{PREV_LOGBOOK_KEY}` must be a path, but `{other:?}` given"
            ))),
        };
        let path = base_dir.join(&prev);
        let canonical = fs::canonicalize(&path)
            .with_context(|| format!("Unable to locate previous logbook `{}`", path.display()))?;
        if !visited.insert(canonical.clone()) {
            let cycle = visited
                .iter()
                .chain(std::iter::once(&canonical))
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            bail!(ConfigurationError(format!(
                "previous logbooks form a cycle: {cycle}"
            )));
        }
        log::debug!("Reading previous logbook `{}`.", canonical.display());
        let mut previous = read_previous_logbook(&canonical)?;
        next = previous.remove(PREV_LOGBOOK_KEY);
        base_dir = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        anchor_relative_paths(&mut previous, &base_dir);
        merge_missing(logbook, &previous);
        chain.push(prev);
    }
    if let Some(first) = chain.first() {
        logbook.insert(
            Value::String(PREV_LOGBOOK_KEY.to_string()),
            Value::String(first.display().to_string()),
        );
    }
    Ok(())
}
