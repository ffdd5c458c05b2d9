//! Collection and ordering of sampled time points.

use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{self, ensure, format_err, Context};
use lazy_static::lazy_static;
use ordered_float::OrderedFloat;
use regex::Regex;

pub mod scan;


/// Prefix of the per-time-point subdirectories inside a sample directory.
pub const TEVO_PREFIX: &str = "tevo-";

/// Name of the file inside each per-time-point subdirectory that records the sampling time.
pub const TIME_INFO_FILENAME: &str = "TIME_INFO";

/// Default threshold (fs) below which two time points are regarded as identical.
pub const DEFAULT_SIMTIME_THRESHOLD: f64 = 1e-11;

lazy_static! {
    static ref TIME_INFO_RE: Regex = Regex::new(
        r"Actual sampling time\s*=\s*(?P<au>\S+)\s*a\.u\.\s*=\s*(?P<fs>\S+)\s*fs"
    )
    .expect("Regex pattern invalid.");
}

// ==================
// Error definitions
// ==================

/// Error raised when time points are found out of order during a forward scan. This signals a
/// bug rather than a problem with the input data.
#[derive(Debug, Clone)]
pub struct TimeOrderingError(pub String);

impl fmt::Display for TimeOrderingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Time ordering error: {}", self.0)
    }
}

impl Error for TimeOrderingError {}

// ==================
// Struct definitions
// ==================

/// A sampled time point: the directory holding its data and its time in femtoseconds.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeriesEntry {
    /// The per-time-point directory.
    pub directory: PathBuf,

    /// The sampling time in femtoseconds.
    pub time: f64,
}

impl TimeSeriesEntry {
    /// Creates a new entry.
    pub fn new<P: AsRef<Path>>(directory: P, time: f64) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            time,
        }
    }
}

impl fmt::Display for TimeSeriesEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:13.8} fs  {}", self.time, self.directory.display())
    }
}

/// A time series of sampled time points sorted by ascending time.
#[derive(Clone, Debug, Default)]
pub struct TimeSeries {
    entries: Vec<TimeSeriesEntry>,
}

impl TimeSeries {
    /// Constructs a time series from entries in any order. Entries are sorted stably by their
    /// times, so entries with equal times keep their original relative order.
    pub fn from_entries(mut entries: Vec<TimeSeriesEntry>) -> Self {
        entries.sort_by_key(|entry| OrderedFloat(entry.time));
        Self { entries }
    }

    /// The sorted entries.
    pub fn entries(&self) -> &[TimeSeriesEntry] {
        &self.entries
    }

    /// The sorted times.
    pub fn times(&self) -> Vec<f64> {
        self.entries.iter().map(|entry| entry.time).collect()
    }

    /// The number of entries, duplicates included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the series has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an iterator over the sorted entries.
    pub fn iter(&self) -> std::slice::Iter<'_, TimeSeriesEntry> {
        self.entries.iter()
    }

    /// Counts the unique time points. The first entry is always unique, and every subsequent
    /// entry whose gap to the previous entry is strictly larger than `threshold` is unique.
    pub fn count_unique(&self, threshold: f64) -> usize {
        if self.entries.is_empty() {
            return 0;
        }
        1 + self
            .entries
            .windows(2)
            .filter(|pair| pair[1].time - pair[0].time > threshold)
            .count()
    }
}

impl<'a> IntoIterator for &'a TimeSeries {
    type Item = &'a TimeSeriesEntry;
    type IntoIter = std::slice::Iter<'a, TimeSeriesEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl fmt::Display for TimeSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sampled time points ({}):", self.len())?;
        for entry in self.entries.iter() {
            writeln!(f, "  {entry}")?;
        }
        Ok(())
    }
}

// =========
// Functions
// =========

/// Returns the number of decimal digits of `n`, used as the zero-padding width of output
/// indices.
pub fn n_digits(n: usize) -> usize {
    n.to_string().len()
}

/// Reads the sampling time in femtoseconds from the `TIME_INFO` file of a per-time-point
/// directory.
///
/// # Arguments
///
/// * `dir` - The per-time-point directory.
///
/// # Returns
///
/// The time in femtoseconds, or an error naming the file if it is missing or contains no
/// recognisable sampling time.
pub fn read_time_info<P: AsRef<Path>>(dir: P) -> Result<f64, anyhow::Error> {
    let path = dir.as_ref().join(TIME_INFO_FILENAME);
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Unable to read the time information file `{}`", path.display()))?;
    let caps = TIME_INFO_RE.captures(&contents).ok_or_else(|| {
        format_err!(
            "No sampling time of the form `Actual sampling time = <t> a.u. = <t> fs` found in `{}`.",
            path.display()
        )
    })?;
    let time = caps["fs"].parse::<f64>().map_err(|err| {
        format_err!(
            "Unable to parse the sampling time `{}` in `{}`: {err}.",
            &caps["fs"],
            path.display()
        )
    })?;
    ensure!(
        time.is_finite(),
        "The sampling time `{}` in `{}` is not a finite number.",
        &caps["fs"],
        path.display()
    );
    Ok(time)
}

/// Lists the per-time-point subdirectories of a sample directory, sorted by name.
fn list_tevo_dirs(group: &Path) -> Result<Vec<PathBuf>, anyhow::Error> {
    let mut dirs = fs::read_dir(group)
        .with_context(|| format!("Unable to list the sample directory `{}`", group.display()))?
        .map(|entry_res| entry_res.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with(TEVO_PREFIX))
                    .unwrap_or(false)
        })
        .collect::<Vec<_>>();
    dirs.sort();
    Ok(dirs)
}

/// Gathers the sampled time points of one or more sample directories into a single sorted time
/// series.
///
/// # Arguments
///
/// * `groups` - The sample directories, each containing `tevo-*` subdirectories.
///
/// # Returns
///
/// The time series, sorted by ascending time. Entries with equal times keep the order of the
/// groups, then the name order of the subdirectories within each group.
pub fn collect_time_series(groups: &[PathBuf]) -> Result<TimeSeries, anyhow::Error> {
    let entries = groups
        .iter()
        .map(|group| {
            list_tevo_dirs(group)?
                .into_iter()
                .map(|dir| {
                    let time = read_time_info(&dir)?;
                    Ok(TimeSeriesEntry::new(dir, time))
                })
                .collect::<Result<Vec<_>, anyhow::Error>>()
        })
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();
    Ok(TimeSeries::from_entries(entries))
}
