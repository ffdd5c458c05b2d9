//! Duplicate-aware forward scan over a sorted time series.
//!
//! Every time point is classified as either unique or a duplicate of the last unique time point.
//! The RDM of every time point is loaded and normalised, but only unique time points are handed
//! to the [`TimePointObserver`]. The RDMs of duplicate time points are only checked for
//! consistency against the spectrum retained from the last unique time point.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{self, bail, ensure};
use derive_builder::Builder;
use ndarray::Array1;

use crate::io::format::{tdrdm_output, tdrdm_warn};
use crate::rdm::eigen::eigvalsh;
use crate::rdm::{NormalisedRdm, RdmNormalisation, SpinLabel, SpinResolvedRdm};
use crate::timeseries::{
    n_digits, TimeOrderingError, TimeSeries, TimeSeriesEntry, DEFAULT_SIMTIME_THRESHOLD,
};

/// Maximum tolerated absolute difference between corresponding eigenvalues of the RDMs at
/// duplicate time points.
pub const SPECTRUM_TOLERANCE: f64 = 1e-6;

/// Default name of the RDM file inside each per-time-point directory.
pub const DEFAULT_RDM_FILENAME: &str = "1pdm.npy";

// =====================
// Classification state
// =====================

/// Classification of a time point within a sorted scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimePointKind {
    /// The time point is unique and has the given zero-based unique index.
    Unique { index: usize },

    /// The time point duplicates the unique time point with the given index.
    Duplicate { of_index: usize },
}

/// State carried from one time point to the next during a scan.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PreviousPointState {
    /// The time of the previously scanned time point, unique or not.
    pub last_timestamp: Option<f64>,

    /// The ascending eigenvalues of the spin-summed RDM at the last unique time point.
    pub last_spectrum: Option<Array1<f64>>,

    /// The unique index of the last unique time point.
    pub last_unique_index: Option<usize>,
}

impl PreviousPointState {
    /// Classifies a time point following the previously scanned one.
    ///
    /// The first time point is unique. Any subsequent time point is unique if its gap to the
    /// previously scanned time point is strictly larger than `threshold`, and a duplicate
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns a [`TimeOrderingError`] if `time` precedes the previously scanned time point, and
    /// an error if `time` is not finite.
    pub fn classify(&self, time: f64, threshold: f64) -> Result<TimePointKind, anyhow::Error> {
        ensure!(
            time.is_finite(),
            "Time point {time} fs cannot be classified as it is not finite."
        );
        match (self.last_timestamp, self.last_unique_index) {
            (Some(t_last), Some(last_index)) => {
                if time < t_last {
                    bail!(TimeOrderingError(format!(
                        "time point {time:13.8} fs comes after {t_last:13.8} fs in a sorted scan"
                    )));
                }
                if time - t_last > threshold {
                    Ok(TimePointKind::Unique {
                        index: last_index + 1,
                    })
                } else {
                    Ok(TimePointKind::Duplicate {
                        of_index: last_index,
                    })
                }
            }
            _ => Ok(TimePointKind::Unique { index: 0 }),
        }
    }

    /// Returns the state after scanning a time point of the given kind. The timestamp is always
    /// advanced, whereas the spectrum and the unique index are only replaced at unique time
    /// points.
    pub fn advance(
        self,
        time: f64,
        kind: TimePointKind,
        spectrum: Array1<f64>,
    ) -> PreviousPointState {
        match kind {
            TimePointKind::Unique { index } => PreviousPointState {
                last_timestamp: Some(time),
                last_spectrum: Some(spectrum),
                last_unique_index: Some(index),
            },
            TimePointKind::Duplicate { .. } => PreviousPointState {
                last_timestamp: Some(time),
                ..self
            },
        }
    }
}

/// Checks whether two eigenvalue spectra agree. Both spectra are sorted independently in
/// ascending order and then compared element-wise.
///
/// # Returns
///
/// `true` if both spectra have the same length and no pair of corresponding eigenvalues differs
/// by more than `tolerance`.
pub fn spectra_consistent(spectrum: &[f64], reference: &[f64], tolerance: f64) -> bool {
    if spectrum.len() != reference.len() {
        return false;
    }
    let mut a = spectrum.to_vec();
    let mut b = reference.to_vec();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);
    a.iter()
        .zip(b.iter())
        .all(|(x, y)| (x - y).abs() <= tolerance)
}

// =========
// Observers
// =========

/// A unique time point handed to a [`TimePointObserver`].
#[derive(Clone, Debug)]
pub struct UniqueTimePoint<'a> {
    /// The zero-based unique index.
    pub index: usize,

    /// The sorted time-series entry of this time point.
    pub entry: &'a TimeSeriesEntry,

    /// The number of digits to which output indices are zero-padded.
    pub index_width: usize,
}

impl<'a> UniqueTimePoint<'a> {
    /// The time in femtoseconds.
    pub fn time(&self) -> f64 {
        self.entry.time
    }

    /// The per-time-point directory.
    pub fn directory(&self) -> &Path {
        &self.entry.directory
    }

    /// The unique index zero-padded to [`Self::index_width`] digits.
    pub fn padded_index(&self) -> String {
        format!("{:0width$}", self.index, width = self.index_width)
    }
}

/// Trait for consumers of the normalised RDMs at unique time points.
pub trait TimePointObserver {
    /// Called with the directory of every time point, unique or duplicate, before its RDM is
    /// loaded.
    fn prepare_directory(&mut self, _dir: &Path) -> Result<(), anyhow::Error> {
        Ok(())
    }

    /// Consumes the normalised RDM of a unique time point.
    fn observe(
        &mut self,
        point: &UniqueTimePoint,
        rdm: &NormalisedRdm,
    ) -> Result<(), anyhow::Error>;
}

// ====
// Scan
// ====

/// Summary of a completed scan.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanSummary {
    /// The number of scanned time points.
    pub n_points: usize,

    /// The number of unique time points.
    pub n_unique: usize,

    /// The number of duplicate time points.
    pub n_duplicates: usize,

    /// The number of duplicate time points whose RDM spectra disagree with that at the
    /// corresponding unique time point.
    pub n_inconsistent: usize,

    /// The directories of the unique time points, in scan order.
    pub unique_directories: Vec<PathBuf>,
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scanned time points: {}", self.n_points)?;
        writeln!(f, "Unique time points: {}", self.n_unique)?;
        writeln!(f, "Duplicate time points: {}", self.n_duplicates)?;
        writeln!(
            f,
            "Duplicate time points with inconsistent RDM spectra: {}",
            self.n_inconsistent
        )?;
        Ok(())
    }
}

/// A forward scan over a sorted time series.
#[derive(Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct TimeSeriesScan<'a> {
    /// The sorted time series to be scanned.
    series: &'a TimeSeries,

    /// The threshold (fs) below or at which consecutive time points are regarded as identical.
    #[builder(default = "DEFAULT_SIMTIME_THRESHOLD")]
    threshold: f64,

    /// The name of the RDM file inside each per-time-point directory.
    #[builder(setter(into), default = "DEFAULT_RDM_FILENAME.to_string()")]
    rdm_filename: String,

    /// The spin-label convention of the stored RDMs.
    #[builder(default = "SpinLabel::SU2")]
    spin_label: SpinLabel,

    /// The normalisation applied to every loaded RDM.
    #[builder(default = "RdmNormalisation::default()")]
    normalisation: RdmNormalisation,
}

impl<'a> TimeSeriesScanBuilder<'a> {
    fn validate(&self) -> Result<(), String> {
        let threshold = self.threshold.unwrap_or(DEFAULT_SIMTIME_THRESHOLD);
        if threshold.is_sign_negative() || !threshold.is_finite() {
            return Err(format!(
                "The time similarity threshold must be finite and non-negative, but {threshold} given."
            ));
        }
        if let Some(Some(target)) = self.normalisation.map(|norm| norm.target) {
            if !target.is_finite() {
                return Err(format!("Invalid target electron count: {target}."));
            }
        }
        Ok(())
    }
}

impl<'a> TimeSeriesScan<'a> {
    /// Returns a builder to construct a [`TimeSeriesScan`].
    pub fn builder() -> TimeSeriesScanBuilder<'a> {
        TimeSeriesScanBuilder::default()
    }

    /// The number of unique time points in the scanned series.
    pub fn n_unique(&self) -> usize {
        self.series.count_unique(self.threshold)
    }

    /// Loads and normalises the RDM stored in a per-time-point directory.
    fn load_rdm(&self, dir: &Path) -> Result<NormalisedRdm, anyhow::Error> {
        let raw = SpinResolvedRdm::from_npy(dir.join(&self.rdm_filename), self.spin_label)?;
        self.normalisation.apply(raw)
    }

    /// Scans the time series in ascending time order.
    ///
    /// # Arguments
    ///
    /// * `observer` - The consumer of the normalised RDMs at unique time points.
    ///
    /// # Returns
    ///
    /// A summary of the scan. The scan stops at the first failure to load an RDM or at the first
    /// failure of the observer; anything the observer has written before then is kept.
    pub fn run<O: TimePointObserver + ?Sized>(
        &self,
        observer: &mut O,
    ) -> Result<ScanSummary, anyhow::Error> {
        let index_width = n_digits(self.n_unique());
        let (_, summary) = self.series.iter().try_fold(
            (PreviousPointState::default(), ScanSummary::default()),
            |(state, mut summary), entry| {
                let kind = state.classify(entry.time, self.threshold)?;
                observer.prepare_directory(&entry.directory)?;
                let rdm = self.load_rdm(&entry.directory)?;
                let spectrum = eigvalsh(rdm.spin_summed().view())?;
                summary.n_points += 1;
                match kind {
                    TimePointKind::Unique { index } => {
                        let point = UniqueTimePoint {
                            index,
                            entry,
                            index_width,
                        };
                        observer.observe(&point, &rdm)?;
                        summary.n_unique += 1;
                        summary.unique_directories.push(entry.directory.clone());
                    }
                    TimePointKind::Duplicate { of_index } => {
                        summary.n_duplicates += 1;
                        tdrdm_warn!(
                            "The data loaded from `{}` has a time point ({:13.8} fs) almost identical to that of unique time point #{of_index}.",
                            entry.directory.display(),
                            entry.time
                        );
                        let consistent = state
                            .last_spectrum
                            .as_ref()
                            .map(|last| {
                                spectra_consistent(
                                    &spectrum.to_vec(),
                                    &last.to_vec(),
                                    SPECTRUM_TOLERANCE,
                                )
                            })
                            .unwrap_or(false);
                        if !consistent {
                            summary.n_inconsistent += 1;
                            tdrdm_warn!(
                                "The RDM at the duplicate time point {:13.8} fs yields eigenvalues differing by more than {SPECTRUM_TOLERANCE:.0e} from those at unique time point #{of_index}. Proceed at your own risk.",
                                entry.time
                            );
                        }
                    }
                }
                Ok::<_, anyhow::Error>((state.advance(entry.time, kind, spectrum), summary))
            },
        )?;
        tdrdm_output!(
            "Scanned {} time points ({} unique, {} duplicate).",
            summary.n_points,
            summary.n_unique,
            summary.n_duplicates
        );
        Ok(summary)
    }
}
