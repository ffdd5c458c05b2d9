//! Drivers to carry out tdrdm functionalities.

use std::fmt;

use anyhow::{self, ensure};
use derive_builder::Builder;
use ndarray::{s, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::rdm::{RdmNormalisation, SpinLabel};
use crate::timeseries::scan::{TimeSeriesScan, DEFAULT_RDM_FILENAME};
use crate::timeseries::{TimeSeries, DEFAULT_SIMTIME_THRESHOLD};

pub mod hole_density;
pub mod local_correlation;
pub mod orbital_alignment;
pub mod orbital_occupation;

// =================
// Trait definitions
// =================

/// Trait defining behaviours of `tdrdm` drivers.
pub trait TdRdmDriver {
    /// The type of the parameter structure controlling the driver.
    type Params;

    /// The type of the successful outcome when executing the driver.
    type Outcome;

    /// Executes the driver and stores the result internally.
    fn run(&mut self) -> Result<(), anyhow::Error>;

    /// Returns the result of the driver execution.
    fn result(&self) -> Result<&Self::Outcome, anyhow::Error>;
}

// ==================
// Struct definitions
// ==================

/// The partitioning of the orbital space of a time-dependent calculation.
#[derive(Clone, Copy, Builder, Debug, PartialEq, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct ActiveSpace {
    /// The number of core orbitals, which are doubly occupied and absent from the sampled RDMs.
    #[builder(default = "0")]
    pub n_core: usize,

    /// The number of active orbitals spanned by the sampled RDMs.
    pub n_cas: usize,

    /// The number of active electrons in the time-dependent state.
    pub nel_cas: f64,
}

impl ActiveSpaceBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(nel_cas) = self.nel_cas {
            if !nel_cas.is_finite() || nel_cas < 0.0 {
                return Err(format!("Invalid number of active electrons: {nel_cas}."));
            }
        }
        if self.n_cas == Some(0) {
            return Err("The active space must contain at least one orbital.".to_string());
        }
        Ok(())
    }
}

impl ActiveSpace {
    /// Returns a builder to construct an [`ActiveSpace`] structure.
    pub fn builder() -> ActiveSpaceBuilder {
        ActiveSpaceBuilder::default()
    }

    /// The number of core and active orbitals together.
    pub fn n_occ(&self) -> usize {
        self.n_core + self.n_cas
    }

    /// Extracts the active orbitals (columns `n_core..n_core + n_cas`) from a full orbital
    /// coefficient matrix.
    pub fn active_orbitals<'a>(
        &self,
        orbs: ArrayView2<'a, f64>,
    ) -> Result<ArrayView2<'a, f64>, anyhow::Error> {
        ensure!(
            orbs.ncols() >= self.n_occ(),
            "The orbital coefficient matrix has {} columns, but {} core and {} active orbitals are required.",
            orbs.ncols(),
            self.n_core,
            self.n_cas
        );
        Ok(orbs.slice_move(s![.., self.n_core..self.n_occ()]))
    }
}

impl fmt::Display for ActiveSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Number of core orbitals: {}", self.n_core)?;
        writeln!(f, "Number of active orbitals: {}", self.n_cas)?;
        writeln!(f, "Number of active electrons: {}", self.nel_cas)?;
        Ok(())
    }
}

/// Settings governing how sampled time points are read.
#[derive(Clone, Builder, Debug, PartialEq, Serialize, Deserialize)]
pub struct SamplingSettings {
    /// The threshold (fs) below or at which consecutive time points are regarded as identical.
    #[builder(default = "DEFAULT_SIMTIME_THRESHOLD")]
    pub simtime_thr: f64,

    /// The name of the RDM file inside each per-time-point directory.
    #[builder(setter(into), default = "DEFAULT_RDM_FILENAME.to_string()")]
    pub rdm_filename: String,

    /// The spin-label convention of the stored RDMs.
    #[builder(default = "SpinLabel::SU2")]
    pub spin_label: SpinLabel,
}

impl SamplingSettings {
    /// Returns a builder to construct a [`SamplingSettings`] structure.
    pub fn builder() -> SamplingSettingsBuilder {
        SamplingSettingsBuilder::default()
    }

    /// Constructs a scan over a time series with these settings.
    ///
    /// # Arguments
    ///
    /// * `series` - The sorted time series.
    /// * `normalisation` - The normalisation applied to every loaded RDM.
    pub fn scan<'a>(
        &self,
        series: &'a TimeSeries,
        normalisation: RdmNormalisation,
    ) -> Result<TimeSeriesScan<'a>, anyhow::Error> {
        Ok(TimeSeriesScan::builder()
            .series(series)
            .threshold(self.simtime_thr)
            .rdm_filename(self.rdm_filename.clone())
            .spin_label(self.spin_label)
            .normalisation(normalisation)
            .build()?)
    }
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            simtime_thr: DEFAULT_SIMTIME_THRESHOLD,
            rdm_filename: DEFAULT_RDM_FILENAME.to_string(),
            spin_label: SpinLabel::SU2,
        }
    }
}

impl fmt::Display for SamplingSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Time similarity threshold: {:.3e} fs", self.simtime_thr)?;
        writeln!(f, "RDM file name: {}", self.rdm_filename)?;
        writeln!(f, "RDM spin labels: {}", self.spin_label)?;
        Ok(())
    }
}
