//! Driver for the occupations of arbitrary orbitals along a time series.
//!
//! The sampled RDMs are expressed in the reference orbital basis. To obtain the occupation of
//! a set of target orbitals, these are first projected onto the reference orbitals via
//! $`\mathbf{O} = \mathbf{C}_{\mathrm{ref}}^{\mathsf{T}} \mathbf{S} \mathbf{C}_{\mathrm{target}}`$,
//! and the occupation of target orbital $`p`$ is then
//! $`n_p = \mathrm{Re} [\mathbf{O}^{\mathsf{T}} \mathbf{D} \mathbf{O}]_{pp}`$, where
//! $`\mathbf{D}`$ is the spin-summed RDM with the core orbitals included.

use std::fmt;
use std::path::PathBuf;

use anyhow::{self, ensure, format_err};
use derive_builder::Builder;
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::drivers::{ActiveSpace, SamplingSettings, TdRdmDriver};
use crate::io::format::{log_subtitle, log_title, nice_bool, tdrdm_output, TdRdmOutput};
use crate::io::table::{ObservableTable, TableLayout};
use crate::rdm::{NormalisedRdm, RdmNormalisation};
use crate::timeseries::scan::{ScanSummary, TimePointObserver, UniqueTimePoint};
use crate::timeseries::TimeSeries;


type C128 = Complex<f64>;

/// Default path of the orbital-occupation table.
pub const DEFAULT_OCCUPATION_TABLE: &str = "orb_occ";

fn default_table() -> PathBuf {
    PathBuf::from(DEFAULT_OCCUPATION_TABLE)
}

fn default_true() -> bool {
    true
}

// =========
// Functions
// =========

/// Expresses target orbitals in the reference orbital basis, *i.e.* computes
/// $`\mathbf{C}_{\mathrm{ref}}^{\mathsf{T}} \mathbf{S} \mathbf{C}_{\mathrm{target}}`$.
///
/// # Arguments
///
/// * `reference` - The reference orbitals in the AO basis, one per column.
/// * `ovl` - The AO overlap matrix.
/// * `target` - The target orbitals in the AO basis, one per column.
pub fn project_orbitals(
    reference: ArrayView2<f64>,
    ovl: ArrayView2<f64>,
    target: ArrayView2<f64>,
) -> Result<Array2<f64>, anyhow::Error> {
    let n_ao = reference.nrows();
    ensure!(
        ovl.dim() == (n_ao, n_ao) && target.nrows() == n_ao,
        "Inconsistent AO dimensions: reference orbitals {:?}, overlap {:?}, target orbitals {:?}.",
        reference.shape(),
        ovl.shape(),
        target.shape()
    );
    Ok(reference.t().dot(&ovl.dot(&target)))
}

/// Computes the occupations of the target orbitals from a density matrix in the reference
/// orbital basis.
///
/// # Arguments
///
/// * `projection` - The target orbitals in the reference orbital basis, as returned by
/// [`project_orbitals`]. Only the leading rows matching the dimension of `dm` are used.
/// * `dm` - The spin-summed density matrix in the leading reference orbitals.
///
/// # Returns
///
/// The occupation of each target orbital.
pub fn orbital_occupations(
    projection: ArrayView2<f64>,
    dm: ArrayView2<C128>,
) -> Result<Array1<f64>, anyhow::Error> {
    let n = dm.nrows();
    ensure!(
        dm.ncols() == n && projection.nrows() >= n,
        "A density matrix of shape {:?} cannot be applied to {} reference orbitals.",
        dm.shape(),
        projection.nrows()
    );
    let o = projection.slice(s![..n, ..]).mapv(|x| C128::new(x, 0.0));
    let dm_o = dm.dot(&o);
    let occs = o
        .axis_iter(Axis(1))
        .zip(dm_o.axis_iter(Axis(1)))
        .map(|(col, dm_col)| col.dot(&dm_col).re)
        .collect::<Array1<f64>>();
    Ok(occs)
}

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

/// A structure containing control parameters for orbital-occupation evaluation.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct OrbitalOccupationParams {
    /// The path of the table of orbital occupations.
    #[builder(setter(into), default = "default_table()")]
    #[serde(default = "default_table")]
    pub table: PathBuf,

    /// Boolean indicating if the sampled RDMs are to be normalised to the number of active
    /// electrons.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub normalise_rdm: bool,
}

impl OrbitalOccupationParams {
    /// Returns a builder to construct an [`OrbitalOccupationParams`] structure.
    pub fn builder() -> OrbitalOccupationParamsBuilder {
        OrbitalOccupationParamsBuilder::default()
    }
}

impl Default for OrbitalOccupationParams {
    fn default() -> Self {
        Self {
            table: default_table(),
            normalise_rdm: true,
        }
    }
}

impl fmt::Display for OrbitalOccupationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Orbital occupation table: {}", self.table.display())?;
        writeln!(f, "Normalise sampled RDMs: {}", nice_bool(self.normalise_rdm))?;
        writeln!(f)?;
        Ok(())
    }
}

// ------
// Result
// ------

/// A structure to contain orbital-occupation results.
#[derive(Clone, Debug)]
pub struct OrbitalOccupationResult {
    /// The summary of the time-series scan.
    pub summary: ScanSummary,

    /// The path of the written table of orbital occupations.
    pub table: PathBuf,

    /// The trace of $`\mathbf{O}^{\mathsf{T}}\mathbf{O}`$, which equals the number of target
    /// orbitals if they lie entirely within the span of the reference orbitals.
    pub projection_trace: f64,
}

// ------
// Driver
// ------

/// A driver for the evaluation of orbital occupations along a time series.
#[derive(Clone, Builder)]
pub struct OrbitalOccupationDriver<'a> {
    /// The control parameters for orbital-occupation evaluation.
    parameters: &'a OrbitalOccupationParams,

    /// The sorted time series of sampled RDMs.
    series: &'a TimeSeries,

    /// The active space of the sampled RDMs.
    active_space: &'a ActiveSpace,

    /// The settings for reading the sampled RDMs.
    #[builder(default = "SamplingSettings::default()")]
    sampling: SamplingSettings,

    /// The reference orbitals in which the sampled RDMs are expressed, one per column.
    reference_orbitals: ArrayView2<'a, f64>,

    /// The AO overlap matrix.
    overlap: ArrayView2<'a, f64>,

    /// The orbitals whose occupations are sought, one per column.
    target_orbitals: ArrayView2<'a, f64>,

    /// The result of the orbital-occupation evaluation.
    #[builder(setter(skip), default = "None")]
    result: Option<OrbitalOccupationResult>,
}

impl<'a> OrbitalOccupationDriver<'a> {
    /// Returns a builder to construct an [`OrbitalOccupationDriver`] structure.
    pub fn builder() -> OrbitalOccupationDriverBuilder<'a> {
        OrbitalOccupationDriverBuilder::default()
    }

    /// Evaluates and writes orbital occupations at all unique time points.
    fn evaluate_occupations(&mut self) -> Result<(), anyhow::Error> {
        log_title("Orbital Occupation");
        tdrdm_output!("");
        let params = self.parameters;
        params.log_output_display();
        self.active_space.log_output_display();
        self.sampling.log_output_display();
        tdrdm_output!("");

        let projection =
            project_orbitals(self.reference_orbitals, self.overlap, self.target_orbitals)?;
        ensure!(
            projection.nrows() >= self.active_space.n_occ(),
            "{} reference orbitals are too few for {} core and {} active orbitals.",
            projection.nrows(),
            self.active_space.n_core,
            self.active_space.n_cas
        );
        let projection_trace = projection.t().dot(&projection).diag().sum();
        tdrdm_output!("Trace of orbital overlap matrix = {projection_trace:.8}");
        tdrdm_output!("");

        let normalisation = if params.normalise_rdm {
            RdmNormalisation::to(self.active_space.nel_cas)
        } else {
            RdmNormalisation::default()
        };
        let scan = self.sampling.scan(self.series, normalisation)?;
        let n_target = projection.ncols();
        let table = ObservableTable::create(
            &params.table,
            &TableLayout {
                leading: ' ',
                time_labels: (String::new(), String::new()),
                value_labels: (1..=n_target).map(|i| format!("orb #{i}")).collect(),
            },
        )?;

        log_subtitle("Orbital occupations at unique time points");
        tdrdm_output!("");
        let mut writer = OccupationWriter {
            table,
            projection: projection.view(),
            n_core: self.active_space.n_core,
        };
        let summary = scan.run(&mut writer)?;
        tdrdm_output!("");
        summary.log_output_display();

        self.result = Some(OrbitalOccupationResult {
            summary,
            table: writer.table.path().to_path_buf(),
            projection_trace,
        });
        Ok(())
    }
}

impl<'a> TdRdmDriver for OrbitalOccupationDriver<'a> {
    type Params = OrbitalOccupationParams;

    type Outcome = OrbitalOccupationResult;

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No orbital-occupation results found."))
    }

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.evaluate_occupations()
    }
}

// ========
// Observer
// ========

struct OccupationWriter<'g> {
    table: ObservableTable,
    projection: ArrayView2<'g, f64>,
    n_core: usize,
}

impl<'g> TimePointObserver for OccupationWriter<'g> {
    fn observe(
        &mut self,
        point: &UniqueTimePoint,
        rdm: &NormalisedRdm,
    ) -> Result<(), anyhow::Error> {
        let dm_full = rdm.rdm().embed_core(self.n_core).spin_summed();
        let occs = orbital_occupations(self.projection, dm_full.view())?;
        tdrdm_output!("{}) t = {:.8} fs", point.index, point.time());
        tdrdm_output!("    RDM path = {}", point.directory().display());
        tdrdm_output!("    Sum of orbital occupations = {:.8}", occs.sum());
        self.table
            .write_row(point.index, point.time(), &occs.to_vec())?;
        Ok(())
    }
}
