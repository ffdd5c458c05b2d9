//! Driver for static and dynamic correlation indices along a time series.
//!
//! For natural spin-orbital occupations $`\eta_i`$, the static and dynamic contributions are
//! ```math
//!     o^{\mathrm{s}}_i = \tfrac{1}{2} \eta_i (1 - \eta_i),
//!     \qquad
//!     o^{\mathrm{d}}_i = \tfrac{1}{4} \left[ \sqrt{\eta_i (1 - \eta_i)} - 2 \eta_i (1 - \eta_i) \right],
//! ```
//! and the global indices are their sums over all natural spin-orbitals. Weighting the natural
//! orbitals by these contributions gives correlation density matrices that can be plotted in
//! space.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{self, ensure, format_err};
use derive_builder::Builder;
use log;
use ndarray::{Array2, ArrayView2, Axis};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::auxiliary::molecule::Molecule;
use crate::drivers::{ActiveSpace, SamplingSettings, TdRdmDriver};
use crate::grid::{contract_density, AoEvaluator, CubeGrid, VolumeGridDefinition};
use crate::io::cube::write_cube;
use crate::io::format::{log_subtitle, log_title, nice_bool, tdrdm_output, TdRdmOutput};
use crate::io::table::{ObservableTable, TableLayout};
use crate::io::TdRdmFileType;
use crate::rdm::eigen::{symmetry_restricted_eigh, weighted_outer_product};
use crate::rdm::{NormalisedRdm, RdmNormalisation, SpinResolvedRdm};
use crate::timeseries::scan::{ScanSummary, TimePointObserver, UniqueTimePoint};
use crate::timeseries::TimeSeries;


type C128 = Complex<f64>;

/// Default path of the correlation-index table.
pub const DEFAULT_CORRELATION_TABLE: &str = "corr_id";

/// Default numbers of cube grid points for correlation densities.
pub const DEFAULT_CORRELATION_COUNTS: [usize; 3] = [30, 30, 30];

fn default_table() -> PathBuf {
    PathBuf::from(DEFAULT_CORRELATION_TABLE)
}

// =========
// Functions
// =========

/// The static-correlation contribution of a natural spin-orbital with occupation `eta`.
pub fn static_contribution(eta: f64) -> f64 {
    0.5 * eta * (1.0 - eta)
}

/// The dynamic-correlation contribution of a natural spin-orbital with occupation `eta`.
/// Occupations marginally outside $`[0, 1]`$ contribute no square-root term.
pub fn dynamic_contribution(eta: f64) -> f64 {
    let x = eta * (1.0 - eta);
    0.25 * (x.max(0.0).sqrt() - 2.0 * x)
}

/// Computes natural spin-orbital occupations and correlation contributions of a spin-resolved
/// RDM.
///
/// # Arguments
///
/// * `rdm` - The spin-resolved RDM in an orthonormal orbital basis. Core orbitals may be
/// omitted since they do not contribute.
/// * `irreps` - Optional irreducible-representation labels of the orbitals restricting the
/// natural orbitals to symmetry blocks.
/// * `with_density` - Boolean indicating if the correlation density matrices are to be
/// computed.
///
/// # Returns
///
/// The correlation indices. The density matrices, if requested, are expressed in the orbital
/// basis of `rdm`.
pub fn calc_correlation(
    rdm: &SpinResolvedRdm,
    irreps: Option<&[String]>,
    with_density: bool,
) -> Result<CorrelationIndices, anyhow::Error> {
    let n = rdm.n_orbitals();
    let mut occupations = Array2::<f64>::zeros((2, n));
    let mut natural_orbitals = Vec::with_capacity(2);
    for spin in 0..2 {
        let (eta, natorbs) = symmetry_restricted_eigh(rdm.spin_block(spin), irreps)?;
        occupations.row_mut(spin).assign(&eta);
        natural_orbitals.push(natorbs);
    }
    let static_contributions = occupations.mapv(static_contribution);
    let dynamic_contributions = occupations.mapv(dynamic_contribution);

    let (static_density, dynamic_density) = if with_density {
        let mut corr_s = Array2::<C128>::zeros((n, n));
        let mut corr_d = Array2::<C128>::zeros((n, n));
        for (spin, natorbs) in natural_orbitals.iter().enumerate() {
            corr_s = corr_s
                + weighted_outer_product(natorbs.view(), static_contributions.row(spin))?;
            corr_d = corr_d
                + weighted_outer_product(natorbs.view(), dynamic_contributions.row(spin))?;
        }
        (Some(corr_s), Some(corr_d))
    } else {
        (None, None)
    };

    Ok(CorrelationIndices {
        occupations,
        static_contributions,
        dynamic_contributions,
        static_density,
        dynamic_density,
    })
}

// ==================
// Struct definitions
// ==================

/// Natural-orbital occupations and the correlation measures derived from them.
#[derive(Clone, Debug)]
pub struct CorrelationIndices {
    /// Natural spin-orbital occupations of shape `(2, n)`, ascending within each spin.
    pub occupations: Array2<f64>,

    /// Static-correlation contributions of shape `(2, n)`.
    pub static_contributions: Array2<f64>,

    /// Dynamic-correlation contributions of shape `(2, n)`.
    pub dynamic_contributions: Array2<f64>,

    /// The static-correlation density matrix, if computed.
    pub static_density: Option<Array2<C128>>,

    /// The dynamic-correlation density matrix, if computed.
    pub dynamic_density: Option<Array2<C128>>,
}

impl CorrelationIndices {
    /// The global static-correlation index.
    pub fn static_index(&self) -> f64 {
        self.static_contributions.sum()
    }

    /// The global dynamic-correlation index.
    pub fn dynamic_index(&self) -> f64 {
        self.dynamic_contributions.sum()
    }
}

// ----------
// Parameters
// ----------

/// A structure containing control parameters for correlation-index evaluation.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct LocalCorrelationParams {
    /// The path of the table of correlation indices.
    #[builder(setter(into), default = "default_table()")]
    #[serde(default = "default_table")]
    pub table: PathBuf,

    /// Boolean indicating if the sampled RDMs are to be normalised to the number of active
    /// electrons before diagonalisation.
    #[builder(default = "false")]
    #[serde(default)]
    pub normalise_rdm: bool,

    /// Irreducible-representation labels of the active orbitals.
    #[builder(default = "None")]
    #[serde(default)]
    pub irreps: Option<Vec<String>>,

    /// The cube grid on which correlation densities are written. If `None`, no correlation
    /// densities are computed.
    #[builder(default = "None")]
    #[serde(default)]
    pub densities: Option<VolumeGridDefinition>,
}

impl LocalCorrelationParams {
    /// Returns a builder to construct a [`LocalCorrelationParams`] structure.
    pub fn builder() -> LocalCorrelationParamsBuilder {
        LocalCorrelationParamsBuilder::default()
    }
}

impl Default for LocalCorrelationParams {
    fn default() -> Self {
        Self {
            table: default_table(),
            normalise_rdm: false,
            irreps: None,
            densities: None,
        }
    }
}

impl fmt::Display for LocalCorrelationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Correlation index table: {}", self.table.display())?;
        writeln!(f, "Normalise sampled RDMs: {}", nice_bool(self.normalise_rdm))?;
        if let Some(irreps) = self.irreps.as_ref() {
            writeln!(f, "Active orbital irreps: {}", irreps.join(", "))?;
        }
        match self.densities.as_ref() {
            Some(definition) => {
                writeln!(f, "Write correlation densities: yes")?;
                write!(f, "{definition}")?;
            }
            None => writeln!(f, "Write correlation densities: no")?,
        }
        writeln!(f)?;
        Ok(())
    }
}

// ------
// Result
// ------

/// A structure to contain correlation-index results.
#[derive(Clone, Debug)]
pub struct LocalCorrelationResult {
    /// The summary of the time-series scan.
    pub summary: ScanSummary,

    /// The path of the written table of correlation indices.
    pub table: PathBuf,

    /// The written correlation-density cube files, static and dynamic for each unique time
    /// point.
    pub density_files: Vec<PathBuf>,
}

// ------
// Driver
// ------

/// A driver for the evaluation of correlation indices along a time series.
#[derive(Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct LocalCorrelationDriver<'a> {
    /// The control parameters for correlation-index evaluation.
    parameters: &'a LocalCorrelationParams,

    /// The sorted time series of sampled RDMs.
    series: &'a TimeSeries,

    /// The active space of the sampled RDMs.
    active_space: &'a ActiveSpace,

    /// The settings for reading the sampled RDMs.
    #[builder(default = "SamplingSettings::default()")]
    sampling: SamplingSettings,

    /// The full orbital coefficient matrix in the AO basis. Required for correlation densities.
    #[builder(default = "None")]
    orbitals: Option<ArrayView2<'a, f64>>,

    /// The source of AO values at the cube points. Required for correlation densities.
    #[builder(default = "None")]
    ao_evaluator: Option<&'a dyn AoEvaluator>,

    /// The molecule around which the cube grid is built. Required for correlation densities.
    #[builder(default = "None")]
    molecule: Option<&'a Molecule>,

    /// The result of the correlation-index evaluation.
    #[builder(setter(skip), default = "None")]
    result: Option<LocalCorrelationResult>,
}

impl<'a> LocalCorrelationDriverBuilder<'a> {
    fn validate(&self) -> Result<(), String> {
        let params = self
            .parameters
            .ok_or("No local-correlation parameters found.".to_string())?;
        if params.densities.is_some() {
            let orbitals = matches!(self.orbitals, Some(Some(_)));
            let ao = matches!(self.ao_evaluator, Some(Some(_)));
            let molecule = matches!(self.molecule, Some(Some(_)));
            if !(orbitals && ao && molecule) {
                return Err(
                    "Orbitals, AO values, and a molecule are all required for correlation densities."
                        .to_string(),
                );
            }
        }
        Ok(())
    }
}

impl<'a> LocalCorrelationDriver<'a> {
    /// Returns a builder to construct a [`LocalCorrelationDriver`] structure.
    pub fn builder() -> LocalCorrelationDriverBuilder<'a> {
        LocalCorrelationDriverBuilder::default()
    }

    /// Prepares the cube grid and the active-orbital values on it.
    fn prepare_density_output(
        &self,
        definition: &VolumeGridDefinition,
    ) -> Result<(CubeGrid, &'a Molecule, Array2<f64>), anyhow::Error> {
        let molecule = self
            .molecule
            .ok_or_else(|| format_err!("No molecule found for correlation densities."))?;
        let orbitals = self
            .orbitals
            .ok_or_else(|| format_err!("No orbitals found for correlation densities."))?;
        let ao_evaluator = self
            .ao_evaluator
            .ok_or_else(|| format_err!("No AO values found for correlation densities."))?;
        let orb_act = self.active_space.active_orbitals(orbitals)?;
        ensure!(
            ao_evaluator.n_ao() == orb_act.nrows(),
            "The AO evaluator provides {} AOs, but the orbitals are expanded in {}.",
            ao_evaluator.n_ao(),
            orb_act.nrows()
        );
        let grid = definition.grid_around(molecule)?;
        grid.log_output_display();
        let orbital_values = ao_evaluator.evaluate(grid.points().view())?.dot(&orb_act);
        Ok((grid, molecule, orbital_values))
    }

    /// Evaluates and writes correlation indices at all unique time points.
    fn evaluate_correlation(&mut self) -> Result<(), anyhow::Error> {
        log_title("Local Correlation");
        tdrdm_output!("");
        let params = self.parameters;
        params.log_output_display();
        self.active_space.log_output_display();
        self.sampling.log_output_display();
        tdrdm_output!("");

        let normalisation = if params.normalise_rdm {
            RdmNormalisation::to(self.active_space.nel_cas)
        } else {
            RdmNormalisation::default()
        };
        let scan = self.sampling.scan(self.series, normalisation)?;

        let density_output = params
            .densities
            .as_ref()
            .map(|definition| self.prepare_density_output(definition))
            .transpose()?;
        let table = ObservableTable::create(
            &params.table,
            &TableLayout {
                leading: '#',
                time_labels: ("No.".to_string(), "Time (fs)".to_string()),
                value_labels: vec!["Static id.".to_string(), "Dynamic id.".to_string()],
            },
        )?;

        log_subtitle("Correlation indices at unique time points");
        tdrdm_output!("");
        let mut writer = CorrelationWriter {
            table,
            irreps: params.irreps.as_deref(),
            density_output: density_output
                .as_ref()
                .map(|(grid, molecule, orbital_values)| DensityOutput {
                    grid,
                    molecule: *molecule,
                    orbital_values,
                }),
            density_files: vec![],
        };
        let summary = scan.run(&mut writer)?;
        tdrdm_output!("");
        summary.log_output_display();

        self.result = Some(LocalCorrelationResult {
            summary,
            table: writer.table.path().to_path_buf(),
            density_files: writer.density_files,
        });
        Ok(())
    }
}

impl<'a> TdRdmDriver for LocalCorrelationDriver<'a> {
    type Params = LocalCorrelationParams;

    type Outcome = LocalCorrelationResult;

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No local-correlation results found."))
    }

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.evaluate_correlation()
    }
}

// ========
// Observer
// ========

struct DensityOutput<'g> {
    grid: &'g CubeGrid,
    molecule: &'g Molecule,

    /// Active-orbital values at the cube points, one orbital per column.
    orbital_values: &'g Array2<f64>,
}

/// Appends correlation indices to a table and optionally writes correlation densities into
/// the directory of each unique time point.
struct CorrelationWriter<'g> {
    table: ObservableTable,
    irreps: Option<&'g [String]>,
    density_output: Option<DensityOutput<'g>>,
    density_files: Vec<PathBuf>,
}

impl<'g> CorrelationWriter<'g> {
    fn write_density(
        &mut self,
        dir: &Path,
        name: String,
        comment: &str,
        dm: &Array2<C128>,
    ) -> Result<(), anyhow::Error> {
        let Some(output) = self.density_output.as_ref() else {
            return Ok(());
        };
        let density = contract_density(output.orbital_values.view(), dm.view())?;
        let path = dir.join(TdRdmFileType::Cube.file_name(&name));
        write_cube(&path, comment, output.molecule, output.grid, density.view())?;
        tdrdm_output!("    Correlation density written to `{}`", path.display());
        self.density_files.push(path);
        Ok(())
    }
}

impl<'g> TimePointObserver for CorrelationWriter<'g> {
    fn observe(
        &mut self,
        point: &UniqueTimePoint,
        rdm: &NormalisedRdm,
    ) -> Result<(), anyhow::Error> {
        let indices = calc_correlation(rdm.rdm(), self.irreps, self.density_output.is_some())?;
        let (i_s, i_d) = (indices.static_index(), indices.dynamic_index());
        tdrdm_output!(
            "{}) t = {:13.8} fs  static = {i_s:.6e}  dynamic = {i_d:.6e}",
            point.index,
            point.time()
        );
        let occupations = indices
            .occupations
            .axis_iter(Axis(0))
            .map(|row| format!("{row:.6}"))
            .collect::<Vec<_>>();
        log::debug!(
            "Natural spin-orbital occupations at {:.8} fs: alpha {}, beta {}",
            point.time(),
            occupations[0],
            occupations[1]
        );
        self.table.write_row(point.index, point.time(), &[i_s, i_d])?;

        if let (Some(corr_s), Some(corr_d)) = (
            indices.static_density.as_ref(),
            indices.dynamic_density.as_ref(),
        ) {
            let k = point.padded_index();
            self.write_density(
                point.directory(),
                format!("corr-s{k}"),
                &format!("Static correlation density at t = {:.8} fs", point.time()),
                corr_s,
            )?;
            self.write_density(
                point.directory(),
                format!("corr-d{k}"),
                &format!("Dynamic correlation density at t = {:.8} fs", point.time()),
                corr_d,
            )?;
        }
        Ok(())
    }
}
