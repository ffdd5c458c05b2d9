//! Driver for hole densities of time-evolved states relative to a reference state.
//!
//! The hole density at time $`t`$ is
//! ```math
//!     \rho_{\mathrm{h}}(\mathbf{r}, t)
//!     = \mathrm{Re} \sum_{ij} \phi_i(\mathbf{r})
//!         \left[ D^{(0)}_{ij} - D_{ij}(t) \right] \phi_j(\mathbf{r}),
//! ```
//! where $`\phi_i`$ are the active orbitals, $`\mathbf{D}^{(0)}`$ is the spin-summed RDM of the
//! reference state, and $`\mathbf{D}(t)`$ is the spin-summed RDM sampled at time $`t`$. The
//! density can be evaluated on a plane (written as a plain-text `.tpl` file) or in a volume
//! around the molecule (written as a `.tvl.cube` file).

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{self, ensure, format_err};
use derive_builder::Builder;
use log;
use ndarray::{Array2, ArrayView2};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::auxiliary::molecule::Molecule;
use crate::drivers::{ActiveSpace, SamplingSettings, TdRdmDriver};
use crate::grid::{
    contract_density, AoEvaluator, CubeGrid, PlaneGrid, PlaneGridDefinition, VolumeGridDefinition,
};
use crate::io::cube::write_cube;
use crate::io::format::{log_subtitle, log_title, nice_bool, tdrdm_output, TdRdmOutput};
use crate::io::table::write_plane_table;
use crate::io::{remove_outputs, TdRdmFileType};
use crate::rdm::eigen::{symmetry_restricted_eigh, weighted_outer_product};
use crate::rdm::{NormalisedRdm, RdmNormalisation, SpinResolvedRdm};
use crate::timeseries::scan::{ScanSummary, TimePointObserver, UniqueTimePoint};
use crate::timeseries::TimeSeries;

#[cfg(test)]
#[path = "hole_density_tests.rs"]
mod hole_density_tests;

type C128 = Complex<f64>;

fn default_true() -> bool {
    true
}

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

/// An enumerated type for the region in which hole densities are evaluated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HoleDensityGrid {
    /// Variant for a rectangular patch of a plane.
    Plane(PlaneGridDefinition),

    /// Variant for a cube enclosing the molecule.
    Volume(VolumeGridDefinition),
}

impl HoleDensityGrid {
    /// The type of the output files.
    pub fn file_type(&self) -> TdRdmFileType {
        match self {
            HoleDensityGrid::Plane(_) => TdRdmFileType::Plane,
            HoleDensityGrid::Volume(_) => TdRdmFileType::Volume,
        }
    }

    /// The output file prefix used when none is specified.
    pub fn default_prefix(&self) -> &'static str {
        match self {
            HoleDensityGrid::Plane(_) => "plane_hole",
            HoleDensityGrid::Volume(_) => "volume_hole",
        }
    }
}

/// A structure containing control parameters for hole-density evaluation.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct HoleDensityParams {
    /// The region in which hole densities are evaluated.
    pub grid: HoleDensityGrid,

    /// Boolean indicating if the reference RDM is to be normalised to one more electron than
    /// the number of active electrons of the time-dependent state.
    #[builder(default = "false")]
    #[serde(default)]
    pub normalise_reference: bool,

    /// Boolean indicating if the sampled RDMs are to be normalised to the number of active
    /// electrons.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub normalise_rdm: bool,

    /// The prefix of the output files. If `None`, `plane_hole` or `volume_hole` is used.
    #[builder(setter(into, strip_option), default = "None")]
    #[serde(default)]
    pub prefix: Option<String>,

    /// Boolean indicating if the Cartesian coordinates of the plane points are to be printed
    /// alongside the in-plane coordinates.
    #[builder(default = "false")]
    #[serde(default)]
    pub print_cartesian: bool,

    /// Boolean indicating if output files of the same type left in the sample directories by
    /// previous runs are to be deleted before each RDM is loaded.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub remove_stale_outputs: bool,

    /// Irreducible-representation labels of the active orbitals. These restrict the natural
    /// orbitals used to build volume densities to symmetry blocks.
    #[builder(default = "None")]
    #[serde(default)]
    pub irreps: Option<Vec<String>>,
}

impl HoleDensityParams {
    /// Returns a builder to construct a [`HoleDensityParams`] structure.
    pub fn builder() -> HoleDensityParamsBuilder {
        HoleDensityParamsBuilder::default()
    }

    /// The prefix of the output files.
    pub fn prefix(&self) -> &str {
        self.prefix
            .as_deref()
            .unwrap_or_else(|| self.grid.default_prefix())
    }
}

impl Default for HoleDensityParams {
    fn default() -> Self {
        Self {
            grid: HoleDensityGrid::Volume(VolumeGridDefinition::default()),
            normalise_reference: false,
            normalise_rdm: true,
            prefix: None,
            print_cartesian: false,
            remove_stale_outputs: true,
            irreps: None,
        }
    }
}

impl fmt::Display for HoleDensityParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.grid {
            HoleDensityGrid::Plane(definition) => {
                writeln!(f, "Evaluation region: plane")?;
                write!(f, "{definition}")?;
                writeln!(
                    f,
                    "Print Cartesian coordinates: {}",
                    nice_bool(self.print_cartesian)
                )?;
            }
            HoleDensityGrid::Volume(definition) => {
                writeln!(f, "Evaluation region: volume")?;
                write!(f, "{definition}")?;
            }
        }
        writeln!(
            f,
            "Normalise reference RDM: {}",
            nice_bool(self.normalise_reference)
        )?;
        writeln!(f, "Normalise sampled RDMs: {}", nice_bool(self.normalise_rdm))?;
        writeln!(
            f,
            "Output files: {}",
            self.grid.file_type().file_name(&format!("<dir>/{}-<k>", self.prefix()))
        )?;
        writeln!(
            f,
            "Remove stale output files: {}",
            nice_bool(self.remove_stale_outputs)
        )?;
        if let Some(irreps) = self.irreps.as_ref() {
            writeln!(f, "Active orbital irreps: {}", irreps.join(", "))?;
        }
        writeln!(f)?;
        Ok(())
    }
}

// ------
// Result
// ------

/// A structure to contain hole-density results.
#[derive(Clone, Debug)]
pub struct HoleDensityResult {
    /// The summary of the time-series scan.
    pub summary: ScanSummary,

    /// The written hole-density files, one per unique time point.
    pub output_files: Vec<PathBuf>,
}

// ------
// Driver
// ------

/// A driver for the evaluation of hole densities along a time series.
#[derive(Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct HoleDensityDriver<'a> {
    /// The control parameters for hole-density evaluation.
    parameters: &'a HoleDensityParams,

    /// The sorted time series of sampled RDMs.
    series: &'a TimeSeries,

    /// The active space of the sampled RDMs.
    active_space: &'a ActiveSpace,

    /// The settings for reading the sampled RDMs.
    #[builder(default = "SamplingSettings::default()")]
    sampling: SamplingSettings,

    /// The full orbital coefficient matrix in the AO basis, one orbital per column. Only the
    /// active columns are used.
    orbitals: ArrayView2<'a, f64>,

    /// The spin-resolved RDM of the reference state in the active orbital basis.
    reference_rdm: &'a SpinResolvedRdm,

    /// The source of AO values at the grid points.
    ao_evaluator: &'a dyn AoEvaluator,

    /// The molecule around which volume grids are built. Required for volume densities.
    #[builder(default = "None")]
    molecule: Option<&'a Molecule>,

    /// The result of the hole-density evaluation.
    #[builder(setter(skip), default = "None")]
    result: Option<HoleDensityResult>,
}

impl<'a> HoleDensityDriverBuilder<'a> {
    fn validate(&self) -> Result<(), String> {
        let params = self
            .parameters
            .ok_or("No hole-density parameters found.".to_string())?;
        if matches!(params.grid, HoleDensityGrid::Volume(_))
            && !matches!(self.molecule, Some(Some(_)))
        {
            return Err("A molecule is required to evaluate hole densities in a volume.".to_string());
        }
        Ok(())
    }
}

impl<'a> HoleDensityDriver<'a> {
    /// Returns a builder to construct a [`HoleDensityDriver`] structure.
    pub fn builder() -> HoleDensityDriverBuilder<'a> {
        HoleDensityDriverBuilder::default()
    }

    /// Evaluates and writes hole densities at all unique time points.
    fn evaluate_hole_densities(&mut self) -> Result<(), anyhow::Error> {
        log_title("Hole Density");
        tdrdm_output!("");
        let params = self.parameters;
        params.log_output_display();
        self.active_space.log_output_display();
        self.sampling.log_output_display();
        tdrdm_output!("");

        let nel_cas = self.active_space.nel_cas;
        let orb_act = self.active_space.active_orbitals(self.orbitals)?;
        ensure!(
            self.reference_rdm.n_orbitals() == self.active_space.n_cas,
            "The reference RDM spans {} orbitals, but the active space has {}.",
            self.reference_rdm.n_orbitals(),
            self.active_space.n_cas
        );
        ensure!(
            self.ao_evaluator.n_ao() == orb_act.nrows(),
            "The AO evaluator provides {} AOs, but the orbitals are expanded in {}.",
            self.ao_evaluator.n_ao(),
            orb_act.nrows()
        );

        let reference = if params.normalise_reference {
            self.reference_rdm.normalised(nel_cas + 1.0)?
        } else {
            self.reference_rdm.clone()
        };
        let trace = reference.trace();
        tdrdm_output!(
            "Trace of the reference RDM: {:12.8} (Re), {:12.8} (Im)",
            trace.re,
            trace.im
        );
        tdrdm_output!("");
        let dm0 = reference.spin_summed();

        let normalisation = if params.normalise_rdm {
            RdmNormalisation::to(nel_cas)
        } else {
            RdmNormalisation::default()
        };
        let scan = self.sampling.scan(self.series, normalisation)?;

        log_subtitle("Hole densities at unique time points");
        tdrdm_output!("");
        let (summary, output_files) = match &params.grid {
            HoleDensityGrid::Plane(definition) => {
                let grid = PlaneGrid::new(definition)?;
                let ao_values = self.ao_evaluator.evaluate(grid.points())?;
                let mut writer = HoleDensityWriter {
                    prefix: params.prefix(),
                    remove_stale_outputs: params.remove_stale_outputs,
                    file_type: TdRdmFileType::Plane,
                    reference_dm: dm0,
                    region: HoleDensityRegion::Plane {
                        grid: &grid,
                        orbital_values: ao_values.dot(&orb_act),
                        print_cartesian: params.print_cartesian,
                    },
                    output_files: vec![],
                };
                let summary = scan.run(&mut writer)?;
                (summary, writer.output_files)
            }
            HoleDensityGrid::Volume(definition) => {
                let molecule = self.molecule.ok_or_else(|| {
                    format_err!("A molecule is required to evaluate hole densities in a volume.")
                })?;
                let grid = definition.grid_around(molecule)?;
                grid.log_output_display();
                let ao_values = self.ao_evaluator.evaluate(grid.points().view())?;
                let irreps = params.irreps.as_deref();
                let reference_dm = natural_orbital_ao_density(orb_act, dm0.view(), irreps)?;
                let mut writer = HoleDensityWriter {
                    prefix: params.prefix(),
                    remove_stale_outputs: params.remove_stale_outputs,
                    file_type: TdRdmFileType::Volume,
                    reference_dm,
                    region: HoleDensityRegion::Volume {
                        grid: &grid,
                        molecule,
                        ao_values,
                        orbitals: orb_act.reborrow(),
                        irreps,
                    },
                    output_files: vec![],
                };
                let summary = scan.run(&mut writer)?;
                (summary, writer.output_files)
            }
        };
        tdrdm_output!("");
        summary.log_output_display();

        self.result = Some(HoleDensityResult {
            summary,
            output_files,
        });
        Ok(())
    }
}

impl<'a> TdRdmDriver for HoleDensityDriver<'a> {
    type Params = HoleDensityParams;

    type Outcome = HoleDensityResult;

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No hole-density results found."))
    }

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.evaluate_hole_densities()
    }
}

// ========
// Observer
// ========

/// The region-specific data needed to evaluate a hole density.
enum HoleDensityRegion<'g> {
    Plane {
        grid: &'g PlaneGrid,

        /// Active-orbital values at the plane points, one orbital per column.
        orbital_values: Array2<f64>,

        print_cartesian: bool,
    },
    Volume {
        grid: &'g CubeGrid,
        molecule: &'g Molecule,

        /// AO values at the cube points, one AO per column.
        ao_values: Array2<f64>,

        /// Active orbitals in the AO basis.
        orbitals: ArrayView2<'g, f64>,

        irreps: Option<&'g [String]>,
    },
}

/// Writes one hole-density file per unique time point into that time point's directory.
struct HoleDensityWriter<'g> {
    prefix: &'g str,
    remove_stale_outputs: bool,
    file_type: TdRdmFileType,

    /// The spin-summed reference density matrix, in the active orbital basis for planes and in
    /// the AO basis for volumes.
    reference_dm: Array2<C128>,

    region: HoleDensityRegion<'g>,
    output_files: Vec<PathBuf>,
}

impl<'g> TimePointObserver for HoleDensityWriter<'g> {
    fn prepare_directory(&mut self, dir: &Path) -> Result<(), anyhow::Error> {
        if self.remove_stale_outputs {
            for path in remove_outputs(dir, self.file_type)? {
                log::debug!("Removed stale output file `{}`.", path.display());
            }
        }
        Ok(())
    }

    fn observe(
        &mut self,
        point: &UniqueTimePoint,
        rdm: &NormalisedRdm,
    ) -> Result<(), anyhow::Error> {
        let raw_trace = rdm.raw_trace();
        tdrdm_output!("{}) Time point: {:.5} fs", point.index, point.time());
        tdrdm_output!("    RDM loaded from `{}`", point.directory().display());
        tdrdm_output!(
            "    Trace of the loaded RDM = {:12.8} (Re), {:12.8} (Im)",
            raw_trace.re,
            raw_trace.im
        );
        let path = point.directory().join(
            self.file_type
                .file_name(&format!("{}-{}", self.prefix, point.padded_index())),
        );
        let dm = rdm.spin_summed();
        match &self.region {
            HoleDensityRegion::Plane {
                grid,
                orbital_values,
                print_cartesian,
            } => {
                let delta = &self.reference_dm - &dm;
                let density = contract_density(orbital_values.view(), delta.view())?;
                let cartesian = print_cartesian.then(|| grid.points_angstrom());
                write_plane_table(
                    &path,
                    grid.axis1(),
                    grid.axis2(),
                    cartesian.as_ref().map(|xyz| xyz.view()),
                    "hole density",
                    density.view(),
                )?;
            }
            HoleDensityRegion::Volume {
                grid,
                molecule,
                ao_values,
                orbitals,
                irreps,
            } => {
                let dm_ao = natural_orbital_ao_density(*orbitals, dm.view(), *irreps)?;
                let delta = &self.reference_dm - &dm_ao;
                let density = contract_density(ao_values.view(), delta.view())?;
                write_cube(
                    &path,
                    &format!("Hole density at t = {:.8} fs", point.time()),
                    molecule,
                    grid,
                    density.view(),
                )?;
            }
        }
        tdrdm_output!("    Hole density written to `{}`", path.display());
        self.output_files.push(path);
        Ok(())
    }
}

// =========
// Functions
// =========

/// Transforms a density matrix from an orbital basis into the AO basis through its natural
/// orbitals, *i.e.* $`\mathbf{D}^{\mathrm{AO}} = \mathbf{N} \mathrm{diag}(\boldsymbol{\eta})
/// \mathbf{N}^{\dagger}`$ with $`\mathbf{N} = \mathbf{C}\mathbf{U}`$.
///
/// # Arguments
///
/// * `orbitals` - The orbitals in the AO basis, one per column.
/// * `dm` - The density matrix in the orbital basis.
/// * `irreps` - Optional irreducible-representation labels of the orbitals restricting the
/// natural orbitals to symmetry blocks.
pub fn natural_orbital_ao_density(
    orbitals: ArrayView2<f64>,
    dm: ArrayView2<C128>,
    irreps: Option<&[String]>,
) -> Result<Array2<C128>, anyhow::Error> {
    ensure!(
        orbitals.ncols() == dm.nrows(),
        "{} orbitals cannot carry a density matrix of shape {:?}.",
        orbitals.ncols(),
        dm.shape()
    );
    let (occupations, natorbs) = symmetry_restricted_eigh(dm, irreps)?;
    let natorbs_ao = orbitals.mapv(|x| C128::new(x, 0.0)).dot(&natorbs);
    weighted_outer_product(natorbs_ao.view(), occupations.view())
}
