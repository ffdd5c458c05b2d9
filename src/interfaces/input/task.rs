//! Tasks that can be requested in a tdrdm input file, together with the files they read.

use std::path::{Path, PathBuf};

use anyhow::{self, format_err, Context};
use ndarray::{Array2, Ix1, Ix3};
use serde::{Deserialize, Serialize};

use crate::auxiliary::molecule::Molecule;
use crate::drivers::hole_density::{HoleDensityDriver, HoleDensityGrid, HoleDensityParams};
use crate::drivers::local_correlation::{
    LocalCorrelationDriver, LocalCorrelationParams, DEFAULT_CORRELATION_COUNTS,
};
use crate::drivers::orbital_alignment::{OrbitalAlignmentDriver, OrbitalAlignmentParams};
use crate::drivers::orbital_occupation::{OrbitalOccupationDriver, OrbitalOccupationParams};
use crate::drivers::{ActiveSpace, SamplingSettings, TdRdmDriver};
use crate::grid::{
    AoEvaluator, PlaneGrid, TabulatedAoValues, VolumeGridDefinition, DEFAULT_CUBE_MARGIN,
};
use crate::interfaces::input::ConfigurationError;
use crate::io::read_npy_array;
use crate::rdm::SpinResolvedRdm;
use crate::timeseries::TimeSeries;

/// Reads a real two-dimensional array from a NumPy `.npy` file, naming its role on failure.
fn read_matrix(path: &Path, role: &str) -> Result<Array2<f64>, anyhow::Error> {
    read_npy_array(path)
        .with_context(|| format!("Unable to read {role} from `{}`", path.display()))
}

// ==================
// Shared task inputs
// ==================

/// The data shared by all tasks of an input file, as described by its logbook.
pub struct TaskContext {
    /// The active space of the sampled RDMs.
    pub active_space: ActiveSpace,

    /// The settings for reading the sampled RDMs.
    pub sampling: SamplingSettings,

    /// The orbital coefficients in the AO basis, one orbital per column.
    pub orbitals: Array2<f64>,

    /// The sorted time series of sampled RDMs, if any task requires it.
    pub series: Option<TimeSeries>,

    /// The molecule, if an XYZ file has been given.
    pub molecule: Option<Molecule>,
}

impl TaskContext {
    fn series(&self) -> Result<&TimeSeries, anyhow::Error> {
        self.series
            .as_ref()
            .ok_or_else(|| format_err!("No time series has been collected."))
    }

    fn molecule(&self, purpose: &str) -> Result<&Molecule, anyhow::Error> {
        self.molecule.as_ref().ok_or_else(|| {
            format_err!(ConfigurationError(format!(
                "an `xyz` file in the logbook is required for {purpose}"
            )))
        })
    }
}

// ================
// Task definitions
// ================

/// Hole-density evaluation on a plane or in a volume.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HoleDensityTask {
    /// The `.npy` file of the reference-state RDM in the active orbitals.
    pub reference_rdm: PathBuf,

    /// The `.npy` file of AO values tabulated on the grid points, of shape
    /// `(number of points, number of AOs)`.
    pub ao_values: PathBuf,

    /// The control parameters.
    #[serde(default)]
    pub parameters: HoleDensityParams,
}

/// Evaluation of static and dynamic correlation indices.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LocalCorrelationTask {
    /// The `.npy` file of AO values tabulated on the cube points. Required if correlation
    /// densities are requested.
    #[serde(default)]
    pub ao_values: Option<PathBuf>,

    /// The control parameters.
    #[serde(default)]
    pub parameters: LocalCorrelationParams,
}

/// Evaluation of the occupations of arbitrary orbitals.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OrbitalOccupationTask {
    /// The `.npy` file of the AO overlap matrix.
    pub overlap: PathBuf,

    /// The `.npy` file of the orbitals whose occupations are sought, one per column.
    pub target_orbitals: PathBuf,

    /// The control parameters.
    #[serde(default)]
    pub parameters: OrbitalOccupationParams,
}

/// Reordering of orbitals.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OrbitalAlignmentTask {
    /// The `.npy` file of the orbitals to be reordered. If `None`, the logbook orbitals are
    /// reordered.
    #[serde(default)]
    pub orbitals: Option<PathBuf>,

    /// The `.npy` file of the reference orbitals.
    #[serde(default)]
    pub reference_orbitals: Option<PathBuf>,

    /// The `.npy` file of the AO overlap matrix.
    #[serde(default)]
    pub overlap: Option<PathBuf>,

    /// The irreducible-representation label of each orbital.
    #[serde(default)]
    pub irreps: Option<Vec<String>>,

    /// The `.npy` file of the AO dipole integrals of shape `(3, nAO, nAO)`.
    #[serde(default)]
    pub dipole_ao: Option<PathBuf>,

    /// The `.npy` file of the orbital occupation numbers.
    #[serde(default)]
    pub occupations: Option<PathBuf>,

    /// The `.npy` file of the orbital energies.
    #[serde(default)]
    pub energies: Option<PathBuf>,

    /// The control parameters.
    #[serde(default)]
    pub parameters: OrbitalAlignmentParams,
}

/// An enumerated type for the tasks that can be requested in an input file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Task {
    HoleDensity(HoleDensityTask),
    LocalCorrelation(LocalCorrelationTask),
    OrbitalOccupation(OrbitalOccupationTask),
    OrbitalAlignment(OrbitalAlignmentTask),
}

impl Task {
    /// Returns one task of each kind, populated with default parameters.
    pub fn templates() -> Vec<Task> {
        vec![
            Task::HoleDensity(HoleDensityTask {
                reference_rdm: PathBuf::from("rdm_reference.npy"),
                ao_values: PathBuf::from("ao_values_volume.npy"),
                parameters: HoleDensityParams::default(),
            }),
            Task::LocalCorrelation(LocalCorrelationTask {
                ao_values: Some(PathBuf::from("ao_values_corr.npy")),
                parameters: LocalCorrelationParams {
                    densities: Some(VolumeGridDefinition {
                        counts: DEFAULT_CORRELATION_COUNTS,
                        margin: DEFAULT_CUBE_MARGIN,
                    }),
                    ..LocalCorrelationParams::default()
                },
            }),
            Task::OrbitalOccupation(OrbitalOccupationTask {
                overlap: PathBuf::from("overlap.npy"),
                target_orbitals: PathBuf::from("orbitals_target.npy"),
                parameters: OrbitalOccupationParams::default(),
            }),
            Task::OrbitalAlignment(OrbitalAlignmentTask {
                reference_orbitals: Some(PathBuf::from("orbitals_reference.npy")),
                overlap: Some(PathBuf::from("overlap.npy")),
                parameters: OrbitalAlignmentParams {
                    output: Some(PathBuf::from("orbitals_aligned.npy")),
                    ..OrbitalAlignmentParams::default()
                },
                ..OrbitalAlignmentTask::default()
            }),
        ]
    }

    /// Boolean indicating if this task scans the time series of sampled RDMs.
    pub fn needs_series(&self) -> bool {
        !matches!(self, Task::OrbitalAlignment(_))
    }

    /// Returns the Cartesian coordinates (bohr) of the points, one point per row, at which this
    /// task expects its tabulated AO values, or `None` if the task does not evaluate AOs.
    ///
    /// # Arguments
    ///
    /// * `molecule` - The molecule from the logbook, required for grids built around it.
    pub fn grid_points(
        &self,
        molecule: Option<&Molecule>,
    ) -> Result<Option<Array2<f64>>, anyhow::Error> {
        let require_molecule = |purpose: &str| {
            molecule.ok_or_else(|| {
                format_err!(ConfigurationError(format!(
                    "an `xyz` file in the logbook is required for {purpose}"
                )))
            })
        };
        match self {
            Task::HoleDensity(task) => match &task.parameters.grid {
                HoleDensityGrid::Plane(definition) => {
                    Ok(Some(PlaneGrid::new(definition)?.points().to_owned()))
                }
                HoleDensityGrid::Volume(definition) => Ok(Some(
                    definition
                        .grid_around(require_molecule("volume hole densities")?)?
                        .points(),
                )),
            },
            Task::LocalCorrelation(task) => task
                .parameters
                .densities
                .as_ref()
                .map(|definition| -> Result<Array2<f64>, anyhow::Error> {
                    Ok(definition
                        .grid_around(require_molecule("correlation densities")?)?
                        .points())
                })
                .transpose(),
            Task::OrbitalOccupation(_) | Task::OrbitalAlignment(_) => Ok(None),
        }
    }

    /// Runs the task.
    pub fn run(&self, context: &TaskContext) -> Result<(), anyhow::Error> {
        match self {
            Task::HoleDensity(task) => task.run(context),
            Task::LocalCorrelation(task) => task.run(context),
            Task::OrbitalOccupation(task) => task.run(context),
            Task::OrbitalAlignment(task) => task.run(context),
        }
    }
}

// =============
// Task handling
// =============

impl HoleDensityTask {
    fn run(&self, context: &TaskContext) -> Result<(), anyhow::Error> {
        let reference_rdm =
            SpinResolvedRdm::from_npy(&self.reference_rdm, context.sampling.spin_label)
                .with_context(|| {
                    format!(
                        "Unable to read the reference RDM from `{}`",
                        self.reference_rdm.display()
                    )
                })?;
        let ao_values = TabulatedAoValues::from_npy(&self.ao_values).with_context(|| {
            format!("Unable to read AO values from `{}`", self.ao_values.display())
        })?;
        let molecule = context.molecule.as_ref();
        let mut driver = HoleDensityDriver::builder()
            .parameters(&self.parameters)
            .series(context.series()?)
            .active_space(&context.active_space)
            .sampling(context.sampling.clone())
            .orbitals(context.orbitals.view())
            .reference_rdm(&reference_rdm)
            .ao_evaluator(&ao_values as &dyn AoEvaluator)
            .molecule(molecule)
            .build()
            .map_err(|err| format_err!(ConfigurationError(err.to_string())))?;
        driver.run()
    }
}

impl LocalCorrelationTask {
    fn run(&self, context: &TaskContext) -> Result<(), anyhow::Error> {
        let ao_values = self
            .ao_values
            .as_ref()
            .map(|path| {
                TabulatedAoValues::from_npy(path).with_context(|| {
                    format!("Unable to read AO values from `{}`", path.display())
                })
            })
            .transpose()?;
        let molecule = if self.parameters.densities.is_some() {
            Some(context.molecule("correlation densities")?)
        } else {
            None
        };
        let mut driver = LocalCorrelationDriver::builder()
            .parameters(&self.parameters)
            .series(context.series()?)
            .active_space(&context.active_space)
            .sampling(context.sampling.clone())
            .orbitals(Some(context.orbitals.view()))
            .ao_evaluator(ao_values.as_ref().map(|ao| ao as &dyn AoEvaluator))
            .molecule(molecule)
            .build()
            .map_err(|err| format_err!(ConfigurationError(err.to_string())))?;
        driver.run()
    }
}

impl OrbitalOccupationTask {
    fn run(&self, context: &TaskContext) -> Result<(), anyhow::Error> {
        let overlap = read_matrix(&self.overlap, "the AO overlap matrix")?;
        let target_orbitals = read_matrix(&self.target_orbitals, "the target orbitals")?;
        let mut driver = OrbitalOccupationDriver::builder()
            .parameters(&self.parameters)
            .series(context.series()?)
            .active_space(&context.active_space)
            .sampling(context.sampling.clone())
            .reference_orbitals(context.orbitals.view())
            .overlap(overlap.view())
            .target_orbitals(target_orbitals.view())
            .build()
            .map_err(|err| format_err!(ConfigurationError(err.to_string())))?;
        driver.run()
    }
}

impl OrbitalAlignmentTask {
    fn run(&self, context: &TaskContext) -> Result<(), anyhow::Error> {
        let orbitals = self
            .orbitals
            .as_ref()
            .map(|path| read_matrix(path, "the orbitals to be aligned"))
            .transpose()?;
        let reference_orbitals = self
            .reference_orbitals
            .as_ref()
            .map(|path| read_matrix(path, "the reference orbitals"))
            .transpose()?;
        let overlap = self
            .overlap
            .as_ref()
            .map(|path| read_matrix(path, "the AO overlap matrix"))
            .transpose()?;
        let dipole_ao = self
            .dipole_ao
            .as_ref()
            .map(|path| {
                read_npy_array::<f64, Ix3, _>(path).with_context(|| {
                    format!("Unable to read AO dipole integrals from `{}`", path.display())
                })
            })
            .transpose()?;
        let occupations = self
            .occupations
            .as_ref()
            .map(|path| {
                read_npy_array::<f64, Ix1, _>(path).with_context(|| {
                    format!("Unable to read orbital occupations from `{}`", path.display())
                })
            })
            .transpose()?;
        let energies = self
            .energies
            .as_ref()
            .map(|path| {
                read_npy_array::<f64, Ix1, _>(path).with_context(|| {
                    format!("Unable to read orbital energies from `{}`", path.display())
                })
            })
            .transpose()?;

        let mut driver = OrbitalAlignmentDriver::builder()
            .parameters(&self.parameters)
            .orbitals(
                orbitals
                    .as_ref()
                    .map(|orbs| orbs.view())
                    .unwrap_or_else(|| context.orbitals.view()),
            )
            .reference_orbitals(reference_orbitals.as_ref().map(|orbs| orbs.view()))
            .overlap(overlap.as_ref().map(|ovl| ovl.view()))
            .irreps(self.irreps.as_deref())
            .dipole_ao(dipole_ao.as_ref().map(|dip| dip.view()))
            .occupations(occupations.as_ref().map(|occs| occs.view()))
            .energies(energies.as_ref().map(|ergs| ergs.view()))
            .build()
            .map_err(|err| format_err!(ConfigurationError(err.to_string())))?;
        driver.run()
    }
}
