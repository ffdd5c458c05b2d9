//! Evaluation grids and the contraction of density matrices over them.

use std::fmt;
use std::path::Path;

use anyhow::{self, ensure, format_err};
use nalgebra::{Point3, Vector3};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::auxiliary::geometry::{direction_angles, euler_zyz, ANGSTROM_TO_BOHR};
use crate::auxiliary::molecule::Molecule;
use crate::io::read_npy_array;

#[cfg(test)]
#[path = "grid_tests.rs"]
mod grid_tests;

type C128 = Complex<f64>;

/// Default margin (bohr) added around the molecule on every side of a cube grid.
pub const DEFAULT_CUBE_MARGIN: f64 = 3.0;

/// Default numbers of cube grid points along the three Cartesian axes.
pub const DEFAULT_CUBE_COUNTS: [usize; 3] = [80, 80, 80];

// ==========
// Plane grid
// ==========

fn default_roll() -> f64 {
    0.0
}

fn default_trans() -> [f64; 3] {
    [0.0, 0.0, 0.0]
}

/// Definition of a rectangular grid of points on a plane.
///
/// The plane is first laid on the $`xy`$-plane, displaced by [`Self::disp`] along $`z`$,
/// then rotated by $`R_z(\alpha) R_y(\beta) R_z(\gamma)`$ where $`\alpha`$ and $`\beta`$ are the
/// azimuthal and polar angles of [`Self::uvec`] and $`\gamma`$ is [`Self::roll`], and finally
/// translated by [`Self::trans`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaneGridDefinition {
    /// The normal of the plane. This need not be normalised but must not vanish.
    pub uvec: [f64; 3],

    /// The displacement (Å) of the plane from the origin along its normal.
    pub disp: f64,

    /// The translation (bohr) applied after the rotation.
    #[serde(default = "default_trans")]
    pub trans: [f64; 3],

    /// The first in-plane axis given as `(left, number of points, right)` in Å.
    pub bound1: (f64, usize, f64),

    /// The second in-plane axis given as `(left, number of points, right)` in Å.
    pub bound2: (f64, usize, f64),

    /// The roll angle (degrees) of the in-plane axes about the normal.
    #[serde(default = "default_roll")]
    pub roll: f64,
}

impl fmt::Display for PlaneGridDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Plane normal: ({:+.7}, {:+.7}, {:+.7})",
            self.uvec[0], self.uvec[1], self.uvec[2]
        )?;
        writeln!(f, "Displacement along normal: {:+.7} Å", self.disp)?;
        writeln!(
            f,
            "Translation: ({:+.7}, {:+.7}, {:+.7}) bohr",
            self.trans[0], self.trans[1], self.trans[2]
        )?;
        writeln!(
            f,
            "Axis 1: {} points in [{:+.4}, {:+.4}] Å",
            self.bound1.1, self.bound1.0, self.bound1.2
        )?;
        writeln!(
            f,
            "Axis 2: {} points in [{:+.4}, {:+.4}] Å",
            self.bound2.1, self.bound2.0, self.bound2.2
        )?;
        writeln!(f, "Roll: {:+.4}°", self.roll)?;
        Ok(())
    }
}

/// A rectangular grid of points on a plane.
#[derive(Clone, Debug)]
pub struct PlaneGrid {
    axis1: Array1<f64>,
    axis2: Array1<f64>,
    points: Array2<f64>,
}

impl PlaneGrid {
    /// Constructs the plane grid described by a [`PlaneGridDefinition`]. The first axis runs
    /// slowest.
    pub fn new(definition: &PlaneGridDefinition) -> Result<Self, anyhow::Error> {
        let (ax1l, nax1, ax1r) = definition.bound1;
        let (ax2l, nax2, ax2r) = definition.bound2;
        ensure!(
            nax1 > 0 && nax2 > 0,
            "Each in-plane axis must have at least one point."
        );
        let uvec = Vector3::from(definition.uvec);
        let (alpha, beta) = direction_angles(&uvec)?;
        let rot = euler_zyz(alpha, beta, definition.roll);
        let trans = Vector3::from(definition.trans);

        let axis1 = Array1::linspace(ax1l, ax1r, nax1);
        let axis2 = Array1::linspace(ax2l, ax2r, nax2);
        let ax3 = definition.disp * ANGSTROM_TO_BOHR;
        let mut points = Array2::<f64>::zeros((nax1 * nax2, 3));
        for (i1, a1) in axis1.iter().enumerate() {
            for (i2, a2) in axis2.iter().enumerate() {
                let c = Vector3::new(a1 * ANGSTROM_TO_BOHR, a2 * ANGSTROM_TO_BOHR, ax3);
                let p = rot * c + trans;
                let co = i1 * nax2 + i2;
                points[[co, 0]] = p[0];
                points[[co, 1]] = p[1];
                points[[co, 2]] = p[2];
            }
        }
        Ok(Self {
            axis1,
            axis2,
            points,
        })
    }

    /// Positions (Å) along the first in-plane axis.
    pub fn axis1(&self) -> ArrayView1<f64> {
        self.axis1.view()
    }

    /// Positions (Å) along the second in-plane axis.
    pub fn axis2(&self) -> ArrayView1<f64> {
        self.axis2.view()
    }

    /// Cartesian coordinates (bohr) of the grid points, one point per row.
    pub fn points(&self) -> ArrayView2<f64> {
        self.points.view()
    }

    /// Cartesian coordinates (Å) of the grid points, one point per row.
    pub fn points_angstrom(&self) -> Array2<f64> {
        self.points.mapv(|x| x / ANGSTROM_TO_BOHR)
    }

    /// The number of grid points.
    pub fn n_points(&self) -> usize {
        self.points.nrows()
    }
}

// =========
// Cube grid
// =========

/// A regular three-dimensional grid with axes aligned to the Cartesian axes.
#[derive(Clone, Debug, PartialEq)]
pub struct CubeGrid {
    counts: [usize; 3],
    origin: Point3<f64>,
    spacings: [f64; 3],
}

impl CubeGrid {
    /// Creates a cube grid.
    ///
    /// # Arguments
    ///
    /// * `counts` - The numbers of points along $`x`$, $`y`$, and $`z`$.
    /// * `origin` - The first grid point (bohr).
    /// * `spacings` - The spacings (bohr) along $`x`$, $`y`$, and $`z`$.
    pub fn new(
        counts: [usize; 3],
        origin: Point3<f64>,
        spacings: [f64; 3],
    ) -> Result<Self, anyhow::Error> {
        ensure!(
            counts.iter().all(|n| *n > 0),
            "A cube grid must have at least one point along every axis."
        );
        Ok(Self {
            counts,
            origin,
            spacings,
        })
    }

    /// Creates a cube grid enclosing the atoms of a molecule with a margin on every side.
    ///
    /// # Arguments
    ///
    /// * `mol` - The molecule.
    /// * `counts` - The numbers of points along $`x`$, $`y`$, and $`z`$, each at least `2`.
    /// * `margin` - The margin (bohr).
    pub fn around_molecule(
        mol: &Molecule,
        counts: [usize; 3],
        margin: f64,
    ) -> Result<Self, anyhow::Error> {
        ensure!(
            counts.iter().all(|n| *n >= 2),
            "A cube grid around a molecule must have at least two points along every axis, but {counts:?} given."
        );
        let (lower, upper) = mol.bounding_box_bohr()?;
        let origin = lower - Vector3::repeat(margin);
        let spacings = [0, 1, 2].map(|i| (upper[i] - lower[i] + 2.0 * margin) / (counts[i] - 1) as f64);
        Self::new(counts, origin, spacings)
    }

    /// The numbers of points along $`x`$, $`y`$, and $`z`$.
    pub fn counts(&self) -> [usize; 3] {
        self.counts
    }

    /// The first grid point (bohr).
    pub fn origin(&self) -> Point3<f64> {
        self.origin
    }

    /// The spacings (bohr) along $`x`$, $`y`$, and $`z`$.
    pub fn spacings(&self) -> [f64; 3] {
        self.spacings
    }

    /// The total number of grid points.
    pub fn n_points(&self) -> usize {
        self.counts.iter().product()
    }

    /// Cartesian coordinates (bohr) of the grid points, one point per row, with $`x`$ running
    /// slowest and $`z`$ running fastest.
    pub fn points(&self) -> Array2<f64> {
        let [_, ny, nz] = self.counts;
        let mut points = Array2::<f64>::zeros((self.n_points(), 3));
        for (row, mut point) in points.axis_iter_mut(Axis(0)).enumerate() {
            let ix = row / (ny * nz);
            let iy = (row / nz) % ny;
            let iz = row % nz;
            point[0] = self.origin[0] + ix as f64 * self.spacings[0];
            point[1] = self.origin[1] + iy as f64 * self.spacings[1];
            point[2] = self.origin[2] + iz as f64 * self.spacings[2];
        }
        points
    }
}

impl fmt::Display for CubeGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Cube grid: {} × {} × {} points",
            self.counts[0], self.counts[1], self.counts[2]
        )?;
        writeln!(
            f,
            "  Origin (bohr): ({:+.6}, {:+.6}, {:+.6})",
            self.origin[0], self.origin[1], self.origin[2]
        )?;
        writeln!(
            f,
            "  Spacings (bohr): ({:.6}, {:.6}, {:.6})",
            self.spacings[0], self.spacings[1], self.spacings[2]
        )?;
        Ok(())
    }
}

fn default_cube_counts() -> [usize; 3] {
    DEFAULT_CUBE_COUNTS
}

fn default_cube_margin() -> f64 {
    DEFAULT_CUBE_MARGIN
}

/// Definition of a cube grid enclosing a molecule, as read from input files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VolumeGridDefinition {
    /// The numbers of grid points along $`x`$, $`y`$, and $`z`$.
    #[serde(default = "default_cube_counts")]
    pub counts: [usize; 3],

    /// The margin (bohr) added around the atoms on every side of the box.
    #[serde(default = "default_cube_margin")]
    pub margin: f64,
}

impl VolumeGridDefinition {
    /// Builds the cube grid around a molecule.
    pub fn grid_around(&self, mol: &Molecule) -> Result<CubeGrid, anyhow::Error> {
        CubeGrid::around_molecule(mol, self.counts, self.margin)
    }
}

impl Default for VolumeGridDefinition {
    fn default() -> Self {
        Self {
            counts: DEFAULT_CUBE_COUNTS,
            margin: DEFAULT_CUBE_MARGIN,
        }
    }
}

impl fmt::Display for VolumeGridDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Grid points: {} × {} × {}",
            self.counts[0], self.counts[1], self.counts[2]
        )?;
        writeln!(f, "Box margin: {:.3} bohr", self.margin)?;
        Ok(())
    }
}

// =============
// AO evaluation
// =============

/// Trait for sources of atomic-orbital values at grid points.
pub trait AoEvaluator {
    /// The number of atomic orbitals.
    fn n_ao(&self) -> usize;

    /// Evaluates all atomic orbitals at the given points.
    ///
    /// # Arguments
    ///
    /// * `points` - Cartesian coordinates (bohr) of the points, one point per row.
    ///
    /// # Returns
    ///
    /// The AO values with shape `(number of points, number of AOs)`.
    fn evaluate(&self, points: ArrayView2<f64>) -> Result<Array2<f64>, anyhow::Error>;
}

/// Atomic-orbital values tabulated in advance on a fixed set of grid points.
#[derive(Clone, Debug)]
pub struct TabulatedAoValues {
    values: Array2<f64>,
}

impl TabulatedAoValues {
    /// Wraps AO values of shape `(number of points, number of AOs)`.
    pub fn new(values: Array2<f64>) -> Self {
        Self { values }
    }

    /// Reads tabulated AO values of shape `(number of points, number of AOs)` from a NumPy
    /// `.npy` file.
    pub fn from_npy<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        Ok(Self::new(read_npy_array(path)?))
    }
}

impl AoEvaluator for TabulatedAoValues {
    fn n_ao(&self) -> usize {
        self.values.ncols()
    }

    fn evaluate(&self, points: ArrayView2<f64>) -> Result<Array2<f64>, anyhow::Error> {
        if points.nrows() != self.values.nrows() {
            return Err(format_err!(
                "The tabulated AO values cover {} points, but {} points requested.",
                self.values.nrows(),
                points.nrows()
            ));
        }
        Ok(self.values.clone())
    }
}

// ===========
// Contraction
// ===========

/// Contracts a density matrix with basis-function values at every grid point, *i.e.*
/// $`\rho(\mathbf{r}_p) = \mathrm{Re} \sum_{ij} \phi_i(\mathbf{r}_p) D_{ij} \phi_j(\mathbf{r}_p)`$.
///
/// # Arguments
///
/// * `values` - Real basis-function values of shape `(number of points, number of functions)`.
/// * `dm` - The density matrix in the same basis.
///
/// # Returns
///
/// The density at every grid point.
pub fn contract_density(
    values: ArrayView2<f64>,
    dm: ArrayView2<C128>,
) -> Result<Array1<f64>, anyhow::Error> {
    ensure!(
        dm.nrows() == values.ncols() && dm.ncols() == values.ncols(),
        "A density matrix of shape {:?} cannot be contracted with {} basis functions.",
        dm.shape(),
        values.ncols()
    );
    let dm_re = dm.mapv(|x| x.re);
    let values_dm = values.dot(&dm_re);
    let density = values_dm
        .axis_iter(Axis(0))
        .zip(values.axis_iter(Axis(0)))
        .map(|(row_d, row_v)| row_d.dot(&row_v))
        .collect::<Array1<f64>>();
    Ok(density)
}
