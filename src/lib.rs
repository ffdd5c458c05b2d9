//! # tdrdm: time-series analysis of time-dependent one-particle reduced density matrices
//!
//! `tdrdm` post-processes the one-particle reduced density matrices (RDMs) sampled along a
//! time-dependent DMRG propagation. The samples are expected to live in `tevo-*`
//! subdirectories of one or more sample directories, each containing a `TIME_INFO` file
//! and a spin-resolved RDM stored as a NumPy `.npy` array.
//!
//! The analysis proceeds in three stages:
//! - the time points of all sample directories are collected, merged and sorted, and
//!   near-identical time points are folded together (see [`timeseries`]),
//! - the RDM of every unique time point is validated, normalised to a target electron
//!   count and spin-summed (see [`rdm`]), and
//! - the normalised RDMs are turned into observables (see [`drivers`]):
//!   * hole densities on a plane or in a volume,
//!   * static and dynamic correlation indices from natural-orbital occupations, and
//!   * occupations of arbitrary orbitals projected onto the reference orbital basis.
//!
//! Orbitals can additionally be reordered by similarity to reference orbitals, by irreducible
//! representation, by dipole projection, or by energy and occupation (see [`orbitals`]).
//!
//! Everything that requires an electronic-structure package (orbital coefficients, AO
//! overlap matrices, AO values on grid points, orbital irreducible representations) is
//! supplied to `tdrdm` as input data.
//!
//! ## Examples and usage
//!
//! The `tdrdm` binary reads a YAML input file containing a `logbook` section that
//! describes the active space and the sample directories, and a list of `tasks` to be
//! executed:
//!
//! ```text
//! tdrdm run -c input.yml -o analysis
//! ```
//!
//! A template input file can be generated with `tdrdm template -n input`. AO values are read
//! from tabulated arrays, and the points on which they must be tabulated are written by
//! `tdrdm grid -c input.yml -p points`.
//!
//! For library usage, the drivers in [`drivers`] can be constructed with their builders and
//! run via the [`drivers::TdRdmDriver`] trait. Their usages are illustrated in the test
//! functions.
//!
//! ## License
//!
//! GNU Lesser General Public License v3.0.

pub mod auxiliary;
pub mod drivers;
pub mod grid;
pub mod interfaces;
pub mod io;
pub mod orbitals;
pub mod rdm;
pub mod timeseries;
