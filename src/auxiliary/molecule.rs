//! Molecular geometries used to frame volumetric grids.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{self, ensure, format_err, Context};
use nalgebra::Point3;

use crate::auxiliary::atom::{Atom, ElementMap};

#[cfg(test)]
#[path = "molecule_tests.rs"]
mod molecule_tests;

/// A struct containing the atoms constituting a molecule.
#[derive(Clone, Debug)]
pub struct Molecule {
    /// The atoms constituting this molecule.
    pub atoms: Vec<Atom>,
}

impl Molecule {
    /// Parses the contents of an `xyz` file.
    ///
    /// # Arguments
    ///
    /// * `contents` - The contents of an `xyz` file with coordinates in Ångström.
    ///
    /// # Returns
    ///
    /// The parsed [`Molecule`].
    pub fn from_xyz_str(contents: &str) -> Result<Self, anyhow::Error> {
        let emap = ElementMap::new();
        let mut lines = contents.lines();
        let n_atoms = lines
            .next()
            .ok_or_else(|| format_err!("Empty `xyz` contents."))?
            .trim()
            .parse::<usize>()
            .map_err(|err| format_err!("Unable to parse the number of atoms: {err}."))?;
        let atoms = lines
            .skip(1)
            .filter(|line| !line.trim().is_empty())
            .map(|line| Atom::from_xyz(line, &emap))
            .collect::<Result<Vec<_>, _>>()?;
        ensure!(
            atoms.len() == n_atoms,
            "Expected {n_atoms} atoms, got {} instead.",
            atoms.len()
        );
        Ok(Molecule { atoms })
    }

    /// Parses an `xyz` file to construct a molecule.
    ///
    /// # Arguments
    ///
    /// * `filename` - The `xyz` file to be parsed.
    pub fn from_xyz<P: AsRef<Path>>(filename: P) -> Result<Self, anyhow::Error> {
        let contents = fs::read_to_string(filename.as_ref()).with_context(|| {
            format!("Unable to read the xyz file `{}`", filename.as_ref().display())
        })?;
        Self::from_xyz_str(&contents)
            .with_context(|| format!("Unable to parse `{}`", filename.as_ref().display()))
    }

    /// Returns the lower and upper corners, in bohr, of the axis-aligned box enclosing all atoms.
    pub fn bounding_box_bohr(&self) -> Result<(Point3<f64>, Point3<f64>), anyhow::Error> {
        ensure!(!self.atoms.is_empty(), "The molecule contains no atoms.");
        let init = (
            Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        );
        Ok(self.atoms.iter().fold(init, |(lower, upper), atom| {
            let c = atom.coordinates_bohr();
            (
                Point3::new(lower[0].min(c[0]), lower[1].min(c[1]), lower[2].min(c[2])),
                Point3::new(upper[0].max(c[0]), upper[1].max(c[1]), upper[2].max(c[2])),
            )
        }))
    }
}

impl fmt::Display for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Molecule ({} atoms, Å):", self.atoms.len())?;
        for atom in self.atoms.iter() {
            writeln!(f, "{atom}")?;
        }
        Ok(())
    }
}
