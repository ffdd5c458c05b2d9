//! Atoms read in from XYZ geometries.

use std::collections::HashMap;
use std::fmt;

use anyhow::{self, format_err};
use nalgebra::Point3;
use periodic_table;

use crate::auxiliary::geometry::ANGSTROM_TO_BOHR;

/// A struct storing a look-up of element symbols to give atomic numbers.
pub struct ElementMap<'a> {
    /// A [HashMap] from a symbol string to an atomic number.
    pub map: HashMap<&'a str, u32>,
}

impl Default for ElementMap<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementMap<'static> {
    /// Creates a new [`ElementMap`] for all elements in the periodic table.
    #[must_use]
    pub fn new() -> ElementMap<'static> {
        let map = periodic_table::periodic_table()
            .into_iter()
            .map(|element| (element.symbol, element.atomic_number))
            .collect::<HashMap<_, _>>();
        ElementMap { map }
    }
}

/// A struct representing an atom.
#[derive(Clone, PartialEq)]
pub struct Atom {
    /// The atomic number of the atom.
    pub atomic_number: u32,

    /// The atomic symbol of the atom.
    pub atomic_symbol: String,

    /// The position of the atom in Ångström.
    pub coordinates: Point3<f64>,
}

impl Atom {
    /// Parses an atom line in an `xyz` file to construct an [`Atom`].
    ///
    /// # Arguments
    ///
    /// * `line` - A line in an `xyz` file containing an atomic symbol and three Cartesian
    /// coordinates in Ångström.
    /// * `emap` - A hash map between atomic symbols and atomic numbers.
    ///
    /// # Returns
    ///
    /// The parsed [`Atom`], or an error if the line does not have the correct format.
    pub fn from_xyz(line: &str, emap: &ElementMap) -> Result<Atom, anyhow::Error> {
        let split = line.split_whitespace().collect::<Vec<_>>();
        if split.len() != 4 {
            return Err(format_err!(
                "Expected an atomic symbol and three coordinates, but found `{line}`."
            ));
        }
        let atomic_symbol = split[0];
        let atomic_number = *emap
            .map
            .get(atomic_symbol)
            .ok_or_else(|| format_err!("Invalid atomic symbol `{atomic_symbol}` encountered."))?;
        let xyz = split[1..]
            .iter()
            .map(|s| {
                s.parse::<f64>()
                    .map_err(|err| format_err!("Unable to parse the coordinate `{s}`: {err}."))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Atom {
            atomic_number,
            atomic_symbol: atomic_symbol.to_string(),
            coordinates: Point3::new(xyz[0], xyz[1], xyz[2]),
        })
    }

    /// Returns the position of the atom in bohr.
    pub fn coordinates_bohr(&self) -> Point3<f64> {
        self.coordinates * ANGSTROM_TO_BOHR
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>9} {:>3} {:+12.7} {:+12.7} {:+12.7}",
            "Atom",
            self.atomic_symbol,
            self.coordinates[0],
            self.coordinates[1],
            self.coordinates[2],
        )
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}
