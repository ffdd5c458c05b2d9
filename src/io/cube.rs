//! Gaussian cube files for volumetric scalar fields.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{self, ensure, Context};
use itertools::Itertools;
use ndarray::ArrayView1;

use crate::auxiliary::molecule::Molecule;
use crate::grid::CubeGrid;
use crate::io::table::fmt_sci;

const VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

/// Number of values per line in the volumetric data section.
const VALUES_PER_LINE: usize = 6;

/// Writes a scalar field sampled on a cube grid into a Gaussian cube file.
///
/// The grid points must be ordered with `x` running slowest and `z` running fastest, which is
/// the order produced by [`CubeGrid::points`].
///
/// # Arguments
///
/// * `path` - The path of the cube file to be written.
/// * `comment` - A one-line description of the field written on the first line.
/// * `mol` - The molecule whose atoms are listed in the cube header.
/// * `grid` - The cube grid.
/// * `values` - The field values at the grid points.
pub fn write_cube<P: AsRef<Path>>(
    path: P,
    comment: &str,
    mol: &Molecule,
    grid: &CubeGrid,
    values: ArrayView1<f64>,
) -> Result<(), anyhow::Error> {
    let path = path.as_ref();
    let [nx, ny, nz] = grid.counts();
    ensure!(
        values.len() == nx * ny * nz,
        "The number of cube values ({}) does not match the grid size ({nx} × {ny} × {nz}).",
        values.len()
    );
    let file = File::create(path)
        .with_context(|| format!("Unable to create the cube file `{}`", path.display()))?;
    let mut writer = BufWriter::new(file);

    let version = VERSION.map(|ver| format!("v{ver}")).unwrap_or("v unknown".to_string());
    writeln!(writer, "{comment}")?;
    writeln!(writer, "Generated by tdrdm {version}")?;
    let origin = grid.origin();
    writeln!(
        writer,
        "{:5}{:12.6}{:12.6}{:12.6}",
        mol.atoms.len(),
        origin[0],
        origin[1],
        origin[2]
    )?;
    let spacings = grid.spacings();
    writeln!(writer, "{nx:5}{:12.6}{:12.6}{:12.6}", spacings[0], 0.0, 0.0)?;
    writeln!(writer, "{ny:5}{:12.6}{:12.6}{:12.6}", 0.0, spacings[1], 0.0)?;
    writeln!(writer, "{nz:5}{:12.6}{:12.6}{:12.6}", 0.0, 0.0, spacings[2])?;
    for atom in mol.atoms.iter() {
        let coords = atom.coordinates_bohr();
        writeln!(
            writer,
            "{:5}{:12.6}{:12.6}{:12.6}{:12.6}",
            atom.atomic_number, 0.0, coords[0], coords[1], coords[2]
        )?;
    }

    for z_row in &values.iter().chunks(nz) {
        for chunk in &z_row.chunks(VALUES_PER_LINE) {
            let line = chunk
                .map(|value| fmt_sci(*value, 13, 5).to_uppercase())
                .join("");
            writeln!(writer, "{line}")?;
        }
    }
    writer.flush()?;
    Ok(())
}
