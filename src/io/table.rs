//! Fixed-width plain-text tables for time-resolved observables.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{self, ensure, Context};
use ndarray::{ArrayView1, ArrayView2};

/// Formats a floating-point number in scientific notation with a two-digit (at least) signed
/// exponent, *e.g.* `1.234560e-03`, right-aligned in a field of the given width.
///
/// # Arguments
///
/// * `value` - The value to be formatted.
/// * `width` - The minimum width of the field.
/// * `precision` - The number of digits after the decimal point of the mantissa.
pub fn fmt_sci(value: f64, width: usize, precision: usize) -> String {
    let s = if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        let raw = format!("{value:.precision$e}");
        match raw.split_once('e') {
            Some((mantissa, exponent)) => {
                let exp = exponent.parse::<i32>().unwrap_or(0);
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{mantissa}e{sign}{:02}", exp.abs())
            }
            None => raw,
        }
    };
    format!("{s:>width$}")
}

/// Layout of the two header lines of an [`ObservableTable`].
#[derive(Clone, Debug)]
pub struct TableLayout {
    /// Leading character of the header lines (`#` or a space).
    pub leading: char,

    /// Semantic labels of the index and time columns.
    pub time_labels: (String, String),

    /// Semantic labels of the value columns.
    pub value_labels: Vec<String>,
}

impl TableLayout {
    /// Number of value columns.
    pub fn n_values(&self) -> usize {
        self.value_labels.len()
    }
}

impl fmt::Display for TableLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let leading = self.leading;
        write!(f, "{leading}{:>9} {:>13}  ", "Col #1", "Col #2")?;
        for i in 0..self.n_values() {
            write!(f, " {:>16}", format!("Col #{}", i + 3))?;
        }
        writeln!(f)?;
        write!(
            f,
            "{leading}{:>9} {:>13}  ",
            self.time_labels.0, self.time_labels.1
        )?;
        for label in self.value_labels.iter() {
            write!(f, " {label:>16}")?;
        }
        writeln!(f)
    }
}

/// A plain-text table holding one row per unique time point. Each row is flushed as soon as it
/// is written so that an aborted scan leaves all previously written rows intact.
pub struct ObservableTable {
    path: PathBuf,
    n_values: usize,
    writer: BufWriter<File>,
}

impl ObservableTable {
    /// Creates (or truncates) a table file and writes its header.
    ///
    /// # Arguments
    ///
    /// * `path` - The path of the table file.
    /// * `layout` - The header layout.
    pub fn create<P: AsRef<Path>>(path: P, layout: &TableLayout) -> Result<Self, anyhow::Error> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .with_context(|| format!("Unable to create the table file `{}`", path.display()))?;
        let mut writer = BufWriter::new(file);
        write!(writer, "{layout}")?;
        writer.flush()?;
        Ok(Self {
            path,
            n_values: layout.n_values(),
            writer,
        })
    }

    /// Path of the table file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a row to the table.
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the unique time point.
    /// * `time` - The time in femtoseconds.
    /// * `values` - The observable values, one per value column.
    pub fn write_row(&mut self, index: usize, time: f64, values: &[f64]) -> Result<(), anyhow::Error> {
        ensure!(
            values.len() == self.n_values,
            "Expected {} values for a row of `{}`, but {} given.",
            self.n_values,
            self.path.display(),
            values.len()
        );
        write!(self.writer, " {index:>9} {time:>13.8}  ")?;
        for value in values {
            write!(self.writer, " {}", fmt_sci(*value, 16, 6))?;
        }
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes a scalar field sampled on a two-dimensional plane grid.
///
/// # Arguments
///
/// * `path` - The path of the plane file.
/// * `axis1` - Positions along the first in-plane axis (Å); this is the outer loop.
/// * `axis2` - Positions along the second in-plane axis (Å); this is the inner loop.
/// * `cartesian` - If not `None`, the Cartesian coordinates (Å) of every point, in the same
/// order as `values`, to be printed alongside the in-plane coordinates.
/// * `label` - The label of the scalar field.
/// * `values` - The field values, with the second axis running fastest.
pub fn write_plane_table<P: AsRef<Path>>(
    path: P,
    axis1: ArrayView1<f64>,
    axis2: ArrayView1<f64>,
    cartesian: Option<ArrayView2<f64>>,
    label: &str,
    values: ArrayView1<f64>,
) -> Result<(), anyhow::Error> {
    let path = path.as_ref();
    ensure!(
        values.len() == axis1.len() * axis2.len(),
        "The number of plane values ({}) does not match the grid size ({} × {}).",
        values.len(),
        axis1.len(),
        axis2.len()
    );
    let file = File::create(path)
        .with_context(|| format!("Unable to create the plane file `{}`", path.display()))?;
    let mut writer = BufWriter::new(file);
    write!(writer, "# {:>16}  {:>16}", "axis1 (angstrom)", "axis2 (angstrom)")?;
    if cartesian.is_some() {
        write!(
            writer,
            "  {:>16}  {:>16}  {:>16}",
            "x (angstrom)", "y (angstrom)", "z (angstrom)"
        )?;
    }
    writeln!(writer, "     {label:>22}")?;

    let mut co = 0;
    for a1 in axis1.iter() {
        for a2 in axis2.iter() {
            write!(writer, "  {a1:>16.6}  {a2:>16.6}")?;
            if let Some(xyz) = cartesian.as_ref() {
                write!(
                    writer,
                    "  {:>16.6}  {:>16.6}  {:>16.6}",
                    xyz[[co, 0]],
                    xyz[[co, 1]],
                    xyz[[co, 2]]
                )?;
            }
            writeln!(writer, "     {}", fmt_sci(values[co], 22, 14))?;
            co += 1;
        }
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}
