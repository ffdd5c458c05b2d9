//! Reading and writing of tdrdm input and output files.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{self, format_err, Context};
use ndarray::{Array, ArrayD, Dimension};
use ndarray_npy::{read_npy, write_npy, ReadableElement, WritableElement};
use num_complex::Complex;
use serde::{de::DeserializeOwned, Serialize};
use serde_yaml;

pub mod cube;
pub(crate) mod format;
pub mod table;

#[cfg(test)]
#[path = "io_tests.rs"]
mod io_tests;

type C128 = Complex<f64>;

/// An enumerated type for grid-based output file types written by tdrdm.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TdRdmFileType {
    /// Variant for plain-text files containing a scalar field on a plane.
    Plane,

    /// Variant for cube files containing a hole density in a volume.
    Volume,

    /// Variant for generic cube files, such as those containing correlation densities.
    Cube,
}

impl TdRdmFileType {
    /// Returns the extension of the file type, without the leading dot.
    pub fn ext(&self) -> String {
        match self {
            TdRdmFileType::Plane => "tpl".to_string(),
            TdRdmFileType::Volume => "tvl.cube".to_string(),
            TdRdmFileType::Cube => "cube".to_string(),
        }
    }

    /// Returns the file name `{stem}{ext}` for this file type.
    pub fn file_name(&self, stem: &str) -> String {
        format!("{stem}.{}", self.ext())
    }
}

/// Deletes every regular file in a directory whose name ends with the extension of the given
/// file type. Subdirectories are not visited.
///
/// # Returns
///
/// The paths of the deleted files.
pub fn remove_outputs<P: AsRef<Path>>(
    dir: P,
    file_type: TdRdmFileType,
) -> Result<Vec<PathBuf>, anyhow::Error> {
    let dir = dir.as_ref();
    let suffix = format!(".{}", file_type.ext());
    let mut removed = vec![];
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Unable to list the directory `{}`", dir.display()))?
    {
        let path = entry?.path();
        let matched = path.is_file()
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(&suffix))
                .unwrap_or(false);
        if matched {
            fs::remove_file(&path)
                .with_context(|| format!("Unable to remove `{}`", path.display()))?;
            removed.push(path);
        }
    }
    removed.sort();
    Ok(removed)
}

/// Reads a tdrdm configuration YAML file and deserialises it into an appropriate structure.
///
/// # Arguments
///
/// * `name` - The name of the file to be read in (with its `.yml` or `.yaml` extension).
///
/// # Returns
///
/// A `Result` containing the structure deserialised from the read-in file.
pub fn read_tdrdm_yaml<T, P: AsRef<Path>>(name: P) -> Result<T, anyhow::Error>
where
    T: DeserializeOwned,
{
    let mut reader = BufReader::new(File::open(name).map_err(|err| format_err!(err))?);
    serde_yaml::from_reader(&mut reader).map_err(|err| format_err!(err))
}

/// Serialises a structure and writes into a tdrdm configuration YAML file.
///
/// # Arguments
///
/// * `name` - The name of the YAML file to be written (without extensions). The resulting file
/// will have the `.yml` extension.
///
/// # Returns
///
/// A `Result` indicating if the serialisation and writing processes have been successful.
pub fn write_tdrdm_yaml<T, P: AsRef<Path>>(name: P, value: &T) -> Result<(), anyhow::Error>
where
    T: Serialize,
{
    let mut path = name.as_ref().to_path_buf();
    path.set_extension("yml");
    let mut writer = BufWriter::new(File::create(path)?);
    serde_yaml::to_writer(&mut writer, value).map_err(|err| format_err!(err))
}

/// Reads a NumPy `.npy` file into an array with a fixed element type and dimensionality.
///
/// # Arguments
///
/// * `path` - The path to the `.npy` file.
///
/// # Returns
///
/// A `Result` containing the read-in array.
pub fn read_npy_array<A, D, P>(path: P) -> Result<Array<A, D>, anyhow::Error>
where
    A: ReadableElement,
    D: Dimension,
    P: AsRef<Path>,
{
    read_npy::<_, Array<A, D>>(path.as_ref())
        .with_context(|| format!("Unable to read the NumPy array `{}`", path.as_ref().display()))
}

/// Reads a NumPy `.npy` file containing either real (`f8`) or complex (`c16`) values into a
/// complex array of dynamic dimensionality. Real values are promoted to complex values with
/// zero imaginary parts.
///
/// # Arguments
///
/// * `path` - The path to the `.npy` file.
///
/// # Returns
///
/// A `Result` containing the read-in complex array.
pub fn read_npy_as_complex<P: AsRef<Path>>(path: P) -> Result<ArrayD<C128>, anyhow::Error> {
    let path = path.as_ref();
    match read_npy::<_, ArrayD<C128>>(path) {
        Ok(arr) => Ok(arr),
        Err(cpx_err) => read_npy::<_, ArrayD<f64>>(path)
            .map(|arr| arr.mapv(|x| C128::new(x, 0.0)))
            .map_err(|real_err| {
                format_err!(
                    "Unable to read `{}` as a complex array ({cpx_err}) or as a real array ({real_err})",
                    path.display()
                )
            }),
    }
}

/// Writes an array into a NumPy `.npy` file.
///
/// # Arguments
///
/// * `path` - The path to the `.npy` file to be written.
/// * `arr` - The array to be written.
pub fn write_npy_array<A, D, P>(path: P, arr: &Array<A, D>) -> Result<(), anyhow::Error>
where
    A: WritableElement,
    D: Dimension,
    P: AsRef<Path>,
{
    write_npy(path.as_ref(), arr)
        .with_context(|| format!("Unable to write the NumPy array `{}`", path.as_ref().display()))
}
