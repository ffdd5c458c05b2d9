//! Orbital ordering utilities.

use std::fmt;
use std::str::FromStr;

use anyhow::{self, bail, ensure, format_err};
use indexmap::IndexMap;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use crate::interfaces::input::ConfigurationError;
use crate::io::format::tdrdm_warn;
use crate::rdm::eigen::argsort;

#[cfg(test)]
#[path = "orbitals_tests.rs"]
mod orbitals_tests;

/// Default threshold of the largest absolute overlap below which an orbital is regarded as
/// dissimilar to all reference orbitals.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

// ================
// Enum definitions
// ================

/// An enumerated type for the orbital quantities by which orbitals can be sorted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKey {
    /// Sort by orbital energies.
    #[serde(rename = "erg")]
    Energy,

    /// Sort by orbital occupation numbers.
    #[serde(rename = "occ")]
    Occupation,
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "erg" => Ok(SortKey::Energy),
            "occ" => Ok(SortKey::Occupation),
            _ => bail!(ConfigurationError(format!(
                "the orbital sort key can only be either `erg` or `occ`, but `{s}` given"
            ))),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Energy => write!(f, "orbital energy"),
            SortKey::Occupation => write!(f, "orbital occupation"),
        }
    }
}

/// An enumerated type for sorting directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    /// Largest values first.
    #[serde(rename = "de")]
    Descending,

    /// Smallest values first.
    #[serde(rename = "as")]
    Ascending,
}

impl FromStr for SortDirection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "de" => Ok(SortDirection::Descending),
            "as" => Ok(SortDirection::Ascending),
            _ => bail!(ConfigurationError(format!(
                "the orbital sort direction can only be either `de` or `as`, but `{s}` given"
            ))),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Descending => write!(f, "descending"),
            SortDirection::Ascending => write!(f, "ascending"),
        }
    }
}

// ==================
// Struct definitions
// ==================

/// Orbitals sorted by [`sort_orbitals`], together with their permuted occupations and energies.
#[derive(Clone, Debug)]
pub struct SortedOrbitals {
    /// The sorted orbital coefficients, one orbital per column.
    pub orbs: Array2<f64>,

    /// The sorted occupation numbers, if any.
    pub occs: Option<Array1<f64>>,

    /// The sorted orbital energies, if any.
    pub ergs: Option<Array1<f64>>,

    /// The original column index of each sorted orbital.
    pub order: Vec<usize>,
}

/// The outcome of [`sort_similar`].
#[derive(Clone, Debug)]
pub struct SimilarityOrder {
    /// Overlap matrix between the reference orbitals (rows) and the orbitals to be sorted
    /// (columns).
    pub overlap: Array2<f64>,

    /// For each orbital to be sorted, the index of the reference orbital it overlaps most with.
    pub best_match: Vec<usize>,

    /// The column indices of the orbitals whose largest absolute overlap with any reference
    /// orbital is below the similarity threshold.
    pub dissimilar: Vec<usize>,

    /// The column order that places the orbitals in the order of their best-matching reference
    /// orbitals.
    pub order: Vec<usize>,
}

// =========
// Functions
// =========

fn permute<T: Clone>(arr: ArrayView1<T>, order: &[usize]) -> Array1<T> {
    order.iter().map(|&i| arr[i].clone()).collect()
}

/// Sorts orbitals by their energies or occupation numbers.
///
/// # Arguments
///
/// * `orbs` - Orbital coefficients, one orbital per column.
/// * `occs` - Occupation numbers, required if `key` is [`SortKey::Occupation`].
/// * `ergs` - Orbital energies, required if `key` is [`SortKey::Energy`].
/// * `key` - The quantity to sort by.
/// * `direction` - The sorting direction. Ties keep their original relative order.
pub fn sort_orbitals<'v>(
    orbs: ArrayView2<f64>,
    occs: Option<ArrayView1<'v, f64>>,
    ergs: Option<ArrayView1<'v, f64>>,
    key: SortKey,
    direction: SortDirection,
) -> Result<SortedOrbitals, anyhow::Error> {
    let norbs = orbs.ncols();
    for (name, values) in [("occupation", occs), ("energy", ergs)] {
        if let Some(values) = values {
            ensure!(
                values.len() == norbs,
                "Mismatched numbers of orbital {name} values ({}) and orbitals ({norbs}).",
                values.len()
            );
        }
    }
    let sort_values = match key {
        SortKey::Energy => ergs.ok_or_else(|| {
            format_err!(ConfigurationError(
                "orbitals cannot be sorted by energy without orbital energies".to_string()
            ))
        })?,
        SortKey::Occupation => occs.ok_or_else(|| {
            format_err!(ConfigurationError(
                "orbitals cannot be sorted by occupation without occupation numbers".to_string()
            ))
        })?,
    };
    let signed = match direction {
        SortDirection::Ascending => sort_values.to_vec(),
        SortDirection::Descending => sort_values.iter().map(|x| -x).collect(),
    };
    let order = argsort(&signed);
    Ok(SortedOrbitals {
        orbs: orbs.select(Axis(1), &order),
        occs: occs.map(|occs| permute(occs, &order)),
        ergs: ergs.map(|ergs| permute(ergs, &order)),
        order,
    })
}

/// Determines the order of a set of orbitals that best matches a set of reference orbitals.
///
/// The overlap matrix $`O = C_\mathrm{ref}^\mathsf{T} S C`$ is formed, and each column of
/// $`O`$ is matched to the row holding its largest absolute value. Sorting the columns by their
/// matched rows makes the largest absolute overlap of each column a diagonal element whenever
/// the matching is one-to-one.
///
/// # Arguments
///
/// * `orb` - The orbitals to be sorted, one per column.
/// * `orb_ref` - The reference orbitals, one per column.
/// * `ovl` - The AO overlap matrix. If `None`, the AO basis is taken to be orthonormal.
/// * `similar_thr` - The similarity threshold.
/// * `dissim_break` - If `true`, any dissimilar orbital is an error. Otherwise, dissimilar
/// orbitals are only reported as a warning.
pub fn sort_similar(
    orb: ArrayView2<f64>,
    orb_ref: ArrayView2<f64>,
    ovl: Option<ArrayView2<f64>>,
    similar_thr: f64,
    dissim_break: bool,
) -> Result<SimilarityOrder, anyhow::Error> {
    ensure!(
        orb.dim() == orb_ref.dim(),
        "Mismatched shapes of the orbitals {:?} and the reference orbitals {:?}.",
        orb.shape(),
        orb_ref.shape()
    );
    let overlap = match ovl {
        Some(ovl) => {
            ensure!(
                ovl.dim() == (orb.nrows(), orb.nrows()),
                "The AO overlap matrix of shape {:?} does not match {} AOs.",
                ovl.shape(),
                orb.nrows()
            );
            orb_ref.t().dot(&ovl.dot(&orb))
        }
        None => orb_ref.t().dot(&orb),
    };

    let (best_match, largest): (Vec<usize>, Vec<f64>) = overlap
        .axis_iter(Axis(1))
        .map(|col| {
            col.iter()
                .map(|x| x.abs())
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |(imax, vmax), (i, v)| {
                    if v > vmax {
                        (i, v)
                    } else {
                        (imax, vmax)
                    }
                })
        })
        .unzip();
    let dissimilar = largest
        .iter()
        .enumerate()
        .filter_map(|(i, v)| (*v < similar_thr).then_some(i))
        .collect::<Vec<_>>();
    if !dissimilar.is_empty() {
        let labels = dissimilar
            .iter()
            .map(|i| (i + 1).to_string())
            .collect::<Vec<_>>()
            .join(", ");
        if dissim_break {
            bail!(
                "These orbitals: [{labels}] are too dissimilar to the reference orbitals (threshold: {similar_thr})."
            );
        }
        tdrdm_warn!(
            "These orbitals: [{labels}] are too dissimilar to the reference orbitals (threshold: {similar_thr})."
        );
    }

    let order = argsort(&best_match.iter().map(|i| *i as f64).collect::<Vec<_>>());
    Ok(SimilarityOrder {
        overlap,
        best_match,
        dissimilar,
        order,
    })
}

/// Groups orbital indices by their irreducible-representation labels.
///
/// # Arguments
///
/// * `labels` - The irreducible-representation label of each orbital.
/// * `order` - The order of the groups. If `None`, groups appear in the order in which their
/// labels are first encountered. Otherwise, only orbitals with the listed labels are returned,
/// and each listed label must be unique and present in `labels`.
///
/// # Returns
///
/// The orbital indices, grouped by label and ascending within each group.
pub fn sort_by_irrep(
    labels: &[String],
    order: Option<&[String]>,
) -> Result<Vec<usize>, anyhow::Error> {
    let mut groups: IndexMap<&str, Vec<usize>> = IndexMap::new();
    for (i, label) in labels.iter().enumerate() {
        groups.entry(label.as_str()).or_default().push(i);
    }
    match order {
        None => Ok(groups.into_values().flatten().collect()),
        Some(order) => {
            let mut seen = Vec::with_capacity(order.len());
            let mut indices = Vec::with_capacity(labels.len());
            for label in order {
                if seen.contains(&label.as_str()) {
                    bail!(ConfigurationError(format!(
                        "the irrep `{label}` appears more than once in the requested order"
                    )));
                }
                seen.push(label.as_str());
                let group = groups.get(label.as_str()).ok_or_else(|| {
                    format_err!(ConfigurationError(format!(
                        "the irrep `{label}` is not carried by any orbital"
                    )))
                })?;
                indices.extend(group.iter().copied());
            }
            Ok(indices)
        }
    }
}

/// Computes the projections of orbital dipole moments onto a direction.
///
/// # Arguments
///
/// * `orbs` - Orbital coefficients, one orbital per column.
/// * `dipole_ao` - The AO matrices of the three Cartesian components of the position operator,
/// with shape `(3, number of AOs, number of AOs)`.
/// * `uv` - The direction. This need not be normalised but must not vanish.
///
/// # Returns
///
/// The dipole moment of each orbital (one row per orbital) and its projection onto the
/// normalised `uv`.
pub fn orbital_dipoles(
    orbs: ArrayView2<f64>,
    dipole_ao: ArrayView3<f64>,
    uv: [f64; 3],
) -> Result<(Array2<f64>, Array1<f64>), anyhow::Error> {
    let nao = orbs.nrows();
    ensure!(
        dipole_ao.dim() == (3, nao, nao),
        "The AO dipole matrices of shape {:?} do not match {nao} AOs.",
        dipole_ao.shape()
    );
    let norm = uv.iter().map(|x| x * x).sum::<f64>().sqrt();
    ensure!(norm > 1e-12, "The dipole direction must have a non-vanishing norm.");
    let uv = uv.map(|x| x / norm);

    let norbs = orbs.ncols();
    let mut dipoles = Array2::<f64>::zeros((norbs, 3));
    for (i, orb) in orbs.axis_iter(Axis(1)).enumerate() {
        for x in 0..3 {
            dipoles[[i, x]] = orb.dot(&dipole_ao.index_axis(Axis(0), x).dot(&orb));
        }
    }
    let projections = dipoles
        .axis_iter(Axis(0))
        .map(|dip| dip[0] * uv[0] + dip[1] * uv[1] + dip[2] * uv[2])
        .collect::<Array1<f64>>();
    Ok((dipoles, projections))
}

/// Orders orbitals by the projections of their dipole moments onto a direction, in ascending
/// order. See [`orbital_dipoles`] for the arguments.
pub fn reorder_by_dipole(
    orbs: ArrayView2<f64>,
    dipole_ao: ArrayView3<f64>,
    uv: [f64; 3],
) -> Result<Vec<usize>, anyhow::Error> {
    let (_, projections) = orbital_dipoles(orbs, dipole_ao, uv)?;
    Ok(argsort(&projections.to_vec()))
}

/// Orders orbitals by dipole projection separately within consecutive blocks of columns, such
/// as the two active spaces of an MRCI-like partitioning. Orbitals never move across blocks.
///
/// # Arguments
///
/// * `block_sizes` - The numbers of orbitals in the consecutive blocks. They must add up to the
/// number of columns of `orbs`.
pub fn reorder_by_dipole_in_blocks(
    orbs: ArrayView2<f64>,
    dipole_ao: ArrayView3<f64>,
    uv: [f64; 3],
    block_sizes: &[usize],
) -> Result<Vec<usize>, anyhow::Error> {
    ensure!(
        block_sizes.iter().sum::<usize>() == orbs.ncols(),
        "The block sizes {block_sizes:?} do not add up to {} orbitals.",
        orbs.ncols()
    );
    let mut offset = 0;
    let mut order = Vec::with_capacity(orbs.ncols());
    for size in block_sizes {
        let block = orbs.slice(ndarray::s![.., offset..offset + size]);
        order.extend(
            reorder_by_dipole(block, dipole_ao, uv)?
                .into_iter()
                .map(|i| i + offset),
        );
        offset += size;
    }
    Ok(order)
}
