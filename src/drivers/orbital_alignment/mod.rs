//! Driver for reordering orbitals, most notably to align them with a set of reference
//! orbitals before time-dependent observables are compared across calculations.

use std::fmt;
use std::path::PathBuf;

use anyhow::{self, format_err};
use derive_builder::Builder;
use itertools::Itertools;
use ndarray::{Array2, ArrayView1, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use crate::drivers::TdRdmDriver;
use crate::io::format::{log_title, nice_bool, tdrdm_output, TdRdmOutput};
use crate::io::write_npy_array;
use crate::orbitals::{
    reorder_by_dipole, reorder_by_dipole_in_blocks, sort_by_irrep, sort_orbitals, sort_similar,
    SortDirection, SortKey, DEFAULT_SIMILARITY_THRESHOLD,
};


fn default_similar_thr() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

/// An enumerated type for the criteria by which orbitals are reordered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AlignmentMode {
    /// Variant for ordering orbitals like the reference orbitals they overlap most with.
    Similarity {
        /// The smallest absolute overlap for an orbital to count as similar to a reference
        /// orbital.
        #[serde(default = "default_similar_thr")]
        similar_thr: f64,

        /// Boolean indicating if dissimilar orbitals are an error rather than a warning.
        #[serde(default)]
        dissim_break: bool,
    },

    /// Variant for grouping orbitals by their irreducible representations, optionally in a
    /// given order of irreducible representations.
    Irrep {
        #[serde(default)]
        order: Option<Vec<String>>,
    },

    /// Variant for ordering orbitals by their dipole projections along a direction, optionally
    /// within consecutive blocks of orbitals.
    Dipole {
        uvec: [f64; 3],

        #[serde(default)]
        blocks: Option<Vec<usize>>,
    },

    /// Variant for ordering orbitals by their energies or occupation numbers.
    Property {
        key: SortKey,
        direction: SortDirection,
    },
}

impl Default for AlignmentMode {
    fn default() -> Self {
        AlignmentMode::Similarity {
            similar_thr: DEFAULT_SIMILARITY_THRESHOLD,
            dissim_break: false,
        }
    }
}

impl fmt::Display for AlignmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignmentMode::Similarity {
                similar_thr,
                dissim_break,
            } => {
                writeln!(f, "Alignment criterion: similarity to reference orbitals")?;
                writeln!(f, "Similarity threshold: {similar_thr:.3}")?;
                writeln!(
                    f,
                    "Abort on dissimilar orbitals: {}",
                    nice_bool(*dissim_break)
                )?;
            }
            AlignmentMode::Irrep { order } => {
                writeln!(f, "Alignment criterion: irreducible representations")?;
                match order {
                    Some(order) => writeln!(f, "Irrep order: {}", order.join(", "))?,
                    None => writeln!(f, "Irrep order: as encountered")?,
                }
            }
            AlignmentMode::Dipole { uvec, blocks } => {
                writeln!(f, "Alignment criterion: orbital dipoles")?;
                writeln!(
                    f,
                    "Projection direction: ({:+.7}, {:+.7}, {:+.7})",
                    uvec[0], uvec[1], uvec[2]
                )?;
                if let Some(blocks) = blocks {
                    writeln!(f, "Orbital blocks: {}", blocks.iter().join(" + "))?;
                }
            }
            AlignmentMode::Property { key, direction } => {
                writeln!(f, "Alignment criterion: orbital property")?;
                writeln!(f, "Sort key: {key}")?;
                writeln!(f, "Sort direction: {direction}")?;
            }
        }
        Ok(())
    }
}

/// A structure containing control parameters for orbital alignment.
#[derive(Clone, Builder, Debug, Default, Serialize, Deserialize)]
pub struct OrbitalAlignmentParams {
    /// The criterion by which orbitals are reordered.
    #[builder(default = "AlignmentMode::default()")]
    #[serde(default)]
    pub mode: AlignmentMode,

    /// Optional path of a NumPy `.npy` file into which the reordered orbitals are written.
    #[builder(setter(into, strip_option), default = "None")]
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl OrbitalAlignmentParams {
    /// Returns a builder to construct an [`OrbitalAlignmentParams`] structure.
    pub fn builder() -> OrbitalAlignmentParamsBuilder {
        OrbitalAlignmentParamsBuilder::default()
    }
}

impl fmt::Display for OrbitalAlignmentParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mode)?;
        writeln!(
            f,
            "Save reordered orbitals to file: {}",
            self.output
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| nice_bool(false))
        )?;
        writeln!(f)?;
        Ok(())
    }
}

// ------
// Result
// ------

/// A structure to contain orbital-alignment results.
#[derive(Clone, Debug)]
pub struct OrbitalAlignmentResult {
    /// The original column index of each reordered orbital.
    pub order: Vec<usize>,

    /// The reordered orbitals, one per column.
    pub orbitals: Array2<f64>,

    /// The columns of orbitals found dissimilar to all reference orbitals. This is only
    /// populated in the similarity mode.
    pub dissimilar: Vec<usize>,
}

// ------
// Driver
// ------

/// A driver for reordering orbitals.
#[derive(Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct OrbitalAlignmentDriver<'a> {
    /// The control parameters for orbital alignment.
    parameters: &'a OrbitalAlignmentParams,

    /// The orbitals to be reordered in the AO basis, one per column.
    orbitals: ArrayView2<'a, f64>,

    /// The reference orbitals. Required in the similarity mode.
    #[builder(default = "None")]
    reference_orbitals: Option<ArrayView2<'a, f64>>,

    /// The AO overlap matrix. If `None` in the similarity mode, the AO basis is taken to be
    /// orthonormal.
    #[builder(default = "None")]
    overlap: Option<ArrayView2<'a, f64>>,

    /// The irreducible-representation label of each orbital. Required in the irrep mode.
    #[builder(default = "None")]
    irreps: Option<&'a [String]>,

    /// AO dipole integrals of shape `(3, nAO, nAO)`. Required in the dipole mode.
    #[builder(default = "None")]
    dipole_ao: Option<ArrayView3<'a, f64>>,

    /// Orbital occupation numbers, used in the property mode.
    #[builder(default = "None")]
    occupations: Option<ArrayView1<'a, f64>>,

    /// Orbital energies, used in the property mode.
    #[builder(default = "None")]
    energies: Option<ArrayView1<'a, f64>>,

    /// The result of the orbital alignment.
    #[builder(setter(skip), default = "None")]
    result: Option<OrbitalAlignmentResult>,
}

impl<'a> OrbitalAlignmentDriverBuilder<'a> {
    fn validate(&self) -> Result<(), String> {
        let params = self
            .parameters
            .ok_or("No orbital-alignment parameters found.".to_string())?;
        let missing = match params.mode {
            AlignmentMode::Similarity { .. } => {
                (!matches!(self.reference_orbitals, Some(Some(_)))).then_some("reference orbitals")
            }
            AlignmentMode::Irrep { .. } => {
                (!matches!(self.irreps, Some(Some(_)))).then_some("orbital irreps")
            }
            AlignmentMode::Dipole { .. } => {
                (!matches!(self.dipole_ao, Some(Some(_)))).then_some("AO dipole integrals")
            }
            AlignmentMode::Property { .. } => None,
        };
        if let Some(missing) = missing {
            return Err(format!(
                "The chosen orbital alignment requires {missing}, but none given."
            ));
        }

        let norbs = self
            .orbitals
            .ok_or("No orbitals to be aligned found.".to_string())?
            .ncols();
        let lengths = [
            ("orbital irreps", self.irreps.flatten().map(<[String]>::len)),
            (
                "orbital occupations",
                self.occupations.flatten().map(|occs| occs.len()),
            ),
            (
                "orbital energies",
                self.energies.flatten().map(|ergs| ergs.len()),
            ),
        ];
        for (name, len) in lengths {
            if let Some(len) = len {
                if len != norbs {
                    return Err(format!(
                        "Mismatched numbers of {name} ({len}) and orbitals ({norbs})."
                    ));
                }
            }
        }
        Ok(())
    }
}

impl<'a> OrbitalAlignmentDriver<'a> {
    /// Returns a builder to construct an [`OrbitalAlignmentDriver`] structure.
    pub fn builder() -> OrbitalAlignmentDriverBuilder<'a> {
        OrbitalAlignmentDriverBuilder::default()
    }

    /// Determines the new orbital order and the dissimilar orbitals, if any.
    fn determine_order(&self) -> Result<(Vec<usize>, Vec<usize>), anyhow::Error> {
        let missing = |what: &str| format_err!("No {what} found for orbital alignment.");
        match &self.parameters.mode {
            AlignmentMode::Similarity {
                similar_thr,
                dissim_break,
            } => {
                let reference = self
                    .reference_orbitals
                    .ok_or_else(|| missing("reference orbitals"))?;
                let outcome = sort_similar(
                    self.orbitals,
                    reference,
                    self.overlap,
                    *similar_thr,
                    *dissim_break,
                )?;
                Ok((outcome.order, outcome.dissimilar))
            }
            AlignmentMode::Irrep { order } => {
                let irreps = self.irreps.ok_or_else(|| missing("orbital irreps"))?;
                Ok((sort_by_irrep(irreps, order.as_deref())?, vec![]))
            }
            AlignmentMode::Dipole { uvec, blocks } => {
                let dipole_ao = self.dipole_ao.ok_or_else(|| missing("AO dipole integrals"))?;
                let order = match blocks {
                    Some(blocks) => {
                        reorder_by_dipole_in_blocks(self.orbitals, dipole_ao, *uvec, blocks)?
                    }
                    None => reorder_by_dipole(self.orbitals, dipole_ao, *uvec)?,
                };
                Ok((order, vec![]))
            }
            AlignmentMode::Property { key, direction } => {
                let sorted = sort_orbitals(
                    self.orbitals,
                    self.occupations,
                    self.energies,
                    *key,
                    *direction,
                )?;
                Ok((sorted.order, vec![]))
            }
        }
    }

    /// Reorders the orbitals and optionally saves them.
    fn align_orbitals(&mut self) -> Result<(), anyhow::Error> {
        log_title("Orbital Alignment");
        tdrdm_output!("");
        let params = self.parameters;
        params.log_output_display();

        let (order, dissimilar) = self.determine_order()?;
        let orbitals = self.orbitals.select(Axis(1), &order);
        tdrdm_output!(
            "New orbital order (1-based original indices): {}",
            order.iter().map(|i| i + 1).join(" ")
        );
        if let Some(output) = params.output.as_ref() {
            write_npy_array(output, &orbitals)?;
            tdrdm_output!("Reordered orbitals written to `{}`", output.display());
        }
        tdrdm_output!("");

        self.result = Some(OrbitalAlignmentResult {
            order,
            orbitals,
            dissimilar,
        });
        Ok(())
    }
}

impl<'a> TdRdmDriver for OrbitalAlignmentDriver<'a> {
    type Params = OrbitalAlignmentParams;

    type Outcome = OrbitalAlignmentResult;

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No orbital-alignment results found."))
    }

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.align_orbitals()
    }
}
