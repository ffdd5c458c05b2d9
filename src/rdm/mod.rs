//! Spin-resolved one-particle reduced density matrices and their normalisation.

use std::error::Error;
use std::fmt;
use std::path::Path;

use anyhow::{self, bail, Context};
use ndarray::{s, Array2, Array3, ArrayD, ArrayView2, Axis, Ix2, Ix3};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::io::read_npy_as_complex;

pub mod eigen;


type C128 = Complex<f64>;

/// Real traces below this magnitude cannot be rescaled to a target electron count.
const VANISHING_TRACE_THRESHOLD: f64 = 1e-14;

// ==================
// Error definitions
// ==================

/// Error raised when an array does not have the shape of a spin-resolved RDM.
#[derive(Debug, Clone)]
pub struct RdmShapeError(pub String);

impl fmt::Display for RdmShapeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RDM shape error: {}", self.0)
    }
}

impl Error for RdmShapeError {}

// ==================
// Enum definitions
// ==================

/// An enumerated type for the spin-label convention under which RDMs have been produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SpinLabel {
    /// Spin-adapted calculations. Only the spin-summed spatial RDM is available and each spin
    /// channel carries half of it.
    #[default]
    SU2,

    /// Non-spin-adapted calculations. The alpha and beta RDMs are available separately.
    SZ,
}

impl fmt::Display for SpinLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpinLabel::SU2 => write!(f, "SU(2) spin-adapted"),
            SpinLabel::SZ => write!(f, "Sz non-spin-adapted"),
        }
    }
}

// ==================
// Struct definitions
// ==================

/// Structure holding a spin-resolved one-particle RDM of shape `(2, n, n)`, where the leading
/// axis indexes the alpha and beta spin channels.
#[derive(Clone, Debug, PartialEq)]
pub struct SpinResolvedRdm {
    dm: Array3<C128>,
}

impl SpinResolvedRdm {
    /// Wraps a `(2, n, n)` array as a spin-resolved RDM.
    ///
    /// # Errors
    ///
    /// Returns an [`RdmShapeError`] if the leading dimension is not exactly `2` or if the last
    /// two dimensions are not equal.
    pub fn new(dm: Array3<C128>) -> Result<Self, anyhow::Error> {
        let shape = dm.shape();
        if shape[0] != 2 {
            bail!(RdmShapeError(format!(
                "the leading (spin) dimension must be 2, but the shape is {shape:?}"
            )));
        }
        if shape[1] != shape[2] {
            bail!(RdmShapeError(format!(
                "each spin block must be square, but the shape is {shape:?}"
            )));
        }
        Ok(Self { dm })
    }

    /// Constructs a spin-resolved RDM from a spin-summed spatial RDM obtained under the
    /// [`SpinLabel::SU2`] convention by assigning half of it to each spin channel.
    pub fn from_spatial_su2(dm: ArrayView2<C128>) -> Result<Self, anyhow::Error> {
        let (nrows, ncols) = dm.dim();
        if nrows != ncols {
            bail!(RdmShapeError(format!(
                "the spatial RDM must be square, but the shape is ({nrows}, {ncols})"
            )));
        }
        let half = dm.mapv(|x| x * 0.5);
        let stacked = ndarray::stack(Axis(0), &[half.view(), half.view()])?;
        Self::new(stacked)
    }

    /// Constructs a spin-resolved RDM from an array of dynamic dimensionality under a specific
    /// spin-label convention.
    ///
    /// Three-dimensional arrays are taken as spin-resolved RDMs under either convention.
    /// Two-dimensional arrays are only accepted as spatial RDMs under
    /// [`SpinLabel::SU2`].
    pub fn from_dyn(dm: ArrayD<C128>, spin_label: SpinLabel) -> Result<Self, anyhow::Error> {
        match (dm.ndim(), spin_label) {
            (3, _) => Self::new(dm.into_dimensionality::<Ix3>()?),
            (2, SpinLabel::SU2) => Self::from_spatial_su2(dm.into_dimensionality::<Ix2>()?.view()),
            (2, SpinLabel::SZ) => bail!(RdmShapeError(
                "a two-dimensional RDM cannot be spin-resolved under the Sz convention".to_string()
            )),
            (ndim, _) => bail!(RdmShapeError(format!(
                "expected a three-dimensional spin-resolved RDM, but found {ndim} dimensions"
            ))),
        }
    }

    /// Reads a spin-resolved RDM from a NumPy `.npy` file containing real or complex values.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the `.npy` file.
    /// * `spin_label` - The spin-label convention of the stored RDM.
    pub fn from_npy<P: AsRef<Path>>(path: P, spin_label: SpinLabel) -> Result<Self, anyhow::Error> {
        let arr = read_npy_as_complex(path.as_ref())?;
        Self::from_dyn(arr, spin_label)
            .with_context(|| format!("Invalid RDM stored in `{}`", path.as_ref().display()))
    }

    /// The number of spatial orbitals spanned by each spin block.
    pub fn n_orbitals(&self) -> usize {
        self.dm.shape()[1]
    }

    /// The underlying `(2, n, n)` array.
    pub fn as_array(&self) -> &Array3<C128> {
        &self.dm
    }

    /// A view of the RDM of one spin channel (`0` for alpha, `1` for beta).
    pub fn spin_block(&self, spin: usize) -> ArrayView2<C128> {
        self.dm.index_axis(Axis(0), spin)
    }

    /// The total trace $`\sum_\sigma \mathrm{Tr}\, \gamma^\sigma`$, *i.e.* the electron count.
    pub fn trace(&self) -> C128 {
        (0..2)
            .map(|spin| self.spin_block(spin).diag().sum())
            .sum::<C128>()
    }

    /// The spin-summed RDM $`\gamma^\alpha + \gamma^\beta`$.
    pub fn spin_summed(&self) -> Array2<C128> {
        self.dm.sum_axis(Axis(0))
    }

    /// Returns this RDM rescaled so that its total trace equals `target`. The scaling factor is
    /// `target / Re(trace)`.
    pub fn normalised(&self, target: f64) -> Result<Self, anyhow::Error> {
        let tr = self.trace().re;
        if tr.abs() < VANISHING_TRACE_THRESHOLD {
            bail!("Unable to normalise an RDM with a vanishing trace ({tr:.3e}) to {target}.");
        }
        let factor = target / tr;
        Ok(Self {
            dm: self.dm.mapv(|x| x * factor),
        })
    }

    /// Embeds this active-space RDM into the space of `n_core` fully occupied core orbitals
    /// followed by the active orbitals. See [`make_full_dm`].
    pub fn embed_core(&self, n_core: usize) -> Self {
        let nact = self.n_orbitals();
        let nocc = n_core + nact;
        let mut full = Array3::<C128>::zeros((2, nocc, nocc));
        for spin in 0..2 {
            for i in 0..n_core {
                full[[spin, i, i]] = C128::new(1.0, 0.0);
            }
            full.slice_mut(s![spin, n_core..nocc, n_core..nocc])
                .assign(&self.spin_block(spin));
        }
        Self { dm: full }
    }
}

/// Builds the spin-resolved RDM over core and active orbitals from an active-space RDM. The
/// core block of each spin channel is the identity (one electron per spin per core orbital)
/// and the active block equals the input unchanged.
///
/// # Arguments
///
/// * `n_core` - The number of core orbitals.
/// * `dm` - The active-space RDM of shape `(2, n, n)`.
///
/// # Returns
///
/// The RDM of shape `(2, n + n_core, n + n_core)`.
pub fn make_full_dm(n_core: usize, dm: &Array3<C128>) -> Result<Array3<C128>, anyhow::Error> {
    Ok(SpinResolvedRdm::new(dm.clone())?.embed_core(n_core).dm)
}

/// Normalisation applied to every loaded RDM before it is passed on.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct RdmNormalisation {
    /// The target electron count. If `None`, RDMs are passed through unscaled.
    pub target: Option<f64>,
}

impl RdmNormalisation {
    /// Normalisation to `target` electrons.
    pub fn to(target: f64) -> Self {
        Self {
            target: Some(target),
        }
    }

    /// Applies this normalisation to a raw RDM.
    pub fn apply(&self, raw: SpinResolvedRdm) -> Result<NormalisedRdm, anyhow::Error> {
        let raw_trace = raw.trace();
        let rdm = match self.target {
            Some(target) => raw.normalised(target)?,
            None => raw,
        };
        Ok(NormalisedRdm { rdm, raw_trace })
    }
}

impl fmt::Display for RdmNormalisation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            Some(target) => write!(f, "rescaled to {target} electrons"),
            None => write!(f, "none"),
        }
    }
}

/// A spin-resolved RDM after normalisation, together with the trace it had on loading.
#[derive(Clone, Debug)]
pub struct NormalisedRdm {
    rdm: SpinResolvedRdm,
    raw_trace: C128,
}

impl NormalisedRdm {
    /// The normalised spin-resolved RDM.
    pub fn rdm(&self) -> &SpinResolvedRdm {
        &self.rdm
    }

    /// The trace of the RDM before normalisation.
    pub fn raw_trace(&self) -> C128 {
        self.raw_trace
    }

    /// The normalised spin-summed RDM.
    pub fn spin_summed(&self) -> Array2<C128> {
        self.rdm.spin_summed()
    }
}
