//! Hermitian eigendecompositions, optionally restricted to symmetry blocks.

use anyhow::{self, ensure};
use indexmap::IndexMap;
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use num_complex::Complex;
use ordered_float::OrderedFloat;

type C128 = Complex<f64>;

/// Returns the indices that sort `values` in ascending order. The sort is stable, so equal
/// values keep their relative order.
pub fn argsort(values: &[f64]) -> Vec<usize> {
    let mut indices = (0..values.len()).collect::<Vec<_>>();
    indices.sort_by_key(|&i| OrderedFloat(values[i]));
    indices
}

/// Diagonalises a Hermitian matrix. Only the lower triangle of `h` is referenced.
///
/// # Returns
///
/// The real eigenvalues in ascending order and the matrix whose columns are the corresponding
/// orthonormal eigenvectors.
pub fn eigh(h: ArrayView2<C128>) -> Result<(Array1<f64>, Array2<C128>), anyhow::Error> {
    let (nrows, ncols) = h.dim();
    ensure!(
        nrows == ncols,
        "Only square matrices can be diagonalised, but the shape is ({nrows}, {ncols})."
    );
    if nrows == 0 {
        return Ok((Array1::zeros(0), Array2::zeros((0, 0))));
    }
    let hmat = DMatrix::from_fn(nrows, ncols, |i, j| {
        if i >= j {
            h[[i, j]]
        } else {
            h[[j, i]].conj()
        }
    });
    let decomp = hmat.symmetric_eigen();
    let unsorted = decomp.eigenvalues.iter().copied().collect::<Vec<f64>>();
    let order = argsort(&unsorted);
    let eigvals = order.iter().map(|&i| unsorted[i]).collect::<Array1<f64>>();
    let eigvecs = Array2::from_shape_fn((nrows, nrows), |(row, col)| {
        decomp.eigenvectors[(row, order[col])]
    });
    Ok((eigvals, eigvecs))
}

/// Returns the eigenvalues of a Hermitian matrix in ascending order.
pub fn eigvalsh(h: ArrayView2<C128>) -> Result<Array1<f64>, anyhow::Error> {
    eigh(h).map(|(eigvals, _)| eigvals)
}

/// Diagonalises a Hermitian matrix block by block, where each block collects the orbitals
/// sharing one irreducible-representation label.
///
/// # Arguments
///
/// * `h` - The Hermitian matrix in an orbital basis.
/// * `irreps` - The irreducible-representation label of each orbital. If `None`, all orbitals
/// share one label and this reduces to [`eigh`].
///
/// # Returns
///
/// All eigenvalues in ascending order (ties ordered by block, then within the block) and the
/// eigenvectors expressed in the full orbital space, one per column.
pub fn symmetry_restricted_eigh(
    h: ArrayView2<C128>,
    irreps: Option<&[String]>,
) -> Result<(Array1<f64>, Array2<C128>), anyhow::Error> {
    let n = h.nrows();
    ensure!(
        h.ncols() == n,
        "Only square matrices can be diagonalised, but the shape is {:?}.",
        h.shape()
    );
    let Some(irreps) = irreps else {
        return eigh(h);
    };
    ensure!(
        irreps.len() == n,
        "Mismatched numbers of irrep labels ({}) and orbitals ({n}).",
        irreps.len()
    );

    let mut blocks: IndexMap<&str, Vec<usize>> = IndexMap::new();
    for (i, irrep) in irreps.iter().enumerate() {
        blocks.entry(irrep.as_str()).or_default().push(i);
    }

    let mut all_eigvals = Vec::with_capacity(n);
    let mut all_eigvecs = Vec::with_capacity(n);
    for indices in blocks.values() {
        let block = Array2::from_shape_fn((indices.len(), indices.len()), |(i, j)| {
            h[[indices[i], indices[j]]]
        });
        let (eigvals, eigvecs) = eigh(block.view())?;
        for (k, eigval) in eigvals.iter().enumerate() {
            let mut full_vec = Array1::<C128>::zeros(n);
            for (row, &orb) in indices.iter().enumerate() {
                full_vec[orb] = eigvecs[[row, k]];
            }
            all_eigvals.push(*eigval);
            all_eigvecs.push(full_vec);
        }
    }

    let order = argsort(&all_eigvals);
    let eigvals = order.iter().map(|&i| all_eigvals[i]).collect::<Array1<f64>>();
    let eigvecs = Array2::from_shape_fn((n, n), |(row, col)| all_eigvecs[order[col]][row]);
    Ok((eigvals, eigvecs))
}

/// Forms $`\sum_k w_k \mathbf{v}_k \mathbf{v}_k^{\dagger}`$ from column vectors
/// $`\mathbf{v}_k`$ and real weights $`w_k`$.
///
/// # Arguments
///
/// * `vectors` - The vectors, one per column.
/// * `weights` - The weight of each vector.
pub fn weighted_outer_product(
    vectors: ArrayView2<C128>,
    weights: ArrayView1<f64>,
) -> Result<Array2<C128>, anyhow::Error> {
    ensure!(
        vectors.ncols() == weights.len(),
        "Mismatched numbers of vectors ({}) and weights ({}).",
        vectors.ncols(),
        weights.len()
    );
    let weighted = &vectors * &weights.mapv(|w| C128::new(w, 0.0));
    Ok(weighted.dot(&vectors.t().mapv(|x| x.conj())))
}
