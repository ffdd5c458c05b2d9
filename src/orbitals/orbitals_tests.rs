use std::str::FromStr;

use ndarray::{array, Array2, Array3};

use crate::interfaces::input::ConfigurationError;
use crate::orbitals::{
    orbital_dipoles, reorder_by_dipole, reorder_by_dipole_in_blocks, sort_by_irrep,
    sort_orbitals, sort_similar, SortDirection, SortKey, DEFAULT_SIMILARITY_THRESHOLD,
};

#[test]
fn test_orbitals_sort_mode_parsing() {
    assert_eq!(SortKey::from_str("erg").unwrap(), SortKey::Energy);
    assert_eq!(SortKey::from_str("occ").unwrap(), SortKey::Occupation);
    assert_eq!(
        SortDirection::from_str("de").unwrap(),
        SortDirection::Descending
    );
    assert_eq!(
        SortDirection::from_str("as").unwrap(),
        SortDirection::Ascending
    );

    let err = SortKey::from_str("energy").unwrap_err();
    assert!(err.downcast_ref::<ConfigurationError>().is_some());
    let err = SortDirection::from_str("up").unwrap_err();
    assert!(err.downcast_ref::<ConfigurationError>().is_some());
}

#[test]
fn test_orbitals_sort_by_energy_and_occupation() {
    let orbs = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
    let ergs = array![-0.5, -1.5, 0.3];
    let occs = array![2.0, 1.0, 1.5];

    let sorted = sort_orbitals(
        orbs.view(),
        Some(occs.view()),
        Some(ergs.view()),
        SortKey::Energy,
        SortDirection::Ascending,
    )
    .unwrap();
    assert_eq!(sorted.order, vec![1, 0, 2]);
    assert_eq!(sorted.orbs, array![[2.0, 1.0, 3.0], [5.0, 4.0, 6.0]]);
    assert_eq!(sorted.ergs.unwrap(), array![-1.5, -0.5, 0.3]);
    assert_eq!(sorted.occs.unwrap(), array![1.0, 2.0, 1.5]);

    let sorted = sort_orbitals(
        orbs.view(),
        Some(occs.view()),
        None,
        SortKey::Occupation,
        SortDirection::Descending,
    )
    .unwrap();
    assert_eq!(sorted.order, vec![0, 2, 1]);
    assert!(sorted.ergs.is_none());

    let err = sort_orbitals(
        orbs.view(),
        Some(occs.view()),
        None,
        SortKey::Energy,
        SortDirection::Descending,
    )
    .unwrap_err();
    assert!(err.downcast_ref::<ConfigurationError>().is_some());

    let short = array![1.0, 2.0];
    assert!(sort_orbitals(
        orbs.view(),
        Some(short.view()),
        None,
        SortKey::Occupation,
        SortDirection::Ascending,
    )
    .is_err());
}

#[test]
fn test_orbitals_sort_descending_keeps_ties_in_order() {
    let orbs = Array2::<f64>::eye(4);
    let occs = array![1.0, 2.0, 1.0, 2.0];
    let sorted = sort_orbitals(
        orbs.view(),
        Some(occs.view()),
        None,
        SortKey::Occupation,
        SortDirection::Descending,
    )
    .unwrap();
    assert_eq!(sorted.order, vec![1, 3, 0, 2]);
}

#[test]
fn test_orbitals_sort_similar() {
    let orb_ref = Array2::<f64>::eye(3);
    let s = 0.6f64.sqrt();
    let c = 0.4f64.sqrt();
    // Columns: mostly ref #2, exactly ref #0, and a dissimilar mixture of refs #1 and #2.
    let orb = array![[0.0, 1.0, 0.0], [0.1, 0.0, s], [0.99498743710662, 0.0, c]];
    let outcome = sort_similar(
        orb.view(),
        orb_ref.view(),
        None,
        DEFAULT_SIMILARITY_THRESHOLD,
        false,
    )
    .unwrap();
    assert_eq!(outcome.best_match, vec![2, 0, 1]);
    assert_eq!(outcome.dissimilar, vec![2]);
    assert_eq!(outcome.order, vec![1, 2, 0]);

    let ovl = Array2::<f64>::eye(3);
    assert!(sort_similar(
        orb.view(),
        orb_ref.view(),
        Some(ovl.view()),
        DEFAULT_SIMILARITY_THRESHOLD,
        true,
    )
    .is_err());
    assert!(sort_similar(orb.view(), orb_ref.view(), Some(ovl.view()), 0.5, true).is_ok());
}

#[test]
fn test_orbitals_sort_by_irrep() {
    let labels = ["A1", "B2", "A1", "B1", "B2"].map(String::from);
    assert_eq!(sort_by_irrep(&labels, None).unwrap(), vec![0, 2, 1, 4, 3]);

    let order = ["B1", "A1"].map(String::from);
    assert_eq!(
        sort_by_irrep(&labels, Some(order.as_slice())).unwrap(),
        vec![3, 0, 2]
    );

    let repeated = ["B1", "B1"].map(String::from);
    assert!(sort_by_irrep(&labels, Some(repeated.as_slice())).is_err());
    let unknown = ["A2"].map(String::from);
    let err = sort_by_irrep(&labels, Some(unknown.as_slice())).unwrap_err();
    assert!(err.downcast_ref::<ConfigurationError>().is_some());
}

#[test]
fn test_orbitals_reorder_by_dipole() {
    // Two AOs located at z = -1 and z = +1 with no overlap between them.
    let mut dipole_ao = Array3::<f64>::zeros((3, 2, 2));
    dipole_ao[[2, 0, 0]] = -1.0;
    dipole_ao[[2, 1, 1]] = 1.0;
    let orbs = array![[0.0, 1.0, 0.6f64.sqrt()], [1.0, 0.0, 0.4f64.sqrt()]];

    let (dipoles, projections) =
        orbital_dipoles(orbs.view(), dipole_ao.view(), [0.0, 0.0, 2.0]).unwrap();
    assert!((dipoles[[0, 2]] - 1.0).abs() < 1e-12);
    assert!((projections[2] + 0.2).abs() < 1e-12);

    assert_eq!(
        reorder_by_dipole(orbs.view(), dipole_ao.view(), [0.0, 0.0, 1.0]).unwrap(),
        vec![1, 2, 0]
    );
    assert_eq!(
        reorder_by_dipole(orbs.view(), dipole_ao.view(), [0.0, 0.0, -1.0]).unwrap(),
        vec![0, 2, 1]
    );
    assert_eq!(
        reorder_by_dipole_in_blocks(orbs.view(), dipole_ao.view(), [0.0, 0.0, 1.0], &[2, 1])
            .unwrap(),
        vec![1, 0, 2]
    );
    assert!(reorder_by_dipole(orbs.view(), dipole_ao.view(), [0.0, 0.0, 0.0]).is_err());
    assert!(
        reorder_by_dipole_in_blocks(orbs.view(), dipole_ao.view(), [0.0, 0.0, 1.0], &[1, 1])
            .is_err()
    );
}
