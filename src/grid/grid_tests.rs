use approx::assert_abs_diff_eq;
use nalgebra::Point3;
use ndarray::{array, Array2};
use num_complex::Complex;

use crate::auxiliary::geometry::ANGSTROM_TO_BOHR;
use crate::auxiliary::molecule::Molecule;
use crate::grid::{
    contract_density, AoEvaluator, CubeGrid, PlaneGrid, PlaneGridDefinition, TabulatedAoValues,
    VolumeGridDefinition, DEFAULT_CUBE_COUNTS, DEFAULT_CUBE_MARGIN,
};

type C128 = Complex<f64>;

#[test]
fn test_plane_grid_xy_plane() {
    let definition = PlaneGridDefinition {
        uvec: [0.0, 0.0, 2.0],
        disp: 0.5,
        trans: [0.0, 0.0, 0.0],
        bound1: (-1.0, 3, 1.0),
        bound2: (0.0, 2, 1.0),
        roll: 0.0,
    };
    let grid = PlaneGrid::new(&definition).unwrap();
    assert_eq!(grid.n_points(), 6);
    assert_eq!(grid.axis1(), array![-1.0, 0.0, 1.0]);
    assert_eq!(grid.axis2(), array![0.0, 1.0]);

    // The first axis runs slowest.
    let points = grid.points_angstrom();
    assert_abs_diff_eq!(points[[0, 0]], -1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(points[[0, 1]], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(points[[1, 0]], -1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(points[[1, 1]], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(points[[5, 0]], 1.0, epsilon = 1e-12);
    assert!(points.column(2).iter().all(|z| (z - 0.5).abs() < 1e-12));
}

#[test]
fn test_plane_grid_rotated_and_translated() {
    let definition = PlaneGridDefinition {
        uvec: [1.0, 0.0, 0.0],
        disp: 1.0,
        trans: [0.0, 2.0, 0.0],
        bound1: (0.0, 1, 0.0),
        bound2: (0.0, 1, 0.0),
        roll: 0.0,
    };
    let grid = PlaneGrid::new(&definition).unwrap();
    let p = grid.points();
    assert_abs_diff_eq!(p[[0, 0]], ANGSTROM_TO_BOHR, epsilon = 1e-12);
    assert_abs_diff_eq!(p[[0, 1]], 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(p[[0, 2]], 0.0, epsilon = 1e-12);
}

#[test]
fn test_plane_grid_roll_keeps_points_in_plane() {
    let definition = PlaneGridDefinition {
        uvec: [1.0, 1.0, 1.0],
        disp: 0.3,
        trans: [0.0, 0.0, 0.0],
        bound1: (-2.0, 5, 2.0),
        bound2: (-1.0, 4, 1.0),
        roll: 37.0,
    };
    let grid = PlaneGrid::new(&definition).unwrap();
    let normal = [1.0, 1.0, 1.0].map(|x: f64| x / 3.0f64.sqrt());
    for point in grid.points().rows() {
        let proj = point[0] * normal[0] + point[1] * normal[1] + point[2] * normal[2];
        assert_abs_diff_eq!(proj, 0.3 * ANGSTROM_TO_BOHR, epsilon = 1e-10);
    }
}

#[test]
fn test_plane_grid_zero_normal() {
    let definition = PlaneGridDefinition {
        uvec: [0.0, 0.0, 0.0],
        disp: 0.0,
        trans: [0.0, 0.0, 0.0],
        bound1: (0.0, 2, 1.0),
        bound2: (0.0, 2, 1.0),
        roll: 0.0,
    };
    assert!(PlaneGrid::new(&definition).is_err());
}

#[test]
fn test_plane_grid_definition_from_yaml() {
    let yaml = "uvec: [0.0, 0.0, 1.0]\ndisp: 0.0\nbound1: [-3.0, 61, 3.0]\nbound2: [-3.0, 61, 3.0]\n";
    let definition: PlaneGridDefinition = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(definition.bound1, (-3.0, 61, 3.0));
    assert_eq!(definition.trans, [0.0, 0.0, 0.0]);
    assert_abs_diff_eq!(definition.roll, 0.0);
}

#[test]
fn test_cube_grid_around_molecule() {
    let bond = 1.0 / ANGSTROM_TO_BOHR;
    let mol = Molecule::from_xyz_str(&format!("2\nH2\nH 0.0 0.0 0.0\nH 0.0 0.0 {bond}\n")).unwrap();
    let grid = CubeGrid::around_molecule(&mol, [2, 2, 3], DEFAULT_CUBE_MARGIN).unwrap();
    assert_eq!(grid.counts(), [2, 2, 3]);
    assert_eq!(grid.n_points(), 12);
    assert_abs_diff_eq!(grid.origin()[0], -3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(grid.origin()[2], -3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(grid.spacings()[0], 6.0, epsilon = 1e-12);
    assert_abs_diff_eq!(grid.spacings()[2], 3.5, epsilon = 1e-12);

    // z runs fastest and x slowest.
    let points = grid.points();
    assert_abs_diff_eq!(points[[1, 2]], 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(points[[3, 1]], 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(points[[6, 0]], 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(points[[11, 0]], 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(points[[11, 1]], 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(points[[11, 2]], 4.0, epsilon = 1e-12);

    assert!(CubeGrid::around_molecule(&mol, [1, 2, 2], DEFAULT_CUBE_MARGIN).is_err());
    assert!(CubeGrid::new([0, 2, 2], Point3::origin(), [1.0, 1.0, 1.0]).is_err());
}

#[test]
fn test_volume_grid_definition_defaults() {
    let definition: VolumeGridDefinition = serde_yaml::from_str("counts: [4, 5, 6]\n").unwrap();
    assert_eq!(definition.counts, [4, 5, 6]);
    assert_abs_diff_eq!(definition.margin, DEFAULT_CUBE_MARGIN);
    assert_eq!(VolumeGridDefinition::default().counts, DEFAULT_CUBE_COUNTS);

    let mol = Molecule::from_xyz_str("1\nHe\nHe 0.0 0.0 0.0\n").unwrap();
    let grid = definition.grid_around(&mol).unwrap();
    assert_eq!(grid.n_points(), 120);
    assert_abs_diff_eq!(grid.spacings()[1], 1.5, epsilon = 1e-12);
}

#[test]
fn test_tabulated_ao_values() {
    let tab = TabulatedAoValues::new(Array2::<f64>::ones((4, 2)));
    assert_eq!(tab.n_ao(), 2);
    assert!(tab.evaluate(Array2::<f64>::zeros((4, 3)).view()).is_ok());
    assert!(tab.evaluate(Array2::<f64>::zeros((5, 3)).view()).is_err());
}

#[test]
fn test_contract_density() {
    let values = array![[1.0, 0.0], [0.0, 2.0], [1.0, 1.0]];
    let dm = array![
        [C128::new(1.0, 0.0), C128::new(0.5, 0.3)],
        [C128::new(0.5, -0.3), C128::new(0.25, 0.0)]
    ];
    let density = contract_density(values.view(), dm.view()).unwrap();
    assert_abs_diff_eq!(density[0], 1.0, epsilon = 1e-14);
    assert_abs_diff_eq!(density[1], 1.0, epsilon = 1e-14);
    assert_abs_diff_eq!(density[2], 2.25, epsilon = 1e-14);

    let wrong = Array2::<C128>::zeros((3, 3));
    assert!(contract_density(values.view(), wrong.view()).is_err());
}
