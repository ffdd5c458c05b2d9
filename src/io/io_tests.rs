use std::fs;
use std::path::PathBuf;

use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, Array2, Array3, ArrayD, IxDyn};
use num_complex::Complex;
use serial_test::serial;

use crate::auxiliary::molecule::Molecule;
use crate::grid::CubeGrid;
use crate::io::cube::write_cube;
use crate::io::table::{fmt_sci, write_plane_table, ObservableTable, TableLayout};
use crate::io::{
    read_npy_array, read_npy_as_complex, read_tdrdm_yaml, remove_outputs, write_npy_array,
    write_tdrdm_yaml, TdRdmFileType,
};
use crate::rdm::SpinLabel;

type C128 = Complex<f64>;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tdrdm-io-{name}-{}", std::process::id()));
    if dir.exists() {
        fs::remove_dir_all(&dir).unwrap();
    }
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_io_fmt_sci() {
    assert_eq!(fmt_sci(1.234567e-3, 0, 6), "1.234567e-03");
    assert_eq!(fmt_sci(-2.5, 0, 2), "-2.50e+00");
    assert_eq!(fmt_sci(0.0, 0, 3), "0.000e+00");
    assert_eq!(fmt_sci(6.02e23, 0, 2), "6.02e+23");
    assert_eq!(fmt_sci(1e-105, 0, 1), "1.0e-105");
    assert_eq!(fmt_sci(1.0, 16, 6), "    1.000000e+00");
    assert_eq!(fmt_sci(f64::NAN, 5, 6), "  nan");
}

#[test]
fn test_io_file_types() {
    assert_eq!(TdRdmFileType::Plane.file_name("hole-03"), "hole-03.tpl");
    assert_eq!(TdRdmFileType::Volume.file_name("hole-03"), "hole-03.tvl.cube");
    assert_eq!(TdRdmFileType::Cube.ext(), "cube");
}

#[test]
#[serial]
fn test_io_observable_table() {
    let dir = scratch_dir("table");
    let path = dir.join("table");
    let layout = TableLayout {
        leading: '#',
        time_labels: ("No.".to_string(), "Time (fs)".to_string()),
        value_labels: vec!["Static id.".to_string(), "Dynamic id.".to_string()],
    };
    let mut table = ObservableTable::create(&path, &layout).unwrap();
    table.write_row(0, 0.0, &[0.125, -1.5e-3]).unwrap();
    table.write_row(1, 0.25, &[0.5, 0.0]).unwrap();
    assert!(table.write_row(2, 0.5, &[1.0]).is_err());
    assert_eq!(table.path(), path.as_path());

    let contents = fs::read_to_string(&path).unwrap();
    let lines = contents.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[0],
        "#   Col #1        Col #2             Col #3           Col #4"
    );
    assert_eq!(
        lines[1],
        "#      No.     Time (fs)         Static id.      Dynamic id."
    );
    assert_eq!(
        lines[2],
        "         0    0.00000000       1.250000e-01    -1.500000e-03"
    );
    assert_eq!(
        lines[3],
        "         1    0.25000000       5.000000e-01     0.000000e+00"
    );

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
#[serial]
fn test_io_plane_table() {
    let dir = scratch_dir("plane");
    let path = dir.join("hole-0.tpl");
    let axis1 = array![-1.0, 1.0];
    let axis2 = array![0.0, 0.5, 1.0];
    let values = Array1::from_iter((0..6).map(|i| i as f64));
    write_plane_table(
        &path,
        axis1.view(),
        axis2.view(),
        None,
        "hole density",
        values.view(),
    )
    .unwrap();

    let contents = fs::read_to_string(&path).unwrap();
    let lines = contents.lines().collect::<Vec<_>>();
    // Header, 3 rows per axis-1 value, and a blank line after each axis-1 value.
    assert_eq!(lines.len(), 1 + 2 * 4);
    assert!(lines[0].starts_with("# axis1 (angstrom)"));
    assert!(lines[0].ends_with("hole density"));
    assert!(lines[4].is_empty());
    assert!(lines[8].is_empty());
    let row = lines[5].split_whitespace().collect::<Vec<_>>();
    assert_eq!(row, vec!["1.000000", "0.000000", "3.00000000000000e+00"]);

    let cartesian = Array2::<f64>::zeros((6, 3));
    write_plane_table(
        &path,
        axis1.view(),
        axis2.view(),
        Some(cartesian.view()),
        "hole density",
        values.view(),
    )
    .unwrap();
    let contents = fs::read_to_string(&path).unwrap();
    let first_row = contents.lines().nth(1).unwrap();
    assert_eq!(first_row.split_whitespace().count(), 6);

    assert!(write_plane_table(
        &path,
        axis1.view(),
        axis2.view(),
        None,
        "hole density",
        values.slice(ndarray::s![..5])
    )
    .is_err());

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
#[serial]
fn test_io_cube() {
    let dir = scratch_dir("cube");
    let path = dir.join("density.cube");
    let mol = Molecule::from_xyz_str("2\nH2\nH 0.0 0.0 0.0\nH 0.0 0.0 0.74\n").unwrap();
    let grid = CubeGrid::around_molecule(&mol, [2, 2, 8], 1.0).unwrap();
    let values = Array1::from_iter((0..32).map(|i| i as f64 * 0.5));
    write_cube(&path, "Test density", &mol, &grid, values.view()).unwrap();

    let contents = fs::read_to_string(&path).unwrap();
    let lines = contents.lines().collect::<Vec<_>>();
    assert_eq!(lines[0], "Test density");
    assert!(lines[1].starts_with("Generated by tdrdm"));
    assert_eq!(lines[2].split_whitespace().next(), Some("2"));
    assert_eq!(lines[3].split_whitespace().next(), Some("2"));
    assert_eq!(lines[5].split_whitespace().next(), Some("8"));
    assert!(lines[6].starts_with("    1"));

    // Each z-row of 8 values is split into lines of 6 and 2 values.
    let data = &lines[8..];
    assert_eq!(data.len(), 4 * 2);
    assert_eq!(data[0].split_whitespace().count(), 6);
    assert_eq!(data[1].split_whitespace().count(), 2);
    assert_eq!(data[0].split_whitespace().nth(1), Some("5.00000E-01"));
    let parsed = data
        .iter()
        .flat_map(|line| line.split_whitespace())
        .map(|x| x.parse::<f64>().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(parsed.len(), 32);
    assert_abs_diff_eq!(parsed[31], 15.5, epsilon = 1e-10);

    let too_short = values.slice(ndarray::s![..4]);
    assert!(write_cube(&path, "Too short", &mol, &grid, too_short).is_err());

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
#[serial]
fn test_io_npy_complex_promotion() {
    let dir = scratch_dir("npy");
    let real_path = dir.join("real.npy");
    let real = array![[1.0, 2.0], [3.0, 4.0]];
    write_npy_array(&real_path, &real).unwrap();
    let promoted = read_npy_as_complex(&real_path).unwrap();
    assert_eq!(promoted.shape(), &[2, 2]);
    assert_eq!(promoted[IxDyn(&[1, 0])], C128::new(3.0, 0.0));

    let cpx_path = dir.join("complex.npy");
    let mut cpx = Array3::<C128>::zeros((2, 1, 1));
    cpx[[1, 0, 0]] = C128::new(0.5, -0.25);
    write_npy_array(&cpx_path, &cpx).unwrap();
    let read_back: ArrayD<C128> = read_npy_as_complex(&cpx_path).unwrap();
    assert_eq!(read_back[IxDyn(&[1, 0, 0])], C128::new(0.5, -0.25));

    let read_real: Array2<f64> = read_npy_array(&real_path).unwrap();
    assert_eq!(read_real, real);
    assert!(read_npy_array::<f64, ndarray::Ix2, _>(dir.join("missing.npy")).is_err());
    assert!(read_npy_as_complex(dir.join("missing.npy")).is_err());

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
#[serial]
fn test_io_remove_outputs() {
    let dir = scratch_dir("remove");
    for name in ["a.tpl", "b.tpl", "c.tvl.cube", "notes.txt", "tpl"] {
        fs::write(dir.join(name), "x").unwrap();
    }
    fs::create_dir_all(dir.join("nested.tpl")).unwrap();

    let removed = remove_outputs(&dir, TdRdmFileType::Plane).unwrap();
    assert_eq!(removed, vec![dir.join("a.tpl"), dir.join("b.tpl")]);
    assert!(dir.join("c.tvl.cube").exists());
    assert!(dir.join("notes.txt").exists());
    assert!(dir.join("tpl").exists());
    assert!(dir.join("nested.tpl").is_dir());

    let removed = remove_outputs(&dir, TdRdmFileType::Volume).unwrap();
    assert_eq!(removed, vec![dir.join("c.tvl.cube")]);
    assert!(remove_outputs(dir.join("missing"), TdRdmFileType::Cube).is_err());

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
#[serial]
fn test_io_yaml() {
    let dir = scratch_dir("yaml");
    write_tdrdm_yaml(dir.join("labels"), &vec![SpinLabel::SU2, SpinLabel::SZ]).unwrap();
    let labels: Vec<SpinLabel> = read_tdrdm_yaml(dir.join("labels.yml")).unwrap();
    assert_eq!(labels, vec![SpinLabel::SU2, SpinLabel::SZ]);
    assert!(read_tdrdm_yaml::<Vec<SpinLabel>, _>(dir.join("labels.yaml")).is_err());

    fs::remove_dir_all(&dir).unwrap();
}
