use std::fs;
use std::path::{Path, PathBuf};

use approx::assert_abs_diff_eq;
use ndarray::{array, Array2, Array3};
use num_complex::Complex;
use serial_test::serial;

use crate::auxiliary::molecule::Molecule;
use crate::drivers::hole_density::{
    natural_orbital_ao_density, HoleDensityDriver, HoleDensityGrid, HoleDensityParams,
};
use crate::drivers::{ActiveSpace, SamplingSettings, TdRdmDriver};
use crate::grid::{PlaneGridDefinition, TabulatedAoValues, VolumeGridDefinition};
use crate::io::write_npy_array;
use crate::rdm::{SpinLabel, SpinResolvedRdm};
use crate::timeseries::collect_time_series;

type C128 = Complex<f64>;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tdrdm-hole-{name}-{}", std::process::id()));
    if dir.exists() {
        fs::remove_dir_all(&dir).unwrap();
    }
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_sample(dir: &Path, time_fs: f64, alpha: &[f64], beta: &[f64]) {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        dir.join("TIME_INFO"),
        format!("Actual sampling time = {:.8e} a.u. = {time_fs:.8e} fs\n", time_fs * 41.34),
    )
    .unwrap();
    let n = alpha.len();
    let mut dm = Array3::<C128>::zeros((2, n, n));
    for i in 0..n {
        dm[[0, i, i]] = C128::new(alpha[i], 0.0);
        dm[[1, i, i]] = C128::new(beta[i], 0.0);
    }
    write_npy_array(dir.join("1pdm.npy"), &dm).unwrap();
}

fn reference_rdm() -> SpinResolvedRdm {
    let mut dm = Array3::<C128>::zeros((2, 2, 2));
    for s in 0..2 {
        dm[[s, 0, 0]] = C128::new(0.5, 0.0);
        dm[[s, 1, 1]] = C128::new(0.5, 0.0);
    }
    SpinResolvedRdm::new(dm).unwrap()
}

fn read_plane_values(path: &Path) -> Vec<f64> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
        .map(|line| line.split_whitespace().last().unwrap().parse::<f64>().unwrap())
        .collect()
}

#[test]
fn test_drivers_hole_density_params_from_yaml() {
    let yaml = "grid: !Plane\n  uvec: [0.0, 0.0, 1.0]\n  disp: 0.0\n  bound1: [-1.0, 3, 1.0]\n  bound2: [-1.0, 3, 1.0]\nprint_cartesian: true\n";
    let params: HoleDensityParams = serde_yaml::from_str(yaml).unwrap();
    assert!(matches!(params.grid, HoleDensityGrid::Plane(_)));
    assert!(params.normalise_rdm);
    assert!(!params.normalise_reference);
    assert!(params.remove_stale_outputs);
    assert!(params.print_cartesian);
    assert_eq!(params.prefix(), "plane_hole");

    let params = HoleDensityParams::builder()
        .grid(HoleDensityGrid::Volume(VolumeGridDefinition::default()))
        .prefix("hole")
        .build()
        .unwrap();
    assert_eq!(params.prefix(), "hole");
    assert_eq!(HoleDensityParams::default().prefix(), "volume_hole");
}

#[test]
fn test_drivers_hole_density_natural_orbital_ao_density() {
    // Two AOs, one active orbital spanning both of them equally.
    let s = 0.5f64.sqrt();
    let orbitals = array![[s], [s]];
    let dm = array![[C128::new(1.5, 0.0)]];
    let dm_ao = natural_orbital_ao_density(orbitals.view(), dm.view(), None).unwrap();
    for x in dm_ao.iter() {
        assert_abs_diff_eq!(x.re, 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(x.im, 0.0, epsilon = 1e-12);
    }
    let wrong = Array2::<C128>::eye(2);
    assert!(natural_orbital_ao_density(orbitals.view(), wrong.view(), None).is_err());
}

#[test]
#[serial]
fn test_drivers_hole_density_plane() {
    let root = scratch_dir("plane");
    let group = root.join("sample");
    write_sample(&group.join("tevo-1"), 0.0, &[0.5, 0.0], &[0.5, 0.0]);
    write_sample(&group.join("tevo-2"), 0.2, &[0.25, 0.25], &[0.25, 0.25]);
    fs::write(group.join("tevo-1").join("stale.tpl"), "old").unwrap();
    fs::write(group.join("tevo-1").join("keep.txt"), "keep").unwrap();

    let series = collect_time_series(&[group.clone()]).unwrap();
    let active_space = ActiveSpace::builder()
        .n_core(0)
        .n_cas(2)
        .nel_cas(1.0)
        .build()
        .unwrap();
    let sampling = SamplingSettings::builder()
        .spin_label(SpinLabel::SZ)
        .build()
        .unwrap();
    let params = HoleDensityParams::builder()
        .grid(HoleDensityGrid::Plane(PlaneGridDefinition {
            uvec: [0.0, 0.0, 1.0],
            disp: 0.0,
            trans: [0.0, 0.0, 0.0],
            bound1: (0.0, 2, 1.0),
            bound2: (0.0, 1, 0.0),
            roll: 0.0,
        }))
        .print_cartesian(true)
        .build()
        .unwrap();
    // Each of the two plane points sees exactly one AO.
    let ao_values = TabulatedAoValues::new(Array2::<f64>::eye(2));
    let orbitals = Array2::<f64>::eye(2);
    let reference = reference_rdm();

    let mut driver = HoleDensityDriver::builder()
        .parameters(&params)
        .series(&series)
        .active_space(&active_space)
        .sampling(sampling)
        .orbitals(orbitals.view())
        .reference_rdm(&reference)
        .ao_evaluator(&ao_values)
        .build()
        .unwrap();
    driver.run().unwrap();
    let result = driver.result().unwrap();
    assert_eq!(result.summary.n_unique, 2);
    assert_eq!(
        result.output_files,
        vec![
            group.join("tevo-1").join("plane_hole-0.tpl"),
            group.join("tevo-2").join("plane_hole-1.tpl"),
        ]
    );
    assert!(!group.join("tevo-1").join("stale.tpl").exists());
    assert!(group.join("tevo-1").join("keep.txt").exists());

    // D0 = diag(1, 1) and D(0) = diag(1, 0), so only the second orbital has lost density.
    let values = read_plane_values(&result.output_files[0]);
    assert_eq!(values.len(), 2);
    assert_abs_diff_eq!(values[0], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(values[1], 1.0, epsilon = 1e-12);

    let values = read_plane_values(&result.output_files[1]);
    assert_abs_diff_eq!(values[0], 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(values[1], 0.5, epsilon = 1e-12);

    let contents = fs::read_to_string(&result.output_files[0]).unwrap();
    assert!(contents.starts_with("# axis1 (angstrom)"));
    assert!(contents.contains("x (angstrom)"));

    fs::remove_dir_all(&root).unwrap();
}

#[test]
#[serial]
fn test_drivers_hole_density_volume() {
    let root = scratch_dir("volume");
    let group = root.join("sample");
    write_sample(&group.join("tevo-1"), 0.0, &[0.5, 0.0], &[0.5, 0.0]);

    let series = collect_time_series(&[group.clone()]).unwrap();
    let active_space = ActiveSpace::builder().n_cas(2).nel_cas(1.0).build().unwrap();
    let sampling = SamplingSettings::builder()
        .spin_label(SpinLabel::SZ)
        .build()
        .unwrap();
    let params = HoleDensityParams::builder()
        .grid(HoleDensityGrid::Volume(VolumeGridDefinition {
            counts: [2, 2, 2],
            margin: 1.0,
        }))
        .build()
        .unwrap();
    let mol = Molecule::from_xyz_str("1\nH atom\nH 0.0 0.0 0.0\n").unwrap();
    let mut ao = Array2::<f64>::zeros((8, 2));
    ao.column_mut(0).fill(1.0);
    ao.column_mut(1).fill(2.0);
    let ao_values = TabulatedAoValues::new(ao);
    let orbitals = Array2::<f64>::eye(2);
    let reference = reference_rdm();

    assert!(HoleDensityDriver::builder()
        .parameters(&params)
        .series(&series)
        .active_space(&active_space)
        .orbitals(orbitals.view())
        .reference_rdm(&reference)
        .ao_evaluator(&ao_values)
        .build()
        .is_err());

    let mut driver = HoleDensityDriver::builder()
        .parameters(&params)
        .series(&series)
        .active_space(&active_space)
        .sampling(sampling)
        .orbitals(orbitals.view())
        .reference_rdm(&reference)
        .ao_evaluator(&ao_values)
        .molecule(Some(&mol))
        .build()
        .unwrap();
    driver.run().unwrap();
    let path = &driver.result().unwrap().output_files[0];
    assert_eq!(path, &group.join("tevo-1").join("volume_hole-0.tvl.cube"));

    // The hole sits entirely in the second AO, whose value is 2 everywhere.
    let contents = fs::read_to_string(path).unwrap();
    let values = contents
        .lines()
        .skip(6 + mol.atoms.len())
        .flat_map(|line| line.split_whitespace().map(|x| x.parse::<f64>().unwrap()))
        .collect::<Vec<_>>();
    assert_eq!(values.len(), 8);
    for value in values {
        assert_abs_diff_eq!(value, 4.0, epsilon = 1e-10);
    }

    fs::remove_dir_all(&root).unwrap();
}
