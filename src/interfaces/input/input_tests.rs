use std::path::PathBuf;

use approx::assert_abs_diff_eq;
use ndarray::Array2;
use serde_yaml::{Mapping, Value};

use crate::drivers::hole_density::HoleDensityGrid;
use crate::auxiliary::geometry::ANGSTROM_TO_BOHR;
use crate::auxiliary::molecule::Molecule;
use crate::drivers::orbital_alignment::AlignmentMode;
use crate::interfaces::input::logbook::{merge_missing, SampleDirectories};
use crate::interfaces::input::task::Task;
use crate::interfaces::input::{ConfigurationError, Input};
use crate::io::read_npy_array;
use crate::rdm::SpinLabel;

const ROOT: &str = env!("CARGO_MANIFEST_DIR");

#[test]
fn test_interfaces_input_full() {
    let name = format!("{ROOT}/tests/input/test_input_full.yml");
    let inp = Input::from_file(&name).unwrap();

    let logbook = &inp.logbook;
    assert_eq!(logbook.n_core, 2);
    assert_eq!(logbook.n_cas, 6);
    assert_abs_diff_eq!(logbook.nel_cas, 5.0);
    assert_eq!(
        logbook.sample_directories(),
        vec![PathBuf::from("run-a"), PathBuf::from("run-b")]
    );
    assert_eq!(logbook.spin_label, SpinLabel::SZ);
    assert_abs_diff_eq!(logbook.simtime_thr, 1e-10);
    assert!(logbook.print_inputs);
    assert!(logbook.prev_logbook.is_none());

    let active_space = logbook.active_space().unwrap();
    assert_eq!(active_space.n_occ(), 8);
    let sampling = logbook.sampling().unwrap();
    assert_eq!(sampling.rdm_filename, "rdm.npy");

    assert_eq!(inp.tasks.len(), 4);
    if let Task::HoleDensity(task) = &inp.tasks[0] {
        assert_eq!(task.reference_rdm, PathBuf::from("rdm_reference.npy"));
        assert!(matches!(task.parameters.grid, HoleDensityGrid::Plane(_)));
        assert!(task.parameters.normalise_reference);
        assert!(task.parameters.normalise_rdm);
        assert!(!task.parameters.remove_stale_outputs);
        assert_eq!(task.parameters.prefix(), "plane_hole");
    } else {
        panic!("Expected a hole-density task.");
    }
    if let Task::LocalCorrelation(task) = &inp.tasks[1] {
        let densities = task.parameters.densities.as_ref().unwrap();
        assert_eq!(densities.counts, [30, 30, 30]);
        assert_abs_diff_eq!(densities.margin, 3.0);
        assert_eq!(task.parameters.irreps.as_ref().unwrap().len(), 6);
        assert!(!task.parameters.normalise_rdm);
    } else {
        panic!("Expected a local-correlation task.");
    }
    if let Task::OrbitalOccupation(task) = &inp.tasks[2] {
        assert_eq!(task.parameters.table, PathBuf::from("orb_occ"));
    } else {
        panic!("Expected an orbital-occupation task.");
    }
    if let Task::OrbitalAlignment(task) = &inp.tasks[3] {
        assert!(task.orbitals.is_none());
        assert_eq!(
            task.parameters.mode,
            AlignmentMode::Similarity {
                similar_thr: 0.6,
                dissim_break: true
            }
        );
        assert!(!inp.tasks[3].needs_series());
    } else {
        panic!("Expected an orbital-alignment task.");
    }
}

#[test]
fn test_interfaces_input_prev_logbook() {
    let name = format!("{ROOT}/tests/input/test_input_prev_logbook.yml");
    let inp = Input::from_file(&name).unwrap();
    let logbook = &inp.logbook;

    // The current logbook takes precedence over the previous one, which in turn takes
    // precedence over the oldest one.
    assert_abs_diff_eq!(logbook.nel_cas, 3.0);
    assert_eq!(logbook.n_core, 1);
    assert_eq!(logbook.n_cas, 4);
    // Inherited data paths are anchored at the directory of the logbook defining them.
    assert!(logbook.orb_path.is_absolute());
    assert!(logbook.orb_path.ends_with("prev/orbitals_previous.npy"));
    if let SampleDirectories::Single(dir) = &logbook.sample_dir {
        assert!(dir.is_absolute());
        assert!(dir.ends_with("prev/run-previous"));
    } else {
        panic!("Expected a single sample directory.");
    }
    assert_abs_diff_eq!(logbook.simtime_thr, 5e-12);
    assert_eq!(logbook.rdm_filename, "1pdm_oldest.npy");
    assert_eq!(
        logbook.prev_logbook,
        Some(PathBuf::from("prev/test_logbook_previous.yml"))
    );
    assert_eq!(inp.tasks.len(), 1);
}

#[test]
fn test_interfaces_input_prev_logbook_cycle() {
    let name = format!("{ROOT}/tests/input/cycle/test_logbook_cycle_a.yml");
    let err = Input::from_file(&name).unwrap_err();
    let config_err = err.downcast_ref::<ConfigurationError>().unwrap();
    assert!(config_err.0.contains("cycle"));
}

#[test]
fn test_interfaces_input_invalid() {
    // Missing logbook.
    let err = Input::from_yaml_str("tasks: []\n").unwrap_err();
    assert!(err.downcast_ref::<ConfigurationError>().is_some());

    // Missing required logbook entries.
    let err = Input::from_yaml_str("logbook:\n  n_cas: 2\n").unwrap_err();
    assert!(err.downcast_ref::<ConfigurationError>().is_some());

    // An empty active space is rejected when the logbook is used.
    let inp = Input::from_yaml_str(
        "logbook:\n  n_cas: 0\n  nel_cas: 2\n  orb_path: orbs.npy\n  sample_dir: run\n",
    )
    .unwrap();
    assert!(inp.tasks.is_empty());
    assert!(inp.logbook.active_space().is_err());
}

#[test]
fn test_interfaces_input_merge_missing() {
    let mut target: Mapping = serde_yaml::from_str("a: 1\nnested:\n  x: 10\n").unwrap();
    let source: Mapping = serde_yaml::from_str("a: 2\nb: 3\nnested:\n  x: 20\n  y: 30\n").unwrap();
    merge_missing(&mut target, &source);
    assert_eq!(target.get("a"), Some(&Value::from(1)));
    assert_eq!(target.get("b"), Some(&Value::from(3)));
    let nested = target.get("nested").and_then(Value::as_mapping).unwrap();
    assert_eq!(nested.get("x"), Some(&Value::from(10)));
    assert_eq!(nested.get("y"), Some(&Value::from(30)));
}

#[test]
fn test_interfaces_input_template_round_trip() {
    let template = Input::template();
    let yaml = serde_yaml::to_string(&template).unwrap();
    assert!(yaml.contains("!HoleDensity"));
    assert!(yaml.contains("!OrbitalAlignment"));
    let inp = Input::from_yaml_str(&yaml).unwrap();
    assert_eq!(inp.logbook, template.logbook);
    assert_eq!(inp.tasks.len(), 4);
    if let Task::LocalCorrelation(task) = &inp.tasks[1] {
        assert_eq!(task.parameters.densities.as_ref().unwrap().counts, [30, 30, 30]);
    } else {
        panic!("Expected a local-correlation task.");
    }
}

#[test]
fn test_interfaces_input_export_grid_points() {
    let dir = std::env::temp_dir().join(format!("tdrdm-input-grid-{}", std::process::id()));
    if dir.exists() {
        std::fs::remove_dir_all(&dir).unwrap();
    }
    std::fs::create_dir_all(&dir).unwrap();
    let config = format!(
        r#"logbook:
  n_cas: 2
  nel_cas: 2
  orb_path: orbitals.npy
  sample_dir: run
  xyz: {ROOT}/tests/xyz/h2o.xyz
tasks:
  - !HoleDensity
    reference_rdm: rdm_reference.npy
    ao_values: ao_values_plane.npy
    parameters:
      grid: !Plane
        uvec: [0.0, 0.0, 1.0]
        disp: 0.0
        bound1: [-1.0, 3, 1.0]
        bound2: [0.0, 2, 1.0]
  - !OrbitalOccupation
    overlap: overlap.npy
    target_orbitals: orbitals_target.npy
  - !LocalCorrelation
    parameters:
      densities:
        counts: [2, 2, 3]
        margin: 1.0
"#
    );
    let inp = Input::from_yaml_str(&config).unwrap();
    let prefix = dir.join("points");
    let written = inp.export_grid_points(&prefix).unwrap();
    assert_eq!(
        written,
        vec![dir.join("points-task1.npy"), dir.join("points-task3.npy")]
    );

    // Plane points in bohr with the first axis running slowest.
    let plane: Array2<f64> = read_npy_array(&written[0]).unwrap();
    assert_eq!(plane.shape(), &[6, 3]);
    assert_abs_diff_eq!(plane[[0, 0]], -ANGSTROM_TO_BOHR, epsilon = 1e-10);
    assert_abs_diff_eq!(plane[[1, 1]], ANGSTROM_TO_BOHR, epsilon = 1e-10);
    assert_abs_diff_eq!(plane[[5, 0]], ANGSTROM_TO_BOHR, epsilon = 1e-10);
    assert_abs_diff_eq!(plane.column(2).sum(), 0.0, epsilon = 1e-10);

    // Cube points start at the lower corner of the box around the molecule.
    let cube: Array2<f64> = read_npy_array(&written[1]).unwrap();
    assert_eq!(cube.shape(), &[12, 3]);
    let mol = Molecule::from_xyz(format!("{ROOT}/tests/xyz/h2o.xyz")).unwrap();
    let (lower, upper) = mol.bounding_box_bohr().unwrap();
    for i in 0..3 {
        assert_abs_diff_eq!(cube[[0, i]], lower[i] - 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(cube[[11, i]], upper[i] + 1.0, epsilon = 1e-10);
    }

    // A volume grid cannot be built without a molecule.
    let no_xyz = config.replace(&format!("  xyz: {ROOT}/tests/xyz/h2o.xyz\n"), "");
    let inp = Input::from_yaml_str(&no_xyz).unwrap();
    assert!(inp.export_grid_points(&prefix).is_err());

    std::fs::remove_dir_all(&dir).unwrap();
}
