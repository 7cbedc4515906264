use super::*;
use std::{fs, os::unix::fs::PermissionsExt};
use tempfile::TempDir;

fn environment(root: &Path) -> Environment {
    Environment::resolve(
        Some(root.to_path_buf()),
        Some(root.join("inputs")),
        Some(root.join("data")),
    )
}

fn write_executable(path: &Path, mode: u32) {
    fs::write(path, "#!/bin/sh\n").unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
}

const CONFIG: &str = "
receptors: rec.txt
ligands: lig.txt
engine:
  exec: vina
docking:
  score_cutoff: -7.5
  exhaustiveness: 16
";

#[test]
pub fn parse_config_with_defaults() {
    let config: FarmConfig = serde_yaml::from_str(CONFIG).unwrap();

    assert_eq!(config.receptors, PathBuf::from("rec.txt"));
    assert!(config.combinations.is_none());
    assert!(!config.retry_failed);
    assert_eq!(config.engine.receptor_dir, PathBuf::from("receptors"));
    assert_eq!(config.engine.extension, "pdbqt");
    assert_eq!(config.docking.score_cutoff, Some(-7.5));
    assert_eq!(config.docking.exhaustiveness, 16);
    assert_eq!(config.docking.num_modes, 9);
    assert!(config.docking.randomize());
}

#[test]
pub fn reject_unknown_fields() {
    let config = format!("{CONFIG}unknown: 1\n");

    assert!(serde_yaml::from_str::<FarmConfig>(&config).is_err());
}

#[test]
pub fn cutoff_accepts_only_better_scores() {
    let mut params = DockingParams {
        score_cutoff: Some(5.0),
        ..DockingParams::default()
    };

    assert!(params.accepts(&[3.2, 7.1]));
    assert!(!params.accepts(&[6.0]));
    assert!(!params.accepts(&[5.0]));
    assert!(!params.accepts(&[]));

    params.score_cutoff = None;
    assert!(params.accepts(&[3.2, 7.1]));
    assert!(params.accepts(&[6.0]));
    assert!(params.accepts(&[]));
}

#[test]
pub fn resolve_cpu_only_when_unset() {
    let mut params = DockingParams::default();
    params.resolve_cpu(1);
    assert!(params.cpu >= 1);

    params.cpu = 3;
    params.resolve_cpu(64);
    assert_eq!(params.cpu, 3);
}

#[test]
pub fn workers_split_the_cores() {
    assert_eq!(cpu_share(8, 1), 8);
    assert_eq!(cpu_share(8, 4), 2);
    assert_eq!(cpu_share(8, 3), 2);
    // more workers than cores still run single threaded
    assert_eq!(cpu_share(4, 8), 1);
    assert_eq!(cpu_share(8, 0), 8);
}

#[test]
pub fn seed_must_fit_an_int() {
    let params: DockingParams = serde_yaml::from_str("seed: 2147483647").unwrap();
    assert_eq!(params.seed, i32::MAX);

    assert!(serde_yaml::from_str::<DockingParams>("seed: 4294967296").is_err());
}

#[test]
pub fn environment_layout() {
    let env = environment(Path::new("/work"));

    assert_eq!(env.shard_dir(), PathBuf::from("/work/data/dockShards"));
    assert_eq!(
        env.shard_path(4),
        PathBuf::from("/work/data/dockShards/dock_proc4.db")
    );
    assert_eq!(env.scratch_dir(2), PathBuf::from("/work/data/scratch/2"));
    assert_eq!(
        env.input_path(Path::new("rec.txt")),
        PathBuf::from("/work/inputs/rec.txt")
    );
    assert_eq!(
        env.input_path(Path::new("/abs/rec.txt")),
        PathBuf::from("/abs/rec.txt")
    );
}

#[test]
pub fn load_list_skips_blank_and_comment_lines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("list.txt");
    fs::write(&path, "# receptors\nR1\n\n  R2  \n#R3\n").unwrap();

    assert_eq!(load_list(&path).unwrap(), vec!["R1", "R2"]);
    assert!(matches!(
        load_list(&dir.path().join("missing.txt")),
        Err(ConfigErrors::ReadList { .. })
    ));
}

#[test]
pub fn preflight_collects_every_problem() {
    let dir = TempDir::new().unwrap();
    let env = environment(dir.path());
    fs::create_dir_all(&env.input_dir).unwrap();
    write_executable(&env.input_dir.join("vina"), 0o644);

    let mut config: FarmConfig = serde_yaml::from_str(CONFIG).unwrap();
    config.docking.num_modes = 0;

    let inputs = FarmInputs::default();
    assert!(config.preflight_checks(&env, &inputs));

    write_executable(&env.input_dir.join("vina"), 0o755);
    config.docking.num_modes = 9;
    let inputs = FarmInputs {
        receptors: vec!["R1".to_owned()],
        ligands: vec!["L1".to_owned()],
        combinations: None,
    };
    assert!(!config.preflight_checks(&env, &inputs));
}

#[test]
pub fn preflight_rejects_path_like_ids() {
    let dir = TempDir::new().unwrap();
    let env = environment(dir.path());
    fs::create_dir_all(&env.input_dir).unwrap();
    write_executable(&env.input_dir.join("vina"), 0o755);

    let config: FarmConfig = serde_yaml::from_str(CONFIG).unwrap();
    let inputs = FarmInputs {
        receptors: vec!["receptors/R1.pdbqt".to_owned(), "R2".to_owned()],
        ligands: vec!["L1".to_owned()],
        combinations: None,
    };
    assert!(config.preflight_checks(&env, &inputs));

    let inputs = FarmInputs {
        receptors: vec!["R2".to_owned()],
        ligands: vec!["ligands/L1".to_owned()],
        combinations: None,
    };
    assert!(config.preflight_checks(&env, &inputs));
}

#[test]
pub fn load_inputs_from_input_dir() {
    let dir = TempDir::new().unwrap();
    let env = environment(dir.path());
    fs::create_dir_all(&env.input_dir).unwrap();
    fs::write(env.input_dir.join("rec.txt"), "R1\nR2\n").unwrap();
    fs::write(env.input_dir.join("lig.txt"), "L1\n").unwrap();
    fs::write(env.input_dir.join("com.txt"), "R1/L1\n").unwrap();

    let mut config: FarmConfig = serde_yaml::from_str(CONFIG).unwrap();
    let inputs = config.load_inputs(&env).unwrap();
    assert_eq!(inputs.receptors, vec!["R1", "R2"]);
    assert!(inputs.combinations.is_none());

    config.combinations = Some(PathBuf::from("com.txt"));
    let inputs = config.load_inputs(&env).unwrap();
    assert_eq!(inputs.combinations, Some(vec!["R1/L1".to_owned()]));
}
