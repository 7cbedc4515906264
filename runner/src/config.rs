use crate::keys::KEY_DELIMITER;
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::{self, File},
    io::{BufRead, BufReader, Error},
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, warn};

/// file name prefix of every result shard, followed by the owning rank
pub const SHARD_PREFIX: &str = "dock_proc";
pub const SHARD_EXTENSION: &str = "db";

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read config file: {0}")]
    ReadConfig(#[source] Error),
    #[error("Failed to parse config file")]
    ParseConfig(#[from] serde_yaml::Error),
    #[error("Failed to read list {path:?}: {error}")]
    ReadList { path: PathBuf, error: Error },
    #[error("File not found: {0:?}")]
    FileNotFound(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(#[source] Error),
    #[error("Preflight checks failed, see log output above")]
    Preflight,
    #[error("At least 2 processes are required, got {0}")]
    TooFewProcesses(usize),
    #[error("Failed to prepare directory {path:?}: {error}")]
    Directory { path: PathBuf, error: Error },
}

/// Locations resolved from the environment: working directory, input directory and the data
/// path holding result shards and per job scratch space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub work_dir: PathBuf,
    pub input_dir: PathBuf,
    pub data_path: PathBuf,
}

impl Environment {
    /// explicit values win, `WORKDIR`/`INPUTDIR`/`DATAPATH` are the fallback
    pub fn resolve(
        work_dir: Option<PathBuf>,
        input_dir: Option<PathBuf>,
        data_path: Option<PathBuf>,
    ) -> Self {
        let work_dir = work_dir
            .or_else(|| env::var_os("WORKDIR").map(PathBuf::from))
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let input_dir = input_dir
            .or_else(|| env::var_os("INPUTDIR").map(PathBuf::from))
            .unwrap_or_else(|| work_dir.clone());
        let data_path = data_path
            .or_else(|| env::var_os("DATAPATH").map(PathBuf::from))
            .unwrap_or_else(|| work_dir.join("scratch"));

        Self {
            work_dir,
            input_dir,
            data_path,
        }
    }

    /// directory holding one result shard per worker
    pub fn shard_dir(&self) -> PathBuf {
        self.data_path.join("dockShards")
    }

    /// shard owned by `rank`, keyed on the rank so no two workers ever share a file
    pub fn shard_path(&self, rank: usize) -> PathBuf {
        self.shard_dir()
            .join(format!("{SHARD_PREFIX}{rank}.{SHARD_EXTENSION}"))
    }

    /// scratch root for the jobs of `rank`
    pub fn scratch_dir(&self, rank: usize) -> PathBuf {
        self.data_path.join("scratch").join(rank.to_string())
    }

    /// resolve relative input files against the input directory
    pub fn input_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.input_dir.join(path)
        }
    }

    /// create the shard directory, the only directory that has to exist before a run
    pub fn prepare(&self) -> Result<(), ConfigErrors> {
        let path = self.shard_dir();

        fs::create_dir_all(&path).map_err(|error| ConfigErrors::Directory { path, error })
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct FarmConfig {
    // list of receptor ids, one per line
    pub receptors: PathBuf,
    // list of ligand ids, one per line
    pub ligands: PathBuf,
    // optional explicit receptor/ligand combinations, replaces the cross product
    #[serde(default, alias = "combination")]
    pub combinations: Option<PathBuf>,
    pub engine: EngineConfig,
    #[serde(default)]
    pub docking: DockingParams,
    // treat shard entries with a failed status as not done
    #[serde(default)]
    pub retry_failed: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub exec: PathBuf,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default = "default_receptor_dir")]
    pub receptor_dir: PathBuf,
    #[serde(default = "default_ligand_dir")]
    pub ligand_dir: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
}

/// Parameters handed to the docking engine with every job
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DockingParams {
    // results whose best score is not below the cutoff are not stored, absent disables it
    #[serde(default)]
    pub score_cutoff: Option<f64>,
    #[serde(default = "default_exhaustiveness")]
    pub exhaustiveness: u32,
    #[serde(default = "default_num_modes")]
    pub num_modes: u32,
    // 0 picks a random seed per job, engines take a C int
    #[serde(default)]
    pub seed: i32,
    #[serde(default = "default_energy_range")]
    pub energy_range: f64,
    // 0 is resolved to the available parallelism before dispatch
    #[serde(default)]
    pub cpu: usize,
}

impl Default for DockingParams {
    fn default() -> Self {
        Self {
            score_cutoff: None,
            exhaustiveness: default_exhaustiveness(),
            num_modes: default_num_modes(),
            seed: 0,
            energy_range: default_energy_range(),
            cpu: 0,
        }
    }
}

impl DockingParams {
    /// whether a result with these scores is worth storing
    pub fn accepts(&self, scores: &[f64]) -> bool {
        match self.score_cutoff {
            Some(cutoff) => matches!(scores.first(), Some(best) if *best < cutoff),
            None => true,
        }
    }

    pub fn randomize(&self) -> bool {
        self.seed == 0
    }

    /// Fill in values that depend on the machine the master runs on. All `workers` share that
    /// machine, each job gets an equal share of its cores.
    pub fn resolve_cpu(&mut self, workers: usize) {
        if self.cpu == 0 {
            let available = std::thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(1);
            self.cpu = cpu_share(available, workers);
        }
    }
}

/// cores per job when `workers` jobs run side by side on `available` cores, never 0
pub fn cpu_share(available: usize, workers: usize) -> usize {
    (available / workers.max(1)).max(1)
}

/// Entity lists loaded from the files named in the config
#[derive(Debug, Clone, Default)]
pub struct FarmInputs {
    pub receptors: Vec<String>,
    pub ligands: Vec<String>,
    pub combinations: Option<Vec<String>>,
}

/// read a list file, one entry per line, blank lines and `#` comments are skipped
pub fn load_list(path: &Path) -> Result<Vec<String>, ConfigErrors> {
    let read_error = |error| ConfigErrors::ReadList {
        path: path.to_path_buf(),
        error,
    };
    let reader = BufReader::new(File::open(path).map_err(read_error)?);
    let mut entries = Vec::new();

    for line in reader.lines() {
        let line = line.map_err(read_error)?;
        let entry = line.trim();

        if !entry.is_empty() && !entry.starts_with('#') {
            entries.push(entry.to_owned());
        }
    }

    Ok(entries)
}

impl FarmConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let file = File::open(path).map_err(ConfigErrors::ReadConfig)?;

        Ok(serde_yaml::from_reader(file)?)
    }

    /// load all entity lists relative to the input directory
    pub fn load_inputs(&self, environment: &Environment) -> Result<FarmInputs, ConfigErrors> {
        let receptors = load_list(&environment.input_path(&self.receptors))?;
        let ligands = load_list(&environment.input_path(&self.ligands))?;
        let combinations = self
            .combinations
            .as_ref()
            .map(|path| load_list(&environment.input_path(path)))
            .transpose()?;

        Ok(FarmInputs {
            receptors,
            ligands,
            combinations,
        })
    }

    /// Validate the config against the environment, returns true if any check failed
    pub fn preflight_checks(&self, environment: &Environment, inputs: &FarmInputs) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if inputs.receptors.is_empty() {
            error!(
                "No receptor found in {}",
                self.receptors.to_string_lossy()
            );
            contains_error = true;
        }

        if inputs.ligands.is_empty() {
            error!("No ligand found in {}", self.ligands.to_string_lossy());
            contains_error = true;
        }

        for (name, list, entries) in [
            ("receptor", &self.receptors, &inputs.receptors),
            ("ligand", &self.ligands, &inputs.ligands),
        ] {
            let invalid = entries
                .iter()
                .filter(|entry| entry.contains(KEY_DELIMITER))
                .collect::<Vec<_>>();

            if let Some(first) = invalid.first() {
                error!(
                    "{} {name} ids in {} contain '{KEY_DELIMITER}' (first: {first}), list ids, not paths",
                    invalid.len(),
                    list.to_string_lossy()
                );
                contains_error = true;
            }
        }

        if let Some(ref combinations) = inputs.combinations {
            if combinations.is_empty() {
                warn!("The combination list is empty, nothing will be docked");
            }
        }

        let exec = environment.input_path(&self.engine.exec);
        match check_executable(&exec) {
            Ok(true) => {}
            Ok(false) => {
                error!(
                    "engine.exec {} is not executable",
                    exec.to_string_lossy()
                );
                contains_error = true;
            }
            Err(e) => {
                error!(
                    "Failed to find engine.exec ({}): {e}",
                    exec.to_string_lossy()
                );
                contains_error = true;
            }
        }

        if let Some(cutoff) = self.docking.score_cutoff {
            if !cutoff.is_finite() {
                error!("docking.score_cutoff must be a finite number, got {cutoff}");
                contains_error = true;
            }
        }

        if self.docking.exhaustiveness == 0 {
            error!("docking.exhaustiveness cannot be 0");
            contains_error = true;
        }

        if self.docking.num_modes == 0 {
            error!("docking.num_modes cannot be 0, no pose would be reported");
            contains_error = true;
        }

        contains_error
    }
}

fn default_receptor_dir() -> PathBuf {
    PathBuf::from("receptors")
}

fn default_ligand_dir() -> PathBuf {
    PathBuf::from("ligands")
}

fn default_extension() -> String {
    "pdbqt".to_owned()
}

fn default_exhaustiveness() -> u32 {
    8
}

fn default_num_modes() -> u32 {
    9
}

fn default_energy_range() -> f64 {
    3.0
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
