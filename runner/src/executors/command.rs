use super::{Engine, EngineError, JobInput, JobOutput};
use crate::{
    config::{ConfigErrors, EngineConfig, Environment},
    database::POSES,
    keys::JobKey,
};
use std::{
    collections::hash_map::RandomState,
    fs,
    hash::{BuildHasher, Hash, Hasher},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tracing::{debug, warn};

/// Engine that runs an external docking executable once per job
#[derive(Debug, Clone)]
pub struct CommandEngine {
    pub exec: PathBuf,
    pub params: Vec<String>,
    pub receptor_dir: PathBuf,
    pub ligand_dir: PathBuf,
    pub extension: String,
}

/// Extract the affinities of all reported modes from an engine log
///
/// The table starts after the dashed `-----+----` separator, every following row with an
/// integer mode index contributes its second column. The first non matching row ends the table,
/// non finite affinities are skipped.
pub fn parse_scores(log: &str) -> Vec<f64> {
    log.lines()
        .skip_while(|line| !line.trim_start().starts_with("-----+"))
        .skip(1)
        .map_while(|line| {
            let mut columns = line.split_whitespace();
            columns.next()?.parse::<u32>().ok()?;

            columns.next()?.parse::<f64>().ok()
        })
        .filter(|score| score.is_finite())
        .collect()
}

impl CommandEngine {
    pub fn load(config: &EngineConfig, environment: &Environment) -> Result<Self, ConfigErrors> {
        Ok(Self {
            exec: environment.input_path(&config.exec),
            params: config.params.clone(),
            receptor_dir: environment.input_path(&config.receptor_dir),
            ligand_dir: environment.input_path(&config.ligand_dir),
            extension: config.extension.clone(),
        })
    }

    fn input_files(&self, key: &JobKey) -> (PathBuf, PathBuf) {
        (
            self.receptor_dir
                .join(format!("{}.{}", key.receptor(), self.extension)),
            self.ligand_dir
                .join(format!("{}.{}", key.ligand(), self.extension)),
        )
    }

    fn seed(input: &JobInput) -> i32 {
        if input.params.randomize() {
            // RandomState is seeded randomly per instance, keep the top 31 bits
            let mut hasher = RandomState::new().build_hasher();
            input.key.hash(&mut hasher);
            (hasher.finish() >> 33) as i32
        } else {
            input.params.seed
        }
    }

    fn run(&self, input: &JobInput, scratch: &Path) -> Result<JobOutput, EngineError> {
        let (receptor, ligand) = self.input_files(&input.key);

        for file in [&receptor, &ligand] {
            if !file.is_file() {
                return Err(EngineError::MissingInput(file.clone()));
            }
        }

        let params = &input.params;
        let output = Command::new(&self.exec)
            .args(self.params.iter())
            .arg("--receptor")
            .arg(&receptor)
            .arg("--ligand")
            .arg(&ligand)
            .arg("--out")
            .arg(scratch.join(POSES))
            .arg("--exhaustiveness")
            .arg(params.exhaustiveness.to_string())
            .arg("--num_modes")
            .arg(params.num_modes.to_string())
            .arg("--energy_range")
            .arg(params.energy_range.to_string())
            .arg("--seed")
            .arg(Self::seed(input).to_string())
            .arg("--cpu")
            .arg(params.cpu.to_string())
            .current_dir(scratch)
            .stdin(Stdio::null())
            .output()
            .map_err(EngineError::Spawn)?;

        if !output.status.success() {
            return Err(EngineError::Exit {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        let score_log = String::from_utf8_lossy(&output.stdout).into_owned();
        let scores = parse_scores(&score_log);
        let poses = match fs::read_to_string(scratch.join(POSES)) {
            Ok(poses) => poses,
            Err(error) => {
                warn!(key = %input.key, "Engine did not write poses: {error}");
                String::new()
            }
        };

        let success = !scores.is_empty();
        let message = if success {
            String::new()
        } else {
            EngineError::NoPoses.to_string()
        };

        Ok(JobOutput {
            success,
            num_pose: scores.len() as u32,
            message,
            scores,
            score_log,
            poses,
            scratch_dir: None,
        })
    }
}

impl Engine for CommandEngine {
    fn dock(&self, input: &JobInput, scratch_root: &Path) -> JobOutput {
        let scratch = scratch_root.join(input.key.scratch_name());

        if let Err(error) = fs::create_dir_all(&scratch) {
            return JobOutput::failed(
                &EngineError::Scratch {
                    path: scratch,
                    error,
                },
                None,
            );
        }

        match self.run(input, &scratch) {
            Ok(mut output) => {
                output.scratch_dir = Some(scratch);
                output
            }
            Err(error) => {
                debug!(key = %input.key, "Docking failed: {error}");
                JobOutput::failed(&error, Some(scratch))
            }
        }
    }
}
