use std::{fmt, str::FromStr};
use thiserror::Error;

/// separator between the receptor and ligand part of a job key
pub const KEY_DELIMITER: char = '/';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Job key '{0}' must consist of exactly two '/' separated parts")]
    Malformed(String),
    #[error("Entity id '{0}' must be non-empty and must not contain '/'")]
    InvalidEntity(String),
}

/// Identifier of a single receptor/ligand evaluation
/// canonical textual form is `receptor/ligand`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey {
    receptor: String,
    ligand: String,
}

fn check_entity(entity: &str) -> Result<(), KeyError> {
    if entity.is_empty() || entity.contains(KEY_DELIMITER) {
        Err(KeyError::InvalidEntity(entity.to_owned()))
    } else {
        Ok(())
    }
}

impl JobKey {
    pub fn new(receptor: impl Into<String>, ligand: impl Into<String>) -> Result<Self, KeyError> {
        let (receptor, ligand) = (receptor.into(), ligand.into());
        check_entity(&receptor)?;
        check_entity(&ligand)?;

        Ok(Self { receptor, ligand })
    }

    pub fn receptor(&self) -> &str {
        &self.receptor
    }

    pub fn ligand(&self) -> &str {
        &self.ligand
    }

    /// file system friendly name, used for per job scratch directories
    pub fn scratch_name(&self) -> String {
        format!("{}_{}", self.receptor, self.ligand)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{KEY_DELIMITER}{}", self.receptor, self.ligand)
    }
}

impl FromStr for JobKey {
    type Err = KeyError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let mut tokens = key.split(KEY_DELIMITER);

        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(receptor), Some(ligand), None) if !receptor.is_empty() && !ligand.is_empty() => {
                Ok(Self {
                    receptor: receptor.to_owned(),
                    ligand: ligand.to_owned(),
                })
            }
            _ => Err(KeyError::Malformed(key.to_owned())),
        }
    }
}
