pub mod shard;

use crate::keys::{JobKey, KeyError};
use std::path::PathBuf;
use thiserror::Error;

pub use shard::ResultShard;

#[derive(Error, Debug)]
pub enum ShardError {
    #[error("SQLite operation failed: {0}")]
    SQLite(#[from] rusqlite::Error),
    #[error("Shard contains an invalid key: {0}")]
    InvalidKey(#[from] KeyError),
    #[error("Invalid shard file pattern")]
    Pattern(#[from] globset::Error),
    #[error("Failed to open shard {path:?}: {error}")]
    Open {
        path: PathBuf,
        error: rusqlite::Error,
    },
}

/// Names of the artifacts stored next to a result, mirrors the `file/` branch of a record
pub const SCORE_LOG: &str = "scores.log";
pub const POSES: &str = "poses.pdbqt";

/// One result as it was read back from a shard
#[derive(Debug, Clone, PartialEq)]
pub struct ShardRecord {
    pub key: JobKey,
    pub success: bool,
    pub num_pose: u32,
    pub message: String,
    // ordered by their 1-based position in the shard
    pub scores: Vec<f64>,
    pub score_log: String,
    pub poses: String,
}

// A shard is append only: every commit adds a `dock` row and its children, nothing is updated.
// The hierarchy receptor -> ligand -> {status, meta, scores, files} is flattened into tables.
pub const SQL_SCHEMA: [&str; 4] = [
    "create table if not exists dock (
    id integer primary key,
    receptor text not null,
    ligand text not null,
    status boolean not null,
    num_pose integer not null,
    mesg text not null
);",
    "create index if not exists dock_key on dock (receptor, ligand);",
    "create table if not exists scores (
    dock integer not null references dock (id),
    position integer not null,
    score real not null,
    primary key (dock, position)
);",
    "create table if not exists files (
    dock integer not null references dock (id),
    name text not null,
    content text not null,
    primary key (dock, name)
);",
];
pub const SQL_SCHEMA_NUMBER: usize = SQL_SCHEMA.len();
