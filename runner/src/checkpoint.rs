use crate::{
    config::{SHARD_EXTENSION, SHARD_PREFIX},
    database::{ResultShard, ShardError, ShardRecord},
    keys::JobKey,
};
use globset::GlobBuilder;
use ignore::{DirEntry, WalkBuilder};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// List every shard file in `dir`, sorted so that all workers agree on the partitioning.
/// A missing directory simply has no shards.
pub fn discover_shards(dir: &Path) -> Result<Vec<PathBuf>, ShardError> {
    if !dir.is_dir() {
        debug!(dir = ?dir, "No shard directory, nothing to resume from");
        return Ok(Vec::new());
    }

    let glob = GlobBuilder::new(&format!("{SHARD_PREFIX}*.{SHARD_EXTENSION}"))
        .literal_separator(true)
        .build()?
        .compile_matcher();

    let mut builder = WalkBuilder::new(dir);
    builder.standard_filters(false).max_depth(Some(1));

    Ok(builder
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Failed to list shard directory: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().map_or(false, |kind| kind.is_file()))
        .filter(|entry| glob.is_match(entry.file_name()))
        .map(DirEntry::into_path)
        .sorted()
        .collect_vec())
}

/// The shards read by worker `index` out of `stride` workers: positions `index, index + stride, ...`
pub fn partition(shards: &[PathBuf], index: usize, stride: usize) -> impl Iterator<Item = &PathBuf> {
    shards.iter().skip(index).step_by(stride.max(1))
}

/// Every key recorded in one shard, with `success_only` failed-only keys are left out
pub fn scan_shard(path: &Path, success_only: bool) -> Result<Vec<JobKey>, ShardError> {
    ResultShard::open_read_only(path)?.keys(success_only)
}

/// Scan the share of worker `index`. A shard that can't be read contributes no keys, its jobs
/// are simply run again.
pub fn scan_partition(
    shards: &[PathBuf],
    index: usize,
    stride: usize,
    success_only: bool,
) -> Vec<JobKey> {
    let mut keys = Vec::new();

    for path in partition(shards, index, stride) {
        match scan_shard(path, success_only) {
            Ok(found) => {
                debug!(path = ?path, keys = found.len(), "Scanned shard");
                keys.extend(found);
            }
            Err(e) => error!(path = ?path, "Failed to read checkpoint shard: {e}"),
        }
    }

    keys
}

/// Latest record of every key in `shards`, shard by shard. Unreadable shards are skipped like
/// in a resume scan.
pub fn scan_records(shards: &[PathBuf], success_only: bool) -> Vec<ShardRecord> {
    let mut records = Vec::new();

    for path in shards {
        let read = ResultShard::open_read_only(path).and_then(|shard| {
            let keys = shard.keys(success_only)?;
            let found: Result<Vec<_>, _> = keys
                .iter()
                .filter_map(|key| shard.record(key).transpose())
                .collect();

            found
        });

        match read {
            Ok(found) => records.extend(found),
            Err(e) => error!(path = ?path, "Failed to read shard: {e}"),
        }
    }

    records
}

#[cfg(test)]
#[path = "checkpoint_test.rs"]
mod checkpoint_test;
