use crate::keys::JobKey;
use itertools::iproduct;
use std::collections::HashSet;
use tracing::{debug, warn};

/// set of all jobs a run still has to hand out, iteration order is unspecified
pub type WorkSet = HashSet<JobKey>;

/// Build the work set for every receptor x ligand pair
pub fn cross_product(receptors: &[String], ligands: &[String]) -> WorkSet {
    // reserve the full key space up front, these sets get large
    let mut work = WorkSet::with_capacity(receptors.len() * ligands.len());

    for (receptor, ligand) in iproduct!(receptors, ligands) {
        match JobKey::new(receptor.as_str(), ligand.as_str()) {
            Ok(key) => {
                work.insert(key);
            }
            Err(error) => warn!("Skipping pair {receptor}/{ligand}: {error}"),
        }
    }

    work
}

/// Build the work set from an explicit list of `receptor/ligand` combinations
///
/// Lines that are not exactly two tokens or reference a receptor or ligand outside of the
/// given lists are dropped. Dropping is not an error, only a summary warning is emitted.
pub fn from_combinations<S: AsRef<str>>(
    combinations: &[S],
    receptors: &[String],
    ligands: &[String],
) -> WorkSet {
    let receptors: HashSet<&str> = receptors.iter().map(String::as_str).collect();
    let ligands: HashSet<&str> = ligands.iter().map(String::as_str).collect();

    let mut work = WorkSet::with_capacity(combinations.len());
    let mut dropped = 0usize;

    for line in combinations {
        let line = line.as_ref().trim();

        match line.parse::<JobKey>() {
            Ok(key) if receptors.contains(key.receptor()) && ligands.contains(key.ligand()) => {
                work.insert(key);
            }
            Ok(key) => {
                debug!(key = %key, "Combination references an unknown receptor or ligand");
                dropped += 1;
            }
            Err(error) => {
                debug!("Dropping combination: {error}");
                dropped += 1;
            }
        }
    }

    if dropped > 0 {
        warn!(
            dropped = dropped,
            kept = work.len(),
            "Dropped combinations that are malformed or outside of the receptor/ligand lists"
        );
    }

    work
}

/// Select the construction mode, explicit combinations take precedence over the cross product
pub fn build(
    receptors: &[String],
    ligands: &[String],
    combinations: Option<&[String]>,
) -> WorkSet {
    match combinations {
        Some(combinations) => from_combinations(combinations, receptors, ligands),
        None => cross_product(receptors, ligands),
    }
}

/// Remove every completed key from the work set, returns how many were actually removed
pub fn remove_completed<I>(work: &mut WorkSet, completed: I) -> usize
where
    I: IntoIterator<Item = JobKey>,
{
    completed
        .into_iter()
        .filter(|key| work.remove(key))
        .count()
}
