//! Keeps cached state a subset of what is currently true for files that
//! currently exist and are currently eligible.

use crate::error::Error;
use crate::feature::{ClassificationFlag, Feature};
use crate::paths;
use crate::policy::PolicyEngine;
use crate::storage::{CleanupCounts, Database};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct Cleanup {
    db: Arc<Database>,
    policy: PolicyEngine,
}

impl Cleanup {
    pub fn new(db: Arc<Database>, policy: PolicyEngine) -> Self {
        Self { db, policy }
    }

    /// A directory (or file) was deleted.
    pub fn delete_by_path_prefix(&self, prefix: &str) -> Result<CleanupCounts, Error> {
        let counts = self.db.delete_by_path_prefix(prefix)?;
        info!(
            "Removed {} cached rows under {} ({} orphaned groups)",
            counts.total(),
            prefix,
            counts.orphan_groups
        );
        Ok(counts)
    }

    pub fn remove_paths(&self, paths: &[String]) -> Result<CleanupCounts, Error> {
        if paths.is_empty() {
            return Ok(CleanupCounts::default());
        }
        Ok(self.db.remove_paths(paths)?)
    }

    /// The user dismissed one signal; the rest of each record stays cached.
    pub fn unset_flag(&self, flag: ClassificationFlag, paths: &[String]) -> Result<usize, Error> {
        Ok(self.db.unset_flag(flag, paths)?)
    }

    pub fn prune_orphan_groups(&self) -> Result<usize, Error> {
        Ok(self.db.prune_orphan_groups()?)
    }

    /// Drop this feature's cached results for every path it no longer covers.
    /// Call after adding or removing a rule or toggling the feature.
    pub fn reconcile_feature(&self, feature: Feature) -> Result<usize, Error> {
        let rules = self.policy.feature_rules(feature)?;
        let cached = match feature {
            Feature::Duplicates => self.db.checksum_paths()?,
            Feature::SimilarImages => self.db.similarity_paths()?,
            classification => self.db.classified_paths(classification)?,
        };
        let stale: Vec<String> = cached
            .into_iter()
            .filter(|path| !rules.is_eligible(path))
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }

        let removed = match feature {
            Feature::Duplicates => self.db.remove_checksum_paths(&stale)?,
            Feature::SimilarImages => self.db.remove_similarity_paths(&stale)?,
            classification => self.db.clear_feature(classification, &stale)?,
        };
        info!("{}: dropped results for {} ineligible paths", feature, removed);
        Ok(removed)
    }

    pub fn reconcile_all(&self) -> Result<usize, Error> {
        let mut removed = 0;
        for feature in Feature::ALL {
            removed += self.reconcile_feature(feature)?;
        }
        Ok(removed)
    }

    /// A file or directory moved. Cached results follow it.
    pub fn rename_path(&self, from: &str, to: &str) -> Result<CleanupCounts, Error> {
        let from_dir = paths::normalize_dir(from);
        let to_dir = paths::normalize_dir(to);
        if from_dir == to_dir {
            return Ok(CleanupCounts::default());
        }
        if paths::is_under(&to_dir, &from_dir) || paths::is_under(&from_dir, &to_dir) {
            return Err(Error::Other(format!(
                "cannot move {} into or above itself ({})",
                from, to
            )));
        }
        let counts = self.db.rename_path(&from_dir, &to_dir)?;
        info!("Moved {} cached rows from {} to {}", counts.total(), from, to);
        Ok(counts)
    }

    /// Check cached paths under `prefix` against the filesystem and remove
    /// those that no longer exist, along with directories cached as empty
    /// that now have entries. Returns the removed paths.
    pub fn prune_missing(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let cached = self.db.cached_paths_under(prefix)?;
        let directories: HashSet<String> = self.db.directory_paths_under(prefix)?.into_iter().collect();
        let stale: Vec<String> = cached
            .into_iter()
            .filter(|path| {
                if directories.contains(path) {
                    !is_empty_dir(Path::new(path))
                } else {
                    !Path::new(path).exists()
                }
            })
            .collect();
        debug!("{} cached paths under {} are stale", stale.len(), prefix);
        self.remove_paths(&stale)?;
        Ok(stale)
    }
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
