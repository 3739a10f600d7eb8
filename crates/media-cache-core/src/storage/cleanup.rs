//! Operations spanning every path-keyed table. Each runs in one transaction
//! so a reader never sees a path half-removed.

use super::classification::{
    classification_paths_under, delete_classification, delete_classifications_under,
    rename_classifications,
};
use super::duplicates::{
    checksum_paths_under, delete_checksums_under, prune_orphan_groups_in, remove_checksum_in,
    rename_checksums,
};
use super::file_state::{
    delete_file_state, delete_file_state_under, file_state_paths_under, rename_file_state,
};
use super::similarity::{
    delete_similarity_under, remove_similarity_in, rename_similarity, similarity_paths_under,
};
use super::sqlite::Database;
use rusqlite::Result;
use std::collections::BTreeSet;
use tracing::debug;

/// Rows removed or rewritten by a cleanup operation, per table family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupCounts {
    pub classifications: usize,
    pub checksums: usize,
    pub fingerprints: usize,
    pub orphan_groups: usize,
}

impl CleanupCounts {
    pub fn total(&self) -> usize {
        self.classifications + self.checksums + self.fingerprints
    }
}

impl Database {
    /// Remove every path-keyed row at or under `prefix`. Running it again is a no-op.
    pub fn delete_by_path_prefix(&self, prefix: &str) -> Result<CleanupCounts> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let counts = CleanupCounts {
            classifications: delete_classifications_under(&tx, prefix)?,
            checksums: delete_checksums_under(&tx, prefix)?,
            fingerprints: delete_similarity_under(&tx, prefix)?,
            orphan_groups: prune_orphan_groups_in(&tx)?,
        };
        delete_file_state_under(&tx, prefix)?;
        tx.commit()?;
        debug!("Deleted {} rows under {}", counts.total(), prefix);
        Ok(counts)
    }

    /// Remove individual paths from every path-keyed table.
    pub fn remove_paths(&self, paths: &[String]) -> Result<CleanupCounts> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut counts = CleanupCounts::default();
        for path in paths {
            counts.classifications += delete_classification(&tx, path)?;
            counts.checksums += remove_checksum_in(&tx, path)?;
            counts.fingerprints += remove_similarity_in(&tx, path)?;
            delete_file_state(&tx, path)?;
        }
        counts.orphan_groups = prune_orphan_groups_in(&tx)?;
        tx.commit()?;
        Ok(counts)
    }

    /// Rewrite `from` (and every key beneath it) to `to` across all
    /// path-keyed tables, replacing any rows already cached under `to`.
    pub fn rename_path(&self, from: &str, to: &str) -> Result<CleanupCounts> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let counts = CleanupCounts {
            classifications: rename_classifications(&tx, from, to)?,
            checksums: rename_checksums(&tx, from, to)?,
            fingerprints: rename_similarity(&tx, from, to)?,
            orphan_groups: prune_orphan_groups_in(&tx)?,
        };
        rename_file_state(&tx, from, to)?;
        tx.commit()?;
        debug!("Renamed {} -> {} ({} rows)", from, to, counts.total());
        Ok(counts)
    }

    /// Every cached path at or under `prefix`, from any table, sorted.
    pub fn cached_paths_under(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut all = BTreeSet::new();
        all.extend(classification_paths_under(&conn, prefix)?);
        all.extend(checksum_paths_under(&conn, prefix)?);
        all.extend(similarity_paths_under(&conn, prefix)?);
        all.extend(file_state_paths_under(&conn, prefix)?);
        Ok(all.into_iter().collect())
    }
}
