use super::models::{SimilarityEntry, SimilarityGroup};
use super::sqlite::Database;
use crate::fingerprint::SimilarityFingerprint;
use crate::paths;
use rusqlite::{params, Connection, OptionalExtension, Result};
use std::collections::BTreeMap;

impl Database {
    /// Store the active fingerprint for `entry.path`, replacing any earlier
    /// one, along with the folder it is grouped under.
    pub fn upsert_similarity(&self, entry: &SimilarityEntry) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        upsert_similarity_in(&tx, entry)?;
        tx.commit()
    }

    pub fn similarity_for(&self, path: &str) -> Result<Option<SimilarityEntry>> {
        self.lock()
            .query_row(
                "SELECT f.file_path, m.parent_path, f.fingerprint, f.version \
                 FROM similarity_fingerprint f \
                 LEFT JOIN similarity_metadata m ON m.file_path = f.file_path \
                 WHERE f.file_path = ?1",
                params![path],
                |row| {
                    Ok(SimilarityEntry {
                        path: row.get(0)?,
                        parent_path: row.get(1)?,
                        fingerprint: SimilarityFingerprint::from_hex(row.get::<_, String>(2)?),
                        version: row.get(3)?,
                    })
                },
            )
            .optional()
    }

    /// Fingerprints shared by two or more paths, across every folder.
    pub fn similar_groups(&self) -> Result<Vec<SimilarityGroup>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT fingerprint, file_path FROM similarity_fingerprint \
             WHERE fingerprint IN ( \
                 SELECT fingerprint FROM similarity_fingerprint \
                 GROUP BY fingerprint HAVING COUNT(*) >= 2) \
             ORDER BY fingerprint, file_path",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>>>()?;
        Ok(collect_groups(rows))
    }

    /// Fingerprints shared by two or more paths recorded under `parent`.
    pub fn similar_groups_under_parent(&self, parent: &str) -> Result<Vec<SimilarityGroup>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT f.fingerprint, f.file_path \
             FROM similarity_fingerprint f \
             JOIN similarity_metadata m ON m.file_path = f.file_path \
             WHERE m.parent_path = ?1 AND f.fingerprint IN ( \
                 SELECT f2.fingerprint FROM similarity_fingerprint f2 \
                 JOIN similarity_metadata m2 ON m2.file_path = f2.file_path \
                 WHERE m2.parent_path = ?1 \
                 GROUP BY f2.fingerprint HAVING COUNT(*) >= 2) \
             ORDER BY f.fingerprint, f.file_path",
        )?;
        let rows = stmt
            .query_map(params![parent], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(collect_groups(rows))
    }

    pub fn similarity_paths(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT file_path FROM similarity_fingerprint ORDER BY file_path")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>>>()?;
        Ok(paths)
    }

    pub fn remove_similarity_paths(&self, paths: &[String]) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut removed = 0;
        for path in paths {
            removed += remove_similarity_in(&tx, path)?;
        }
        tx.commit()?;
        Ok(removed)
    }
}

fn collect_groups(rows: Vec<(String, String)>) -> Vec<SimilarityGroup> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (fingerprint, path) in rows {
        grouped.entry(fingerprint).or_default().push(path);
    }
    grouped
        .into_iter()
        .map(|(fingerprint, members)| SimilarityGroup {
            fingerprint: SimilarityFingerprint::from_hex(fingerprint),
            members,
        })
        .collect()
}

pub(crate) fn upsert_similarity_in(conn: &Connection, entry: &SimilarityEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO similarity_fingerprint (file_path, fingerprint, version) \
         VALUES (?1, ?2, ?3) \
         ON CONFLICT(file_path) DO UPDATE SET \
             fingerprint = excluded.fingerprint, version = excluded.version",
        params![entry.path, entry.fingerprint.as_str(), entry.version],
    )?;
    match &entry.parent_path {
        Some(parent) => {
            conn.execute(
                "INSERT INTO similarity_metadata (file_path, parent_path) VALUES (?1, ?2) \
                 ON CONFLICT(file_path) DO UPDATE SET parent_path = excluded.parent_path",
                params![entry.path, parent],
            )?;
        }
        None => {
            conn.execute(
                "DELETE FROM similarity_metadata WHERE file_path = ?1",
                params![entry.path],
            )?;
        }
    }
    Ok(())
}

pub(crate) fn remove_similarity_in(conn: &Connection, path: &str) -> Result<usize> {
    conn.execute(
        "DELETE FROM similarity_metadata WHERE file_path = ?1",
        params![path],
    )?;
    conn.execute(
        "DELETE FROM similarity_fingerprint WHERE file_path = ?1",
        params![path],
    )
}

pub(crate) fn delete_similarity_under(conn: &Connection, prefix: &str) -> Result<usize> {
    let prefix = paths::normalize_dir(prefix);
    conn.execute(
        &format!(
            "DELETE FROM similarity_metadata WHERE {}",
            paths::prefix_match("file_path", 1)
        ),
        params![prefix],
    )?;
    conn.execute(
        &format!(
            "DELETE FROM similarity_fingerprint WHERE {}",
            paths::prefix_match("file_path", 1)
        ),
        params![prefix],
    )
}

pub(crate) fn similarity_paths_under(conn: &Connection, prefix: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT file_path FROM similarity_fingerprint WHERE {} ORDER BY file_path",
        paths::prefix_match("file_path", 1)
    ))?;
    let paths = stmt
        .query_map(params![paths::normalize_dir(prefix)], |row| row.get(0))?
        .collect::<Result<Vec<_>>>()?;
    Ok(paths)
}

/// Rewrite fingerprint keys under `from`. Moved paths are regrouped under
/// their new parent folder.
pub(crate) fn rename_similarity(conn: &Connection, from: &str, to: &str) -> Result<usize> {
    let from = paths::normalize_dir(from);
    let to = paths::normalize_dir(to);
    delete_similarity_under(conn, &to)?;
    for table in ["similarity_metadata", "similarity_fingerprint"] {
        conn.execute(
            &format!(
                "UPDATE {} SET file_path = ?2 || substr(file_path, length(?1) + 1) WHERE {}",
                table,
                paths::prefix_match("file_path", 1)
            ),
            params![from, to],
        )?;
    }

    let moved = similarity_paths_under(conn, &to)?;
    let mut regroup =
        conn.prepare("UPDATE similarity_metadata SET parent_path = ?2 WHERE file_path = ?1")?;
    for path in &moved {
        if let Some(parent) = paths::parent_of(path) {
            regroup.execute(params![path, parent])?;
        }
    }
    Ok(moved.len())
}
