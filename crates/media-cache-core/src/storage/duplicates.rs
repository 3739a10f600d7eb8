use super::models::{ChecksumEntry, DuplicateGroup, DuplicateGroupWithMembers};
use super::sqlite::Database;
use crate::fingerprint::ContentChecksum;
use crate::paths;
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use tracing::debug;

const GROUP_SELECT: &str = "SELECT g.id, g.checksum, g.file_size, g.is_empty, g.is_directory, \
            COUNT(m.file_path), MIN(COALESCE(fc.is_junk, 0)) \
     FROM duplicate_group g \
     JOIN duplicate_group_member m ON m.group_id = g.id \
     LEFT JOIN file_checksum fc ON fc.file_path = m.file_path";

fn group_from_row(row: &Row<'_>) -> Result<DuplicateGroup> {
    let file_size: i64 = row.get(2)?;
    let member_count: i64 = row.get(5)?;
    Ok(DuplicateGroup {
        id: row.get(0)?,
        checksum: ContentChecksum::from_hex(row.get::<_, String>(1)?),
        file_size,
        is_empty: row.get(3)?,
        is_directory: row.get(4)?,
        member_count,
        wasted_bytes: file_size * (member_count - 1).max(0),
        is_junk: row.get(6)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> Result<ChecksumEntry> {
    Ok(ChecksumEntry {
        path: row.get(0)?,
        checksum: ContentChecksum::from_hex(row.get::<_, String>(1)?),
        file_size: row.get(2)?,
        last_modified: row.get(3)?,
        is_directory: row.get(4)?,
        is_junk: row.get(5)?,
        version: row.get(6)?,
    })
}

impl Database {
    /// Cache a path's checksum and fold it into the duplicate group for that
    /// checksum, creating the group once a second path shares it.
    pub fn record_checksum(&self, entry: &ChecksumEntry) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        record_checksum_in(&tx, entry)?;
        tx.commit()
    }

    /// Cached empty-directory entries at or under `prefix`.
    pub fn directory_paths_under(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT file_path FROM file_checksum WHERE is_directory = 1 AND ({}) ORDER BY file_path",
            paths::prefix_match("file_path", 1)
        ))?;
        let paths = stmt
            .query_map(params![paths::normalize_dir(prefix)], |row| row.get(0))?
            .collect::<Result<Vec<_>>>()?;
        Ok(paths)
    }

    pub fn get_checksum(&self, path: &str) -> Result<Option<ChecksumEntry>> {
        self.lock()
            .query_row(
                "SELECT file_path, checksum, file_size, last_modified, is_directory, is_junk, version \
                 FROM file_checksum WHERE file_path = ?1",
                params![path],
                entry_from_row,
            )
            .optional()
    }

    /// Drop the listed paths from the checksum cache and their groups; groups
    /// left with fewer than two members go with them.
    pub fn remove_checksum_paths(&self, paths: &[String]) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut removed = 0;
        for path in paths {
            removed += remove_checksum_in(&tx, path)?;
        }
        prune_orphan_groups_in(&tx)?;
        tx.commit()?;
        Ok(removed)
    }

    pub fn checksum_paths(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT file_path FROM file_checksum ORDER BY file_path")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>>>()?;
        Ok(paths)
    }

    pub fn prune_orphan_groups(&self) -> Result<usize> {
        prune_orphan_groups_in(&self.lock())
    }

    /// All duplicate groups, largest reclaimable space first.
    pub fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "{} GROUP BY g.id ORDER BY g.file_size * (COUNT(m.file_path) - 1) DESC, g.id",
            GROUP_SELECT
        ))?;
        let groups = stmt
            .query_map([], group_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(groups)
    }

    pub fn group_members(&self, group_id: i64) -> Result<Vec<String>> {
        group_members_in(&self.lock(), group_id)
    }

    pub fn duplicate_group_for_path(&self, path: &str) -> Result<Option<DuplicateGroupWithMembers>> {
        let conn = self.lock();
        let group = conn
            .query_row(
                &format!(
                    "{} WHERE g.id = (SELECT group_id FROM duplicate_group_member WHERE file_path = ?1) \
                     GROUP BY g.id",
                    GROUP_SELECT
                ),
                params![path],
                group_from_row,
            )
            .optional()?;
        match group {
            Some(group) => {
                let members = group_members_in(&conn, group.id)?;
                Ok(Some(DuplicateGroupWithMembers { group, members }))
            }
            None => Ok(None),
        }
    }
}

fn group_members_in(conn: &Connection, group_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT file_path FROM duplicate_group_member WHERE group_id = ?1 ORDER BY file_path",
    )?;
    let members = stmt
        .query_map(params![group_id], |row| row.get(0))?
        .collect::<Result<Vec<_>>>()?;
    Ok(members)
}

pub(crate) fn record_checksum_in(conn: &Connection, entry: &ChecksumEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO file_checksum \
         (file_path, checksum, file_size, last_modified, is_directory, is_junk, version) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
         ON CONFLICT(file_path) DO UPDATE SET \
             checksum = excluded.checksum, \
             file_size = excluded.file_size, \
             last_modified = excluded.last_modified, \
             is_directory = excluded.is_directory, \
             is_junk = excluded.is_junk, \
             version = excluded.version",
        params![
            entry.path,
            entry.checksum.as_str(),
            entry.file_size,
            entry.last_modified,
            entry.is_directory,
            entry.is_junk,
            entry.version,
        ],
    )?;

    // The path's content may have changed since it joined a group.
    conn.execute(
        "DELETE FROM duplicate_group_member WHERE file_path = ?1",
        params![entry.path],
    )?;

    let peers: i64 = conn.query_row(
        "SELECT COUNT(*) FROM file_checksum WHERE checksum = ?1",
        params![entry.checksum.as_str()],
        |row| row.get(0),
    )?;

    if peers >= 2 {
        conn.execute(
            "INSERT INTO duplicate_group (checksum, file_size, is_empty, is_directory) \
             VALUES (?1, ?2, ?3, ?4) ON CONFLICT(checksum) DO NOTHING",
            params![
                entry.checksum.as_str(),
                entry.file_size,
                entry.file_size == 0,
                entry.is_directory,
            ],
        )?;
        let group_id: i64 = conn.query_row(
            "SELECT id FROM duplicate_group WHERE checksum = ?1",
            params![entry.checksum.as_str()],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO duplicate_group_member (group_id, file_path) \
             SELECT ?1, file_path FROM file_checksum WHERE checksum = ?2",
            params![group_id, entry.checksum.as_str()],
        )?;
    }

    let pruned = prune_orphan_groups_in(conn)?;
    if pruned > 0 {
        debug!("Pruned {} orphaned duplicate groups", pruned);
    }
    Ok(())
}

pub(crate) fn remove_checksum_in(conn: &Connection, path: &str) -> Result<usize> {
    conn.execute(
        "DELETE FROM duplicate_group_member WHERE file_path = ?1",
        params![path],
    )?;
    conn.execute(
        "DELETE FROM file_checksum WHERE file_path = ?1",
        params![path],
    )
}

/// Delete every group with fewer than two members. Remaining single
/// memberships cascade away with the group.
pub(crate) fn prune_orphan_groups_in(conn: &Connection) -> Result<usize> {
    conn.execute(
        "DELETE FROM duplicate_group WHERE id NOT IN ( \
             SELECT group_id FROM duplicate_group_member \
             GROUP BY group_id HAVING COUNT(*) >= 2)",
        [],
    )
}

pub(crate) fn delete_checksums_under(conn: &Connection, prefix: &str) -> Result<usize> {
    let prefix = paths::normalize_dir(prefix);
    conn.execute(
        &format!(
            "DELETE FROM duplicate_group_member WHERE {}",
            paths::prefix_match("file_path", 1)
        ),
        params![prefix],
    )?;
    conn.execute(
        &format!(
            "DELETE FROM file_checksum WHERE {}",
            paths::prefix_match("file_path", 1)
        ),
        params![prefix],
    )
}

pub(crate) fn checksum_paths_under(conn: &Connection, prefix: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT file_path FROM file_checksum WHERE {} ORDER BY file_path",
        paths::prefix_match("file_path", 1)
    ))?;
    let paths = stmt
        .query_map(params![paths::normalize_dir(prefix)], |row| row.get(0))?
        .collect::<Result<Vec<_>>>()?;
    Ok(paths)
}

pub(crate) fn rename_checksums(conn: &Connection, from: &str, to: &str) -> Result<usize> {
    let from = paths::normalize_dir(from);
    let to = paths::normalize_dir(to);
    delete_checksums_under(conn, &to)?;
    conn.execute(
        &format!(
            "UPDATE duplicate_group_member SET file_path = ?2 || substr(file_path, length(?1) + 1) \
             WHERE {}",
            paths::prefix_match("file_path", 1)
        ),
        params![from, to],
    )?;
    conn.execute(
        &format!(
            "UPDATE file_checksum SET file_path = ?2 || substr(file_path, length(?1) + 1) WHERE {}",
            paths::prefix_match("file_path", 1)
        ),
        params![from, to],
    )
}
