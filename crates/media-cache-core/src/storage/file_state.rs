//! Size and mtime of each analyzed path, used to spot files rewritten in
//! place whatever features are enabled for them.

use super::models::FileState;
use super::sqlite::Database;
use crate::paths;
use rusqlite::{params, Connection, OptionalExtension, Result};

impl Database {
    pub fn file_state(&self, path: &str) -> Result<Option<FileState>> {
        self.lock()
            .query_row(
                "SELECT file_size, last_modified FROM file_state WHERE file_path = ?1",
                params![path],
                |row| {
                    Ok(FileState {
                        file_size: row.get(0)?,
                        last_modified: row.get(1)?,
                    })
                },
            )
            .optional()
    }
}

pub(crate) fn record_file_state_in(conn: &Connection, path: &str, state: FileState) -> Result<()> {
    conn.execute(
        "INSERT INTO file_state (file_path, file_size, last_modified) VALUES (?1, ?2, ?3) \
         ON CONFLICT(file_path) DO UPDATE SET \
             file_size = excluded.file_size, last_modified = excluded.last_modified",
        params![path, state.file_size, state.last_modified],
    )?;
    Ok(())
}

pub(crate) fn delete_file_state(conn: &Connection, path: &str) -> Result<usize> {
    conn.execute("DELETE FROM file_state WHERE file_path = ?1", params![path])
}

pub(crate) fn delete_file_state_under(conn: &Connection, prefix: &str) -> Result<usize> {
    conn.execute(
        &format!("DELETE FROM file_state WHERE {}", paths::prefix_match("file_path", 1)),
        params![paths::normalize_dir(prefix)],
    )
}

pub(crate) fn file_state_paths_under(conn: &Connection, prefix: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT file_path FROM file_state WHERE {} ORDER BY file_path",
        paths::prefix_match("file_path", 1)
    ))?;
    let paths = stmt
        .query_map(params![paths::normalize_dir(prefix)], |row| row.get(0))?
        .collect::<Result<Vec<_>>>()?;
    Ok(paths)
}

pub(crate) fn rename_file_state(conn: &Connection, from: &str, to: &str) -> Result<usize> {
    let from = paths::normalize_dir(from);
    let to = paths::normalize_dir(to);
    delete_file_state_under(conn, &to)?;
    conn.execute(
        &format!(
            "UPDATE file_state SET file_path = ?2 || substr(file_path, length(?1) + 1) WHERE {}",
            paths::prefix_match("file_path", 1)
        ),
        params![from, to],
    )
}
