use super::models::{ClassificationRecord, FeatureVersions};
use super::sqlite::Database;
use crate::error::Error;
use crate::feature::{ClassificationFlag, Feature, Predicate};
use crate::paths;
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use tracing::debug;

const SELECT_COLUMNS: &str = "file_path, is_blur, is_meme, is_sad, is_distracted, is_sleeping, \
     is_low_light, face_count, blur_version, meme_version, low_light_version, \
     image_features_version";

const NO_FEATURE_ANALYZED: &str = "blur_version IS NULL AND meme_version IS NULL \
     AND low_light_version IS NULL AND image_features_version IS NULL";

fn record_from_row(row: &Row<'_>) -> Result<ClassificationRecord> {
    Ok(ClassificationRecord {
        path: row.get(0)?,
        is_blur: row.get(1)?,
        is_meme: row.get(2)?,
        is_sad: row.get(3)?,
        is_distracted: row.get(4)?,
        is_sleeping: row.get(5)?,
        is_low_light: row.get(6)?,
        face_count: row.get(7)?,
        versions: FeatureVersions {
            blur: row.get(8)?,
            meme: row.get(9)?,
            low_light: row.get(10)?,
            image_features: row.get(11)?,
        },
    })
}

impl Database {
    /// Replace the whole record for `record.path` in one statement.
    ///
    /// A record naming no analyzed feature is indistinguishable from "not yet
    /// analyzed": an all-clear one removes the row, one carrying signals is
    /// rejected.
    pub fn upsert_classification(&self, record: &ClassificationRecord) -> Result<(), Error> {
        if record.versions.is_empty() && record.has_signals() {
            return Err(Error::UnanalyzedRecord(record.path.clone()));
        }
        upsert_classification_in(&self.lock(), record)?;
        Ok(())
    }

    pub fn get_classification(&self, path: &str) -> Result<Option<ClassificationRecord>> {
        get_classification_in(&self.lock(), path)
    }

    pub fn classifications_matching(&self, predicate: Predicate) -> Result<Vec<ClassificationRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM classification WHERE {} ORDER BY file_path",
            SELECT_COLUMNS,
            predicate.where_clause()
        ))?;
        let records = stmt
            .query_map([], record_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Paths the given classification feature has analyzed, at any version.
    pub fn classified_paths(&self, feature: Feature) -> Result<Vec<String>> {
        let Some(version_column) = feature.version_column() else {
            return Ok(Vec::new());
        };
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT file_path FROM classification WHERE {} IS NOT NULL ORDER BY file_path",
            version_column
        ))?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>>>()?;
        Ok(paths)
    }

    /// Clear one flag on every listed path, leaving records and sibling flags intact.
    pub fn unset_flag(&self, flag: ClassificationFlag, paths: &[String]) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "UPDATE classification SET {} = 0 WHERE file_path = ?1",
                flag.column()
            ))?;
            for path in paths {
                updated += stmt.execute(params![path])?;
            }
        }
        tx.commit()?;
        debug!("Unset {} on {} records", flag, updated);
        Ok(updated)
    }

    /// Forget one feature's results for the listed paths. Rows left with no
    /// analyzed feature are deleted.
    pub fn clear_feature(&self, feature: Feature, paths: &[String]) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let cleared = clear_feature_in(&tx, feature, paths)?;
        tx.commit()?;
        debug!("Cleared {} results on {} records", feature, cleared);
        Ok(cleared)
    }
}

pub(crate) fn get_classification_in(
    conn: &Connection,
    path: &str,
) -> Result<Option<ClassificationRecord>> {
    conn.query_row(
        &format!("SELECT {} FROM classification WHERE file_path = ?1", SELECT_COLUMNS),
        params![path],
        record_from_row,
    )
    .optional()
}

pub(crate) fn upsert_classification_in(conn: &Connection, record: &ClassificationRecord) -> Result<()> {
    if record.versions.is_empty() {
        conn.execute(
            "DELETE FROM classification WHERE file_path = ?1",
            params![record.path],
        )?;
        return Ok(());
    }

    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO classification \
         (file_path, is_blur, is_meme, is_sad, is_distracted, is_sleeping, is_low_light, \
          face_count, blur_version, meme_version, low_light_version, image_features_version, \
          analyzed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) \
         ON CONFLICT(file_path) DO UPDATE SET \
             is_blur = excluded.is_blur, \
             is_meme = excluded.is_meme, \
             is_sad = excluded.is_sad, \
             is_distracted = excluded.is_distracted, \
             is_sleeping = excluded.is_sleeping, \
             is_low_light = excluded.is_low_light, \
             face_count = excluded.face_count, \
             blur_version = excluded.blur_version, \
             meme_version = excluded.meme_version, \
             low_light_version = excluded.low_light_version, \
             image_features_version = excluded.image_features_version, \
             analyzed_at = excluded.analyzed_at",
        params![
            record.path,
            record.is_blur,
            record.is_meme,
            record.is_sad,
            record.is_distracted,
            record.is_sleeping,
            record.is_low_light,
            record.face_count,
            record.versions.blur,
            record.versions.meme,
            record.versions.low_light,
            record.versions.image_features,
            now,
        ],
    )?;
    Ok(())
}

pub(crate) fn clear_feature_in(conn: &Connection, feature: Feature, paths: &[String]) -> Result<usize> {
    let Some(assignments) = feature.reset_assignments() else {
        return Ok(0);
    };
    let mut cleared = 0;
    let mut reset = conn.prepare(&format!(
        "UPDATE classification SET {} WHERE file_path = ?1",
        assignments
    ))?;
    let mut prune = conn.prepare(&format!(
        "DELETE FROM classification WHERE file_path = ?1 AND {}",
        NO_FEATURE_ANALYZED
    ))?;
    for path in paths {
        cleared += reset.execute(params![path])?;
        prune.execute(params![path])?;
    }
    Ok(cleared)
}

pub(crate) fn delete_classifications_under(conn: &Connection, prefix: &str) -> Result<usize> {
    conn.execute(
        &format!(
            "DELETE FROM classification WHERE {}",
            paths::prefix_match("file_path", 1)
        ),
        params![paths::normalize_dir(prefix)],
    )
}

pub(crate) fn delete_classification(conn: &Connection, path: &str) -> Result<usize> {
    conn.execute(
        "DELETE FROM classification WHERE file_path = ?1",
        params![path],
    )
}

pub(crate) fn classification_paths_under(conn: &Connection, prefix: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT file_path FROM classification WHERE {} ORDER BY file_path",
        paths::prefix_match("file_path", 1)
    ))?;
    let paths = stmt
        .query_map(params![paths::normalize_dir(prefix)], |row| row.get(0))?
        .collect::<Result<Vec<_>>>()?;
    Ok(paths)
}

/// Move every row keyed under `from` to the same relative key under `to`,
/// replacing rows already present at the destination.
pub(crate) fn rename_classifications(conn: &Connection, from: &str, to: &str) -> Result<usize> {
    let from = paths::normalize_dir(from);
    let to = paths::normalize_dir(to);
    conn.execute(
        &format!(
            "DELETE FROM classification WHERE {}",
            paths::prefix_match("file_path", 1)
        ),
        params![to],
    )?;
    conn.execute(
        &format!(
            "UPDATE classification SET file_path = ?2 || substr(file_path, length(?1) + 1) WHERE {}",
            paths::prefix_match("file_path", 1)
        ),
        params![from, to],
    )
}
