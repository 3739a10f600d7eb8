use super::models::{FeatureSetting, PathPolicy};
use super::sqlite::Database;
use crate::feature::Feature;
use crate::paths;
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use tracing::debug;

/// Feature keys are written by this crate only; an unknown key means the row
/// came from a newer build and is skipped.
fn policy_from_row(row: &Row<'_>) -> Result<Option<PathPolicy>> {
    let key: String = row.get(2)?;
    let Ok(feature) = key.parse::<Feature>() else {
        return Ok(None);
    };
    Ok(Some(PathPolicy {
        id: row.get(0)?,
        directory_path: row.get(1)?,
        feature,
        excludes: row.get(3)?,
    }))
}

impl Database {
    // ── Path policies ────────────────────────────────────────────

    /// Insert a rule, or replace `excludes` on the existing (directory, feature) rule.
    pub fn add_policy(&self, directory_path: &str, feature: Feature, excludes: bool) -> Result<i64> {
        let directory_path = paths::normalize_dir(directory_path);
        let conn = self.lock();
        conn.execute(
            "INSERT INTO path_policy (directory_path, feature, excludes) VALUES (?1, ?2, ?3) \
             ON CONFLICT(directory_path, feature) DO UPDATE SET excludes = excluded.excludes",
            params![directory_path, feature.key(), excludes],
        )?;
        let id = conn.query_row(
            "SELECT id FROM path_policy WHERE directory_path = ?1 AND feature = ?2",
            params![directory_path, feature.key()],
            |row| row.get(0),
        )?;
        debug!(
            "Policy {} {} for {}",
            if excludes { "exclude" } else { "include" },
            directory_path,
            feature
        );
        Ok(id)
    }

    pub fn remove_policy(&self, directory_path: &str, feature: Feature) -> Result<bool> {
        let removed = self.lock().execute(
            "DELETE FROM path_policy WHERE directory_path = ?1 AND feature = ?2",
            params![paths::normalize_dir(directory_path), feature.key()],
        )?;
        Ok(removed > 0)
    }

    /// Removes a rule by id, returning it so callers can reconcile its feature.
    pub fn remove_policy_by_id(&self, id: i64) -> Result<Option<PathPolicy>> {
        let conn = self.lock();
        let policy = conn
            .query_row(
                "SELECT id, directory_path, feature, excludes FROM path_policy WHERE id = ?1",
                params![id],
                policy_from_row,
            )
            .optional()?
            .flatten();
        conn.execute("DELETE FROM path_policy WHERE id = ?1", params![id])?;
        Ok(policy)
    }

    pub fn list_policies(&self, feature: Feature) -> Result<Vec<PathPolicy>> {
        list_policies_in(&self.lock(), feature)
    }

    pub fn list_all_policies(&self) -> Result<Vec<PathPolicy>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, directory_path, feature, excludes FROM path_policy \
             ORDER BY feature, directory_path",
        )?;
        let policies = stmt
            .query_map([], policy_from_row)?
            .filter_map(|row| row.transpose())
            .collect::<Result<Vec<_>>>()?;
        Ok(policies)
    }

    // ── Feature toggles and migration versions ───────────────────

    /// Stored setting for `feature`, or the defaults (enabled, version 1).
    pub fn feature_setting(&self, feature: Feature) -> Result<FeatureSetting> {
        feature_setting_in(&self.lock(), feature)
    }

    pub fn set_feature_enabled(&self, feature: Feature, enabled: bool) -> Result<()> {
        self.lock().execute(
            "INSERT INTO feature_setting (feature, enabled) VALUES (?1, ?2) \
             ON CONFLICT(feature) DO UPDATE SET enabled = excluded.enabled",
            params![feature.key(), enabled],
        )?;
        Ok(())
    }

    /// Increment the migration version and return the new value. Cached
    /// results are left in place; they are recomputed lazily.
    pub fn bump_migration_version(&self, feature: Feature) -> Result<u32> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO feature_setting (feature, migration_version) VALUES (?1, 2) \
             ON CONFLICT(feature) DO UPDATE SET migration_version = migration_version + 1",
            params![feature.key()],
        )?;
        conn.query_row(
            "SELECT migration_version FROM feature_setting WHERE feature = ?1",
            params![feature.key()],
            |row| row.get(0),
        )
    }

    // ── Store metadata ───────────────────────────────────────────

    pub fn meta_value(&self, key: &str) -> Result<Option<String>> {
        self.lock()
            .query_row(
                "SELECT value FROM store_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
    }

    pub fn set_meta_value(&self, key: &str, value: &str) -> Result<()> {
        self.lock().execute(
            "INSERT INTO store_meta (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

pub(crate) fn list_policies_in(conn: &Connection, feature: Feature) -> Result<Vec<PathPolicy>> {
    let mut stmt = conn.prepare(
        "SELECT id, directory_path, feature, excludes FROM path_policy \
         WHERE feature = ?1 ORDER BY directory_path",
    )?;
    let policies = stmt
        .query_map(params![feature.key()], policy_from_row)?
        .filter_map(|row| row.transpose())
        .collect::<Result<Vec<_>>>()?;
    Ok(policies)
}

pub(crate) fn feature_setting_in(conn: &Connection, feature: Feature) -> Result<FeatureSetting> {
    let stored = conn
        .query_row(
            "SELECT enabled, migration_version FROM feature_setting WHERE feature = ?1",
            params![feature.key()],
            |row| Ok((row.get::<_, bool>(0)?, row.get::<_, u32>(1)?)),
        )
        .optional()?;
    let (enabled, migration_version) = stored.unwrap_or((true, 1));
    Ok(FeatureSetting {
        feature,
        enabled,
        migration_version,
    })
}
