use super::models::AppStorageSample;
use super::sqlite::Database;
use rusqlite::{params, OptionalExtension, Result, Row};
use tracing::debug;

fn sample_from_row(row: &Row<'_>) -> Result<AppStorageSample> {
    Ok(AppStorageSample {
        package_name: row.get(0)?,
        timestamp: row.get(1)?,
        package_size: row.get(2)?,
    })
}

impl Database {
    /// Register an installed app, returning its id. Registering twice is a no-op.
    pub fn register_app(&self, package_name: &str) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO installed_app (package_name) VALUES (?1)",
            params![package_name],
        )?;
        conn.query_row(
            "SELECT id FROM installed_app WHERE package_name = ?1",
            params![package_name],
            |row| row.get(0),
        )
    }

    /// Deleting an app deletes its samples.
    pub fn unregister_app(&self, package_name: &str) -> Result<bool> {
        let removed = self.lock().execute(
            "DELETE FROM installed_app WHERE package_name = ?1",
            params![package_name],
        )?;
        Ok(removed > 0)
    }

    /// Record one size sample. Samples for unregistered apps are dropped and
    /// `false` is returned.
    pub fn record_app_storage_sample(
        &self,
        package_name: &str,
        timestamp: i64,
        package_size: i64,
    ) -> Result<bool> {
        let inserted = self.lock().execute(
            "INSERT INTO app_storage_sample (app_id, timestamp, package_size) \
             SELECT id, ?2, ?3 FROM installed_app WHERE package_name = ?1",
            params![package_name, timestamp, package_size],
        )?;
        if inserted == 0 {
            debug!("Ignoring storage sample for unregistered app {}", package_name);
        }
        Ok(inserted > 0)
    }

    pub fn samples_for_app(&self, package_name: &str) -> Result<Vec<AppStorageSample>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT a.package_name, s.timestamp, s.package_size \
             FROM app_storage_sample s JOIN installed_app a ON a.id = s.app_id \
             WHERE a.package_name = ?1 ORDER BY s.timestamp",
        )?;
        let samples = stmt
            .query_map(params![package_name], sample_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(samples)
    }

    /// Retention pruning: drop every sample taken before `timestamp`.
    pub fn delete_samples_older_than(&self, timestamp: i64) -> Result<usize> {
        let removed = self.lock().execute(
            "DELETE FROM app_storage_sample WHERE timestamp < ?1",
            params![timestamp],
        )?;
        debug!("Pruned {} app storage samples", removed);
        Ok(removed)
    }

    /// Earliest sample for the app with `start <= timestamp < end`.
    pub fn earliest_sample_in_period(
        &self,
        package_name: &str,
        start: i64,
        end: i64,
    ) -> Result<Option<AppStorageSample>> {
        self.lock()
            .query_row(
                "SELECT a.package_name, s.timestamp, s.package_size \
                 FROM app_storage_sample s JOIN installed_app a ON a.id = s.app_id \
                 WHERE a.package_name = ?1 AND s.timestamp >= ?2 AND s.timestamp < ?3 \
                 ORDER BY s.timestamp ASC LIMIT 1",
                params![package_name, start, end],
                sample_from_row,
            )
            .optional()
    }
}
