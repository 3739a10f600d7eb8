//! Per-feature directory scoping, enable toggles and migration versions.

use crate::error::Error;
use crate::feature::Feature;
use crate::paths;
use crate::storage::models::{ClassificationRecord, PathPolicy};
use crate::storage::settings::{feature_setting_in, list_policies_in};
use crate::storage::Database;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const POLICY_MIGRATION_KEY: &str = "path_policy_migration";
const POLICY_MIGRATION_VERSION: u32 = 2;

/// Rules and settings of one feature, loaded once and evaluated many times.
#[derive(Debug, Clone)]
pub struct FeatureRules {
    pub feature: Feature,
    pub enabled: bool,
    pub migration_version: u32,
    includes: Vec<String>,
    excludes: Vec<String>,
}

impl FeatureRules {
    fn new(feature: Feature, enabled: bool, migration_version: u32, policies: &[PathPolicy]) -> Self {
        let (excludes, includes): (Vec<&PathPolicy>, Vec<&PathPolicy>) =
            policies.iter().partition(|policy| policy.excludes);
        Self {
            feature,
            enabled,
            migration_version,
            includes: includes.into_iter().map(|p| p.directory_path.clone()).collect(),
            excludes: excludes.into_iter().map(|p| p.directory_path.clone()).collect(),
        }
    }

    /// Exclude rules win over include rules. With no include rules every
    /// path not excluded is eligible.
    pub fn is_eligible(&self, path: &str) -> bool {
        if !self.enabled {
            return false;
        }
        if self.excludes.iter().any(|dir| paths::is_under(path, dir)) {
            return false;
        }
        self.includes.is_empty() || self.includes.iter().any(|dir| paths::is_under(path, dir))
    }
}

/// A snapshot of every feature's rules.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    rules: Vec<FeatureRules>,
}

impl PolicySnapshot {
    /// Read every feature's rules through `conn`, typically inside the
    /// transaction that acts on them.
    pub(crate) fn load_in(conn: &Connection) -> rusqlite::Result<Self> {
        let rules = Feature::ALL
            .iter()
            .map(|feature| {
                let setting = feature_setting_in(conn, *feature)?;
                let policies = list_policies_in(conn, *feature)?;
                Ok(FeatureRules::new(
                    *feature,
                    setting.enabled,
                    setting.migration_version,
                    &policies,
                ))
            })
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn rules(&self, feature: Feature) -> Option<&FeatureRules> {
        self.rules.iter().find(|rules| rules.feature == feature)
    }

    pub fn is_eligible(&self, path: &str, feature: Feature) -> bool {
        self.rules(feature)
            .map(|rules| rules.is_eligible(path))
            .unwrap_or(false)
    }

    /// Features eligible for `path` whose cached result is missing or was
    /// produced at another migration version.
    pub fn due_features(&self, path: &str, cached: &CachedVersions) -> Vec<Feature> {
        self.rules
            .iter()
            .filter(|rules| rules.is_eligible(path))
            .filter(|rules| cached.get(rules.feature) != Some(rules.migration_version))
            .map(|rules| rules.feature)
            .collect()
    }
}

/// Versions at which each feature last produced a cached result for one path.
#[derive(Debug, Clone, Default)]
pub struct CachedVersions {
    pub classification: Option<ClassificationRecord>,
    pub checksum: Option<u32>,
    pub similarity: Option<u32>,
}

impl CachedVersions {
    pub fn get(&self, feature: Feature) -> Option<u32> {
        match feature {
            Feature::Duplicates => self.checksum,
            Feature::SimilarImages => self.similarity,
            classification => self
                .classification
                .as_ref()
                .and_then(|record| record.versions.get(classification)),
        }
    }
}

#[derive(Clone)]
pub struct PolicyEngine {
    db: Arc<Database>,
}

impl PolicyEngine {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn snapshot(&self) -> Result<PolicySnapshot, Error> {
        Ok(self.db.with_connection(PolicySnapshot::load_in)?)
    }

    pub fn feature_rules(&self, feature: Feature) -> Result<FeatureRules, Error> {
        let setting = self.db.feature_setting(feature)?;
        let policies = self.db.list_policies(feature)?;
        Ok(FeatureRules::new(
            feature,
            setting.enabled,
            setting.migration_version,
            &policies,
        ))
    }

    pub fn is_eligible(&self, path: &str, feature: Feature) -> Result<bool, Error> {
        Ok(self.feature_rules(feature)?.is_eligible(path))
    }

    pub fn add_policy(&self, directory_path: &str, feature: Feature, excludes: bool) -> Result<i64, Error> {
        Ok(self.db.add_policy(directory_path, feature, excludes)?)
    }

    pub fn remove_policy(&self, directory_path: &str, feature: Feature) -> Result<bool, Error> {
        Ok(self.db.remove_policy(directory_path, feature)?)
    }

    pub fn remove_policy_by_id(&self, id: i64) -> Result<Option<PathPolicy>, Error> {
        Ok(self.db.remove_policy_by_id(id)?)
    }

    pub fn list_policies(&self, feature: Feature) -> Result<Vec<PathPolicy>, Error> {
        Ok(self.db.list_policies(feature)?)
    }

    pub fn list_all_policies(&self) -> Result<Vec<PathPolicy>, Error> {
        Ok(self.db.list_all_policies()?)
    }

    pub fn is_enabled(&self, feature: Feature) -> Result<bool, Error> {
        Ok(self.db.feature_setting(feature)?.enabled)
    }

    pub fn set_enabled(&self, feature: Feature, enabled: bool) -> Result<(), Error> {
        self.db.set_feature_enabled(feature, enabled)?;
        info!("{} {}", feature, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub fn migration_version(&self, feature: Feature) -> Result<u32, Error> {
        Ok(self.db.feature_setting(feature)?.migration_version)
    }

    /// Results cached at the old version become due again on the next scan.
    pub fn bump_migration_version(&self, feature: Feature) -> Result<u32, Error> {
        let version = self.db.bump_migration_version(feature)?;
        info!("{} migration version is now {}", feature, version);
        Ok(version)
    }

    /// Insert each feature's default include directories under
    /// `storage_root`. Runs once per store; later calls return 0.
    pub fn seed_default_policies(&self, storage_root: &str) -> Result<usize, Error> {
        let seeded = self
            .db
            .meta_value(POLICY_MIGRATION_KEY)?
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(0);
        if seeded >= POLICY_MIGRATION_VERSION {
            debug!("Default path policies already seeded");
            return Ok(0);
        }

        let root = Path::new(storage_root);
        let mut inserted = 0;
        for feature in Feature::ALL {
            for dir in feature.default_include_dirs() {
                let directory = root.join(dir).to_string_lossy().into_owned();
                self.db.add_policy(&directory, feature, false)?;
                inserted += 1;
            }
        }
        self.db
            .set_meta_value(POLICY_MIGRATION_KEY, &POLICY_MIGRATION_VERSION.to_string())?;
        info!("Seeded {} default path policies under {}", inserted, storage_root);
        Ok(inserted)
    }

    /// Cached versions for `path` across every feature family.
    pub fn cached_versions(&self, path: &str) -> Result<CachedVersions, Error> {
        Ok(CachedVersions {
            classification: self.db.get_classification(path)?,
            checksum: self.db.get_checksum(path)?.map(|entry| entry.version),
            similarity: self.db.similarity_for(path)?.map(|entry| entry.version),
        })
    }

    pub fn due_features(&self, path: &str, cached: &CachedVersions) -> Result<Vec<Feature>, Error> {
        Ok(self.snapshot()?.due_features(path, cached))
    }
}
