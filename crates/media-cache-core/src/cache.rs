use crate::collaborators::{Classifier, HeuristicClassifier, ImageDecoder, MediaDecoder};
use crate::config::MediaCacheConfig;
use crate::engine::AnalysisEngine;
use crate::error::Error;
use crate::feature::Feature;
use crate::invalidation::Cleanup;
use crate::policy::PolicyEngine;
use crate::query::QueryLayer;
use crate::storage::Database;
use std::sync::Arc;

/// Every component wired to one shared store.
///
/// Settings changes made through here are followed by reconciliation, so
/// results for paths a feature no longer covers are dropped immediately.
pub struct MediaCache {
    pub db: Arc<Database>,
    pub policy: PolicyEngine,
    pub cleanup: Cleanup,
    pub query: QueryLayer,
    pub engine: AnalysisEngine,
}

impl MediaCache {
    pub fn open(config: MediaCacheConfig) -> Result<Self, Error> {
        let db = Arc::new(Database::open(&config.db_path)?);
        Ok(Self::with_collaborators(
            db,
            config,
            Arc::new(ImageDecoder),
            Arc::new(HeuristicClassifier),
        ))
    }

    pub fn with_collaborators(
        db: Arc<Database>,
        config: MediaCacheConfig,
        decoder: Arc<dyn MediaDecoder>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        let policy = PolicyEngine::new(db.clone());
        let cleanup = Cleanup::new(db.clone(), policy.clone());
        let query = QueryLayer::new(db.clone());
        let engine = AnalysisEngine::new(db.clone(), policy.clone(), config, decoder, classifier);
        Self {
            db,
            policy,
            cleanup,
            query,
            engine,
        }
    }

    /// Returns the rule id and the number of cached results dropped.
    pub fn add_policy(&self, directory_path: &str, feature: Feature, excludes: bool) -> Result<(i64, usize), Error> {
        let id = self.policy.add_policy(directory_path, feature, excludes)?;
        let dropped = self.cleanup.reconcile_feature(feature)?;
        Ok((id, dropped))
    }

    pub fn remove_policy(&self, directory_path: &str, feature: Feature) -> Result<(bool, usize), Error> {
        let removed = self.policy.remove_policy(directory_path, feature)?;
        let dropped = if removed {
            self.cleanup.reconcile_feature(feature)?
        } else {
            0
        };
        Ok((removed, dropped))
    }

    pub fn remove_policy_by_id(&self, id: i64) -> Result<usize, Error> {
        match self.policy.remove_policy_by_id(id)? {
            Some(policy) => self.cleanup.reconcile_feature(policy.feature),
            None => Ok(0),
        }
    }

    pub fn set_feature_enabled(&self, feature: Feature, enabled: bool) -> Result<usize, Error> {
        self.policy.set_enabled(feature, enabled)?;
        self.cleanup.reconcile_feature(feature)
    }

    pub fn seed_default_policies(&self, storage_root: &str) -> Result<usize, Error> {
        let seeded = self.policy.seed_default_policies(storage_root)?;
        if seeded > 0 {
            self.cleanup.reconcile_all()?;
        }
        Ok(seeded)
    }
}
