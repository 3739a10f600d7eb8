//! Read-side views served to cleanup-suggestion surfaces.
//!
//! Results may name paths deleted since they were cached; callers that want
//! to hide those can pass them through [`QueryLayer::verify_existing`].

use crate::error::Error;
use crate::feature::Predicate;
use crate::storage::models::{
    AppStorageSample, ClassificationRecord, DuplicateGroupWithMembers, SimilarityGroup,
};
use crate::storage::Database;
use std::path::Path;
use std::sync::Arc;

/// Result paths split by whether they still exist on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistenceCheck {
    pub present: Vec<String>,
    pub missing: Vec<String>,
}

#[derive(Clone)]
pub struct QueryLayer {
    db: Arc<Database>,
}

impl QueryLayer {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn all_of_feature(&self, predicate: Predicate) -> Result<Vec<ClassificationRecord>, Error> {
        Ok(self.db.classifications_matching(predicate)?)
    }

    /// Largest wasted space first.
    pub fn find_duplicate_groups(&self) -> Result<Vec<DuplicateGroupWithMembers>, Error> {
        let groups = self.db.duplicate_groups()?;
        let mut result = Vec::with_capacity(groups.len());
        for group in groups {
            let members = self.db.group_members(group.id)?;
            result.push(DuplicateGroupWithMembers { group, members });
        }
        Ok(result)
    }

    pub fn find_similar_groups(&self) -> Result<Vec<SimilarityGroup>, Error> {
        Ok(self.db.similar_groups()?)
    }

    pub fn find_similar_groups_under_parent(&self, parent: &str) -> Result<Vec<SimilarityGroup>, Error> {
        Ok(self.db.similar_groups_under_parent(parent)?)
    }

    /// Earliest sample for the app in `[period_start, period_end)`.
    pub fn storage_delta_for_app(
        &self,
        package_name: &str,
        period_start: i64,
        period_end: i64,
    ) -> Result<Option<AppStorageSample>, Error> {
        Ok(self
            .db
            .earliest_sample_in_period(package_name, period_start, period_end)?)
    }

    pub fn verify_existing<I, S>(&self, paths: I) -> ExistenceCheck
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut check = ExistenceCheck::default();
        for path in paths {
            let path = path.into();
            if Path::new(&path).exists() {
                check.present.push(path);
            } else {
                check.missing.push(path);
            }
        }
        check
    }
}
