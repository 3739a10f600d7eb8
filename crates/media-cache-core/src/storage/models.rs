use crate::feature::{ClassificationFlag, Feature};
use crate::fingerprint::{ContentChecksum, SimilarityFingerprint};

/// Migration version each classification feature last analyzed a path at.
/// `None` means that feature has not analyzed the path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureVersions {
    pub blur: Option<u32>,
    pub meme: Option<u32>,
    pub low_light: Option<u32>,
    pub image_features: Option<u32>,
}

impl FeatureVersions {
    pub fn get(&self, feature: Feature) -> Option<u32> {
        match feature {
            Feature::Blur => self.blur,
            Feature::Meme => self.meme,
            Feature::LowLight => self.low_light,
            Feature::ImageFeatures => self.image_features,
            Feature::Duplicates | Feature::SimilarImages => None,
        }
    }

    pub fn set(&mut self, feature: Feature, version: Option<u32>) {
        match feature {
            Feature::Blur => self.blur = version,
            Feature::Meme => self.meme = version,
            Feature::LowLight => self.low_light = version,
            Feature::ImageFeatures => self.image_features = version,
            Feature::Duplicates | Feature::SimilarImages => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        Feature::CLASSIFICATION.iter().all(|f| self.get(*f).is_none())
    }
}

/// Cached classification outputs for one image path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationRecord {
    pub path: String,
    pub is_blur: bool,
    pub is_meme: bool,
    pub is_sad: bool,
    pub is_distracted: bool,
    pub is_sleeping: bool,
    pub is_low_light: bool,
    pub face_count: u32,
    pub versions: FeatureVersions,
}

impl ClassificationRecord {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Record `features` as analyzed at `version`, keeping the current outputs.
    pub fn mark_analyzed(&mut self, features: &[Feature], version: u32) -> &mut Self {
        for feature in features {
            self.versions.set(*feature, Some(version));
        }
        self
    }

    /// Any flag raised or any face counted.
    pub fn has_signals(&self) -> bool {
        self.face_count > 0 || ClassificationFlag::ALL.iter().any(|flag| self.flag(*flag))
    }

    pub fn flag(&self, flag: ClassificationFlag) -> bool {
        match flag {
            ClassificationFlag::Blur => self.is_blur,
            ClassificationFlag::Meme => self.is_meme,
            ClassificationFlag::Sad => self.is_sad,
            ClassificationFlag::Distracted => self.is_distracted,
            ClassificationFlag::Sleeping => self.is_sleeping,
            ClassificationFlag::LowLight => self.is_low_light,
        }
    }

    pub fn set_flag(&mut self, flag: ClassificationFlag, value: bool) {
        match flag {
            ClassificationFlag::Blur => self.is_blur = value,
            ClassificationFlag::Meme => self.is_meme = value,
            ClassificationFlag::Sad => self.is_sad = value,
            ClassificationFlag::Distracted => self.is_distracted = value,
            ClassificationFlag::Sleeping => self.is_sleeping = value,
            ClassificationFlag::LowLight => self.is_low_light = value,
        }
    }
}

/// Per-path checksum cache row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    pub path: String,
    pub checksum: ContentChecksum,
    pub file_size: i64,
    /// Milliseconds since the Unix epoch.
    pub last_modified: i64,
    pub is_directory: bool,
    pub is_junk: bool,
    pub version: u32,
}

/// Size and modification time a path had when its results were cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileState {
    pub file_size: i64,
    /// Milliseconds since the Unix epoch.
    pub last_modified: i64,
}

/// A set of two or more paths sharing one checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub id: i64,
    pub checksum: ContentChecksum,
    pub file_size: i64,
    pub is_empty: bool,
    pub is_junk: bool,
    pub is_directory: bool,
    pub member_count: i64,
    pub wasted_bytes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroupWithMembers {
    pub group: DuplicateGroup,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimilarityEntry {
    pub path: String,
    pub parent_path: Option<String>,
    pub fingerprint: SimilarityFingerprint,
    pub version: u32,
}

/// Paths sharing one similarity fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimilarityGroup {
    pub fingerprint: SimilarityFingerprint,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPolicy {
    pub id: i64,
    pub directory_path: String,
    pub feature: Feature,
    pub excludes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSetting {
    pub feature: Feature,
    pub enabled: bool,
    pub migration_version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppStorageSample {
    pub package_name: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub package_size: i64,
}
