//! Feature kinds, classification flags and the predicates served to
//! cleanup-suggestion surfaces.
//!
//! Every per-feature decision (which columns a feature owns, which version
//! column records its analysis, which directories it covers by default) is a
//! `match` on these enums, so a new feature is a compile-checked addition.

use crate::error::Error;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    Blur,
    Meme,
    LowLight,
    /// Face-derived signals: sad, distracted, sleeping and face count.
    ImageFeatures,
    Duplicates,
    SimilarImages,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::Blur,
        Feature::Meme,
        Feature::LowLight,
        Feature::ImageFeatures,
        Feature::Duplicates,
        Feature::SimilarImages,
    ];

    /// Features whose outputs live in the `classification` table.
    pub const CLASSIFICATION: [Feature; 4] = [
        Feature::Blur,
        Feature::Meme,
        Feature::LowLight,
        Feature::ImageFeatures,
    ];

    /// Stable identifier used in `path_policy` and `feature_setting` rows.
    pub fn key(self) -> &'static str {
        match self {
            Feature::Blur => "blur",
            Feature::Meme => "meme",
            Feature::LowLight => "low_light",
            Feature::ImageFeatures => "image_features",
            Feature::Duplicates => "duplicates",
            Feature::SimilarImages => "similar_images",
        }
    }

    pub fn is_classification(self) -> bool {
        self.version_column().is_some()
    }

    /// Flags owned by this feature in the classification record.
    pub fn flags(self) -> &'static [ClassificationFlag] {
        match self {
            Feature::Blur => &[ClassificationFlag::Blur],
            Feature::Meme => &[ClassificationFlag::Meme],
            Feature::LowLight => &[ClassificationFlag::LowLight],
            Feature::ImageFeatures => &[
                ClassificationFlag::Sad,
                ClassificationFlag::Distracted,
                ClassificationFlag::Sleeping,
            ],
            Feature::Duplicates | Feature::SimilarImages => &[],
        }
    }

    /// Column in `classification` holding the migration version this
    /// feature last analyzed the path at.
    pub fn version_column(self) -> Option<&'static str> {
        match self {
            Feature::Blur => Some("blur_version"),
            Feature::Meme => Some("meme_version"),
            Feature::LowLight => Some("low_light_version"),
            Feature::ImageFeatures => Some("image_features_version"),
            Feature::Duplicates | Feature::SimilarImages => None,
        }
    }

    /// SQL assignments resetting every output of this feature, version included.
    pub(crate) fn reset_assignments(self) -> Option<String> {
        let version = self.version_column()?;
        let mut parts: Vec<String> = self
            .flags()
            .iter()
            .map(|flag| format!("{} = 0", flag.column()))
            .collect();
        if self == Feature::ImageFeatures {
            parts.push("face_count = 0".to_string());
        }
        parts.push(format!("{} = NULL", version));
        Some(parts.join(", "))
    }

    /// Directories (relative to the storage root) included by default.
    pub fn default_include_dirs(self) -> &'static [&'static str] {
        match self {
            Feature::Blur | Feature::ImageFeatures => &["DCIM/Camera", "Pictures/Instagram"],
            Feature::Meme => &[
                "Download",
                "WhatsApp/Media/WhatsApp Images",
                "Android/media/com.whatsapp/WhatsApp/Media/WhatsApp Images",
            ],
            Feature::LowLight | Feature::Duplicates | Feature::SimilarImages => &[],
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.key())
    }
}

impl FromStr for Feature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .iter()
            .copied()
            .find(|feature| feature.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownFeature(s.to_string()))
    }
}

/// One boolean signal in a classification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassificationFlag {
    Blur,
    Meme,
    Sad,
    Distracted,
    Sleeping,
    LowLight,
}

impl ClassificationFlag {
    pub const ALL: [ClassificationFlag; 6] = [
        ClassificationFlag::Blur,
        ClassificationFlag::Meme,
        ClassificationFlag::Sad,
        ClassificationFlag::Distracted,
        ClassificationFlag::Sleeping,
        ClassificationFlag::LowLight,
    ];

    pub fn column(self) -> &'static str {
        match self {
            ClassificationFlag::Blur => "is_blur",
            ClassificationFlag::Meme => "is_meme",
            ClassificationFlag::Sad => "is_sad",
            ClassificationFlag::Distracted => "is_distracted",
            ClassificationFlag::Sleeping => "is_sleeping",
            ClassificationFlag::LowLight => "is_low_light",
        }
    }

    pub fn feature(self) -> Feature {
        match self {
            ClassificationFlag::Blur => Feature::Blur,
            ClassificationFlag::Meme => Feature::Meme,
            ClassificationFlag::LowLight => Feature::LowLight,
            ClassificationFlag::Sad | ClassificationFlag::Distracted | ClassificationFlag::Sleeping => {
                Feature::ImageFeatures
            }
        }
    }

    fn name(self) -> &'static str {
        &self.column()[3..]
    }
}

impl fmt::Display for ClassificationFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ClassificationFlag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim_start_matches("is_").replace('-', "_");
        ClassificationFlag::ALL
            .iter()
            .copied()
            .find(|flag| flag.name().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| Error::UnknownPredicate(s.to_string()))
    }
}

/// Candidate-list selector: each boolean flag plus the two face-count buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predicate {
    Flag(ClassificationFlag),
    /// Exactly one face.
    Selfie,
    /// More than one face.
    GroupPicture,
}

impl Predicate {
    pub fn all() -> Vec<Predicate> {
        let mut all: Vec<Predicate> = ClassificationFlag::ALL.iter().map(|f| Predicate::Flag(*f)).collect();
        all.push(Predicate::Selfie);
        all.push(Predicate::GroupPicture);
        all
    }

    pub(crate) fn where_clause(self) -> String {
        match self {
            Predicate::Flag(flag) => format!("{} = 1", flag.column()),
            Predicate::Selfie => "face_count = 1".to_string(),
            Predicate::GroupPicture => "face_count > 1".to_string(),
        }
    }

    pub fn feature(self) -> Feature {
        match self {
            Predicate::Flag(flag) => flag.feature(),
            Predicate::Selfie | Predicate::GroupPicture => Feature::ImageFeatures,
        }
    }
}

impl From<ClassificationFlag> for Predicate {
    fn from(flag: ClassificationFlag) -> Self {
        Predicate::Flag(flag)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Flag(flag) => write!(f, "{}", flag),
            Predicate::Selfie => f.write_str("selfie"),
            Predicate::GroupPicture => f.write_str("group_picture"),
        }
    }
}

impl FromStr for Predicate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "selfie" => Ok(Predicate::Selfie),
            "group_picture" | "group" => Ok(Predicate::GroupPicture),
            other => other.parse::<ClassificationFlag>().map(Predicate::Flag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_keys_round_trip() {
        for feature in Feature::ALL {
            assert_eq!(feature.key().parse::<Feature>().unwrap(), feature);
        }
        assert!("audio_player".parse::<Feature>().is_err());
    }

    #[test]
    fn test_every_flag_belongs_to_a_classification_feature() {
        for flag in ClassificationFlag::ALL {
            let feature = flag.feature();
            assert!(feature.is_classification());
            assert!(feature.flags().contains(&flag));
        }
    }

    #[test]
    fn test_predicate_parsing() {
        assert_eq!("blur".parse::<Predicate>().unwrap(), Predicate::Flag(ClassificationFlag::Blur));
        assert_eq!(
            "is_low_light".parse::<Predicate>().unwrap(),
            Predicate::Flag(ClassificationFlag::LowLight)
        );
        assert_eq!("low-light".parse::<Predicate>().unwrap(), Predicate::Flag(ClassificationFlag::LowLight));
        assert_eq!("selfie".parse::<Predicate>().unwrap(), Predicate::Selfie);
        assert_eq!("group_picture".parse::<Predicate>().unwrap(), Predicate::GroupPicture);
        assert!("funny".parse::<Predicate>().is_err());
        assert_eq!(Predicate::all().len(), 8);
    }

    #[test]
    fn test_reset_assignments_cover_face_count() {
        let sql = Feature::ImageFeatures.reset_assignments().unwrap();
        assert!(sql.contains("is_sad = 0"));
        assert!(sql.contains("face_count = 0"));
        assert!(sql.contains("image_features_version = NULL"));
        assert!(Feature::Duplicates.reset_assignments().is_none());
    }
}
