use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::tempdir;

use image::{DynamicImage, Rgb, RgbImage};
use media_cache_core::collaborators::{
    Classifier, ClassifierOutput, FaceSignals, HeuristicClassifier, ImageDecoder,
};
use media_cache_core::feature::{ClassificationFlag, Feature, Predicate};
use media_cache_core::storage::models::ClassificationRecord;
use media_cache_core::storage::Database;
use media_cache_core::{ExtractError, MediaCache, MediaCacheConfig, SilentReporter};

fn checkerboard(size: u32) -> RgbImage {
    RgbImage::from_fn(size, size, |x, y| {
        if (x + y) % 2 == 0 {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        }
    })
}

/// Layout:
///   root/
///     DCIM/
///       sharp.png     (checkerboard: sharp, bright)
///       dark.png      (flat, dark: blurry and low light)
///       broken.jpg    (not an image)
///     Backup/
///       sharp.png     (byte-identical copy of DCIM/sharp.png)
///     Empty1/, Empty2/
fn create_media_tree(root: &Path) {
    let dcim = root.join("DCIM");
    let backup = root.join("Backup");
    fs::create_dir_all(&dcim).unwrap();
    fs::create_dir_all(&backup).unwrap();
    fs::create_dir_all(root.join("Empty1")).unwrap();
    fs::create_dir_all(root.join("Empty2")).unwrap();

    checkerboard(64).save(dcim.join("sharp.png")).unwrap();
    fs::copy(dcim.join("sharp.png"), backup.join("sharp.png")).unwrap();
    RgbImage::from_pixel(64, 64, Rgb([20, 20, 20]))
        .save(dcim.join("dark.png"))
        .unwrap();
    fs::write(dcim.join("broken.jpg"), b"definitely not a jpeg").unwrap();
}

fn config_for(root: &Path) -> MediaCacheConfig {
    MediaCacheConfig {
        root_paths: vec![root.to_string_lossy().into_owned()],
        ..MediaCacheConfig::default()
    }
}

fn open_cache(root: &Path, classifier: Arc<dyn Classifier>) -> MediaCache {
    MediaCache::with_collaborators(
        Arc::new(Database::open_in_memory().unwrap()),
        config_for(root),
        Arc::new(ImageDecoder),
        classifier,
    )
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn test_full_analysis_pipeline() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("storage");
    create_media_tree(&root);
    let cache = open_cache(&root, Arc::new(HeuristicClassifier));
    let cancel = AtomicBool::new(false);

    let summary = cache.engine.run(&SilentReporter, &cancel).unwrap();
    assert_eq!(summary.files_seen, 6);
    assert_eq!(summary.files_analyzed, 5);
    assert_eq!(summary.files_failed, 1);
    assert_eq!(summary.classifications_written, 3);
    assert_eq!(summary.checksums_recorded, 5);
    assert_eq!(summary.fingerprints_recorded, 3);
    assert!(!summary.cancelled);

    let dark = path_str(&root.join("DCIM/dark.png"));
    let sharp = path_str(&root.join("DCIM/sharp.png"));
    let backup = path_str(&root.join("Backup/sharp.png"));

    let blurry = cache
        .query
        .all_of_feature(Predicate::Flag(ClassificationFlag::Blur))
        .unwrap();
    assert_eq!(blurry.len(), 1);
    assert_eq!(blurry[0].path, dark);
    assert!(blurry[0].is_low_light);
    // Unsupported features stay unanalyzed.
    assert_eq!(blurry[0].versions.meme, None);

    let sharp_record = cache.db.get_classification(&sharp).unwrap().unwrap();
    assert!(!sharp_record.is_blur);
    assert!(!sharp_record.is_low_light);

    let groups = cache.query.find_duplicate_groups().unwrap();
    assert_eq!(groups.len(), 2);
    let image_group = groups.iter().find(|g| !g.group.is_directory).unwrap();
    assert_eq!(image_group.members, vec![backup.clone(), sharp.clone()]);
    let dir_group = groups.iter().find(|g| g.group.is_directory).unwrap();
    assert!(dir_group.group.is_empty);
    assert_eq!(dir_group.members.len(), 2);

    let similar = cache.query.find_similar_groups().unwrap();
    assert_eq!(similar.len(), 1);
    assert_eq!(similar[0].members, vec![backup, sharp]);
    assert!(cache
        .query
        .find_similar_groups_under_parent(&path_str(&root.join("DCIM")))
        .unwrap()
        .is_empty());

    // Nothing about the undecodable file was written.
    let broken = path_str(&root.join("DCIM/broken.jpg"));
    assert!(cache.db.get_classification(&broken).unwrap().is_none());
    assert!(cache.db.get_checksum(&broken).unwrap().is_none());
    assert!(cache.db.similarity_for(&broken).unwrap().is_none());
}

#[test]
fn test_second_run_is_cached_and_identical() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("storage");
    create_media_tree(&root);
    let cache = open_cache(&root, Arc::new(HeuristicClassifier));
    let cancel = AtomicBool::new(false);

    cache.engine.run(&SilentReporter, &cancel).unwrap();
    let dark = path_str(&root.join("DCIM/dark.png"));
    let before = cache.db.get_classification(&dark).unwrap().unwrap();

    let summary = cache.engine.run(&SilentReporter, &cancel).unwrap();
    assert_eq!(summary.files_analyzed, 0);
    assert_eq!(summary.files_up_to_date, 5);
    assert_eq!(summary.files_failed, 1);
    assert_eq!(cache.db.get_classification(&dark).unwrap().unwrap(), before);
}

#[test]
fn test_migration_bump_reanalyzes_lazily() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("storage");
    create_media_tree(&root);
    let cache = open_cache(&root, Arc::new(HeuristicClassifier));
    let cancel = AtomicBool::new(false);
    cache.engine.run(&SilentReporter, &cancel).unwrap();

    cache.policy.bump_migration_version(Feature::Blur).unwrap();
    let summary = cache.engine.run(&SilentReporter, &cancel).unwrap();
    assert_eq!(summary.files_analyzed, 3);
    assert_eq!(summary.classifications_written, 3);
    assert_eq!(summary.checksums_recorded, 0);

    let dark = path_str(&root.join("DCIM/dark.png"));
    let record = cache.db.get_classification(&dark).unwrap().unwrap();
    assert_eq!(record.versions.blur, Some(2));
    assert_eq!(record.versions.low_light, Some(1));
}

#[test]
fn test_policy_scopes_analysis() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("storage");
    create_media_tree(&root);
    let cache = open_cache(&root, Arc::new(HeuristicClassifier));
    let cancel = AtomicBool::new(false);

    let backup_dir = path_str(&root.join("Backup"));
    cache.add_policy(&backup_dir, Feature::Blur, true).unwrap();
    cache.set_feature_enabled(Feature::LowLight, false).unwrap();
    cache.engine.run(&SilentReporter, &cancel).unwrap();

    let backup = path_str(&root.join("Backup/sharp.png"));
    // Excluded from blur, low light disabled: no classification at all.
    assert!(cache.db.get_classification(&backup).unwrap().is_none());
    assert!(cache.db.get_checksum(&backup).unwrap().is_some());

    let dark = path_str(&root.join("DCIM/dark.png"));
    let record = cache.db.get_classification(&dark).unwrap().unwrap();
    assert!(record.is_blur);
    assert!(!record.is_low_light);
    assert_eq!(record.versions.low_light, None);
}

#[test]
fn test_disabling_feature_drops_cached_results() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("storage");
    create_media_tree(&root);
    let cache = open_cache(&root, Arc::new(HeuristicClassifier));
    let cancel = AtomicBool::new(false);
    cache.engine.run(&SilentReporter, &cancel).unwrap();

    let dropped = cache.set_feature_enabled(Feature::Duplicates, false).unwrap();
    assert_eq!(dropped, 5);
    assert!(cache.query.find_duplicate_groups().unwrap().is_empty());
}

#[test]
fn test_modified_file_is_reanalyzed_from_scratch() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("storage");
    create_media_tree(&root);
    let cache = open_cache(&root, Arc::new(HeuristicClassifier));
    let cancel = AtomicBool::new(false);
    cache.engine.run(&SilentReporter, &cancel).unwrap();

    // Overwrite the dark image with a sharp, bright one of a different size.
    let dark_path = root.join("DCIM/dark.png");
    checkerboard(96).save(&dark_path).unwrap();

    let summary = cache.engine.run(&SilentReporter, &cancel).unwrap();
    assert_eq!(summary.files_analyzed, 1);

    let record = cache
        .db
        .get_classification(&path_str(&dark_path))
        .unwrap()
        .unwrap();
    assert!(!record.is_blur);
    assert!(!record.is_low_light);
}

#[test]
fn test_cancelled_run_writes_nothing_new() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("storage");
    create_media_tree(&root);
    let cache = open_cache(&root, Arc::new(HeuristicClassifier));

    let cancel = AtomicBool::new(true);
    let summary = cache.engine.run(&SilentReporter, &cancel).unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.files_analyzed, 0);
    assert!(cache.query.find_duplicate_groups().unwrap().is_empty());
}

/// Reports one sad face and meme text for every image.
struct FaceClassifier;

impl Classifier for FaceClassifier {
    fn classify(&self, _image: &DynamicImage, features: &[Feature]) -> Result<ClassifierOutput, ExtractError> {
        let mut output = ClassifierOutput::default();
        for feature in features {
            match feature {
                Feature::Blur => output.blur_score = Some(1_000.0),
                Feature::Meme => output.has_meme_text = Some(true),
                Feature::LowLight => output.mean_luminance = Some(200.0),
                Feature::ImageFeatures => {
                    output.face_signals = Some(FaceSignals {
                        face_count: 1,
                        any_sad: true,
                        any_distracted: false,
                        any_sleeping: false,
                    })
                }
                Feature::Duplicates | Feature::SimilarImages => {}
            }
        }
        Ok(output)
    }
}

struct FailingClassifier;

impl Classifier for FailingClassifier {
    fn classify(&self, _image: &DynamicImage, _features: &[Feature]) -> Result<ClassifierOutput, ExtractError> {
        Err(ExtractError::Classifier("model unavailable".to_string()))
    }
}

#[test]
fn test_face_signals_feed_selfie_and_sad_lists() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("storage");
    create_media_tree(&root);
    let cache = open_cache(&root, Arc::new(FaceClassifier));
    cache
        .engine
        .run(&SilentReporter, &AtomicBool::new(false))
        .unwrap();

    let selfies = cache.query.all_of_feature(Predicate::Selfie).unwrap();
    assert_eq!(selfies.len(), 3);
    let sad = cache
        .query
        .all_of_feature(Predicate::Flag(ClassificationFlag::Sad))
        .unwrap();
    assert_eq!(sad.len(), 3);
    assert!(cache
        .query
        .all_of_feature(Predicate::GroupPicture)
        .unwrap()
        .is_empty());
    assert!(cache
        .query
        .all_of_feature(Predicate::Flag(ClassificationFlag::Blur))
        .unwrap()
        .is_empty());
}

#[test]
fn test_classifier_failure_writes_nothing() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("storage");
    create_media_tree(&root);
    let cache = open_cache(&root, Arc::new(FailingClassifier));

    let summary = cache
        .engine
        .run(&SilentReporter, &AtomicBool::new(false))
        .unwrap();
    // Images fail; only the two empty directories are recorded.
    assert_eq!(summary.files_failed, 4);
    assert_eq!(summary.files_analyzed, 2);

    let sharp = path_str(&root.join("DCIM/sharp.png"));
    assert!(cache.db.get_checksum(&sharp).unwrap().is_none());
    assert!(cache.db.similarity_for(&sharp).unwrap().is_none());
}

#[test]
fn test_rewritten_file_is_reanalyzed_without_duplicates() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("storage");
    create_media_tree(&root);
    let cache = open_cache(&root, Arc::new(HeuristicClassifier));
    let cancel = AtomicBool::new(false);
    cache.set_feature_enabled(Feature::Duplicates, false).unwrap();
    cache.engine.run(&SilentReporter, &cancel).unwrap();

    let dark_path = root.join("DCIM/dark.png");
    let dark = path_str(&dark_path);
    let before = cache.db.get_classification(&dark).unwrap().unwrap();
    assert!(before.is_blur);
    assert!(before.is_low_light);

    checkerboard(64).save(&dark_path).unwrap();
    let summary = cache.engine.run(&SilentReporter, &cancel).unwrap();
    assert_eq!(summary.files_analyzed, 1);

    let after = cache.db.get_classification(&dark).unwrap().unwrap();
    assert!(!after.is_blur);
    assert!(!after.is_low_light);
    assert!(cache.db.get_checksum(&dark).unwrap().is_none());
}

#[test]
fn test_empty_directory_leaves_group_once_it_has_content() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("storage");
    create_media_tree(&root);
    let cache = open_cache(&root, Arc::new(HeuristicClassifier));
    let cancel = AtomicBool::new(false);
    cache.engine.run(&SilentReporter, &cancel).unwrap();

    checkerboard(8).save(root.join("Empty1/new.png")).unwrap();
    let summary = cache.engine.run(&SilentReporter, &cancel).unwrap();
    assert_eq!(summary.stale_directories_dropped, 1);

    let empty1 = path_str(&root.join("Empty1"));
    assert!(cache.db.get_checksum(&empty1).unwrap().is_none());
    assert!(cache.db.get_checksum(&path_str(&root.join("Empty2"))).unwrap().is_some());
    // One empty directory left: no group.
    let groups = cache.query.find_duplicate_groups().unwrap();
    assert!(groups.iter().all(|g| !g.group.is_directory));
}

/// Runs `during` while an image is being classified, then reports a low
/// blur score and meme text.
struct InterleavingClassifier {
    during: Box<dyn Fn() + Send + Sync>,
}

impl Classifier for InterleavingClassifier {
    fn supports(&self, feature: Feature) -> bool {
        matches!(feature, Feature::Blur | Feature::Meme)
    }

    fn classify(&self, _image: &DynamicImage, features: &[Feature]) -> Result<ClassifierOutput, ExtractError> {
        (self.during)();
        let mut output = ClassifierOutput::default();
        for feature in features {
            match feature {
                Feature::Blur => output.blur_score = Some(1.0),
                Feature::Meme => output.has_meme_text = Some(true),
                _ => {}
            }
        }
        Ok(output)
    }
}

fn single_image_tree(root: &Path) -> String {
    let dcim = root.join("DCIM");
    fs::create_dir_all(&dcim).unwrap();
    let image = dcim.join("a.png");
    checkerboard(32).save(&image).unwrap();
    path_str(&image)
}

#[test]
fn test_flag_dismissed_during_scan_stays_dismissed() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("storage");
    let image = single_image_tree(&root);
    let db = Arc::new(Database::open_in_memory().unwrap());

    // Blur is cached at the current version, so only meme is due.
    let mut cached = ClassificationRecord::new(image.clone());
    cached.is_blur = true;
    cached.mark_analyzed(&[Feature::Blur], 1);
    db.upsert_classification(&cached).unwrap();

    let dismiss_db = db.clone();
    let dismissed = image.clone();
    let classifier = InterleavingClassifier {
        during: Box::new(move || {
            dismiss_db
                .unset_flag(ClassificationFlag::Blur, &[dismissed.clone()])
                .unwrap();
        }),
    };
    let cache = MediaCache::with_collaborators(
        db.clone(),
        config_for(&root),
        Arc::new(ImageDecoder),
        Arc::new(classifier),
    );
    cache
        .engine
        .run(&SilentReporter, &AtomicBool::new(false))
        .unwrap();

    let record = db.get_classification(&image).unwrap().unwrap();
    assert!(!record.is_blur);
    assert!(record.is_meme);
    assert_eq!(record.versions.blur, Some(1));
    assert_eq!(record.versions.meme, Some(1));
}

#[test]
fn test_rule_added_during_scan_is_honored() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("storage");
    let image = single_image_tree(&root);
    let db = Arc::new(Database::open_in_memory().unwrap());

    let policy_db = db.clone();
    let dcim = path_str(&root.join("DCIM"));
    let classifier = InterleavingClassifier {
        during: Box::new(move || {
            policy_db.add_policy(&dcim, Feature::Blur, true).unwrap();
        }),
    };
    let cache = MediaCache::with_collaborators(
        db.clone(),
        config_for(&root),
        Arc::new(ImageDecoder),
        Arc::new(classifier),
    );
    cache
        .engine
        .run(&SilentReporter, &AtomicBool::new(false))
        .unwrap();

    let record = db.get_classification(&image).unwrap().unwrap();
    assert!(record.is_meme);
    assert!(!record.is_blur);
    assert_eq!(record.versions.blur, None);
    assert!(cache
        .query
        .all_of_feature(Predicate::Flag(ClassificationFlag::Blur))
        .unwrap()
        .is_empty());
}
