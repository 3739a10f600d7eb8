use crate::collaborators::{Classifier, ClassifierOutput, MediaDecoder, Thresholds};
use crate::config::{self, MediaCacheConfig};
use crate::error::Error;
use crate::feature::Feature;
use crate::fingerprint::{self, ContentChecksum, SimilarityFingerprint};
use crate::paths;
use crate::policy::{CachedVersions, PolicyEngine, PolicySnapshot};
use crate::progress::ProgressReporter;
use crate::scanner::{self, MediaFile};
use crate::storage::classification::{get_classification_in, upsert_classification_in};
use crate::storage::duplicates::record_checksum_in;
use crate::storage::file_state::record_file_state_in;
use crate::storage::models::{ChecksumEntry, ClassificationRecord, FileState, SimilarityEntry};
use crate::storage::similarity::upsert_similarity_in;
use crate::storage::Database;
use glob::Pattern;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Scan trigger adapter: finds candidate files, works out which features
/// are due for each, runs the collaborators and writes results.
pub struct AnalysisEngine {
    db: Arc<Database>,
    policy: PolicyEngine,
    config: MediaCacheConfig,
    decoder: Arc<dyn MediaDecoder>,
    classifier: Arc<dyn Classifier>,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisSummary {
    pub files_seen: usize,
    pub files_analyzed: usize,
    /// Nothing was due: every eligible feature is cached at its current version.
    pub files_up_to_date: usize,
    pub files_failed: usize,
    pub classifications_written: usize,
    pub checksums_recorded: usize,
    pub fingerprints_recorded: usize,
    pub cancelled: bool,
    /// Cached empty directories dropped because the walk found them non-empty.
    pub stale_directories_dropped: usize,
    pub discover_duration: Duration,
    pub analyze_duration: Duration,
}

enum Outcome {
    UpToDate,
    Analyzed {
        classified: bool,
        checksum: bool,
        fingerprint: bool,
    },
    Failed,
}

impl AnalysisEngine {
    pub fn new(
        db: Arc<Database>,
        policy: PolicyEngine,
        config: MediaCacheConfig,
        decoder: Arc<dyn MediaDecoder>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            db,
            policy,
            config,
            decoder,
            classifier,
        }
    }

    fn roots(&self) -> Vec<String> {
        config::non_overlapping_directories(self.config.root_paths.clone())
    }

    /// Walk the configured roots. Candidates are grouped by parent directory.
    pub fn discover(&self) -> Result<BTreeMap<PathBuf, Vec<MediaFile>>, Error> {
        let non_overlapping = self.roots();
        info!("Processing directories: {:?}", non_overlapping);

        let root_path_slices: Vec<&str> = non_overlapping.iter().map(|s| s.as_str()).collect();
        let ignore_pattern_slices: Vec<&str> =
            self.config.ignore_patterns.iter().map(|s| s.as_str()).collect();

        let map = scanner::build_parent_to_files_map(
            &root_path_slices,
            &ignore_pattern_slices,
            &self.config.image_extensions,
        )?;

        let mut grouped: BTreeMap<PathBuf, Vec<MediaFile>> = map.into_iter().collect();
        for files in grouped.values_mut() {
            files.sort_by(|a, b| a.path.cmp(&b.path));
        }
        Ok(grouped)
    }

    /// Analyze `files` on rayon workers. Cancellation is checked between
    /// files; work already written stays written.
    pub fn analyze(
        &self,
        files: &[MediaFile],
        reporter: &dyn ProgressReporter,
        cancel: &AtomicBool,
    ) -> Result<AnalysisSummary, Error> {
        let snapshot = self.policy.snapshot()?;
        let junk_globs: Vec<&str> = self.config.junk_patterns.iter().map(|s| s.as_str()).collect();
        let junk_patterns = scanner::compile_patterns(&junk_globs);
        let thresholds = Thresholds::from(&self.config);

        let total = files.len();
        let done = AtomicUsize::new(0);
        let analyzed = AtomicUsize::new(0);
        let up_to_date = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        let classified = AtomicUsize::new(0);
        let checksums = AtomicUsize::new(0);
        let fingerprints = AtomicUsize::new(0);

        reporter.on_analyze_start(total);
        let start = Instant::now();

        files.par_iter().try_for_each(|file| -> Result<(), Error> {
            if cancel.load(Ordering::Relaxed) {
                return Ok(());
            }

            match self.analyze_file(file, &snapshot, &junk_patterns, thresholds)? {
                Outcome::UpToDate => {
                    up_to_date.fetch_add(1, Ordering::Relaxed);
                }
                Outcome::Failed => {
                    failed.fetch_add(1, Ordering::Relaxed);
                }
                Outcome::Analyzed {
                    classified: c,
                    checksum: s,
                    fingerprint: f,
                } => {
                    analyzed.fetch_add(1, Ordering::Relaxed);
                    classified.fetch_add(c as usize, Ordering::Relaxed);
                    checksums.fetch_add(s as usize, Ordering::Relaxed);
                    fingerprints.fetch_add(f as usize, Ordering::Relaxed);
                }
            }

            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.on_analyze_progress(n, total);
            Ok(())
        })?;

        let analyze_duration = start.elapsed();
        let summary = AnalysisSummary {
            files_seen: total,
            files_analyzed: analyzed.into_inner(),
            files_up_to_date: up_to_date.into_inner(),
            files_failed: failed.into_inner(),
            classifications_written: classified.into_inner(),
            checksums_recorded: checksums.into_inner(),
            fingerprints_recorded: fingerprints.into_inner(),
            cancelled: cancel.load(Ordering::Relaxed),
            stale_directories_dropped: 0,
            discover_duration: Duration::ZERO,
            analyze_duration,
        };
        reporter.on_analyze_complete(
            summary.files_analyzed,
            summary.files_failed,
            analyze_duration.as_secs_f64(),
        );
        info!(
            "Analyzed {} of {} files ({} up to date, {} failed) in {:.2}s",
            summary.files_analyzed,
            total,
            summary.files_up_to_date,
            summary.files_failed,
            analyze_duration.as_secs_f64()
        );
        Ok(summary)
    }

    /// Discover, then analyze everything found.
    pub fn run(&self, reporter: &dyn ProgressReporter, cancel: &AtomicBool) -> Result<AnalysisSummary, Error> {
        reporter.on_discover_start();
        let start = Instant::now();
        let grouped = self.discover()?;
        let files: Vec<MediaFile> = grouped.into_values().flatten().collect();
        let stale_directories_dropped = self.drop_stale_directories(&self.roots(), &files)?;
        let discover_duration = start.elapsed();
        reporter.on_discover_complete(files.len(), discover_duration.as_secs_f64());
        debug!(
            "Discovery completed in {:.2}s, {} candidates",
            discover_duration.as_secs_f64(),
            files.len()
        );

        let mut summary = self.analyze(&files, reporter, cancel)?;
        summary.discover_duration = discover_duration;
        summary.stale_directories_dropped = stale_directories_dropped;
        Ok(summary)
    }

    /// Directories cached as empty that the walk no longer reports as empty
    /// (they gained entries, vanished or are now ignored) lose their results.
    fn drop_stale_directories(&self, roots: &[String], files: &[MediaFile]) -> Result<usize, Error> {
        let empty: HashSet<String> = files
            .iter()
            .filter(|file| file.is_directory)
            .map(|file| file.path.to_string_lossy().into_owned())
            .collect();
        let mut stale = Vec::new();
        for root in roots {
            stale.extend(
                self.db
                    .directory_paths_under(root)?
                    .into_iter()
                    .filter(|path| !empty.contains(path)),
            );
        }
        if !stale.is_empty() {
            info!("{} cached empty directories are no longer empty", stale.len());
            self.db.remove_paths(&stale)?;
        }
        Ok(stale.len())
    }

    fn analyze_file(
        &self,
        file: &MediaFile,
        snapshot: &PolicySnapshot,
        junk_patterns: &[Pattern],
        thresholds: Thresholds,
    ) -> Result<Outcome, Error> {
        let path = file.path.to_string_lossy().into_owned();
        let state = FileState {
            file_size: file.size as i64,
            last_modified: file.last_modified,
        };
        let mut cached = self.policy.cached_versions(&path)?;

        // Rewritten since it was cached: every result for it is stale.
        if let Some(known) = self.db.file_state(&path)? {
            if known != state {
                debug!("{} changed on disk, dropping cached results", path);
                self.db.remove_paths(&[path.clone()])?;
                cached = CachedVersions::default();
            }
        }

        let due: Vec<Feature> = snapshot
            .due_features(&path, &cached)
            .into_iter()
            .filter(|feature| match feature {
                Feature::Duplicates => true,
                _ if file.is_directory => false,
                Feature::SimilarImages => true,
                classification => self.classifier.supports(*classification),
            })
            .collect();
        if due.is_empty() {
            return Ok(Outcome::UpToDate);
        }

        let classification_due: Vec<Feature> = due
            .iter()
            .copied()
            .filter(|feature| feature.is_classification())
            .collect();
        let wants_checksum = due.contains(&Feature::Duplicates);
        let wants_fingerprint = due.contains(&Feature::SimilarImages);

        // Every collaborator runs before anything is written, so a failure
        // leaves the store untouched for this path.
        let computed = if file.is_directory {
            Computed {
                checksum: Some(ContentChecksum::empty_directory()),
                ..Default::default()
            }
        } else if classification_due.is_empty() && !wants_fingerprint {
            // Checksum only: no need to decode pixels.
            match fingerprint::checksum_file(&file.path) {
                Ok(checksum) => Computed {
                    checksum: Some(checksum),
                    ..Default::default()
                },
                Err(e) => {
                    warn!("Skipping {}: {}", path, e);
                    return Ok(Outcome::Failed);
                }
            }
        } else {
            let decoded = match self.decoder.decode(&file.path) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!("Skipping {}: {}", path, e);
                    return Ok(Outcome::Failed);
                }
            };
            let output = if classification_due.is_empty() {
                None
            } else {
                match self.classifier.classify(&decoded.image, &classification_due) {
                    Ok(output) => Some(output),
                    Err(e) => {
                        warn!("Skipping {}: {}", path, e);
                        return Ok(Outcome::Failed);
                    }
                }
            };
            Computed {
                output,
                checksum: wants_checksum.then(|| fingerprint::compute_checksum(&decoded.bytes)),
                fingerprint: wants_fingerprint
                    .then(|| fingerprint::compute_similarity_fingerprint(&decoded.image)),
            }
        };

        let is_junk = junk_patterns
            .iter()
            .any(|pattern| pattern.matches_path(&file.path));
        let write = PendingWrite {
            path: &path,
            is_directory: file.is_directory,
            is_junk,
            state,
            classification_due: &classification_due,
        };
        self.write_results(&write, computed, snapshot, thresholds)
    }

    /// Write one file's results in a single transaction. The cached row is
    /// re-read and eligibility re-checked inside it, so a flag dismissed or a
    /// rule added while the file was being analyzed is not overwritten.
    fn write_results(
        &self,
        write: &PendingWrite<'_>,
        computed: Computed,
        snapshot: &PolicySnapshot,
        thresholds: Thresholds,
    ) -> Result<Outcome, Error> {
        let path = write.path;
        let version = |feature: Feature| {
            snapshot
                .rules(feature)
                .map(|rules| rules.migration_version)
                .unwrap_or(1)
        };

        self.db.transaction(|tx| -> Result<Outcome, Error> {
            let current = PolicySnapshot::load_in(tx)?;
            let eligible = |feature: Feature| {
                let eligible = current.is_eligible(path, feature);
                if !eligible {
                    debug!("{} no longer eligible for {}", path, feature);
                }
                eligible
            };

            let mut classified = false;
            if let Some(output) = &computed.output {
                let mut record = get_classification_in(tx, path)?
                    .unwrap_or_else(|| ClassificationRecord::new(path));
                for feature in write.classification_due {
                    if !eligible(*feature) {
                        continue;
                    }
                    if apply_output(&mut record, *feature, output, thresholds) {
                        record.versions.set(*feature, Some(version(*feature)));
                        classified = true;
                    } else {
                        debug!("No {} signal for {}", feature, path);
                    }
                }
                if classified {
                    upsert_classification_in(tx, &record)?;
                }
            }

            let mut checksum = false;
            if let Some(digest) = computed.checksum {
                if eligible(Feature::Duplicates) {
                    record_checksum_in(
                        tx,
                        &ChecksumEntry {
                            path: path.to_string(),
                            checksum: digest,
                            file_size: write.state.file_size,
                            last_modified: write.state.last_modified,
                            is_directory: write.is_directory,
                            is_junk: write.is_junk,
                            version: version(Feature::Duplicates),
                        },
                    )?;
                    checksum = true;
                }
            }

            let mut fingerprint = false;
            if let Some(digest) = computed.fingerprint {
                if eligible(Feature::SimilarImages) {
                    upsert_similarity_in(
                        tx,
                        &SimilarityEntry {
                            path: path.to_string(),
                            parent_path: paths::parent_of(path),
                            fingerprint: digest,
                            version: version(Feature::SimilarImages),
                        },
                    )?;
                    fingerprint = true;
                }
            }

            if classified || checksum || fingerprint {
                record_file_state_in(tx, path, write.state)?;
            }
            Ok(Outcome::Analyzed {
                classified,
                checksum,
                fingerprint,
            })
        })
    }
}

/// Collaborator results for one file, held until they are written together.
#[derive(Default)]
struct Computed {
    output: Option<ClassifierOutput>,
    checksum: Option<ContentChecksum>,
    fingerprint: Option<SimilarityFingerprint>,
}

struct PendingWrite<'a> {
    path: &'a str,
    is_directory: bool,
    is_junk: bool,
    state: FileState,
    classification_due: &'a [Feature],
}

/// Replace one feature's outputs on `record`. Returns false when the
/// classifier produced no signal for it.
fn apply_output(
    record: &mut ClassificationRecord,
    feature: Feature,
    output: &ClassifierOutput,
    thresholds: Thresholds,
) -> bool {
    match feature {
        Feature::Blur => output
            .blur_score
            .map(|score| record.is_blur = score < thresholds.blur)
            .is_some(),
        Feature::Meme => output
            .has_meme_text
            .map(|meme| record.is_meme = meme)
            .is_some(),
        Feature::LowLight => output
            .mean_luminance
            .map(|luma| record.is_low_light = luma < thresholds.low_light)
            .is_some(),
        Feature::ImageFeatures => match output.face_signals {
            Some(faces) => {
                record.face_count = faces.face_count;
                record.is_sad = faces.any_sad;
                record.is_distracted = faces.any_distracted;
                record.is_sleeping = faces.any_sleeping;
                true
            }
            None => false,
        },
        Feature::Duplicates | Feature::SimilarImages => false,
    }
}
