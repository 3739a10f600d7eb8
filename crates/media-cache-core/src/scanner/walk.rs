use dashmap::DashMap;
use glob::Pattern;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{error, warn};

/// A candidate found by the walk: a media file, or an empty directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub path: PathBuf,
    pub size: u64,
    /// Milliseconds since the Unix epoch.
    pub last_modified: i64,
    pub is_directory: bool,
}

pub fn compile_patterns(globs: &[&str]) -> Vec<Pattern> {
    globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect()
}

/// Parallel directory traversal. Builds a map of parent directory →
/// candidates, keeping files whose extension is in `extensions` and
/// filtering by glob ignore patterns. Symlinks are skipped.
pub fn build_parent_to_files_map(
    root_paths: &[&str],
    ignore_globs: &[&str],
    extensions: &[String],
) -> io::Result<DashMap<PathBuf, Vec<MediaFile>>> {
    let map: DashMap<PathBuf, Vec<MediaFile>> = DashMap::new();
    let ignore_patterns = compile_patterns(ignore_globs);

    root_paths.par_iter().try_for_each(|root_dir| {
        visit_dirs(Path::new(root_dir), &map, &ignore_patterns, extensions)
    })?;

    Ok(map)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn modified_millis(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn visit_dirs(
    dir: &Path,
    map: &DashMap<PathBuf, Vec<MediaFile>>,
    ignore_patterns: &[Pattern],
    extensions: &[String],
) -> io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    if ignore_patterns
        .iter()
        .any(|pattern| pattern.matches_path(dir))
    {
        return Ok(());
    }

    let entries: Vec<fs::DirEntry> = match fs::read_dir(dir) {
        Ok(entries) => entries.collect::<io::Result<Vec<_>>>().map_err(|err| {
            io::Error::new(
                err.kind(),
                format!("Error reading entry in directory {}: {}", dir.display(), err),
            )
        })?,
        Err(err) => {
            if err.kind() == io::ErrorKind::PermissionDenied {
                error!(
                    "Access denied reading directory {}: {}",
                    dir.display(),
                    err
                );
                return Ok(());
            } else {
                return Err(io::Error::new(
                    err.kind(),
                    format!("Error reading directory {}: {}", dir.display(), err),
                ));
            }
        }
    };

    if entries.is_empty() {
        if let (Some(parent), Ok(metadata)) = (dir.parent(), fs::metadata(dir)) {
            map.entry(parent.to_path_buf()).or_default().push(MediaFile {
                path: dir.to_path_buf(),
                size: 0,
                last_modified: modified_millis(&metadata),
                is_directory: true,
            });
        }
        return Ok(());
    }

    entries.into_par_iter().try_for_each(|entry| -> io::Result<()> {
        let path = entry.path();
        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                // Deleted between listing and stat.
                warn!("Error getting metadata for {}: {}", path.display(), err);
                return Ok(());
            }
        };

        if metadata.file_type().is_symlink() {
            return Ok(());
        }
        if metadata.is_dir() {
            visit_dirs(&path, map, ignore_patterns, extensions)?;
        } else if has_extension(&path, extensions)
            && !ignore_patterns
                .iter()
                .any(|pattern| pattern.matches_path(&path))
        {
            map.entry(dir.to_path_buf()).or_default().push(MediaFile {
                path: path.clone(),
                size: metadata.len(),
                last_modified: modified_millis(&metadata),
                is_directory: false,
            });
        }
        Ok(())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn extensions() -> Vec<String> {
        vec!["jpg".to_string(), "png".to_string()]
    }

    #[test]
    fn test_groups_by_parent_and_filters_extensions() {
        let dir = tempdir().unwrap();
        let camera = dir.path().join("DCIM/Camera");
        fs::create_dir_all(&camera).unwrap();
        fs::write(camera.join("a.jpg"), b"a").unwrap();
        fs::write(camera.join("b.PNG"), b"b").unwrap();
        fs::write(camera.join("notes.txt"), b"c").unwrap();

        let root = dir.path().to_str().unwrap();
        let map = build_parent_to_files_map(&[root], &[], &extensions()).unwrap();
        let files = map.get(&camera).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| !f.is_directory));
    }

    #[test]
    fn test_ignore_patterns_skip_directories() {
        let dir = tempdir().unwrap();
        let kept = dir.path().join("Pictures");
        let skipped = dir.path().join(".thumbnails");
        fs::create_dir_all(&kept).unwrap();
        fs::create_dir_all(&skipped).unwrap();
        fs::write(kept.join("a.jpg"), b"a").unwrap();
        fs::write(skipped.join("a.jpg"), b"a").unwrap();

        let root = dir.path().to_str().unwrap();
        let map = build_parent_to_files_map(&[root], &["**/.thumbnails"], &extensions()).unwrap();
        assert!(map.get(&kept).is_some());
        assert!(map.get(&skipped).is_none());
    }

    #[test]
    fn test_empty_directory_is_reported() {
        let dir = tempdir().unwrap();
        let empty = dir.path().join("empty");
        fs::create_dir_all(&empty).unwrap();

        let root = dir.path().to_str().unwrap();
        let map = build_parent_to_files_map(&[root], &[], &extensions()).unwrap();
        let entries = map.get(dir.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_directory);
        assert_eq!(entries[0].path, empty);
    }

    #[test]
    fn test_modification_time_keeps_milliseconds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, b"a").unwrap();
        let stamp = UNIX_EPOCH + std::time::Duration::from_millis(1_700_000_000_250);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(stamp)
            .unwrap();

        let root = dir.path().to_str().unwrap();
        let map = build_parent_to_files_map(&[root], &[], &extensions()).unwrap();
        let files = map.get(dir.path()).unwrap();
        assert_eq!(files[0].last_modified, 1_700_000_000_250);
    }
}
