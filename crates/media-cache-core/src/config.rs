use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaCacheConfig {
    pub db_path: String,
    pub root_paths: Vec<String>,
    pub ignore_patterns: Vec<String>,
    /// Globs marking paths whose duplicates are safe to suggest for removal
    /// (thumbnail caches, app caches).
    pub junk_patterns: Vec<String>,
    pub image_extensions: Vec<String>,
    /// Root the default path policies are resolved against, e.g. `/storage/emulated/0`.
    pub storage_root: Option<String>,
    pub blur_threshold: f64,
    pub low_light_threshold: f64,
}

impl Default for MediaCacheConfig {
    fn default() -> Self {
        Self {
            db_path: "media_cache.db".to_string(),
            root_paths: Vec::new(),
            ignore_patterns: Vec::new(),
            junk_patterns: vec![
                "**/.thumbnails/**".to_string(),
                "**/cache/**".to_string(),
                "**/.Trash*/**".to_string(),
            ],
            image_extensions: ["jpg", "jpeg", "png", "webp", "gif", "bmp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            storage_root: None,
            blur_threshold: 100.0,
            low_light_threshold: 40.0,
        }
    }
}

pub fn load_configuration() -> Result<MediaCacheConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("MediaCache").required(false))
        .add_source(
            Environment::with_prefix("MEDIA_CACHE")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("root_paths")
                .with_list_parse_key("ignore_patterns")
                .with_list_parse_key("junk_patterns")
                .with_list_parse_key("image_extensions"),
        )
        .build()?;
    builder.try_deserialize::<MediaCacheConfig>()
}

/// Remove directories that are subdirectories of other directories in the list.
pub fn non_overlapping_directories(dirs: Vec<String>) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();

    for dir in dirs {
        let dir_path = Path::new(&dir);
        if result.iter().any(|kept| dir_path.starts_with(Path::new(kept))) {
            continue;
        }
        result.retain(|kept| !Path::new(kept).starts_with(dir_path));
        result.push(dir);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_overlapping_no_overlap() {
        let dirs = vec![
            "/sdcard/DCIM".to_string(),
            "/sdcard/Pictures".to_string(),
            "/sdcard/Download".to_string(),
        ];
        let result = non_overlapping_directories(dirs);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_non_overlapping_with_subdirectory() {
        let dirs = vec![
            "/sdcard/DCIM/Camera".to_string(),
            "/sdcard/DCIM".to_string(),
            "/sdcard/Download".to_string(),
        ];
        let result = non_overlapping_directories(dirs);
        assert_eq!(result.len(), 2);
        assert!(result.contains(&"/sdcard/DCIM".to_string()));
        assert!(result.contains(&"/sdcard/Download".to_string()));
        assert!(!result.contains(&"/sdcard/DCIM/Camera".to_string()));
    }

    #[test]
    fn test_sibling_with_shared_prefix_is_kept() {
        let dirs = vec!["/DCIM/100".to_string(), "/DCIM/1000".to_string()];
        let result = non_overlapping_directories(dirs);
        assert_eq!(result.len(), 2);
    }
}
