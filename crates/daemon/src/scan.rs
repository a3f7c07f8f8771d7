//! Scanner module for discovering media files in the library.
//!
//! Recursively walks the library root for files with a recognized container
//! extension, and derives the scratch and destination paths for a source file.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Checks if a file has a recognized container extension (case-insensitive).
///
/// `extensions` are expected lowercase without a leading dot, as produced by
/// [`Settings`](crate::config::Settings).
pub fn is_media_file(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = ext.to_lowercase();
            extensions.iter().any(|e| *e == ext_lower)
        })
        .unwrap_or(false)
}

/// Scratch output path for a source: `<cache_root>/<stem>.<container>`.
///
/// Only the base filename is used, so same-named files in different
/// subdirectories share a scratch path. The daemon processes one file at a
/// time, which keeps this from colliding.
pub fn scratch_path(cache_root: &Path, source: &Path, container: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "output".into());
    let mut name = stem;
    name.push(".");
    name.push(container);
    cache_root.join(name)
}

/// Published location for a source: the same path with the output container
/// extension.
pub fn destination_path(source: &Path, container: &str) -> PathBuf {
    source.with_extension(container)
}

/// Scans the library root for media files.
///
/// This function:
/// - Recursively walks the root directory
/// - Skips hidden directories (names starting with `.`)
/// - Skips everything under `exclude` (the scratch directory)
/// - Filters files by container extension (case-insensitive)
/// - Returns paths sorted so repeated scans dispatch in the same order
pub fn scan_library(root: &Path, extensions: &[String], exclude: Option<&Path>) -> Vec<PathBuf> {
    if !root.exists() {
        tracing::warn!(root = %root.display(), "library root does not exist");
        return Vec::new();
    }

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        if let Some(excluded) = exclude {
            if entry.depth() > 0 && entry.path().starts_with(excluded) {
                return false;
            }
        }
        if entry.file_type().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                // Allow the root directory even if it starts with '.'
                if name.starts_with('.') && entry.depth() > 0 {
                    return false;
                }
            }
        }
        true
    });

    let mut candidates: Vec<PathBuf> = walker
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| is_media_file(entry.path(), extensions))
        .map(|entry| entry.into_path())
        .collect();

    candidates.sort();
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    fn extensions() -> Vec<String> {
        ["mkv", "mp4", "avi"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_is_media_file() {
        let exts = extensions();
        assert!(is_media_file(Path::new("/media/movie.mkv"), &exts));
        assert!(is_media_file(Path::new("/media/movie.MKV"), &exts));
        assert!(is_media_file(Path::new("/media/movie.Avi"), &exts));
        assert!(!is_media_file(Path::new("/media/movie.srt"), &exts));
        assert!(!is_media_file(Path::new("/media/movie"), &exts));
        assert!(!is_media_file(Path::new("/media/.mkv"), &exts));
    }

    #[test]
    fn test_scratch_path_uses_base_name_only() {
        let scratch = scratch_path(
            Path::new("/cache"),
            Path::new("/media/shows/S01/episode.avi"),
            "mkv",
        );
        assert_eq!(scratch, PathBuf::from("/cache/episode.mkv"));
    }

    #[test]
    fn test_scratch_path_with_dots_in_name() {
        let scratch = scratch_path(Path::new("/cache"), Path::new("/media/film.2024.mp4"), "mkv");
        assert_eq!(scratch, PathBuf::from("/cache/film.2024.mkv"));
    }

    #[test]
    fn test_destination_path_replaces_extension() {
        assert_eq!(
            destination_path(Path::new("/media/film.avi"), "mkv"),
            PathBuf::from("/media/film.mkv")
        );
        assert_eq!(
            destination_path(Path::new("/media/film.mkv"), "mkv"),
            PathBuf::from("/media/film.mkv")
        );
    }

    #[test]
    fn test_scan_library_filters_and_sorts() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("movies")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        fs::create_dir_all(root.join("cache")).unwrap();

        File::create(root.join("movies/b.mkv")).unwrap();
        File::create(root.join("movies/a.MP4")).unwrap();
        File::create(root.join("movies/a.srt")).unwrap();
        File::create(root.join(".hidden/secret.mkv")).unwrap();
        File::create(root.join("cache/scratch.mkv")).unwrap();

        let found = scan_library(root, &extensions(), Some(&root.join("cache")));

        assert_eq!(
            found,
            vec![root.join("movies/a.MP4"), root.join("movies/b.mkv")]
        );
    }

    #[test]
    fn test_scan_missing_root_is_empty() {
        assert!(scan_library(Path::new("/nonexistent/library"), &extensions(), None).is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_extension_filtering(
            basename in "[a-zA-Z0-9_-]{1,20}",
            ext in prop_oneof![
                Just("mkv"), Just("MKV"), Just("Mkv"),
                Just("mp4"), Just("MP4"),
                Just("avi"), Just("AVI"),
                Just("txt"), Just("jpg"), Just("srt"), Just("nfo"),
            ],
        ) {
            let path = PathBuf::from(format!("/media/{}.{}", basename, ext));
            let expected = matches!(ext.to_lowercase().as_str(), "mkv" | "mp4" | "avi");
            prop_assert_eq!(is_media_file(&path, &extensions()), expected);
        }
    }
}
