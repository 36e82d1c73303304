use std::path::{Path, PathBuf};

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::fingerprint::dhash;

/// Progress events emitted while importing a photo directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportProgress {
    /// Discovery finished; `total` images will be fingerprinted.
    Start { total: usize },
    /// An item was created for this photo.
    Imported { path: PathBuf, item_id: i64 },
    /// The photo could not be decoded and was left out.
    Skipped { path: PathBuf },
    Complete { imported: usize, skipped: usize },
}

/// A photo whose fingerprint was computed, ready to become an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintedPhoto {
    pub path: PathBuf,
    pub fingerprint: String,
}

/// Supported image files under `root`, hidden entries excluded, in path order.
pub fn discover_images(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::NotADirectory(root.to_path_buf()));
    }

    let mut paths = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && dhash::is_supported_image(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Fingerprint every path in parallel. Undecodable images are returned
/// separately, in input order.
pub fn fingerprint_all(paths: &[PathBuf]) -> (Vec<FingerprintedPhoto>, Vec<PathBuf>) {
    let results: Vec<(PathBuf, Option<String>)> = paths
        .par_iter()
        .map(|path| match dhash::fingerprint_image(path) {
            Ok(fingerprint) => (path.clone(), Some(fingerprint)),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "skipping photo");
                (path.clone(), None)
            }
        })
        .collect();

    let mut photos = Vec::new();
    let mut skipped = Vec::new();
    for (path, fingerprint) in results {
        match fingerprint {
            Some(fingerprint) => photos.push(FingerprintedPhoto { path, fingerprint }),
            None => skipped.push(path),
        }
    }
    (photos, skipped)
}

/// Item name for an imported photo: the file stem, or the full file name if
/// the stem is empty.
pub fn item_name(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(path: &Path, shade: u8) {
        let img = image::RgbImage::from_fn(32, 32, |x, _| {
            let v = shade.saturating_add((x * 3) as u8);
            image::Rgb([v, v, v])
        });
        img.save(path).unwrap();
    }

    #[test]
    fn test_discover_images_recursive_and_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("b/nested")).unwrap();
        write_png(&root.join("b/nested/z.png"), 10);
        write_png(&root.join("a.png"), 20);
        std::fs::write(root.join("notes.txt"), "x").unwrap();

        let found = discover_images(root).unwrap();
        assert_eq!(found, vec![root.join("a.png"), root.join("b/nested/z.png")]);
    }

    #[test]
    fn test_discover_images_skips_hidden() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join(".thumbs")).unwrap();
        write_png(&root.join(".thumbs/a.png"), 10);
        write_png(&root.join(".hidden.png"), 10);
        write_png(&root.join("visible.png"), 10);

        assert_eq!(discover_images(root).unwrap(), vec![root.join("visible.png")]);
    }

    #[test]
    fn test_discover_images_requires_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.png");
        write_png(&file, 0);
        assert!(matches!(discover_images(&file), Err(Error::NotADirectory(_))));
        assert!(matches!(
            discover_images(&tmp.path().join("missing")),
            Err(Error::NotADirectory(_))
        ));
    }

    #[test]
    fn test_fingerprint_all_separates_unreadable() {
        let tmp = tempfile::tempdir().unwrap();
        let good = tmp.path().join("good.png");
        let bad = tmp.path().join("bad.jpg");
        write_png(&good, 0);
        std::fs::write(&bad, b"definitely not a jpeg").unwrap();

        let (photos, skipped) = fingerprint_all(&[good.clone(), bad.clone()]);
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].path, good);
        assert_eq!(photos[0].fingerprint.len(), 16);
        assert_eq!(skipped, vec![bad]);
    }

    #[test]
    fn test_item_name() {
        assert_eq!(item_name(Path::new("/photos/IMG_0001.JPG")), "IMG_0001");
        assert_eq!(item_name(Path::new("plain")), "plain");
    }
}
