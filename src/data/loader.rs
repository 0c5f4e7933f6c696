// ============================================================
// Layer 4 — Image Folder Loader
// ============================================================
// Discovers a labelled image collection laid out as:
//
//   data/images/
//     ewaste/   img001.jpg img002.png ...
//     metal/    ...
//     paper/    ...
//
// Each immediate sub-directory is one class. Images nested
// deeper inside a class directory still belong to that class.
// Label indices follow the alphabetical order of the folder
// names (see ClassSet), so they are stable across machines.

use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::{class_set::ClassSet, labeled_image::LabeledImage, traits::ImageSource};

/// Extensions accepted as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 5] = ["bmp", "gif", "jpeg", "jpg", "png"];

/// Loads labelled images from a class-per-folder directory.
pub struct ImageFolderLoader {
    dir: PathBuf,
}

impl ImageFolderLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ImageSource for ImageFolderLoader {
    fn load_all(&self) -> Result<(ClassSet, Vec<LabeledImage>)> {
        if !self.dir.is_dir() {
            bail!("Image directory '{}' does not exist", self.dir.display());
        }

        let mut class_dirs = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read directory '{}'", self.dir.display()))?
        {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                class_dirs.push((name.to_string(), path));
            }
        }

        let classes = ClassSet::new(class_dirs.iter().map(|(name, _)| name.clone()));
        if classes.is_empty() {
            bail!(
                "No class sub-directories found in '{}'. Expected one folder per class.",
                self.dir.display()
            );
        }
        class_dirs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut images = Vec::new();
        for (name, path) in &class_dirs {
            let label = classes
                .index_of(name)
                .with_context(|| format!("Class '{name}' missing from class set"))?;

            let mut files = Vec::new();
            collect_images(path, &mut files)?;
            files.sort();

            tracing::info!("Class {} '{}': {} images", label, name, files.len());
            images.extend(files.into_iter().map(|f| LabeledImage::new(f, label)));
        }

        if images.is_empty() {
            bail!(
                "No images with extensions {:?} found under '{}'",
                IMAGE_EXTENSIONS,
                self.dir.display()
            );
        }

        tracing::info!(
            "Found {} images belonging to {} classes",
            images.len(),
            classes.len()
        );
        Ok((classes, images))
    }
}

/// Recursively collect image files under `dir`.
fn collect_images(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            collect_images(&path, out)?;
        } else if is_image_file(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// True when the file extension is one of IMAGE_EXTENSIONS
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"not decoded by the loader").unwrap();
    }

    #[test]
    fn test_labels_follow_alphabetical_folder_order() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("trash/a.png"));
        touch(&tmp.path().join("metal/b.jpg"));
        touch(&tmp.path().join("metal/c.JPEG"));

        let (classes, images) = ImageFolderLoader::new(tmp.path()).load_all().unwrap();

        assert_eq!(classes.names(), &["metal", "trash"]);
        assert_eq!(images.len(), 3);
        assert_eq!(images.iter().filter(|i| i.label == 0).count(), 2);
        assert_eq!(images.iter().filter(|i| i.label == 1).count(), 1);
    }

    #[test]
    fn test_non_images_and_loose_files_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("paper/notes.txt"));
        touch(&tmp.path().join("paper/scan.bmp"));
        touch(&tmp.path().join("readme.png"));

        let (classes, images) = ImageFolderLoader::new(tmp.path()).load_all().unwrap();

        assert_eq!(classes.len(), 1);
        assert_eq!(images.len(), 1);
        assert!(images[0].path.ends_with("scan.bmp"));
    }

    #[test]
    fn test_nested_images_keep_their_class() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("ewaste/phones/old.png"));

        let (_, images) = ImageFolderLoader::new(tmp.path()).load_all().unwrap();
        assert_eq!(images, vec![LabeledImage::new(tmp.path().join("ewaste/phones/old.png"), 0)]);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ImageFolderLoader::new(tmp.path().join("nope")).load_all().unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_directory_without_classes_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("loose.png"));
        let err = ImageFolderLoader::new(tmp.path()).load_all().unwrap_err();
        assert!(err.to_string().contains("No class sub-directories"));
    }

    #[test]
    fn test_classes_without_images_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("metal")).unwrap();
        assert!(ImageFolderLoader::new(tmp.path()).load_all().is_err());
    }
}
