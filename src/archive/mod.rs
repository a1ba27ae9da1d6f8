//! IDML package handling: extraction, story discovery and repackaging

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const STORIES_DIR: &str = "Stories";

/// Must be the first, uncompressed entry of an IDML package.
const MIMETYPE_ENTRY: &str = "mimetype";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive entry escapes the extraction directory: {0}")]
    PathTraversal(String),

    #[error("invalid archive: {0}")]
    Zip(#[from] ZipError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Extract `archive_path` into a freshly emptied `output_dir`.
///
/// Every entry name is checked before anything is written, so a package with
/// a single escaping entry leaves no files behind.
pub fn extract(archive_path: &Path, output_dir: &Path) -> Result<(), ArchiveError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;

    let mut targets = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| ArchiveError::PathTraversal(entry.name().to_string()))?;
        targets.push((relative, entry.is_dir()));
    }

    if output_dir.exists() {
        fs::remove_dir_all(output_dir)?;
    }
    fs::create_dir_all(output_dir)?;

    for (i, (relative, is_dir)) in targets.into_iter().enumerate() {
        let dest = output_dir.join(&relative);
        if is_dir {
            fs::create_dir_all(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut entry = archive.by_index(i)?;
        let mut out = File::create(&dest)?;
        io::copy(&mut entry, &mut out)?;
    }

    debug!(
        "Extracted {} into {}",
        archive_path.display(),
        output_dir.display()
    );
    Ok(())
}

/// Story files (`Stories/*.xml`) of an unpacked package, sorted by name.
pub fn find_story_files(unpacked_dir: &Path) -> Result<Vec<PathBuf>> {
    let stories = unpacked_dir.join(STORIES_DIR);
    if !stories.is_dir() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = fs::read_dir(&stories)
        .with_context(|| format!("Failed to read {}", stories.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "xml"))
        .collect();

    files.sort();
    Ok(files)
}

/// Zip `source_dir` into `output_path` with forward-slash relative names.
pub fn repackage(source_dir: &Path, output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    let mut zip = ZipWriter::new(file);

    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    let mimetype = source_dir.join(MIMETYPE_ENTRY);
    if mimetype.is_file() {
        zip.start_file(MIMETYPE_ENTRY, stored)?;
        zip.write_all(&fs::read(&mimetype)?)?;
    }

    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.context("Failed to walk package directory")?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry_name(source_dir, entry.path())?;
        if name == MIMETYPE_ENTRY {
            continue;
        }

        zip.start_file(name.as_str(), deflated)
            .with_context(|| format!("Failed to add {}", name))?;
        zip.write_all(&fs::read(entry.path())?)?;
    }

    zip.finish().context("Failed to finish archive")?;
    debug!("Repackaged {} -> {}", source_dir.display(), output_path.display());
    Ok(())
}

fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;

    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    Ok(parts.join("/"))
}

/// Copy an unpacked package to `target_dir`, replacing whatever was there.
pub fn copy_unpacked_dir(source_dir: &Path, target_dir: &Path) -> Result<()> {
    if target_dir.exists() {
        fs::remove_dir_all(target_dir)
            .with_context(|| format!("Failed to clear {}", target_dir.display()))?;
    }

    for entry in WalkDir::new(source_dir) {
        let entry = entry.context("Failed to walk package directory")?;
        let relative = entry.path().strip_prefix(source_dir)?;
        let dest = target_dir.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            fs::copy(entry.path(), &dest)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn create_zip(path: &Path, files: &[(&str, &str)]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, content) in files {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extract_writes_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("doc.idml");
        create_zip(&archive, &[("a.txt", "A"), ("Stories/b.xml", "<Root/>")]);

        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("stale.txt"), "old").unwrap();

        extract(&archive, &out).unwrap();

        assert_eq!(fs::read_to_string(out.join("a.txt")).unwrap(), "A");
        assert_eq!(fs::read_to_string(out.join("Stories/b.xml")).unwrap(), "<Root/>");
        assert!(!out.join("stale.txt").exists());
    }

    #[test]
    fn test_extract_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.idml");
        create_zip(&archive, &[("good.txt", "ok"), ("../evil.txt", "bad")]);

        let out = dir.path().join("out");
        let err = extract(&archive, &out).unwrap_err();

        assert!(matches!(err, ArchiveError::PathTraversal(ref name) if name == "../evil.txt"));
        assert!(!dir.path().join("evil.txt").exists());
        assert!(!out.join("good.txt").exists());
    }

    #[test]
    fn test_find_story_files_sorted_xml_only() {
        let dir = TempDir::new().unwrap();
        let stories = dir.path().join(STORIES_DIR);
        fs::create_dir_all(&stories).unwrap();
        fs::write(stories.join("Story_b.xml"), "").unwrap();
        fs::write(stories.join("Story_a.xml"), "").unwrap();
        fs::write(stories.join("notes.txt"), "").unwrap();

        let found = find_story_files(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Story_a.xml", "Story_b.xml"]);

        let empty = TempDir::new().unwrap();
        assert!(find_story_files(empty.path()).unwrap().is_empty());
    }

    #[test]
    fn test_repackage_roundtrip() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("Stories")).unwrap();
        fs::write(src.join("Stories/s.xml"), "<Story/>").unwrap();
        fs::write(src.join("mimetype"), "application/vnd.adobe.indesign-idml-package").unwrap();

        let packed = dir.path().join("out/packed.idml");
        repackage(&src, &packed).unwrap();

        let mut archive = ZipArchive::new(File::open(&packed).unwrap()).unwrap();
        {
            let first = archive.by_index(0).unwrap();
            assert_eq!(first.name(), "mimetype");
            assert_eq!(first.compression(), CompressionMethod::Stored);
        }
        let mut story = String::new();
        archive
            .by_name("Stories/s.xml")
            .unwrap()
            .read_to_string(&mut story)
            .unwrap();
        assert_eq!(story, "<Story/>");

        let back = dir.path().join("back");
        extract(&packed, &back).unwrap();
        assert_eq!(fs::read_to_string(back.join("Stories/s.xml")).unwrap(), "<Story/>");
    }

    #[test]
    fn test_copy_unpacked_dir_overwrites() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("nested/file.txt"), "new").unwrap();

        let dst = dir.path().join("dst");
        fs::create_dir_all(&dst).unwrap();
        fs::write(dst.join("leftover.txt"), "old").unwrap();

        copy_unpacked_dir(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("nested/file.txt")).unwrap(), "new");
        assert!(!dst.join("leftover.txt").exists());
    }
}
