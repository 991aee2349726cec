//! Secure extraction of untrusted ZIP archives.
//!
//! Every entry path is validated before a single byte is written: null
//! bytes, absolute paths, drive-letter prefixes, and `..` segments are
//! rejected, and the resolved path must stay inside the target directory.
//! Unsafe entries are skipped and logged; the rest of the archive is
//! still extracted, so one hostile entry cannot abort a whole import.

use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use zip::ZipArchive;

use deckhand_core::AppError;

/// Counts reported back to the import pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionSummary {
    pub extracted_files: usize,
    pub extracted_dirs: usize,
    /// Entries rejected by validation. Noise entries skipped silently
    /// (resource forks, .DS_Store) are not counted here.
    pub skipped_entries: usize,
}

pub struct SecureArchiveExtractor;

impl SecureArchiveExtractor {
    /// Unpack `archive_path` into `target_dir`, creating the target if
    /// needed. Fails only when the archive itself is unreadable or the
    /// filesystem rejects a write; unsafe entries are skipped.
    pub async fn extract(
        archive_path: &Path,
        target_dir: &Path,
    ) -> Result<ExtractionSummary, AppError> {
        let archive_path = archive_path.to_path_buf();
        let target_dir = target_dir.to_path_buf();

        tokio::task::spawn_blocking(move || extract_blocking(&archive_path, &target_dir))
            .await
            .map_err(|e| AppError::Internal(format!("Extraction task failed: {}", e)))?
    }
}

fn extract_blocking(archive_path: &Path, target_dir: &Path) -> Result<ExtractionSummary, AppError> {
    fs::create_dir_all(target_dir)?;
    // Validation resolves entries against the canonical target, so the
    // containment check is immune to symlinks in the target's ancestry.
    let target = target_dir
        .canonicalize()
        .map_err(|e| AppError::Extraction(format!("Cannot resolve target directory: {}", e)))?;

    let file = fs::File::open(archive_path)
        .map_err(|e| AppError::Extraction(format!("Cannot open archive: {}", e)))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| AppError::Extraction(format!("Unreadable archive: {}", e)))?;

    let mut summary = ExtractionSummary::default();

    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(index, error = %e, "Skipping unreadable archive entry");
                summary.skipped_entries += 1;
                continue;
            }
        };

        let name = entry.name().to_string();

        if is_noise_entry(&name) {
            continue;
        }

        let Some(resolved) = validate_entry_path(&target, &name) else {
            tracing::warn!(entry = %name.replace('\0', "\\0"), "Skipping unsafe archive entry");
            summary.skipped_entries += 1;
            continue;
        };

        if entry.is_dir() {
            fs::create_dir_all(&resolved)?;
            summary.extracted_dirs += 1;
            continue;
        }

        // Buffer the entry fully before writing; archive sizes are
        // bounded upstream by the upload limit.
        let mut contents = Vec::with_capacity(entry.size() as usize);
        if let Err(e) = entry.read_to_end(&mut contents) {
            tracing::warn!(entry = %name, error = %e, "Skipping corrupt archive entry");
            summary.skipped_entries += 1;
            continue;
        }

        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&resolved, contents)?;
        summary.extracted_files += 1;
    }

    tracing::info!(
        archive = %archive_path.display(),
        extracted_files = summary.extracted_files,
        skipped_entries = summary.skipped_entries,
        "Archive extracted"
    );

    Ok(summary)
}

/// macOS resource forks and Finder metadata are expected junk in user
/// uploads and are dropped without logging.
fn is_noise_entry(name: &str) -> bool {
    Path::new(name).components().any(|c| {
        matches!(c, Component::Normal(part)
            if part == "__MACOSX" || part == ".DS_Store")
    })
}

/// Validate a raw entry path and resolve it under `target`. Returns the
/// absolute destination, or None when the entry must be skipped.
fn validate_entry_path(target: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() || name.contains('\0') {
        return None;
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return None;
    }
    if has_drive_letter_prefix(name) {
        return None;
    }
    // Reject any literal `..` segment, on either separator convention.
    if name
        .split(['/', '\\'])
        .any(|segment| segment == "..")
    {
        return None;
    }

    let mut resolved = target.to_path_buf();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            // RootDir/Prefix/ParentDir are unreachable after the raw
            // checks above, but the resolver must not rely on that.
            _ => return None,
        }
    }

    if resolved.starts_with(target) {
        Some(resolved)
    } else {
        None
    }
}

fn has_drive_letter_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn build_zip(entries: &[(&str, Option<&[u8]>)]) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upload.zip");
        let file = fs::File::create(&path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::default();

        for (name, contents) in entries {
            match contents {
                Some(data) => {
                    zip.start_file(*name, options).unwrap();
                    zip.write_all(data).unwrap();
                }
                None => {
                    zip.add_directory(*name, options).unwrap();
                }
            }
        }
        zip.finish().unwrap();
        (dir, path)
    }

    fn files_under(root: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    found.push(path);
                }
            }
        }
        found
    }

    #[tokio::test]
    async fn test_extracts_safe_entries() {
        let (_guard, archive) = build_zip(&[
            ("app.js", Some(b"console.log('hi')".as_slice())),
            ("src/", None),
            ("src/index.ts", Some(b"export {}".as_slice())),
        ]);
        let target = TempDir::new().unwrap();

        let summary = SecureArchiveExtractor::extract(&archive, target.path())
            .await
            .unwrap();

        assert_eq!(summary.extracted_files, 2);
        assert_eq!(summary.skipped_entries, 0);
        assert!(target.path().join("app.js").is_file());
        assert!(target.path().join("src/index.ts").is_file());
    }

    #[tokio::test]
    async fn test_rejects_traversal_entries() {
        let (_guard, archive) = build_zip(&[
            ("ok.txt", Some(b"fine".as_slice())),
            ("../evil.txt", Some(b"escape".as_slice())),
            ("nested/../../evil2.txt", Some(b"escape".as_slice())),
            ("/etc/cron.d/evil", Some(b"* * * * * root true".as_slice())),
            ("\\windows\\evil", Some(b"escape".as_slice())),
            ("C:evil.txt", Some(b"escape".as_slice())),
            ("nul\0l.txt", Some(b"escape".as_slice())),
        ]);
        let target = TempDir::new().unwrap();

        let summary = SecureArchiveExtractor::extract(&archive, target.path())
            .await
            .unwrap();

        assert_eq!(summary.extracted_files, 1);
        assert_eq!(summary.skipped_entries, 6);
        assert!(target.path().join("ok.txt").is_file());
        // Nothing may land next to the target directory
        assert!(!target.path().parent().unwrap().join("evil.txt").exists());
        assert!(!target.path().parent().unwrap().join("evil2.txt").exists());
    }

    #[tokio::test]
    async fn test_containment_invariant() {
        let (_guard, archive) = build_zip(&[
            ("a.txt", Some(b"a".as_slice())),
            ("deep/b/c/d.txt", Some(b"d".as_slice())),
            ("../../escape.txt", Some(b"x".as_slice())),
        ]);
        let target = TempDir::new().unwrap();

        SecureArchiveExtractor::extract(&archive, target.path())
            .await
            .unwrap();

        let canonical_target = target.path().canonicalize().unwrap();
        for file in files_under(target.path()) {
            let canonical = file.canonicalize().unwrap();
            assert!(
                canonical.starts_with(&canonical_target),
                "file escaped target: {}",
                canonical.display()
            );
        }
    }

    #[tokio::test]
    async fn test_macos_noise_skipped_silently() {
        let (_guard, archive) = build_zip(&[
            ("real.txt", Some(b"data".as_slice())),
            ("__MACOSX/._real.txt", Some(b"fork".as_slice())),
            (".DS_Store", Some(b"junk".as_slice())),
        ]);
        let target = TempDir::new().unwrap();

        let summary = SecureArchiveExtractor::extract(&archive, target.path())
            .await
            .unwrap();

        // Noise entries count as neither extracted nor skipped
        assert_eq!(summary.extracted_files, 1);
        assert_eq!(summary.skipped_entries, 0);
        assert!(!target.path().join("__MACOSX").exists());
        assert!(!target.path().join(".DS_Store").exists());
    }

    #[tokio::test]
    async fn test_unreadable_archive_fails() {
        let dir = TempDir::new().unwrap();
        let bogus = dir.path().join("not-a-zip.zip");
        fs::write(&bogus, b"this is not a zip archive").unwrap();
        let target = TempDir::new().unwrap();

        let result = SecureArchiveExtractor::extract(&bogus, target.path()).await;
        assert!(matches!(result, Err(AppError::Extraction(_))));
    }

    #[test]
    fn test_validate_entry_path_directly() {
        let target = Path::new("/srv/extract/job-1");
        assert!(validate_entry_path(target, "a/b.txt").is_some());
        assert!(validate_entry_path(target, "./a/b.txt").is_some());
        assert!(validate_entry_path(target, "").is_none());
        assert!(validate_entry_path(target, "..").is_none());
        assert!(validate_entry_path(target, "a/../../b").is_none());
        assert!(validate_entry_path(target, "/absolute").is_none());
        assert!(validate_entry_path(target, "\\absolute").is_none());
        assert!(validate_entry_path(target, "D:stuff").is_none());
        assert!(validate_entry_path(target, "nul\0l").is_none());
    }
}
