//! Packing of export workspaces into compressed tar archives.

use std::fs;
use std::io::Read;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tar::Builder;

use deckhand_core::AppError;

/// Result of a pack operation: archive size in bytes and its SHA-256
/// content checksum, hex encoded.
#[derive(Debug, Clone)]
pub struct PackOutput {
    pub size: u64,
    pub sha256: String,
}

pub struct Packer;

impl Packer {
    /// Pack the whole of `src_dir` into a gzip-compressed tar archive at
    /// `out_path`, then checksum the packed bytes.
    pub async fn pack_tar_gz(src_dir: &Path, out_path: &Path) -> Result<PackOutput, AppError> {
        let src_dir = src_dir.to_path_buf();
        let out_path = out_path.to_path_buf();

        tokio::task::spawn_blocking(move || pack_blocking(&src_dir, &out_path))
            .await
            .map_err(|e| AppError::Internal(format!("Pack task failed: {}", e)))?
    }
}

fn pack_blocking(src_dir: &Path, out_path: &Path) -> Result<PackOutput, AppError> {
    let file = fs::File::create(out_path)
        .map_err(|e| AppError::Pack(format!("Cannot create archive file: {}", e)))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    builder
        .append_dir_all(".", src_dir)
        .map_err(|e| AppError::Pack(format!("Failed to append workspace: {}", e)))?;

    let encoder = builder
        .into_inner()
        .map_err(|e| AppError::Pack(format!("Failed to finalize tar stream: {}", e)))?;
    let file = encoder
        .finish()
        .map_err(|e| AppError::Pack(format!("Failed to finalize gzip stream: {}", e)))?;
    file.sync_all()
        .map_err(|e| AppError::Pack(format!("Failed to flush archive to disk: {}", e)))?;

    // Checksum the packed bytes as written, streaming to bound memory.
    let mut reader = fs::File::open(out_path)
        .map_err(|e| AppError::Pack(format!("Cannot reopen archive: {}", e)))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| AppError::Pack(format!("Failed to read archive back: {}", e)))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }

    Ok(PackOutput {
        size,
        sha256: hex::encode(hasher.finalize()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tar::Archive;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_pack_round_trip() {
        let src = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("project/src")).unwrap();
        fs::create_dir_all(src.path().join("databases")).unwrap();
        fs::write(src.path().join("manifest.json"), b"{}").unwrap();
        fs::write(src.path().join("project/src/app.js"), b"module.exports = 1").unwrap();
        fs::write(src.path().join("databases/main-postgres.sql"), b"-- dump").unwrap();

        let out_dir = TempDir::new().unwrap();
        let out_path = out_dir.path().join("proj-backup-20260101.tar.gz");

        let output = Packer::pack_tar_gz(src.path(), &out_path).await.unwrap();

        assert!(out_path.is_file());
        assert!(output.size > 0);
        assert_eq!(output.sha256.len(), 64);
        assert_ne!(output.sha256, "0".repeat(64));
        assert_eq!(output.size, fs::metadata(&out_path).unwrap().len());

        // The archive must list the workspace contents
        let tar_gz = fs::File::open(&out_path).unwrap();
        let mut archive = Archive::new(GzDecoder::new(tar_gz));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.ends_with("manifest.json")));
        assert!(names.iter().any(|n| n.contains("project/src/app.js")));
        assert!(names
            .iter()
            .any(|n| n.contains("databases/main-postgres.sql")));
    }

    #[tokio::test]
    async fn test_checksum_tracks_content() {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("a.txt"), b"one").unwrap();
        let out_dir = TempDir::new().unwrap();

        let first = Packer::pack_tar_gz(src.path(), &out_dir.path().join("a.tar.gz"))
            .await
            .unwrap();

        fs::write(src.path().join("a.txt"), b"two").unwrap();
        let second = Packer::pack_tar_gz(src.path(), &out_dir.path().join("b.tar.gz"))
            .await
            .unwrap();

        assert_ne!(first.sha256, second.sha256);
    }

    #[tokio::test]
    async fn test_missing_source_fails_with_pack_error() {
        let out_dir = TempDir::new().unwrap();
        let result = Packer::pack_tar_gz(
            Path::new("/nonexistent/workspace"),
            &out_dir.path().join("x.tar.gz"),
        )
        .await;
        assert!(matches!(result, Err(AppError::Pack(_))));
    }
}
