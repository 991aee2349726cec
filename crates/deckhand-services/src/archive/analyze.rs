//! Analysis of extracted project trees: size accounting, cleanup
//! candidates, framework detection, and dependency listing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use deckhand_core::AppError;

/// Directories that never belong in a backup: build artifacts, caches,
/// and VCS state. Matched by directory name at any depth.
pub const CLEANUP_DENYLIST: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    ".next",
    "vendor",
    "__pycache__",
    ".cache",
    "coverage",
    "logs",
];

/// Compose file names recognized at the tree root.
pub const COMPOSE_FILE_NAMES: &[&str] = &[
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisResult {
    pub total_files: u64,
    pub total_size: u64,
    /// Relative paths of traversed directories.
    pub directories: Vec<String>,
    /// Relative paths matching the denylist, ready for cleanup.
    pub files_to_cleanup: Vec<String>,
    /// Framework tag inferred from manifest files at the root, e.g.
    /// "nextjs", "express", "docker-compose"; None when nothing matched.
    pub framework: Option<String>,
    /// Dependency names from the root package manifest, when present.
    pub dependencies: Vec<String>,
}

impl AnalysisResult {
    pub fn has_compose_file(&self) -> bool {
        self.framework.as_deref() == Some("docker-compose")
    }
}

pub struct ArchiveAnalyzer;

impl ArchiveAnalyzer {
    /// Walk `root` and classify its contents. Directories flagged for
    /// cleanup are recorded but never descended into.
    pub async fn analyze(root: &Path) -> Result<AnalysisResult, AppError> {
        let mut result = AnalysisResult::default();

        let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                let rel = relative_display(root, &path);

                if file_type.is_dir() {
                    let name = entry.file_name();
                    let name = name.to_string_lossy();
                    if CLEANUP_DENYLIST.iter().any(|d| *d == name) {
                        result.files_to_cleanup.push(rel);
                        continue;
                    }
                    result.directories.push(rel);
                    stack.push(path);
                } else if file_type.is_file() {
                    result.total_files += 1;
                    result.total_size += entry.metadata().await?.len();
                }
                // Symlinks are neither followed nor counted.
            }
        }

        let (framework, dependencies) = detect_framework(root).await;
        result.framework = framework;
        result.dependencies = dependencies;

        tracing::debug!(
            root = %root.display(),
            files = result.total_files,
            bytes = result.total_size,
            cleanup_candidates = result.files_to_cleanup.len(),
            framework = result.framework.as_deref().unwrap_or("unknown"),
            "Extracted tree analyzed"
        );

        Ok(result)
    }

    /// Remove each listed relative path recursively. Already-missing
    /// paths are tolerated, so a repeated call is a no-op. Returns how
    /// many paths were actually removed.
    pub async fn cleanup_extracted_dir(root: &Path, paths: &[String]) -> Result<usize, AppError> {
        let mut removed = 0usize;
        for rel in paths {
            // Cleanup lists are produced by analyze(), but revalidate:
            // nothing outside the root may ever be deleted.
            if rel.is_empty()
                || Path::new(rel).is_absolute()
                || rel.split(['/', '\\']).any(|seg| seg == "..")
            {
                tracing::warn!(path = %rel, "Refusing to clean up suspicious path");
                continue;
            }
            let target = root.join(rel);
            let deleted = match tokio::fs::metadata(&target).await {
                Ok(meta) if meta.is_dir() => {
                    tokio::fs::remove_dir_all(&target).await.map(|_| true)
                }
                Ok(_) => tokio::fs::remove_file(&target).await.map(|_| true),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e),
            };
            match deleted {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(path = %target.display(), error = %e, "Cleanup failed for path");
                }
            }
        }
        Ok(removed)
    }
}

/// Inspect root-level manifest files. Returns the framework tag and the
/// dependency listing (empty when no package manifest is present).
async fn detect_framework(root: &Path) -> (Option<String>, Vec<String>) {
    if let Ok(raw) = tokio::fs::read_to_string(root.join("package.json")).await {
        if let Ok(manifest) = serde_json::from_str::<serde_json::Value>(&raw) {
            let mut dependencies: Vec<String> = Vec::new();
            for key in ["dependencies", "devDependencies"] {
                if let Some(map) = manifest
                    .get(key)
                    .and_then(|v| v.as_object())
                    .map(|m| m.iter().collect::<BTreeMap<_, _>>())
                {
                    dependencies.extend(map.keys().map(|k| k.to_string()));
                }
            }

            let framework = [
                ("next", "nextjs"),
                ("@nestjs/core", "nestjs"),
                ("express", "express"),
                ("react", "react"),
                ("vue", "vue"),
                ("vite", "vite"),
            ]
            .iter()
            .find(|(marker, _)| dependencies.iter().any(|d| d == marker))
            .map(|(_, tag)| tag.to_string())
            .or(Some("node".to_string()));

            return (framework, dependencies);
        }
    }

    for name in COMPOSE_FILE_NAMES {
        if root.join(name).is_file() {
            return (Some("docker-compose".to_string()), Vec::new());
        }
    }

    if root.join("prisma/schema.prisma").is_file() || root.join("schema.prisma").is_file() {
        return (Some("prisma".to_string()), Vec::new());
    }

    (None, Vec::new())
}

fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
