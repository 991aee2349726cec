//! Deckhand Services Layer
//!
//! This crate is the **business service layer** of the backup subsystem:
//! secure archive extraction and analysis, per-engine database dump
//! drivers, the export and import orchestrators, the download token
//! broker, and the expiry sweep. Keep coordination here; keep thin HTTP
//! handling and persistence in their own crates.

pub mod archive;
pub mod backups;
pub mod cleanup;
pub mod dump;
pub mod export;
pub mod import;
pub mod notify;
pub mod token;

#[cfg(test)]
pub(crate) mod test_support;

pub use archive::{AnalysisResult, ArchiveAnalyzer, Packer, SecureArchiveExtractor};
pub use backups::BackupService;
pub use cleanup::{CleanupService, CleanupServiceConfig};
pub use dump::{DumpDriver, DumpDriverConfig, DumpDriverRegistry};
pub use export::{ExportConfig, ExportOrchestrator, ExportOutcome};
pub use import::{ImportConfig, ImportOrchestrator};
pub use notify::WebhookNotifier;
pub use token::DownloadTokenBroker;
