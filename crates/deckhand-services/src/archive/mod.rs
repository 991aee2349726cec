//! Archive handling: safe extraction of untrusted uploads, content
//! analysis of extracted trees, and tar.gz packing of export workspaces.

pub mod analyze;
pub mod extract;
pub mod pack;

pub use analyze::{AnalysisResult, ArchiveAnalyzer, CLEANUP_DENYLIST};
pub use extract::{ExtractionSummary, SecureArchiveExtractor};
pub use pack::{PackOutput, Packer};
