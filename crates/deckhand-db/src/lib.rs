//! Deckhand record store
//!
//! Postgres repositories for the backup subsystem: backup records with
//! status-guarded transitions, download tokens with atomic consumption,
//! and project lookups. Each repository implements the corresponding
//! collaborator trait from deckhand-core.

pub mod db;

pub use db::backup::BackupRepository;
pub use db::project::ProjectRepository;
pub use db::token::TokenRepository;
pub use db::transaction::TransactionGuard;
