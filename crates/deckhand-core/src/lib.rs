//! Deckhand Core Library
//!
//! This crate provides the domain models, error types, configuration,
//! validation, and collaborator contracts shared across all Deckhand
//! components. Business orchestration lives in deckhand-services; the
//! Postgres record store lives in deckhand-db.

pub mod config;
pub mod encryption;
pub mod error;
pub mod models;
pub mod stores;
pub mod validation;

// Re-export commonly used types
pub use config::Config;
pub use encryption::EncryptionService;
pub use error::AppError;
pub use stores::{
    BackupStore, DeployOrchestrator, NoOpNotifier, Notifier, NotifyEvent, ProjectStore, TokenStore,
};
