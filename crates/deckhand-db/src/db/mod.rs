//! Database repositories for the data access layer

pub mod backup;
pub mod project;
pub mod token;
pub mod transaction;
