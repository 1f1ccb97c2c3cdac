mod locks;
mod repository;

pub use locks::*;
pub use repository::*;

/// SQL migration for the ledger schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");
