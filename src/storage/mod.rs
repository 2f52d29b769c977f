//! Persistence for availability check results
//!
//! The core only ever appends check rows and reads them back for
//! aggregation; rows are never mutated or deleted here. Retention is an
//! operational concern outside this crate.

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;

#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::CheckStore;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use schema::CheckRow;

#[cfg(feature = "storage-sqlite")]
pub use sqlite::SqliteStore;
