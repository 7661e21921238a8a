//! Key-value persistence for studies, progress and mistakes

mod db;
mod memory;
mod repository;

pub use db::Database;
pub use memory::MemoryStore;
pub use repository::RepertoireStore;

use crate::error::Result;

/// String-keyed blob store. A missing key is `None`, not an error.
pub trait KeyValueStore {
    /// Inserts or replaces the value under `key`.
    fn save(&self, key: &str, value: &str) -> Result<()>;
    fn load(&self, key: &str) -> Result<Option<String>>;
    /// Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
    /// Keys starting with `prefix`, sorted.
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}
