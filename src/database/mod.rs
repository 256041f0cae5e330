pub mod memory;
pub mod models;
pub mod postgres;
pub mod storage;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;
pub use storage::{CascadeSummary, Page, Storage, StorageError, StorageResult};
