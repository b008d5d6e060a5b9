pub mod repo_types;
pub mod store;

pub use repo_types::{SalesLine, SalesRecord};
pub use store::{FactStore, MemoryFactStore, PgFactStore};
