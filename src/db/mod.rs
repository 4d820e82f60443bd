pub mod memory;
pub mod migrate;
pub mod postgres;
pub mod store;

pub use memory::MemoryStore;
pub use migrate::migrate;
pub use postgres::{PgStore, PgUnitOfWork};
pub use store::Store;
