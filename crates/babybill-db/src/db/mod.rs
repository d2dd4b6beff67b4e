//! Database repositories for data access layer
//!
//! Each store is a trait shared as `Arc<dyn ...>` by the services. The Postgres
//! repositories back production; the memory stores back tests and offline use.
//
// Receipt records
pub mod receipt;
//
// Profiles and username availability
pub mod profile;
//
// In-process implementations
pub mod memory;
//
// Pool setup and migrations
pub mod setup;

pub use memory::{MemoryReceiptStore, MemoryUsernameDirectory};
pub use profile::{ProfileRepository, UsernameDirectory};
pub use receipt::{PgReceiptRepository, ReceiptStore};
pub use setup::setup_database;
