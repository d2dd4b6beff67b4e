pub mod entry;
pub mod profile;
pub mod receipt;

pub use entry::*;
pub use profile::*;
pub use receipt::*;
