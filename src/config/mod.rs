//! Configuration types and loading for mend

mod backend;
mod loader;
mod repair;

pub use backend::BackendConfig;
pub use loader::MendConfig;
pub use repair::RepairConfig;
