//! Command implementations
//!
//! Each command is a module with an execute function that takes parsed CLI
//! args and runs the operation. Preview commands are generic over the shell
//! host so they run against the mock host in tests.

pub mod config;
pub mod info;
pub mod open;
pub mod thumbnail;

// Re-export execute functions for convenience
pub use config::execute as config;
pub use info::execute as info;
pub use open::execute as open;
pub use thumbnail::execute as thumbnail;
