// Public modules
pub mod command;
pub mod config;
pub mod confirm;
pub mod console;
pub mod deploy;
pub mod error;
pub mod finalize;
pub mod migration;
pub mod release;
pub mod session;
pub mod ssh;
pub mod symlink;
pub mod transaction;

// Public modules for CLI access
pub mod defaults;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
