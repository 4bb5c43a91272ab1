//! Command transport: SSH to remote hosts, `sh -c` for localhost, and a
//! recording executor for dry runs.

mod client;

pub use client::*;
