//! Generic utility primitives with zero deploy knowledge.
//!
//! - `shell` - Shell escaping and quoting

pub mod shell;
