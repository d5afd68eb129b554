//! Store collaborators: the key-value contract and its implementations.

pub mod memory;
pub mod pattern;
pub mod redis;
pub mod resolver;
pub mod traits;
