//! Content hashing utilities

pub mod hashing;

pub use hashing::*;
