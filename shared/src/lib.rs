//! Shared utilities for the image service: database pooling, structured
//! logging and content hashing.

pub mod crypto;
pub mod database;
pub mod observability;
