//! Datastore backends.

pub mod filesystem;
pub mod memory;
