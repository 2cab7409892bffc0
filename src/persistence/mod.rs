//! Persistence layer modules.

pub mod blob;
pub mod migrate;
pub mod store;
