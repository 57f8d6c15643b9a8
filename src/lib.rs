//! Umbra - Tag-based access policy engine
//!
//! This library compiles tag-graph policy definitions into flat grants and
//! synchronizes them into a relational policy store. It exposes all modules
//! for testing purposes.

pub mod entities;
pub mod errors;
pub mod policy;
pub mod reader;
pub mod reload;
pub mod settings;
pub mod storage;
pub mod sync;
