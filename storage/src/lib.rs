//! Typed PostgreSQL access for the Sengine messaging tables
//!
//! One [`Database`] owns a writer pool and a reader pool over the same
//! primary; the split keeps long read queries from starving writes. All
//! statements are parameterized. Query methods are grouped per table family
//! under [`queries`].

#![forbid(unsafe_code)]

pub mod database;
pub mod error;
pub mod models;
pub mod queries;

pub use database::{Database, StorageConfig};
pub use error::{Error, Result};
