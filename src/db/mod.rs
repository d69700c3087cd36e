//! Database module: entity models and SQL repositories.
//!
//! - `model`: persisted entities and association rows.
//! - `repo`: SQL-only functions that map rows into entities.

pub mod model;
pub mod repo;

pub use repo::*;
