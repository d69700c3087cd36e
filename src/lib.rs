pub mod config;
pub mod db;
pub mod error;
pub mod github;
pub mod model;
pub mod query;
pub mod sync;
