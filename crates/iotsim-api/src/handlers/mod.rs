//! Route handler implementations, grouped by resource.

pub mod common;
pub mod devices;
pub mod groups;
pub mod health;
pub mod models;
pub mod stats;
