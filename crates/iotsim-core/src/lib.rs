//! Shared domain types, error taxonomy, configuration and logging for the
//! device simulation engine.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::Settings;
pub use error::{EngineError, EngineResult};
pub use types::{ConnectionState, DeviceSource, DeviceStatus, DeviceType, Distribution, Protocol};
