//! Configuration loading and shared configuration types for evreg services.
//!
//! Configuration is layered: `configuration/base.yaml`, then
//! `configuration/{environment}.yaml`, then `APP_`-prefixed environment
//! variables (nested keys separated by double underscores).

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{LoadConfigError, load_config};
