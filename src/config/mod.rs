//! Configuration parsing and types.
//!
//! - `types` - Root config structure (`Config`, `Roots`, `Timeouts`)
//! - `instance` - Instance declarations (`InstanceSpec`, `ServiceInstance`)
//! - `platform` - Declared target platform (`Platform`, `PlatformFamily`)
//! - `duration` - Duration strings for timeouts
//! - `parser` - YAML config parsing
//! - `validation` - Config validation

pub(crate) mod duration;
mod instance;
mod parser;
mod platform;
mod types;
mod validation;

pub use duration::{format_duration, parse_duration_string};
pub use instance::*;
pub use parser::*;
pub use platform::*;
pub use types::*;
