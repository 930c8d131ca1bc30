//! Provider configuration management.
//!
//! This module handles parsing, validation, and interpolation of the
//! `~/.config/relay/providers.json` configuration file.

mod interpolation;
mod io;
mod model;
mod validation;

pub use interpolation::{InterpolationError, interpolate_config, interpolate_string};
pub use io::{default_config_path, load_config, load_config_from_path, resolve_config_path};
pub use model::{ConfigError, OperationConfig, ProviderConfig, ProvidersConfig};
pub use validation::{ValidationError, validate_config, validate_provider_name};
