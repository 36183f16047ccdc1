//! Cache Configuration
//!
//! - [`model`] - [`CacheConfig`] and [`ConfigPatch`] override layers
//! - [`validation`] - aggregated [`ValidationResult`]
//! - [`mapper`] - [`ParameterMapper`], splitting generic and AI parameters
//! - [`presets`] - [`PresetManager`] and the closed preset set
//! - [`settings`] - [`CacheSettings`], the environment/CLI surface

pub mod mapper;
pub mod model;
pub mod presets;
pub mod settings;
pub mod validation;

pub use mapper::{GenericParams, MappedConfig, ParameterMapper};
pub use model::{merge, CacheConfig, ConfigPatch, MonitoringConfig, OverrideLayer, SecurityConfig};
pub use presets::{
    ConfigDocument, EnvironmentSignals, ExportFormat, Preset, PresetManager, PresetName,
    PresetRecommendation, ResolvedConfig,
};
pub use settings::CacheSettings;
pub use validation::{Severity, ValidationIssue, ValidationResult};
