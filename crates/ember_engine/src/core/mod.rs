//! # Core Engine Module
//!
//! Shared configuration types read once at startup and handed to the
//! window and render context.

pub mod config;

pub use config::{
    DescriptorPoolConfig, EngineConfig, PipelineConfig, RendererConfig, ShadowConfig, WindowConfig,
};
pub use crate::config::{Config, ConfigError};
