//! # Engine Configuration
//!
//! All values the engine reads at startup: window geometry, frames in flight,
//! validation, MSAA preference, descriptor pool sizing, shadow map parameters
//! and the named pipelines to build at load time.
//!
//! Every struct is `#[serde(default)]`, so a config file only has to name the
//! values it overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use crate::config::{Config, ConfigError};

/// Directories searched, in order, for compiled shaders
const SHADER_DIRS: [&str; 5] = [
    "target/shaders/",
    "shaders/",
    "resources/shaders/",
    "../target/shaders/",
    "./",
];

/// Resolve a compiled shader file name against the common shader locations
///
/// Falls back to `target/shaders/<name>` when nothing exists yet, so the
/// eventual load error names the canonical location.
pub fn resolve_shader_path(name: &str) -> PathBuf {
    let direct = Path::new(name);
    if direct.is_absolute() || direct.exists() {
        return direct.to_path_buf();
    }

    SHADER_DIRS
        .iter()
        .map(|dir| Path::new(dir).join(name))
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| Path::new(SHADER_DIRS[0]).join(name))
}

/// Window creation parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WindowConfig {
    /// Title bar text
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Ember".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Descriptor pool sizing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DescriptorPoolConfig {
    /// Owner allocations a fresh pool holds (each allocation is one set per frame in flight)
    pub initial_capacity: u32,
    /// Capacity multiplier applied on every resize
    pub growth_factor: u32,
}

impl Default for DescriptorPoolConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 8,
            growth_factor: 2,
        }
    }
}

/// Shadow map resolution and light projection volume
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShadowConfig {
    /// Width and height of the square depth texture
    pub map_size: u32,
    /// Half width/height of the orthographic light volume
    pub half_extent: f32,
    /// Near plane of the light volume
    pub near: f32,
    /// Far plane of the light volume
    pub far: f32,
    /// Distance from the reference point back along the light direction to the virtual light
    pub light_distance: f32,
    /// Compiled SPIR-V files of the depth-only pipeline
    pub shaders: Vec<String>,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            map_size: 2048,
            half_extent: 12.0,
            near: 0.1,
            far: 50.0,
            light_distance: 20.0,
            shaders: vec!["shadow.vert.spv".to_string()],
        }
    }
}

/// A named pipeline built at load time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Lookup name
    pub name: String,
    /// Compiled SPIR-V files, one per stage
    pub shaders: Vec<String>,
    /// Enables depth test and depth write
    #[serde(default = "default_depth_test")]
    pub depth_test: bool,
}

const fn default_depth_test() -> bool {
    true
}

impl PipelineConfig {
    /// Create a pipeline entry
    pub fn new(name: impl Into<String>, shaders: &[&str], depth_test: bool) -> Self {
        Self {
            name: name.into(),
            shaders: shaders.iter().map(|s| (*s).to_string()).collect(),
            depth_test,
        }
    }

    /// Shader paths after location resolution
    pub fn resolved_shaders(&self) -> Vec<PathBuf> {
        self.shaders.iter().map(|s| resolve_shader_path(s)).collect()
    }
}

/// # Vulkan Renderer Configuration
///
/// Application metadata, frame pacing, sampling and the pipeline set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Frame slots the CPU may record ahead of the GPU
    pub max_frames_in_flight: usize,
    /// Whether to enable Vulkan validation layers; `None` follows the build type
    pub enable_validation: Option<bool>,
    /// Upper bound on MSAA samples; the device limit may lower it
    pub msaa_samples: u32,
    /// Descriptor pool sizing shared by every pipeline
    pub descriptor_pool: DescriptorPoolConfig,
    /// Shadow pass parameters
    pub shadow: ShadowConfig,
    /// Pipelines registered at startup
    pub pipelines: Vec<PipelineConfig>,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (0, 1, 0),
            max_frames_in_flight: 2,
            enable_validation: None,
            msaa_samples: 4,
            descriptor_pool: DescriptorPoolConfig::default(),
            shadow: ShadowConfig::default(),
            pipelines: vec![
                PipelineConfig::new("default", &["main.vert.spv", "main.frag.spv"], true),
                PipelineConfig::new("textured", &["main.vert.spv", "textured.frag.spv"], true),
                PipelineConfig::new("skybox", &["skybox.vert.spv", "skybox.frag.spv"], false),
            ],
        }
    }

    /// Set maximum frames in flight
    #[must_use]
    pub const fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Enable or disable validation layers
    #[must_use]
    pub const fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the MSAA upper bound
    #[must_use]
    pub const fn with_msaa_samples(mut self, samples: u32) -> Self {
        self.msaa_samples = samples;
        self
    }

    /// Add a pipeline to build at startup
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipelines.push(pipeline);
        self
    }

    /// Whether validation layers should be requested
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }

        if self.max_frames_in_flight == 0 {
            return Err("Max frames in flight must be at least 1".to_string());
        }

        if self.max_frames_in_flight > 8 {
            return Err("Max frames in flight should not exceed 8".to_string());
        }

        if !self.msaa_samples.is_power_of_two() || self.msaa_samples > 64 {
            return Err(format!("MSAA samples must be a power of two up to 64, got {}", self.msaa_samples));
        }

        if self.descriptor_pool.initial_capacity == 0 {
            return Err("Descriptor pool capacity must be at least 1".to_string());
        }

        if self.descriptor_pool.growth_factor < 2 {
            return Err("Descriptor pool growth factor must be at least 2".to_string());
        }

        if self.shadow.map_size == 0 || self.shadow.near >= self.shadow.far {
            return Err("Shadow map needs a nonzero size and near < far".to_string());
        }

        if self.shadow.shaders.is_empty() {
            return Err("Shadow pipeline needs at least a vertex shader".to_string());
        }

        let mut names = std::collections::HashSet::new();
        for pipeline in &self.pipelines {
            if pipeline.shaders.is_empty() {
                return Err(format!("Pipeline '{}' lists no shaders", pipeline.name));
            }
            if !names.insert(pipeline.name.as_str()) {
                return Err(format!("Pipeline '{}' is declared twice", pipeline.name));
            }
        }

        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Ember Application")
    }
}

/// # Complete Engine Configuration
///
/// Top-level configuration applications load from `engine.toml` or `engine.ron`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Default `env_logger` filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Window parameters
    pub window: WindowConfig,
    /// Renderer parameters
    pub renderer: RendererConfig,
}

impl EngineConfig {
    /// Set log level
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid("Window size must be nonzero".to_string()));
        }
        self.renderer.validate().map_err(ConfigError::Invalid)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            window: WindowConfig::default(),
            renderer: RendererConfig::default(),
        }
    }
}

impl Config for EngineConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.renderer.max_frames_in_flight, 2);
        assert_eq!(config.renderer.descriptor_pool.initial_capacity, 8);
        assert_eq!(config.renderer.descriptor_pool.growth_factor, 2);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"

[window]
width = 800

[renderer]
max_frames_in_flight = 3

[[renderer.pipelines]]
name = "sky"
shaders = ["sky.vert.spv", "sky.frag.spv"]
depth_test = false
"#
        )
        .unwrap();

        let config = EngineConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, WindowConfig::default().height);
        assert_eq!(config.renderer.max_frames_in_flight, 3);
        assert_eq!(config.renderer.msaa_samples, 4);
        assert_eq!(config.renderer.pipelines.len(), 1);
        assert!(!config.renderer.pipelines[0].depth_test);
        assert_eq!(config.renderer.shadow, ShadowConfig::default());
    }

    #[test]
    fn test_ron_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.ron");

        let config = EngineConfig::default().with_log_level("warn");
        config.save_to_file(&path).unwrap();

        let loaded = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = RendererConfig::default().with_max_frames_in_flight(0);
        assert!(config.validate().is_err());

        config = RendererConfig::default().with_msaa_samples(3);
        assert!(config.validate().is_err());

        config = RendererConfig::default();
        config.descriptor_pool.growth_factor = 1;
        assert!(config.validate().is_err());

        config = RendererConfig::default()
            .with_pipeline(PipelineConfig::new("default", &["x.vert.spv"], true));
        assert!(config.validate().unwrap_err().contains("declared twice"));
    }

    #[test]
    fn test_missing_shader_resolves_to_target_dir() {
        let path = resolve_shader_path("definitely_missing.vert.spv");
        assert_eq!(path, Path::new("target/shaders/definitely_missing.vert.spv"));
    }
}
