//! # Ember Engine
//!
//! Vulkan rendering core: frame-slot synchronization, swapchain lifecycle,
//! reflection-driven pipelines with self-growing descriptor pools, and a
//! two-pass (shadow depth, then main color) frame orchestrator.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ember_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     let mut window = Window::new(&config.window)?;
//!     let mut context = RenderContext::new(&mut window, &config.renderer)?;
//!
//!     let camera = Camera::perspective(Point3::new(0.0, 2.0, 5.0), Point3::origin());
//!     let light = DirectionalLight::default();
//!     while !window.should_close() {
//!         window.poll_events();
//!         context.render_frame(&mut window, &camera, &light, &[])?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::config::{EngineConfig, PipelineConfig, RendererConfig, WindowConfig},
        config::Config,
        foundation::math::{Mat4, Point3, Quat, Transform, Vec3},
        render::{
            camera::{Camera, Projection},
            frame_loop::FrameOutcome,
            lighting::DirectionalLight,
            material::{MaterialKind, MaterialSpec},
            overlay::{DiagnosticOverlay, FrameStats, NullOverlay, StatsLogOverlay},
            render_context::RenderContext,
            renderable::{MeshData, RenderableDesc, RenderableKey},
            backends::vulkan::{PipelineKey, TextureKey, Vertex, VulkanError, VulkanResult},
            window::{FramebufferSource, Window},
        },
    };
}
