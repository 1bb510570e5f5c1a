//! Rendering
//!
//! `backends::vulkan` holds the GPU-facing pieces. The modules at this level
//! describe what a frame contains (camera, light, materials, renderables),
//! decide the pass order, and drive the per-frame loop through
//! [`render_context::RenderContext`].

pub mod backends;
pub mod camera;
pub mod frame_graph;
pub mod frame_loop;
pub mod lighting;
pub mod material;
pub mod overlay;
pub mod render_context;
pub mod renderable;
pub mod window;

pub use camera::{Camera, Projection};
pub use frame_loop::{FrameDriver, FrameOutcome, FrameTimeline};
pub use lighting::DirectionalLight;
pub use render_context::RenderContext;
pub use window::{FramebufferSource, Window, WindowError};
