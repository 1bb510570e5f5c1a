//! Vulkan resource management
//!
//! Buffers, images, per-frame uniforms, and descriptor sets with their
//! self-growing pools.

/// Buffers and uploaded meshes
pub mod buffer;

/// Descriptor pool capacity tracking and rebuild-on-resize
pub mod descriptor_pool;

/// Descriptor layouts, raw pools and positional writes
pub mod descriptor_set;

/// Images, views, samplers and layout transitions
pub mod image;

/// Sampled 2D textures and cubemaps
pub mod texture;

/// Per-frame uniform buffers
pub mod uniform;
