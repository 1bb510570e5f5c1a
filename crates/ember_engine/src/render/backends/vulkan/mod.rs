//! Vulkan backend implementation
//!
//! Organized into initialization, resources, rendering and state modules.

/// Instance, device selection and the shared error type
pub mod initialization;

/// GPU resources (buffers, images, uniforms, descriptors)
pub mod resources;

/// Shaders, reflection, pipelines, render passes, commands
pub mod rendering;

/// Frame synchronization, swapchain and shadow map state
pub mod state;

pub use initialization::context::{PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanResult};

pub use resources::buffer::{Buffer, GpuMesh};
pub use resources::descriptor_pool::{AllocateOutcome, DescriptorPoolManager, OwnerKey, PoolLedger};
pub use resources::descriptor_set::{BoundResource, DescriptorSetLayout};
pub use resources::image::{Image, Sampler};
pub use resources::texture::{Texture, TextureKey};
pub use resources::uniform::UniformBinding;

pub use rendering::commands::{CommandPool, CommandRecorder, SingleUseCommands};
pub use rendering::pipeline::{Pipeline, PipelineDesc, PipelineEntry, PipelineKey, PipelineRegistry, PipelineTarget};
pub use rendering::reflection::{PipelineReflection, ShaderReflection, ShaderStage};
pub use rendering::render_pass::RenderPass;
pub use rendering::shader::ShaderModule;
pub use rendering::vertex_layout::Vertex;

pub use state::shadow_map::ShadowMap;
pub use state::swapchain::Swapchain;
pub use state::swapchain_manager::SwapchainManager;
pub use state::sync::{Fence, FrameSync, Semaphore};
pub use state::sync_manager::{AcquireOutcome, PresentOutcome, SyncManager};
