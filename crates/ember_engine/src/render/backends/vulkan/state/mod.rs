// Vulkan state management

pub mod frame_slots;
pub mod framebuffer;
pub mod shadow_map;
pub mod swapchain;
pub mod swapchain_manager;
pub mod sync;
pub mod sync_manager;
