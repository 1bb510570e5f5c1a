//! Vulkan rendering operations

pub mod commands;
pub mod pipeline;
pub mod reflection;
pub mod render_pass;
pub mod shader;
pub mod vertex_layout;
