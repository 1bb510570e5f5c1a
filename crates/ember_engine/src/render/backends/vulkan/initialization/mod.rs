//! Vulkan initialization

pub mod context;

pub use context::*;
