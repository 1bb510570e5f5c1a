//! Window management using GLFW
//!
//! The renderer only needs three things from a window: its live framebuffer
//! size, whether it was resized since the last frame, and a way to block
//! while it is minimized. [`FramebufferSource`] captures exactly that, so the
//! swapchain logic can be exercised without a real window.

use thiserror::Error;

use crate::core::config::WindowConfig;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// The window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// Any other GLFW failure
    #[error("GLFW error: {0}")]
    GlfwError(String),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// What the swapchain needs to know about the surface it presents to
pub trait FramebufferSource {
    /// Current framebuffer size in pixels; zero while minimized
    fn framebuffer_size(&self) -> (u32, u32);

    /// Returns and clears the resize flag
    fn take_resized(&mut self) -> bool;

    /// Block until at least one window event arrives
    fn wait_events(&mut self);
}

/// GLFW window wrapper
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    resized: bool,
    pending: Vec<glfw::WindowEvent>,
}

impl Window {
    /// Create a resizable window with no client API, ready for a Vulkan surface
    pub fn new(config: &WindowConfig) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|_| WindowError::InitializationFailed)?;

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(config.width, config.height, &config.title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        log::debug!("Created window '{}' {}x{}", config.title, config.width, config.height);

        Ok(Self {
            glfw,
            window,
            events,
            resized: false,
            pending: Vec::new(),
        })
    }

    /// Whether the user asked to close the window
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Request the window to close
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Poll GLFW and queue the resulting events
    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
        self.collect_events();
    }

    fn collect_events(&mut self) {
        for (_, event) in glfw::flush_messages(&self.events) {
            if let glfw::WindowEvent::FramebufferSize(..) = event {
                self.resized = true;
            }
            self.pending.push(event);
        }
    }

    /// Events received since the last call
    pub fn drain_events(&mut self) -> Vec<glfw::WindowEvent> {
        std::mem::take(&mut self.pending)
    }

    /// Get required Vulkan instance extensions from GLFW
    pub fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| WindowError::GlfwError("Failed to get required extensions".to_string()))
    }

    /// Create Vulkan surface using GLFW's built-in functionality
    pub fn create_vulkan_surface(&mut self, instance: ash::vk::Instance) -> WindowResult<ash::vk::SurfaceKHR> {
        let mut surface = ash::vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == ash::vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::GlfwError(format!("Failed to create Vulkan surface: {result:?}")))
        }
    }
}

impl FramebufferSource for Window {
    fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    fn wait_events(&mut self) {
        self.glfw.wait_events();
        self.collect_events();
    }
}
