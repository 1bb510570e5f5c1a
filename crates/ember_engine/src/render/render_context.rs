//! # Render Context
//!
//! The explicit owner of every GPU object the engine creates. Applications
//! build one [`RenderContext`] from a window and a [`RendererConfig`], add
//! textures and renderables through it, and call
//! [`RenderContext::render_frame`] once per iteration of their loop.
//!
//! ## Frame Structure
//!
//! Each frame records two passes into a single command buffer:
//!
//! 1. a depth-only shadow pass rendering every shadow caster from the light
//! 2. the main pass: skybox, renderables, then the diagnostic overlay
//!
//! The loop control (fence waits, skips, swapchain recreation) lives in
//! [`FrameDriver`]; this module supplies the GPU side through a private
//! [`FrameTimeline`] implementation.

use std::mem::size_of;
use std::path::{Path, PathBuf};

use ash::vk;
use slotmap::SlotMap;

use crate::core::config::{resolve_shader_path, RendererConfig};
use crate::foundation::math::{to_columns, Mat4, Transform};
use crate::foundation::time::FrameTimer;
use crate::render::backends::vulkan::state::swapchain_manager::wait_for_nonzero_extent;
use crate::render::backends::vulkan::{
    AcquireOutcome, BoundResource, CommandPool, CommandRecorder, DescriptorPoolManager, GpuMesh, OwnerKey, Pipeline,
    PipelineDesc, PipelineEntry, PipelineKey, PipelineRegistry, PipelineTarget, PresentOutcome, RenderPass, ShadowMap,
    Swapchain, SwapchainManager, SyncManager, Texture, TextureKey, UniformBinding, VulkanContext, VulkanError,
    VulkanResult,
};
use crate::render::camera::Camera;
use crate::render::frame_graph::{plan_frame, DrawItem, FrameInputs, PassOp};
use crate::render::frame_loop::{FrameDriver, FrameOutcome, FrameTimeline};
use crate::render::lighting::{light_space_matrix, DirectionalLight, LightUniform};
use crate::render::material::{Material, MaterialKind, MaterialSpec};
use crate::render::overlay::{DiagnosticOverlay, FrameStats, NullOverlay};
use crate::render::renderable::{ObjectUniform, Renderable, RenderableDesc, RenderableKey, ShadowPush, TransformState};
use crate::render::window::{FramebufferSource, Window};

const SHADOW_PIPELINE: &str = "shadow";

/// Everything a frame touches
///
/// Field order is drop order: every GPU object is listed before the
/// [`VulkanContext`] that created it.
struct FrameResources {
    overlay: Box<dyn DiagnosticOverlay>,
    timer: FrameTimer,
    stats: FrameStats,
    renderables: SlotMap<RenderableKey, Renderable>,
    skybox: Option<RenderableKey>,
    textures: SlotMap<TextureKey, Texture>,
    light: UniformBinding,
    shadow_pipeline: PipelineKey,
    shadow_owner: OwnerKey,
    pipelines: PipelineRegistry,
    shadow_map: ShadowMap,
    swapchain: SwapchainManager,
    main_pass: RenderPass,
    sync: SyncManager,
    command_buffers: Vec<vk::CommandBuffer>,
    commands: CommandPool,
    config: RendererConfig,
    context: VulkanContext,
}

/// Owner of the device, swapchain, pipelines and scene resources
pub struct RenderContext {
    driver: FrameDriver,
    frame: FrameResources,
}

impl RenderContext {
    /// Initialize Vulkan for `window` and build the configured pipelines
    pub fn new(window: &mut Window, config: &RendererConfig) -> VulkanResult<Self> {
        config.validate().map_err(VulkanError::InitializationFailed)?;
        let frames = config.max_frames_in_flight;

        let context = VulkanContext::new(window, config)?;
        let commands = CommandPool::new(context.raw_device(), context.graphics_queue_family())?;
        let command_buffers = commands.allocate_command_buffers(frames as u32)?;
        let sync = SyncManager::new(context.raw_device(), frames)?;

        let extent = wait_for_nonzero_extent(window);
        let swapchain = Swapchain::new(&context, extent, vk::SwapchainKHR::null())?;
        let main_pass = RenderPass::new_main_pass(
            context.raw_device(),
            swapchain.format().format,
            context.depth_format(),
            context.msaa_samples(),
        )?;
        let swapchain = SwapchainManager::new(&context, swapchain, &main_pass)?;

        let shadow_map = ShadowMap::new(&context, &config.shadow, frames)?;
        let light = UniformBinding::new(&context, size_of::<LightUniform>(), frames)?;

        let shadow_desc = PipelineDesc {
            name: SHADOW_PIPELINE.to_string(),
            shader_paths: config.shadow.shaders.iter().map(|s| resolve_shader_path(s)).collect(),
            has_depth_stencil: true,
            target: PipelineTarget::Shadow,
        };
        let mut shadow_entry = build_entry(&context, shadow_map.render_pass(), &shadow_desc, config)?;
        let shadow_material = Material::new(
            MaterialKind::Shadow,
            vec![BoundResource::Uniform(shadow_map.light_space().descriptor_infos())],
        )?;
        let shadow_owner = shadow_entry.descriptors.request_sets(shadow_material.into_resources())?;

        let mut pipelines = PipelineRegistry::new();
        let shadow_pipeline = pipelines.insert(SHADOW_PIPELINE, shadow_entry)?;

        let mut frame = FrameResources {
            overlay: Box::new(NullOverlay),
            timer: FrameTimer::new(),
            stats: FrameStats::default(),
            renderables: SlotMap::with_key(),
            skybox: None,
            textures: SlotMap::with_key(),
            light,
            shadow_pipeline,
            shadow_owner,
            pipelines,
            shadow_map,
            swapchain,
            main_pass,
            sync,
            command_buffers,
            commands,
            config: config.clone(),
            context,
        };

        for pipeline in &config.pipelines {
            frame.add_pipeline(&pipeline.name, pipeline.resolved_shaders(), pipeline.depth_test)?;
        }

        log::info!(
            "Render context ready: {} frames in flight, {} pipelines, {:?} MSAA",
            frames,
            frame.pipelines.len(),
            frame.context.msaa_samples()
        );

        Ok(Self {
            driver: FrameDriver::new(frames),
            frame,
        })
    }

    /// Build a main-pass pipeline from compiled shader files
    pub fn add_pipeline<P: AsRef<Path>>(
        &mut self,
        name: &str,
        shader_paths: &[P],
        has_depth_stencil: bool,
    ) -> VulkanResult<PipelineKey> {
        let paths = shader_paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
        self.frame.add_pipeline(name, paths, has_depth_stencil)
    }

    /// Look up a pipeline by name
    pub fn pipeline(&self, name: &str) -> Option<PipelineKey> {
        self.frame.pipelines.key(name)
    }

    /// Pipeline handles and reflection
    pub fn pipeline_info(&self, key: PipelineKey) -> Option<&Pipeline> {
        self.frame.pipelines.get(key).map(|entry| &entry.pipeline)
    }

    /// Register a resource list with a pipeline's descriptor pool
    ///
    /// The sets are allocated before the next frame records; until then
    /// [`RenderContext::descriptor_sets`] returns `None`.
    pub fn create_descriptor_sets(
        &mut self,
        pipeline: PipelineKey,
        resources: Vec<BoundResource>,
    ) -> VulkanResult<OwnerKey> {
        self.frame.entry_mut(pipeline)?.descriptors.request_sets(resources)
    }

    /// Per-frame sets of an owner, once allocated
    pub fn descriptor_sets(&self, pipeline: PipelineKey, owner: OwnerKey) -> Option<&[vk::DescriptorSet]> {
        self.frame.pipelines.get(pipeline)?.descriptors.sets(owner)
    }

    /// Replace an owner's resource list and rewrite its sets in place
    ///
    /// Positions must match the pipeline layout as they did at registration.
    pub fn update_descriptor_sets(
        &mut self,
        pipeline: PipelineKey,
        owner: OwnerKey,
        resources: Vec<BoundResource>,
    ) -> VulkanResult<()> {
        let frame = &mut self.frame;
        frame.entry_mut(pipeline)?;

        // In-flight frames may still read the sets being rewritten.
        frame.context.wait_idle()?;
        frame.entry_mut(pipeline)?.descriptors.update_descriptor_sets(owner, resources)
    }

    /// Upload an RGBA8 texture
    pub fn create_texture(&mut self, pixels: &[u8], width: u32, height: u32) -> VulkanResult<TextureKey> {
        let texture = Texture::from_rgba(&self.frame.context, &self.frame.commands, pixels, width, height)?;
        Ok(self.frame.textures.insert(texture))
    }

    /// Upload a cubemap from six square RGBA8 faces (+X, -X, +Y, -Y, +Z, -Z)
    pub fn create_cubemap(&mut self, size: u32, faces: &[&[u8]; 6]) -> VulkanResult<TextureKey> {
        let texture = Texture::cubemap(&self.frame.context, &self.frame.commands, faces, size)?;
        Ok(self.frame.textures.insert(texture))
    }

    /// Upload a mesh and bind it to a pipeline with a material
    pub fn add_renderable(&mut self, desc: RenderableDesc) -> VulkanResult<RenderableKey> {
        self.frame.add_renderable(desc)
    }

    /// Destroy a renderable and release its descriptor sets
    pub fn remove_renderable(&mut self, key: RenderableKey) -> VulkanResult<()> {
        let frame = &mut self.frame;
        if !frame.renderables.contains_key(key) {
            return Err(unknown_renderable());
        }

        // In-flight frames may still reference the sets and buffers.
        frame.context.wait_idle()?;
        let renderable = frame.renderables.remove(key).ok_or_else(unknown_renderable)?;
        frame.entry_mut(renderable.pipeline)?.descriptors.unregister_owner(renderable.owner)?;
        if frame.skybox == Some(key) {
            frame.skybox = None;
        }
        Ok(())
    }

    /// Replace a renderable's transform
    pub fn set_transform(&mut self, key: RenderableKey, transform: Transform) -> VulkanResult<()> {
        let renderable = self.frame.renderables.get_mut(key).ok_or_else(unknown_renderable)?;
        renderable.transform.set(transform);
        Ok(())
    }

    /// Current transform of a renderable
    pub fn transform(&self, key: RenderableKey) -> Option<&Transform> {
        self.frame.renderables.get(key).map(Renderable::transform)
    }

    /// Draw `key` as the skybox, or clear the skybox with `None`
    pub fn set_skybox(&mut self, key: Option<RenderableKey>) -> VulkanResult<()> {
        if let Some(key) = key {
            if !self.frame.renderables.contains_key(key) {
                return Err(unknown_renderable());
            }
        }
        self.frame.skybox = key;
        Ok(())
    }

    /// Replace the diagnostic overlay
    pub fn set_overlay(&mut self, overlay: Box<dyn DiagnosticOverlay>) {
        self.frame.overlay = overlay;
    }

    /// Render one frame of `draw_list` seen from `camera`
    ///
    /// Returns [`FrameOutcome::Skipped`] when the swapchain was out of date at
    /// acquire; the swapchain is rebuilt and the next call draws normally.
    pub fn render_frame<W: FramebufferSource>(
        &mut self,
        window: &mut W,
        camera: &Camera,
        light: &DirectionalLight,
        draw_list: &[RenderableKey],
    ) -> VulkanResult<FrameOutcome> {
        let resized = window.take_resized();

        for (_, entry) in self.frame.pipelines.iter_mut() {
            let serviced = entry.descriptors.service_pending()?;
            if serviced > 0 {
                log::trace!("Allocated sets for {} owners of '{}'", serviced, entry.pipeline.name());
            }
        }

        let extent = self.frame.swapchain.extent();
        let mut camera = camera.clone();
        camera.set_aspect(extent.width, extent.height);

        self.frame.stats = FrameStats {
            frame_number: self.driver.frame_number(),
            frame_time_ms: self.frame.timer.delta_time() * 1000.0,
            fps: self.frame.timer.average_fps(),
            swapchain_generation: self.frame.swapchain.generation(),
            pool_resizes: self
                .frame
                .pipelines
                .iter()
                .map(|(_, entry)| entry.descriptors.ledger().resize_count())
                .sum(),
            draw_calls: 0,
        };

        let mut timeline = VulkanTimeline {
            frame: &mut self.frame,
            window,
            camera: &camera,
            light,
            draw_list,
        };
        let outcome = self.driver.tick(&mut timeline, resized)?;

        if matches!(outcome, FrameOutcome::Presented { .. }) {
            self.frame.timer.tick();
        }
        Ok(outcome)
    }

    /// Block until the GPU is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.frame.context.wait_idle()
    }

    /// Stats of the last recorded frame
    pub const fn frame_stats(&self) -> &FrameStats {
        &self.frame.stats
    }

    /// Live swapchain extent
    pub const fn swapchain_extent(&self) -> vk::Extent2D {
        self.frame.swapchain.extent()
    }

    /// Frames submitted so far
    pub const fn frame_number(&self) -> u64 {
        self.driver.frame_number()
    }

    /// Frames in flight; every owner gets this many descriptor sets
    pub fn frame_count(&self) -> usize {
        self.driver.frame_count()
    }

    /// Device and queues
    pub const fn vulkan(&self) -> &VulkanContext {
        &self.frame.context
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        if let Err(e) = self.frame.context.wait_idle() {
            log::error!("Failed to wait for device idle during shutdown: {}", e);
        }
        log::debug!(
            "Render context dropped after {} frames, {} swapchain recreations",
            self.driver.frame_number(),
            self.driver.recreations()
        );
    }
}

fn unknown_renderable() -> VulkanError {
    VulkanError::InvalidOperation {
        reason: "Unknown renderable handle".to_string(),
    }
}

fn unknown_texture() -> VulkanError {
    VulkanError::InvalidOperation {
        reason: "Unknown texture handle".to_string(),
    }
}

fn build_entry(
    context: &VulkanContext,
    render_pass: &RenderPass,
    desc: &PipelineDesc,
    config: &RendererConfig,
) -> VulkanResult<PipelineEntry> {
    let pipeline = Pipeline::build(context, render_pass, desc)?;
    let descriptors = DescriptorPoolManager::new(
        context.raw_device(),
        pipeline.set_layout().handle(),
        pipeline.reflection(),
        config.max_frames_in_flight,
        &config.descriptor_pool,
    )?;
    Ok(PipelineEntry { descriptors, pipeline })
}

impl FrameResources {
    fn frames(&self) -> usize {
        self.config.max_frames_in_flight
    }

    fn entry_mut(&mut self, key: PipelineKey) -> VulkanResult<&mut PipelineEntry> {
        self.pipelines.get_mut(key).ok_or_else(|| VulkanError::InvalidOperation {
            reason: "Unknown pipeline handle".to_string(),
        })
    }

    fn add_pipeline(&mut self, name: &str, shader_paths: Vec<PathBuf>, has_depth_stencil: bool) -> VulkanResult<PipelineKey> {
        if self.pipelines.key(name).is_some() {
            return Err(VulkanError::InitializationFailed(format!(
                "Pipeline '{name}' already exists"
            )));
        }

        let desc = PipelineDesc {
            name: name.to_string(),
            shader_paths,
            has_depth_stencil,
            target: PipelineTarget::Main,
        };
        let entry = build_entry(&self.context, &self.main_pass, &desc, &self.config)?;
        log::info!("Pipeline '{}' ready", name);
        self.pipelines.insert(name, entry)
    }

    fn texture(&self, key: TextureKey, cube: bool) -> VulkanResult<vk::DescriptorImageInfo> {
        let texture = self.textures.get(key).ok_or_else(unknown_texture)?;
        if texture.is_cubemap() != cube {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Texture is {}a cubemap", if cube { "not " } else { "" }),
            });
        }
        Ok(texture.descriptor_info())
    }

    fn add_renderable(&mut self, desc: RenderableDesc) -> VulkanResult<RenderableKey> {
        if self.pipelines.get(desc.pipeline).is_none() || desc.pipeline == self.shadow_pipeline {
            return Err(VulkanError::InvalidOperation {
                reason: "Renderables need a main-pass pipeline".to_string(),
            });
        }

        let uniform = UniformBinding::new(&self.context, size_of::<ObjectUniform>(), self.frames())?;
        let object = BoundResource::Uniform(uniform.descriptor_infos());
        let light = BoundResource::Uniform(self.light.descriptor_infos());
        let shadow = BoundResource::Texture(self.shadow_map.image_info());

        let kind = desc.material.kind();
        let resources = match desc.material {
            MaterialSpec::Default => vec![object, light, shadow],
            MaterialSpec::Textured { albedo } => {
                vec![object, light, BoundResource::Texture(self.texture(albedo, false)?), shadow]
            }
            MaterialSpec::CubeMap { sky } => vec![object, BoundResource::CubeMap(self.texture(sky, true)?)],
        };
        let material = Material::new(kind, resources)?;

        let mesh = GpuMesh::upload(&self.context, &self.commands, &desc.mesh.vertices, &desc.mesh.indices)?;
        let owner = self.entry_mut(desc.pipeline)?.descriptors.request_sets(material.into_resources())?;

        let key = self.renderables.insert(Renderable {
            uniform,
            mesh,
            transform: TransformState::new(desc.transform),
            pipeline: desc.pipeline,
            owner,
            casts_shadow: desc.casts_shadow,
        });
        log::debug!("Added {:?} renderable {:?}", kind, key);
        Ok(key)
    }

    fn is_ready(&self, key: RenderableKey, slot: usize) -> bool {
        self.renderables.get(key).is_some_and(|renderable| {
            self.pipelines
                .get(renderable.pipeline)
                .and_then(|entry| entry.descriptors.set_for_frame(renderable.owner, slot))
                .is_some()
        })
    }

    /// Write the object uniform and record the draw for one renderable
    fn draw_renderable(
        &mut self,
        recorder: &mut CommandRecorder,
        key: RenderableKey,
        slot: usize,
        view_projection: &Mat4,
    ) -> VulkanResult<()> {
        let renderable = self.renderables.get_mut(key).ok_or_else(unknown_renderable)?;
        let entry = self.pipelines.get(renderable.pipeline).ok_or_else(|| {
            VulkanError::Logic("Renderable refers to a missing pipeline".to_string())
        })?;
        let Some(set) = entry.descriptors.set_for_frame(renderable.owner, slot) else {
            return Ok(());
        };

        let uniform = ObjectUniform::new(renderable.transform.model(), view_projection);
        renderable.uniform.write_pod(slot, &uniform)?;

        recorder.bind_pipeline(entry.pipeline.handle());
        recorder.bind_descriptor_set(entry.pipeline.layout(), set);
        recorder.draw_mesh(&renderable.mesh)
    }

    fn draw_shadow_caster(&mut self, recorder: &mut CommandRecorder, key: RenderableKey) -> VulkanResult<()> {
        let entry = self
            .pipelines
            .get(self.shadow_pipeline)
            .ok_or_else(|| VulkanError::Logic("Shadow pipeline missing".to_string()))?;
        let stages = entry
            .pipeline
            .reflection()
            .push_constant()
            .map(|block| block.stages)
            .ok_or_else(|| VulkanError::Logic("Shadow pipeline declares no model push constant".to_string()))?;

        let renderable = self.renderables.get_mut(key).ok_or_else(unknown_renderable)?;
        let push = ShadowPush {
            model: to_columns(renderable.transform.model()),
        };
        recorder.push_constants(entry.pipeline.layout(), stages, bytemuck::bytes_of(&push));
        recorder.draw_mesh(&renderable.mesh)
    }

    fn main_clear_values(&self) -> Vec<vk::ClearValue> {
        let color = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.02, 0.02, 0.04, 1.0],
            },
        };
        let depth = vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
        };

        if self.main_pass.samples() == vk::SampleCountFlags::TYPE_1 {
            vec![color, depth]
        } else {
            vec![color, depth, color]
        }
    }
}

/// One frame's view of the resources, handed to [`FrameDriver::tick`]
struct VulkanTimeline<'a, W: FramebufferSource> {
    frame: &'a mut FrameResources,
    window: &'a mut W,
    camera: &'a Camera,
    light: &'a DirectionalLight,
    draw_list: &'a [RenderableKey],
}

impl<W: FramebufferSource> VulkanTimeline<'_, W> {
    fn frame_inputs(&self, slot: usize, image_index: u32) -> FrameInputs {
        let frame = &*self.frame;
        let items = self
            .draw_list
            .iter()
            .filter(|key| Some(**key) != frame.skybox)
            .filter_map(|key| {
                frame.renderables.get(*key).map(|renderable| DrawItem {
                    key: *key,
                    casts_shadow: renderable.casts_shadow,
                    ready: frame.is_ready(*key, slot),
                })
            })
            .collect();

        FrameInputs {
            image_index,
            extent: frame.swapchain.extent(),
            perspective: self.camera.is_perspective(),
            has_skybox: frame.skybox.is_some_and(|key| frame.is_ready(key, slot)),
            shadow_ready: frame
                .pipelines
                .get(frame.shadow_pipeline)
                .and_then(|entry| entry.descriptors.set_for_frame(frame.shadow_owner, slot))
                .is_some(),
            items,
        }
    }

    fn replay(&mut self, recorder: &mut CommandRecorder, ops: &[PassOp], slot: usize) -> VulkanResult<()> {
        let view_projection = self.camera.view_projection();
        let sky_view_projection = self.camera.sky_view_projection();
        let frame = &mut *self.frame;

        for op in ops {
            match *op {
                PassOp::UpdateLightSpace => {
                    let light_space =
                        light_space_matrix(&self.light.direction, &self.camera.target, &frame.config.shadow);
                    frame.shadow_map.write_light_space(slot, &light_space)?;
                    frame.light.write_pod(slot, &LightUniform::new(self.light, &light_space))?;
                }
                PassOp::BeginShadowPass => {
                    let clear = [vk::ClearValue {
                        depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
                    }];
                    recorder.begin_render_pass(
                        frame.shadow_map.render_pass().handle(),
                        frame.shadow_map.framebuffer(),
                        frame.shadow_map.extent(),
                        &clear,
                    )?;
                    recorder.set_viewport_and_scissor(frame.shadow_map.extent());
                }
                PassOp::BindShadowPipeline => {
                    let entry = frame
                        .pipelines
                        .get(frame.shadow_pipeline)
                        .ok_or_else(|| VulkanError::Logic("Shadow pipeline missing".to_string()))?;
                    let set = entry
                        .descriptors
                        .set_for_frame(frame.shadow_owner, slot)
                        .ok_or_else(|| VulkanError::Logic("Shadow sets missing".to_string()))?;
                    recorder.bind_pipeline(entry.pipeline.handle());
                    recorder.bind_descriptor_set(entry.pipeline.layout(), set);
                }
                PassOp::DrawShadowCaster(key) => frame.draw_shadow_caster(recorder, key)?,
                PassOp::EndShadowPass | PassOp::EndMainPass => recorder.end_render_pass()?,
                PassOp::BeginMainPass { image_index } => {
                    let clear = frame.main_clear_values();
                    recorder.begin_render_pass(
                        frame.main_pass.handle(),
                        frame.swapchain.framebuffer(image_index)?,
                        frame.swapchain.extent(),
                        &clear,
                    )?;
                }
                PassOp::SetViewport(extent) => recorder.set_viewport_and_scissor(extent),
                PassOp::DrawSkybox => {
                    if let Some(sky) = frame.skybox {
                        frame.draw_renderable(recorder, sky, slot, &sky_view_projection)?;
                    }
                }
                PassOp::DrawRenderable(key) => frame.draw_renderable(recorder, key, slot, &view_projection)?,
                PassOp::DrawOverlay => {
                    frame.stats.draw_calls = recorder.draw_calls();
                    let stats = frame.stats;
                    frame.overlay.record(recorder, &stats)?;
                }
            }
        }
        Ok(())
    }
}

impl<W: FramebufferSource> FrameTimeline for VulkanTimeline<'_, W> {
    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
        self.frame.sync.wait_for_slot(slot)
    }

    fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireOutcome> {
        self.frame
            .sync
            .acquire_image(self.frame.context.swapchain_loader(), self.frame.swapchain.handle(), slot)
    }

    fn record_frame(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
        let command_buffer = *self.frame.command_buffers.get(slot).ok_or_else(|| {
            VulkanError::Logic(format!("No command buffer for frame slot {slot}"))
        })?;

        let ops = plan_frame(&self.frame_inputs(slot, image_index));
        let mut recorder = CommandRecorder::new(self.frame.context.raw_device(), command_buffer);
        recorder.begin()?;
        self.replay(&mut recorder, &ops, slot)?;
        recorder.end()?;
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> VulkanResult<()> {
        let command_buffer = *self.frame.command_buffers.get(slot).ok_or_else(|| {
            VulkanError::Logic(format!("No command buffer for frame slot {slot}"))
        })?;
        self.frame
            .sync
            .submit(self.frame.context.graphics_queue(), slot, command_buffer)
    }

    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome> {
        let frame = &*self.frame;
        frame.sync.present(
            frame.context.swapchain_loader(),
            frame.context.present_queue(),
            frame.swapchain.handle(),
            slot,
            image_index,
        )
    }

    fn recreate_swapchain(&mut self) -> VulkanResult<()> {
        let frame = &mut *self.frame;
        frame.swapchain.recreate(&frame.context, &frame.main_pass, &mut *self.window)
    }
}
