//! Graphics pipeline creation and the named pipeline registry
//!
//! A pipeline is built from a list of SPIR-V files. Stages, descriptor layout
//! and push-constant ranges all come from reflection, so adding a shader
//! binding never requires touching Rust code.

use ash::vk;
use slotmap::SlotMap;
use std::collections::HashMap;
use std::ffi::CStr;
use std::path::PathBuf;

use super::reflection::{PipelineReflection, ShaderReflection};
use super::render_pass::RenderPass;
use super::shader::{load_spirv, ShaderModule};
use super::vertex_layout::Vertex;
use crate::render::backends::vulkan::{
    DescriptorPoolManager, DescriptorSetLayout, VulkanContext, VulkanError, VulkanResult,
};

slotmap::new_key_type! {
    /// Handle to a registered pipeline
    pub struct PipelineKey;
}

const SHADOW_DEPTH_BIAS_CONSTANT: f32 = 1.25;
const SHADOW_DEPTH_BIAS_SLOPE: f32 = 1.75;

/// Depth state: test and write both follow `has_depth_stencil`
pub fn depth_stencil_state(has_depth_stencil: bool) -> vk::PipelineDepthStencilStateCreateInfo {
    vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(has_depth_stencil)
        .depth_write_enable(has_depth_stencil)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false)
        .build()
}

/// Back-face culling, disabled for depthless pipelines so the camera can sit inside the geometry
pub fn cull_mode(has_depth_stencil: bool) -> vk::CullModeFlags {
    if has_depth_stencil {
        vk::CullModeFlags::BACK
    } else {
        vk::CullModeFlags::NONE
    }
}

/// Which render pass a pipeline is compatible with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineTarget {
    /// Main color pass
    Main,
    /// Depth-only shadow pass
    Shadow,
}

/// Everything needed to build one pipeline
#[derive(Debug, Clone)]
pub struct PipelineDesc {
    /// Registry name
    pub name: String,
    /// Compiled SPIR-V files, any stage order
    pub shader_paths: Vec<PathBuf>,
    /// Enable depth test and write
    pub has_depth_stencil: bool,
    /// Target render pass
    pub target: PipelineTarget,
}

/// Compiled graphics pipeline with its layouts and reflection
pub struct Pipeline {
    name: String,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    set_layout: DescriptorSetLayout,
    reflection: PipelineReflection,
    has_depth_stencil: bool,
    device: ash::Device,
}

impl Pipeline {
    /// Load, reflect and compile the pipeline for `render_pass`
    pub fn build(context: &VulkanContext, render_pass: &RenderPass, desc: &PipelineDesc) -> VulkanResult<Self> {
        let device = context.raw_device();
        log::debug!("Building pipeline '{}' from {:?}", desc.name, desc.shader_paths);

        let mut modules = Vec::with_capacity(desc.shader_paths.len());
        let mut reflections = Vec::with_capacity(desc.shader_paths.len());
        for path in &desc.shader_paths {
            let words = load_spirv(path)?;
            let reflection = ShaderReflection::reflect(&words)?;
            modules.push(ShaderModule::from_words(&device, &words)?);
            reflections.push(reflection);
        }

        let reflection = PipelineReflection::merge(&reflections)?;
        let set_layout = DescriptorSetLayout::from_bindings(&device, reflection.layout_bindings())?;

        let set_layouts = [set_layout.handle()];
        let push_constant_ranges = reflection.push_constant_ranges();
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let layout = unsafe {
            device.create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        let entry = CStr::from_bytes_with_nul(b"main\0")
            .map_err(|e| VulkanError::Logic(e.to_string()))?;
        let stages: Vec<vk::PipelineShaderStageCreateInfo> = modules
            .iter()
            .zip(&reflections)
            .map(|(module, reflection)| module.stage_info(reflection.stage.to_vk(), entry))
            .collect();

        let bindings = [Vertex::binding_description()];
        let attributes = Vertex::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let shadow = desc.target == PipelineTarget::Shadow;
        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(cull_mode(desc.has_depth_stencil))
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(shadow)
            .depth_bias_constant_factor(if shadow { SHADOW_DEPTH_BIAS_CONSTANT } else { 0.0 })
            .depth_bias_slope_factor(if shadow { SHADOW_DEPTH_BIAS_SLOPE } else { 0.0 });

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(render_pass.samples());

        let depth_stencil = depth_stencil_state(desc.has_depth_stencil);

        let color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = if shadow {
            Vec::new()
        } else {
            vec![vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false)
                .build()]
        };
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass.handle())
            .subpass(0);

        let created = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        };
        let pipeline = match created {
            Ok(pipelines) => pipelines.into_iter().next().ok_or_else(|| {
                VulkanError::InitializationFailed(format!("No pipeline returned for '{}'", desc.name))
            }),
            Err((_, err)) => Err(VulkanError::Api(err)),
        };
        let pipeline = match pipeline {
            Ok(pipeline) => pipeline,
            Err(e) => {
                log::error!("Pipeline '{}' failed to compile: {}", desc.name, e);
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(e);
            }
        };

        // Modules are only needed during compilation.
        drop(modules);

        log::info!(
            "Pipeline '{}' ready: {} bindings, depth {}",
            desc.name,
            reflection.binding_types().len(),
            desc.has_depth_stencil
        );

        Ok(Self {
            name: desc.name.clone(),
            pipeline,
            layout,
            set_layout,
            reflection,
            has_depth_stencil: desc.has_depth_stencil,
            device,
        })
    }

    /// Pipeline handle
    pub const fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Pipeline layout handle
    pub const fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Set-0 descriptor layout
    pub const fn set_layout(&self) -> &DescriptorSetLayout {
        &self.set_layout
    }

    /// Merged reflection of all stages
    pub const fn reflection(&self) -> &PipelineReflection {
        &self.reflection
    }

    /// Whether depth test and write are enabled
    pub const fn has_depth_stencil(&self) -> bool {
        self.has_depth_stencil
    }

    /// Registry name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// A pipeline with the descriptor pool that serves it
pub struct PipelineEntry {
    /// Pool paired with the pipeline's set layout
    pub descriptors: DescriptorPoolManager,
    /// The compiled pipeline
    pub pipeline: Pipeline,
}

/// Pipelines keyed by handle, with a name index
pub struct PipelineRegistry<T = PipelineEntry> {
    entries: SlotMap<PipelineKey, T>,
    names: HashMap<String, PipelineKey>,
}

impl<T> Default for PipelineRegistry<T> {
    fn default() -> Self {
        Self {
            entries: SlotMap::with_key(),
            names: HashMap::new(),
        }
    }
}

impl<T> PipelineRegistry<T> {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under a unique name
    pub fn insert(&mut self, name: &str, value: T) -> VulkanResult<PipelineKey> {
        if self.names.contains_key(name) {
            return Err(VulkanError::InitializationFailed(format!(
                "Pipeline '{name}' is already registered"
            )));
        }
        let key = self.entries.insert(value);
        self.names.insert(name.to_string(), key);
        Ok(key)
    }

    /// Look up a handle by name
    pub fn key(&self, name: &str) -> Option<PipelineKey> {
        self.names.get(name).copied()
    }

    /// Entry for a handle
    pub fn get(&self, key: PipelineKey) -> Option<&T> {
        self.entries.get(key)
    }

    /// Mutable entry for a handle
    pub fn get_mut(&mut self, key: PipelineKey) -> Option<&mut T> {
        self.entries.get_mut(key)
    }

    /// All entries
    pub fn iter(&self) -> impl Iterator<Item = (PipelineKey, &T)> {
        self.entries.iter()
    }

    /// All entries, mutably
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PipelineKey, &mut T)> {
        self.entries.iter_mut()
    }

    /// Number of pipelines
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no pipeline is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_toggle_controls_test_and_write() {
        let on = depth_stencil_state(true);
        assert_eq!(on.depth_test_enable, vk::TRUE);
        assert_eq!(on.depth_write_enable, vk::TRUE);
        assert_eq!(on.depth_compare_op, vk::CompareOp::LESS_OR_EQUAL);

        let off = depth_stencil_state(false);
        assert_eq!(off.depth_test_enable, vk::FALSE);
        assert_eq!(off.depth_write_enable, vk::FALSE);

        assert_eq!(cull_mode(true), vk::CullModeFlags::BACK);
        assert_eq!(cull_mode(false), vk::CullModeFlags::NONE);
    }

    #[test]
    fn test_registry_names_are_unique() {
        let mut registry: PipelineRegistry<u32> = PipelineRegistry::new();
        let first = registry.insert("default", 1).unwrap();
        let second = registry.insert("skybox", 2).unwrap();

        assert_eq!(registry.key("default"), Some(first));
        assert_eq!(registry.get(second), Some(&2));
        assert!(registry.key("missing").is_none());

        assert!(matches!(
            registry.insert("default", 3),
            Err(VulkanError::InitializationFailed(_))
        ));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(first), Some(&1));
    }
}
