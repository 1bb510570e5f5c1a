//! SPIR-V reflection
//!
//! The stage of a module comes from its `OpEntryPoint`; descriptor bindings
//! and push-constant blocks come from `spirq`. Per-stage results are merged
//! into one set-0 layout per pipeline.

use ash::vk;
use std::collections::BTreeMap;

use super::shader::SPIRV_MAGIC;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

const HEADER_WORDS: usize = 5;
const OP_ENTRY_POINT: u32 = 15;

/// Pipeline stage a SPIR-V module was compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Tessellation control shader
    TessControl,
    /// Tessellation evaluation shader
    TessEval,
    /// Geometry shader
    Geometry,
    /// Fragment shader
    Fragment,
    /// Compute shader
    Compute,
}

impl ShaderStage {
    /// Map a SPIR-V `ExecutionModel` operand
    pub const fn from_execution_model(model: u32) -> Option<Self> {
        match model {
            0 => Some(Self::Vertex),
            1 => Some(Self::TessControl),
            2 => Some(Self::TessEval),
            3 => Some(Self::Geometry),
            4 => Some(Self::Fragment),
            5 => Some(Self::Compute),
            _ => None,
        }
    }

    /// Vulkan stage flag
    pub const fn to_vk(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::TessControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            Self::TessEval => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
            Self::Geometry => vk::ShaderStageFlags::GEOMETRY,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
            Self::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }
}

/// Find the stage declared by the first `OpEntryPoint`
pub fn entry_point_stage(words: &[u32]) -> VulkanResult<ShaderStage> {
    if words.len() < HEADER_WORDS || words[0] != SPIRV_MAGIC {
        return Err(VulkanError::Reflection("Not a SPIR-V module".to_string()));
    }

    let mut cursor = HEADER_WORDS;
    while cursor < words.len() {
        let instruction = words[cursor];
        let word_count = (instruction >> 16) as usize;
        let opcode = instruction & 0xffff;

        if word_count == 0 || cursor + word_count > words.len() {
            return Err(VulkanError::Reflection(format!(
                "Malformed SPIR-V instruction at word {cursor}"
            )));
        }

        if opcode == OP_ENTRY_POINT && word_count > 1 {
            let model = words[cursor + 1];
            return ShaderStage::from_execution_model(model)
                .ok_or_else(|| VulkanError::Reflection(format!("Unknown execution model {model}")));
        }

        cursor += word_count;
    }

    Err(VulkanError::Reflection("SPIR-V module has no entry point".to_string()))
}

/// One descriptor binding seen by a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedBinding {
    /// Binding index
    pub binding: u32,
    /// Descriptor set index
    pub set: u32,
    /// Descriptor type
    pub descriptor_type: vk::DescriptorType,
    /// Array element count
    pub count: u32,
    /// Stages that access the binding
    pub stages: vk::ShaderStageFlags,
    /// Variable name, when the module kept debug names
    pub name: String,
}

/// A push-constant block seen by a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReflectedPushConstant {
    /// Block size in bytes
    pub size: u32,
    /// Stages that access the block
    pub stages: vk::ShaderStageFlags,
}

/// Reflection of a single shader module
#[derive(Debug, Clone)]
pub struct ShaderReflection {
    /// Stage the module runs in
    pub stage: ShaderStage,
    /// Descriptor bindings
    pub bindings: Vec<ReflectedBinding>,
    /// Push-constant blocks
    pub push_constants: Vec<ReflectedPushConstant>,
}

impl ShaderReflection {
    /// Reflect a module's entry point stage, descriptors and push constants
    pub fn reflect(words: &[u32]) -> VulkanResult<Self> {
        let stage = entry_point_stage(words)?;
        let stages = stage.to_vk();

        let entry_points = spirq::ReflectConfig::new()
            .spv(words)
            .ref_all_rscs(true)
            .reflect()
            .map_err(|e| VulkanError::Reflection(format!("SPIR-V reflection failed: {e:?}")))?;

        let mut bindings = Vec::new();
        let mut push_constants = Vec::new();

        for entry_point in &entry_points {
            for var in &entry_point.vars {
                match var {
                    spirq::var::Variable::Descriptor {
                        name,
                        desc_bind,
                        desc_ty,
                        nbind,
                        ..
                    } => {
                        bindings.push(ReflectedBinding {
                            binding: desc_bind.bind(),
                            set: desc_bind.set(),
                            descriptor_type: descriptor_type(desc_ty)?,
                            count: (*nbind).max(1),
                            stages,
                            name: name.clone().unwrap_or_default(),
                        });
                    }
                    spirq::var::Variable::PushConstant { ty, .. } => {
                        let size = ty.nbyte().ok_or_else(|| {
                            VulkanError::Reflection("Push-constant block has no static size".to_string())
                        })?;
                        push_constants.push(ReflectedPushConstant {
                            size: size as u32,
                            stages,
                        });
                    }
                    _ => {}
                }
            }
        }

        log::debug!(
            "Reflected {:?} shader: {} bindings, {} push-constant blocks",
            stage,
            bindings.len(),
            push_constants.len()
        );

        Ok(Self {
            stage,
            bindings,
            push_constants,
        })
    }
}

fn descriptor_type(desc_ty: &spirq::ty::DescriptorType) -> VulkanResult<vk::DescriptorType> {
    use spirq::ty::DescriptorType;
    match desc_ty {
        DescriptorType::UniformBuffer() => Ok(vk::DescriptorType::UNIFORM_BUFFER),
        DescriptorType::StorageBuffer(..) => Ok(vk::DescriptorType::STORAGE_BUFFER),
        DescriptorType::CombinedImageSampler() => Ok(vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
        DescriptorType::SampledImage() => Ok(vk::DescriptorType::SAMPLED_IMAGE),
        DescriptorType::Sampler() => Ok(vk::DescriptorType::SAMPLER),
        other => Err(VulkanError::Reflection(format!("Unsupported descriptor type: {other:?}"))),
    }
}

/// Union of every stage's reflection for one pipeline
#[derive(Debug, Clone, Default)]
pub struct PipelineReflection {
    bindings: BTreeMap<u32, ReflectedBinding>,
    push_constant: Option<ReflectedPushConstant>,
    stages: vk::ShaderStageFlags,
}

impl PipelineReflection {
    /// Merge per-stage reflections
    ///
    /// A binding used by several stages gets the union of their stage flags;
    /// the same slot with two different types fails. Bindings must be dense
    /// from 0, since resources are assigned to them by position.
    pub fn merge(shaders: &[ShaderReflection]) -> VulkanResult<Self> {
        let mut merged = Self::default();

        for shader in shaders {
            merged.stages |= shader.stage.to_vk();

            for binding in &shader.bindings {
                if binding.set != 0 {
                    log::warn!(
                        "Binding {} '{}' uses set {}; only set 0 is bound",
                        binding.binding,
                        binding.name,
                        binding.set
                    );
                    continue;
                }

                match merged.bindings.get_mut(&binding.binding) {
                    Some(existing) if existing.descriptor_type != binding.descriptor_type => {
                        return Err(VulkanError::InitializationFailed(format!(
                            "Binding {} is {:?} in one stage and {:?} in another",
                            binding.binding, existing.descriptor_type, binding.descriptor_type
                        )));
                    }
                    Some(existing) => {
                        existing.stages |= binding.stages;
                        existing.count = existing.count.max(binding.count);
                    }
                    None => {
                        merged.bindings.insert(binding.binding, binding.clone());
                    }
                }
            }

            for block in &shader.push_constants {
                let range = merged.push_constant.get_or_insert(ReflectedPushConstant {
                    size: 0,
                    stages: vk::ShaderStageFlags::empty(),
                });
                range.size = range.size.max(block.size);
                range.stages |= block.stages;
            }
        }

        for (position, binding) in merged.bindings.keys().enumerate() {
            if *binding != position as u32 {
                return Err(VulkanError::InitializationFailed(format!(
                    "Descriptor bindings must be contiguous from 0; found binding {binding} at position {position}"
                )));
            }
        }

        Ok(merged)
    }

    /// Set-0 layout bindings in binding order
    pub fn layout_bindings(&self) -> Vec<vk::DescriptorSetLayoutBinding> {
        self.bindings
            .values()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding.binding)
                    .descriptor_type(binding.descriptor_type)
                    .descriptor_count(binding.count)
                    .stage_flags(binding.stages)
                    .build()
            })
            .collect()
    }

    /// Push-constant ranges for the pipeline layout
    pub fn push_constant_ranges(&self) -> Vec<vk::PushConstantRange> {
        self.push_constant
            .iter()
            .map(|block| vk::PushConstantRange {
                stage_flags: block.stages,
                offset: 0,
                size: block.size,
            })
            .collect()
    }

    /// Descriptor count per type for one set, keyed by raw `vk::DescriptorType`
    pub fn histogram(&self) -> BTreeMap<i32, u32> {
        let mut histogram = BTreeMap::new();
        for binding in self.bindings.values() {
            *histogram.entry(binding.descriptor_type.as_raw()).or_insert(0) += binding.count;
        }
        histogram
    }

    /// Descriptor types in binding order
    pub fn binding_types(&self) -> Vec<vk::DescriptorType> {
        self.bindings.values().map(|binding| binding.descriptor_type).collect()
    }

    /// Stages present in the pipeline
    pub const fn stages(&self) -> vk::ShaderStageFlags {
        self.stages
    }

    /// Merged push-constant block, if any stage declared one
    pub const fn push_constant(&self) -> Option<ReflectedPushConstant> {
        self.push_constant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_with_entry_point(model: u32) -> Vec<u32> {
        let mut words = vec![SPIRV_MAGIC, 0x0001_0000, 0, 8, 0];
        // OpCapability Shader
        words.extend([(2 << 16) | 17, 1]);
        // OpEntryPoint <model> %4 "main"
        words.extend([(5 << 16) | OP_ENTRY_POINT, model, 4, u32::from_le_bytes(*b"main"), 0]);
        words
    }

    fn binding(index: u32, ty: vk::DescriptorType, stage: ShaderStage) -> ReflectedBinding {
        ReflectedBinding {
            binding: index,
            set: 0,
            descriptor_type: ty,
            count: 1,
            stages: stage.to_vk(),
            name: format!("b{index}"),
        }
    }

    #[test]
    fn test_stage_from_entry_point() {
        assert_eq!(entry_point_stage(&module_with_entry_point(0)).unwrap(), ShaderStage::Vertex);
        assert_eq!(entry_point_stage(&module_with_entry_point(4)).unwrap(), ShaderStage::Fragment);
        assert!(entry_point_stage(&module_with_entry_point(42)).is_err());
    }

    #[test]
    fn test_stage_needs_entry_point() {
        let words = vec![SPIRV_MAGIC, 0x0001_0000, 0, 8, 0, (2 << 16) | 17, 1];
        assert!(entry_point_stage(&words).is_err());
        assert!(entry_point_stage(&[SPIRV_MAGIC]).is_err());

        // Word count running past the end
        let truncated = vec![SPIRV_MAGIC, 0x0001_0000, 0, 8, 0, (9 << 16) | 17];
        assert!(entry_point_stage(&truncated).is_err());
    }

    #[test]
    fn test_merge_unions_stage_flags() {
        let vertex = ShaderReflection {
            stage: ShaderStage::Vertex,
            bindings: vec![
                binding(0, vk::DescriptorType::UNIFORM_BUFFER, ShaderStage::Vertex),
                binding(1, vk::DescriptorType::UNIFORM_BUFFER, ShaderStage::Vertex),
            ],
            push_constants: vec![ReflectedPushConstant {
                size: 64,
                stages: vk::ShaderStageFlags::VERTEX,
            }],
        };
        let fragment = ShaderReflection {
            stage: ShaderStage::Fragment,
            bindings: vec![
                binding(1, vk::DescriptorType::UNIFORM_BUFFER, ShaderStage::Fragment),
                binding(2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, ShaderStage::Fragment),
            ],
            push_constants: vec![ReflectedPushConstant {
                size: 80,
                stages: vk::ShaderStageFlags::FRAGMENT,
            }],
        };

        let merged = PipelineReflection::merge(&[vertex, fragment]).unwrap();
        let layout = merged.layout_bindings();
        assert_eq!(layout.len(), 3);
        assert_eq!(
            layout[1].stage_flags,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(layout[2].stage_flags, vk::ShaderStageFlags::FRAGMENT);

        let ranges = merged.push_constant_ranges();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].size, 80);
        assert_eq!(ranges[0].stage_flags, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT);

        let histogram = merged.histogram();
        assert_eq!(histogram[&vk::DescriptorType::UNIFORM_BUFFER.as_raw()], 2);
        assert_eq!(histogram[&vk::DescriptorType::COMBINED_IMAGE_SAMPLER.as_raw()], 1);

        assert_eq!(
            merged.binding_types(),
            vec![
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            ]
        );
    }

    #[test]
    fn test_merge_rejects_type_conflict() {
        let vertex = ShaderReflection {
            stage: ShaderStage::Vertex,
            bindings: vec![binding(0, vk::DescriptorType::UNIFORM_BUFFER, ShaderStage::Vertex)],
            push_constants: Vec::new(),
        };
        let fragment = ShaderReflection {
            stage: ShaderStage::Fragment,
            bindings: vec![binding(0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, ShaderStage::Fragment)],
            push_constants: Vec::new(),
        };

        assert!(matches!(
            PipelineReflection::merge(&[vertex, fragment]),
            Err(VulkanError::InitializationFailed(_))
        ));
    }

    #[test]
    fn test_merge_rejects_gaps() {
        let vertex = ShaderReflection {
            stage: ShaderStage::Vertex,
            bindings: vec![binding(1, vk::DescriptorType::UNIFORM_BUFFER, ShaderStage::Vertex)],
            push_constants: Vec::new(),
        };
        assert!(PipelineReflection::merge(&[vertex]).is_err());
    }
}
