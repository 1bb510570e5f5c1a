//! SPIR-V loading and shader modules

use ash::{vk, Device};
use std::ffi::CStr;
use std::path::Path;

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// First word of every SPIR-V module
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Read a compiled SPIR-V file into words
pub fn load_spirv(path: impl AsRef<Path>) -> VulkanResult<Vec<u32>> {
    let path = path.as_ref();
    log::debug!("[SHADER] Loading shader from: {:?}", path);

    let bytes = std::fs::read(path).map_err(|source| {
        log::error!("[SHADER] Failed to read shader file {:?}: {}", path, source);
        VulkanError::ShaderLoad {
            path: path.to_path_buf(),
            source,
        }
    })?;

    spirv_words(&bytes)
}

/// Reinterpret little-endian bytes as SPIR-V words, checking length and magic
pub fn spirv_words(bytes: &[u8]) -> VulkanResult<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(VulkanError::Reflection(format!(
            "SPIR-V length {} is not a multiple of 4",
            bytes.len()
        )));
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(other) => Err(VulkanError::Reflection(format!("Bad SPIR-V magic number {other:#010x}"))),
        None => Err(VulkanError::Reflection("Empty SPIR-V module".to_string())),
    }
}

/// Shader module with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create a shader module from SPIR-V words
    pub fn from_words(device: &Device, words: &[u32]) -> VulkanResult<Self> {
        log::debug!("[SHADER] Creating shader module from {} words", words.len());

        let create_info = vk::ShaderModuleCreateInfo::builder().code(words);
        let module = unsafe {
            device.create_shader_module(&create_info, None).map_err(|e| {
                log::error!("[SHADER] vkCreateShaderModule failed: {:?}", e);
                VulkanError::Api(e)
            })?
        };

        Ok(Self {
            device: device.clone(),
            module,
        })
    }

    /// Get shader module handle
    pub const fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage create info for pipeline creation
    pub fn stage_info(&self, stage: vk::ShaderStageFlags, entry_point: &CStr) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(entry_point)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        log::trace!("[SHADER] Dropping ShaderModule {:?}", self.module);
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_words_are_little_endian() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        assert_eq!(spirv_words(&bytes).unwrap(), vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(spirv_words(&[]).is_err());
        assert!(spirv_words(&[1, 2, 3]).is_err());
        assert!(spirv_words(&0xdead_beefu32.to_le_bytes()).is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let missing = Path::new("no/such/shader.vert.spv");
        match load_spirv(missing) {
            Err(VulkanError::ShaderLoad { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected ShaderLoad, got {other:?}"),
        }

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&SPIRV_MAGIC.to_le_bytes()).unwrap();
        assert_eq!(load_spirv(file.path()).unwrap(), vec![SPIRV_MAGIC]);
    }
}
