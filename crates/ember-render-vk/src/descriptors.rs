// SPDX-License-Identifier: CEPL-1.0
//! Descriptor set layout, pool and the per-(slot, model) set ring.
//!
//! Binding 0 is the model's uniform block, binding 1 the shared texture.

use ash::vk;
use ember_render::{EngineError, Result, UniformBlock};

use crate::frame::ring_index;
use crate::uniforms::UniformRing;

pub fn set_layout_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 2] {
    [
        vk::DescriptorSetLayoutBinding {
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
        vk::DescriptorSetLayoutBinding {
            binding: 1,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
    ]
}

pub unsafe fn create_set_layout(device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
    let bindings = set_layout_bindings();
    let info = vk::DescriptorSetLayoutCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        binding_count: bindings.len() as u32,
        p_bindings: bindings.as_ptr(),
        ..Default::default()
    };
    device
        .create_descriptor_set_layout(&info, None)
        .map_err(EngineError::DescriptorLayoutCreation)
}

/// Room for exactly `frames * models` sets.
pub fn pool_sizes(frames: usize, models: usize) -> [vk::DescriptorPoolSize; 2] {
    let count = (frames * models) as u32;
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: count,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: count,
        },
    ]
}

fn allocation_error(e: vk::Result) -> EngineError {
    match e {
        vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
            EngineError::DescriptorAllocationExhausted(e)
        }
        other => EngineError::DescriptorPoolCreation(other),
    }
}

/// The image and sampler bound at binding 1 of every set.
#[derive(Debug, Clone, Copy)]
pub struct SampledImage {
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

#[derive(Debug, Default)]
pub struct DescriptorRing {
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
    models: usize,
}

impl DescriptorRing {
    pub unsafe fn new(
        device: &ash::Device,
        layout: vk::DescriptorSetLayout,
        frames: usize,
        models: usize,
        uniforms: &UniformRing,
        texture: SampledImage,
    ) -> Result<Self> {
        let total = frames * models;
        let mut ring = Self {
            models,
            ..Default::default()
        };
        if total == 0 {
            return Ok(ring);
        }

        let sizes = pool_sizes(frames, models);
        let pool_info = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets: total as u32,
            pool_size_count: sizes.len() as u32,
            p_pool_sizes: sizes.as_ptr(),
            ..Default::default()
        };
        ring.pool = device
            .create_descriptor_pool(&pool_info, None)
            .map_err(EngineError::DescriptorPoolCreation)?;

        let layouts = vec![layout; total];
        let alloc = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: ring.pool,
            descriptor_set_count: total as u32,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        ring.sets = match device.allocate_descriptor_sets(&alloc) {
            Ok(sets) => sets,
            Err(e) => {
                ring.destroy(device);
                return Err(allocation_error(e));
            }
        };

        let image_info = vk::DescriptorImageInfo {
            sampler: texture.sampler,
            image_view: texture.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let buffer_infos: Vec<vk::DescriptorBufferInfo> = (0..total)
            .map(|i| vk::DescriptorBufferInfo {
                buffer: uniforms.buffer(i),
                offset: 0,
                range: UniformBlock::SIZE,
            })
            .collect();
        let mut writes = Vec::with_capacity(total * 2);
        for (i, &set) in ring.sets.iter().enumerate() {
            writes.push(vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: set,
                dst_binding: 0,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                p_buffer_info: &buffer_infos[i],
                ..Default::default()
            });
            writes.push(vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: set,
                dst_binding: 1,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                p_image_info: &image_info,
                ..Default::default()
            });
        }
        device.update_descriptor_sets(&writes, &[]);

        Ok(ring)
    }

    pub fn set(&self, slot: usize, model: usize) -> vk::DescriptorSet {
        self.sets[ring_index(slot, model, self.models)]
    }

    /// Frees every set with the pool.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        device.destroy_descriptor_pool(self.pool, None);
        self.pool = vk::DescriptorPool::null();
        self.sets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_holds_one_set_per_slot_and_model() {
        let sizes = pool_sizes(2, 3);
        assert!(sizes.iter().all(|s| s.descriptor_count == 6));
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
    }

    #[test]
    fn bindings_split_by_stage() {
        let [ubo, sampler] = set_layout_bindings();
        assert_eq!(ubo.binding, 0);
        assert!(ubo.stage_flags.contains(vk::ShaderStageFlags::VERTEX));
        assert!(ubo.stage_flags.contains(vk::ShaderStageFlags::FRAGMENT));
        assert_eq!(sampler.binding, 1);
        assert_eq!(sampler.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn pool_exhaustion_is_distinguished() {
        assert!(matches!(
            allocation_error(vk::Result::ERROR_OUT_OF_POOL_MEMORY),
            EngineError::DescriptorAllocationExhausted(_)
        ));
        assert!(matches!(
            allocation_error(vk::Result::ERROR_FRAGMENTED_POOL),
            EngineError::DescriptorAllocationExhausted(_)
        ));
        assert!(matches!(
            allocation_error(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            EngineError::DescriptorPoolCreation(_)
        ));
    }

    #[test]
    fn set_lookup_is_slot_major() {
        use ash::vk::Handle;
        let ring = DescriptorRing {
            pool: vk::DescriptorPool::null(),
            sets: (0..6u64).map(vk::DescriptorSet::from_raw).collect(),
            models: 3,
        };
        assert_eq!(ring.set(1, 2).as_raw(), 5);
        assert_eq!(ring.set(0, 1).as_raw(), 1);
    }
}
