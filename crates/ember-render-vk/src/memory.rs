// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use ember_render::{EngineError, Result};

/// First memory type allowed by `type_bits` whose flags include all of `required`.
pub fn select_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    let count = (props.memory_type_count as usize).min(vk::MAX_MEMORY_TYPES);
    props.memory_types[..count]
        .iter()
        .enumerate()
        .find(|(i, ty)| type_bits & (1 << i) != 0 && ty.property_flags.contains(required))
        .map(|(i, _)| i as u32)
        .ok_or(EngineError::NoSuitableMemoryType {
            type_bits,
            required,
        })
}

/// Allocates a block for `reqs` in a memory type with `required` properties.
pub unsafe fn allocate(
    device: &ash::Device,
    props: &vk::PhysicalDeviceMemoryProperties,
    reqs: vk::MemoryRequirements,
    required: vk::MemoryPropertyFlags,
) -> Result<vk::DeviceMemory> {
    let memory_type_index = select_memory_type(props, reqs.memory_type_bits, required)?;
    let info = vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: reqs.size,
        memory_type_index,
        ..Default::default()
    };
    device
        .allocate_memory(&info, None)
        .map_err(EngineError::MemoryAllocation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, f) in flags.iter().enumerate() {
            props.memory_types[i].property_flags = *f;
        }
        props
    }

    const LOCAL: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    const HOST: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
        vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
    );

    #[test]
    fn returns_first_match_in_mask() {
        let props = table(&[LOCAL, HOST, HOST | LOCAL]);
        assert_eq!(select_memory_type(&props, 0b111, HOST).unwrap(), 1);
        assert_eq!(select_memory_type(&props, 0b100, HOST).unwrap(), 2);
        assert_eq!(select_memory_type(&props, 0b111, LOCAL).unwrap(), 0);
    }

    #[test]
    fn result_satisfies_mask_and_flags() {
        let props = table(&[LOCAL, HOST, HOST | LOCAL, vk::MemoryPropertyFlags::HOST_VISIBLE]);
        for bits in 1u32..16 {
            for want in [LOCAL, HOST, vk::MemoryPropertyFlags::HOST_VISIBLE, HOST | LOCAL] {
                if let Ok(i) = select_memory_type(&props, bits, want) {
                    assert!(bits & (1 << i) != 0);
                    assert!(props.memory_types[i as usize].property_flags.contains(want));
                }
            }
        }
    }

    #[test]
    fn no_match_is_an_error() {
        let props = table(&[LOCAL, HOST]);
        let err = select_memory_type(&props, 0b01, HOST).unwrap_err();
        assert!(matches!(err, EngineError::NoSuitableMemoryType { type_bits: 1, .. }));
        // Bits beyond the table are ignored.
        assert!(select_memory_type(&props, 0b100, LOCAL).is_err());
    }
}
