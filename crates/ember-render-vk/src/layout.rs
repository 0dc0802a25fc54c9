// SPDX-License-Identifier: CEPL-1.0
//! Image layout transitions with stage and access masks derived from the
//! (old, new) layout pair.

use ash::vk;
use ember_render::{EngineError, Result};

use crate::device::DeviceContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> Result<TransitionMasks> {
    use ash::vk::AccessFlags as A;
    use ash::vk::ImageLayout as L;
    use ash::vk::PipelineStageFlags as S;

    let (src_stage, dst_stage, src_access, dst_access) = match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => {
            (S::TOP_OF_PIPE, S::TRANSFER, A::empty(), A::TRANSFER_WRITE)
        }
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
            (S::TRANSFER, S::FRAGMENT_SHADER, A::TRANSFER_WRITE, A::SHADER_READ)
        }
        (L::TRANSFER_SRC_OPTIMAL, L::PRESENT_SRC_KHR) => {
            (S::TRANSFER, S::BOTTOM_OF_PIPE, A::TRANSFER_READ, A::empty())
        }
        (L::PRESENT_SRC_KHR, L::TRANSFER_SRC_OPTIMAL) => {
            (S::TOP_OF_PIPE, S::TRANSFER, A::empty(), A::TRANSFER_READ)
        }
        _ => return Err(EngineError::UnsupportedLayoutTransition { old, new }),
    };
    Ok(TransitionMasks {
        src_stage,
        dst_stage,
        src_access,
        dst_access,
    })
}

/// Color barrier over mip levels `[base_mip, base_mip + levels)`, no ownership transfer.
pub fn color_barrier(
    image: vk::Image,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
    base_mip: u32,
    levels: u32,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
        src_access_mask: src_access,
        dst_access_mask: dst_access,
        old_layout: old,
        new_layout: new,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: base_mip,
            level_count: levels,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    }
}

/// Records the transition into an open command buffer.
pub unsafe fn record_transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    mip_levels: u32,
) -> Result<()> {
    let m = transition_masks(old, new)?;
    let barrier = color_barrier(image, old, new, m.src_access, m.dst_access, 0, mip_levels);
    device.cmd_pipeline_barrier(
        cmd,
        m.src_stage,
        m.dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[barrier],
    );
    Ok(())
}

/// Transitions every mip level on a single-use command buffer and waits for it.
pub unsafe fn transition(
    ctx: &DeviceContext,
    image: vk::Image,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    mip_levels: u32,
) -> Result<()> {
    // Validate before touching the queue.
    transition_masks(old, new)?;
    ctx.one_shot(|cmd| record_transition(&ctx.device, cmd, image, old, new, mip_levels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::AccessFlags as A;
    use ash::vk::ImageLayout as L;
    use ash::vk::PipelineStageFlags as S;

    #[test]
    fn recognized_pairs_match_table() {
        let table = [
            (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL, S::TOP_OF_PIPE, S::TRANSFER, A::empty(), A::TRANSFER_WRITE),
            (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL, S::TRANSFER, S::FRAGMENT_SHADER, A::TRANSFER_WRITE, A::SHADER_READ),
            (L::TRANSFER_SRC_OPTIMAL, L::PRESENT_SRC_KHR, S::TRANSFER, S::BOTTOM_OF_PIPE, A::TRANSFER_READ, A::empty()),
            (L::PRESENT_SRC_KHR, L::TRANSFER_SRC_OPTIMAL, S::TOP_OF_PIPE, S::TRANSFER, A::empty(), A::TRANSFER_READ),
        ];
        for (old, new, src_stage, dst_stage, src_access, dst_access) in table {
            assert_eq!(
                transition_masks(old, new).unwrap(),
                TransitionMasks {
                    src_stage,
                    dst_stage,
                    src_access,
                    dst_access
                },
                "{old:?} -> {new:?}"
            );
        }
    }

    #[test]
    fn anything_else_is_rejected() {
        let layouts = [
            L::UNDEFINED,
            L::GENERAL,
            L::TRANSFER_SRC_OPTIMAL,
            L::TRANSFER_DST_OPTIMAL,
            L::SHADER_READ_ONLY_OPTIMAL,
            L::COLOR_ATTACHMENT_OPTIMAL,
            L::PRESENT_SRC_KHR,
        ];
        let mut accepted = 0;
        for old in layouts {
            for new in layouts {
                match transition_masks(old, new) {
                    Ok(_) => accepted += 1,
                    Err(EngineError::UnsupportedLayoutTransition { old: o, new: n }) => {
                        assert_eq!((o, n), (old, new));
                    }
                    Err(e) => panic!("unexpected error {e}"),
                }
            }
        }
        assert_eq!(accepted, 4);
    }

    #[test]
    fn barrier_ignores_queue_ownership() {
        let b = color_barrier(
            vk::Image::null(),
            L::UNDEFINED,
            L::TRANSFER_DST_OPTIMAL,
            A::empty(),
            A::TRANSFER_WRITE,
            0,
            9,
        );
        assert_eq!(b.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(b.dst_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(b.subresource_range.level_count, 9);
    }
}
