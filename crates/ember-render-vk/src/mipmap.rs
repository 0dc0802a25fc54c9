// SPDX-License-Identifier: CEPL-1.0
//! Mip chain generation by successive linear blits.
//!
//! The chain is planned as a list of [`MipOp`]s first and then recorded, so the
//! per-level layout sequence can be checked without a device.

use ash::vk;
use ember_render::{EngineError, Result};

use crate::device::DeviceContext;
use crate::layout::{color_barrier, TransitionMasks};

/// `floor(log2(max(w, h))) + 1`
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipOp {
    Barrier {
        level: u32,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
        masks: TransitionMasks,
    },
    /// Blit `src_level` (size `src`) into `src_level + 1` (size `dst`).
    Blit {
        src_level: u32,
        src: [i32; 2],
        dst: [i32; 2],
    },
}

const DST_TO_SRC: TransitionMasks = TransitionMasks {
    src_stage: vk::PipelineStageFlags::TRANSFER,
    dst_stage: vk::PipelineStageFlags::TRANSFER,
    src_access: vk::AccessFlags::TRANSFER_WRITE,
    dst_access: vk::AccessFlags::TRANSFER_READ,
};

const SRC_TO_READ: TransitionMasks = TransitionMasks {
    src_stage: vk::PipelineStageFlags::TRANSFER,
    dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
    src_access: vk::AccessFlags::TRANSFER_READ,
    dst_access: vk::AccessFlags::SHADER_READ,
};

const DST_TO_READ: TransitionMasks = TransitionMasks {
    src_stage: vk::PipelineStageFlags::TRANSFER,
    dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
    src_access: vk::AccessFlags::TRANSFER_WRITE,
    dst_access: vk::AccessFlags::SHADER_READ,
};

/// Operations that take an image with every level in `TRANSFER_DST_OPTIMAL`
/// to every level in `SHADER_READ_ONLY_OPTIMAL`.
pub fn plan(width: u32, height: u32, levels: u32) -> Vec<MipOp> {
    use ash::vk::ImageLayout as L;

    let levels = levels.max(1);
    let mut ops = Vec::with_capacity(levels as usize * 3);
    let (mut w, mut h) = (width.max(1) as i32, height.max(1) as i32);

    for level in 1..levels {
        let src = level - 1;
        let next = [(w / 2).max(1), (h / 2).max(1)];
        ops.push(MipOp::Barrier {
            level: src,
            old: L::TRANSFER_DST_OPTIMAL,
            new: L::TRANSFER_SRC_OPTIMAL,
            masks: DST_TO_SRC,
        });
        ops.push(MipOp::Blit {
            src_level: src,
            src: [w, h],
            dst: next,
        });
        ops.push(MipOp::Barrier {
            level: src,
            old: L::TRANSFER_SRC_OPTIMAL,
            new: L::SHADER_READ_ONLY_OPTIMAL,
            masks: SRC_TO_READ,
        });
        [w, h] = next;
    }

    ops.push(MipOp::Barrier {
        level: levels - 1,
        old: L::TRANSFER_DST_OPTIMAL,
        new: L::SHADER_READ_ONLY_OPTIMAL,
        masks: DST_TO_READ,
    });
    ops
}

/// Tracks the layout of each mip level while a plan is replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LevelLayouts(Vec<vk::ImageLayout>);

impl LevelLayouts {
    fn uniform(levels: u32, layout: vk::ImageLayout) -> Self {
        Self(vec![layout; levels as usize])
    }

    /// Applies `op`, returning false if an image level is not in the layout the op expects.
    fn apply(&mut self, op: &MipOp) -> bool {
        match *op {
            MipOp::Barrier { level, old, new, .. } => match self.0.get_mut(level as usize) {
                Some(l) if *l == old => {
                    *l = new;
                    true
                }
                _ => false,
            },
            MipOp::Blit { src_level, .. } => {
                let s = src_level as usize;
                self.0.get(s) == Some(&vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                    && self.0.get(s + 1) == Some(&vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            }
        }
    }

    fn all(&self, layout: vk::ImageLayout) -> bool {
        self.0.iter().all(|&l| l == layout)
    }
}

/// Replays `ops` from all-`TRANSFER_DST` and checks every step is legal and
/// every level ends shader-readable.
fn plan_is_sound(ops: &[MipOp], levels: u32) -> bool {
    let mut layouts = LevelLayouts::uniform(levels, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    ops.iter().all(|op| layouts.apply(op)) && layouts.all(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
}

pub fn check_linear_blit(format: vk::Format, props: vk::FormatProperties) -> Result<()> {
    if props
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    {
        Ok(())
    } else {
        Err(EngineError::LinearBlitUnsupported(format))
    }
}

/// Fills mip levels 1.. from level 0 and leaves every level shader-readable.
/// Level 0 must already hold the image data; all levels start in `TRANSFER_DST_OPTIMAL`.
pub unsafe fn generate(
    ctx: &DeviceContext,
    image: vk::Image,
    format: vk::Format,
    extent: vk::Extent2D,
    levels: u32,
) -> Result<()> {
    let props = ctx
        .instance
        .get_physical_device_format_properties(ctx.phys, format);
    check_linear_blit(format, props)?;

    let ops = plan(extent.width, extent.height, levels);
    debug_assert!(plan_is_sound(&ops, levels.max(1)));
    ctx.one_shot(|cmd| {
        for op in &ops {
            record_op(&ctx.device, cmd, image, op);
        }
        Ok(())
    })
}

unsafe fn record_op(device: &ash::Device, cmd: vk::CommandBuffer, image: vk::Image, op: &MipOp) {
    match *op {
        MipOp::Barrier {
            level,
            old,
            new,
            masks,
        } => {
            let barrier = color_barrier(image, old, new, masks.src_access, masks.dst_access, level, 1);
            device.cmd_pipeline_barrier(
                cmd,
                masks.src_stage,
                masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
        MipOp::Blit { src_level, src, dst } => {
            let blit = vk::ImageBlit {
                src_subresource: crate::image::color_layer(src_level),
                src_offsets: [
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D {
                        x: src[0],
                        y: src[1],
                        z: 1,
                    },
                ],
                dst_subresource: crate::image::color_layer(src_level + 1),
                dst_offsets: [
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D {
                        x: dst[0],
                        y: dst[1],
                        z: 1,
                    },
                ],
            };
            device.cmd_blit_image(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::LINEAR,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay(width: u32, height: u32) -> (u32, LevelLayouts) {
        let levels = mip_level_count(width, height);
        let mut layouts = LevelLayouts::uniform(levels, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        for op in plan(width, height, levels) {
            assert!(layouts.apply(&op), "{op:?} applied to {layouts:?}");
        }
        (levels, layouts)
    }

    #[test]
    fn broken_plans_are_caught() {
        let levels = mip_level_count(64, 64);
        let mut ops = plan(64, 64, levels);
        assert!(plan_is_sound(&ops, levels));

        // Without the final barrier the last level stays TRANSFER_DST.
        ops.pop();
        assert!(!plan_is_sound(&ops, levels));

        // Blitting before the source level is made TRANSFER_SRC is illegal.
        let mut ops = plan(64, 64, levels);
        ops.remove(0);
        assert!(!plan_is_sound(&ops, levels));
    }

    #[test]
    fn level_counts() {
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(300, 20), 9);
        assert_eq!(mip_level_count(1024, 512), 11);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn square_texture_ends_shader_readable() {
        let (levels, layouts) = replay(256, 256);
        assert_eq!(levels, 9);
        assert!(layouts.all(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
    }

    #[test]
    fn odd_sizes_clamp_to_one() {
        let (_, layouts) = replay(300, 20);
        assert!(layouts.all(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));

        let blits: Vec<_> = plan(300, 20, 9)
            .into_iter()
            .filter_map(|op| match op {
                MipOp::Blit { dst, .. } => Some(dst),
                _ => None,
            })
            .collect();
        assert_eq!(blits.len(), 8);
        assert_eq!(blits[0], [150, 10]);
        assert_eq!(blits[4], [9, 1]);
        assert_eq!(*blits.last().unwrap(), [1, 1]);
    }

    #[test]
    fn single_level_only_transitions() {
        let ops = plan(1, 1, 1);
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            ops[0],
            MipOp::Barrier {
                level: 0,
                new: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                ..
            }
        ));
    }

    #[test]
    fn out_of_order_ops_are_caught() {
        let mut layouts = LevelLayouts::uniform(2, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        let blit = MipOp::Blit {
            src_level: 0,
            src: [2, 2],
            dst: [1, 1],
        };
        assert!(!layouts.apply(&blit));
    }

    #[test]
    fn linear_blit_requirement() {
        let ok = vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
                | vk::FormatFeatureFlags::BLIT_SRC,
            ..Default::default()
        };
        assert!(check_linear_blit(vk::Format::R8G8B8A8_SRGB, ok).is_ok());
        assert!(matches!(
            check_linear_blit(vk::Format::R8G8B8A8_SRGB, vk::FormatProperties::default()),
            Err(EngineError::LinearBlitUnsupported(vk::Format::R8G8B8A8_SRGB))
        ));
    }
}
