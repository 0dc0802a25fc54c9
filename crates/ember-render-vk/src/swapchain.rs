// SPDX-License-Identifier: CEPL-1.0
//! Swapchain and everything sized by it: views, MSAA color, depth, render
//! pass, pipeline and framebuffers.

use ash::khr::{surface, swapchain};
use ash::vk;
use ember_render::{EngineError, RenderSettings, RenderSize, Result, SurfaceFormatPref};
use tracing::info;

use crate::device::{DeviceContext, QueueFamilies};
use crate::image::{create_image_view, GpuImage, ImageSpec};
use crate::pipeline::{self, GraphicsPipeline, ShaderSet};

/// Depth formats in order of preference.
pub const DEPTH_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Surface capabilities, formats and present modes for one device/surface pair.
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub unsafe fn query(
        loader: &surface::Instance,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        Ok(Self {
            capabilities: loader
                .get_physical_device_surface_capabilities(phys, surface)
                .map_err(EngineError::DeviceQuery)?,
            formats: loader
                .get_physical_device_surface_formats(phys, surface)
                .map_err(EngineError::DeviceQuery)?,
            present_modes: loader
                .get_physical_device_surface_present_modes(phys, surface)
                .map_err(EngineError::DeviceQuery)?,
        })
    }
}

pub fn preferred_format(pref: SurfaceFormatPref) -> vk::Format {
    match pref {
        SurfaceFormatPref::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
        SurfaceFormatPref::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        SurfaceFormatPref::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        SurfaceFormatPref::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
    }
}

/// The preferred format in the sRGB nonlinear color space, else the first listed.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    pref: SurfaceFormatPref,
) -> Result<vk::SurfaceFormatKHR> {
    let want = preferred_format(pref);
    formats
        .iter()
        .find(|f| f.format == want && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
        .ok_or(EngineError::NoSurfaceFormats)
}

/// MAILBOX when wanted and offered, else the first mode listed.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    prefer_mailbox: bool,
) -> Result<vk::PresentModeKHR> {
    if prefer_mailbox && modes.contains(&vk::PresentModeKHR::MAILBOX) {
        return Ok(vk::PresentModeKHR::MAILBOX);
    }
    modes.first().copied().ok_or(EngineError::NoPresentModes)
}

/// The surface's fixed extent, or the framebuffer size clamped to the allowed
/// range when the surface leaves it to us (`u32::MAX` sentinel).
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, framebuffer: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: framebuffer
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: framebuffer
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// `frames_in_flight` clamped into the surface's image count range. A max of 0
/// means unbounded.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, frames_in_flight: usize) -> u32 {
    let mut count = (frames_in_flight as u32).max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count = count.min(caps.max_image_count);
    }
    count
}

/// Exclusive ownership when one family does both jobs, concurrent otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharingConfig {
    pub mode: vk::SharingMode,
    pub families: Vec<u32>,
}

impl SharingConfig {
    pub fn for_families(families: QueueFamilies) -> Self {
        if families.is_shared() {
            Self {
                mode: vk::SharingMode::EXCLUSIVE,
                families: Vec::new(),
            }
        } else {
            Self {
                mode: vk::SharingMode::CONCURRENT,
                families: vec![families.graphics, families.present],
            }
        }
    }
}

/// Everything decided before the swapchain is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainChoice {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainChoice {
    pub fn new(support: &SwapchainSupport, size: RenderSize, settings: &RenderSettings) -> Result<Self> {
        let caps = &support.capabilities;
        Ok(Self {
            surface_format: choose_surface_format(&support.formats, settings.surface_format)?,
            present_mode: choose_present_mode(&support.present_modes, settings.prefer_mailbox)?,
            extent: choose_extent(caps, size),
            image_count: choose_image_count(caps, settings.frames_in_flight),
            pre_transform: caps.current_transform,
        })
    }

    pub fn create_info<'a>(
        &self,
        surface: vk::SurfaceKHR,
        sharing: &'a SharingConfig,
    ) -> vk::SwapchainCreateInfoKHR<'a> {
        vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface,
            min_image_count: self.image_count,
            image_format: self.surface_format.format,
            image_color_space: self.surface_format.color_space,
            image_extent: self.extent,
            image_array_layers: 1,
            // TRANSFER_SRC for screenshots.
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
            image_sharing_mode: sharing.mode,
            queue_family_index_count: sharing.families.len() as u32,
            p_queue_family_indices: if sharing.families.is_empty() {
                std::ptr::null()
            } else {
                sharing.families.as_ptr()
            },
            pre_transform: self.pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: self.present_mode,
            clipped: vk::TRUE,
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        }
    }
}

/// First candidate usable as an optimal-tiling depth attachment.
pub fn pick_depth_format(
    candidates: &[vk::Format],
    mut properties: impl FnMut(vk::Format) -> vk::FormatProperties,
) -> Result<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&f| {
            properties(f)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or(EngineError::NoDepthFormat)
}

/// The swapchain plus every resource whose lifetime follows it.
///
/// The default value holds null handles; [`SwapchainBundle::destroy`] is safe
/// on a default or partially built bundle.
#[derive(Debug, Default)]
pub struct SwapchainBundle {
    pub swapchain: vk::SwapchainKHR,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub color: GpuImage,
    pub depth: GpuImage,
    pub render_pass: vk::RenderPass,
    pub pipeline: GraphicsPipeline,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl SwapchainBundle {
    pub unsafe fn new(
        ctx: &DeviceContext,
        surface_loader: &surface::Instance,
        surface: vk::SurfaceKHR,
        size: RenderSize,
        settings: &RenderSettings,
        set_layout: vk::DescriptorSetLayout,
        shaders: &ShaderSet,
    ) -> Result<Self> {
        let mut bundle = Self::default();
        match bundle.build(ctx, surface_loader, surface, size, settings, set_layout, shaders) {
            Ok(()) => Ok(bundle),
            Err(e) => {
                bundle.destroy(&ctx.device, &ctx.swapchain_loader);
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    unsafe fn build(
        &mut self,
        ctx: &DeviceContext,
        surface_loader: &surface::Instance,
        surface: vk::SurfaceKHR,
        size: RenderSize,
        settings: &RenderSettings,
        set_layout: vk::DescriptorSetLayout,
        shaders: &ShaderSet,
    ) -> Result<()> {
        let d = &ctx.device;
        let support = SwapchainSupport::query(surface_loader, ctx.phys, surface)?;
        let choice = SwapchainChoice::new(&support, size, settings)?;
        let sharing = SharingConfig::for_families(ctx.families);

        self.swapchain = ctx
            .swapchain_loader
            .create_swapchain(&choice.create_info(surface, &sharing), None)
            .map_err(EngineError::SwapchainCreation)?;
        self.surface_format = choice.surface_format;
        self.present_mode = choice.present_mode;
        self.extent = choice.extent;

        self.images = ctx
            .swapchain_loader
            .get_swapchain_images(self.swapchain)
            .map_err(EngineError::SwapchainCreation)?;
        for &image in &self.images {
            let view = create_image_view(
                d,
                image,
                choice.surface_format.format,
                vk::ImageAspectFlags::COLOR,
                1,
            )?;
            self.views.push(view);
        }

        self.color = GpuImage::new(
            ctx,
            &ImageSpec {
                extent: self.extent,
                mip_levels: 1,
                samples: ctx.msaa_samples,
                format: choice.surface_format.format,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
                    | vk::ImageUsageFlags::COLOR_ATTACHMENT,
                properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            },
            vk::ImageAspectFlags::COLOR,
        )?;

        let depth_format = pick_depth_format(&DEPTH_CANDIDATES, |f| {
            ctx.instance
                .get_physical_device_format_properties(ctx.phys, f)
        })?;
        self.depth = GpuImage::new(
            ctx,
            &ImageSpec {
                extent: self.extent,
                mip_levels: 1,
                samples: ctx.msaa_samples,
                format: depth_format,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            },
            vk::ImageAspectFlags::DEPTH,
        )?;

        self.render_pass = pipeline::create_render_pass(
            d,
            choice.surface_format.format,
            depth_format,
            ctx.msaa_samples,
        )?;
        self.pipeline = GraphicsPipeline::new(d, self.render_pass, set_layout, ctx.msaa_samples, shaders)?;

        for &view in &self.views {
            let attachments = [self.color.view, self.depth.view, view];
            let info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass: self.render_pass,
                attachment_count: attachments.len() as u32,
                p_attachments: attachments.as_ptr(),
                width: self.extent.width,
                height: self.extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = d
                .create_framebuffer(&info, None)
                .map_err(EngineError::FramebufferCreation)?;
            self.framebuffers.push(fb);
        }

        info!(
            "swapchain: {}x{}, {} images, {:?}/{:?}, {:?}, depth {:?}, msaa {:?}",
            self.extent.width,
            self.extent.height,
            self.images.len(),
            self.surface_format.format,
            self.surface_format.color_space,
            self.present_mode,
            depth_format,
            ctx.msaa_samples,
        );
        Ok(())
    }

    /// Reverse creation order. The device must be idle.
    pub unsafe fn destroy(&mut self, device: &ash::Device, loader: &swapchain::Device) {
        for fb in self.framebuffers.drain(..) {
            device.destroy_framebuffer(fb, None);
        }
        self.pipeline.destroy(device);
        device.destroy_render_pass(self.render_pass, None);
        self.depth.destroy(device);
        self.color.destroy(device);
        for view in self.views.drain(..) {
            device.destroy_image_view(view, None);
        }
        // Images belong to the swapchain.
        self.images.clear();
        if self.swapchain != vk::SwapchainKHR::null() {
            loader.destroy_swapchain(self.swapchain, None);
        }
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        }
    }

    fn fmt(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn fixed_surface_extent_wins() {
        let c = caps((1920, 1080), (1, 1), (4096, 4096));
        let e = choose_extent(&c, RenderSize::new(800, 600));
        assert_eq!((e.width, e.height), (1920, 1080));
    }

    #[test]
    fn free_extent_is_clamped() {
        let c = caps((u32::MAX, u32::MAX), (100, 100), (2000, 1000));
        let e = choose_extent(&c, RenderSize::new(4000, 50));
        assert_eq!((e.width, e.height), (2000, 100));
        let e = choose_extent(&c, RenderSize::new(1024, 768));
        assert_eq!((e.width, e.height), (1024, 768));
    }

    #[test]
    fn image_count_respects_bounds() {
        let mut c = caps((1, 1), (1, 1), (1, 1));
        assert_eq!(choose_image_count(&c, 2), 2);
        assert_eq!(choose_image_count(&c, 1), 2);
        assert_eq!(choose_image_count(&c, 12), 8);
        c.max_image_count = 0;
        assert_eq!(choose_image_count(&c, 12), 12);
    }

    #[test]
    fn preferred_surface_format_or_first() {
        let formats = [fmt(vk::Format::R8G8B8A8_UNORM), fmt(vk::Format::B8G8R8A8_SRGB)];
        let f = choose_surface_format(&formats, SurfaceFormatPref::Bgra8Srgb).unwrap();
        assert_eq!(f.format, vk::Format::B8G8R8A8_SRGB);

        let f = choose_surface_format(&formats, SurfaceFormatPref::Rgba8Srgb).unwrap();
        assert_eq!(f.format, vk::Format::R8G8B8A8_UNORM);

        // Right format in the wrong color space does not count.
        let hdr = [
            fmt(vk::Format::R16G16B16A16_SFLOAT),
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
        ];
        let f = choose_surface_format(&hdr, SurfaceFormatPref::Bgra8Srgb).unwrap();
        assert_eq!(f.format, vk::Format::R16G16B16A16_SFLOAT);

        assert!(matches!(
            choose_surface_format(&[], SurfaceFormatPref::Bgra8Srgb),
            Err(EngineError::NoSurfaceFormats)
        ));
    }

    #[test]
    fn mailbox_is_opt_in() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes, true).unwrap(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&modes, false).unwrap(), vk::PresentModeKHR::FIFO);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE], true).unwrap(),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert!(matches!(choose_present_mode(&[], true), Err(EngineError::NoPresentModes)));
    }

    fn choice() -> SwapchainChoice {
        SwapchainChoice {
            surface_format: fmt(vk::Format::B8G8R8A8_SRGB),
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            image_count: 2,
            pre_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
        }
    }

    #[test]
    fn shared_family_is_exclusive() {
        let sharing = SharingConfig::for_families(QueueFamilies {
            graphics: 0,
            present: 0,
        });
        let info = choice().create_info(vk::SurfaceKHR::null(), &sharing);
        assert_eq!(info.image_sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert_eq!(info.queue_family_index_count, 0);
        assert!(info.p_queue_family_indices.is_null());
    }

    #[test]
    fn split_families_are_concurrent() {
        let sharing = SharingConfig::for_families(QueueFamilies {
            graphics: 0,
            present: 2,
        });
        let info = choice().create_info(vk::SurfaceKHR::null(), &sharing);
        assert_eq!(info.image_sharing_mode, vk::SharingMode::CONCURRENT);
        assert_eq!(info.queue_family_index_count, 2);
        let listed = unsafe { std::slice::from_raw_parts(info.p_queue_family_indices, 2) };
        assert_eq!(listed, &[0, 2]);
    }

    #[test]
    fn swapchain_images_can_be_copied_out() {
        let sharing = SharingConfig::for_families(QueueFamilies {
            graphics: 1,
            present: 1,
        });
        let info = choice().create_info(vk::SurfaceKHR::null(), &sharing);
        assert!(info.image_usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert!(info.image_usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert_eq!(info.clipped, vk::TRUE);
    }

    #[test]
    fn depth_format_takes_first_supported() {
        let supported = |f: vk::Format| vk::FormatProperties {
            optimal_tiling_features: if f == vk::Format::D24_UNORM_S8_UINT {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::FormatFeatureFlags::SAMPLED_IMAGE
            },
            ..Default::default()
        };
        assert_eq!(
            pick_depth_format(&DEPTH_CANDIDATES, supported).unwrap(),
            vk::Format::D24_UNORM_S8_UINT
        );
        assert!(matches!(
            pick_depth_format(&DEPTH_CANDIDATES, |_| vk::FormatProperties::default()),
            Err(EngineError::NoDepthFormat)
        ));
    }
}
