// SPDX-License-Identifier: CEPL-1.0
//! Physical device selection and the logical device context.

use std::ffi::{c_char, CStr};

use ash::khr::{portability_subset, swapchain};
use ash::vk;
use ember_render::{DeviceRequirements, EngineError, Result};
use tracing::{info, warn};

use crate::commands;
use crate::instance::InstanceContext;
use crate::swapchain::SwapchainSupport;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    pub fn resolve(&self) -> Result<QueueFamilies> {
        match (self.graphics, self.present) {
            (Some(graphics), Some(present)) => Ok(QueueFamilies { graphics, present }),
            _ => Err(EngineError::QueueFamilyIncomplete),
        }
    }
}

/// Resolved (graphics, presentation) family pair. The two may be the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Scans families in order and stops once both roles are filled.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> QueueFamilyIndices {
    let mut found = QueueFamilyIndices::default();
    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if found.graphics.is_none()
            && family.queue_count > 0
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            found.graphics = Some(i);
        }
        if found.present.is_none() && supports_present(i) {
            found.present = Some(i);
        }
        if found.is_complete() {
            break;
        }
    }
    found
}

/// What device selection learned about one physical device.
#[derive(Debug, Clone, Default)]
pub struct DeviceReport {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub families: QueueFamilyIndices,
    pub missing_extension: Option<String>,
    pub surface_formats: usize,
    pub present_modes: usize,
    pub sampler_anisotropy: bool,
    pub geometry_shader: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    QueueFamilies,
    MissingExtension(String),
    InadequateSwapchain,
    NoAnisotropy,
    NotDiscrete,
    NoGeometryShader,
}

/// Suitability checks, in the order they are applied.
pub fn evaluate(report: &DeviceReport, req: DeviceRequirements) -> Result<(), Rejection> {
    if !report.families.is_complete() {
        return Err(Rejection::QueueFamilies);
    }
    if let Some(ext) = &report.missing_extension {
        return Err(Rejection::MissingExtension(ext.clone()));
    }
    if report.surface_formats == 0 || report.present_modes == 0 {
        return Err(Rejection::InadequateSwapchain);
    }
    if !report.sampler_anisotropy {
        return Err(Rejection::NoAnisotropy);
    }
    if req.discrete_gpu && report.device_type != vk::PhysicalDeviceType::DISCRETE_GPU {
        return Err(Rejection::NotDiscrete);
    }
    if req.geometry_shader && !report.geometry_shader {
        return Err(Rejection::NoGeometryShader);
    }
    Ok(())
}

/// First candidate that could be inspected and passes [`evaluate`]. A candidate
/// whose queries failed is skipped, not fatal.
pub fn pick_device<T>(
    candidates: impl IntoIterator<Item = Result<(DeviceReport, T)>>,
    req: DeviceRequirements,
) -> Result<(DeviceReport, T)> {
    for candidate in candidates {
        let (report, extra) = match candidate {
            Ok(c) => c,
            Err(e) => {
                warn!("skipping GPU: {e}");
                continue;
            }
        };
        match evaluate(&report, req) {
            Ok(()) => return Ok((report, extra)),
            Err(why) => info!("skipping GPU {}: {:?}", report.name, why),
        }
    }
    Err(EngineError::NoSuitableDevice)
}

/// Highest sample count usable for both color and depth framebuffers.
pub fn max_usable_sample_count(limits: &vk::PhysicalDeviceLimits) -> vk::SampleCountFlags {
    let counts = limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&c| counts.contains(c))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// Swapchain is mandatory; the portability subset must be enabled whenever a device exposes it.
pub fn device_extensions(available: &[&CStr]) -> (Vec<&'static CStr>, Option<&'static CStr>) {
    let mut enable = vec![swapchain::NAME];
    let missing = [swapchain::NAME]
        .into_iter()
        .find(|r| !available.contains(r));
    if available.contains(&portability_subset::NAME) {
        enable.push(portability_subset::NAME);
    }
    (enable, missing)
}

unsafe fn inspect(inst: &InstanceContext, phys: vk::PhysicalDevice) -> Result<(DeviceReport, Vec<&'static CStr>)> {
    let instance = &inst.instance;
    let props = instance.get_physical_device_properties(phys);
    let features = instance.get_physical_device_features(phys);
    let families = instance.get_physical_device_queue_family_properties(phys);

    let indices = find_queue_families(&families, |i| {
        inst.surface_loader
            .get_physical_device_surface_support(phys, i, inst.surface)
            .unwrap_or(false)
    });

    let ext_props = instance
        .enumerate_device_extension_properties(phys)
        .map_err(EngineError::DeviceQuery)?;
    let ext_names: Vec<&CStr> = ext_props
        .iter()
        .filter_map(|e| e.extension_name_as_c_str().ok())
        .collect();
    let (enable, missing) = device_extensions(&ext_names);

    let mut report = DeviceReport {
        name: props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "<unnamed>".into()),
        device_type: props.device_type,
        families: indices,
        missing_extension: missing.map(|m| m.to_string_lossy().into_owned()),
        sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
        geometry_shader: features.geometry_shader == vk::TRUE,
        ..Default::default()
    };

    // Surface queries are only meaningful with the swapchain extension present.
    if report.missing_extension.is_none() {
        let support = SwapchainSupport::query(&inst.surface_loader, phys, inst.surface)?;
        report.surface_formats = support.formats.len();
        report.present_modes = support.present_modes.len();
    }
    Ok((report, enable))
}

/// Logical device, its queues and the graphics command pool.
pub struct DeviceContext {
    /// Non-owning; destroyed through [`InstanceContext`].
    pub instance: ash::Instance,
    pub phys: vk::PhysicalDevice,
    pub device: ash::Device,
    pub families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_props: vk::PhysicalDeviceMemoryProperties,
    pub msaa_samples: vk::SampleCountFlags,
    pub cmd_pool: vk::CommandPool,
    pub swapchain_loader: swapchain::Device,
}

impl DeviceContext {
    pub unsafe fn new(inst: &InstanceContext, req: DeviceRequirements) -> Result<Self> {
        let physical = inst
            .instance
            .enumerate_physical_devices()
            .map_err(EngineError::DeviceQuery)?;

        let mut candidates = Vec::with_capacity(physical.len());
        for phys in physical {
            candidates.push(inspect(inst, phys).map(|(report, ext)| (report, (phys, ext))));
        }
        let (report, (phys, extensions)) = pick_device(candidates, req)?;
        info!("GPU: {} ({:?})", report.name, report.device_type);
        let families = report.families.resolve()?;

        let instance = &inst.instance;
        let properties = instance.get_physical_device_properties(phys);
        let memory_props = instance.get_physical_device_memory_properties(phys);
        let msaa_samples = max_usable_sample_count(&properties.limits);
        info!("MSAA samples: {:?}", msaa_samples);

        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();

        let features = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: vk::TRUE,
            ..Default::default()
        };
        let ext_ptrs: Vec<*const c_char> = extensions.iter().map(|n| n.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: ext_ptrs.len() as u32,
            pp_enabled_extension_names: ext_ptrs.as_ptr(),
            p_enabled_features: &features,
            ..Default::default()
        };
        let device = instance
            .create_device(phys, &create_info, None)
            .map_err(EngineError::LogicalDeviceCreation)?;

        let graphics_queue = device.get_device_queue(families.graphics, 0);
        let present_queue = device.get_device_queue(families.present, 0);
        info!(
            "queue families: graphics {} present {}{}",
            families.graphics,
            families.present,
            if families.is_shared() { " (shared)" } else { "" }
        );

        let cmd_pool = match commands::create_command_pool(&device, families.graphics) {
            Ok(p) => p,
            Err(e) => {
                device.destroy_device(None);
                return Err(e);
            }
        };
        let swapchain_loader = swapchain::Device::new(instance, &device);

        Ok(Self {
            instance: instance.clone(),
            phys,
            device,
            families,
            graphics_queue,
            present_queue,
            properties,
            memory_props,
            msaa_samples,
            cmd_pool,
            swapchain_loader,
        })
    }

    /// See [`commands::one_shot`]. Runs on the graphics queue.
    pub unsafe fn one_shot<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer) -> Result<()>,
    {
        commands::one_shot(&self.device, self.cmd_pool, self.graphics_queue, record)
    }

    pub unsafe fn wait_idle(&self) -> Result<()> {
        self.device.device_wait_idle().map_err(EngineError::DeviceWait)
    }

    /// Command pool, then the device. Everything created from the device must be gone.
    pub unsafe fn destroy(&mut self) {
        self.device.destroy_command_pool(self.cmd_pool, None);
        self.device.destroy_device(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn good_report() -> DeviceReport {
        DeviceReport {
            name: "test".into(),
            device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
            families: QueueFamilyIndices {
                graphics: Some(0),
                present: Some(0),
            },
            missing_extension: None,
            surface_formats: 2,
            present_modes: 1,
            sampler_anisotropy: true,
            geometry_shader: false,
        }
    }

    #[test]
    fn failed_inspection_does_not_end_the_search() {
        let mut second = good_report();
        second.name = "second".into();
        let candidates = vec![
            Err(EngineError::DeviceQuery(vk::Result::ERROR_SURFACE_LOST_KHR)),
            Ok((second, 1u32)),
        ];
        let (report, index) = pick_device(candidates, DeviceRequirements::default()).unwrap();
        assert_eq!(report.name, "second");
        assert_eq!(index, 1);
    }

    #[test]
    fn first_passing_candidate_wins() {
        let mut no_aniso = good_report();
        no_aniso.sampler_anisotropy = false;
        let candidates = vec![
            Ok((no_aniso, 0u32)),
            Ok((good_report(), 1)),
            Ok((good_report(), 2)),
        ];
        let (_, index) = pick_device(candidates, DeviceRequirements::default()).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn nothing_usable_is_no_suitable_device() {
        let candidates: Vec<Result<(DeviceReport, ())>> = vec![
            Err(EngineError::DeviceQuery(vk::Result::ERROR_INITIALIZATION_FAILED)),
            Ok((DeviceReport::default(), ())),
        ];
        assert!(matches!(
            pick_device(candidates, DeviceRequirements::default()),
            Err(EngineError::NoSuitableDevice)
        ));
    }

    #[test]
    fn graphics_and_present_can_share_a_family() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let found = find_queue_families(&families, |_| true);
        let resolved = found.resolve().unwrap();
        assert!(resolved.is_shared());
        assert_eq!(resolved.unique(), vec![0]);
    }

    #[test]
    fn distinct_families_are_both_kept() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
        ];
        let found = find_queue_families(&families, |i| i == 2);
        assert_eq!(found.resolve().unwrap(), QueueFamilies { graphics: 1, present: 2 });
        assert_eq!(found.resolve().unwrap().unique(), vec![1, 2]);
    }

    #[test]
    fn missing_present_is_incomplete() {
        let found = find_queue_families(&[family(vk::QueueFlags::GRAPHICS)], |_| false);
        assert!(!found.is_complete());
        assert!(matches!(found.resolve(), Err(EngineError::QueueFamilyIncomplete)));
    }

    #[test]
    fn predicates_apply_in_order() {
        let req = DeviceRequirements::default();
        assert_eq!(evaluate(&good_report(), req), Ok(()));

        let mut r = good_report();
        r.families.present = None;
        r.missing_extension = Some("VK_KHR_swapchain".into());
        assert_eq!(evaluate(&r, req), Err(Rejection::QueueFamilies));

        let mut r = good_report();
        r.missing_extension = Some("VK_KHR_swapchain".into());
        r.surface_formats = 0;
        assert_eq!(
            evaluate(&r, req),
            Err(Rejection::MissingExtension("VK_KHR_swapchain".into()))
        );

        let mut r = good_report();
        r.present_modes = 0;
        r.sampler_anisotropy = false;
        assert_eq!(evaluate(&r, req), Err(Rejection::InadequateSwapchain));

        let mut r = good_report();
        r.sampler_anisotropy = false;
        assert_eq!(evaluate(&r, req), Err(Rejection::NoAnisotropy));
    }

    #[test]
    fn optional_gates() {
        let strict = DeviceRequirements {
            discrete_gpu: true,
            geometry_shader: true,
        };
        assert_eq!(evaluate(&good_report(), strict), Err(Rejection::NotDiscrete));

        let mut r = good_report();
        r.device_type = vk::PhysicalDeviceType::DISCRETE_GPU;
        assert_eq!(evaluate(&r, strict), Err(Rejection::NoGeometryShader));
        r.geometry_shader = true;
        assert_eq!(evaluate(&r, strict), Ok(()));
    }

    #[test]
    fn sample_count_uses_color_and_depth_intersection() {
        let limits = vk::PhysicalDeviceLimits {
            framebuffer_color_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_4
                | vk::SampleCountFlags::TYPE_8,
            framebuffer_depth_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_2
                | vk::SampleCountFlags::TYPE_4,
            ..Default::default()
        };
        assert_eq!(max_usable_sample_count(&limits), vk::SampleCountFlags::TYPE_4);
        assert_eq!(
            max_usable_sample_count(&vk::PhysicalDeviceLimits::default()),
            vk::SampleCountFlags::TYPE_1
        );
    }

    #[test]
    fn portability_subset_is_enabled_when_exposed() {
        let (enable, missing) = device_extensions(&[swapchain::NAME, portability_subset::NAME]);
        assert_eq!(enable, vec![swapchain::NAME, portability_subset::NAME]);
        assert_eq!(missing, None);

        let (enable, missing) = device_extensions(&[]);
        assert_eq!(enable, vec![swapchain::NAME]);
        assert_eq!(missing, Some(swapchain::NAME));
    }
}
