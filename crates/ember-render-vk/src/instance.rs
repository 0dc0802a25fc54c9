// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, c_void, CStr};

use ash::ext::debug_utils;
use ash::khr::{portability_enumeration, surface};
use ash::{vk, Entry, Instance};
use ember_render::{EngineError, RenderSettings, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::{debug, error, info, warn, Level};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Loader, instance, optional debug messenger and the window surface.
pub struct InstanceContext {
    pub entry: Entry,
    pub instance: Instance,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,
}

impl InstanceContext {
    pub unsafe fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        settings: &RenderSettings,
    ) -> Result<Self> {
        // STRICT ORDER:
        // 1) instance with WSI (+ debug) extensions
        // 2) debug messenger
        // 3) surface from this instance; device selection later queries against it
        let dh = display
            .display_handle()
            .map_err(|e| EngineError::WindowHandle(e.to_string()))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| EngineError::WindowHandle(e.to_string()))?
            .as_raw();

        let entry = Entry::load().map_err(|e| EngineError::InstanceCreation(e.to_string()))?;
        let instance = create_instance(&entry, dh, settings)?;

        let debug = if settings.validation {
            let loader = debug_utils::Instance::new(&entry, &instance);
            match loader.create_debug_utils_messenger(&debug_messenger_info(), None) {
                Ok(m) => Some((loader, m)),
                Err(e) => {
                    instance.destroy_instance(None);
                    return Err(EngineError::InstanceCreation(format!("debug messenger: {e}")));
                }
            }
        } else {
            None
        };

        let surface_loader = surface::Instance::new(&entry, &instance);
        let surface = match ash_window::create_surface(&entry, &instance, dh, wh, None) {
            Ok(s) => s,
            Err(e) => {
                if let Some((loader, m)) = &debug {
                    loader.destroy_debug_utils_messenger(*m, None);
                }
                instance.destroy_instance(None);
                return Err(EngineError::SurfaceCreation(e));
            }
        };

        Ok(Self {
            entry,
            instance,
            debug,
            surface_loader,
            surface,
        })
    }

    /// Surface, then messenger, then the instance itself. The device must already be gone.
    pub unsafe fn destroy(&mut self) {
        self.surface_loader.destroy_surface(self.surface, None);
        if let Some((loader, m)) = self.debug.take() {
            loader.destroy_debug_utils_messenger(m, None);
        }
        self.instance.destroy_instance(None);
    }
}

unsafe fn create_instance(entry: &Entry, display: RawDisplayHandle, settings: &RenderSettings) -> Result<Instance> {
    let app_name = std::ffi::CString::new(settings.app_name.as_str())
        .unwrap_or_else(|_| c"ember".to_owned());

    let version = match entry.try_enumerate_instance_version() {
        Ok(Some(v)) => v,
        Ok(None) => vk::API_VERSION_1_0,
        Err(e) => return Err(EngineError::InstanceCreation(e.to_string())),
    };
    let api_version = version.min(vk::API_VERSION_1_3);
    info!(
        "Vulkan loader {}.{}.{}",
        vk::api_version_major(version),
        vk::api_version_minor(version),
        vk::api_version_patch(version)
    );

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app_name.as_ptr(),
        application_version: vk::make_api_version(0, 0, 1, 0),
        p_engine_name: c"ember".as_ptr(),
        engine_version: vk::make_api_version(0, 0, 1, 0),
        api_version,
        ..Default::default()
    };

    let available = entry
        .enumerate_instance_extension_properties(None)
        .map_err(|e| EngineError::InstanceCreation(e.to_string()))?;
    let available: Vec<&CStr> = available
        .iter()
        .filter_map(|e| e.extension_name_as_c_str().ok())
        .collect();

    let window_exts = ash_window::enumerate_required_extensions(display)
        .map_err(|e| EngineError::InstanceCreation(e.to_string()))?;
    let mut required: Vec<&CStr> = window_exts.iter().map(|&p| CStr::from_ptr(p)).collect();
    if settings.validation {
        required.push(debug_utils::NAME);
    }
    if let Some(missing) = first_missing(&available, &required) {
        return Err(EngineError::RequiredExtensionMissing(missing.to_string_lossy().into_owned()));
    }

    let mut flags = vk::InstanceCreateFlags::empty();
    if available.contains(&portability_enumeration::NAME) {
        required.push(portability_enumeration::NAME);
        flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    }

    let layers: Vec<*const c_char> = if settings.validation {
        let props = entry
            .enumerate_instance_layer_properties()
            .map_err(|e| EngineError::InstanceCreation(e.to_string()))?;
        let names: Vec<&CStr> = props
            .iter()
            .filter_map(|l| l.layer_name_as_c_str().ok())
            .collect();
        if let Some(missing) = first_missing(&names, &[VALIDATION_LAYER]) {
            return Err(EngineError::NoValidationLayers(missing.to_string_lossy().into_owned()));
        }
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let ext_ptrs: Vec<*const c_char> = required.iter().map(|n| n.as_ptr()).collect();
    // Covers messages from vkCreateInstance/vkDestroyInstance themselves.
    let instance_debug = debug_messenger_info();

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_next: if settings.validation {
            (&instance_debug as *const vk::DebugUtilsMessengerCreateInfoEXT).cast::<c_void>()
        } else {
            std::ptr::null()
        },
        flags,
        p_application_info: &app_info,
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        enabled_extension_count: ext_ptrs.len() as u32,
        pp_enabled_extension_names: ext_ptrs.as_ptr(),
        ..Default::default()
    };

    let instance = entry
        .create_instance(&create_info, None)
        .map_err(|e| EngineError::InstanceCreation(e.to_string()))?;
    info!(
        "instance created (validation {}, {} extensions)",
        if settings.validation { "on" } else { "off" },
        ext_ptrs.len()
    );
    Ok(instance)
}

/// First entry of `required` not present in `available`.
pub fn first_missing<'a>(available: &[&CStr], required: &[&'a CStr]) -> Option<&'a CStr> {
    required
        .iter()
        .copied()
        .find(|r| !available.contains(r))
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    let kind = message_kind(types);
    match message_level(severity) {
        Level::ERROR => error!("[vulkan {kind}] {msg}"),
        Level::WARN => warn!("[vulkan {kind}] {msg}"),
        Level::INFO => info!("[vulkan {kind}] {msg}"),
        _ => debug!("[vulkan {kind}] {msg}"),
    }
    vk::FALSE
}

fn message_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    use ash::vk::DebugUtilsMessageSeverityFlagsEXT as S;
    if severity.contains(S::ERROR) {
        Level::ERROR
    } else if severity.contains(S::WARNING) {
        Level::WARN
    } else if severity.contains(S::INFO) {
        Level::INFO
    } else {
        Level::DEBUG
    }
}

fn message_kind(types: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_first_missing_name() {
        let available = [c"VK_KHR_surface", c"VK_KHR_xcb_surface"];
        assert_eq!(first_missing(&available, &[c"VK_KHR_surface"]), None);
        assert_eq!(
            first_missing(&available, &[c"VK_KHR_surface", debug_utils::NAME, VALIDATION_LAYER]),
            Some(debug_utils::NAME)
        );
    }

    #[test]
    fn every_requested_severity_has_its_own_level() {
        use ash::vk::DebugUtilsMessageSeverityFlagsEXT as S;
        let mask = debug_messenger_info().message_severity;
        let expected = [
            (S::VERBOSE, Level::DEBUG),
            (S::INFO, Level::INFO),
            (S::WARNING, Level::WARN),
            (S::ERROR, Level::ERROR),
        ];
        for (severity, level) in expected {
            assert!(mask.contains(severity), "{severity:?} not requested");
            assert_eq!(message_level(severity), level);
        }
    }

    #[test]
    fn message_kinds() {
        use ash::vk::DebugUtilsMessageTypeFlagsEXT as T;
        assert_eq!(message_kind(T::VALIDATION | T::GENERAL), "validation");
        assert_eq!(message_kind(T::PERFORMANCE), "performance");
        assert_eq!(message_kind(T::GENERAL), "general");
    }
}
