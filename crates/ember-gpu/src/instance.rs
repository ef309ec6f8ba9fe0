//! Vulkan instance construction.

use std::ffi::{c_void, CStr, CString};

use ash::vk;
use thiserror::Error;

use crate::capability::{contains_name, Loader};

/// Validation layers and the debug messenger only exist in debug builds.
const ENABLE_VALIDATION: bool = cfg!(debug_assertions);

const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";
const DEBUG_UTILS_EXTENSION: &str = "VK_EXT_debug_utils";
const SURFACE_EXTENSION: &str = "VK_KHR_surface";

/// Platform windowing-surface extensions, in preference order.
#[cfg(target_os = "linux")]
const PLATFORM_SURFACE_EXTENSIONS: &[&str] = &[
    "VK_KHR_xcb_surface",
    "VK_KHR_xlib_surface",
    "VK_KHR_wayland_surface",
];
#[cfg(target_os = "windows")]
const PLATFORM_SURFACE_EXTENSIONS: &[&str] = &["VK_KHR_win32_surface"];
#[cfg(target_os = "macos")]
const PLATFORM_SURFACE_EXTENSIONS: &[&str] = &["VK_EXT_metal_surface"];
#[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
const PLATFORM_SURFACE_EXTENSIONS: &[&str] = &[];

/// Instance construction errors.
#[derive(Error, Debug)]
pub enum InstanceError {
    /// The loader could not report its instance version.
    #[error("failed to query the instance version: {0}")]
    VersionUnavailable(vk::Result),

    /// The loader reports an API version below the required 1.2.
    #[error("Vulkan 1.2 required, loader reports {major}.{minor}")]
    Version12Unavailable { major: u32, minor: u32 },

    /// No platform windowing-surface extension is available.
    #[error("no windowing surface extension is present on this system")]
    WindowExtensionsNotPresent,

    /// A requested instance extension is missing from the system list.
    #[error("instance extension {0:?} is not supported")]
    ExtensionNotSupported(String),

    /// A requested instance layer is missing from the system list.
    #[error("instance layer {0:?} is not supported")]
    LayerNotSupported(String),

    /// The native instance call failed.
    #[error("failed to create the instance: {0}")]
    CreationFailed(vk::Result),

    /// The debug messenger could not be created.
    #[error("failed to create the debug messenger: {0}")]
    DebugMessengerFailed(vk::Result),
}

/// An owned Vulkan instance.
///
/// Keeps the list of extensions it was created with and the instance-level
/// API version for later negotiation.
pub struct Instance {
    handle: ash::Instance,
    debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    extensions: Vec<String>,
    version: u32,
}

impl Instance {
    /// Get the raw instance.
    pub fn handle(&self) -> &ash::Instance {
        &self.handle
    }

    /// Extensions the instance was created with.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Instance-level API version.
    pub fn version(&self) -> u32 {
        self.version
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        // SAFETY: the instance is dropped after every object created from
        // it by ownership nesting; the messenger belongs to this instance.
        unsafe {
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.handle.destroy_instance(None);
        }
    }
}

/// Builder for [`Instance`].
pub struct InstanceBuilder<'a> {
    loader: &'a Loader,
    app_name: String,
    app_version: u32,
    engine_name: String,
    engine_version: u32,
    layers: Vec<String>,
    extensions: Vec<String>,
}

impl<'a> InstanceBuilder<'a> {
    /// Create a builder over a loaded entry point.
    pub fn new(loader: &'a Loader) -> Self {
        Self {
            loader,
            app_name: String::new(),
            app_version: vk::make_api_version(0, 0, 1, 0),
            engine_name: "Ember".to_string(),
            engine_version: vk::make_api_version(0, 0, 1, 0),
            layers: Vec::new(),
            extensions: Vec::new(),
        }
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Set the application version.
    pub fn app_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.app_version = vk::make_api_version(0, major, minor, patch);
        self
    }

    /// Set the engine name.
    pub fn engine_name(mut self, name: impl Into<String>) -> Self {
        self.engine_name = name.into();
        self
    }

    /// Set the engine version.
    pub fn engine_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.engine_version = vk::make_api_version(0, major, minor, patch);
        self
    }

    /// Request an instance layer. Only honored in debug builds.
    pub fn enable_layer(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.layers.push(name);
        }
        self
    }

    /// Request an instance extension.
    pub fn enable_extension(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.extensions.push(name);
        }
        self
    }

    /// Build the instance.
    pub fn build(self) -> Result<Instance, InstanceError> {
        let version = self
            .loader
            .instance_version()
            .map_err(InstanceError::VersionUnavailable)?;

        let major = vk::api_version_major(version);
        let minor = vk::api_version_minor(version);
        tracing::info!(
            "vulkan {major}.{minor}.{patch}",
            patch = vk::api_version_patch(version)
        );

        if major == 1 && minor < 2 {
            return Err(InstanceError::Version12Unavailable { major, minor });
        }

        let system_layers = self.loader.instance_layers();
        let system_extensions = self.loader.instance_extensions();

        let debug_utils_available = contains_name(&system_extensions, DEBUG_UTILS_EXTENSION);
        let extensions = resolve_extensions(
            &self.extensions,
            &system_extensions,
            ENABLE_VALIDATION && debug_utils_available,
        )?;
        for name in &extensions {
            tracing::info!("instance extension: {name} - ENABLED");
        }

        let layers = if ENABLE_VALIDATION {
            if contains_name(&system_layers, VALIDATION_LAYER) {
                let layers = resolve_layers(&self.layers, &system_layers)?;
                for name in &layers {
                    tracing::info!("instance layer: {name} - ENABLED");
                }
                layers
            } else {
                tracing::warn!("validation layer not available, running without");
                Vec::new()
            }
        } else {
            Vec::new()
        };

        let app_name = CString::new(self.app_name.as_str()).unwrap_or_default();
        let engine_name = CString::new(self.engine_name.as_str()).unwrap_or_default();

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(self.app_version)
            .engine_name(&engine_name)
            .engine_version(self.engine_version)
            .api_version(version);

        let extension_names: Vec<CString> = extensions
            .iter()
            .map(|name| CString::new(name.as_str()).unwrap_or_default())
            .collect();
        let extension_ptrs: Vec<*const i8> =
            extension_names.iter().map(|name| name.as_ptr()).collect();

        let layer_names: Vec<CString> = layers
            .iter()
            .map(|name| CString::new(name.as_str()).unwrap_or_default())
            .collect();
        let layer_ptrs: Vec<*const i8> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        // SAFETY: the create info only borrows from locals that outlive
        // the call; the entry is valid.
        let handle = unsafe { self.loader.entry().create_instance(&create_info, None) }
            .map_err(InstanceError::CreationFailed)?;

        tracing::info!("instance created");

        let debug = if ENABLE_VALIDATION && contains_name(&extensions, DEBUG_UTILS_EXTENSION) {
            match create_debug_messenger(self.loader, &handle) {
                Ok(debug) => Some(debug),
                Err(err) => {
                    // SAFETY: nothing has been created from the instance yet.
                    unsafe { handle.destroy_instance(None) };
                    return Err(err);
                }
            }
        } else {
            None
        };

        Ok(Instance {
            handle,
            debug,
            extensions,
            version,
        })
    }
}

/// Resolve the final extension list against the system-reported one.
///
/// Adds the debug-utils extension when asked, then the surface extension
/// and one platform windowing extension, both mandatory. Every requested
/// name must be present in the system list.
fn resolve_extensions(
    requested: &[String],
    available: &[String],
    with_debug_utils: bool,
) -> Result<Vec<String>, InstanceError> {
    let mut extensions: Vec<String> = requested.to_vec();

    if with_debug_utils {
        extensions.push(DEBUG_UTILS_EXTENSION.to_string());
    }

    let mut check_and_add = |name: &str| -> bool {
        if contains_name(available, name) {
            extensions.push(name.to_string());
            true
        } else {
            false
        }
    };

    let has_surface_extension = check_and_add(SURFACE_EXTENSION);
    let has_window_extension = PLATFORM_SURFACE_EXTENSIONS
        .iter()
        .any(|name| check_and_add(name));

    if !has_surface_extension || !has_window_extension {
        return Err(InstanceError::WindowExtensionsNotPresent);
    }

    for name in &extensions {
        if !contains_name(available, name) {
            return Err(InstanceError::ExtensionNotSupported(name.clone()));
        }
    }

    Ok(extensions)
}

/// Resolve requested layers plus the validation layer against the system
/// list. Callers only reach this when the validation layer is available.
fn resolve_layers(requested: &[String], available: &[String]) -> Result<Vec<String>, InstanceError> {
    let mut layers: Vec<String> = requested.to_vec();
    layers.push(VALIDATION_LAYER.to_string());

    for name in &layers {
        if !contains_name(available, name) {
            return Err(InstanceError::LayerNotSupported(name.clone()));
        }
    }

    Ok(layers)
}

fn create_debug_messenger(
    loader: &Loader,
    instance: &ash::Instance,
) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT), InstanceError> {
    let debug_loader = ash::ext::debug_utils::Instance::new(loader.entry(), instance);

    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    // SAFETY: the instance is valid and had debug-utils enabled.
    let messenger = unsafe { debug_loader.create_debug_utils_messenger(&create_info, None) }
        .map_err(InstanceError::DebugMessengerFailed)?;

    tracing::info!("debug messenger created");

    Ok((debug_loader, messenger))
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    // SAFETY: the driver hands us a valid callback data pointer.
    let message = unsafe {
        let data = &*callback_data;
        if data.p_message.is_null() {
            String::new()
        } else {
            CStr::from_ptr(data.p_message).to_string_lossy().into_owned()
        }
    };

    let kind = if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "VALIDATION"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "PERFORMANCE"
    } else {
        "GENERAL"
    };

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!("{kind} - {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!("{kind} - {message}");
    } else {
        tracing::trace!("{kind} - {message}");
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    fn system_with_surface() -> Vec<String> {
        let mut system = names(&[SURFACE_EXTENSION]);
        system.push(PLATFORM_SURFACE_EXTENSIONS[0].to_string());
        system
    }

    #[test]
    fn requested_extension_round_trip() {
        let mut system = system_with_surface();
        system.push("VK_KHR_get_surface_capabilities2".to_string());

        let resolved = resolve_extensions(
            &names(&["VK_KHR_get_surface_capabilities2"]),
            &system,
            false,
        )
        .unwrap();

        // Exactly the requested set plus the implicit surface extensions.
        assert_eq!(
            resolved,
            names(&[
                "VK_KHR_get_surface_capabilities2",
                SURFACE_EXTENSION,
                PLATFORM_SURFACE_EXTENSIONS[0],
            ])
        );
    }

    #[test]
    fn debug_utils_added_when_requested() {
        let mut system = system_with_surface();
        system.push(DEBUG_UTILS_EXTENSION.to_string());

        let resolved = resolve_extensions(&[], &system, true).unwrap();
        assert!(resolved.iter().any(|name| name == DEBUG_UTILS_EXTENSION));
    }

    #[test]
    fn missing_window_extension_is_fatal() {
        let system = names(&[SURFACE_EXTENSION]);

        let err = resolve_extensions(&[], &system, false).unwrap_err();
        assert!(matches!(err, InstanceError::WindowExtensionsNotPresent));
    }

    #[test]
    fn missing_surface_extension_is_fatal() {
        let system = names(&[PLATFORM_SURFACE_EXTENSIONS[0]]);

        let err = resolve_extensions(&[], &system, false).unwrap_err();
        assert!(matches!(err, InstanceError::WindowExtensionsNotPresent));
    }

    #[test]
    fn unsupported_requested_extension_is_fatal() {
        let system = system_with_surface();

        let err = resolve_extensions(&names(&["VK_EXT_imaginary"]), &system, false).unwrap_err();
        match err {
            InstanceError::ExtensionNotSupported(name) => assert_eq!(name, "VK_EXT_imaginary"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn any_platform_window_extension_satisfies() {
        if PLATFORM_SURFACE_EXTENSIONS.len() < 2 {
            return;
        }

        let mut system = names(&[SURFACE_EXTENSION]);
        system.push(PLATFORM_SURFACE_EXTENSIONS[1].to_string());

        let resolved = resolve_extensions(&[], &system, false).unwrap();
        assert!(resolved
            .iter()
            .any(|name| name == PLATFORM_SURFACE_EXTENSIONS[1]));
    }

    #[test]
    fn layers_require_system_support() {
        let system = names(&[VALIDATION_LAYER]);

        let resolved = resolve_layers(&[], &system).unwrap();
        assert_eq!(resolved, names(&[VALIDATION_LAYER]));

        let err = resolve_layers(&names(&["VK_LAYER_imaginary"]), &system).unwrap_err();
        assert!(matches!(err, InstanceError::LayerNotSupported(_)));
    }
}
