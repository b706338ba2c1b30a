//! Vulkan instance creation.

use std::ffi::CString;

use ash::vk;

use crate::context::InitContextOptions;
use crate::debug::{messenger_create_info, DEBUG_UTILS_EXTENSION, VALIDATION_LAYER};
use crate::error::{Result, StartupError};
use crate::names::{as_ptrs, extension_names, layer_names, resolve_names, to_c_strings, NameKind};

/// Extension needed to see portability drivers such as MoltenVK.
pub const PORTABILITY_ENUMERATION_EXTENSION: &str = "VK_KHR_portability_enumeration";

/// A created instance and what was enabled on it.
pub struct CreatedInstance {
    pub instance: ash::Instance,
    /// Enabled layers; the logical device is created with the same list.
    pub layers: Vec<String>,
    pub extensions: Vec<String>,
    pub validation_enabled: bool,
}

/// Extensions and layers to enable on the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceNames {
    pub extensions: Vec<String>,
    pub layers: Vec<String>,
    pub validation_enabled: bool,
}

/// Resolve instance extensions and layers against what the loader supports.
///
/// Validation is only turned on when both the validation layer and the
/// debug utils extension are available. Otherwise it is disabled with a
/// warning.
pub fn resolve_instance_names(
    options: &InitContextOptions,
    surface_extensions: &[String],
    supported_extensions: &std::collections::HashSet<String>,
    supported_layers: &std::collections::HashSet<String>,
) -> Result<InstanceNames> {
    let mut required_extensions = options.required_instance_extensions.clone();
    if cfg!(target_os = "macos") {
        required_extensions.push(PORTABILITY_ENUMERATION_EXTENSION.to_string());
    }
    required_extensions.extend(surface_extensions.iter().cloned());

    let mut extensions = resolve_names(
        NameKind::InstanceExtension,
        &required_extensions,
        &options.desired_instance_extensions,
        supported_extensions,
    )?;
    let mut layers = resolve_names(
        NameKind::Layer,
        &options.required_layers,
        &options.desired_layers,
        supported_layers,
    )?;

    let mut validation_enabled = false;
    if options.enable_validation {
        let has_layer = supported_layers.contains(VALIDATION_LAYER);
        let has_debug_utils = supported_extensions.contains(DEBUG_UTILS_EXTENSION);
        if has_layer && has_debug_utils {
            if !layers.iter().any(|l| l == VALIDATION_LAYER) {
                layers.push(VALIDATION_LAYER.to_string());
            }
            if !extensions.iter().any(|e| e == DEBUG_UTILS_EXTENSION) {
                extensions.push(DEBUG_UTILS_EXTENSION.to_string());
            }
            validation_enabled = true;
        } else {
            tracing::warn!(
                "Validation requested but unavailable (layer: {has_layer}, debug utils: {has_debug_utils}); continuing without validation"
            );
        }
    }

    Ok(InstanceNames {
        extensions,
        layers,
        validation_enabled,
    })
}

/// Create a Vulkan instance.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    options: &InitContextOptions,
    surface_extensions: &[String],
) -> Result<CreatedInstance> {
    let supported_extensions =
        extension_names(&unsafe { entry.enumerate_instance_extension_properties(None)? });
    let supported_layers = layer_names(&unsafe { entry.enumerate_instance_layer_properties()? });

    let names = resolve_instance_names(
        options,
        surface_extensions,
        &supported_extensions,
        &supported_layers,
    )?;

    let to_cstring = |value: &str| {
        CString::new(value)
            .map_err(|_| StartupError::InvalidState(format!("name contains a NUL byte: {value}")))
    };
    let app_name = to_cstring(&options.app_name)?;
    let engine_name = to_cstring(&options.engine_name)?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(options.app_version)
        .engine_name(&engine_name)
        .engine_version(options.engine_version)
        .api_version(options.api_version);

    let extension_cstrings = to_c_strings(&names.extensions)?;
    let extension_ptrs = as_ptrs(&extension_cstrings);
    let layer_cstrings = to_c_strings(&names.layers)?;
    let layer_ptrs = as_ptrs(&layer_cstrings);

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    // Chained so instance creation and destruction are validated too.
    let mut debug_info = messenger_create_info();

    let mut create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_ptrs)
        .enabled_layer_names(&layer_ptrs)
        .flags(create_flags);
    if names.validation_enabled {
        create_info = create_info.push_next(&mut debug_info);
    }

    let instance = unsafe { entry.create_instance(&create_info, None)? };

    tracing::debug!(
        "Instance created with extensions {:?} and layers {:?}",
        names.extensions,
        names.layers
    );

    Ok(CreatedInstance {
        instance,
        layers: names.layers,
        extensions: names.extensions,
        validation_enabled: names.validation_enabled,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    fn base_extensions() -> Vec<&'static str> {
        let mut names = vec!["VK_KHR_surface", "VK_KHR_xcb_surface", DEBUG_UTILS_EXTENSION];
        if cfg!(target_os = "macos") {
            names.push(PORTABILITY_ENUMERATION_EXTENSION);
        }
        names
    }

    #[test]
    fn surface_extensions_are_required() {
        let options = InitContextOptions::new().validation(false);
        let surface = vec!["VK_KHR_surface".to_string(), "VK_KHR_xcb_surface".to_string()];

        let names =
            resolve_instance_names(&options, &surface, &set(&base_extensions()), &set(&[]))
                .unwrap();
        assert!(names.extensions.contains(&"VK_KHR_xcb_surface".to_string()));
        assert!(!names.validation_enabled);

        let missing = vec!["VK_KHR_win32_surface".to_string()];
        let err =
            resolve_instance_names(&options, &missing, &set(&base_extensions()), &set(&[]))
                .unwrap_err();
        assert!(matches!(err, StartupError::ExtensionNotSupported(name) if name == "VK_KHR_win32_surface"));
    }

    #[test]
    fn validation_appends_layer_and_debug_utils() {
        let options = InitContextOptions::new().validation(true);
        let names = resolve_instance_names(
            &options,
            &[],
            &set(&base_extensions()),
            &set(&[VALIDATION_LAYER]),
        )
        .unwrap();

        assert!(names.validation_enabled);
        assert_eq!(names.layers, vec![VALIDATION_LAYER.to_string()]);
        assert!(names.extensions.contains(&DEBUG_UTILS_EXTENSION.to_string()));
    }

    #[test]
    fn validation_falls_back_when_layer_missing() {
        let options = InitContextOptions::new().validation(true);
        let names =
            resolve_instance_names(&options, &[], &set(&base_extensions()), &set(&[])).unwrap();

        assert!(!names.validation_enabled);
        assert!(names.layers.is_empty());
        assert!(!names.extensions.contains(&DEBUG_UTILS_EXTENSION.to_string()));
    }

    #[test]
    fn desired_layers_are_optional() {
        let options = InitContextOptions::new()
            .validation(false)
            .desired_layer("VK_LAYER_MESA_overlay")
            .required_layer("VK_LAYER_LUNARG_monitor");

        let err = resolve_instance_names(&options, &[], &set(&base_extensions()), &set(&[]))
            .unwrap_err();
        assert!(matches!(err, StartupError::LayerNotSupported(name) if name == "VK_LAYER_LUNARG_monitor"));

        let names = resolve_instance_names(
            &options,
            &[],
            &set(&base_extensions()),
            &set(&["VK_LAYER_LUNARG_monitor"]),
        )
        .unwrap();
        assert_eq!(names.layers, vec!["VK_LAYER_LUNARG_monitor".to_string()]);
    }
}
