//! Extension and layer name resolution.
//!
//! Vulkan start-up repeats the same check for instance extensions, instance
//! layers and device extensions: every *required* name must be supported,
//! *desired* names are enabled when available and skipped otherwise.

use std::collections::HashSet;
use std::ffi::{c_char, CStr, CString};

use ash::vk;

use crate::error::{Result, StartupError};

/// What kind of name is being resolved. Selects the error variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    InstanceExtension,
    Layer,
    DeviceExtension,
}

impl NameKind {
    fn label(self) -> &'static str {
        match self {
            Self::InstanceExtension => "Instance extension",
            Self::Layer => "Layer",
            Self::DeviceExtension => "Device extension",
        }
    }

    fn unsupported(self, name: &str) -> StartupError {
        match self {
            Self::Layer => StartupError::LayerNotSupported(name.to_string()),
            Self::InstanceExtension | Self::DeviceExtension => {
                StartupError::ExtensionNotSupported(name.to_string())
            }
        }
    }
}

/// Names of the given extension properties.
pub fn extension_names(properties: &[vk::ExtensionProperties]) -> HashSet<String> {
    properties
        .iter()
        .map(|props| char_array_to_string(&props.extension_name))
        .collect()
}

/// Names of the given layer properties.
pub fn layer_names(properties: &[vk::LayerProperties]) -> HashSet<String> {
    properties
        .iter()
        .map(|props| char_array_to_string(&props.layer_name))
        .collect()
}

fn char_array_to_string(chars: &[c_char]) -> String {
    // SAFETY: Vulkan guarantees these fixed-size name arrays are NUL terminated.
    unsafe { CStr::from_ptr(chars.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// Resolve the names to enable.
///
/// Required names come first in the order given, followed by the supported
/// desired names. Duplicates keep their first position.
pub fn resolve_names<R, D>(
    kind: NameKind,
    required: &[R],
    desired: &[D],
    supported: &HashSet<String>,
) -> Result<Vec<String>>
where
    R: AsRef<str>,
    D: AsRef<str>,
{
    let mut resolved: Vec<String> = Vec::with_capacity(required.len() + desired.len());

    for name in required.iter().map(AsRef::as_ref) {
        if !supported.contains(name) {
            tracing::error!("{}: {} is not supported", kind.label(), name);
            return Err(kind.unsupported(name));
        }
        push_unique(&mut resolved, name);
    }

    for name in desired.iter().map(AsRef::as_ref) {
        if supported.contains(name) {
            push_unique(&mut resolved, name);
        } else {
            tracing::warn!("{}: {} is not supported", kind.label(), name);
        }
    }

    Ok(resolved)
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

/// Convert names to owned C strings for create-info structures.
pub fn to_c_strings<S: AsRef<str>>(names: &[S]) -> Result<Vec<CString>> {
    names
        .iter()
        .map(|name| {
            CString::new(name.as_ref()).map_err(|_| {
                StartupError::InvalidState(format!("name contains a NUL byte: {}", name.as_ref()))
            })
        })
        .collect()
}

/// Raw pointers to the given C strings. The strings must outlive the pointers.
pub fn as_ptrs(names: &[CString]) -> Vec<*const c_char> {
    names.iter().map(|name| name.as_ptr()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supported(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn required_then_desired() {
        let available = supported(&["VK_KHR_surface", "VK_EXT_debug_utils", "VK_KHR_xlib_surface"]);
        let resolved = resolve_names(
            NameKind::InstanceExtension,
            &["VK_KHR_surface", "VK_KHR_xlib_surface"],
            &["VK_EXT_debug_utils"],
            &available,
        )
        .unwrap();

        assert_eq!(
            resolved,
            vec!["VK_KHR_surface", "VK_KHR_xlib_surface", "VK_EXT_debug_utils"]
        );
    }

    #[test]
    fn missing_required_extension_fails() {
        let available = supported(&["VK_KHR_surface"]);
        let err = resolve_names(
            NameKind::InstanceExtension,
            &["VK_KHR_surface", "VK_KHR_win32_surface"],
            &[] as &[&str],
            &available,
        )
        .unwrap_err();

        assert!(
            matches!(err, StartupError::ExtensionNotSupported(ref name) if name == "VK_KHR_win32_surface")
        );
    }

    #[test]
    fn missing_required_layer_fails() {
        let err = resolve_names(
            NameKind::Layer,
            &["VK_LAYER_KHRONOS_validation"],
            &[] as &[&str],
            &HashSet::new(),
        )
        .unwrap_err();

        assert!(matches!(err, StartupError::LayerNotSupported(_)));
    }

    #[test]
    fn missing_desired_is_skipped() {
        let available = supported(&["VK_KHR_swapchain"]);
        let resolved = resolve_names(
            NameKind::DeviceExtension,
            &[] as &[&str],
            &["VK_KHR_ray_query", "VK_KHR_swapchain"],
            &available,
        )
        .unwrap();

        assert_eq!(resolved, vec!["VK_KHR_swapchain"]);
    }

    #[test]
    fn duplicates_keep_first_position() {
        let available = supported(&["a", "b"]);
        let resolved = resolve_names(NameKind::Layer, &["b", "a"], &["a", "b"], &available).unwrap();
        assert_eq!(resolved, vec!["b", "a"]);
    }

    #[test]
    fn nul_byte_rejected() {
        assert!(to_c_strings(&["bad\0name"]).is_err());
        let ok = to_c_strings(&["VK_KHR_surface"]).unwrap();
        assert_eq!(ok[0].to_str().unwrap(), "VK_KHR_surface");
    }
}
