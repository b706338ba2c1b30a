//! Physical device selection.
//!
//! Every physical device is queried once into a [`PhysicalDeviceCandidate`].
//! A [`DeviceSelector`] then picks one. The default selector ranks devices
//! the way most desktop applications want; applications with other needs
//! supply their own.

use std::collections::HashSet;
use std::ffi::CStr;

use ash::vk;

use crate::error::{Result, StartupError};
use crate::names::{extension_names, resolve_names, NameKind};
use crate::queue::{resolve_queue_families, QueueFamilyIndices};
use crate::surface::Surface;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Everything selection needs to know about one physical device.
#[derive(Debug, Clone)]
pub struct PhysicalDeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub extensions: HashSet<String>,
    /// Per queue family: can it present to every surface of the context.
    pub present_support: Vec<bool>,
}

impl PhysicalDeviceCandidate {
    /// Device name reported by the driver.
    pub fn name(&self) -> String {
        // SAFETY: the driver NUL terminates device_name.
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    /// Whether any queue family supports graphics.
    pub fn has_graphics_queue(&self) -> bool {
        self.queue_families
            .iter()
            .any(|f| f.queue_count > 0 && f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
    }

    /// Whether any queue family can present to every surface.
    pub fn can_present(&self) -> bool {
        self.present_support.iter().any(|&supported| supported)
    }

    /// Whether all `names` are supported device extensions.
    pub fn supports_extensions<S: AsRef<str>>(&self, names: &[S]) -> bool {
        names
            .iter()
            .all(|name| self.extensions.contains(name.as_ref()))
    }
}

/// Hard requirements every selector must respect.
#[derive(Debug, Clone, Default)]
pub struct DeviceRequirements {
    pub required_extensions: Vec<String>,
    pub needs_present: bool,
}

impl DeviceRequirements {
    /// Whether `candidate` satisfies the requirements.
    pub fn satisfied_by(&self, candidate: &PhysicalDeviceCandidate) -> bool {
        candidate.has_graphics_queue()
            && candidate.supports_extensions(&self.required_extensions)
            && (!self.needs_present || candidate.can_present())
    }
}

/// Chooses the physical device and the features to enable on it.
pub trait DeviceSelector {
    /// Index of the chosen candidate, `None` if nothing is acceptable.
    fn select(
        &self,
        candidates: &[PhysicalDeviceCandidate],
        requirements: &DeviceRequirements,
    ) -> Option<usize>;

    /// Features to enable on the logical device.
    fn features_to_activate(&self, candidate: &PhysicalDeviceCandidate)
        -> vk::PhysicalDeviceFeatures;
}

/// Prefers discrete GPUs, then larger maximum 2D image sizes. Requires
/// geometry shader support and enables it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDeviceSelector;

impl DefaultDeviceSelector {
    /// Rank a candidate; higher is better.
    pub fn score(candidate: &PhysicalDeviceCandidate) -> i64 {
        let mut score = 0;
        if candidate.properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score += 1000;
        }
        score + i64::from(candidate.properties.limits.max_image_dimension2_d)
    }

    fn meets_requirements(
        candidate: &PhysicalDeviceCandidate,
        requirements: &DeviceRequirements,
    ) -> bool {
        requirements.satisfied_by(candidate) && candidate.features.geometry_shader == vk::TRUE
    }
}

impl DeviceSelector for DefaultDeviceSelector {
    fn select(
        &self,
        candidates: &[PhysicalDeviceCandidate],
        requirements: &DeviceRequirements,
    ) -> Option<usize> {
        // max_by_key keeps the last of equally scored candidates
        candidates
            .iter()
            .enumerate()
            .filter(|(_, candidate)| Self::meets_requirements(candidate, requirements))
            .max_by_key(|(_, candidate)| Self::score(candidate))
            .map(|(index, _)| index)
    }

    fn features_to_activate(
        &self,
        _candidate: &PhysicalDeviceCandidate,
    ) -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures::default().geometry_shader(true)
    }
}

/// The selected device and how the logical device will be created on it.
#[derive(Debug, Clone)]
pub struct PhysicalDeviceInfo {
    pub handle: vk::PhysicalDevice,
    pub vendor: GpuVendor,
    pub name: String,
    pub properties: vk::PhysicalDeviceProperties,
    pub queue_family_indices: QueueFamilyIndices,
    pub features_to_activate: vk::PhysicalDeviceFeatures,
    pub device_extensions: Vec<String>,
}

impl PhysicalDeviceInfo {
    /// Finish selection for `candidate`.
    pub fn build(
        candidate: &PhysicalDeviceCandidate,
        selector: &dyn DeviceSelector,
        requirements: &DeviceRequirements,
        desired_extensions: &[String],
    ) -> Result<Self> {
        let device_extensions = resolve_names(
            NameKind::DeviceExtension,
            &requirements.required_extensions,
            desired_extensions,
            &candidate.extensions,
        )?;

        let queue_family_indices = resolve_queue_families(
            &candidate.queue_families,
            requirements.needs_present,
            |family| {
                candidate
                    .present_support
                    .get(family as usize)
                    .copied()
                    .unwrap_or(false)
            },
        )?;

        Ok(Self {
            handle: candidate.handle,
            vendor: GpuVendor::from_vendor_id(candidate.properties.vendor_id),
            name: candidate.name(),
            properties: candidate.properties,
            queue_family_indices,
            features_to_activate: selector.features_to_activate(candidate),
            device_extensions,
        })
    }

    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        let api = self.properties.api_version;
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{}",
            self.name,
            self.vendor,
            self.properties.device_type,
            vk::api_version_major(api),
            vk::api_version_minor(api),
            vk::api_version_patch(api),
        )
    }
}

/// Query every physical device of `instance`.
///
/// # Safety
/// The instance and surfaces must be valid.
pub unsafe fn query_candidates(
    instance: &ash::Instance,
    surfaces: &[Surface],
) -> Result<Vec<PhysicalDeviceCandidate>> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    if devices.is_empty() {
        tracing::error!("Unable to locate a physical device");
        return Err(StartupError::NoSuitableDevice);
    }

    devices
        .into_iter()
        .map(|device| -> Result<PhysicalDeviceCandidate> {
            unsafe {
                let properties = instance.get_physical_device_properties(device);
                let features = instance.get_physical_device_features(device);
                let queue_families = instance.get_physical_device_queue_family_properties(device);
                let extensions =
                    extension_names(&instance.enumerate_device_extension_properties(device)?);

                let present_support = (0..queue_families.len() as u32)
                    .map(|family| {
                        !surfaces.is_empty()
                            && surfaces
                                .iter()
                                .all(|surface| surface.supports_present(device, family))
                    })
                    .collect();

                Ok(PhysicalDeviceCandidate {
                    handle: device,
                    properties,
                    features,
                    queue_families,
                    extensions,
                    present_support,
                })
            }
        })
        .collect()
}

/// Select a physical device with `selector`.
///
/// # Safety
/// The instance and surfaces must be valid.
pub unsafe fn select_physical_device(
    instance: &ash::Instance,
    surfaces: &[Surface],
    selector: &dyn DeviceSelector,
    requirements: &DeviceRequirements,
    desired_extensions: &[String],
) -> Result<PhysicalDeviceInfo> {
    let candidates = unsafe { query_candidates(instance, surfaces)? };

    let index = selector.select(&candidates, requirements).ok_or_else(|| {
        tracing::error!("Failed to select a physical device based on criteria");
        StartupError::NoSuitableDevice
    })?;
    let candidate = candidates.get(index).ok_or_else(|| {
        StartupError::InvalidState(format!("selector returned out of range index {index}"))
    })?;

    let info = PhysicalDeviceInfo::build(candidate, selector, requirements, desired_extensions)?;
    tracing::info!("Selected Physical Device: {}", info.summary());

    Ok(info)
}
