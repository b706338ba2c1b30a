//! Logical device creation and queue retrieval.

use std::collections::HashMap;

use ash::vk;

use crate::error::{Result, StartupError};
use crate::names::{as_ptrs, to_c_strings};
use crate::physical_device::PhysicalDeviceInfo;
use crate::queue::{unique_family_indices, QueueFamily, QueueFamilyIndices, QueueIndexHandle};

const QUEUE_PRIORITY: [f32; 1] = [1.0];

/// One queue create info per unique family index.
pub fn queue_create_infos(indices: &QueueFamilyIndices) -> Vec<vk::DeviceQueueCreateInfo<'static>> {
    unique_family_indices(indices)
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&QUEUE_PRIORITY)
        })
        .collect()
}

/// Create the logical device.
///
/// Instance layers are passed on for older loaders that still honour
/// device layers.
///
/// # Safety
/// The instance and the physical device in `info` must be valid.
pub unsafe fn create_logical_device(
    instance: &ash::Instance,
    info: &PhysicalDeviceInfo,
    layers: &[String],
) -> Result<ash::Device> {
    let queue_infos = queue_create_infos(&info.queue_family_indices);

    let extension_cstrings = to_c_strings(&info.device_extensions)?;
    let extension_ptrs = as_ptrs(&extension_cstrings);
    let layer_cstrings = to_c_strings(layers)?;
    let layer_ptrs = as_ptrs(&layer_cstrings);

    #[allow(deprecated)]
    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&extension_ptrs)
        .enabled_layer_names(&layer_ptrs)
        .enabled_features(&info.features_to_activate);

    let device = unsafe { instance.create_device(info.handle, &create_info, None)? };

    tracing::debug!(
        "Logical device created with {} queue families and extensions {:?}",
        queue_infos.len(),
        info.device_extensions
    );

    Ok(device)
}

/// Fetch queue 0 of every resolved family.
///
/// # Safety
/// The device must have been created with `indices`.
pub unsafe fn fetch_queues(
    device: &ash::Device,
    indices: &QueueFamilyIndices,
) -> Result<HashMap<QueueFamily, QueueIndexHandle>> {
    indices
        .iter()
        .map(|(&family, &family_index)| {
            let handle = unsafe { device.get_device_queue(family_index, 0) };
            if handle == vk::Queue::null() {
                return Err(StartupError::InvalidState(format!(
                    "{family:?} queue handle is null"
                )));
            }
            Ok((
                family,
                QueueIndexHandle {
                    family_index,
                    handle,
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_create_info_per_unique_family() {
        let indices: QueueFamilyIndices = [
            (QueueFamily::Graphics, 0),
            (QueueFamily::Compute, 0),
            (QueueFamily::Transfer, 2),
            (QueueFamily::Present, 0),
        ]
        .into_iter()
        .collect();

        let infos = queue_create_infos(&indices);
        let families: Vec<u32> = infos.iter().map(|i| i.queue_family_index).collect();
        assert_eq!(families, vec![0, 2]);
        assert!(infos.iter().all(|i| i.queue_count == 1));
        assert!(infos
            .iter()
            .all(|i| (unsafe { *i.p_queue_priorities } - 1.0).abs() < f32::EPSILON));
    }
}
