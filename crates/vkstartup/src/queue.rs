//! Queue family resolution.

use std::collections::{BTreeSet, HashMap};

use ash::vk;

use crate::error::{Result, StartupError};

/// Role a queue family plays for the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueFamily {
    Graphics,
    Compute,
    Transfer,
    Present,
}

/// Queue family index and the queue fetched from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueIndexHandle {
    pub family_index: u32,
    pub handle: vk::Queue,
}

/// Queue family indices keyed by role.
pub type QueueFamilyIndices = HashMap<QueueFamily, u32>;

/// Pick a family index for every role.
///
/// The first family exposing a capability wins. Compute and transfer fall
/// back to the graphics family (graphics queues implicitly support
/// transfer). A present family is only resolved when `needs_present` is set.
pub fn resolve_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    needs_present: bool,
    present_support: F,
) -> Result<QueueFamilyIndices>
where
    F: Fn(u32) -> bool,
{
    let mut graphics = None;
    let mut compute = None;
    let mut transfer = None;
    let mut present = None;

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        if graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics = Some(i);
        }
        if compute.is_none() && family.queue_flags.contains(vk::QueueFlags::COMPUTE) {
            compute = Some(i);
        }
        if transfer.is_none() && family.queue_flags.contains(vk::QueueFlags::TRANSFER) {
            transfer = Some(i);
        }
        if needs_present && present.is_none() && present_support(i) {
            present = Some(i);
        }
    }

    let graphics = graphics.ok_or(StartupError::MissingQueueFamily(QueueFamily::Graphics))?;

    let mut indices = QueueFamilyIndices::new();
    indices.insert(QueueFamily::Graphics, graphics);
    indices.insert(QueueFamily::Compute, compute.unwrap_or(graphics));
    indices.insert(QueueFamily::Transfer, transfer.unwrap_or(graphics));

    if needs_present {
        let present = present.ok_or(StartupError::MissingQueueFamily(QueueFamily::Present))?;
        indices.insert(QueueFamily::Present, present);
    }

    Ok(indices)
}

/// Sorted, deduplicated family indices.
pub fn unique_family_indices(indices: &QueueFamilyIndices) -> Vec<u32> {
    indices
        .values()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
