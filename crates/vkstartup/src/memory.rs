//! GPU memory allocator.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;

use crate::error::{Result, StartupError};
use crate::handle::DeviceHandle;

/// Memory allocator owned by the context.
pub struct MemoryAllocator {
    allocator: Option<Allocator>,
    device: Arc<ash::Device>,
}

impl MemoryAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: gpu_allocator::AllocationSizes::default(),
        })
        .map_err(|e| StartupError::AllocationFailed(e.to_string()))?;

        tracing::debug!("Memory allocator created");

        Ok(Self {
            allocator: Some(allocator),
            device,
        })
    }

    fn inner(&mut self) -> Result<&mut Allocator> {
        self.allocator
            .as_mut()
            .ok_or_else(|| StartupError::InvalidState("Allocator already shut down".to_string()))
    }

    /// Create an image and bind freshly allocated memory to it.
    pub fn create_image(
        &mut self,
        create_info: &vk::ImageCreateInfo,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuImage> {
        let image = unsafe { self.device.create_image(create_info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = match self.inner()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(StartupError::AllocationFailed(e.to_string()));
            }
        };

        let bound = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            unsafe { self.device.destroy_image(image, None) };
            if let Err(free_error) = self.inner()?.free(allocation) {
                tracing::warn!("Failed to free memory of unbound image '{name}': {free_error}");
            }
            return Err(e.into());
        }

        Ok(GpuImage {
            image,
            allocation: Some(allocation),
            format: create_info.format,
            extent: create_info.extent,
        })
    }

    /// Free an image and its memory.
    pub fn free_image(&mut self, image: &mut GpuImage) -> Result<()> {
        if let Some(allocation) = image.allocation.take() {
            self.inner()?
                .free(allocation)
                .map_err(|e| StartupError::AllocationFailed(e.to_string()))?;
        }

        unsafe {
            self.device.destroy_image(image.image, None);
        }
        image.image = vk::Image::null();

        Ok(())
    }

    /// Create a device-local depth image with a view covering it.
    pub fn create_depth_buffer(
        &mut self,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Result<DepthBuffer> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let mut image = self.create_image(&create_info, MemoryLocation::GpuOnly, "depth buffer")?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::DEPTH)
                    .level_count(1)
                    .layer_count(1),
            );

        let view = match unsafe { self.device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                self.free_image(&mut image)?;
                return Err(e.into());
            }
        };

        Ok(DepthBuffer {
            view: Some(unsafe { DeviceHandle::new(self.device.clone(), view) }),
            image,
        })
    }

    /// Free a depth buffer created by [`Self::create_depth_buffer`].
    pub fn free_depth_buffer(&mut self, depth: &mut DepthBuffer) -> Result<()> {
        depth.view = None;
        self.free_image(&mut depth.image)
    }

    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// This must be called before the Vulkan device is destroyed.
    /// Any remaining allocations will be freed (and logged as leaks).
    pub fn shutdown(&mut self) {
        if let Some(allocator) = self.allocator.take() {
            drop(allocator);
        }
    }
}

impl Drop for MemoryAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A GPU image with its allocation.
pub struct GpuImage {
    pub image: vk::Image,
    pub allocation: Option<Allocation>,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
}

/// Depth image and view for a render pass depth attachment.
pub struct DepthBuffer {
    view: Option<DeviceHandle<vk::ImageView>>,
    image: GpuImage,
}

impl DepthBuffer {
    /// Raw image view, `None` once freed.
    pub fn view(&self) -> Option<vk::ImageView> {
        self.view.as_ref().map(DeviceHandle::raw)
    }

    /// Depth format.
    pub fn format(&self) -> vk::Format {
        self.image.format
    }
}

/// First depth format supporting optimal-tiling depth attachments.
///
/// # Safety
/// The instance and physical device must be valid.
pub unsafe fn find_depth_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<vk::Format> {
    [
        vk::Format::D32_SFLOAT,
        vk::Format::D32_SFLOAT_S8_UINT,
        vk::Format::D24_UNORM_S8_UINT,
    ]
    .into_iter()
    .find(|&format| {
        let props =
            unsafe { instance.get_physical_device_format_properties(physical_device, format) };
        props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
    .ok_or_else(|| StartupError::InvalidState("No supported depth format".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::InitContextOptions;

    #[test]
    #[ignore = "requires a Vulkan driver"]
    fn depth_buffer_allocates_and_frees() {
        let context = InitContextOptions::new().build().unwrap();
        let format =
            unsafe { find_depth_format(context.instance(), context.physical_device()).unwrap() };

        let mut allocator = context.allocator().unwrap().lock();
        let mut depth = allocator
            .create_depth_buffer(
                format,
                vk::Extent2D {
                    width: 64,
                    height: 64,
                },
            )
            .unwrap();
        assert!(depth.view().is_some());
        assert_eq!(depth.format(), format);

        allocator.free_depth_buffer(&mut depth).unwrap();
        assert!(depth.view().is_none());
        assert!(depth.image.allocation.is_none());
    }
}
