//! Swapchain management.

use std::sync::Arc;

use ash::vk;

use crate::error::{Result, StartupError};
use crate::handle::DeviceHandle;
use crate::surface::Surface;

/// What a surface supports on a physical device.
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Parameters chosen for a swapchain.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainFormat {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub usage: vk::ImageUsageFlags,
}

impl SwapchainFormat {
    /// Choose swapchain parameters from what the surface supports.
    pub fn select(support: &SwapchainSupport, extent_hint: vk::Extent2D) -> Result<Self> {
        let caps = &support.capabilities;
        Ok(Self {
            surface_format: select_surface_format(&support.formats)?,
            present_mode: select_present_mode(&support.present_modes),
            extent: choose_extent(caps, extent_hint),
            image_count: choose_image_count(caps),
            pre_transform: caps.current_transform,
            composite_alpha: choose_composite_alpha(caps.supported_composite_alpha),
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | (caps.supported_usage_flags & vk::ImageUsageFlags::TRANSFER_DST),
        })
    }
}

/// Select the surface format, preferring 8-bit BGRA sRGB.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    if let Some(format) = available.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_SRGB
            && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    }) {
        return Ok(*format);
    }

    let first = available.first().copied().ok_or_else(|| {
        StartupError::SwapchainCreation("surface reports no supported formats".to_string())
    })?;
    tracing::warn!(
        "Desired swapchain format not found. Defaulting to {:?} / {:?}",
        first.format,
        first.color_space
    );
    Ok(first)
}

/// Select the present mode: mailbox when available, FIFO otherwise.
pub fn select_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        // FIFO is always supported
        vk::PresentModeKHR::FIFO
    }
}

/// Swapchain extent. A current extent of `u32::MAX` lets the swapchain decide.
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, hint: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: hint.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: hint.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One image more than the minimum, capped by the maximum (0 means no cap).
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

fn choose_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|&mode| supported.contains(mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Image sharing mode for the queue families touching swapchain images.
pub fn sharing_mode(unique_family_indices: &[u32]) -> (vk::SharingMode, &[u32]) {
    if unique_family_indices.len() > 1 {
        (vk::SharingMode::CONCURRENT, unique_family_indices)
    } else {
        (vk::SharingMode::EXCLUSIVE, &[])
    }
}

/// Swapchain for one surface, with a color view per image.
pub struct Swapchain {
    surface_id: String,
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<DeviceHandle<vk::ImageView>>,
    format: SwapchainFormat,
}

impl Swapchain {
    /// Create a swapchain for `surface`.
    ///
    /// # Safety
    /// All handles must be valid and the device must have the swapchain
    /// extension enabled.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: &Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
        surface: &Surface,
        queue_family_indices: &[u32],
    ) -> Result<Self> {
        let loader = ash::khr::swapchain::Device::new(instance, device);
        unsafe {
            Self::create(
                loader,
                device,
                physical_device,
                surface,
                queue_family_indices,
                vk::SwapchainKHR::null(),
            )
        }
    }

    unsafe fn create(
        loader: ash::khr::swapchain::Device,
        device: &Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
        surface: &Surface,
        queue_family_indices: &[u32],
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<Self> {
        let support = unsafe { surface.query_support(physical_device)? };
        let format = SwapchainFormat::select(&support, surface.extent_hint())?;
        let (sharing, indices) = sharing_mode(queue_family_indices);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(format.image_count)
            .image_format(format.surface_format.format)
            .image_color_space(format.surface_format.color_space)
            .image_extent(format.extent)
            .image_array_layers(1)
            .image_usage(format.usage)
            .image_sharing_mode(sharing)
            .queue_family_indices(indices)
            .pre_transform(format.pre_transform)
            .composite_alpha(format.composite_alpha)
            .present_mode(format.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(|e| StartupError::SwapchainCreation(e.to_string()))?;

        let images = match unsafe { loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(e.into());
            }
        };

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.surface_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );

            match unsafe { device.create_image_view(&view_info, None) } {
                Ok(view) => image_views.push(unsafe { DeviceHandle::new(device.clone(), view) }),
                Err(e) => {
                    drop(image_views);
                    unsafe { loader.destroy_swapchain(swapchain, None) };
                    return Err(e.into());
                }
            }
        }

        tracing::info!(
            "Swapchain '{}' created: {}x{} ({} images, {:?})",
            surface.id(),
            format.extent.width,
            format.extent.height,
            images.len(),
            format.present_mode
        );

        Ok(Self {
            surface_id: surface.id().to_string(),
            loader,
            swapchain,
            images,
            image_views,
            format,
        })
    }

    /// Recreate the swapchain, e.g. after the surface was resized.
    ///
    /// # Safety
    /// The device must be idle with respect to the current swapchain images.
    pub unsafe fn recreate(
        &mut self,
        device: &Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
        surface: &Surface,
        queue_family_indices: &[u32],
    ) -> Result<()> {
        let replacement = unsafe {
            Self::create(
                self.loader.clone(),
                device,
                physical_device,
                surface,
                queue_family_indices,
                self.swapchain,
            )?
        };
        // The old swapchain is destroyed when the replaced value drops.
        *self = replacement;
        Ok(())
    }

    /// Id of the surface this swapchain presents to.
    pub fn surface_id(&self) -> &str {
        &self.surface_id
    }

    /// Raw swapchain handle.
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Swapchain extension loader.
    pub fn loader(&self) -> &ash::khr::swapchain::Device {
        &self.loader
    }

    /// Swapchain images.
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Raw image views, one per image.
    pub fn image_views(&self) -> Vec<vk::ImageView> {
        self.image_views.iter().map(DeviceHandle::raw).collect()
    }

    /// Chosen parameters.
    pub fn format(&self) -> &SwapchainFormat {
        &self.format
    }

    /// Image extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.format.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.image_views.clear();
        unsafe {
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn prefers_bgra_srgb() {
        let available = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = select_surface_format(&available).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn falls_back_to_first_format() {
        let available = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = select_surface_format(&available).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);

        assert!(matches!(
            select_surface_format(&[]),
            Err(StartupError::SwapchainCreation(_))
        ));
    }

    #[test]
    fn present_mode_selection() {
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_follows_surface_or_clamps_hint() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1024,
                height: 768,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 2048,
                height: 2048,
            },
            ..Default::default()
        };
        let hint = vk::Extent2D {
            width: 4000,
            height: 0,
        };

        assert_eq!(choose_extent(&caps, hint).width, 1024);

        caps.current_extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        let extent = choose_extent(&caps, hint);
        assert_eq!(extent.width, 2048);
        assert_eq!(extent.height, 1);
    }

    #[test]
    fn image_count_respects_maximum() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
    }

    #[test]
    fn sharing_mode_depends_on_family_count() {
        let (mode, indices) = sharing_mode(&[0]);
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(indices.is_empty());

        let (mode, indices) = sharing_mode(&[0, 2]);
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(indices, &[0, 2]);
    }

    #[test]
    fn format_selection_combines_choices() {
        let support = SwapchainSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 8,
                current_extent: vk::Extent2D {
                    width: 640,
                    height: 480,
                },
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::INHERIT,
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
                ..Default::default()
            },
            formats: vec![format(
                vk::Format::B8G8R8A8_SRGB,
                vk::ColorSpaceKHR::SRGB_NONLINEAR,
            )],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let chosen = SwapchainFormat::select(&support, vk::Extent2D::default()).unwrap();
        assert_eq!(chosen.image_count, 3);
        assert_eq!(chosen.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(chosen.composite_alpha, vk::CompositeAlphaFlagsKHR::INHERIT);
        assert_eq!(chosen.usage, vk::ImageUsageFlags::COLOR_ATTACHMENT);
        assert_eq!(chosen.extent.width, 640);
    }
}
