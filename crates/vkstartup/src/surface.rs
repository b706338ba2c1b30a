//! Surface management.
//!
//! Surfaces are created through user supplied [`SurfaceLoader`]s so the
//! library stays independent of the windowing system. A loader for anything
//! exposing `raw-window-handle` handles is provided.

use std::collections::HashSet;
use std::ffi::CStr;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::{Result, StartupError};
use crate::swapchain::SwapchainSupport;

/// Creates a Vulkan surface for one presentation target.
pub trait SurfaceLoader {
    /// Unique id of the surface within a context.
    fn id(&self) -> &str;

    /// Instance extensions this loader needs enabled.
    fn required_instance_extensions(&self) -> Result<Vec<String>>;

    /// Create the surface.
    ///
    /// # Safety
    /// The instance must be valid and created with
    /// [`Self::required_instance_extensions`] enabled.
    unsafe fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR>;

    /// Desired drawable size, used when the surface leaves the extent to the
    /// swapchain.
    fn extent_hint(&self) -> vk::Extent2D;
}

/// Surface loader for any window exposing raw window handles.
pub struct WindowSurfaceLoader<W> {
    id: String,
    window: W,
    extent: vk::Extent2D,
}

impl<W> WindowSurfaceLoader<W>
where
    W: HasDisplayHandle + HasWindowHandle,
{
    /// Create a loader for `window`, drawing at `width` x `height`.
    pub fn new(id: impl Into<String>, window: W, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            window,
            extent: vk::Extent2D { width, height },
        }
    }
}

impl<W> SurfaceLoader for WindowSurfaceLoader<W>
where
    W: HasDisplayHandle + HasWindowHandle,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn required_instance_extensions(&self) -> Result<Vec<String>> {
        let display = self
            .window
            .display_handle()
            .map_err(|e| StartupError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;

        let extensions = ash_window::enumerate_required_extensions(display.as_raw())?;

        Ok(extensions
            .iter()
            // SAFETY: ash-window returns pointers to static extension name constants.
            .map(|&ext| unsafe { CStr::from_ptr(ext) }.to_string_lossy().into_owned())
            .collect())
    }

    unsafe fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR> {
        let display = self
            .window
            .display_handle()
            .map_err(|e| StartupError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| StartupError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| StartupError::SurfaceCreation(e.to_string()))
    }

    fn extent_hint(&self) -> vk::Extent2D {
        self.extent
    }
}

/// Reject loaders that share an id.
pub fn ensure_unique_ids(loaders: &[Box<dyn SurfaceLoader>]) -> Result<()> {
    let mut seen = HashSet::new();
    for loader in loaders {
        if !seen.insert(loader.id()) {
            return Err(StartupError::DuplicateSurfaceId(loader.id().to_string()));
        }
    }
    Ok(())
}

/// A created surface owned by the context.
pub struct Surface {
    id: String,
    surface: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
    extent_hint: vk::Extent2D,
}

impl Surface {
    /// Create a surface through `surface_loader`.
    ///
    /// # Safety
    /// The instance must be valid and outlive the surface.
    pub unsafe fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        surface_loader: &dyn SurfaceLoader,
    ) -> Result<Self> {
        let surface = unsafe { surface_loader.create_surface(entry, instance)? };
        let loader = ash::khr::surface::Instance::new(entry, instance);

        tracing::debug!("Surface '{}' created", surface_loader.id());

        Ok(Self {
            id: surface_loader.id().to_string(),
            surface,
            loader,
            extent_hint: surface_loader.extent_hint(),
        })
    }

    /// Surface id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw surface handle.
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Surface extension loader.
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }

    /// Drawable size requested by the loader.
    pub fn extent_hint(&self) -> vk::Extent2D {
        self.extent_hint
    }

    /// Update the drawable size, e.g. after a window resize.
    pub fn set_extent_hint(&mut self, width: u32, height: u32) {
        self.extent_hint = vk::Extent2D { width, height };
    }

    /// Whether `queue_family` of `physical_device` can present to this surface.
    ///
    /// # Safety
    /// The physical device must belong to the surface's instance.
    pub unsafe fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> bool {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, queue_family, self.surface)
        }
        .unwrap_or(false)
    }

    /// Query swapchain support for this surface.
    ///
    /// # Safety
    /// The physical device must belong to the surface's instance.
    pub unsafe fn query_support(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<SwapchainSupport> {
        unsafe {
            let capabilities = self
                .loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)?;
            let formats = self
                .loader
                .get_physical_device_surface_formats(physical_device, self.surface)?;
            let present_modes = self
                .loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)?;

            Ok(SwapchainSupport {
                capabilities,
                formats,
                present_modes,
            })
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}
