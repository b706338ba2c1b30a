//! Context initialization.
//!
//! [`InitContext::new`] runs the start-up sequence described by an
//! [`InitContextOptions`] and returns a [`VkContext`] owning everything it
//! created. Fields of [`VkContext`] are declared in reverse creation order so
//! they are destroyed children first.

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;

use crate::debug::DebugMessenger;
use crate::device::{create_logical_device, fetch_queues};
use crate::error::{Result, StartupError};
use crate::instance::create_instance;
use crate::memory::MemoryAllocator;
use crate::physical_device::{
    select_physical_device, DefaultDeviceSelector, DeviceRequirements, DeviceSelector,
    PhysicalDeviceInfo,
};
use crate::queue::{unique_family_indices, QueueFamily, QueueFamilyIndices, QueueIndexHandle};
use crate::surface::{ensure_unique_ids, Surface, SurfaceLoader};
use crate::swapchain::Swapchain;

/// Device extension enabled whenever surfaces are requested.
pub const SWAPCHAIN_EXTENSION: &str = "VK_KHR_swapchain";

/// Options for [`InitContext::new`].
pub struct InitContextOptions {
    pub api_version: u32,
    pub app_name: String,
    pub app_version: u32,
    pub engine_name: String,
    pub engine_version: u32,
    pub required_instance_extensions: Vec<String>,
    pub desired_instance_extensions: Vec<String>,
    pub required_layers: Vec<String>,
    pub desired_layers: Vec<String>,
    pub enable_validation: bool,
    pub required_device_extensions: Vec<String>,
    pub desired_device_extensions: Vec<String>,
    pub device_selector: Option<Box<dyn DeviceSelector>>,
    pub surface_loaders: Vec<Box<dyn SurfaceLoader>>,
    pub create_allocator: bool,
}

impl Default for InitContextOptions {
    fn default() -> Self {
        Self {
            api_version: vk::API_VERSION_1_0,
            app_name: "VkStartup".to_string(),
            app_version: vk::make_api_version(0, 0, 1, 0),
            engine_name: "VkStartup".to_string(),
            engine_version: vk::make_api_version(0, 0, 1, 0),
            required_instance_extensions: Vec::new(),
            desired_instance_extensions: Vec::new(),
            required_layers: Vec::new(),
            desired_layers: Vec::new(),
            enable_validation: false,
            required_device_extensions: Vec::new(),
            desired_device_extensions: Vec::new(),
            device_selector: None,
            surface_loaders: Vec::new(),
            create_allocator: true,
        }
    }
}

impl InitContextOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Vulkan API version requested from the instance.
    pub fn api_version(mut self, version: u32) -> Self {
        self.api_version = version;
        self
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Set the application version.
    pub fn app_version(mut self, version: u32) -> Self {
        self.app_version = version;
        self
    }

    /// Set the engine name and version.
    pub fn engine(mut self, name: impl Into<String>, version: u32) -> Self {
        self.engine_name = name.into();
        self.engine_version = version;
        self
    }

    pub fn required_instance_extension(mut self, name: impl Into<String>) -> Self {
        self.required_instance_extensions.push(name.into());
        self
    }

    pub fn desired_instance_extension(mut self, name: impl Into<String>) -> Self {
        self.desired_instance_extensions.push(name.into());
        self
    }

    pub fn required_layer(mut self, name: impl Into<String>) -> Self {
        self.required_layers.push(name.into());
        self
    }

    pub fn desired_layer(mut self, name: impl Into<String>) -> Self {
        self.desired_layers.push(name.into());
        self
    }

    /// Enable or disable validation layers. Off by default.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    pub fn required_device_extension(mut self, name: impl Into<String>) -> Self {
        self.required_device_extensions.push(name.into());
        self
    }

    pub fn desired_device_extension(mut self, name: impl Into<String>) -> Self {
        self.desired_device_extensions.push(name.into());
        self
    }

    /// Replace the default physical device selector.
    pub fn device_selector(mut self, selector: impl DeviceSelector + 'static) -> Self {
        self.device_selector = Some(Box::new(selector));
        self
    }

    /// Add a surface to create. Each loader gets its own swapchain.
    pub fn surface_loader(mut self, loader: impl SurfaceLoader + 'static) -> Self {
        self.surface_loaders.push(Box::new(loader));
        self
    }

    /// Create the memory allocator or not.
    pub fn allocator(mut self, enable: bool) -> Self {
        self.create_allocator = enable;
        self
    }

    /// Device requirements implied by these options.
    pub fn device_requirements(&self) -> DeviceRequirements {
        let needs_present = !self.surface_loaders.is_empty();
        let mut required_extensions = self.required_device_extensions.clone();
        if needs_present && !required_extensions.iter().any(|e| e == SWAPCHAIN_EXTENSION) {
            required_extensions.push(SWAPCHAIN_EXTENSION.to_string());
        }
        DeviceRequirements {
            required_extensions,
            needs_present,
        }
    }

    /// Initialize a context with these options.
    pub fn build(self) -> Result<VkContext> {
        InitContext::new(self)
    }
}

/// Runs the start-up sequence.
pub struct InitContext;

impl InitContext {
    /// Initialize Vulkan as described by `options`.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(options: InitContextOptions) -> Result<VkContext> {
        ensure_unique_ids(&options.surface_loaders)?;
        if options.surface_loaders.is_empty() {
            tracing::warn!("No surface loaders supplied; initializing without presentation");
        }

        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| StartupError::Loading(e.to_string()))?;

        let mut surface_extensions = Vec::new();
        for loader in &options.surface_loaders {
            for extension in loader.required_instance_extensions()? {
                if !surface_extensions.contains(&extension) {
                    surface_extensions.push(extension);
                }
            }
        }

        let created = unsafe { create_instance(&entry, &options, &surface_extensions)? };
        let instance = InstanceOwner {
            entry,
            instance: created.instance,
        };

        let debug_messenger = if created.validation_enabled {
            Some(unsafe { DebugMessenger::new(&instance.entry, &instance.instance)? })
        } else {
            None
        };

        let mut surfaces = Vec::with_capacity(options.surface_loaders.len());
        for loader in &options.surface_loaders {
            surfaces.push(unsafe {
                Surface::new(&instance.entry, &instance.instance, loader.as_ref())?
            });
        }

        let requirements = options.device_requirements();
        let default_selector = DefaultDeviceSelector;
        let selector: &dyn DeviceSelector = options
            .device_selector
            .as_deref()
            .unwrap_or(&default_selector);
        let physical_device = unsafe {
            select_physical_device(
                &instance.instance,
                &surfaces,
                selector,
                &requirements,
                &options.desired_device_extensions,
            )?
        };

        let device = DeviceOwner(Arc::new(unsafe {
            create_logical_device(&instance.instance, &physical_device, &created.layers)?
        }));
        let queues = unsafe { fetch_queues(&device.0, &physical_device.queue_family_indices)? };

        let swapchain_families = presentation_families(&physical_device.queue_family_indices);
        let mut swapchains = Vec::with_capacity(surfaces.len());
        for surface in &surfaces {
            swapchains.push(unsafe {
                Swapchain::new(
                    &instance.instance,
                    &device.0,
                    physical_device.handle,
                    surface,
                    &swapchain_families,
                )?
            });
        }

        let allocator = if options.create_allocator {
            Some(Mutex::new(unsafe {
                MemoryAllocator::new(&instance.instance, device.0.clone(), physical_device.handle)?
            }))
        } else {
            None
        };

        tracing::info!(
            "Vulkan context initialized ({} surfaces, validation {})",
            surfaces.len(),
            if created.validation_enabled { "on" } else { "off" }
        );

        Ok(VkContext {
            swapchains,
            allocator,
            queues,
            device,
            physical_device,
            surfaces,
            debug_messenger,
            layers: created.layers,
            instance_extensions: created.extensions,
            validation_enabled: created.validation_enabled,
            instance,
        })
    }
}

/// Families that access swapchain images: graphics and present.
fn presentation_families(indices: &QueueFamilyIndices) -> Vec<u32> {
    let subset: QueueFamilyIndices = indices
        .iter()
        .filter(|(family, _)| matches!(family, QueueFamily::Graphics | QueueFamily::Present))
        .map(|(&family, &index)| (family, index))
        .collect();
    unique_family_indices(&subset)
}

struct InstanceOwner {
    // Keeps the loader library alive while the instance exists.
    entry: ash::Entry,
    instance: ash::Instance,
}

impl Drop for InstanceOwner {
    fn drop(&mut self) {
        unsafe { self.instance.destroy_instance(None) };
    }
}

struct DeviceOwner(Arc<ash::Device>);

impl Drop for DeviceOwner {
    fn drop(&mut self) {
        unsafe {
            let _ = self.0.device_wait_idle();
            self.0.destroy_device(None);
        }
    }
}

/// Everything created during start-up.
///
/// Objects created from [`Self::device`] by the application must be
/// destroyed before the context is dropped.
pub struct VkContext {
    swapchains: Vec<Swapchain>,
    allocator: Option<Mutex<MemoryAllocator>>,
    queues: HashMap<QueueFamily, QueueIndexHandle>,
    device: DeviceOwner,
    physical_device: PhysicalDeviceInfo,
    surfaces: Vec<Surface>,
    debug_messenger: Option<DebugMessenger>,
    layers: Vec<String>,
    instance_extensions: Vec<String>,
    validation_enabled: bool,
    instance: InstanceOwner,
}

impl VkContext {
    /// Get the Vulkan entry.
    pub fn entry(&self) -> &ash::Entry {
        &self.instance.entry
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance.instance
    }

    /// Get the debug messenger, if validation is enabled.
    pub fn debug_messenger(&self) -> Option<vk::DebugUtilsMessengerEXT> {
        self.debug_messenger.as_ref().map(DebugMessenger::handle)
    }

    pub fn validation_enabled(&self) -> bool {
        self.validation_enabled
    }

    /// Enabled instance layers.
    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    /// Enabled instance extensions.
    pub fn instance_extensions(&self) -> &[String] {
        &self.instance_extensions
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device.handle
    }

    /// Details of the selected physical device.
    pub fn physical_device_info(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &Arc<ash::Device> {
        &self.device.0
    }

    /// Queue and family index for `family`.
    pub fn queue(&self, family: QueueFamily) -> Option<QueueIndexHandle> {
        self.queues.get(&family).copied()
    }

    pub fn queue_family_indices(&self) -> &QueueFamilyIndices {
        &self.physical_device.queue_family_indices
    }

    /// Sorted, deduplicated queue family indices in use.
    pub fn unique_queue_family_indices(&self) -> Vec<u32> {
        unique_family_indices(&self.physical_device.queue_family_indices)
    }

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    /// Surface created from the loader with `id`.
    pub fn surface(&self, id: &str) -> Option<&Surface> {
        self.surfaces.iter().find(|s| s.id() == id)
    }

    pub fn swapchains(&self) -> &[Swapchain] {
        &self.swapchains
    }

    /// Swapchain presenting to the surface with `id`.
    pub fn swapchain(&self, id: &str) -> Option<&Swapchain> {
        self.swapchains.iter().find(|s| s.surface_id() == id)
    }

    /// Recreate the swapchain of surface `id` at a new size.
    pub fn recreate_swapchain(&mut self, id: &str, width: u32, height: u32) -> Result<()> {
        let surface = self
            .surfaces
            .iter_mut()
            .find(|s| s.id() == id)
            .ok_or_else(|| StartupError::InvalidState(format!("Unknown surface '{id}'")))?;
        surface.set_extent_hint(width, height);

        let swapchain = self
            .swapchains
            .iter_mut()
            .find(|s| s.surface_id() == id)
            .ok_or_else(|| StartupError::InvalidState(format!("No swapchain for '{id}'")))?;

        let families = presentation_families(&self.physical_device.queue_family_indices);
        unsafe {
            self.device.0.device_wait_idle()?;
            swapchain.recreate(&self.device.0, self.physical_device.handle, surface, &families)
        }
    }

    /// Get access to the memory allocator, if one was created.
    pub fn allocator(&self) -> Option<&Mutex<MemoryAllocator>> {
        self.allocator.as_ref()
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.0.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for VkContext {
    fn drop(&mut self) {
        let _ = self.wait_idle();
        // Allocations must be released while the device is still alive.
        if let Some(allocator) = &self.allocator {
            allocator.lock().shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedLoader(&'static str);

    impl SurfaceLoader for NamedLoader {
        fn id(&self) -> &str {
            self.0
        }

        fn required_instance_extensions(&self) -> Result<Vec<String>> {
            Ok(vec!["VK_KHR_surface".to_string()])
        }

        unsafe fn create_surface(
            &self,
            _entry: &ash::Entry,
            _instance: &ash::Instance,
        ) -> Result<vk::SurfaceKHR> {
            Err(StartupError::SurfaceCreation("headless test loader".to_string()))
        }

        fn extent_hint(&self) -> vk::Extent2D {
            vk::Extent2D {
                width: 800,
                height: 600,
            }
        }
    }

    #[test]
    fn defaults() {
        let options = InitContextOptions::default();
        assert_eq!(options.api_version, vk::API_VERSION_1_0);
        assert!(!options.enable_validation);
        assert!(options.create_allocator);
        assert!(options.surface_loaders.is_empty());
        assert!(options.device_selector.is_none());
    }

    #[test]
    fn builder_chains() {
        let options = InitContextOptions::new()
            .app_name("Smoke")
            .api_version(vk::API_VERSION_1_2)
            .validation(false)
            .required_instance_extension("VK_KHR_get_physical_device_properties2")
            .desired_layer("VK_LAYER_MESA_overlay")
            .desired_device_extension("VK_EXT_memory_budget")
            .allocator(false);

        assert_eq!(options.app_name, "Smoke");
        assert_eq!(options.api_version, vk::API_VERSION_1_2);
        assert!(!options.enable_validation);
        assert!(!options.create_allocator);
        assert_eq!(options.desired_layers, vec!["VK_LAYER_MESA_overlay"]);
        assert_eq!(options.desired_device_extensions, vec!["VK_EXT_memory_budget"]);
    }

    #[test]
    fn headless_does_not_require_swapchain() {
        let requirements = InitContextOptions::new().device_requirements();
        assert!(!requirements.needs_present);
        assert!(requirements.required_extensions.is_empty());
    }

    #[test]
    fn surfaces_require_swapchain_once() {
        let requirements = InitContextOptions::new()
            .required_device_extension(SWAPCHAIN_EXTENSION)
            .surface_loader(NamedLoader("main"))
            .device_requirements();

        assert!(requirements.needs_present);
        assert_eq!(requirements.required_extensions, vec![SWAPCHAIN_EXTENSION]);
    }

    #[test]
    fn duplicate_surface_ids_fail_before_loading_vulkan() {
        let result = InitContextOptions::new()
            .surface_loader(NamedLoader("main"))
            .surface_loader(NamedLoader("main"))
            .build();

        assert!(matches!(result, Err(StartupError::DuplicateSurfaceId(id)) if id == "main"));
    }

    #[test]
    fn presentation_families_are_graphics_and_present() {
        let indices: QueueFamilyIndices = [
            (QueueFamily::Graphics, 0),
            (QueueFamily::Compute, 1),
            (QueueFamily::Transfer, 2),
            (QueueFamily::Present, 3),
        ]
        .into_iter()
        .collect();
        assert_eq!(presentation_families(&indices), vec![0, 3]);

        let shared: QueueFamilyIndices = [(QueueFamily::Graphics, 0), (QueueFamily::Present, 0)]
            .into_iter()
            .collect();
        assert_eq!(presentation_families(&shared), vec![0]);
    }

    #[test]
    #[ignore = "requires a Vulkan driver"]
    fn headless_context_initializes() {
        let context = InitContextOptions::new()
            .app_name("vkstartup tests")
            .validation(true)
            .build()
            .unwrap();

        assert!(context.queue(QueueFamily::Graphics).is_some());
        assert!(context.queue(QueueFamily::Present).is_none());
        assert!(context.swapchains().is_empty());
        assert!(context.allocator().is_some());
        context.wait_idle().unwrap();
    }
}
