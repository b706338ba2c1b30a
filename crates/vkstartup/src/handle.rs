//! Owned device-level handles.

use std::sync::Arc;

use ash::vk;

/// A raw Vulkan object destroyed through the device that created it.
pub trait DeviceObject: Copy {
    /// Destroy the object.
    ///
    /// # Safety
    /// The object must have been created by `device` and must not be in use.
    unsafe fn destroy(self, device: &ash::Device);
}

impl DeviceObject for vk::RenderPass {
    unsafe fn destroy(self, device: &ash::Device) {
        unsafe { device.destroy_render_pass(self, None) };
    }
}

impl DeviceObject for vk::Framebuffer {
    unsafe fn destroy(self, device: &ash::Device) {
        unsafe { device.destroy_framebuffer(self, None) };
    }
}

impl DeviceObject for vk::ImageView {
    unsafe fn destroy(self, device: &ash::Device) {
        unsafe { device.destroy_image_view(self, None) };
    }
}

/// Owns a device object and destroys it on drop.
pub struct DeviceHandle<T: DeviceObject> {
    raw: T,
    device: Arc<ash::Device>,
}

impl<T: DeviceObject> DeviceHandle<T> {
    /// Take ownership of `raw`.
    ///
    /// # Safety
    /// `raw` must have been created by `device` and must not be owned elsewhere.
    pub unsafe fn new(device: Arc<ash::Device>, raw: T) -> Self {
        Self { raw, device }
    }

    /// Raw handle. Stays owned by `self`.
    pub fn raw(&self) -> T {
        self.raw
    }
}

impl<T: DeviceObject> Drop for DeviceHandle<T> {
    fn drop(&mut self) {
        unsafe { self.raw.destroy(&self.device) };
    }
}
