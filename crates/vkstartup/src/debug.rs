//! Validation layer debug messenger.

use std::ffi::{c_void, CStr};

use ash::vk;

use crate::error::Result;

/// Khronos validation layer name.
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Debug utils extension name.
pub const DEBUG_UTILS_EXTENSION: &str = "VK_EXT_debug_utils";

/// Messenger create info used both for the persistent messenger and chained
/// into instance creation so creation and destruction are covered as well.
pub fn messenger_create_info<'a>() -> vk::DebugUtilsMessengerCreateInfoEXT<'a> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = if callback_data.is_null() || unsafe { (*callback_data).p_message.is_null() } {
        std::borrow::Cow::Borrowed("<no message>")
    } else {
        unsafe { CStr::from_ptr((*callback_data).p_message) }.to_string_lossy()
    };

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!(target: "vkstartup::validation", ?message_type, "{message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!(target: "vkstartup::validation", ?message_type, "{message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        tracing::info!(target: "vkstartup::validation", ?message_type, "{message}");
    } else {
        tracing::trace!(target: "vkstartup::validation", ?message_type, "{message}");
    }

    vk::FALSE
}

/// Debug messenger forwarding validation output to `tracing`.
pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    /// Create the messenger.
    ///
    /// # Safety
    /// The instance must have been created with the debug utils extension
    /// enabled and must outlive the messenger.
    pub unsafe fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let create_info = messenger_create_info();
        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None)? };

        tracing::debug!("Debug messenger created");

        Ok(Self { loader, messenger })
    }

    /// Raw messenger handle.
    pub fn handle(&self) -> vk::DebugUtilsMessengerEXT {
        self.messenger
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_info_covers_warnings_and_errors() {
        let info = messenger_create_info();
        assert!(info
            .message_severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING));
        assert!(info
            .message_severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR));
        assert!(!info
            .message_severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE));
        assert!(info.pfn_user_callback.is_some());
    }

    #[test]
    fn callback_never_aborts_the_call() {
        let message = c"validation message";
        let data = vk::DebugUtilsMessengerCallbackDataEXT::default().message(message);
        let result = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(result, vk::FALSE);

        let result = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
                std::ptr::null(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(result, vk::FALSE);
    }
}
