//! Startup error types.

use ash::vk;
use thiserror::Error;

use crate::queue::QueueFamily;

/// Errors raised while bootstrapping Vulkan.
#[derive(Error, Debug)]
pub enum StartupError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan loader could not be found or loaded.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// Required instance or device extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Required instance layer not supported.
    #[error("Required layer not supported: {0}")]
    LayerNotSupported(String),

    /// No physical device satisfied the selection criteria.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// The selected device lacks a queue family the context needs.
    #[error("No queue family supports {0:?}")]
    MissingQueueFamily(QueueFamily),

    /// Two surface loaders share the same id.
    #[error("The id: {0} already exists for a surface. Surface ids must be unique")]
    DuplicateSurfaceId(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Render pass or framebuffer creation failed.
    #[error("Failed to create renderpass: {0}")]
    RenderPassCreation(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, StartupError>;
