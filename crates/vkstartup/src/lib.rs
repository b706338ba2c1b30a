//! Vulkan start-up for applications that want to get to their first frame.
//!
//! This crate provides:
//! - Instance creation with required/desired extension and layer resolution
//! - Validation layers forwarded to `tracing`
//! - Pluggable physical device selection
//! - Queue family resolution and logical device creation
//! - Window-system agnostic surfaces and per-surface swapchains
//! - Render pass and framebuffer helpers
//! - Memory allocation via gpu-allocator
//!
//! ```no_run
//! use vkstartup::{InitContextOptions, QueueFamily};
//!
//! let context = InitContextOptions::new()
//!     .app_name("My App")
//!     .validation(true)
//!     .build()?;
//! let graphics = context.queue(QueueFamily::Graphics);
//! # Ok::<(), vkstartup::StartupError>(())
//! ```

pub mod context;
pub mod debug;
pub mod device;
pub mod error;
pub mod handle;
pub mod instance;
pub mod memory;
pub mod names;
pub mod physical_device;
pub mod queue;
pub mod renderpass;
pub mod surface;
pub mod swapchain;

pub use context::{InitContext, InitContextOptions, VkContext};
pub use error::{Result, StartupError};
pub use handle::{DeviceHandle, DeviceObject};
pub use memory::{DepthBuffer, GpuImage, MemoryAllocator};
pub use physical_device::{
    DefaultDeviceSelector, DeviceRequirements, DeviceSelector, GpuVendor,
    PhysicalDeviceCandidate, PhysicalDeviceInfo,
};
pub use queue::{QueueFamily, QueueIndexHandle};
pub use renderpass::{create_renderpass, RenderpassBuffers, RenderpassData};
pub use surface::{Surface, SurfaceLoader, WindowSurfaceLoader};
pub use swapchain::{Swapchain, SwapchainFormat, SwapchainSupport};

pub use ash;
pub use gpu_allocator;
