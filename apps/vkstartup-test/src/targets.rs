//! Render pass, depth buffer and framebuffers for one swapchain.

use anyhow::Context;
use ash::vk;
use vkstartup::memory::{find_depth_format, DepthBuffer};
use vkstartup::renderpass::{depth_attachment, present_color_attachment};
use vkstartup::{create_renderpass, RenderpassBuffers, RenderpassData, VkContext};

/// Everything needed to begin a render pass on a swapchain image.
pub struct RenderTargets {
    buffers: RenderpassBuffers,
    depth: DepthBuffer,
}

impl RenderTargets {
    /// Create targets for the swapchain of `surface_id`.
    pub fn new(context: &VkContext, surface_id: &str) -> anyhow::Result<Self> {
        let swapchain = context
            .swapchain(surface_id)
            .with_context(|| format!("No swapchain for surface '{surface_id}'"))?;
        let allocator = context
            .allocator()
            .context("Render targets need the memory allocator")?;
        let device = context.device();
        let extent = swapchain.extent();

        let depth_format =
            unsafe { find_depth_format(context.instance(), context.physical_device())? };
        let mut depth = allocator.lock().create_depth_buffer(depth_format, extent)?;

        let color_ref = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let mut data = RenderpassData {
            color_attachments: vec![present_color_attachment(
                swapchain.format().surface_format.format,
            )],
            depth_attachment: Some(depth_attachment(depth_format)),
            subpasses: vec![vk::SubpassDescription::default()
                .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                .color_attachments(&color_ref)
                .depth_stencil_attachment(&depth_ref)],
            ..Default::default()
        };

        let created = unsafe { create_renderpass(device, &mut data, true) }.and_then(|renderpass| {
            let views = swapchain.image_views();
            unsafe { RenderpassBuffers::new(device, renderpass, &views, depth.view(), extent) }
        });
        let buffers = match created {
            Ok(buffers) => buffers,
            Err(e) => {
                allocator.lock().free_depth_buffer(&mut depth)?;
                return Err(e.into());
            }
        };

        tracing::info!(
            "Render targets for '{surface_id}': {} framebuffers, {}x{}, depth {:?}",
            buffers.framebuffers.len(),
            extent.width,
            extent.height,
            depth.format()
        );

        Ok(Self { buffers, depth })
    }

    pub fn buffers(&self) -> &RenderpassBuffers {
        &self.buffers
    }

    /// Release the targets. Must run before the context is dropped.
    pub fn destroy(self, context: &VkContext) -> anyhow::Result<()> {
        context.wait_idle()?;
        let Self { buffers, mut depth } = self;
        drop(buffers);
        if let Some(allocator) = context.allocator() {
            allocator.lock().free_depth_buffer(&mut depth)?;
        }
        Ok(())
    }
}
