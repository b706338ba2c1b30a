//! Render pass and framebuffer creation.

use std::sync::Arc;

use ash::vk;

use crate::error::{Result, StartupError};
use crate::handle::DeviceHandle;

/// Attachments, subpasses and dependencies describing a render pass.
///
/// Attachment indices referenced by subpasses follow [`Self::attachments`]:
/// color, then resolve, then preserve, then the depth attachment.
#[derive(Default)]
pub struct RenderpassData<'a> {
    pub color_attachments: Vec<vk::AttachmentDescription>,
    pub resolve_attachments: Vec<vk::AttachmentDescription>,
    pub preserve_attachments: Vec<vk::AttachmentDescription>,
    pub depth_attachment: Option<vk::AttachmentDescription>,
    pub subpasses: Vec<vk::SubpassDescription<'a>>,
    pub dependencies: Vec<vk::SubpassDependency>,
}

impl RenderpassData<'_> {
    /// All attachments in index order.
    pub fn attachments(&self) -> Vec<vk::AttachmentDescription> {
        self.color_attachments
            .iter()
            .chain(&self.resolve_attachments)
            .chain(&self.preserve_attachments)
            .chain(self.depth_attachment.as_ref())
            .copied()
            .collect()
    }

    /// Wait for the swapchain image before writing color.
    ///
    /// Not needed when the first subpass waits on TOP_OF_PIPE, but any other
    /// wait stage requires it, so it is added by default.
    pub fn add_implicit_transition_dependency(&mut self) {
        self.dependencies.push(
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
        );
    }

    /// Order depth writes of consecutive frames.
    pub fn add_depth_transition_dependency(&mut self) {
        let fragment_tests = vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        self.dependencies.push(
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(fragment_tests)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_stage_mask(fragment_tests)
                .dst_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE),
        );
    }

    /// Sanity problems worth reporting before creation.
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        if self.color_attachments.is_empty() {
            warnings.push("Renderpass does not contain any color attachments");
        }
        if self.subpasses.is_empty() {
            warnings.push("Renderpass does not contain any subpass descriptions");
        }
        if self
            .subpasses
            .iter()
            .any(|subpass| subpass.color_attachment_count == 0)
        {
            warnings.push("Subpass description does not contain a color attachment");
        }
        warnings
    }
}

/// Create a render pass from `data`.
///
/// The implicit transition dependency is appended when requested, and the
/// depth dependency whenever a depth attachment is present.
///
/// # Safety
/// The device must be valid and every subpass attachment reference must
/// index into `data.attachments()`.
pub unsafe fn create_renderpass(
    device: &Arc<ash::Device>,
    data: &mut RenderpassData<'_>,
    implicit_transition: bool,
) -> Result<DeviceHandle<vk::RenderPass>> {
    if implicit_transition {
        data.add_implicit_transition_dependency();
    }
    if data.depth_attachment.is_some() {
        data.add_depth_transition_dependency();
    }

    if cfg!(debug_assertions) {
        for warning in data.warnings() {
            tracing::warn!("{warning}");
        }
    }

    let attachments = data.attachments();
    let info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&data.subpasses)
        .dependencies(&data.dependencies);

    let render_pass = unsafe { device.create_render_pass(&info, None) }
        .map_err(|e| StartupError::RenderPassCreation(e.to_string()))?;

    Ok(unsafe { DeviceHandle::new(device.clone(), render_pass) })
}

/// A render pass with one framebuffer per swapchain image.
pub struct RenderpassBuffers {
    pub extent: vk::Extent2D,
    // Framebuffers are declared first so they drop before the render pass.
    pub framebuffers: Vec<DeviceHandle<vk::Framebuffer>>,
    pub renderpass: DeviceHandle<vk::RenderPass>,
}

impl RenderpassBuffers {
    /// Create framebuffers for `renderpass`, one per color view. The depth
    /// view, when given, is attached last to every framebuffer.
    ///
    /// # Safety
    /// All handles must be valid and compatible with the render pass.
    pub unsafe fn new(
        device: &Arc<ash::Device>,
        renderpass: DeviceHandle<vk::RenderPass>,
        color_views: &[vk::ImageView],
        depth_view: Option<vk::ImageView>,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let framebuffers = unsafe {
            create_framebuffers(device, renderpass.raw(), color_views, depth_view, extent)?
        };

        Ok(Self {
            extent,
            framebuffers,
            renderpass,
        })
    }

    /// Raw framebuffer for swapchain image `index`.
    pub fn framebuffer(&self, index: usize) -> Option<vk::Framebuffer> {
        self.framebuffers.get(index).map(DeviceHandle::raw)
    }
}

/// Create one framebuffer per color view.
///
/// # Safety
/// All handles must be valid and compatible with `render_pass`.
pub unsafe fn create_framebuffers(
    device: &Arc<ash::Device>,
    render_pass: vk::RenderPass,
    color_views: &[vk::ImageView],
    depth_view: Option<vk::ImageView>,
    extent: vk::Extent2D,
) -> Result<Vec<DeviceHandle<vk::Framebuffer>>> {
    let mut framebuffers = Vec::with_capacity(color_views.len());

    for &view in color_views {
        let attachments: Vec<vk::ImageView> = std::iter::once(view).chain(depth_view).collect();
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.create_framebuffer(&info, None) }
            .map_err(|e| StartupError::RenderPassCreation(format!("framebuffer: {e}")))?;
        framebuffers.push(unsafe { DeviceHandle::new(device.clone(), framebuffer) });
    }

    Ok(framebuffers)
}

/// Single color attachment cleared on load and presented at the end.
pub fn present_color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
}

/// Depth attachment cleared on load and discarded afterwards.
pub fn depth_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
}
