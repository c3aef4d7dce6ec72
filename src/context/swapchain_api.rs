//! Swapchain creation and the default render target it backs, grounded on
//! `ngfvk_create_swapchain` and the attachment-description-building half of
//! `ngf_create_context` in `original_source/source/ngf-vk/impl.c`.
//!
//! Surface creation itself stays out of scope (see `crate::swapchain`'s
//! module doc) — this module starts from an already-created
//! `VkSurfaceKHR` and negotiates everything downstream of it: present
//! mode, image count, extent, the presentable images' views, the optional
//! eager depth/multisample targets, and the framebuffers the default
//! render target presents through.

use smallvec::smallvec;
use tracing::instrument;

use super::Context;
use crate::error::{GfxError, Result};
use crate::resources::render_target::{AttachmentDesc, AttachmentType, RenderPassCompatKey, RenderTargetInfo};
use crate::resources::{ImageInfo, ImageType, ImageUsage};
use crate::swapchain::{Swapchain, SwapchainImage, SwapchainInfo};

#[cfg(feature = "vulkan")]
use ash::vk;

impl Context {
    /// Creates the presentable swapchain and (re)populates the default
    /// render target to match. Called once from `Engine::create_context`
    /// when `ContextInfo::swapchain` is `Some`; `resize_context` tears this
    /// down and calls it again at a new extent.
    #[cfg(feature = "vulkan")]
    #[instrument(skip(self, info), fields(ctx = self.id))]
    pub(crate) fn create_swapchain(&mut self, info: SwapchainInfo) -> Result<()> {
        let surface = self
            .surface
            .ok_or_else(|| GfxError::invalid_operation("context has no surface to present to"))?;

        let caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, surface)
        }
        .map_err(GfxError::from)?;
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.physical_device, surface)
        }
        .map_err(GfxError::from)?;
        let present_modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.physical_device, surface)
        }
        .map_err(GfxError::from)?;

        if !formats.iter().any(|f| f.format == info.color_format) {
            return Err(GfxError::invalid_format(
                "requested swapchain color format is not supported by this surface",
            ));
        }

        // FIFO is always supported per the Vulkan spec; only upgrade to a
        // lower-latency mode when the caller asked for no vsync and the
        // surface actually offers one.
        let present_mode = if info.present_mode_vsync {
            vk::PresentModeKHR::FIFO
        } else if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
            vk::PresentModeKHR::MAILBOX
        } else if present_modes.contains(&vk::PresentModeKHR::IMMEDIATE) {
            vk::PresentModeKHR::IMMEDIATE
        } else {
            vk::PresentModeKHR::FIFO
        };

        let extent = if caps.current_extent.width != u32::MAX {
            caps.current_extent
        } else {
            vk::Extent2D {
                width: info.width.clamp(caps.min_image_extent.width.max(1), caps.max_image_extent.width),
                height: info.height.clamp(caps.min_image_extent.height.max(1), caps.max_image_extent.height),
            }
        };

        let mut image_count = info.capacity_hint.max(caps.min_image_count);
        if caps.max_image_count > 0 {
            image_count = image_count.min(caps.max_image_count);
        }

        // tear down whatever this context presented through before, if
        // anything (the resize_context path).
        self.destroy_swapchain_objects();

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(info.color_format)
            .image_color_space(vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let loader = ash::extensions::khr::Swapchain::new(&self.instance, &self.device);
        let handle = unsafe { loader.create_swapchain(&create_info, None) }.map_err(GfxError::from)?;
        self.set_swapchain_loader(loader.clone());

        let raw_images = unsafe { loader.get_swapchain_images(handle) }.map_err(GfxError::from)?;

        let mut swapchain_images = Vec::with_capacity(raw_images.len());
        let mut color_image_ids = Vec::with_capacity(raw_images.len());
        for raw_image in &raw_images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(*raw_image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(info.color_format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { self.device.create_image_view(&view_info, None) }.map_err(GfxError::from)?;

            let image = crate::resources::Image {
                info: ImageInfo {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                    layer_count: 1,
                    mip_count: 1,
                    format: info.color_format,
                    sample_count: 1,
                    image_type: ImageType::Image2D,
                    usage: ImageUsage::ATTACHMENT,
                },
                sync_state: crate::sync::SyncState::new_image(vk::ImageLayout::UNDEFINED),
                owns_memory: false,
                handle: *raw_image,
                allocation: None,
            };
            let image_id = self.images.insert(image);
            color_image_ids.push(image_id);
            swapchain_images.push(SwapchainImage { image: image_id, view });
        }

        let mut attachments = smallvec![AttachmentDesc {
            format: info.color_format,
            sample_count: 1,
            attachment_type: AttachmentType::Color,
            is_resolve: false,
        }];

        let depth_image = if let Some(depth_format) = info.depth_format {
            let id = self.create_image(ImageInfo {
                width: extent.width,
                height: extent.height,
                depth: 1,
                layer_count: 1,
                mip_count: 1,
                format: depth_format,
                sample_count: 1,
                image_type: ImageType::Image2D,
                usage: ImageUsage::ATTACHMENT,
            })?;
            attachments.push(AttachmentDesc {
                format: depth_format,
                sample_count: 1,
                attachment_type: AttachmentType::DepthStencil,
                is_resolve: false,
            });
            Some(id)
        } else {
            None
        };

        let msaa_color_image = if let Some(samples) = info.sample_count {
            let id = self.create_image(ImageInfo {
                width: extent.width,
                height: extent.height,
                depth: 1,
                layer_count: 1,
                mip_count: 1,
                format: info.color_format,
                sample_count: samples,
                image_type: ImageType::Image2D,
                usage: ImageUsage::ATTACHMENT,
            })?;
            attachments.push(AttachmentDesc {
                format: info.color_format,
                sample_count: samples,
                attachment_type: AttachmentType::Color,
                is_resolve: true,
            });
            Some(id)
        } else {
            None
        };

        let depth_view = depth_image.map(|id| self.create_attachment_view(id, vk::ImageAspectFlags::DEPTH)).transpose()?;
        let msaa_view = msaa_color_image
            .map(|id| self.create_attachment_view(id, vk::ImageAspectFlags::COLOR))
            .transpose()?;

        let compat_key = RenderPassCompatKey::from_attachments(&attachments);
        let ops: Vec<_> = attachments
            .iter()
            .map(|_| (crate::render_pass_cache::LoadOp::Load, crate::render_pass_cache::StoreOp::Store))
            .collect();
        let ops_key = crate::render_pass_cache::OpsKey::build(&ops);
        let compat_pass = super::encoders::create_render_pass(&self.device, &attachments, ops_key)?;

        let mut framebuffers = Vec::with_capacity(swapchain_images.len());
        for swapchain_image in &swapchain_images {
            let mut views = vec![swapchain_image.view];
            views.extend(depth_view);
            views.extend(msaa_view);
            let fb_info = vk::FramebufferCreateInfo::builder()
                .render_pass(compat_pass)
                .attachments(&views)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let fb = unsafe { self.device.create_framebuffer(&fb_info, None) }.map_err(GfxError::from)?;
            framebuffers.push(fb);
        }
        // the pass built above only exists to validate framebuffer
        // compatibility; the render-pass cache builds (and owns) the real
        // one against the same compat/ops key the first time a pass begins.
        unsafe { self.device.destroy_render_pass(compat_pass, None) };

        let rt = &mut self.render_targets[self.default_render_target];
        rt.info = RenderTargetInfo {
            attachments,
            images: std::iter::once(color_image_ids[0]).chain(depth_image).chain(msaa_color_image).collect(),
            width: extent.width,
            height: extent.height,
        };
        rt.compat_key = compat_key;
        rt.framebuffers = framebuffers;

        self.render_pass_cache.flush_render_target(self.default_render_target);

        self.swapchain = Some(Swapchain {
            info,
            images: swapchain_images,
            depth_image,
            msaa_color_image,
            depth_view,
            msaa_view,
            default_render_target: self.default_render_target,
            current_image_index: None,
            handle,
        });
        Ok(())
    }

    #[cfg(feature = "vulkan")]
    fn create_attachment_view(&self, image: crate::resources::ImageId, aspect: vk::ImageAspectFlags) -> Result<vk::ImageView> {
        let img = self.images.get(image).ok_or_else(|| GfxError::invalid_operation("unknown image"))?;
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(img.handle)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(img.info.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        unsafe { self.device.create_image_view(&view_info, None) }.map_err(GfxError::from)
    }

    /// Destroys the swapchain's presentable-image views, framebuffers,
    /// optional depth/msaa views and images, and the `VkSwapchainKHR`
    /// itself, immediately (not retired — by the time this runs the
    /// context's fences have already been waited on by the caller, either
    /// at `resize_context` or context teardown).
    #[cfg(feature = "vulkan")]
    pub(crate) fn destroy_swapchain_objects(&mut self) {
        let Some(swapchain) = self.swapchain.take() else { return };
        for fb in self.render_targets[self.default_render_target].framebuffers.drain(..) {
            unsafe { self.device.destroy_framebuffer(fb, None) };
        }
        for image in &swapchain.images {
            unsafe { self.device.destroy_image_view(image.view, None) };
            self.images.remove(image.image);
        }
        if let Some(view) = swapchain.depth_view {
            unsafe { self.device.destroy_image_view(view, None) };
        }
        if let Some(view) = swapchain.msaa_view {
            unsafe { self.device.destroy_image_view(view, None) };
        }
        if let Some(id) = swapchain.depth_image {
            let _ = self.destroy_image(id);
        }
        if let Some(id) = swapchain.msaa_color_image {
            let _ = self.destroy_image(id);
        }
        if let Some(loader) = &self.swapchain_loader {
            unsafe { loader.destroy_swapchain(swapchain.handle, None) };
        }
    }

    #[cfg(not(feature = "vulkan"))]
    pub(crate) fn create_swapchain(&mut self, info: SwapchainInfo) -> Result<()> {
        self.destroy_swapchain_objects();
        let image_count = info.capacity_hint.max(1) as usize;
        let mut swapchain_images = Vec::with_capacity(image_count);
        let mut color_image_ids = Vec::with_capacity(image_count);
        for _ in 0..image_count {
            let id = self.create_image(ImageInfo {
                width: info.width,
                height: info.height,
                depth: 1,
                layer_count: 1,
                mip_count: 1,
                sample_count: 1,
                image_type: ImageType::Image2D,
                usage: ImageUsage::ATTACHMENT,
            })?;
            color_image_ids.push(id);
            swapchain_images.push(SwapchainImage { image: id });
        }

        let mut attachments = smallvec![AttachmentDesc { sample_count: 1, attachment_type: AttachmentType::Color, is_resolve: false }];
        let depth_image = if info.depth_format.is_some() {
            let id = self.create_image(ImageInfo {
                width: info.width,
                height: info.height,
                depth: 1,
                layer_count: 1,
                mip_count: 1,
                sample_count: 1,
                image_type: ImageType::Image2D,
                usage: ImageUsage::ATTACHMENT,
            })?;
            attachments.push(AttachmentDesc { sample_count: 1, attachment_type: AttachmentType::DepthStencil, is_resolve: false });
            Some(id)
        } else {
            None
        };
        let msaa_color_image = if let Some(samples) = info.sample_count {
            let id = self.create_image(ImageInfo {
                width: info.width,
                height: info.height,
                depth: 1,
                layer_count: 1,
                mip_count: 1,
                sample_count: samples,
                image_type: ImageType::Image2D,
                usage: ImageUsage::ATTACHMENT,
            })?;
            attachments.push(AttachmentDesc { sample_count: samples, attachment_type: AttachmentType::Color, is_resolve: true });
            Some(id)
        } else {
            None
        };

        let compat_key = RenderPassCompatKey::from_attachments(&attachments);
        let rt = &mut self.render_targets[self.default_render_target];
        rt.info = RenderTargetInfo {
            attachments,
            images: std::iter::once(color_image_ids[0]).chain(depth_image).chain(msaa_color_image).collect(),
            width: info.width,
            height: info.height,
        };
        rt.compat_key = compat_key;

        self.swapchain = Some(Swapchain {
            info,
            images: swapchain_images,
            depth_image,
            msaa_color_image,
            default_render_target: self.default_render_target,
            current_image_index: None,
        });
        Ok(())
    }

    #[cfg(not(feature = "vulkan"))]
    pub(crate) fn destroy_swapchain_objects(&mut self) {
        let Some(swapchain) = self.swapchain.take() else { return };
        for image in &swapchain.images {
            self.images.remove(image.image);
        }
        if let Some(id) = swapchain.depth_image {
            self.images.remove(id);
        }
        if let Some(id) = swapchain.msaa_color_image {
            self.images.remove(id);
        }
    }
}
