//! A cross-platform, explicit GPU abstraction over a single Vulkan-class
//! backend: client code allocates resources, records deferred render
//! passes and compute/transfer work into command buffers, and submits —
//! the automatic synchronization engine in [`sync`] reconstructs the
//! correct hazard graph from that recording, so no call in this crate's
//! public surface ever takes an explicit barrier.
//!
//! Grounded on spec.md §§1-2 and the teacher's crate-root module layout.
//! §6.1 lists the free-function API surface this module re-exposes; each
//! function here does argument/state validation the original expresses as
//! an out-parameter error code and then funnels into [`engine`] and
//! [`Context`]'s methods, which hold the actual logic.

pub mod alloc;
pub mod cmdbuf;
pub mod context;
pub mod engine;
pub mod error;
pub mod frame_token;
pub mod gpu_alloc;
pub mod handle;
pub mod native_binding_map;
pub mod pools;
pub mod reflection;
pub mod render_pass_cache;
pub mod resources;
pub mod retire;
pub mod sync;
pub mod swapchain;

pub use cmdbuf::{IndexType, ResourceBindOp, Scissor, Viewport};
pub use context::{Context, ContextInfo};
pub use engine::{
    create_context, destroy_context, enumerate_devices, finish, initialize, set_context, shutdown,
    ContextHandle, DeviceCapabilities, DeviceInfo, DevicePerformanceTier, DiagnosticCallback,
    DiagnosticLayer, DiagnosticSeverity, DiagnosticsVerbosity, GfxConfig,
};
pub use error::{ErrorKind, GfxError, Result};
pub use frame_token::FrameToken;
pub use resources::*;
pub use swapchain::{Format, Swapchain, SwapchainImage, SwapchainInfo};

use engine::with_current_context;

// ---- Context -----------------------------------------------------------

/// Destroys and recreates the calling thread's current context's swapchain
/// at the given extent (spec.md §6.1 "Context").
pub fn resize_context(width: u32, height: u32) -> Result<()> {
    with_current_context(|ctx| ctx.resize_context(width, height))
}

pub fn default_render_target() -> Result<RenderTargetId> {
    with_current_context(|ctx| Ok(ctx.default_render_target()))
}

pub fn default_render_target_attachment_descs() -> Result<Vec<AttachmentDesc>> {
    with_current_context(|ctx| Ok(ctx.default_render_target_attachment_descs().to_vec()))
}

// ---- Frame --------------------------------------------------------------

pub fn begin_frame() -> Result<FrameToken> {
    with_current_context(Context::begin_frame)
}

/// Validates that `token` matches the calling thread's current context and
/// frame-ring slot, per spec.md §4.C1 ("Mismatches at submit or end-frame
/// are fatal"). Exposed standalone so callers can assert a token is still
/// live without attempting a submit/end-frame first.
pub fn check_token_matches(token: FrameToken) -> Result<()> {
    with_current_context(|ctx| ctx.check_token(token))
}

pub fn end_frame(token: FrameToken, bufs: &[CmdBufferId]) -> Result<()> {
    with_current_context(|ctx| ctx.end_frame(token, bufs))
}

/// Returns the image backing the currently-acquired swapchain image, per
/// spec.md §6.1's `get_current_swapchain_image`.
pub fn get_current_swapchain_image(token: FrameToken) -> Result<ImageId> {
    with_current_context(|ctx| {
        ctx.check_token(token)?;
        let swapchain = ctx
            .swapchain
            .as_ref()
            .ok_or_else(|| GfxError::invalid_operation("context has no swapchain"))?;
        Ok(swapchain.current_image()?.image)
    })
}

// ---- Resources ------------------------------------------------------------

pub fn create_buffer(info: BufferInfo) -> Result<BufferId> {
    with_current_context(|ctx| ctx.create_buffer(info))
}

pub fn destroy_buffer(id: BufferId) -> Result<()> {
    with_current_context(|ctx| ctx.destroy_buffer(id))
}

pub fn buffer_map_range(id: BufferId, offset: u64, range: u64) -> Result<*mut u8> {
    with_current_context(|ctx| ctx.buffer_map_range(id, offset, range))
}

pub fn buffer_flush_range(id: BufferId, offset: u64, range: u64) -> Result<()> {
    with_current_context(|ctx| ctx.buffer_flush_range(id, offset, range))
}

pub fn buffer_unmap(id: BufferId) -> Result<()> {
    with_current_context(|ctx| ctx.buffer_unmap(id))
}

pub fn create_image(info: ImageInfo) -> Result<ImageId> {
    with_current_context(|ctx| ctx.create_image(info))
}

pub fn destroy_image(id: ImageId) -> Result<()> {
    with_current_context(|ctx| ctx.destroy_image(id))
}

pub fn create_image_view(info: ImageView) -> Result<ImageViewId> {
    with_current_context(|ctx| ctx.create_image_view(info))
}

pub fn destroy_image_view(id: ImageViewId) -> Result<()> {
    with_current_context(|ctx| ctx.destroy_image_view(id))
}

pub fn create_texel_buffer_view(info: TexelBufferView) -> Result<TexelBufferViewId> {
    with_current_context(|ctx| ctx.create_texel_buffer_view(info))
}

pub fn destroy_texel_buffer_view(id: TexelBufferViewId) -> Result<()> {
    with_current_context(|ctx| ctx.destroy_texel_buffer_view(id))
}

pub fn create_sampler(info: SamplerInfo) -> Result<SamplerId> {
    with_current_context(|ctx| ctx.create_sampler(info))
}

pub fn destroy_sampler(id: SamplerId) -> Result<()> {
    with_current_context(|ctx| ctx.destroy_sampler(id))
}

#[allow(clippy::too_many_arguments)]
pub fn create_shader_module(
    bytecode: &[u8],
    stage: ShaderStage,
    entry_point: &str,
    bindings: Vec<ReflectedBinding>,
    workgroup_size: Option<(u32, u32, u32)>,
    source_text: Option<&str>,
) -> Result<ShaderModuleId> {
    with_current_context(|ctx| ctx.create_shader_module(bytecode, stage, entry_point, bindings, workgroup_size, source_text))
}

pub fn destroy_shader_module(id: ShaderModuleId) -> Result<()> {
    with_current_context(|ctx| ctx.destroy_shader_module(id))
}

pub fn create_render_target(info: RenderTargetInfo) -> Result<RenderTargetId> {
    with_current_context(|ctx| ctx.create_render_target(info))
}

pub fn destroy_render_target(id: RenderTargetId) -> Result<()> {
    with_current_context(|ctx| ctx.destroy_render_target(id))
}

pub fn create_graphics_pipeline(
    modules: &[ShaderModuleId],
    info: GraphicsPipelineInfo,
    compatible_render_pass: RenderTargetId,
) -> Result<GraphicsPipelineId> {
    with_current_context(|ctx| ctx.create_graphics_pipeline(modules, info, compatible_render_pass))
}

pub fn destroy_graphics_pipeline(id: GraphicsPipelineId) -> Result<()> {
    with_current_context(|ctx| ctx.destroy_graphics_pipeline(id))
}

pub fn create_compute_pipeline(module: ShaderModuleId) -> Result<ComputePipelineId> {
    with_current_context(|ctx| ctx.create_compute_pipeline(module))
}

pub fn destroy_compute_pipeline(id: ComputePipelineId) -> Result<()> {
    with_current_context(|ctx| ctx.destroy_compute_pipeline(id))
}

// ---- Command buffers --------------------------------------------------

pub fn create_cmd_buffer() -> Result<CmdBufferId> {
    with_current_context(|ctx| Ok(ctx.create_cmd_buffer()))
}

pub fn destroy_cmd_buffer(id: CmdBufferId) -> Result<()> {
    with_current_context(|ctx| ctx.destroy_cmd_buffer(id))
}

pub fn start_cmd_buffer(buf: CmdBufferId, token: FrameToken) -> Result<()> {
    with_current_context(|ctx| ctx.start_cmd_buffer(buf, token))
}

pub fn submit_cmd_buffers(token: FrameToken, bufs: &[CmdBufferId]) -> Result<()> {
    with_current_context(|ctx| ctx.submit_cmd_buffers(token, bufs))
}

// ---- Render encoder -----------------------------------------------------

/// Begins a render pass, clearing every attachment for which a clear value
/// is supplied and loading the rest — the "simple" render-pass variant of
/// spec.md §6.1, which folds `cmd_begin_render_pass`'s pass-info argument
/// into direct clear-value parameters.
pub fn cmd_begin_render_pass(
    buf: CmdBufferId,
    render_target: RenderTargetId,
    clear_colors: Vec<[f32; 4]>,
    clear_depth: Option<f32>,
    clear_stencil: Option<u32>,
) -> Result<()> {
    with_current_context(|ctx| ctx.cmd_begin_render_pass(buf, render_target, clear_colors, clear_depth, clear_stencil))
}

pub fn cmd_end_render_pass(buf: CmdBufferId) -> Result<()> {
    with_current_context(|ctx| ctx.cmd_end_render_pass(buf))
}

pub fn bind_gfx_pipeline(buf: CmdBufferId, pipeline: GraphicsPipelineId) -> Result<()> {
    with_current_context(|ctx| ctx.bind_gfx_pipeline(buf, pipeline))
}

pub fn viewport(buf: CmdBufferId, viewport: Viewport) -> Result<()> {
    with_current_context(|ctx| ctx.viewport(buf, viewport))
}

pub fn scissor(buf: CmdBufferId, scissor: Scissor) -> Result<()> {
    with_current_context(|ctx| ctx.scissor(buf, scissor))
}

pub fn stencil_reference(buf: CmdBufferId, value: u32) -> Result<()> {
    with_current_context(|ctx| ctx.stencil_reference(buf, value))
}

pub fn stencil_compare_mask(buf: CmdBufferId, value: u32) -> Result<()> {
    with_current_context(|ctx| ctx.stencil_compare_mask(buf, value))
}

pub fn stencil_write_mask(buf: CmdBufferId, value: u32) -> Result<()> {
    with_current_context(|ctx| ctx.stencil_write_mask(buf, value))
}

pub fn set_depth_bias(buf: CmdBufferId, constant: f32, slope: f32, clamp: f32) -> Result<()> {
    with_current_context(|ctx| ctx.set_depth_bias(buf, constant, slope, clamp))
}

pub fn bind_resources(buf: CmdBufferId, ops: &[ResourceBindOp]) -> Result<()> {
    with_current_context(|ctx| ctx.bind_resources(buf, ops))
}

pub fn bind_attrib_buffer(buf: CmdBufferId, buffer: BufferId, binding: u32, offset: u64) -> Result<()> {
    with_current_context(|ctx| ctx.bind_attrib_buffer(buf, buffer, binding, offset))
}

pub fn bind_index_buffer(buf: CmdBufferId, buffer: BufferId, offset: u64, index_type: IndexType) -> Result<()> {
    with_current_context(|ctx| ctx.bind_index_buffer(buf, buffer, offset, index_type))
}

pub fn draw(buf: CmdBufferId, indexed: bool, first: u32, count: u32, instance_count: u32) -> Result<()> {
    with_current_context(|ctx| ctx.draw(buf, indexed, first, count, instance_count))
}

// ---- Compute encoder ----------------------------------------------------

pub fn cmd_begin_compute_pass(buf: CmdBufferId) -> Result<()> {
    with_current_context(|ctx| ctx.cmd_begin_compute_pass(buf))
}

pub fn cmd_end_compute_pass(buf: CmdBufferId) -> Result<()> {
    with_current_context(|ctx| ctx.cmd_end_compute_pass(buf))
}

pub fn bind_compute_pipeline(buf: CmdBufferId, pipeline: ComputePipelineId) -> Result<()> {
    with_current_context(|ctx| ctx.bind_compute_pipeline(buf, pipeline))
}

pub fn bind_compute_resources(buf: CmdBufferId, ops: &[ResourceBindOp]) -> Result<()> {
    with_current_context(|ctx| ctx.bind_compute_resources(buf, ops))
}

pub fn dispatch(buf: CmdBufferId, x: u32, y: u32, z: u32) -> Result<()> {
    with_current_context(|ctx| ctx.dispatch(buf, x, y, z))
}

// ---- Transfer encoder ---------------------------------------------------

pub fn cmd_begin_xfer_pass(buf: CmdBufferId) -> Result<()> {
    with_current_context(|ctx| ctx.cmd_begin_xfer_pass(buf))
}

pub fn cmd_end_xfer_pass(buf: CmdBufferId) -> Result<()> {
    with_current_context(|ctx| ctx.cmd_end_xfer_pass(buf))
}

#[allow(clippy::too_many_arguments)]
pub fn copy_buffer(buf: CmdBufferId, src: BufferId, dst: BufferId, src_offset: u64, dst_offset: u64, size: u64) -> Result<()> {
    with_current_context(|ctx| ctx.copy_buffer(buf, src, dst, src_offset, dst_offset, size))
}

pub fn copy_image_to_buffer(buf: CmdBufferId, src: ImageId, dst: BufferId, buffer_offset: u64) -> Result<()> {
    with_current_context(|ctx| ctx.copy_image_to_buffer(buf, src, dst, buffer_offset))
}

/// `writes` is `(src_buffer_offset, mip_level, layer)` per region, per
/// spec.md §6.1's `write_image(src_buf, dst_img, writes[])`.
pub fn write_image(buf: CmdBufferId, src: BufferId, dst: ImageId, writes: &[(u64, u32, u32)]) -> Result<()> {
    with_current_context(|ctx| ctx.write_image(buf, src, dst, writes))
}

pub fn cmd_generate_mipmaps(buf: CmdBufferId, image: ImageId) -> Result<()> {
    with_current_context(|ctx| ctx.cmd_generate_mipmaps(buf, image))
}

// ---- Debug ---------------------------------------------------------------

pub fn cmd_begin_debug_group(buf: CmdBufferId, name: &str) -> Result<()> {
    with_current_context(|ctx| ctx.cmd_begin_debug_group(buf, name))
}

pub fn cmd_end_current_debug_group(buf: CmdBufferId) -> Result<()> {
    with_current_context(|ctx| ctx.cmd_end_current_debug_group(buf))
}
