//! The process-wide engine: the single Vulkan instance and device, the
//! physical-device list, and the table of live contexts. Grounded on
//! `ngf_initialize`/`ngf_get_device_list`/`ngf_create_context`/
//! `ngf_destroy_context` in `original_source/source/ngf-vk/impl.c`.
//!
//! spec.md §9 reframes the original's process-global `_vk` struct plus
//! thread-local `CURRENT_CONTEXT` pointer as "a process-wide `Engine`
//! initialized once at `initialize()`... contexts carry back-references to
//! the engine" and "contexts are owned by the engine; cmd buffers, targets,
//! and other per-context resources are owned by or borrow from the context
//! by ID." The table of contexts below is exactly that: an arena (keyed by
//! a small `u16`, matching `FrameToken`'s `ctx_id` field) rather than the
//! pointer-based ownership the original uses.
//!
//! spec.md §5 "Locking: none. Correct use requires caller discipline" is
//! honored for everything *inside* a context — `Context`'s own methods take
//! `&mut self` and assume single-threaded cooperative use. The context
//! table itself is guarded by a `parking_lot::Mutex`, a deliberate, narrow
//! deviation recorded in DESIGN.md: Rust has no way to hand out a raw
//! pointer into a table and later prove no one else is holding it, so the
//! table needs *some* synchronization to be safely `Send`/`Sync` at all,
//! even though only one thread at a time will ever touch a given context.

use std::cell::Cell;
use std::sync::OnceLock;

use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use crate::context::{Context, ContextInfo};
use crate::error::{GfxError, Result};

#[cfg(feature = "vulkan")]
use ash::vk;
#[cfg(feature = "vulkan")]
use std::ffi::{CStr, CString};

/// Severity classification for the diagnostic callback, spec.md §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    Info,
    Warning,
    Error,
}

/// A user-installable sink for library diagnostics and forwarded
/// vulkan-layer debug-utils messages (spec.md §7).
pub type DiagnosticCallback = Arc<dyn Fn(DiagnosticSeverity, &str) + Send + Sync>;

/// How aggressively the instance asks the backend for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticsVerbosity {
    Default,
    Detailed,
}

/// Configuration passed to [`initialize`].
#[derive(Clone)]
pub struct GfxConfig {
    /// Index into [`enumerate_devices`]'s result; the physical device the
    /// single process-wide logical device is created against.
    pub device_index: usize,
    pub verbosity: DiagnosticsVerbosity,
    pub diagnostic_callback: Option<DiagnosticCallback>,
}

impl Default for GfxConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            verbosity: DiagnosticsVerbosity::Default,
            diagnostic_callback: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePerformanceTier {
    High,
    Low,
    Unknown,
}

/// Subset of a physical device's limits relevant to client-side validation
/// and allocation decisions, mirrored from `ngf_device_capabilities`.
#[derive(Debug, Clone, Copy)]
pub struct DeviceCapabilities {
    pub uniform_buffer_offset_alignment: u64,
    pub storage_buffer_offset_alignment: u64,
    pub max_color_attachments_per_pass: u32,
    pub max_uniform_buffer_range: u32,
    pub max_sampler_anisotropy: f32,
    pub device_local_memory_is_host_visible: bool,
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub vendor_id: u32,
    pub device_id: u32,
    pub performance_tier: DevicePerformanceTier,
    pub capabilities: DeviceCapabilities,
}

/// A live context, identified by the small id packed into every
/// [`crate::frame_token::FrameToken`] issued for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(pub(crate) u16);

struct EngineState {
    #[cfg(feature = "vulkan")]
    entry: ash::Entry,
    #[cfg(feature = "vulkan")]
    instance: ash::Instance,
    #[cfg(feature = "vulkan")]
    debug_utils: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
    #[cfg(feature = "vulkan")]
    physical_device: vk::PhysicalDevice,
    #[cfg(feature = "vulkan")]
    device: ash::Device,
    #[cfg(feature = "vulkan")]
    gpu_alloc: Arc<crate::gpu_alloc::GpuAllocator>,
    #[cfg(feature = "vulkan")]
    surface_loader: ash::extensions::khr::Surface,
    #[cfg(feature = "vulkan")]
    graphics_queue: vk::Queue,
    #[cfg(feature = "vulkan")]
    graphics_queue_family: u32,

    devices: Vec<DeviceInfo>,
    diagnostic_callback: Option<DiagnosticCallback>,

    contexts: Mutex<FnvHashMap<u16, Context>>,
    next_context_id: AtomicU16,

    /// Creation-site backtraces, keyed by context id, captured only under
    /// `track-device-contexts` so a leftover context at `shutdown` can be
    /// blamed on the call site that created it rather than just its id.
    #[cfg(feature = "track-device-contexts")]
    creation_backtraces: Mutex<FnvHashMap<u16, backtrace::Backtrace>>,
}

static ENGINE: OnceLock<EngineState> = OnceLock::new();

thread_local! {
    static CURRENT_CONTEXT: Cell<Option<u16>> = const { Cell::new(None) };
}

fn engine() -> Result<&'static EngineState> {
    ENGINE
        .get()
        .ok_or_else(|| GfxError::invalid_operation("initialize() has not been called"))
}

/// Forwards a message to the user's diagnostic callback, if one was
/// installed at `initialize`. Falls back to `tracing` so the message is
/// still observable when no callback is registered.
pub(crate) fn diagnose(severity: DiagnosticSeverity, message: &str) {
    match ENGINE.get() {
        Some(state) => {
            if let Some(cb) = &state.diagnostic_callback {
                cb(severity, message);
                return;
            }
        }
        None => {}
    }
    match severity {
        DiagnosticSeverity::Info => tracing::info!("{message}"),
        DiagnosticSeverity::Warning => tracing::warn!("{message}"),
        DiagnosticSeverity::Error => tracing::error!("{message}"),
    }
}

/// A `tracing_subscriber::Layer` that forwards `INFO`/`WARN`/`ERROR` events
/// emitted anywhere in this crate into the user's diagnostic callback,
/// spec.md §7 ("A user-installable diagnostic callback..."). Installed by
/// the caller alongside their own subscriber; `initialize` does not install
/// a global subscriber itself — libraries shouldn't reach for that — it
/// only registers the callback `diagnose` forwards into.
pub struct DiagnosticLayer {
    callback: DiagnosticCallback,
}

impl DiagnosticLayer {
    pub fn new(callback: DiagnosticCallback) -> Self {
        Self { callback }
    }
}

impl<S> tracing_subscriber::Layer<S> for DiagnosticLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let severity = match *event.metadata().level() {
            tracing::Level::ERROR => DiagnosticSeverity::Error,
            tracing::Level::WARN => DiagnosticSeverity::Warning,
            tracing::Level::INFO => DiagnosticSeverity::Info,
            _ => return,
        };
        struct MessageVisitor(String);
        impl tracing::field::Visit for MessageVisitor {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.0 = format!("{value:?}");
                }
            }
        }
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        (self.callback)(severity, &visitor.0);
    }
}

/// Enumerates the physical devices available to the backend, creating and
/// immediately discarding a throwaway instance to do so if `initialize`
/// hasn't been called yet — mirroring `ngf_get_device_list`'s ability to
/// run standalone before `ngf_initialize`.
#[cfg(feature = "vulkan")]
pub fn enumerate_devices() -> Result<Vec<DeviceInfo>> {
    if let Some(state) = ENGINE.get() {
        return Ok(state.devices.clone());
    }
    let entry = unsafe { ash::Entry::load() }
        .map_err(|e| GfxError::object_creation_failed(format!("failed to load vulkan: {e}")))?;
    let instance = create_instance(&entry, false)?;
    let devices = collect_device_infos(&instance)?;
    unsafe { instance.destroy_instance(None) };
    Ok(devices)
}

#[cfg(not(feature = "vulkan"))]
pub fn enumerate_devices() -> Result<Vec<DeviceInfo>> {
    Ok(vec![DeviceInfo {
        index: 0,
        name: "software".to_string(),
        vendor_id: 0,
        device_id: 0,
        performance_tier: DevicePerformanceTier::Unknown,
        capabilities: DeviceCapabilities {
            uniform_buffer_offset_alignment: 256,
            storage_buffer_offset_alignment: 256,
            max_color_attachments_per_pass: 8,
            max_uniform_buffer_range: 65536,
            max_sampler_anisotropy: 1.0,
            device_local_memory_is_host_visible: false,
        },
    }])
}

/// Initializes the process-wide engine: creates the vulkan instance,
/// optionally installs a validation debug messenger, picks the physical
/// device at `config.device_index`, finds a queue family supporting both
/// graphics and compute plus presentation, and creates the single logical
/// device and `vk-mem` allocator every context shares. Grounded on
/// `ngf_initialize` through the graphics-queue-family-selection half of
/// `ngf_create_context` (the original creates the logical device as part of
/// context creation; since this core models a single process-wide device
/// per spec.md §9, that step moves here, run once).
///
/// Fatal per spec.md §7 policy if called twice.
#[cfg(feature = "vulkan")]
pub fn initialize(config: GfxConfig) -> Result<()> {
    if ENGINE.get().is_some() {
        return Err(GfxError::invalid_operation(
            "initialize() may only be called once per process",
        ));
    }

    let entry = unsafe { ash::Entry::load() }
        .map_err(|e| GfxError::object_creation_failed(format!("failed to load vulkan: {e}")))?;
    let request_validation = config.verbosity == DiagnosticsVerbosity::Detailed;
    let instance = create_instance(&entry, request_validation)?;

    let debug_utils = if request_validation {
        Some(install_debug_messenger(&entry, &instance)?)
    } else {
        None
    };

    let devices = collect_device_infos(&instance)?;
    let device_info = devices
        .get(config.device_index)
        .ok_or_else(|| GfxError::invalid_operation("device_index out of range"))?
        .clone();

    let physical_devices = unsafe { instance.enumerate_physical_devices() }.map_err(GfxError::from)?;
    let physical_device = *physical_devices
        .iter()
        .find(|pd| {
            let props = unsafe { instance.get_physical_device_properties(**pd) };
            props.vendor_id == device_info.vendor_id && props.device_id == device_info.device_id
        })
        .ok_or_else(|| GfxError::invalid_operation("failed to find a suitable physical device"))?;

    let surface_loader = ash::extensions::khr::Surface::new(&entry, &instance);

    let queue_families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
    let graphics_queue_family = queue_families
        .iter()
        .enumerate()
        .find(|(_, props)| {
            props.queue_flags.contains(vk::QueueFlags::GRAPHICS) && props.queue_flags.contains(vk::QueueFlags::COMPUTE)
        })
        .map(|(idx, _)| idx as u32)
        .ok_or_else(|| GfxError::invalid_operation("no queue family supports graphics and compute"))?;

    let queue_priorities = [1.0f32];
    let queue_create_info = vk::DeviceQueueCreateInfo::builder()
        .queue_family_index(graphics_queue_family)
        .queue_priorities(&queue_priorities);
    let device_extensions = [ash::extensions::khr::Swapchain::name().as_ptr()];
    let device_features = vk::PhysicalDeviceFeatures::builder();
    let device_create_info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(std::slice::from_ref(&queue_create_info))
        .enabled_extension_names(&device_extensions)
        .enabled_features(&device_features);
    let device = unsafe { instance.create_device(physical_device, &device_create_info, None) }.map_err(GfxError::from)?;
    let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };

    let gpu_alloc = Arc::new(crate::gpu_alloc::GpuAllocator::new(&instance, &device, physical_device)?);

    let state = EngineState {
        entry,
        instance,
        debug_utils,
        physical_device,
        device,
        gpu_alloc,
        surface_loader,
        graphics_queue,
        graphics_queue_family,
        devices,
        diagnostic_callback: config.diagnostic_callback,
        contexts: Mutex::new(FnvHashMap::default()),
        next_context_id: AtomicU16::new(0),
        #[cfg(feature = "track-device-contexts")]
        creation_backtraces: Mutex::new(FnvHashMap::default()),
    };

    ENGINE
        .set(state)
        .map_err(|_| GfxError::invalid_operation("initialize() raced with another initialize()"))?;
    diagnose(DiagnosticSeverity::Info, "engine initialized");
    Ok(())
}

#[cfg(not(feature = "vulkan"))]
pub fn initialize(config: GfxConfig) -> Result<()> {
    if ENGINE.get().is_some() {
        return Err(GfxError::invalid_operation(
            "initialize() may only be called once per process",
        ));
    }
    let devices = enumerate_devices()?;
    if config.device_index >= devices.len() {
        return Err(GfxError::invalid_operation("device_index out of range"));
    }
    let state = EngineState {
        devices,
        diagnostic_callback: config.diagnostic_callback,
        contexts: Mutex::new(FnvHashMap::default()),
        next_context_id: AtomicU16::new(0),
        #[cfg(feature = "track-device-contexts")]
        creation_backtraces: Mutex::new(FnvHashMap::default()),
    };
    ENGINE
        .set(state)
        .map_err(|_| GfxError::invalid_operation("initialize() raced with another initialize()"))?;
    diagnose(DiagnosticSeverity::Info, "engine initialized");
    Ok(())
}

/// Destroys every remaining context (fatal-but-continue per spec.md §7
/// "destroy-context-not-destroyed-before-shutdown") and the process-wide
/// device/instance.
///
/// `shutdown` leaks the `OnceLock` slot itself (there is no way to reset a
/// `OnceLock`); a process that calls `initialize` again after `shutdown` is
/// outside what the original supports either (`ngf_initialize` disallows
/// double-initialization for the life of the process).
#[cfg(feature = "vulkan")]
pub fn shutdown() -> Result<()> {
    let state = engine()?;
    unsafe {
        state.device.device_wait_idle().map_err(GfxError::from)?;
    }

    let leftover_ids: Vec<u16> = state.contexts.lock().keys().copied().collect();
    for id in leftover_ids {
        diagnose(DiagnosticSeverity::Error, &leftover_context_message(state, id));
        let _ = destroy_context(ContextHandle(id));
    }

    unsafe {
        if let Some((loader, messenger)) = &state.debug_utils {
            loader.destroy_debug_utils_messenger(*messenger, None);
        }
        state.device.destroy_device(None);
        state.instance.destroy_instance(None);
    }
    diagnose(DiagnosticSeverity::Info, "engine shut down");
    Ok(())
}

#[cfg(not(feature = "vulkan"))]
pub fn shutdown() -> Result<()> {
    let state = engine()?;
    let leftover_ids: Vec<u16> = state.contexts.lock().keys().copied().collect();
    for id in leftover_ids {
        diagnose(DiagnosticSeverity::Error, &leftover_context_message(state, id));
        let _ = destroy_context(ContextHandle(id));
    }
    diagnose(DiagnosticSeverity::Info, "engine shut down");
    Ok(())
}

/// Formats the fatal "destroyed-context-not-destroyed-before-shutdown"
/// diagnostic (spec.md §7), appending the context's creation-site backtrace
/// when `track-device-contexts` is enabled so the leak can be traced back
/// to the call site that created it.
fn leftover_context_message(state: &EngineState, id: u16) -> String {
    #[cfg(feature = "track-device-contexts")]
    {
        match state.creation_backtraces.lock().get(&id) {
            Some(bt) => format!("context {id} was not destroyed before shutdown; created at:\n{bt:?}"),
            None => format!("context {id} was not destroyed before shutdown"),
        }
    }
    #[cfg(not(feature = "track-device-contexts"))]
    {
        let _ = state;
        format!("context {id} was not destroyed before shutdown")
    }
}

/// Creates a new context, optionally with a swapchain, and makes it current
/// on the calling thread (matching the original's `ngf_create_context`
/// always associating the new context with the calling thread).
#[cfg(feature = "vulkan")]
pub fn create_context(info: ContextInfo) -> Result<ContextHandle> {
    let state = engine()?;
    let id = state.next_context_id.fetch_add(1, Ordering::Relaxed);

    let surface = info.swapchain.as_ref().map(|sc| sc.surface);
    let mut ctx = Context::new(
        id,
        &info,
        state.instance.clone(),
        state.physical_device,
        state.device.clone(),
        state.gpu_alloc.clone(),
        state.surface_loader.clone(),
        surface,
        state.graphics_queue,
        state.graphics_queue_family,
    )?;

    if let Some(swapchain_info) = info.swapchain {
        if let Err(e) = ctx.create_swapchain(swapchain_info) {
            // the context never escapes this function; nothing else
            // references its (partially built) resources yet.
            destroy_context_inner(ctx);
            return Err(e);
        }
    }

    state.contexts.lock().insert(id, ctx);
    #[cfg(feature = "track-device-contexts")]
    state.creation_backtraces.lock().insert(id, backtrace::Backtrace::new());
    CURRENT_CONTEXT.with(|c| c.set(Some(id)));
    Ok(ContextHandle(id))
}

#[cfg(not(feature = "vulkan"))]
pub fn create_context(info: ContextInfo) -> Result<ContextHandle> {
    let state = engine()?;
    let id = state.next_context_id.fetch_add(1, Ordering::Relaxed);
    let mut ctx = Context::new(id, &info)?;
    if let Some(swapchain_info) = info.swapchain {
        ctx.create_swapchain(swapchain_info)?;
    }
    state.contexts.lock().insert(id, ctx);
    #[cfg(feature = "track-device-contexts")]
    state.creation_backtraces.lock().insert(id, backtrace::Backtrace::new());
    CURRENT_CONTEXT.with(|c| c.set(Some(id)));
    Ok(ContextHandle(id))
}

/// Binds `handle` as the calling thread's current context, per spec.md §5
/// ("Each thread-local `CURRENT_CONTEXT` pointer binds a context to a
/// thread").
pub fn set_context(handle: ContextHandle) -> Result<()> {
    let state = engine()?;
    if !state.contexts.lock().contains_key(&handle.0) {
        return Err(GfxError::invalid_operation("no such context"));
    }
    CURRENT_CONTEXT.with(|c| c.set(Some(handle.0)));
    Ok(())
}

/// Tears down a context's swapchain and frame-resource semaphores/fences,
/// then drops it from the table. Callers must ensure no work is in flight
/// first (typically by waiting on every frame slot's fence); unlike the
/// original's `ngf_destroy_context`, which blocks internally, here that's
/// left to the caller since a context has no single "idle" fence of its
/// own — `finish()` is provided for exactly this.
#[cfg(feature = "vulkan")]
pub fn destroy_context(handle: ContextHandle) -> Result<()> {
    let state = engine()?;
    let ctx = state
        .contexts
        .lock()
        .remove(&handle.0)
        .ok_or_else(|| GfxError::invalid_operation("no such context"))?;
    destroy_context_inner(ctx);
    #[cfg(feature = "track-device-contexts")]
    state.creation_backtraces.lock().remove(&handle.0);
    CURRENT_CONTEXT.with(|c| {
        if c.get() == Some(handle.0) {
            c.set(None);
        }
    });
    Ok(())
}

#[cfg(feature = "vulkan")]
fn destroy_context_inner(mut ctx: Context) {
    ctx.destroy_swapchain_objects();
    let device = ctx.device.clone();
    for frame in &ctx.frame_resources {
        unsafe {
            device.destroy_semaphore(frame.image_available, None);
            device.destroy_semaphore(frame.render_finished, None);
            device.destroy_fence(frame.in_flight_fence, None);
        }
    }
}

#[cfg(not(feature = "vulkan"))]
pub fn destroy_context(handle: ContextHandle) -> Result<()> {
    let state = engine()?;
    state
        .contexts
        .lock()
        .remove(&handle.0)
        .ok_or_else(|| GfxError::invalid_operation("no such context"))?;
    #[cfg(feature = "track-device-contexts")]
    state.creation_backtraces.lock().remove(&handle.0);
    CURRENT_CONTEXT.with(|c| {
        if c.get() == Some(handle.0) {
            c.set(None);
        }
    });
    Ok(())
}

/// Blocks until the device has finished all outstanding work, per spec.md
/// §5 ("no function suspends except... `finish()`, which calls
/// `vkDeviceWaitIdle`").
#[cfg(feature = "vulkan")]
pub fn finish() -> Result<()> {
    let state = engine()?;
    unsafe { state.device.device_wait_idle().map_err(GfxError::from) }
}

#[cfg(not(feature = "vulkan"))]
pub fn finish() -> Result<()> {
    engine()?;
    Ok(())
}

/// Runs `f` against the calling thread's current context. Every free
/// function in `lib.rs` that operates "on a context" funnels through here.
pub fn with_current_context<F, R>(f: F) -> Result<R>
where
    F: FnOnce(&mut Context) -> Result<R>,
{
    let state = engine()?;
    let id = CURRENT_CONTEXT
        .with(|c| c.get())
        .ok_or_else(|| GfxError::invalid_operation("no context is current on this thread"))?;
    let mut contexts = state.contexts.lock();
    let ctx = contexts
        .get_mut(&id)
        .ok_or_else(|| GfxError::invalid_operation("current context no longer exists"))?;
    f(ctx)
}

#[cfg(feature = "vulkan")]
fn create_instance(entry: &ash::Entry, request_validation: bool) -> Result<ash::Instance> {
    let app_name = CString::new("vgfx").unwrap();
    let engine_name = CString::new("vgfx").unwrap();
    let app_info = vk::ApplicationInfo::builder()
        .application_name(&app_name)
        .engine_name(&engine_name)
        .api_version(vk::API_VERSION_1_1);

    let mut layer_names = Vec::new();
    let validation_layer = CString::new("VK_LAYER_KHRONOS_validation").unwrap();
    let validation_available = request_validation
        && unsafe { entry.enumerate_instance_layer_properties() }
            .map(|layers| {
                layers.iter().any(|l| {
                    let name = unsafe { CStr::from_ptr(l.layer_name.as_ptr()) };
                    name == validation_layer.as_c_str()
                })
            })
            .unwrap_or(false);
    if validation_available {
        layer_names.push(validation_layer.as_ptr());
    }

    let mut extension_names = vec![
        ash::extensions::khr::Surface::name().as_ptr(),
        ash::extensions::ext::DebugUtils::name().as_ptr(),
    ];
    #[cfg(target_os = "windows")]
    extension_names.push(ash::extensions::khr::Win32Surface::name().as_ptr());
    #[cfg(all(unix, not(target_os = "macos")))]
    extension_names.push(ash::extensions::khr::XlibSurface::name().as_ptr());

    let create_info = vk::InstanceCreateInfo::builder()
        .application_info(&app_info)
        .enabled_layer_names(&layer_names)
        .enabled_extension_names(&extension_names);

    unsafe { entry.create_instance(&create_info, None) }.map_err(GfxError::from)
}

#[cfg(feature = "vulkan")]
unsafe extern "system" fn debug_messenger_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = if callback_data.is_null() {
        String::new()
    } else {
        CStr::from_ptr((*callback_data).p_message).to_string_lossy().into_owned()
    };
    let classified = if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        DiagnosticSeverity::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        DiagnosticSeverity::Warning
    } else {
        DiagnosticSeverity::Info
    };
    diagnose(classified, &message);
    vk::FALSE
}

#[cfg(feature = "vulkan")]
fn install_debug_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
) -> Result<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
    let loader = ash::extensions::ext::DebugUtils::new(entry, instance);
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_messenger_callback));
    let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }.map_err(GfxError::from)?;
    Ok((loader, messenger))
}

#[cfg(feature = "vulkan")]
fn collect_device_infos(instance: &ash::Instance) -> Result<Vec<DeviceInfo>> {
    let physical_devices = unsafe { instance.enumerate_physical_devices() }.map_err(GfxError::from)?;
    if physical_devices.is_empty() {
        return Err(GfxError::object_creation_failed("no vulkan physical devices found"));
    }
    Ok(physical_devices
        .iter()
        .enumerate()
        .map(|(index, pd)| {
            let props = unsafe { instance.get_physical_device_properties(*pd) };
            let limits = props.limits;
            let performance_tier = match props.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => DevicePerformanceTier::High,
                vk::PhysicalDeviceType::INTEGRATED_GPU | vk::PhysicalDeviceType::CPU => DevicePerformanceTier::Low,
                _ => DevicePerformanceTier::Unknown,
            };
            let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
                .to_string_lossy()
                .into_owned();
            DeviceInfo {
                index,
                name,
                vendor_id: props.vendor_id,
                device_id: props.device_id,
                performance_tier,
                capabilities: DeviceCapabilities {
                    uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
                    storage_buffer_offset_alignment: limits.min_storage_buffer_offset_alignment,
                    max_color_attachments_per_pass: limits.max_color_attachments,
                    max_uniform_buffer_range: limits.max_uniform_buffer_range,
                    max_sampler_anisotropy: limits.max_sampler_anisotropy,
                    device_local_memory_is_host_visible: false,
                },
            }
        })
        .collect())
}
