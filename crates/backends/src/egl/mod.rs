//! EGL provider.
//!
//! Display resolution, first success wins:
//!
//! 1. an explicit DRM node in `ContextAttributes::gpu` (GBM platform with the
//!    `gbm` feature, otherwise the enumerated EGL device with that DRM file);
//!    failure here is terminal;
//! 2. the first device reported by `EGL_EXT_device_enumeration`;
//! 3. `eglGetDisplay(EGL_DEFAULT_DISPLAY)`.
//!
//! libEGL is loaded at runtime, so building this module needs no EGL
//! development files.

#![allow(unsafe_code)]

#[cfg(feature = "gbm")]
mod gbm_target;

use crate::attribs::{self, SurfaceKind};
use khronos_egl as egl;
use offscreen_gl_core::{ContextAttributes, ContextError, ContextInfo, RenderingContext};
use std::ffi::{c_char, c_void, CStr};
use std::ptr;

pub(crate) type EglInstance = egl::DynamicInstance<egl::EGL1_4>;

const LIBRARY_NAMES: &[&str] = &["libEGL.so.1", "libEGL.so"];

type QueryDevicesExt = unsafe extern "system" fn(i32, *mut *mut c_void, *mut i32) -> u32;
type QueryDeviceStringExt = unsafe extern "system" fn(*mut c_void, i32) -> *const c_char;
type GetPlatformDisplayExt = unsafe extern "system" fn(u32, *mut c_void, *const i32) -> *mut c_void;
type GetDisplayDriverName = unsafe extern "system" fn(*mut c_void) -> *const c_char;

/// Loads libEGL and its core 1.4 entry points.
pub(crate) fn load() -> Result<EglInstance, ContextError> {
    let mut failures = Vec::new();
    for name in LIBRARY_NAMES {
        // SAFETY: loading libEGL runs its initializers, which are sound to
        // run on any thread.
        let lib = match unsafe { libloading::Library::new(name) } {
            Ok(lib) => lib,
            Err(e) => {
                failures.push(format!("{name}: {e}"));
                continue;
            }
        };
        // SAFETY: the library is libEGL; symbol signatures come from the
        // khronos-egl bindings.
        match unsafe { EglInstance::load_required_from(lib) } {
            Ok(instance) => {
                log::debug!("loaded {name}");
                return Ok(instance);
            }
            Err(e) => failures.push(format!("{name}: {e}")),
        }
    }
    Err(ContextError::BackendUnavailable(format!(
        "unable to load libEGL ({})",
        failures.join("; ")
    )))
}

/// Maps an EGL error to its registry value.
pub(crate) fn native_code(err: egl::Error) -> Option<i64> {
    #[allow(unreachable_patterns)]
    let code = match err {
        egl::Error::NotInitialized => 0x3001,
        egl::Error::BadAccess => 0x3002,
        egl::Error::BadAlloc => 0x3003,
        egl::Error::BadAttribute => 0x3004,
        egl::Error::BadConfig => 0x3005,
        egl::Error::BadContext => 0x3006,
        egl::Error::BadCurrentSurface => 0x3007,
        egl::Error::BadDisplay => 0x3008,
        egl::Error::BadMatch => 0x3009,
        egl::Error::BadNativePixmap => 0x300A,
        egl::Error::BadNativeWindow => 0x300B,
        egl::Error::BadParameter => 0x300C,
        egl::Error::BadSurface => 0x300D,
        egl::Error::ContextLost => 0x300E,
        _ => return None,
    };
    Some(code)
}

fn split_extensions(list: &CStr) -> Vec<String> {
    list.to_string_lossy()
        .split_whitespace()
        .map(str::to_owned)
        .collect()
}

/// Client extensions (`EGL_EXT_client_extensions`), empty when unsupported.
pub(crate) fn client_extensions(instance: &EglInstance) -> Vec<String> {
    instance
        .query_string(None, egl::EXTENSIONS)
        .map(split_extensions)
        .unwrap_or_default()
}

pub(crate) fn display_extensions(instance: &EglInstance, display: egl::Display) -> Vec<String> {
    instance
        .query_string(Some(display), egl::EXTENSIONS)
        .map(split_extensions)
        .unwrap_or_default()
}

/// A device reported by `EGL_EXT_device_enumeration`.
#[derive(Debug, Clone)]
pub(crate) struct DeviceDescriptor {
    pub(crate) raw: *mut c_void,
    pub(crate) index: usize,
    /// Render node if the driver reports one, else the primary node.
    pub(crate) drm_file: Option<String>,
}

impl DeviceDescriptor {
    pub(crate) fn label(&self) -> String {
        match &self.drm_file {
            Some(file) => format!("EGL device {} ({file})", self.index),
            None => format!("EGL device {}", self.index),
        }
    }
}

/// Lists EGL devices. Empty when the enumeration extension is absent.
pub(crate) fn enumerate_devices(instance: &EglInstance) -> Vec<DeviceDescriptor> {
    let Some(query) = instance.get_proc_address("eglQueryDevicesEXT") else {
        log::debug!("eglQueryDevicesEXT not available");
        return Vec::new();
    };
    // SAFETY: the pointer was returned for this exact name; the signature
    // matches EGL_EXT_device_enumeration.
    let query: QueryDevicesExt = unsafe { std::mem::transmute(query) };

    let mut count = 0;
    // SAFETY: a null device array with max 0 only queries the count.
    if unsafe { query(0, ptr::null_mut(), &mut count) } == 0 || count <= 0 {
        return Vec::new();
    }
    let mut raw = vec![ptr::null_mut(); usize::try_from(count).unwrap_or(0)];
    // SAFETY: `raw` holds `count` slots.
    if unsafe { query(count, raw.as_mut_ptr(), &mut count) } == 0 {
        return Vec::new();
    }
    raw.truncate(usize::try_from(count).unwrap_or(0));

    let query_string = instance
        .get_proc_address("eglQueryDeviceStringEXT")
        // SAFETY: same as above, for EGL_EXT_device_query.
        .map(|f| unsafe { std::mem::transmute::<extern "system" fn(), QueryDeviceStringExt>(f) });

    raw.into_iter()
        .enumerate()
        .map(|(index, device)| {
            let drm_file = query_string.and_then(|f| {
                [attribs::egl::DRM_RENDER_NODE_FILE_EXT, attribs::egl::DRM_DEVICE_FILE_EXT]
                    .into_iter()
                    .find_map(|name| {
                        // SAFETY: `device` came from eglQueryDevicesEXT; a null
                        // return means the name is unsupported.
                        let s = unsafe { f(device, name) };
                        if s.is_null() {
                            None
                        } else {
                            // SAFETY: non-null EGL strings are NUL-terminated
                            // and live as long as the device.
                            Some(unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned())
                        }
                    })
            });
            DeviceDescriptor {
                raw: device,
                index,
                drm_file,
            }
        })
        .collect()
}

/// `eglGetPlatformDisplay`, or the EXT variant on EGL 1.4.
pub(crate) fn platform_display(
    instance: &EglInstance,
    platform: u32,
    native: *mut c_void,
) -> Result<egl::Display, ContextError> {
    if let Some(egl15) = instance.upcast::<egl::EGL1_5>() {
        // SAFETY: `native` is the handle type `platform` expects.
        return unsafe { egl15.get_platform_display(platform, native, &[egl::ATTRIB_NONE]) }
            .map_err(|e| {
                ContextError::device(
                    format!("eglGetPlatformDisplay(0x{platform:X}) failed: {e}"),
                    native_code(e),
                )
            });
    }

    let f = instance
        .get_proc_address("eglGetPlatformDisplayEXT")
        .ok_or_else(|| {
            ContextError::BackendUnavailable("EGL_EXT_platform_base is not supported".into())
        })?;
    // SAFETY: signature from EGL_EXT_platform_base.
    let f: GetPlatformDisplayExt = unsafe { std::mem::transmute(f) };
    let none = [attribs::egl::NONE];
    // SAFETY: `native` is the handle type `platform` expects and the
    // attribute list is terminated.
    let raw = unsafe { f(platform, native, none.as_ptr()) };
    if raw.is_null() {
        let code = instance.get_error().and_then(native_code);
        return Err(ContextError::device(
            format!("eglGetPlatformDisplayEXT(0x{platform:X}) returned no display"),
            code,
        ));
    }
    // SAFETY: non-null display returned by EGL.
    Ok(unsafe { egl::Display::from_ptr(raw) })
}

pub(crate) fn default_display(instance: &EglInstance) -> Result<egl::Display, ContextError> {
    // SAFETY: EGL_DEFAULT_DISPLAY is always a valid argument.
    unsafe { instance.get_display(egl::DEFAULT_DISPLAY) }
        .ok_or_else(|| ContextError::device("no default EGL display", None))
}

/// Picks the display for a pbuffer context. Returns the display and a
/// label for log lines.
fn resolve_display(
    instance: &EglInstance,
    selector: Option<&str>,
) -> Result<(egl::Display, String), ContextError> {
    let devices = enumerate_devices(instance);

    if let Some(selector) = selector {
        let device = devices
            .iter()
            .find(|d| d.drm_file.as_deref() == Some(selector))
            .ok_or_else(|| {
                ContextError::device(
                    format!(
                        "no EGL device matches '{selector}' ({} enumerated)",
                        devices.len()
                    ),
                    None,
                )
            })?;
        let display = platform_display(instance, attribs::egl::PLATFORM_DEVICE_EXT, device.raw)?;
        return Ok((display, device.label()));
    }

    if let Some(device) = devices.first() {
        match platform_display(instance, attribs::egl::PLATFORM_DEVICE_EXT, device.raw) {
            Ok(display) => return Ok((display, device.label())),
            Err(e) => log::warn!("{}: {e}; falling back to the default display", device.label()),
        }
    }

    Ok((default_display(instance)?, "default EGL display".into()))
}

/// `eglGetDisplayDriverName` (EGL_MESA_query_driver).
pub(crate) fn driver_name(instance: &EglInstance, display: egl::Display) -> Option<String> {
    let f = instance.get_proc_address("eglGetDisplayDriverName")?;
    // SAFETY: signature from EGL_MESA_query_driver.
    let f: GetDisplayDriverName = unsafe { std::mem::transmute(f) };
    // SAFETY: `display` is initialized.
    let name = unsafe { f(display.as_ptr()) };
    if name.is_null() {
        return None;
    }
    // SAFETY: non-null, NUL-terminated, owned by the driver.
    Some(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
}

/// Runs the version handshake and logs what the driver reports.
pub(crate) fn initialize(
    instance: &EglInstance,
    display: egl::Display,
    label: &str,
) -> Result<(i32, i32), ContextError> {
    let (major, minor) = instance.initialize(display).map_err(|e| {
        ContextError::device(format!("eglInitialize on {label} failed: {e}"), native_code(e))
    })?;
    log::debug!("EGL {major}.{minor} on {label}");
    if let Ok(vendor) = instance.query_string(Some(display), egl::VENDOR) {
        log::debug!("EGL vendor: {}", vendor.to_string_lossy());
    }
    if let Some(driver) = driver_name(instance, display) {
        log::debug!("EGL driver: {driver}");
    }
    Ok((major, minor))
}

/// Binds the client API, then picks one config for `surface`.
pub(crate) fn choose_config(
    instance: &EglInstance,
    display: egl::Display,
    attrs: &ContextAttributes,
    surface: SurfaceKind,
) -> Result<egl::Config, ContextError> {
    let api = if attrs.gles {
        egl::OPENGL_ES_API
    } else {
        egl::OPENGL_API
    };
    instance.bind_api(api).map_err(|e| {
        ContextError::negotiation(
            format!("eglBindAPI({}) failed: {e}", attrs.api().label()),
            native_code(e),
        )
    })?;

    let list = attribs::egl_config_attribs(attrs, surface);
    let config = instance
        .choose_first_config(display, &list)
        .map_err(|e| ContextError::config(format!("eglChooseConfig failed: {e}"), native_code(e)))?
        .ok_or_else(|| {
            ContextError::config(
                format!(
                    "no EGL config with RGBA8, depth 24, stencil 8, {} conformance \
                     and {surface:?} surfaces",
                    attrs.api().label()
                ),
                None,
            )
        })?;
    if let Ok(id) = instance.get_config_attrib(display, config, egl::CONFIG_ID) {
        log::info!("selected EGL config {id}");
    }
    Ok(config)
}

pub(crate) fn surface_size(attrs: &ContextAttributes) -> Result<(i32, i32), ContextError> {
    let convert = |v: u32| {
        i32::try_from(v).map_err(|_| {
            ContextError::InvalidAttributes(format!("surface dimension {v} exceeds the EGL range"))
        })
    };
    Ok((convert(attrs.width)?, convert(attrs.height)?))
}

/// An EGL display, drawable, and context. Dropping it releases all three.
pub struct EglContext {
    info: ContextInfo,
    display: egl::Display,
    surface: Option<egl::Surface>,
    context: Option<egl::Context>,
    label: String,
    #[cfg(feature = "gbm")]
    gbm: Option<gbm_target::GbmTarget>,
    // Last, so libEGL stays loaded until every handle above is released.
    instance: EglInstance,
}

impl std::fmt::Debug for EglContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EglContext")
            .field("label", &self.label)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl EglContext {
    /// Resolves a display, then builds a pbuffer (or GBM window surface)
    /// and a context with the requested version.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error. Handles acquired before the
    /// failure are released on the way out.
    pub fn create(attrs: &ContextAttributes) -> Result<Self, ContextError> {
        attrs.validate()?;
        let instance = load()?;

        #[cfg(feature = "gbm")]
        {
            if let Some(node) = attrs.gpu_selector() {
                return Self::create_on_gbm(instance, attrs, node);
            }
        }

        let (display, label) = resolve_display(&instance, attrs.gpu_selector())?;
        initialize(&instance, display, &label)?;
        let mut ctx = Self::with_display(instance, display, label, attrs);

        let config = choose_config(&ctx.instance, display, attrs, SurfaceKind::Pbuffer)?;
        let (width, height) = surface_size(attrs)?;
        let surface = ctx
            .instance
            .create_pbuffer_surface(
                display,
                config,
                &[egl::WIDTH, width, egl::HEIGHT, height, egl::NONE],
            )
            .map_err(|e| {
                ContextError::surface(
                    format!("eglCreatePbufferSurface({width}x{height}) failed: {e}"),
                    native_code(e),
                )
            })?;
        ctx.surface = Some(surface);

        ctx.create_context(attrs, config)?;
        log::info!("EGL pbuffer context on {}", ctx.label);
        Ok(ctx)
    }

    /// GBM device -> GBM platform display -> GBM window surface.
    #[cfg(feature = "gbm")]
    fn create_on_gbm(
        instance: EglInstance,
        attrs: &ContextAttributes,
        node: &str,
    ) -> Result<Self, ContextError> {
        let device = gbm_target::open_device(node)?;
        let native = gbm_target::device_ptr(&device);
        let display = match platform_display(&instance, attribs::egl::PLATFORM_GBM_KHR, native) {
            Ok(display) => display,
            Err(e) => {
                log::warn!("{e}; trying eglGetDisplay with the GBM device");
                // SAFETY: Mesa accepts a gbm_device as a native display.
                unsafe { instance.get_display(native as egl::NativeDisplayType) }.ok_or_else(
                    || ContextError::device(format!("no EGL display for GBM device {node}"), None),
                )?
            }
        };
        let label = format!("GBM {node}");
        initialize(&instance, display, &label)?;
        let mut ctx = Self::with_display(instance, display, label, attrs);
        ctx.gbm = Some(gbm_target::GbmTarget::new(device));

        let config = choose_config(&ctx.instance, display, attrs, SurfaceKind::Window)?;
        let window = match ctx.gbm.as_mut() {
            Some(target) => target.create_surface(attrs.width, attrs.height)?,
            None => return Err(ContextError::surface("GBM device was released", None)),
        };

        let surface = match ctx.instance.upcast::<egl::EGL1_5>() {
            // SAFETY: `window` is a live gbm_surface owned by `ctx.gbm`.
            Some(egl15) => unsafe {
                egl15.create_platform_window_surface(display, config, window, &[egl::ATTRIB_NONE])
            },
            // SAFETY: as above; Mesa accepts a gbm_surface as a native window.
            None => unsafe {
                ctx.instance
                    .create_window_surface(display, config, window as egl::NativeWindowType, None)
            },
        }
        .map_err(|e| {
            ContextError::surface(
                format!(
                    "EGL window surface on GBM {}x{} failed: {e}",
                    attrs.width, attrs.height
                ),
                native_code(e),
            )
        })?;
        ctx.surface = Some(surface);

        ctx.create_context(attrs, config)?;
        log::info!("EGL GBM context on {}", ctx.label);
        Ok(ctx)
    }

    fn with_display(
        instance: EglInstance,
        display: egl::Display,
        label: String,
        attrs: &ContextAttributes,
    ) -> Self {
        Self {
            info: ContextInfo::new(attrs.width, attrs.height),
            display,
            surface: None,
            context: None,
            label,
            #[cfg(feature = "gbm")]
            gbm: None,
            instance,
        }
    }

    fn create_context(
        &mut self,
        attrs: &ContextAttributes,
        config: egl::Config,
    ) -> Result<(), ContextError> {
        let list = attribs::egl_context_attribs(attrs);
        let context = self
            .instance
            .create_context(self.display, config, None, &list)
            .map_err(|e| {
                ContextError::negotiation(
                    format!(
                        "eglCreateContext rejected {} {}{}: {e}",
                        attrs.api().label(),
                        attrs.version(),
                        attrs
                            .requested_profile()
                            .map(|p| format!(" {p}"))
                            .unwrap_or_default()
                    ),
                    native_code(e),
                )
            })?;
        self.context = Some(context);
        Ok(())
    }

    /// Label of the resolved display, e.g. `EGL device 0 (/dev/dri/renderD128)`.
    pub fn device_label(&self) -> &str {
        &self.label
    }
}

impl RenderingContext for EglContext {
    fn info(&self) -> &ContextInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ContextInfo {
        &mut self.info
    }

    fn provider(&self) -> &'static str {
        "egl"
    }

    fn is_offscreen(&self) -> bool {
        true
    }

    fn make_current(&mut self) -> Result<(), ContextError> {
        self.info.ensure_live()?;
        self.instance
            .make_current(self.display, self.surface, self.surface, self.context)
            .map_err(|e| {
                ContextError::negotiation(format!("eglMakeCurrent failed: {e}"), native_code(e))
            })?;
        self.info.mark_current();
        Ok(())
    }

    fn release_current(&mut self) -> Result<(), ContextError> {
        self.info.ensure_live()?;
        self.instance
            .make_current(self.display, None, None, None)
            .map_err(|e| {
                let message = format!("eglMakeCurrent(none) failed: {e}");
                ContextError::negotiation(message, native_code(e))
            })?;
        self.info.mark_not_current();
        Ok(())
    }

    fn destroy(&mut self) {
        if !self.info.mark_destroyed() {
            return;
        }
        if let Err(e) = self.instance.make_current(self.display, None, None, None) {
            log::error!("eglMakeCurrent(none) during teardown failed: {e}");
        }
        if let Some(context) = self.context.take() {
            if let Err(e) = self.instance.destroy_context(self.display, context) {
                log::error!("eglDestroyContext failed: {e}");
            }
        }
        if let Some(surface) = self.surface.take() {
            if let Err(e) = self.instance.destroy_surface(self.display, surface) {
                log::error!("eglDestroySurface failed: {e}");
            }
        }
        if let Err(e) = self.instance.terminate(self.display) {
            log::error!("eglTerminate failed: {e}");
        }
        #[cfg(feature = "gbm")]
        {
            self.gbm = None;
        }
        log::debug!("released {}", self.label);
    }

    fn get_proc_address(&self, name: &CStr) -> *const c_void {
        name.to_str()
            .ok()
            .and_then(|name| self.instance.get_proc_address(name))
            .map_or(ptr::null(), |f| f as *const c_void)
    }
}

impl Drop for EglContext {
    fn drop(&mut self) {
        self.destroy();
    }
}
