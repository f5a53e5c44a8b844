//! GBM device and window surface for an explicit DRM node.

use gbm::{AsRaw, BufferObjectFlags, Device, Format, Surface};
use offscreen_gl_core::ContextError;
use std::ffi::c_void;
use std::fs::{File, OpenOptions};

/// Opens `path` read/write and wraps it in a GBM device.
pub(super) fn open_device(path: &str) -> Result<Device<File>, ContextError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| {
            ContextError::device(
                format!("unable to open {path}: {e}"),
                e.raw_os_error().map(i64::from),
            )
        })?;
    let device = Device::new(file).map_err(|e| {
        ContextError::device(
            format!("gbm_create_device({path}) failed: {e}"),
            e.raw_os_error().map(i64::from),
        )
    })?;
    log::debug!("GBM backend '{}' on {path}", device.backend_name());
    Ok(device)
}

pub(super) fn device_ptr(device: &Device<File>) -> *mut c_void {
    device.as_raw() as *mut c_void
}

/// Owns the GBM side of a context.
pub(super) struct GbmTarget {
    // Declared first so it drops before the device.
    surface: Option<Surface<()>>,
    device: Device<File>,
}

impl GbmTarget {
    pub(super) fn new(device: Device<File>) -> Self {
        Self {
            surface: None,
            device,
        }
    }

    /// Allocates an ARGB8888 rendering surface and returns its native
    /// handle for `eglCreateWindowSurface`.
    pub(super) fn create_surface(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<*mut c_void, ContextError> {
        let surface = self
            .device
            .create_surface::<()>(width, height, Format::Argb8888, BufferObjectFlags::RENDERING)
            .map_err(|e| {
                ContextError::surface(
                    format!("gbm_surface_create({width}x{height}) failed: {e}"),
                    e.raw_os_error().map(i64::from),
                )
            })?;
        let raw = surface.as_raw() as *mut c_void;
        self.surface = Some(surface);
        Ok(raw)
    }
}
