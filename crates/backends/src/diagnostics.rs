//! EGL diagnostic dump.
//!
//! Walks every EGL device (plus the default display and, with the `gbm`
//! feature, a GBM display on a DRM node), lists every config, and tries a
//! throwaway GL 2.0 context on each. Each display is terminated before the
//! next is opened, so run this before creating the real context.

#![allow(unsafe_code)]

use crate::attribs::{self, conformance_names};
use crate::egl::{self as backend, EglInstance};
use khronos_egl as egl;
use offscreen_gl_core::ContextError;
use serde::Serialize;
use std::ffi::{c_char, CStr};

const PROBE_WIDTH: i32 = 640;
const PROBE_HEIGHT: i32 = 480;

const GL_RENDERER: u32 = 0x1F01;
const GL_VERSION: u32 = 0x1F02;

type GetString = unsafe extern "system" fn(u32) -> *const c_char;

#[derive(Debug, Clone, Serialize)]
pub struct EglReport {
    pub client_extensions: Vec<String>,
    pub devices: Vec<DisplayReport>,
    pub default_display: Option<DisplayReport>,
    /// Present when built with `gbm` and a node was given.
    pub gbm: Option<DisplayReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DisplayReport {
    /// Where the display came from, e.g. `EGL device 0` or `GBM /dev/dri/renderD128`.
    pub source: String,
    pub drm_file: Option<String>,
    pub valid: bool,
    pub version: Option<String>,
    pub vendor: Option<String>,
    pub driver: Option<String>,
    pub extensions: Vec<String>,
    pub configs: Vec<ConfigReport>,
    /// Why the display could not be opened or initialized.
    pub error: Option<String>,
}

impl DisplayReport {
    fn failed(source: String, drm_file: Option<String>, err: &ContextError) -> Self {
        Self {
            source,
            drm_file,
            valid: false,
            version: None,
            vendor: None,
            driver: None,
            extensions: Vec::new(),
            configs: Vec::new(),
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigReport {
    pub id: i32,
    pub conformant: Vec<&'static str>,
    pub caveat: &'static str,
    pub pbuffer: bool,
    pub probe: Probe,
}

/// Outcome of the throwaway context attempt on one config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Probe {
    Ok { version: String, renderer: String },
    Failed { error: String },
    /// The config cannot back a pbuffer.
    Skipped,
}

/// Builds the full report. `drm_node` is the GBM node to open when the
/// `gbm` feature is enabled; it is ignored otherwise.
///
/// # Errors
///
/// Returns `BackendUnavailable` only if libEGL itself cannot be loaded.
/// Per-display failures are recorded in the report.
pub fn dump_egl(drm_node: Option<&str>) -> Result<EglReport, ContextError> {
    let instance = backend::load()?;
    let client_extensions = backend::client_extensions(&instance);
    log::debug!("EGL client extensions: {}", client_extensions.join(" "));

    let devices = backend::enumerate_devices(&instance)
        .into_iter()
        .map(|device| {
            let source = device.label();
            let platform = attribs::egl::PLATFORM_DEVICE_EXT;
            match backend::platform_display(&instance, platform, device.raw) {
                Ok(display) => describe(&instance, display, source, device.drm_file),
                Err(e) => DisplayReport::failed(source, device.drm_file, &e),
            }
        })
        .collect();

    let default_display = Some(match backend::default_display(&instance) {
        Ok(display) => describe(&instance, display, "default EGL display".into(), None),
        Err(e) => DisplayReport::failed("default EGL display".into(), None, &e),
    });

    Ok(EglReport {
        client_extensions,
        devices,
        default_display,
        gbm: gbm_section(&instance, drm_node),
    })
}

#[cfg(feature = "gbm")]
fn gbm_section(instance: &EglInstance, drm_node: Option<&str>) -> Option<DisplayReport> {
    use gbm::AsRaw;

    let node = drm_node?;
    let source = format!("GBM {node}");
    let file = match std::fs::OpenOptions::new().read(true).write(true).open(node) {
        Ok(file) => file,
        Err(e) => {
            let code = e.raw_os_error().map(i64::from);
            let err = ContextError::device(format!("unable to open {node}: {e}"), code);
            return Some(DisplayReport::failed(source, Some(node.into()), &err));
        }
    };
    let device = match gbm::Device::new(file) {
        Ok(device) => device,
        Err(e) => {
            let code = e.raw_os_error().map(i64::from);
            let err = ContextError::device(format!("gbm_create_device failed: {e}"), code);
            return Some(DisplayReport::failed(source, Some(node.into()), &err));
        }
    };
    let native = device.as_raw() as *mut std::ffi::c_void;
    let report = match backend::platform_display(instance, attribs::egl::PLATFORM_GBM_KHR, native) {
        Ok(display) => describe(instance, display, source, Some(node.into())),
        Err(e) => DisplayReport::failed(source, Some(node.into()), &e),
    };
    drop(device);
    Some(report)
}

#[cfg(not(feature = "gbm"))]
fn gbm_section(_instance: &EglInstance, _drm_node: Option<&str>) -> Option<DisplayReport> {
    None
}

/// Initializes `display`, collects everything, then terminates it.
fn describe(
    instance: &EglInstance,
    display: egl::Display,
    source: String,
    drm_file: Option<String>,
) -> DisplayReport {
    let (major, minor) = match backend::initialize(instance, display, &source) {
        Ok(version) => version,
        Err(e) => return DisplayReport::failed(source, drm_file, &e),
    };
    let vendor = instance
        .query_string(Some(display), egl::VENDOR)
        .ok()
        .map(|s| s.to_string_lossy().into_owned());
    let report = DisplayReport {
        valid: true,
        version: Some(format!("{major}.{minor}")),
        vendor,
        driver: backend::driver_name(instance, display),
        extensions: backend::display_extensions(instance, display),
        configs: list_configs(instance, display),
        error: None,
        source,
        drm_file,
    };
    if let Err(e) = instance.terminate(display) {
        log::error!("eglTerminate on {} failed: {e}", report.source);
    }
    report
}

fn list_configs(instance: &EglInstance, display: egl::Display) -> Vec<ConfigReport> {
    let count = match instance.get_config_count(display) {
        Ok(count) => count,
        Err(e) => {
            log::warn!("eglGetConfigs count failed: {e}");
            return Vec::new();
        }
    };
    let mut configs = Vec::with_capacity(count);
    if let Err(e) = instance.get_configs(display, &mut configs) {
        log::warn!("eglGetConfigs failed: {e}");
        return Vec::new();
    }

    configs
        .into_iter()
        .map(|config| {
            let attr = |name| instance.get_config_attrib(display, config, name).unwrap_or(0);
            let conformant = attr(egl::CONFORMANT);
            let pbuffer = attr(egl::SURFACE_TYPE) & egl::PBUFFER_BIT != 0;
            let probe = if pbuffer {
                probe(instance, display, config, conformant)
            } else {
                Probe::Skipped
            };
            ConfigReport {
                id: attr(egl::CONFIG_ID),
                conformant: conformance_names(conformant),
                caveat: caveat_name(attr(egl::CONFIG_CAVEAT)),
                pbuffer,
                probe,
            }
        })
        .collect()
}

fn caveat_name(caveat: i32) -> &'static str {
    match caveat {
        egl::NONE => "none",
        egl::SLOW_CONFIG => "slow",
        egl::NON_CONFORMANT_CONFIG => "non-conformant",
        _ => "unknown",
    }
}

/// Desktop GL 2.0 when the config supports it, else GLES 2.0.
fn probe_api(conformant: i32) -> Option<(egl::Enum, Vec<i32>)> {
    if conformant & attribs::egl::OPENGL_BIT != 0 {
        Some((
            egl::OPENGL_API,
            vec![
                attribs::egl::CONTEXT_MAJOR_VERSION,
                2,
                attribs::egl::CONTEXT_MINOR_VERSION,
                0,
                attribs::egl::NONE,
            ],
        ))
    } else if conformant & attribs::egl::OPENGL_ES2_BIT != 0 {
        Some((
            egl::OPENGL_ES_API,
            vec![attribs::egl::CONTEXT_MAJOR_VERSION, 2, attribs::egl::NONE],
        ))
    } else {
        None
    }
}

fn probe(
    instance: &EglInstance,
    display: egl::Display,
    config: egl::Config,
    conformant: i32,
) -> Probe {
    let Some((api, context_attribs)) = probe_api(conformant) else {
        return Probe::Skipped;
    };
    if let Err(e) = instance.bind_api(api) {
        return Probe::Failed {
            error: format!("eglBindAPI: {e}"),
        };
    }
    let surface = match instance.create_pbuffer_surface(
        display,
        config,
        &[egl::WIDTH, PROBE_WIDTH, egl::HEIGHT, PROBE_HEIGHT, egl::NONE],
    ) {
        Ok(surface) => surface,
        Err(e) => {
            return Probe::Failed {
                error: format!("eglCreatePbufferSurface: {e}"),
            }
        }
    };
    let result = match instance.create_context(display, config, None, &context_attribs) {
        Ok(context) => {
            let bound = instance.make_current(display, Some(surface), Some(surface), Some(context));
            let result = match bound {
                Ok(()) => Probe::Ok {
                    version: gl_string(instance, GL_VERSION),
                    renderer: gl_string(instance, GL_RENDERER),
                },
                Err(e) => Probe::Failed {
                    error: format!("eglMakeCurrent: {e}"),
                },
            };
            if let Err(e) = instance.make_current(display, None, None, None) {
                log::error!("eglMakeCurrent(none) failed: {e}");
            }
            if let Err(e) = instance.destroy_context(display, context) {
                log::error!("eglDestroyContext failed: {e}");
            }
            result
        }
        Err(e) => Probe::Failed {
            error: format!("eglCreateContext: {e}"),
        },
    };
    if let Err(e) = instance.destroy_surface(display, surface) {
        log::error!("eglDestroySurface failed: {e}");
    }
    result
}

/// `glGetString` on the current probe context, without a full loader.
fn gl_string(instance: &EglInstance, name: u32) -> String {
    let Some(f) = instance.get_proc_address("glGetString") else {
        return String::new();
    };
    // SAFETY: glGetString's signature; a context is current.
    let f: GetString = unsafe { std::mem::transmute(f) };
    // SAFETY: `name` is a valid glGetString enum.
    let s = unsafe { f(name) };
    if s.is_null() {
        return String::new();
    }
    // SAFETY: non-null GL strings are static and NUL-terminated.
    unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_prefers_desktop_gl() {
        let both = attribs::egl::OPENGL_BIT | attribs::egl::OPENGL_ES2_BIT;
        let (api, list) = probe_api(both).unwrap();
        assert_eq!(api, egl::OPENGL_API);
        assert_eq!(list[1], 2);
        assert_eq!(list[3], 0);
    }

    #[test]
    fn probe_falls_back_to_gles2() {
        let (api, list) = probe_api(attribs::egl::OPENGL_ES2_BIT).unwrap();
        assert_eq!(api, egl::OPENGL_ES_API);
        assert_eq!(list, vec![attribs::egl::CONTEXT_MAJOR_VERSION, 2, attribs::egl::NONE]);
        assert!(probe_api(attribs::egl::OPENGL_ES_BIT).is_none());
    }

    #[test]
    fn caveats_have_names() {
        assert_eq!(caveat_name(egl::NONE), "none");
        assert_eq!(caveat_name(egl::SLOW_CONFIG), "slow");
        assert_eq!(caveat_name(0x1234), "unknown");
    }

    #[test]
    fn probe_serializes_with_status_tag() {
        let ok = Probe::Ok {
            version: "4.6".into(),
            renderer: "llvmpipe".into(),
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["renderer"], "llvmpipe");
        assert_eq!(serde_json::to_value(Probe::Skipped).unwrap()["status"], "skipped");
    }

    #[test]
    fn failed_display_keeps_error_text() {
        let err = ContextError::device("no default EGL display", None);
        let report = DisplayReport::failed("default EGL display".into(), None, &err);
        assert!(!report.valid);
        assert!(report.error.unwrap().contains("no default EGL display"));
    }

    #[test]
    #[ignore = "requires GL driver"]
    fn dump_lists_at_least_one_display() {
        let report = dump_egl(None).unwrap();
        let valid = report
            .devices
            .iter()
            .chain(report.default_display.iter())
            .any(|d| d.valid);
        assert!(valid);
    }
}
