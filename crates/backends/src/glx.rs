//! GLX provider: Xlib connection, unmapped window, GLX context.
//!
//! The context comes from `glXCreateContextAttribsARB` when the server
//! advertises `GLX_ARB_create_context`; otherwise, or if that call fails,
//! from `glXCreateNewContext`, which cannot ask for a version.

#![allow(unsafe_code)]

use crate::attribs;
use offscreen_gl_core::{ContextAttributes, ContextError, ContextInfo, RenderingContext};
use std::ffi::{c_int, c_void, CStr};
use std::ptr;
use std::sync::atomic::{AtomicU8, Ordering};
use x11::{glx, xlib};

type CreateContextAttribsArb = unsafe extern "C" fn(
    *mut xlib::Display,
    glx::GLXFBConfig,
    glx::GLXContext,
    xlib::Bool,
    *const c_int,
) -> glx::GLXContext;

/// Last X error code seen by [`record_x_error`]. Zero means none.
static LAST_X_ERROR: AtomicU8 = AtomicU8::new(0);

unsafe extern "C" fn record_x_error(
    _display: *mut xlib::Display,
    event: *mut xlib::XErrorEvent,
) -> c_int {
    if !event.is_null() {
        // SAFETY: Xlib passes a valid event for the duration of the call.
        let code = unsafe { (*event).error_code };
        LAST_X_ERROR.store(code, Ordering::SeqCst);
    }
    0
}

/// Installs [`record_x_error`] for its lifetime and restores the previous
/// handler on drop.
struct ErrorTrap {
    previous: xlib::XErrorHandler,
}

impl ErrorTrap {
    fn install() -> Self {
        LAST_X_ERROR.store(0, Ordering::SeqCst);
        // SAFETY: swapping the process-wide handler; restored in Drop.
        let previous = unsafe { xlib::XSetErrorHandler(Some(record_x_error)) };
        Self { previous }
    }

    /// Flushes outstanding requests and returns the X error they raised.
    fn sync(&self, display: *mut xlib::Display) -> Option<u8> {
        // SAFETY: `display` is an open connection.
        unsafe { xlib::XSync(display, xlib::False) };
        match LAST_X_ERROR.swap(0, Ordering::SeqCst) {
            0 => None,
            code => Some(code),
        }
    }
}

impl Drop for ErrorTrap {
    fn drop(&mut self) {
        // SAFETY: reinstates whatever was there before `install`.
        unsafe { xlib::XSetErrorHandler(self.previous) };
    }
}

/// Calls `XFree` on an Xlib-allocated pointer when dropped.
struct XFreeGuard<T>(*mut T);

impl<T> Drop for XFreeGuard<T> {
    fn drop(&mut self) {
        if !self.0.is_null() {
            // SAFETY: the pointer came from an Xlib/GLX allocator.
            unsafe { xlib::XFree(self.0.cast::<c_void>()) };
        }
    }
}

/// An open Xlib connection, closed on drop.
struct ManagedDisplay {
    raw: *mut xlib::Display,
}

impl ManagedDisplay {
    fn open() -> Result<Self, ContextError> {
        // SAFETY: a null name selects $DISPLAY.
        let raw = unsafe { xlib::XOpenDisplay(ptr::null()) };
        if raw.is_null() {
            return Err(ContextError::device(
                "unable to open X display (is $DISPLAY set?)",
                None,
            ));
        }
        Ok(Self { raw })
    }

    fn error_text(&self, code: u8) -> String {
        let mut buf = [0 as std::ffi::c_char; 128];
        // SAFETY: `buf` length is passed; Xlib NUL-terminates.
        unsafe {
            xlib::XGetErrorText(self.raw, c_int::from(code), buf.as_mut_ptr(), buf.len() as c_int);
            CStr::from_ptr(buf.as_ptr()).to_string_lossy().into_owned()
        }
    }
}

impl Drop for ManagedDisplay {
    fn drop(&mut self) {
        // SAFETY: opened in `open`, closed exactly once here.
        unsafe { xlib::XCloseDisplay(self.raw) };
    }
}

fn has_extension(list: &str, name: &str) -> bool {
    list.split_whitespace().any(|ext| ext == name)
}

/// A GLX context bound to an unmapped X window.
pub struct GlxContext {
    info: ContextInfo,
    context: glx::GLXContext,
    window: xlib::Window,
    colormap: xlib::Colormap,
    // Last: the connection outlives every resource created on it.
    display: ManagedDisplay,
}

impl std::fmt::Debug for GlxContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlxContext")
            .field("window", &self.window)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl GlxContext {
    /// # Errors
    ///
    /// Returns the first failing step's error; earlier X resources are
    /// released before returning.
    pub fn create(attrs: &ContextAttributes) -> Result<Self, ContextError> {
        attrs.validate()?;
        if let Some(gpu) = attrs.gpu_selector() {
            log::warn!("GLX ignores the device selector '{gpu}'; using $DISPLAY");
        }

        let display = ManagedDisplay::open()?;
        let dpy = display.raw;
        // SAFETY: `dpy` is open.
        let screen = unsafe { xlib::XDefaultScreen(dpy) };

        let (mut major, mut minor) = (0, 0);
        // SAFETY: out-pointers are valid.
        if unsafe { glx::glXQueryVersion(dpy, &mut major, &mut minor) } == 0 {
            return Err(ContextError::BackendUnavailable(
                "GLX extension missing on this X server".into(),
            ));
        }
        log::debug!("GLX {major}.{minor}");
        if (major, minor) < (1, 3) {
            return Err(ContextError::BackendUnavailable(format!(
                "GLX {major}.{minor} lacks FBConfig support (1.3 required)"
            )));
        }

        let list = attribs::glx_fbconfig_attribs();
        let mut count = 0;
        // SAFETY: attribute list is terminated; out-pointer is valid.
        let configs =
            XFreeGuard(unsafe { glx::glXChooseFBConfig(dpy, screen, list.as_ptr(), &mut count) });
        if configs.0.is_null() || count <= 0 {
            return Err(ContextError::config(
                "no GLX FBConfig with RGBA8, depth 24, stencil 8",
                None,
            ));
        }
        // SAFETY: `count` > 0 entries.
        let config = unsafe { *configs.0 };

        // SAFETY: `config` belongs to `dpy`.
        let visual = XFreeGuard(unsafe { glx::glXGetVisualFromFBConfig(dpy, config) });
        if visual.0.is_null() {
            return Err(ContextError::config("FBConfig has no X visual", None));
        }
        // SAFETY: non-null XVisualInfo.
        let info = unsafe { &*visual.0 };
        let (vis, depth, visual_id) = (info.visual, info.depth, info.visualid);
        log::info!("selected GLX visual 0x{visual_id:X}");

        let mut ctx = Self {
            info: ContextInfo::new(attrs.width, attrs.height),
            context: ptr::null_mut(),
            window: 0,
            colormap: 0,
            display,
        };
        ctx.create_window(screen, vis, depth, attrs.width, attrs.height)?;

        // SAFETY: `dpy` and `screen` are valid.
        let extensions = unsafe {
            let raw = glx::glXQueryExtensionsString(dpy, screen);
            if raw.is_null() {
                String::new()
            } else {
                CStr::from_ptr(raw).to_string_lossy().into_owned()
            }
        };
        ctx.context = ctx.create_context(attrs, config, &extensions)?;
        log::info!("GLX context on an unmapped {}x{} window", attrs.width, attrs.height);
        Ok(ctx)
    }

    fn create_window(
        &mut self,
        screen: c_int,
        visual: *mut xlib::Visual,
        depth: c_int,
        width: u32,
        height: u32,
    ) -> Result<(), ContextError> {
        let dpy = self.display.raw;
        let trap = ErrorTrap::install();
        // SAFETY: `dpy` is open, `visual` belongs to `screen`. The window is
        // never mapped.
        unsafe {
            let root = xlib::XRootWindow(dpy, screen);
            self.colormap = xlib::XCreateColormap(dpy, root, visual, xlib::AllocNone);
            let mut swa: xlib::XSetWindowAttributes = std::mem::zeroed();
            swa.colormap = self.colormap;
            swa.border_pixel = 0;
            self.window = xlib::XCreateWindow(
                dpy,
                root,
                0,
                0,
                width,
                height,
                0,
                depth,
                xlib::InputOutput as u32,
                visual,
                xlib::CWColormap | xlib::CWBorderPixel,
                &mut swa,
            );
        }
        if let Some(code) = trap.sync(dpy) {
            return Err(ContextError::surface(
                format!(
                    "XCreateWindow({width}x{height}) failed: {}",
                    self.display.error_text(code)
                ),
                Some(i64::from(code)),
            ));
        }
        if self.window == 0 {
            return Err(ContextError::surface("XCreateWindow returned no window", None));
        }
        Ok(())
    }

    fn create_context(
        &self,
        attrs: &ContextAttributes,
        config: glx::GLXFBConfig,
        extensions: &str,
    ) -> Result<glx::GLXContext, ContextError> {
        let dpy = self.display.raw;

        // SAFETY: NUL-terminated name.
        let entry =
            unsafe { glx::glXGetProcAddress(c"glXCreateContextAttribsARB".as_ptr().cast()) };
        match entry {
            Some(f) if has_extension(extensions, "GLX_ARB_create_context") => {
                if attrs.gles && !has_extension(extensions, "GLX_EXT_create_context_es2_profile") {
                    return Err(ContextError::negotiation(
                        "GLES requested but GLX_EXT_create_context_es2_profile is missing",
                        None,
                    ));
                }
                // SAFETY: signature from GLX_ARB_create_context.
                let create: CreateContextAttribsArb = unsafe { std::mem::transmute(f) };
                let list = attribs::arb_context_attribs(attrs);
                let trap = ErrorTrap::install();
                // SAFETY: `config` belongs to `dpy`; list is terminated.
                let context =
                    unsafe { create(dpy, config, ptr::null_mut(), xlib::True, list.as_ptr()) };
                let error = trap.sync(dpy);
                drop(trap);
                match (context.is_null(), error) {
                    (false, None) => return Ok(context),
                    (_, code) => {
                        if !context.is_null() {
                            // SAFETY: created above, not current.
                            unsafe { glx::glXDestroyContext(dpy, context) };
                        }
                        let reason = match code {
                            Some(c) => self.display.error_text(c),
                            None => "no context".to_string(),
                        };
                        if attrs.gles {
                            return Err(ContextError::negotiation(
                                format!(
                                    "glXCreateContextAttribsARB rejected GLES {}: {reason}",
                                    attrs.version()
                                ),
                                code.map(i64::from),
                            ));
                        }
                        log::warn!(
                            "glXCreateContextAttribsARB rejected OpenGL {}: {reason}; \
                             falling back to glXCreateNewContext",
                            attrs.version()
                        );
                    }
                }
            }
            _ => {
                if attrs.gles {
                    return Err(ContextError::BackendUnavailable(
                        "GLES over GLX needs GLX_ARB_create_context".into(),
                    ));
                }
                log::warn!("GLX_ARB_create_context unavailable; using glXCreateNewContext");
            }
        }

        let trap = ErrorTrap::install();
        // SAFETY: `config` belongs to `dpy`.
        let context = unsafe {
            glx::glXCreateNewContext(dpy, config, glx::GLX_RGBA_TYPE, ptr::null_mut(), xlib::True)
        };
        let error = trap.sync(dpy);
        if context.is_null() {
            return Err(ContextError::negotiation(
                "glXCreateNewContext returned no context",
                error.map(i64::from),
            ));
        }
        Ok(context)
    }
}

impl RenderingContext for GlxContext {
    fn info(&self) -> &ContextInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ContextInfo {
        &mut self.info
    }

    fn provider(&self) -> &'static str {
        "glx"
    }

    fn is_offscreen(&self) -> bool {
        true
    }

    fn make_current(&mut self) -> Result<(), ContextError> {
        self.info.ensure_live()?;
        let trap = ErrorTrap::install();
        // SAFETY: window and context belong to this connection.
        let ok = unsafe {
            glx::glXMakeContextCurrent(self.display.raw, self.window, self.window, self.context)
        };
        let error = trap.sync(self.display.raw);
        if ok == 0 || error.is_some() {
            return Err(ContextError::negotiation(
                "glXMakeContextCurrent failed",
                error.map(i64::from),
            ));
        }
        self.info.mark_current();
        Ok(())
    }

    fn release_current(&mut self) -> Result<(), ContextError> {
        self.info.ensure_live()?;
        // SAFETY: releasing with null drawables is always valid.
        let ok = unsafe { glx::glXMakeContextCurrent(self.display.raw, 0, 0, ptr::null_mut()) };
        if ok == 0 {
            return Err(ContextError::negotiation("glXMakeContextCurrent(none) failed", None));
        }
        self.info.mark_not_current();
        Ok(())
    }

    fn destroy(&mut self) {
        if !self.info.mark_destroyed() {
            return;
        }
        let dpy = self.display.raw;
        // SAFETY: each handle is released once and zeroed; the display
        // closes when `self.display` drops.
        unsafe {
            glx::glXMakeContextCurrent(dpy, 0, 0, ptr::null_mut());
            if !self.context.is_null() {
                glx::glXDestroyContext(dpy, self.context);
                self.context = ptr::null_mut();
            }
            if self.window != 0 {
                xlib::XDestroyWindow(dpy, self.window);
                self.window = 0;
            }
            if self.colormap != 0 {
                xlib::XFreeColormap(dpy, self.colormap);
                self.colormap = 0;
            }
            xlib::XSync(dpy, xlib::False);
        }
        log::debug!("released GLX context");
    }

    fn get_proc_address(&self, name: &CStr) -> *const c_void {
        // SAFETY: NUL-terminated name.
        unsafe { glx::glXGetProcAddress(name.as_ptr().cast()) }
            .map_or(ptr::null(), |f| f as *const c_void)
    }
}

impl Drop for GlxContext {
    fn drop(&mut self) {
        self.destroy();
    }
}
