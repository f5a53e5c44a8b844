//! WGL provider: hidden popup window, device context, WGL context.
//!
//! A legacy `wglCreateContext` context is made current first so
//! `wglCreateContextAttribsARB` can be resolved. When that entry point
//! exists it creates the requested version and the legacy context is
//! deleted; otherwise the legacy context is kept.

#![allow(unsafe_code)]

use crate::attribs;
use offscreen_gl_core::{ContextAttributes, ContextError, ContextInfo, RenderingContext};
use std::ffi::{c_int, c_void, CStr};
use std::ptr;
use winapi::shared::minwindef::{HINSTANCE, HMODULE};
use winapi::shared::windef::{HDC, HGLRC, HWND};
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::libloaderapi::{FreeLibrary, GetModuleHandleA, GetProcAddress, LoadLibraryA};
use winapi::um::wingdi::{
    wglCreateContext, wglDeleteContext, wglGetProcAddress, wglMakeCurrent, ChoosePixelFormat,
    SetPixelFormat, PFD_DOUBLEBUFFER, PFD_DRAW_TO_WINDOW, PFD_MAIN_PLANE, PFD_SUPPORT_OPENGL,
    PFD_TYPE_RGBA, PIXELFORMATDESCRIPTOR,
};
use winapi::um::winuser::{
    CreateWindowExA, DefWindowProcA, DestroyWindow, GetDC, RegisterClassExA, ReleaseDC,
    CS_OWNDC, WNDCLASSEXA, WS_CLIPCHILDREN, WS_CLIPSIBLINGS, WS_POPUP,
};

const CLASS_NAME: &CStr = c"offscreen-gl-wgl";
const ERROR_CLASS_ALREADY_EXISTS: u32 = 1410;

type CreateContextAttribsArb = unsafe extern "system" fn(HDC, HGLRC, *const c_int) -> HGLRC;

fn last_error() -> Option<i64> {
    // SAFETY: reads thread-local error state.
    match unsafe { GetLastError() } {
        0 => None,
        code => Some(i64::from(code)),
    }
}

/// `wglGetProcAddress` reports failure with 0, 1, 2, 3, or -1.
fn is_valid_proc(p: *const c_void) -> bool {
    !matches!(p as isize, -1..=3)
}

fn pixel_format_descriptor() -> PIXELFORMATDESCRIPTOR {
    // SAFETY: PIXELFORMATDESCRIPTOR is plain data; zero is a valid start.
    let mut pfd: PIXELFORMATDESCRIPTOR = unsafe { std::mem::zeroed() };
    pfd.nSize = std::mem::size_of::<PIXELFORMATDESCRIPTOR>() as u16;
    pfd.nVersion = 1;
    pfd.dwFlags = PFD_DRAW_TO_WINDOW | PFD_SUPPORT_OPENGL | PFD_DOUBLEBUFFER;
    pfd.iPixelType = PFD_TYPE_RGBA;
    pfd.cColorBits = 32;
    pfd.cAlphaBits = 8;
    pfd.cDepthBits = 24;
    pfd.cStencilBits = 8;
    pfd.iLayerType = PFD_MAIN_PLANE;
    pfd
}

/// A WGL context on a hidden popup window.
pub struct WglContext {
    info: ContextInfo,
    hwnd: HWND,
    hdc: HDC,
    context: HGLRC,
    opengl32: HMODULE,
}

impl std::fmt::Debug for WglContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WglContext")
            .field("hwnd", &self.hwnd)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl WglContext {
    /// # Errors
    ///
    /// Returns the first failing step's error, with `GetLastError` as the
    /// native code. Everything created before the failure is released.
    pub fn create(attrs: &ContextAttributes) -> Result<Self, ContextError> {
        attrs.validate()?;
        let too_large = |what: &str, value: u32| {
            ContextError::InvalidAttributes(format!("{what} {value} too large"))
        };
        let width = c_int::try_from(attrs.width).map_err(|_| too_large("width", attrs.width))?;
        let height = c_int::try_from(attrs.height).map_err(|_| too_large("height", attrs.height))?;

        // SAFETY: null selects the current module.
        let instance = unsafe { GetModuleHandleA(ptr::null()) };
        register_class(instance)?;

        let mut ctx = Self {
            info: ContextInfo::new(attrs.width, attrs.height),
            hwnd: ptr::null_mut(),
            hdc: ptr::null_mut(),
            context: ptr::null_mut(),
            opengl32: ptr::null_mut(),
        };

        // SAFETY: the class is registered; the window is never shown.
        ctx.hwnd = unsafe {
            CreateWindowExA(
                0,
                CLASS_NAME.as_ptr(),
                c"offscreen-gl".as_ptr(),
                WS_POPUP | WS_CLIPSIBLINGS | WS_CLIPCHILDREN,
                0,
                0,
                width,
                height,
                ptr::null_mut(),
                ptr::null_mut(),
                instance,
                ptr::null_mut(),
            )
        };
        if ctx.hwnd.is_null() {
            return Err(ContextError::surface(
                format!("CreateWindowExA({width}x{height}) failed"),
                last_error(),
            ));
        }
        // SAFETY: `hwnd` is live.
        ctx.hdc = unsafe { GetDC(ctx.hwnd) };
        if ctx.hdc.is_null() {
            return Err(ContextError::surface("GetDC failed", last_error()));
        }

        let pfd = pixel_format_descriptor();
        // SAFETY: `hdc` is live; `pfd` is initialized.
        let format = unsafe { ChoosePixelFormat(ctx.hdc, &pfd) };
        if format == 0 {
            return Err(ContextError::config(
                "no pixel format with RGBA8, depth 24, stencil 8",
                last_error(),
            ));
        }
        // SAFETY: as above.
        if unsafe { SetPixelFormat(ctx.hdc, format, &pfd) } == 0 {
            return Err(ContextError::config(
                format!("SetPixelFormat({format}) failed"),
                last_error(),
            ));
        }
        log::info!("selected WGL pixel format {format}");

        ctx.context = ctx.negotiate(attrs)?;
        // SAFETY: detaches whatever `negotiate` left current.
        unsafe { wglMakeCurrent(ptr::null_mut(), ptr::null_mut()) };

        // SAFETY: NUL-terminated name.
        ctx.opengl32 = unsafe { LoadLibraryA(c"opengl32.dll".as_ptr()) };
        log::info!("WGL context on a hidden {width}x{height} window");
        Ok(ctx)
    }

    fn negotiate(&self, attrs: &ContextAttributes) -> Result<HGLRC, ContextError> {
        // SAFETY: `hdc` has a pixel format.
        let legacy = unsafe { wglCreateContext(self.hdc) };
        if legacy.is_null() {
            return Err(ContextError::negotiation("wglCreateContext failed", last_error()));
        }
        // SAFETY: `legacy` was created for `hdc`.
        if unsafe { wglMakeCurrent(self.hdc, legacy) } == 0 {
            let code = last_error();
            // SAFETY: not current.
            unsafe { wglDeleteContext(legacy) };
            return Err(ContextError::negotiation(
                "wglMakeCurrent on the legacy context failed",
                code,
            ));
        }

        // SAFETY: a context is current, as wglGetProcAddress requires.
        let entry =
            unsafe { wglGetProcAddress(c"wglCreateContextAttribsARB".as_ptr()) } as *const c_void;
        if !is_valid_proc(entry) {
            if attrs.gles {
                // SAFETY: detach, then delete.
                unsafe {
                    wglMakeCurrent(ptr::null_mut(), ptr::null_mut());
                    wglDeleteContext(legacy);
                }
                return Err(ContextError::BackendUnavailable(
                    "GLES over WGL needs WGL_ARB_create_context".into(),
                ));
            }
            log::warn!("wglCreateContextAttribsARB unavailable; keeping the legacy context");
            return Ok(legacy);
        }

        // SAFETY: signature from WGL_ARB_create_context.
        let create: CreateContextAttribsArb = unsafe { std::mem::transmute(entry) };
        let list = attribs::arb_context_attribs(attrs);
        // SAFETY: `hdc` is live; list is terminated.
        let context = unsafe { create(self.hdc, ptr::null_mut(), list.as_ptr()) };
        if context.is_null() {
            let code = last_error();
            if attrs.gles {
                // SAFETY: detach, then delete.
                unsafe {
                    wglMakeCurrent(ptr::null_mut(), ptr::null_mut());
                    wglDeleteContext(legacy);
                }
                return Err(ContextError::negotiation(
                    format!("wglCreateContextAttribsARB rejected GLES {}", attrs.version()),
                    code,
                ));
            }
            log::warn!(
                "wglCreateContextAttribsARB rejected OpenGL {} (error {code:?}); \
                 keeping the legacy context",
                attrs.version()
            );
            return Ok(legacy);
        }

        // SAFETY: detach, then delete the bootstrap context.
        unsafe {
            wglMakeCurrent(ptr::null_mut(), ptr::null_mut());
            wglDeleteContext(legacy);
        }
        Ok(context)
    }
}

fn register_class(instance: HINSTANCE) -> Result<(), ContextError> {
    // SAFETY: WNDCLASSEXA is plain data.
    let mut class: WNDCLASSEXA = unsafe { std::mem::zeroed() };
    class.cbSize = std::mem::size_of::<WNDCLASSEXA>() as u32;
    class.style = CS_OWNDC;
    class.lpfnWndProc = Some(DefWindowProcA);
    class.hInstance = instance;
    class.lpszClassName = CLASS_NAME.as_ptr();
    // SAFETY: `class` is fully initialized.
    if unsafe { RegisterClassExA(&class) } == 0 {
        // SAFETY: reads thread-local error state.
        let code = unsafe { GetLastError() };
        if code != ERROR_CLASS_ALREADY_EXISTS {
            return Err(ContextError::surface("RegisterClassExA failed", Some(i64::from(code))));
        }
    }
    Ok(())
}

impl RenderingContext for WglContext {
    fn info(&self) -> &ContextInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ContextInfo {
        &mut self.info
    }

    fn provider(&self) -> &'static str {
        "wgl"
    }

    fn is_offscreen(&self) -> bool {
        true
    }

    fn make_current(&mut self) -> Result<(), ContextError> {
        self.info.ensure_live()?;
        // SAFETY: `hdc` and `context` belong together.
        if unsafe { wglMakeCurrent(self.hdc, self.context) } == 0 {
            return Err(ContextError::negotiation("wglMakeCurrent failed", last_error()));
        }
        self.info.mark_current();
        Ok(())
    }

    fn release_current(&mut self) -> Result<(), ContextError> {
        self.info.ensure_live()?;
        // SAFETY: null/null detaches the thread's context.
        if unsafe { wglMakeCurrent(ptr::null_mut(), ptr::null_mut()) } == 0 {
            return Err(ContextError::negotiation("wglMakeCurrent(none) failed", last_error()));
        }
        self.info.mark_not_current();
        Ok(())
    }

    fn destroy(&mut self) {
        if !self.info.mark_destroyed() {
            return;
        }
        // SAFETY: each handle is released once, then nulled.
        unsafe {
            wglMakeCurrent(ptr::null_mut(), ptr::null_mut());
            if !self.context.is_null() {
                if wglDeleteContext(self.context) == 0 {
                    log::error!("wglDeleteContext failed: {:?}", last_error());
                }
                self.context = ptr::null_mut();
            }
            if !self.hdc.is_null() {
                ReleaseDC(self.hwnd, self.hdc);
                self.hdc = ptr::null_mut();
            }
            if !self.hwnd.is_null() {
                if DestroyWindow(self.hwnd) == 0 {
                    log::error!("DestroyWindow failed: {:?}", last_error());
                }
                self.hwnd = ptr::null_mut();
            }
            if !self.opengl32.is_null() {
                FreeLibrary(self.opengl32);
                self.opengl32 = ptr::null_mut();
            }
        }
        log::debug!("released WGL context");
    }

    fn get_proc_address(&self, name: &CStr) -> *const c_void {
        // SAFETY: NUL-terminated name; a context is current when the
        // loader calls this.
        let p = unsafe { wglGetProcAddress(name.as_ptr()) } as *const c_void;
        if is_valid_proc(p) {
            return p;
        }
        if self.opengl32.is_null() {
            return ptr::null();
        }
        // SAFETY: GL 1.1 entry points live in opengl32.dll itself.
        unsafe { GetProcAddress(self.opengl32, name.as_ptr()) as *const c_void }
    }
}

impl Drop for WglContext {
    fn drop(&mut self) {
        self.destroy();
    }
}
