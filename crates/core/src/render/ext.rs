//! `GL_EXT_framebuffer_object` entry points.
//!
//! GL 2.x drivers that only advertise the EXT extension export
//! `glGenFramebuffersEXT` and friends but not the unsuffixed names glow
//! loads, so the FBO manager needs its own function table there. The enum
//! values (`GL_FRAMEBUFFER_EXT`, `GL_RENDERBUFFER_EXT`, the attachment
//! points and status codes) are identical to the core ones.

use super::api::FramebufferApi;
use crate::error::ContextError;
use std::ffi::{c_void, CStr};
use std::num::NonZeroU32;

type GenNames = unsafe extern "system" fn(i32, *mut u32);
type DeleteNames = unsafe extern "system" fn(i32, *const u32);
type BindName = unsafe extern "system" fn(u32, u32);
type RenderbufferStorage = unsafe extern "system" fn(u32, u32, i32, i32);
type FramebufferRenderbuffer = unsafe extern "system" fn(u32, u32, u32, u32);
type CheckStatus = unsafe extern "system" fn(u32) -> u32;
type GetIntegerv = unsafe extern "system" fn(u32, *mut i32);
type ReadPixels = unsafe extern "system" fn(i32, i32, i32, i32, u32, u32, *mut c_void);
type PixelStorei = unsafe extern "system" fn(u32, i32);
type GetError = unsafe extern "system" fn() -> u32;

/// Function table for the EXT framebuffer path, loaded from the context's
/// `get_proc_address`.
#[derive(Debug, Clone, Copy)]
pub struct ExtFramebuffers {
    gen_framebuffers: GenNames,
    delete_framebuffers: DeleteNames,
    bind_framebuffer: BindName,
    gen_renderbuffers: GenNames,
    delete_renderbuffers: DeleteNames,
    bind_renderbuffer: BindName,
    renderbuffer_storage: RenderbufferStorage,
    framebuffer_renderbuffer: FramebufferRenderbuffer,
    check_framebuffer_status: CheckStatus,
    get_integerv: GetIntegerv,
    read_pixels: ReadPixels,
    pixel_storei: PixelStorei,
    get_error: GetError,
}

fn symbol(
    loader: &mut dyn FnMut(&CStr) -> *const c_void,
    name: &CStr,
) -> Result<*const c_void, ContextError> {
    let ptr = loader(name);
    if ptr.is_null() {
        Err(ContextError::BackendUnavailable(format!(
            "{} is not exported by the driver",
            name.to_string_lossy()
        )))
    } else {
        Ok(ptr)
    }
}

impl ExtFramebuffers {
    /// Resolves every entry point through `loader`.
    ///
    /// The context the loader belongs to must be current, and the table is
    /// only valid while that context lives.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` naming the first symbol that resolved
    /// to null.
    #[allow(unsafe_code)]
    pub fn load<F>(mut loader: F) -> Result<Self, ContextError>
    where
        F: FnMut(&CStr) -> *const c_void,
    {
        let loader: &mut dyn FnMut(&CStr) -> *const c_void = &mut loader;
        // SAFETY: each pointer is non-null and was resolved by name, so it
        // has the C signature the registry gives for that name.
        macro_rules! entry {
            ($name:expr) => {
                unsafe { std::mem::transmute::<*const c_void, _>(symbol(loader, $name)?) }
            };
        }
        Ok(Self {
            gen_framebuffers: entry!(c"glGenFramebuffersEXT"),
            delete_framebuffers: entry!(c"glDeleteFramebuffersEXT"),
            bind_framebuffer: entry!(c"glBindFramebufferEXT"),
            gen_renderbuffers: entry!(c"glGenRenderbuffersEXT"),
            delete_renderbuffers: entry!(c"glDeleteRenderbuffersEXT"),
            bind_renderbuffer: entry!(c"glBindRenderbufferEXT"),
            renderbuffer_storage: entry!(c"glRenderbufferStorageEXT"),
            framebuffer_renderbuffer: entry!(c"glFramebufferRenderbufferEXT"),
            check_framebuffer_status: entry!(c"glCheckFramebufferStatusEXT"),
            get_integerv: entry!(c"glGetIntegerv"),
            read_pixels: entry!(c"glReadPixels"),
            pixel_storei: entry!(c"glPixelStorei"),
            get_error: entry!(c"glGetError"),
        })
    }
}

fn raw(handle: Option<NonZeroU32>) -> u32 {
    handle.map_or(0, NonZeroU32::get)
}

// SAFETY (all methods): the table was loaded from the context that is
// current on this thread, and every pointer argument refers to a local
// or to a caller buffer sized for the request.
#[allow(unsafe_code)]
impl FramebufferApi for ExtFramebuffers {
    fn create_framebuffer(&self) -> Result<NonZeroU32, String> {
        let mut name = 0;
        unsafe { (self.gen_framebuffers)(1, &mut name) };
        NonZeroU32::new(name).ok_or_else(|| "glGenFramebuffersEXT returned 0".to_string())
    }

    fn create_renderbuffer(&self) -> Result<NonZeroU32, String> {
        let mut name = 0;
        unsafe { (self.gen_renderbuffers)(1, &mut name) };
        NonZeroU32::new(name).ok_or_else(|| "glGenRenderbuffersEXT returned 0".to_string())
    }

    fn bind_framebuffer(&self, framebuffer: Option<NonZeroU32>) {
        unsafe { (self.bind_framebuffer)(glow::FRAMEBUFFER, raw(framebuffer)) }
    }

    fn bind_renderbuffer(&self, renderbuffer: Option<NonZeroU32>) {
        unsafe { (self.bind_renderbuffer)(glow::RENDERBUFFER, raw(renderbuffer)) }
    }

    fn renderbuffer_storage(&self, internal_format: u32, width: i32, height: i32) {
        unsafe { (self.renderbuffer_storage)(glow::RENDERBUFFER, internal_format, width, height) }
    }

    fn framebuffer_renderbuffer(&self, attachment: u32, renderbuffer: Option<NonZeroU32>) {
        unsafe {
            (self.framebuffer_renderbuffer)(
                glow::FRAMEBUFFER,
                attachment,
                glow::RENDERBUFFER,
                raw(renderbuffer),
            )
        }
    }

    fn check_framebuffer_status(&self) -> u32 {
        unsafe { (self.check_framebuffer_status)(glow::FRAMEBUFFER) }
    }

    fn framebuffer_binding(&self) -> Option<NonZeroU32> {
        let mut value = 0;
        unsafe { (self.get_integerv)(glow::FRAMEBUFFER_BINDING, &mut value) };
        u32::try_from(value).ok().and_then(NonZeroU32::new)
    }

    fn delete_framebuffer(&self, framebuffer: NonZeroU32) {
        let name = framebuffer.get();
        unsafe { (self.delete_framebuffers)(1, &name) }
    }

    fn delete_renderbuffer(&self, renderbuffer: NonZeroU32) {
        let name = renderbuffer.get();
        unsafe { (self.delete_renderbuffers)(1, &name) }
    }

    fn read_rgba(&self, width: i32, height: i32, out: &mut [u8]) {
        let needed = width.max(0) as usize * height.max(0) as usize * 4;
        if out.len() < needed {
            return;
        }
        unsafe {
            (self.pixel_storei)(glow::PACK_ALIGNMENT, 1);
            (self.read_pixels)(
                0,
                0,
                width,
                height,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                out.as_mut_ptr().cast(),
            );
        }
    }

    fn get_error(&self) -> u32 {
        unsafe { (self.get_error)() }
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::render::fbo::Fbo;
    use std::cell::RefCell;

    // A tiny fake driver: one thread-local log of calls plus the bound
    // framebuffer, reachable from plain `extern "system"` functions.
    thread_local! {
        static LOG: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
        static BOUND: RefCell<u32> = const { RefCell::new(0) };
        static NEXT: RefCell<u32> = const { RefCell::new(1) };
    }

    fn log(entry: String) {
        LOG.with(|l| l.borrow_mut().push(entry));
    }

    fn next_name() -> u32 {
        NEXT.with(|n| {
            let name = *n.borrow();
            *n.borrow_mut() += 1;
            name
        })
    }

    extern "system" fn gen_framebuffers(_n: i32, out: *mut u32) {
        let name = next_name();
        unsafe { *out = name };
        log(format!("genfb {name}"));
    }

    extern "system" fn gen_renderbuffers(_n: i32, out: *mut u32) {
        let name = next_name();
        unsafe { *out = name };
        log(format!("genrb {name}"));
    }

    extern "system" fn delete_framebuffers(_n: i32, names: *const u32) {
        log(format!("delfb {}", unsafe { *names }));
    }

    extern "system" fn delete_renderbuffers(_n: i32, names: *const u32) {
        log(format!("delrb {}", unsafe { *names }));
    }

    extern "system" fn bind_framebuffer(_target: u32, name: u32) {
        BOUND.with(|b| *b.borrow_mut() = name);
        log(format!("bindfb {name}"));
    }

    extern "system" fn bind_renderbuffer(_target: u32, name: u32) {
        log(format!("bindrb {name}"));
    }

    extern "system" fn renderbuffer_storage(_target: u32, format: u32, w: i32, h: i32) {
        log(format!("storage 0x{format:X} {w}x{h}"));
    }

    extern "system" fn framebuffer_renderbuffer(_t: u32, attachment: u32, _rt: u32, rb: u32) {
        log(format!("attach 0x{attachment:X} {rb}"));
    }

    extern "system" fn check_status(_target: u32) -> u32 {
        glow::FRAMEBUFFER_COMPLETE
    }

    extern "system" fn get_integerv(_pname: u32, out: *mut i32) {
        let bound = BOUND.with(|b| *b.borrow());
        unsafe { *out = bound as i32 };
    }

    extern "system" fn read_pixels(
        _x: i32,
        _y: i32,
        w: i32,
        h: i32,
        _format: u32,
        _ty: u32,
        _pixels: *mut c_void,
    ) {
        log(format!("read {w}x{h}"));
    }

    extern "system" fn pixel_storei(_pname: u32, _value: i32) {}

    extern "system" fn get_error() -> u32 {
        glow::NO_ERROR
    }

    fn fake_loader(name: &CStr) -> *const c_void {
        let f: usize = match name.to_bytes() {
            b"glGenFramebuffersEXT" => gen_framebuffers as usize,
            b"glDeleteFramebuffersEXT" => delete_framebuffers as usize,
            b"glBindFramebufferEXT" => bind_framebuffer as usize,
            b"glGenRenderbuffersEXT" => gen_renderbuffers as usize,
            b"glDeleteRenderbuffersEXT" => delete_renderbuffers as usize,
            b"glBindRenderbufferEXT" => bind_renderbuffer as usize,
            b"glRenderbufferStorageEXT" => renderbuffer_storage as usize,
            b"glFramebufferRenderbufferEXT" => framebuffer_renderbuffer as usize,
            b"glCheckFramebufferStatusEXT" => check_status as usize,
            b"glGetIntegerv" => get_integerv as usize,
            b"glReadPixels" => read_pixels as usize,
            b"glPixelStorei" => pixel_storei as usize,
            b"glGetError" => get_error as usize,
            _ => 0,
        };
        f as *const c_void
    }

    #[test]
    fn missing_entry_point_is_named() {
        let err = ExtFramebuffers::load(|name| {
            if name == c"glCheckFramebufferStatusEXT" {
                std::ptr::null()
            } else {
                fake_loader(name)
            }
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert!(err.to_string().contains("glCheckFramebufferStatusEXT"), "{err}");
    }

    #[test]
    fn fbo_lifecycle_runs_through_ext_entry_points() {
        let ext = ExtFramebuffers::load(fake_loader).unwrap();
        let mut fbo = Fbo::new(&ext, 8, 4);
        assert!(fbo.is_complete());

        fbo.bind(&ext).unwrap();
        assert_eq!(ext.framebuffer_binding(), fbo.framebuffer());
        assert_eq!(fbo.read_rgba(&ext).unwrap().len(), 8 * 4 * 4);
        fbo.unbind(&ext);
        assert_eq!(ext.framebuffer_binding(), None);
        fbo.destroy(&ext);

        let log = LOG.with(|l| l.borrow().clone());
        assert_eq!(log[0], "genfb 1");
        assert!(log.contains(&format!("storage 0x{:X} 8x4", glow::DEPTH24_STENCIL8)));
        assert!(log.contains(&format!("attach 0x{:X} 3", glow::STENCIL_ATTACHMENT)));
        assert!(log.contains(&"read 8x4".to_string()));
        assert_eq!(log.last().map(String::as_str), Some("delfb 1"));
    }
}
