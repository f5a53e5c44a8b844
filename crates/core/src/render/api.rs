//! Narrow GL interfaces consumed by the FBO manager and capability table.
//!
//! Function-pointer loading is not this crate's concern: callers load a
//! `glow::Context` from [`RenderingContext::get_proc_address`] and pass it
//! in. Everything here is expressed against two small traits so the FBO
//! and capability rules can run against a recording implementation in
//! tests.
//!
//! [`RenderingContext::get_proc_address`]: crate::context::RenderingContext::get_proc_address

use glow::HasContext as Gl;
use std::num::NonZeroU32;

/// Framebuffer and renderbuffer operations, plus the error query.
///
/// Handles are `NonZeroU32`; `None` stands for the zero name (the default
/// framebuffer, or "no renderbuffer").
pub trait FramebufferApi {
    fn create_framebuffer(&self) -> Result<NonZeroU32, String>;
    fn create_renderbuffer(&self) -> Result<NonZeroU32, String>;
    fn bind_framebuffer(&self, framebuffer: Option<NonZeroU32>);
    fn bind_renderbuffer(&self, renderbuffer: Option<NonZeroU32>);
    fn renderbuffer_storage(&self, internal_format: u32, width: i32, height: i32);
    fn framebuffer_renderbuffer(&self, attachment: u32, renderbuffer: Option<NonZeroU32>);
    fn check_framebuffer_status(&self) -> u32;
    /// Currently bound `GL_FRAMEBUFFER`.
    fn framebuffer_binding(&self) -> Option<NonZeroU32>;
    fn delete_framebuffer(&self, framebuffer: NonZeroU32);
    fn delete_renderbuffer(&self, renderbuffer: NonZeroU32);
    /// Reads RGBA8 pixels from the bound read framebuffer into `out`.
    fn read_rgba(&self, width: i32, height: i32, out: &mut [u8]);
    /// Pops one entry off the GL error queue (`GL_NO_ERROR` when empty).
    fn get_error(&self) -> u32;
}

/// Read-only state queries used to build the capability table.
pub trait GlQuery {
    fn get_string(&self, name: u32) -> String;
    fn get_integer(&self, name: u32) -> i32;
    fn extensions(&self) -> Vec<String>;
}

fn framebuffer_handle(raw: NonZeroU32) -> glow::NativeFramebuffer {
    glow::NativeFramebuffer(raw)
}

fn renderbuffer_handle(raw: NonZeroU32) -> glow::NativeRenderbuffer {
    glow::NativeRenderbuffer(raw)
}

// SAFETY (all impls below): glow wraps raw GL calls as unsafe. Every call
// is made with handles this crate created, on the thread the owning
// context is current on.
#[allow(unsafe_code)]
impl FramebufferApi for glow::Context {
    fn create_framebuffer(&self) -> Result<NonZeroU32, String> {
        unsafe { Gl::create_framebuffer(self).map(|fb| fb.0) }
    }

    fn create_renderbuffer(&self) -> Result<NonZeroU32, String> {
        unsafe { Gl::create_renderbuffer(self).map(|rb| rb.0) }
    }

    fn bind_framebuffer(&self, framebuffer: Option<NonZeroU32>) {
        unsafe {
            Gl::bind_framebuffer(self, glow::FRAMEBUFFER, framebuffer.map(framebuffer_handle))
        }
    }

    fn bind_renderbuffer(&self, renderbuffer: Option<NonZeroU32>) {
        unsafe {
            Gl::bind_renderbuffer(self, glow::RENDERBUFFER, renderbuffer.map(renderbuffer_handle))
        }
    }

    fn renderbuffer_storage(&self, internal_format: u32, width: i32, height: i32) {
        unsafe {
            Gl::renderbuffer_storage(self, glow::RENDERBUFFER, internal_format, width, height)
        }
    }

    fn framebuffer_renderbuffer(&self, attachment: u32, renderbuffer: Option<NonZeroU32>) {
        unsafe {
            Gl::framebuffer_renderbuffer(
                self,
                glow::FRAMEBUFFER,
                attachment,
                glow::RENDERBUFFER,
                renderbuffer.map(renderbuffer_handle),
            )
        }
    }

    fn check_framebuffer_status(&self) -> u32 {
        unsafe { Gl::check_framebuffer_status(self, glow::FRAMEBUFFER) }
    }

    fn framebuffer_binding(&self) -> Option<NonZeroU32> {
        let raw = unsafe { Gl::get_parameter_i32(self, glow::FRAMEBUFFER_BINDING) };
        u32::try_from(raw).ok().and_then(NonZeroU32::new)
    }

    fn delete_framebuffer(&self, framebuffer: NonZeroU32) {
        unsafe { Gl::delete_framebuffer(self, framebuffer_handle(framebuffer)) }
    }

    fn delete_renderbuffer(&self, renderbuffer: NonZeroU32) {
        unsafe { Gl::delete_renderbuffer(self, renderbuffer_handle(renderbuffer)) }
    }

    fn read_rgba(&self, width: i32, height: i32, out: &mut [u8]) {
        unsafe {
            Gl::pixel_store_i32(self, glow::PACK_ALIGNMENT, 1);
            Gl::read_pixels(
                self,
                0,
                0,
                width,
                height,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(Some(out)),
            );
        }
    }

    fn get_error(&self) -> u32 {
        unsafe { Gl::get_error(self) }
    }
}

#[allow(unsafe_code)]
impl GlQuery for glow::Context {
    fn get_string(&self, name: u32) -> String {
        unsafe { Gl::get_parameter_string(self, name) }
    }

    fn get_integer(&self, name: u32) -> i32 {
        unsafe { Gl::get_parameter_i32(self, name) }
    }

    fn extensions(&self) -> Vec<String> {
        Gl::supported_extensions(self).iter().cloned().collect()
    }
}
