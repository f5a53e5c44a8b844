//! Attribute lists handed to the native config and context entry points.
//!
//! Kept free of native types so the lists can be checked on any host. The
//! numeric values are the registry constants from the EGL, GLX, and WGL
//! headers.

use offscreen_gl_core::{ContextAttributes, Profile};

/// Which kind of drawable the config must support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// Offscreen pixel buffer with no native window.
    Pbuffer,
    /// Window-backed surface. GBM surfaces need this even though nothing
    /// is ever shown.
    Window,
}

pub mod egl {
    pub const NONE: i32 = 0x3038;
    pub const ALPHA_SIZE: i32 = 0x3021;
    pub const BLUE_SIZE: i32 = 0x3022;
    pub const GREEN_SIZE: i32 = 0x3023;
    pub const RED_SIZE: i32 = 0x3024;
    pub const DEPTH_SIZE: i32 = 0x3025;
    pub const STENCIL_SIZE: i32 = 0x3026;
    pub const CONFIG_CAVEAT: i32 = 0x3027;
    pub const CONFIG_ID: i32 = 0x3028;
    pub const SURFACE_TYPE: i32 = 0x3033;
    pub const RENDERABLE_TYPE: i32 = 0x3040;
    pub const CONFORMANT: i32 = 0x3042;
    pub const WIDTH: i32 = 0x3057;
    pub const HEIGHT: i32 = 0x3056;

    pub const PBUFFER_BIT: i32 = 0x0001;
    pub const WINDOW_BIT: i32 = 0x0004;

    pub const OPENGL_ES_BIT: i32 = 0x0001;
    pub const OPENGL_ES2_BIT: i32 = 0x0004;
    pub const OPENGL_BIT: i32 = 0x0008;
    pub const OPENGL_ES3_BIT: i32 = 0x0040;

    pub const CONTEXT_MAJOR_VERSION: i32 = 0x3098;
    pub const CONTEXT_MINOR_VERSION: i32 = 0x30FB;
    pub const CONTEXT_OPENGL_PROFILE_MASK: i32 = 0x30FD;
    pub const CONTEXT_OPENGL_CORE_PROFILE_BIT: i32 = 0x0001;
    pub const CONTEXT_OPENGL_COMPATIBILITY_PROFILE_BIT: i32 = 0x0002;

    pub const PLATFORM_DEVICE_EXT: u32 = 0x313F;
    pub const PLATFORM_GBM_KHR: u32 = 0x31D7;
    pub const DRM_DEVICE_FILE_EXT: i32 = 0x3233;
    pub const DRM_RENDER_NODE_FILE_EXT: i32 = 0x3377;

    #[cfg(all(
        feature = "egl",
        unix,
        not(any(target_os = "macos", target_os = "ios", target_os = "android"))
    ))]
    const _: () = {
        use khronos_egl as k;
        assert!(NONE == k::NONE);
        assert!(ALPHA_SIZE == k::ALPHA_SIZE);
        assert!(BLUE_SIZE == k::BLUE_SIZE);
        assert!(GREEN_SIZE == k::GREEN_SIZE);
        assert!(RED_SIZE == k::RED_SIZE);
        assert!(DEPTH_SIZE == k::DEPTH_SIZE);
        assert!(STENCIL_SIZE == k::STENCIL_SIZE);
        assert!(CONFIG_CAVEAT == k::CONFIG_CAVEAT);
        assert!(CONFIG_ID == k::CONFIG_ID);
        assert!(SURFACE_TYPE == k::SURFACE_TYPE);
        assert!(RENDERABLE_TYPE == k::RENDERABLE_TYPE);
        assert!(CONFORMANT == k::CONFORMANT);
        assert!(WIDTH == k::WIDTH);
        assert!(HEIGHT == k::HEIGHT);
        assert!(PBUFFER_BIT == k::PBUFFER_BIT);
        assert!(WINDOW_BIT == k::WINDOW_BIT);
        assert!(OPENGL_ES_BIT == k::OPENGL_ES_BIT);
        assert!(OPENGL_ES2_BIT == k::OPENGL_ES2_BIT);
        assert!(OPENGL_BIT == k::OPENGL_BIT);
    };
}

/// Constants shared by `GLX_ARB_create_context` and `WGL_ARB_create_context`;
/// both extensions use the same values.
pub mod arb {
    pub const CONTEXT_MAJOR_VERSION: i32 = 0x2091;
    pub const CONTEXT_MINOR_VERSION: i32 = 0x2092;
    pub const CONTEXT_PROFILE_MASK: i32 = 0x9126;
    pub const CONTEXT_CORE_PROFILE_BIT: i32 = 0x0001;
    pub const CONTEXT_COMPATIBILITY_PROFILE_BIT: i32 = 0x0002;
    pub const CONTEXT_ES2_PROFILE_BIT: i32 = 0x0004;
}

pub mod glx {
    pub const NONE: i32 = 0;
    pub const DOUBLEBUFFER: i32 = 5;
    pub const RED_SIZE: i32 = 8;
    pub const GREEN_SIZE: i32 = 9;
    pub const BLUE_SIZE: i32 = 10;
    pub const ALPHA_SIZE: i32 = 11;
    pub const DEPTH_SIZE: i32 = 12;
    pub const STENCIL_SIZE: i32 = 13;
    pub const DRAWABLE_TYPE: i32 = 0x8010;
    pub const RENDER_TYPE: i32 = 0x8011;
    pub const WINDOW_BIT: i32 = 0x0001;
    pub const PIXMAP_BIT: i32 = 0x0002;
    pub const PBUFFER_BIT: i32 = 0x0004;
    pub const RGBA_BIT: i32 = 0x0001;

    #[cfg(all(
        feature = "glx",
        unix,
        not(any(target_os = "macos", target_os = "ios", target_os = "android"))
    ))]
    const _: () = {
        use x11::glx as x;
        assert!(DOUBLEBUFFER == x::GLX_DOUBLEBUFFER);
        assert!(RED_SIZE == x::GLX_RED_SIZE);
        assert!(GREEN_SIZE == x::GLX_GREEN_SIZE);
        assert!(BLUE_SIZE == x::GLX_BLUE_SIZE);
        assert!(ALPHA_SIZE == x::GLX_ALPHA_SIZE);
        assert!(DEPTH_SIZE == x::GLX_DEPTH_SIZE);
        assert!(STENCIL_SIZE == x::GLX_STENCIL_SIZE);
        assert!(DRAWABLE_TYPE == x::GLX_DRAWABLE_TYPE);
        assert!(RENDER_TYPE == x::GLX_RENDER_TYPE);
        assert!(WINDOW_BIT == x::GLX_WINDOW_BIT);
        assert!(PIXMAP_BIT == x::GLX_PIXMAP_BIT);
        assert!(PBUFFER_BIT == x::GLX_PBUFFER_BIT);
        assert!(RGBA_BIT == x::GLX_RGBA_BIT);
    };
}

/// EGL conformance bit for the requested API. GLES picks ES1/ES2/ES3 by
/// major version.
pub fn egl_conformance_bit(attrs: &ContextAttributes) -> i32 {
    if !attrs.gles {
        return egl::OPENGL_BIT;
    }
    match attrs.major {
        0 | 1 => egl::OPENGL_ES_BIT,
        2 => egl::OPENGL_ES2_BIT,
        _ => egl::OPENGL_ES3_BIT,
    }
}

/// RGBA8, depth 24, stencil 8, the API conformance bit, and the surface
/// type. `None`-terminated.
pub fn egl_config_attribs(attrs: &ContextAttributes, surface: SurfaceKind) -> Vec<i32> {
    let api = egl_conformance_bit(attrs);
    let surface_bit = match surface {
        SurfaceKind::Pbuffer => egl::PBUFFER_BIT,
        SurfaceKind::Window => egl::WINDOW_BIT,
    };
    vec![
        egl::SURFACE_TYPE,
        surface_bit,
        egl::RED_SIZE,
        8,
        egl::GREEN_SIZE,
        8,
        egl::BLUE_SIZE,
        8,
        egl::ALPHA_SIZE,
        8,
        egl::DEPTH_SIZE,
        24,
        egl::STENCIL_SIZE,
        8,
        egl::CONFORMANT,
        api,
        egl::RENDERABLE_TYPE,
        api,
        egl::CONFIG_CAVEAT,
        egl::NONE,
        egl::NONE,
    ]
}

/// Major/minor version, plus a profile mask for desktop GL only.
pub fn egl_context_attribs(attrs: &ContextAttributes) -> Vec<i32> {
    let mut list = vec![
        egl::CONTEXT_MAJOR_VERSION,
        clamp(attrs.major),
        egl::CONTEXT_MINOR_VERSION,
        clamp(attrs.minor),
    ];
    if let Some(profile) = attrs.requested_profile() {
        list.push(egl::CONTEXT_OPENGL_PROFILE_MASK);
        list.push(match profile {
            Profile::Core => egl::CONTEXT_OPENGL_CORE_PROFILE_BIT,
            Profile::Compatibility => egl::CONTEXT_OPENGL_COMPATIBILITY_PROFILE_BIT,
        });
    }
    list.push(egl::NONE);
    list
}

/// `glXChooseFBConfig` attributes. The config supports window, pixmap,
/// and pbuffer drawables so one choice serves every GLX drawable type.
pub fn glx_fbconfig_attribs() -> Vec<i32> {
    vec![
        glx::DRAWABLE_TYPE,
        glx::WINDOW_BIT | glx::PIXMAP_BIT | glx::PBUFFER_BIT,
        glx::RENDER_TYPE,
        glx::RGBA_BIT,
        glx::RED_SIZE,
        8,
        glx::GREEN_SIZE,
        8,
        glx::BLUE_SIZE,
        8,
        glx::ALPHA_SIZE,
        8,
        glx::DEPTH_SIZE,
        24,
        glx::STENCIL_SIZE,
        8,
        glx::DOUBLEBUFFER,
        1,
        glx::NONE,
    ]
}

/// Attributes for `glXCreateContextAttribsARB` / `wglCreateContextAttribsARB`.
/// GLES requests use the ES2 profile bit in place of core/compatibility.
pub fn arb_context_attribs(attrs: &ContextAttributes) -> Vec<i32> {
    let profile_bit = match attrs.requested_profile() {
        None => arb::CONTEXT_ES2_PROFILE_BIT,
        Some(Profile::Core) => arb::CONTEXT_CORE_PROFILE_BIT,
        Some(Profile::Compatibility) => arb::CONTEXT_COMPATIBILITY_PROFILE_BIT,
    };
    vec![
        arb::CONTEXT_MAJOR_VERSION,
        clamp(attrs.major),
        arb::CONTEXT_MINOR_VERSION,
        clamp(attrs.minor),
        arb::CONTEXT_PROFILE_MASK,
        profile_bit,
        0,
    ]
}

fn clamp(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

/// Names of the conformance bits set in an EGL `EGL_CONFORMANT` value.
pub fn conformance_names(bits: i32) -> Vec<&'static str> {
    [
        (egl::OPENGL_BIT, "OpenGL"),
        (egl::OPENGL_ES_BIT, "GLES"),
        (egl::OPENGL_ES2_BIT, "GLES2"),
        (egl::OPENGL_ES3_BIT, "GLES3"),
    ]
    .into_iter()
    .filter(|(bit, _)| bits & bit != 0)
    .map(|(_, name)| name)
    .collect()
}
