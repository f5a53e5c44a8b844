//! GL-side pieces that run once a context is current.
//!
//! # Module overview
//!
//! - [`api`] -- Narrow GL traits implemented for `glow::Context`.
//! - [`check`] -- `gl_check!` and GL error/status names.
//! - [`caps`] -- Per-context capability table and version report.
//! - [`ext`] -- `GL_EXT_framebuffer_object` function table.
//! - [`fbo`] -- Color + depth/stencil framebuffer with one-level nested binding.
//! - [`readback`] -- RGBA8 pixel readback and row flipping.
//! - [`path`] -- Demo render-path and GLSL dialect selection.

pub mod api;
pub mod caps;
pub mod check;
pub mod ext;
pub mod fbo;
pub mod path;
pub mod readback;

#[cfg(test)]
pub(crate) mod mock;

pub use api::{FramebufferApi, GlQuery};
pub use caps::{parse_version_string, Capabilities, FramebufferEntryPoints, VersionReport};
pub use ext::ExtFramebuffers;
pub use check::{drain_errors, framebuffer_status_name, gl_error_name};
pub use fbo::Fbo;
pub use path::{PathKind, RenderMode, RenderPath};
pub use readback::{flip_rows, read_rgba};
