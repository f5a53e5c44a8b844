#![deny(unsafe_code)]
//! Core types and traits for offscreen-gl.
//!
//! Provides `ContextAttributes` (the immutable request), the
//! `RenderingContext`/`Drivable` traits every backend implements,
//! `ContextError`/`ErrorKind`, version acceptance, and the GL-side
//! `Capabilities` table, `Fbo` manager, and pixel readback.

pub mod attributes;
pub mod context;
pub mod error;
pub mod negotiate;
pub mod render;

pub use attributes::{ClientApi, ContextAttributes, GlVersion, Profile};
pub use context::{ContextInfo, ContextState, Drivable, NegotiatedVersion, RenderingContext};
pub use error::{ContextError, ErrorKind};
pub use negotiate::accept_version;
pub use render::{
    Capabilities, ExtFramebuffers, Fbo, FramebufferEntryPoints, RenderMode, RenderPath,
    VersionReport,
};
