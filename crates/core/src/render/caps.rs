//! Per-context capability table.
//!
//! Built once after the context is current and the function loader ran.
//! Nothing here is cached globally: the table travels with the context that
//! produced it.

use super::api::GlQuery;
use crate::attributes::{GlVersion, Profile};
use crate::error::ContextError;
use serde::Serialize;
use std::collections::BTreeSet;

const CONTEXT_CORE_PROFILE_BIT: i32 = 0x1;
const CONTEXT_COMPATIBILITY_PROFILE_BIT: i32 = 0x2;
const CONTEXT_FLAG_FORWARD_COMPATIBLE_BIT: i32 = 0x1;
const CONTEXT_FLAG_DEBUG_BIT: i32 = 0x2;

/// Version and profile the driver actually granted, as plain fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionReport {
    pub version: GlVersion,
    pub gles: bool,
    /// Active profile, when the driver exposes one (desktop GL 3.2+).
    pub profile: Option<Profile>,
    pub forward_compatible: Option<bool>,
    pub debug: Option<bool>,
    pub version_string: String,
    pub vendor: String,
    pub renderer: String,
    pub shading_language: String,
}

/// Parses a `GL_VERSION` string into a version and an ES flag.
///
/// Accepts `"4.6.0 NVIDIA 535.54"`, `"OpenGL ES 3.2 Mesa 23.1"`, and
/// `"OpenGL ES-CM 1.1"`.
///
/// # Errors
///
/// Returns `ContextError::Negotiation` if no `major.minor` pair is found.
pub fn parse_version_string(raw: &str) -> Result<(GlVersion, bool), ContextError> {
    let trimmed = raw.trim();
    let (rest, gles) = if let Some(rest) = trimmed.strip_prefix("OpenGL ES-CM ") {
        (rest, true)
    } else if let Some(rest) = trimmed.strip_prefix("OpenGL ES-CL ") {
        (rest, true)
    } else if let Some(rest) = trimmed.strip_prefix("OpenGL ES ") {
        (rest, true)
    } else {
        (trimmed, false)
    };

    let token = rest.split_whitespace().next().unwrap_or_default();
    let mut parts = token.split('.');
    let major = parts.next().and_then(|p| p.parse::<u32>().ok());
    let minor = parts.next().and_then(|p| p.parse::<u32>().ok());
    match (major, minor) {
        (Some(major), Some(minor)) => Ok((GlVersion::new(major, minor), gles)),
        _ => Err(ContextError::negotiation(
            format!("unrecognised GL_VERSION string '{raw}'"),
            None,
        )),
    }
}

/// Function family the FBO manager has to call through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FramebufferEntryPoints {
    /// `glGenFramebuffers` and friends, as glow loads them.
    Core,
    /// `glGenFramebuffersEXT` and friends; see [`super::ext::ExtFramebuffers`].
    Ext,
}

/// Version report plus the extension set of one context.
#[derive(Debug, Clone)]
pub struct Capabilities {
    report: VersionReport,
    extensions: BTreeSet<String>,
}

impl Capabilities {
    /// Reads version, vendor, renderer, extensions, and (desktop GL 3.2+)
    /// the profile mask and context flags from the current context.
    ///
    /// # Errors
    ///
    /// Returns an error if `GL_VERSION` cannot be parsed.
    pub fn query<G: GlQuery + ?Sized>(gl: &G) -> Result<Self, ContextError> {
        let version_string = gl.get_string(glow::VERSION);
        let (version, gles) = parse_version_string(&version_string)?;

        let (profile, forward_compatible, debug) = if !gles && version.at_least(3, 2) {
            let mask = gl.get_integer(glow::CONTEXT_PROFILE_MASK);
            let profile = if mask & CONTEXT_CORE_PROFILE_BIT != 0 {
                Some(Profile::Core)
            } else if mask & CONTEXT_COMPATIBILITY_PROFILE_BIT != 0 {
                Some(Profile::Compatibility)
            } else {
                None
            };
            let flags = gl.get_integer(glow::CONTEXT_FLAGS);
            (
                profile,
                Some(flags & CONTEXT_FLAG_FORWARD_COMPATIBLE_BIT != 0),
                Some(flags & CONTEXT_FLAG_DEBUG_BIT != 0),
            )
        } else {
            (None, None, None)
        };

        let report = VersionReport {
            version,
            gles,
            profile,
            forward_compatible,
            debug,
            version_string,
            vendor: gl.get_string(glow::VENDOR),
            renderer: gl.get_string(glow::RENDERER),
            shading_language: gl.get_string(glow::SHADING_LANGUAGE_VERSION),
        };
        let extensions: BTreeSet<String> = gl.extensions().into_iter().collect();
        log::info!(
            "GL {} {} ({}), {} extensions",
            if gles { "ES" } else { "desktop" },
            report.version,
            report.renderer,
            extensions.len()
        );

        Ok(Self { report, extensions })
    }

    pub fn report(&self) -> &VersionReport {
        &self.report
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }

    /// Which entry points back framebuffer objects on this context.
    ///
    /// Core in GL 3.0 and every GLES version this crate targets, and with
    /// `GL_ARB_framebuffer_object`, which exports the unsuffixed names.
    /// `GL_EXT_framebuffer_object` alone needs the `*EXT` table.
    pub fn framebuffer_entry_points(&self) -> Option<FramebufferEntryPoints> {
        if self.report.gles
            || self.report.version.at_least(3, 0)
            || self.has_extension("GL_ARB_framebuffer_object")
        {
            Some(FramebufferEntryPoints::Core)
        } else if self.has_extension("GL_EXT_framebuffer_object") {
            Some(FramebufferEntryPoints::Ext)
        } else {
            None
        }
    }

    pub fn supports_framebuffer_objects(&self) -> bool {
        self.framebuffer_entry_points().is_some()
    }

    /// Whether `GL_DEPTH24_STENCIL8` renderbuffers are available.
    pub fn supports_packed_depth_stencil(&self) -> bool {
        self.report.version.at_least(3, 0)
            || self.has_extension("GL_ARB_framebuffer_object")
            || self.has_extension("GL_EXT_packed_depth_stencil")
            || self.has_extension("GL_OES_packed_depth_stencil")
    }

    /// # Errors
    ///
    /// Returns `BackendUnavailable` if framebuffer objects are missing.
    pub fn require_framebuffer_objects(&self) -> Result<FramebufferEntryPoints, ContextError> {
        self.framebuffer_entry_points().ok_or_else(|| {
            ContextError::BackendUnavailable(format!(
                "GL {} offers no framebuffer objects",
                self.report.version
            ))
        })
    }
}
