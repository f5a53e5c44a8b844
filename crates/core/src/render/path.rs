//! Picks the demo render path and GLSL dialect for a negotiated context.

use super::caps::VersionReport;
use crate::attributes::Profile;
use crate::error::ContextError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// What the caller asked for on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Modern when shaders are available, clear otherwise.
    #[default]
    Auto,
    /// Clear to a solid color only.
    Clear,
    /// Shader-based triangle.
    Modern,
}

impl FromStr for RenderMode {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(RenderMode::Auto),
            "clear" => Ok(RenderMode::Clear),
            "modern" => Ok(RenderMode::Modern),
            other => Err(ContextError::InvalidAttributes(format!(
                "unknown render mode '{other}' (expected auto | clear | modern)"
            ))),
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderMode::Auto => write!(f, "auto"),
            RenderMode::Clear => write!(f, "clear"),
            RenderMode::Modern => write!(f, "modern"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    Clear,
    Modern,
}

/// The chosen path plus the shader dialect it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenderPath {
    pub kind: PathKind,
    /// Text after `#version`, e.g. `"330 core"` or `"100"`. `None` for
    /// the clear path.
    pub glsl: Option<&'static str>,
    /// Shaders use `in`/`out` rather than `attribute`/`varying`.
    pub in_out: bool,
    /// A vertex array object must be bound before drawing.
    pub needs_vertex_array: bool,
}

impl RenderPath {
    /// # Errors
    ///
    /// Returns `InvalidAttributes` when `Modern` is forced on a context
    /// without programmable shaders.
    pub fn select(
        report: &VersionReport,
        requested_profile: Option<Profile>,
        mode: RenderMode,
    ) -> Result<Self, ContextError> {
        let dialect = glsl_dialect(report);
        match (mode, dialect) {
            (RenderMode::Clear, _) | (RenderMode::Auto, None) => Ok(RenderPath {
                kind: PathKind::Clear,
                glsl: None,
                in_out: false,
                needs_vertex_array: false,
            }),
            (RenderMode::Modern, None) => Err(ContextError::InvalidAttributes(format!(
                "modern render path needs shaders, {} {} has none",
                if report.gles { "GLES" } else { "OpenGL" },
                report.version
            ))),
            (_, Some((glsl, in_out))) => {
                let core = report.profile == Some(Profile::Core)
                    || requested_profile == Some(Profile::Core);
                let vao_capable = report.version.at_least(3, 0);
                Ok(RenderPath {
                    kind: PathKind::Modern,
                    glsl: Some(glsl),
                    in_out,
                    needs_vertex_array: vao_capable && (core || report.gles),
                })
            }
        }
    }
}

fn glsl_dialect(report: &VersionReport) -> Option<(&'static str, bool)> {
    let v = report.version;
    if report.gles {
        if v.at_least(3, 0) {
            Some(("300 es", true))
        } else if v.at_least(2, 0) {
            Some(("100", false))
        } else {
            None
        }
    } else if v.at_least(3, 3) {
        Some(("330 core", true))
    } else if v.at_least(3, 1) {
        Some(("140", true))
    } else if v.at_least(2, 1) {
        Some(("120", false))
    } else if v.at_least(2, 0) {
        Some(("110", false))
    } else {
        None
    }
}
