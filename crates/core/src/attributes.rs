//! Requested context attributes: size, API, version, profile, device selector.
//!
//! `ContextAttributes` is the immutable input to every backend. It is built
//! once (from CLI flags or JSON) and never mutated after it is handed to the
//! factory.

use crate::error::ContextError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OpenGL profile requested for desktop GL contexts.
///
/// GLES requests ignore the profile entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Legacy entry points removed.
    Core,
    /// Legacy entry points available.
    #[default]
    Compatibility,
}

impl FromStr for Profile {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "core" => Ok(Profile::Core),
            "compatibility" | "compat" => Ok(Profile::Compatibility),
            other => Err(ContextError::InvalidAttributes(format!(
                "unknown profile '{other}' (expected core | compatibility)"
            ))),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Core => write!(f, "core"),
            Profile::Compatibility => write!(f, "compatibility"),
        }
    }
}

/// Client API family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientApi {
    /// Desktop OpenGL.
    OpenGl,
    /// OpenGL ES.
    OpenGlEs,
}

impl ClientApi {
    pub fn from_gles_flag(gles: bool) -> Self {
        if gles {
            ClientApi::OpenGlEs
        } else {
            ClientApi::OpenGl
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ClientApi::OpenGl => "OpenGL",
            ClientApi::OpenGlEs => "GLES",
        }
    }
}

/// A `major.minor` GL version pair, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlVersion {
    pub major: u32,
    pub minor: u32,
}

impl GlVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Returns true if this version is at least `major.minor`.
    pub fn at_least(self, major: u32, minor: u32) -> bool {
        self >= GlVersion::new(major, minor)
    }
}

impl FromStr for GlVersion {
    type Err = ContextError;

    /// Parses `"M.m"` or `"M"`; a missing minor component is zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid =
            || ContextError::InvalidAttributes(format!("unable to parse GL version '{s}'"));
        let mut parts = s.trim().splitn(2, '.');
        let major = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(invalid)?
            .parse::<u32>()
            .map_err(|_| invalid())?;
        let minor = match parts.next() {
            Some(p) => p.parse::<u32>().map_err(|_| invalid())?,
            None => 0,
        };
        Ok(GlVersion { major, minor })
    }
}

impl fmt::Display for GlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Everything a caller asks of a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextAttributes {
    /// Framebuffer width in pixels.
    pub width: u32,
    /// Framebuffer height in pixels.
    pub height: u32,
    pub major: u32,
    pub minor: u32,
    /// Request OpenGL ES instead of desktop OpenGL.
    pub gles: bool,
    pub profile: Profile,
    /// Hide the window for window-backed providers.
    pub invisible: bool,
    /// Explicit device selector, e.g. `/dev/dri/renderD128`.
    pub gpu: Option<String>,
}

impl Default for ContextAttributes {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            major: 2,
            minor: 1,
            gles: false,
            profile: Profile::Compatibility,
            invisible: false,
            gpu: None,
        }
    }
}

impl ContextAttributes {
    pub fn version(&self) -> GlVersion {
        GlVersion::new(self.major, self.minor)
    }

    pub fn api(&self) -> ClientApi {
        ClientApi::from_gles_flag(self.gles)
    }

    /// Returns the profile to request, or `None` for GLES where profiles
    /// do not exist.
    pub fn requested_profile(&self) -> Option<Profile> {
        if self.gles {
            None
        } else {
            Some(self.profile)
        }
    }

    /// Returns the device selector if it is non-empty.
    pub fn gpu_selector(&self) -> Option<&str> {
        self.gpu.as_deref().filter(|s| !s.is_empty())
    }

    /// Rejects attributes no backend could ever satisfy.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::InvalidAttributes` for zero dimensions or a
    /// zero major version.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.width == 0 || self.height == 0 {
            return Err(ContextError::InvalidAttributes(format!(
                "width and height must be non-zero (got {}x{})",
                self.width, self.height
            )));
        }
        if self.major == 0 {
            return Err(ContextError::InvalidAttributes(
                "major GL version must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
