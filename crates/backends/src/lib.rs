#![deny(unsafe_code)]
//! Context factory: maps provider names to native backends.
//!
//! This crate sits between `offscreen-gl-core` (which defines the
//! `RenderingContext` trait) and the platform APIs. Each provider is behind
//! a cargo feature and a target `cfg`; a provider that is not compiled in is
//! simply not in the set, and naming it is an `UnknownProvider` error raised
//! before any native call.

pub mod attribs;

#[cfg(all(
    feature = "egl",
    unix,
    not(any(target_os = "macos", target_os = "ios", target_os = "android"))
))]
pub mod egl;

#[cfg(all(
    feature = "egl",
    unix,
    not(any(target_os = "macos", target_os = "ios", target_os = "android"))
))]
pub mod diagnostics;

#[cfg(all(
    feature = "glx",
    unix,
    not(any(target_os = "macos", target_os = "ios", target_os = "android"))
))]
pub mod glx;

#[cfg(all(feature = "wgl", windows))]
pub mod wgl;

#[cfg(feature = "glutin")]
pub mod glutin_window;

use offscreen_gl_core::{ContextAttributes, ContextError, RenderingContext};

/// Every provider compiled into this build, in default-preference order.
const PROVIDERS: &[ProviderKind] = &[
    #[cfg(all(
        feature = "egl",
        unix,
        not(any(target_os = "macos", target_os = "ios", target_os = "android"))
    ))]
    ProviderKind::Egl,
    #[cfg(all(
        feature = "glx",
        unix,
        not(any(target_os = "macos", target_os = "ios", target_os = "android"))
    ))]
    ProviderKind::Glx,
    #[cfg(all(feature = "wgl", windows))]
    ProviderKind::Wgl,
    #[cfg(feature = "glutin")]
    ProviderKind::Glutin,
];

/// The closed set of context providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// EGL device/default display with a pbuffer, or a GBM window surface.
    #[cfg(all(
        feature = "egl",
        unix,
        not(any(target_os = "macos", target_os = "ios", target_os = "android"))
    ))]
    Egl,
    /// Xlib connection with an unmapped window.
    #[cfg(all(
        feature = "glx",
        unix,
        not(any(target_os = "macos", target_os = "ios", target_os = "android"))
    ))]
    Glx,
    /// Hidden Win32 popup window.
    #[cfg(all(feature = "wgl", windows))]
    Wgl,
    /// Windowing-library context that owns its event loop.
    #[cfg(feature = "glutin")]
    Glutin,
}

impl ProviderKind {
    /// Looks a provider up by name, case-insensitively.
    ///
    /// Returns `ContextError::UnknownProvider` if the name is not compiled in.
    pub fn from_name(name: &str) -> Result<Self, ContextError> {
        let wanted = name.to_ascii_lowercase();
        PROVIDERS
            .iter()
            .copied()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| ContextError::UnknownProvider(name.to_string()))
    }

    pub fn name(self) -> &'static str {
        match self {
            #[cfg(all(
                feature = "egl",
                unix,
                not(any(target_os = "macos", target_os = "ios", target_os = "android"))
            ))]
            ProviderKind::Egl => "egl",
            #[cfg(all(
                feature = "glx",
                unix,
                not(any(target_os = "macos", target_os = "ios", target_os = "android"))
            ))]
            ProviderKind::Glx => "glx",
            #[cfg(all(feature = "wgl", windows))]
            ProviderKind::Wgl => "wgl",
            #[cfg(feature = "glutin")]
            ProviderKind::Glutin => "glutin",
        }
    }

    /// Returns a slice of all compiled-in providers.
    pub fn all() -> &'static [ProviderKind] {
        PROVIDERS
    }

    /// Creates a context with this provider.
    ///
    /// # Errors
    ///
    /// Returns whatever the backend reports. Any native resource acquired
    /// before the failure has already been released.
    pub fn create(
        self,
        attrs: &ContextAttributes,
    ) -> Result<Box<dyn RenderingContext>, ContextError> {
        attrs.validate()?;
        log::info!(
            "requesting {} {}.{} {}x{} from provider '{}'",
            attrs.api().label(),
            attrs.major,
            attrs.minor,
            attrs.width,
            attrs.height,
            self.name()
        );
        match self {
            #[cfg(all(
                feature = "egl",
                unix,
                not(any(target_os = "macos", target_os = "ios", target_os = "android"))
            ))]
            ProviderKind::Egl => Ok(Box::new(egl::EglContext::create(attrs)?)),
            #[cfg(all(
                feature = "glx",
                unix,
                not(any(target_os = "macos", target_os = "ios", target_os = "android"))
            ))]
            ProviderKind::Glx => Ok(Box::new(glx::GlxContext::create(attrs)?)),
            #[cfg(all(feature = "wgl", windows))]
            ProviderKind::Wgl => Ok(Box::new(wgl::WglContext::create(attrs)?)),
            #[cfg(feature = "glutin")]
            ProviderKind::Glutin => Ok(Box::new(glutin_window::GlutinContext::create(attrs)?)),
        }
    }
}

/// Names of every compiled-in provider.
pub fn list_providers() -> Vec<&'static str> {
    PROVIDERS.iter().map(|p| p.name()).collect()
}

/// The fixed platform default: the first compiled-in provider in the order
/// egl, glx, wgl, glutin. No runtime probing happens here.
pub fn default_provider() -> Option<&'static str> {
    PROVIDERS.first().map(|p| p.name())
}

/// Creates a rendering context by provider name.
///
/// # Errors
///
/// Returns `ContextError::UnknownProvider` for names outside the
/// compiled-in set, `InvalidAttributes` for attributes no backend can
/// satisfy, and otherwise the backend's failure.
pub fn create(
    provider: &str,
    attrs: &ContextAttributes,
) -> Result<Box<dyn RenderingContext>, ContextError> {
    ProviderKind::from_name(provider)?.create(attrs)
}
