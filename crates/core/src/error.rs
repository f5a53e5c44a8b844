//! Error types for context acquisition and offscreen framebuffers.

use thiserror::Error;

/// Coarse classification of a [`ContextError`].
///
/// Callers that only need to decide "retry with different attributes" vs.
/// "abort offscreen rendering" can match on this instead of the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Provider not compiled in, library not loadable, or extension missing.
    BackendUnavailable,
    /// Explicit device open failed, or every discovery strategy was exhausted.
    DeviceResolution,
    /// No configuration matched the requested bit depths and API.
    ConfigSelection,
    /// Every context-creation entry point rejected the request.
    Negotiation,
    /// Window, pbuffer, or GBM surface creation failed.
    SurfaceBuild,
    /// Color or depth/stencil attachment failed the completeness check.
    FramebufferIncomplete,
    /// The caller supplied attributes that can never be satisfied.
    InvalidAttributes,
}

/// Errors produced while creating, binding, or tearing down a rendering
/// context and its offscreen framebuffer.
///
/// Every variant renders as a single human-readable line. Native error
/// codes (EGL error, X11 error code, Win32 `GetLastError`) are appended
/// when the backend reported one.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    /// The provider name is not in the compiled-in set.
    #[error("context provider '{0}' not found")]
    UnknownProvider(String),

    /// The backend library or a required extension is missing.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// No display or device could be resolved.
    #[error("device resolution failed: {message}{}", native_suffix(.code))]
    DeviceResolution { message: String, code: Option<i64> },

    /// Zero configurations matched.
    #[error("config selection failed: {message}{}", native_suffix(.code))]
    ConfigSelection { message: String, code: Option<i64> },

    /// The requested version/profile could not be granted.
    #[error("context negotiation failed: {message}{}", native_suffix(.code))]
    Negotiation { message: String, code: Option<i64> },

    /// The drawable could not be created.
    #[error("surface creation failed: {message}{}", native_suffix(.code))]
    SurfaceBuild { message: String, code: Option<i64> },

    /// A framebuffer completeness check failed at the named stage.
    #[error("framebuffer incomplete after {stage}: {status_name} (0x{status:04X})")]
    FramebufferIncomplete {
        stage: &'static str,
        status: u32,
        status_name: &'static str,
    },

    /// Framebuffer or renderbuffer names could not be generated, or the
    /// object was already destroyed.
    #[error("framebuffer unavailable: {0}")]
    FramebufferUnavailable(String),

    /// Attribute validation failed before any native call was made.
    #[error("invalid context attributes: {0}")]
    InvalidAttributes(String),
}

fn native_suffix(code: &Option<i64>) -> String {
    match code {
        Some(code) => format!(" (native error 0x{code:X})"),
        None => String::new(),
    }
}

impl ContextError {
    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContextError::UnknownProvider(_) | ContextError::BackendUnavailable(_) => {
                ErrorKind::BackendUnavailable
            }
            ContextError::DeviceResolution { .. } => ErrorKind::DeviceResolution,
            ContextError::ConfigSelection { .. } => ErrorKind::ConfigSelection,
            ContextError::Negotiation { .. } => ErrorKind::Negotiation,
            ContextError::SurfaceBuild { .. } => ErrorKind::SurfaceBuild,
            ContextError::FramebufferIncomplete { .. }
            | ContextError::FramebufferUnavailable(_) => ErrorKind::FramebufferIncomplete,
            ContextError::InvalidAttributes(_) => ErrorKind::InvalidAttributes,
        }
    }

    /// Returns the native error code, if the backend reported one.
    pub fn native_code(&self) -> Option<i64> {
        match self {
            ContextError::DeviceResolution { code, .. }
            | ContextError::ConfigSelection { code, .. }
            | ContextError::Negotiation { code, .. }
            | ContextError::SurfaceBuild { code, .. } => *code,
            ContextError::FramebufferIncomplete { status, .. } => Some(i64::from(*status)),
            _ => None,
        }
    }

    pub fn device(message: impl Into<String>, code: Option<i64>) -> Self {
        ContextError::DeviceResolution {
            message: message.into(),
            code,
        }
    }

    pub fn config(message: impl Into<String>, code: Option<i64>) -> Self {
        ContextError::ConfigSelection {
            message: message.into(),
            code,
        }
    }

    pub fn negotiation(message: impl Into<String>, code: Option<i64>) -> Self {
        ContextError::Negotiation {
            message: message.into(),
            code,
        }
    }

    pub fn surface(message: impl Into<String>, code: Option<i64>) -> Self {
        ContextError::SurfaceBuild {
            message: message.into(),
            code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_includes_name() {
        let err = ContextError::UnknownProvider("vulkan".into());
        let msg = err.to_string();
        assert!(msg.contains("vulkan"), "missing provider name in: {msg}");
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    }

    #[test]
    fn native_code_is_appended_in_hex() {
        let err = ContextError::negotiation("eglCreateContext() rejected 99.0", Some(0x3009));
        let msg = err.to_string();
        assert!(msg.contains("99.0"), "missing detail in: {msg}");
        assert!(msg.contains("0x3009"), "missing native code in: {msg}");
        assert_eq!(err.native_code(), Some(0x3009));
    }

    #[test]
    fn missing_native_code_leaves_message_clean() {
        let err = ContextError::device("no EGL display", None);
        assert_eq!(err.to_string(), "device resolution failed: no EGL display");
        assert_eq!(err.native_code(), None);
    }

    #[test]
    fn framebuffer_incomplete_reports_stage_and_status() {
        let err = ContextError::FramebufferIncomplete {
            stage: "depth/stencil attachment",
            status: 0x8CD6,
            status_name: "GL_FRAMEBUFFER_INCOMPLETE_ATTACHMENT",
        };
        let msg = err.to_string();
        assert!(msg.contains("depth/stencil"), "missing stage in: {msg}");
        assert!(msg.contains("0x8CD6"), "missing status in: {msg}");
        assert!(msg.contains("INCOMPLETE_ATTACHMENT"), "missing name in: {msg}");
        assert_eq!(err.kind(), ErrorKind::FramebufferIncomplete);
    }

    #[test]
    fn every_constructor_maps_to_its_kind() {
        assert_eq!(ContextError::device("x", None).kind(), ErrorKind::DeviceResolution);
        assert_eq!(ContextError::config("x", None).kind(), ErrorKind::ConfigSelection);
        assert_eq!(ContextError::negotiation("x", None).kind(), ErrorKind::Negotiation);
        assert_eq!(ContextError::surface("x", None).kind(), ErrorKind::SurfaceBuild);
        assert_eq!(
            ContextError::InvalidAttributes("x".into()).kind(),
            ErrorKind::InvalidAttributes
        );
    }

    #[test]
    fn context_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ContextError>();
    }

    #[test]
    fn context_error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<ContextError>();
    }
}
