//! Structured CLI errors with meaningful exit codes.
//!
//! Exit code scheme:
//! - 0:  success
//! - 2:  clap arg parse error (automatic, before our code runs)
//! - 10: context error (provider, device, config, negotiation, surface, FBO)
//! - 11: I/O error (PNG write)
//! - 12: input error (bad version string, bad attributes, missing provider)
//! - 13: serialization error
//! - 14: render error (demo shader compile/link)

use crate::demo::ShaderError;
use offscreen_gl_core::ContextError;
use std::fmt;

/// Errors produced by CLI operations, each mapped to a distinct exit code.
#[derive(Debug)]
pub enum CliError {
    /// Context acquisition or framebuffer failure.
    Context(ContextError),
    /// An I/O error (snapshot writing).
    Io(String),
    /// A user input error (bad flag value, invalid attributes).
    Input(String),
    /// A serialization error (JSON output failure).
    Serialization(String),
    /// The demo frame could not be drawn.
    Render(String),
}

impl CliError {
    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Context(_) => 10,
            CliError::Io(_) => 11,
            CliError::Input(_) => 12,
            CliError::Serialization(_) => 13,
            CliError::Render(_) => 14,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Context(e) => write!(f, "{e}"),
            CliError::Io(msg) => write!(f, "{msg}"),
            CliError::Input(msg) => write!(f, "{msg}"),
            CliError::Serialization(msg) => write!(f, "{msg}"),
            CliError::Render(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<ContextError> for CliError {
    fn from(e: ContextError) -> Self {
        match e {
            ContextError::InvalidAttributes(msg) => CliError::Input(msg),
            other => CliError::Context(other),
        }
    }
}

impl From<ShaderError> for CliError {
    fn from(e: ShaderError) -> Self {
        CliError::Render(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_error_exit_code_is_10() {
        let err = CliError::from(ContextError::negotiation("no 9.9 for you", Some(0x3009)));
        assert_eq!(err.exit_code(), 10);
        assert!(err.to_string().contains("0x3009"));
    }

    #[test]
    fn io_error_exit_code_is_11() {
        let err = CliError::Io("write failed".into());
        assert_eq!(err.exit_code(), 11);
    }

    #[test]
    fn invalid_attributes_route_to_input() {
        let err = CliError::from(ContextError::InvalidAttributes("width must be non-zero".into()));
        assert_eq!(err.exit_code(), 12);
        assert!(err.to_string().contains("width"));
    }

    #[test]
    fn unknown_provider_stays_a_context_error() {
        let err = CliError::from(ContextError::UnknownProvider("cgl".into()));
        assert_eq!(err.exit_code(), 10);
        assert!(err.to_string().contains("cgl"));
    }

    #[test]
    fn serialization_error_exit_code_is_13() {
        let bad_json = serde_json::from_str::<serde_json::Value>("{invalid");
        let cli_err = CliError::from(bad_json.unwrap_err());
        assert_eq!(cli_err.exit_code(), 13);
    }

    #[test]
    fn shader_error_routes_to_render() {
        let err = CliError::from(ShaderError::Link("missing main".into()));
        assert_eq!(err.exit_code(), 14);
        assert!(err.to_string().contains("missing main"));
    }
}
