//! Runtime GL error reporting.
//!
//! Drivers routinely leave spurious errors behind on calls that otherwise
//! worked, so a queued error is logged with its call site and never turned
//! into a control-flow signal.

use super::api::FramebufferApi;

/// Upper bound on errors drained per check. A lost context can report
/// `GL_CONTEXT_LOST` forever.
const MAX_DRAINED_ERRORS: usize = 16;

/// Evaluates a GL call, then logs every queued GL error together with the
/// file, line, and literal expression. Returns the call's value.
///
/// ```ignore
/// let fb = gl_check!(gl, gl.create_framebuffer())?;
/// ```
#[macro_export]
macro_rules! gl_check {
    ($gl:expr, $call:expr) => {{
        let result = $call;
        $crate::render::check::drain_errors($gl, file!(), line!(), stringify!($call));
        result
    }};
}

/// Logs and clears queued GL errors. Returns how many were logged.
pub fn drain_errors<G: FramebufferApi + ?Sized>(
    gl: &G,
    file: &str,
    line: u32,
    expr: &str,
) -> usize {
    let mut logged = 0;
    while logged < MAX_DRAINED_ERRORS {
        let code = gl.get_error();
        if code == glow::NO_ERROR {
            break;
        }
        log::warn!(
            "OpenGL error: {} (0x{code:04X}) in {file}:{line}\n              {expr}",
            gl_error_name(code)
        );
        logged += 1;
    }
    logged
}

/// Symbolic name of a `glGetError` code.
pub fn gl_error_name(code: u32) -> &'static str {
    match code {
        glow::NO_ERROR => "GL_NO_ERROR",
        glow::INVALID_ENUM => "GL_INVALID_ENUM",
        glow::INVALID_VALUE => "GL_INVALID_VALUE",
        glow::INVALID_OPERATION => "GL_INVALID_OPERATION",
        glow::STACK_OVERFLOW => "GL_STACK_OVERFLOW",
        glow::STACK_UNDERFLOW => "GL_STACK_UNDERFLOW",
        glow::OUT_OF_MEMORY => "GL_OUT_OF_MEMORY",
        glow::INVALID_FRAMEBUFFER_OPERATION => "GL_INVALID_FRAMEBUFFER_OPERATION",
        glow::CONTEXT_LOST => "GL_CONTEXT_LOST",
        _ => "unknown GL error",
    }
}

/// Symbolic name of a `glCheckFramebufferStatus` result.
pub fn framebuffer_status_name(status: u32) -> &'static str {
    match status {
        glow::FRAMEBUFFER_COMPLETE => "GL_FRAMEBUFFER_COMPLETE",
        glow::FRAMEBUFFER_UNDEFINED => "GL_FRAMEBUFFER_UNDEFINED",
        glow::FRAMEBUFFER_INCOMPLETE_ATTACHMENT => "GL_FRAMEBUFFER_INCOMPLETE_ATTACHMENT",
        glow::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT => {
            "GL_FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT"
        }
        glow::FRAMEBUFFER_INCOMPLETE_DRAW_BUFFER => "GL_FRAMEBUFFER_INCOMPLETE_DRAW_BUFFER",
        glow::FRAMEBUFFER_INCOMPLETE_READ_BUFFER => "GL_FRAMEBUFFER_INCOMPLETE_READ_BUFFER",
        glow::FRAMEBUFFER_UNSUPPORTED => "GL_FRAMEBUFFER_UNSUPPORTED",
        glow::FRAMEBUFFER_INCOMPLETE_MULTISAMPLE => "GL_FRAMEBUFFER_INCOMPLETE_MULTISAMPLE",
        glow::FRAMEBUFFER_INCOMPLETE_LAYER_TARGETS => "GL_FRAMEBUFFER_INCOMPLETE_LAYER_TARGETS",
        _ => "unknown framebuffer status",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::mock::RecordingGl;

    #[test]
    fn drain_errors_logs_each_queued_error_once() {
        let gl = RecordingGl::new();
        gl.push_error(glow::INVALID_ENUM);
        gl.push_error(glow::INVALID_OPERATION);
        assert_eq!(drain_errors(&gl, "a.rs", 1, "glFoo()"), 2);
        assert_eq!(drain_errors(&gl, "a.rs", 2, "glFoo()"), 0);
    }

    #[test]
    fn drain_errors_is_bounded_for_sticky_errors() {
        let gl = RecordingGl::new();
        gl.set_sticky_error(Some(glow::CONTEXT_LOST));
        assert_eq!(drain_errors(&gl, "a.rs", 1, "glFoo()"), MAX_DRAINED_ERRORS);
    }

    #[test]
    fn gl_check_returns_the_call_value() {
        let gl = RecordingGl::new();
        gl.push_error(glow::INVALID_VALUE);
        let value = crate::gl_check!(&gl, 40 + 2);
        assert_eq!(value, 42);
        assert_eq!(gl.get_error(), glow::NO_ERROR, "queue should be drained");
    }

    #[test]
    fn error_names_cover_common_codes() {
        assert_eq!(gl_error_name(glow::INVALID_ENUM), "GL_INVALID_ENUM");
        assert_eq!(gl_error_name(glow::OUT_OF_MEMORY), "GL_OUT_OF_MEMORY");
        assert_eq!(gl_error_name(0xDEAD), "unknown GL error");
    }

    #[test]
    fn status_names_cover_incomplete_states() {
        assert_eq!(
            framebuffer_status_name(glow::FRAMEBUFFER_COMPLETE),
            "GL_FRAMEBUFFER_COMPLETE"
        );
        assert_eq!(
            framebuffer_status_name(glow::FRAMEBUFFER_UNSUPPORTED),
            "GL_FRAMEBUFFER_UNSUPPORTED"
        );
        assert_eq!(framebuffer_status_name(1), "unknown framebuffer status");
    }
}
