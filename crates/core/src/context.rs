//! The `RenderingContext` capability interface shared by every backend.
//!
//! Each backend owns its native display/surface/context bundle exclusively
//! and exposes it only through this trait. Window-backed providers that own
//! an event loop additionally expose [`Drivable`] via
//! [`RenderingContext::as_drivable`], so callers never need to inspect the
//! concrete type.

use crate::attributes::GlVersion;
use crate::error::ContextError;
use serde::Serialize;
use std::ffi::{c_void, CStr};

/// Lifecycle of a context handle after construction succeeded.
///
/// A handle that failed during construction never exists, so there is no
/// `Constructing` state to observe from outside a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Ready,
    Current,
    NotCurrent,
    Destroyed,
}

/// The version the driver actually granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NegotiatedVersion {
    pub version: GlVersion,
    pub gles: bool,
}

/// State every backend carries: fixed dimensions, the write-once
/// negotiated version, and the lifecycle state.
#[derive(Debug, Clone)]
pub struct ContextInfo {
    width: u32,
    height: u32,
    negotiated: Option<NegotiatedVersion>,
    state: ContextState,
}

impl ContextInfo {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            negotiated: None,
            state: ContextState::Ready,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn negotiated(&self) -> Option<NegotiatedVersion> {
        self.negotiated
    }

    /// Records the negotiated version. Only the first call takes effect.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::Negotiation` if a version was already recorded.
    pub fn set_negotiated(&mut self, negotiated: NegotiatedVersion) -> Result<(), ContextError> {
        if let Some(existing) = self.negotiated {
            return Err(ContextError::negotiation(
                format!("negotiated version already recorded as {}", existing.version),
                None,
            ));
        }
        self.negotiated = Some(negotiated);
        Ok(())
    }

    /// Fails if the handle was already destroyed.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::BackendUnavailable` once `mark_destroyed` ran.
    pub fn ensure_live(&self) -> Result<(), ContextError> {
        if self.state == ContextState::Destroyed {
            Err(ContextError::BackendUnavailable(
                "context has already been destroyed".into(),
            ))
        } else {
            Ok(())
        }
    }

    pub fn mark_current(&mut self) {
        if self.state != ContextState::Destroyed {
            self.state = ContextState::Current;
        }
    }

    pub fn mark_not_current(&mut self) {
        if self.state != ContextState::Destroyed {
            self.state = ContextState::NotCurrent;
        }
    }

    /// Moves to `Destroyed`. Returns false if the handle was already there,
    /// so callers can skip releasing native handles twice.
    pub fn mark_destroyed(&mut self) -> bool {
        let was_live = self.state != ContextState::Destroyed;
        self.state = ContextState::Destroyed;
        was_live
    }
}

/// A live, bindable GL context plus the drawable it renders into.
///
/// The trait is object-safe; the factory hands out `Box<dyn RenderingContext>`.
pub trait RenderingContext {
    /// Shared dimension/version/lifecycle state.
    fn info(&self) -> &ContextInfo;

    fn info_mut(&mut self) -> &mut ContextInfo;

    /// Name of the provider that created this context (e.g. `"egl"`).
    fn provider(&self) -> &'static str;

    /// Whether rendering must go through an FBO because the drawable is
    /// not a visible window. Fixed per backend.
    fn is_offscreen(&self) -> bool;

    /// Binds the context and its surface to the calling thread.
    /// Calling it while already current is a no-op success.
    ///
    /// # Errors
    ///
    /// Returns an error if the native call fails or the handle was destroyed.
    fn make_current(&mut self) -> Result<(), ContextError>;

    /// Unbinds any context from the calling thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the native call fails or the handle was destroyed.
    fn release_current(&mut self) -> Result<(), ContextError>;

    /// Releases surface, context, and display handles in reverse acquisition
    /// order. Safe to call more than once.
    fn destroy(&mut self);

    /// Resolves a GL entry point for the function loader.
    fn get_proc_address(&self, name: &CStr) -> *const c_void;

    /// Returns the event-loop interface for providers that own one.
    fn as_drivable(&mut self) -> Option<&mut dyn Drivable> {
        None
    }

    fn width(&self) -> u32 {
        self.info().width()
    }

    fn height(&self) -> u32 {
        self.info().height()
    }

    fn negotiated(&self) -> Option<NegotiatedVersion> {
        self.info().negotiated()
    }
}

/// Implemented only by contexts whose windowing library owns the render loop.
pub trait Drivable {
    /// Runs the event loop, invoking `render` once per frame and presenting
    /// the result, until the window is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the loop cannot start or presenting fails.
    fn run_loop(&mut self, render: &mut dyn FnMut()) -> Result<(), ContextError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal offscreen context used to exercise the default methods and
    /// the lifecycle bookkeeping.
    struct MockContext {
        info: ContextInfo,
        releases: usize,
    }

    impl MockContext {
        fn new() -> Self {
            Self {
                info: ContextInfo::new(64, 32),
                releases: 0,
            }
        }
    }

    impl RenderingContext for MockContext {
        fn info(&self) -> &ContextInfo {
            &self.info
        }

        fn info_mut(&mut self) -> &mut ContextInfo {
            &mut self.info
        }

        fn provider(&self) -> &'static str {
            "mock"
        }

        fn is_offscreen(&self) -> bool {
            true
        }

        fn make_current(&mut self) -> Result<(), ContextError> {
            self.info.ensure_live()?;
            self.info.mark_current();
            Ok(())
        }

        fn release_current(&mut self) -> Result<(), ContextError> {
            self.info.ensure_live()?;
            self.info.mark_not_current();
            Ok(())
        }

        fn destroy(&mut self) {
            if self.info.mark_destroyed() {
                self.releases += 1;
            }
        }

        fn get_proc_address(&self, _name: &CStr) -> *const c_void {
            std::ptr::null()
        }
    }

    #[test]
    fn new_context_starts_ready_without_version() {
        let ctx = MockContext::new();
        assert_eq!(ctx.info().state(), ContextState::Ready);
        assert_eq!(ctx.width(), 64);
        assert_eq!(ctx.height(), 32);
        assert!(ctx.negotiated().is_none());
    }

    #[test]
    fn make_current_is_idempotent() {
        let mut ctx = MockContext::new();
        ctx.make_current().unwrap();
        ctx.make_current().unwrap();
        assert_eq!(ctx.info().state(), ContextState::Current);
    }

    #[test]
    fn current_and_not_current_alternate() {
        let mut ctx = MockContext::new();
        ctx.make_current().unwrap();
        ctx.release_current().unwrap();
        assert_eq!(ctx.info().state(), ContextState::NotCurrent);
        ctx.make_current().unwrap();
        assert_eq!(ctx.info().state(), ContextState::Current);
    }

    #[test]
    fn destroy_is_terminal_and_releases_once() {
        let mut ctx = MockContext::new();
        ctx.make_current().unwrap();
        ctx.destroy();
        ctx.destroy();
        assert_eq!(ctx.releases, 1);
        assert_eq!(ctx.info().state(), ContextState::Destroyed);
        assert!(ctx.make_current().is_err());
        ctx.info_mut().mark_current();
        assert_eq!(ctx.info().state(), ContextState::Destroyed);
    }

    #[test]
    fn negotiated_version_is_write_once() {
        let mut info = ContextInfo::new(1, 1);
        let first = NegotiatedVersion {
            version: GlVersion::new(3, 3),
            gles: false,
        };
        info.set_negotiated(first).unwrap();
        let second = NegotiatedVersion {
            version: GlVersion::new(4, 6),
            gles: false,
        };
        assert!(info.set_negotiated(second).is_err());
        assert_eq!(info.negotiated(), Some(first));
    }

    #[test]
    fn rendering_context_is_object_safe() {
        let mut boxed: Box<dyn RenderingContext> = Box::new(MockContext::new());
        assert!(boxed.is_offscreen());
        assert!(boxed.as_drivable().is_none());
        assert_eq!(boxed.provider(), "mock");
    }
}
