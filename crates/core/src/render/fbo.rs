//! Offscreen framebuffer: one RGBA8 color renderbuffer plus one packed
//! depth24/stencil8 renderbuffer.
//!
//! The depth/stencil storage is attached twice, once as `DEPTH_ATTACHMENT`
//! and once as `STENCIL_ATTACHMENT`. Some software rasterizers crash on the
//! single `DEPTH_STENCIL_ATTACHMENT` call, so the two-call form is kept.
//!
//! Binding nests exactly one level: `bind` records whatever was bound
//! before, `unbind` restores it. A second `bind` without an `unbind`
//! overwrites the record.

use super::api::FramebufferApi;
use super::check::framebuffer_status_name;
use super::readback;
use crate::error::ContextError;
use crate::gl_check;
use std::num::NonZeroU32;

const COLOR_FORMAT: u32 = glow::RGBA8;
const DEPTH_STENCIL_FORMAT: u32 = glow::DEPTH24_STENCIL8;

/// Converts pixel dimensions to the signed sizes GL takes.
pub(crate) fn gl_dimensions(width: u32, height: u32) -> Result<(i32, i32), ContextError> {
    let convert = |v: u32| i32::try_from(v).ok().filter(|v| *v > 0);
    match (convert(width), convert(height)) {
        (Some(w), Some(h)) => Ok((w, h)),
        _ => Err(ContextError::InvalidAttributes(format!(
            "framebuffer size {width}x{height} is out of range"
        ))),
    }
}

/// A framebuffer object with color and depth/stencil renderbuffers.
///
/// Owned by the caller and only valid while the context that created it is
/// current. Construction never panics or returns early: check
/// [`Fbo::is_complete`] (or [`Fbo::ensure_complete`]) before rendering.
#[derive(Debug)]
pub struct Fbo {
    framebuffer: Option<NonZeroU32>,
    color: Option<NonZeroU32>,
    depth_stencil: Option<NonZeroU32>,
    width: u32,
    height: u32,
    previous: Option<Option<NonZeroU32>>,
    failure: Option<ContextError>,
}

impl Fbo {
    /// Generates the framebuffer and both renderbuffers, sizes them, and
    /// attaches color first and depth/stencil second, validating
    /// completeness after each stage.
    ///
    /// The framebuffer bound on entry is bound again on return.
    pub fn new<G: FramebufferApi + ?Sized>(gl: &G, width: u32, height: u32) -> Self {
        let mut fbo = Self {
            framebuffer: None,
            color: None,
            depth_stencil: None,
            width,
            height,
            previous: None,
            failure: None,
        };
        if let Err(e) = fbo.build(gl) {
            log::warn!("offscreen framebuffer unusable: {e}");
            fbo.failure = Some(e);
        }
        fbo
    }

    fn build<G: FramebufferApi + ?Sized>(&mut self, gl: &G) -> Result<(), ContextError> {
        let (w, h) = gl_dimensions(self.width, self.height)?;
        let unavailable = |what: &str, e: String| {
            ContextError::FramebufferUnavailable(format!("unable to create {what}: {e}"))
        };

        let framebuffer =
            gl_check!(gl, gl.create_framebuffer()).map_err(|e| unavailable("framebuffer", e))?;
        self.framebuffer = Some(framebuffer);
        let color = gl_check!(gl, gl.create_renderbuffer())
            .map_err(|e| unavailable("color renderbuffer", e))?;
        self.color = Some(color);
        let depth_stencil = gl_check!(gl, gl.create_renderbuffer())
            .map_err(|e| unavailable("depth/stencil renderbuffer", e))?;
        self.depth_stencil = Some(depth_stencil);

        let prior = gl.framebuffer_binding();
        gl_check!(gl, gl.bind_framebuffer(Some(framebuffer)));
        self.allocate_storage(gl, w, h);

        gl_check!(gl, gl.framebuffer_renderbuffer(glow::COLOR_ATTACHMENT0, Some(color)));
        let result = check_status(gl, "color attachment").and_then(|()| {
            gl_check!(gl, gl.framebuffer_renderbuffer(glow::DEPTH_ATTACHMENT, Some(depth_stencil)));
            gl_check!(
                gl,
                gl.framebuffer_renderbuffer(glow::STENCIL_ATTACHMENT, Some(depth_stencil))
            );
            check_status(gl, "depth/stencil attachment")
        });

        gl.bind_framebuffer(prior);
        result
    }

    fn allocate_storage<G: FramebufferApi + ?Sized>(&self, gl: &G, w: i32, h: i32) {
        gl.bind_renderbuffer(self.color);
        gl_check!(gl, gl.renderbuffer_storage(COLOR_FORMAT, w, h));
        gl.bind_renderbuffer(self.depth_stencil);
        gl_check!(gl, gl.renderbuffer_storage(DEPTH_STENCIL_FORMAT, w, h));
        gl.bind_renderbuffer(None);
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw framebuffer name, if one was generated and not yet destroyed.
    pub fn framebuffer(&self) -> Option<NonZeroU32> {
        self.framebuffer
    }

    /// True once construction validated completeness and the object has
    /// not been destroyed or invalidated by a failed resize.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && self.framebuffer.is_some()
    }

    /// The failure recorded during construction or resize, if any.
    pub fn failure(&self) -> Option<&ContextError> {
        self.failure.as_ref()
    }

    /// # Errors
    ///
    /// Returns the recorded failure, or `FramebufferUnavailable` after
    /// `destroy`.
    pub fn ensure_complete(&self) -> Result<(), ContextError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        if self.framebuffer.is_none() {
            return Err(ContextError::FramebufferUnavailable(
                "framebuffer object has been destroyed".into(),
            ));
        }
        Ok(())
    }

    /// Reallocates both renderbuffers at the new size. Attachments are left
    /// in place; completeness is checked again afterwards and a failure
    /// marks the object unusable.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is already unusable, the size is out
    /// of range, or the re-check fails.
    pub fn resize<G: FramebufferApi + ?Sized>(
        &mut self,
        gl: &G,
        width: u32,
        height: u32,
    ) -> Result<(), ContextError> {
        self.ensure_complete()?;
        let (w, h) = gl_dimensions(width, height)?;
        self.allocate_storage(gl, w, h);
        self.width = width;
        self.height = height;

        let prior = gl.framebuffer_binding();
        gl.bind_framebuffer(self.framebuffer);
        let status = check_status(gl, "resize");
        gl.bind_framebuffer(prior);
        if let Err(e) = &status {
            self.failure = Some(e.clone());
        }
        status
    }

    /// Binds this framebuffer and returns the binding it replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is unusable.
    pub fn bind<G: FramebufferApi + ?Sized>(
        &mut self,
        gl: &G,
    ) -> Result<Option<NonZeroU32>, ContextError> {
        self.ensure_complete()?;
        let previous = gl.framebuffer_binding();
        self.previous = Some(previous);
        gl_check!(gl, gl.bind_framebuffer(self.framebuffer));
        Ok(previous)
    }

    /// Restores the binding recorded by the last `bind` and forgets it.
    /// Does nothing if no binding is recorded.
    pub fn unbind<G: FramebufferApi + ?Sized>(&mut self, gl: &G) {
        if let Some(previous) = self.previous.take() {
            gl_check!(gl, gl.bind_framebuffer(previous));
        }
    }

    /// Reads the full framebuffer as RGBA8 (bottom row first).
    ///
    /// Whatever was bound on entry is bound again on return, and a binding
    /// recorded by an outstanding `bind` is left for `unbind` to restore.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is unusable.
    pub fn read_rgba<G: FramebufferApi + ?Sized>(&self, gl: &G) -> Result<Vec<u8>, ContextError> {
        self.ensure_complete()?;
        let prior = gl.framebuffer_binding();
        gl_check!(gl, gl.bind_framebuffer(self.framebuffer));
        let pixels = readback::read_rgba(gl, self.width, self.height);
        gl_check!(gl, gl.bind_framebuffer(prior));
        pixels
    }

    /// Unbinds, then deletes depth/stencil, color, and framebuffer in that
    /// order. Names that were never generated or were already released are
    /// skipped, so calling this twice is harmless.
    pub fn destroy<G: FramebufferApi + ?Sized>(&mut self, gl: &G) {
        self.unbind(gl);
        if let Some(depth_stencil) = self.depth_stencil.take() {
            gl_check!(gl, gl.delete_renderbuffer(depth_stencil));
        }
        if let Some(color) = self.color.take() {
            gl_check!(gl, gl.delete_renderbuffer(color));
        }
        if let Some(framebuffer) = self.framebuffer.take() {
            gl_check!(gl, gl.delete_framebuffer(framebuffer));
        }
    }
}

fn check_status<G: FramebufferApi + ?Sized>(
    gl: &G,
    stage: &'static str,
) -> Result<(), ContextError> {
    let status = gl.check_framebuffer_status();
    if status == glow::FRAMEBUFFER_COMPLETE {
        Ok(())
    } else {
        Err(ContextError::FramebufferIncomplete {
            stage,
            status,
            status_name: framebuffer_status_name(status),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::render::mock::{Call, RecordingGl};
    use proptest::prelude::*;

    fn attach_calls(gl: &RecordingGl) -> Vec<Call> {
        gl.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Attach { .. } | Call::CheckStatus))
            .collect()
    }

    #[test]
    fn construct_attaches_color_then_depth_and_stencil_separately() {
        let gl = RecordingGl::new();
        let fbo = Fbo::new(&gl, 64, 64);
        assert!(fbo.is_complete());

        let color = fbo.color.map(NonZeroU32::get).unwrap();
        let depth = fbo.depth_stencil.map(NonZeroU32::get).unwrap();
        assert_eq!(
            attach_calls(&gl),
            vec![
                Call::Attach {
                    attachment: glow::COLOR_ATTACHMENT0,
                    renderbuffer: color
                },
                Call::CheckStatus,
                Call::Attach {
                    attachment: glow::DEPTH_ATTACHMENT,
                    renderbuffer: depth
                },
                Call::Attach {
                    attachment: glow::STENCIL_ATTACHMENT,
                    renderbuffer: depth
                },
                Call::CheckStatus,
            ]
        );
    }

    #[test]
    fn construct_allocates_rgba8_and_packed_depth_stencil() {
        let gl = RecordingGl::new();
        let fbo = Fbo::new(&gl, 32, 16);
        let color = fbo.color.unwrap().get();
        let depth = fbo.depth_stencil.unwrap().get();
        assert_eq!(gl.storage_of(color), Some((glow::RGBA8, 32, 16)));
        assert_eq!(gl.storage_of(depth), Some((glow::DEPTH24_STENCIL8, 32, 16)));
    }

    #[test]
    fn construct_restores_the_binding_seen_on_entry() {
        let gl = RecordingGl::new();
        gl.set_bound_framebuffer(7);
        let _fbo = Fbo::new(&gl, 8, 8);
        assert_eq!(gl.bound_framebuffer(), 7);
    }

    #[test]
    fn incomplete_color_stage_marks_object_unusable_without_depth_attach() {
        let gl = RecordingGl::new();
        gl.queue_status(glow::FRAMEBUFFER_INCOMPLETE_ATTACHMENT);
        let mut fbo = Fbo::new(&gl, 16, 16);

        assert!(!fbo.is_complete());
        let err = fbo.ensure_complete().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FramebufferIncomplete);
        assert!(err.to_string().contains("color attachment"), "{err}");
        let depth_attached = gl.calls().iter().any(|c| {
            matches!(c, Call::Attach { attachment, .. } if *attachment == glow::DEPTH_ATTACHMENT)
        });
        assert!(!depth_attached);
        assert!(fbo.bind(&gl).is_err());
    }

    #[test]
    fn incomplete_depth_stage_is_reported_once() {
        let gl = RecordingGl::new();
        gl.queue_status(glow::FRAMEBUFFER_COMPLETE);
        gl.queue_status(glow::FRAMEBUFFER_UNSUPPORTED);
        let fbo = Fbo::new(&gl, 16, 16);
        match fbo.failure() {
            Some(ContextError::FramebufferIncomplete { stage, status, .. }) => {
                assert_eq!(*stage, "depth/stencil attachment");
                assert_eq!(*status, glow::FRAMEBUFFER_UNSUPPORTED);
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[test]
    fn name_generation_failure_leaves_nothing_to_free() {
        let gl = RecordingGl::new();
        gl.fail_creation(true);
        let mut fbo = Fbo::new(&gl, 4, 4);
        assert!(!fbo.is_complete());
        assert!(matches!(
            fbo.failure(),
            Some(ContextError::FramebufferUnavailable(_))
        ));
        fbo.destroy(&gl);
        assert_eq!(gl.live_framebuffers(), 0);
    }

    #[test]
    fn zero_size_is_rejected_before_any_allocation() {
        let gl = RecordingGl::new();
        let fbo = Fbo::new(&gl, 0, 64);
        assert_eq!(fbo.failure().map(ContextError::kind), Some(ErrorKind::InvalidAttributes));
        assert!(gl.calls().is_empty());
    }

    #[test]
    fn resize_keeps_attachments_and_rechecks() {
        let gl = RecordingGl::new();
        let mut fbo = Fbo::new(&gl, 64, 64);
        gl.clear_calls();

        fbo.resize(&gl, 128, 128).unwrap();
        assert_eq!((fbo.width(), fbo.height()), (128, 128));
        let calls = gl.calls();
        assert!(!calls.iter().any(|c| matches!(c, Call::Attach { .. })));
        assert_eq!(calls.iter().filter(|c| **c == Call::CheckStatus).count(), 1);
        assert_eq!(
            gl.storage_of(fbo.color.unwrap().get()),
            Some((glow::RGBA8, 128, 128))
        );
    }

    #[test]
    fn failed_resize_marks_object_unusable() {
        let gl = RecordingGl::new();
        let mut fbo = Fbo::new(&gl, 64, 64);
        gl.queue_status(glow::FRAMEBUFFER_INCOMPLETE_ATTACHMENT);
        assert!(fbo.resize(&gl, 32, 32).is_err());
        assert!(!fbo.is_complete());
        assert!(fbo.resize(&gl, 64, 64).is_err());
    }

    #[test]
    fn second_bind_overwrites_the_recorded_binding() {
        let gl = RecordingGl::new();
        gl.set_bound_framebuffer(5);
        let mut fbo = Fbo::new(&gl, 8, 8);
        let own = fbo.framebuffer().map(NonZeroU32::get);

        assert_eq!(fbo.bind(&gl).unwrap(), NonZeroU32::new(5));
        assert_eq!(fbo.bind(&gl).unwrap().map(NonZeroU32::get), own);
        fbo.unbind(&gl);
        assert_eq!(Some(gl.bound_framebuffer()), own);
        fbo.unbind(&gl);
        assert_eq!(Some(gl.bound_framebuffer()), own);
    }

    #[test]
    fn destroy_releases_depth_color_framebuffer_in_order() {
        let gl = RecordingGl::new();
        let mut fbo = Fbo::new(&gl, 8, 8);
        let fb = fbo.framebuffer.unwrap().get();
        let color = fbo.color.unwrap().get();
        let depth = fbo.depth_stencil.unwrap().get();
        fbo.bind(&gl).unwrap();
        gl.clear_calls();

        fbo.destroy(&gl);
        assert_eq!(
            gl.calls(),
            vec![
                Call::BindFramebuffer(0),
                Call::DeleteRenderbuffer(depth),
                Call::DeleteRenderbuffer(color),
                Call::DeleteFramebuffer(fb),
            ]
        );
    }

    #[test]
    fn destroy_twice_is_harmless() {
        let gl = RecordingGl::new();
        let mut fbo = Fbo::new(&gl, 8, 8);
        fbo.destroy(&gl);
        fbo.destroy(&gl);
        assert_eq!(gl.live_framebuffers(), 0);
        assert_eq!(gl.live_renderbuffers(), 0);
        assert!(fbo.ensure_complete().is_err());
    }

    #[test]
    fn destroy_after_partial_construction_skips_missing_names() {
        let gl = RecordingGl::new();
        let mut fbo = Fbo {
            framebuffer: gl.create_framebuffer().ok(),
            color: None,
            depth_stencil: None,
            width: 1,
            height: 1,
            previous: None,
            failure: None,
        };
        fbo.destroy(&gl);
        fbo.destroy(&gl);
        assert_eq!(gl.live_framebuffers(), 0);
    }

    #[test]
    fn large_framebuffer_reads_back_full_buffer() {
        let gl = RecordingGl::new();
        let fbo = Fbo::new(&gl, 4096, 4096);
        assert!(fbo.is_complete());
        assert_eq!(fbo.read_rgba(&gl).unwrap().len(), 4096 * 4096 * 4);
    }

    #[test]
    fn readback_inside_bind_pair_keeps_the_outer_restore() {
        let gl = RecordingGl::new();
        gl.set_bound_framebuffer(5);
        let mut fbo = Fbo::new(&gl, 4, 4);
        let own = fbo.framebuffer().map(NonZeroU32::get);

        fbo.bind(&gl).unwrap();
        let pixels = fbo.read_rgba(&gl).unwrap();
        assert_eq!(pixels.len(), 4 * 4 * 4);
        assert_eq!(Some(gl.bound_framebuffer()), own);
        fbo.unbind(&gl);
        assert_eq!(gl.bound_framebuffer(), 5);
    }

    #[test]
    fn readback_outside_bind_restores_entry_binding() {
        let gl = RecordingGl::new();
        let fbo = Fbo::new(&gl, 2, 2);
        gl.set_bound_framebuffer(9);
        fbo.read_rgba(&gl).unwrap();
        assert_eq!(gl.bound_framebuffer(), 9);
    }

    #[test]
    fn readback_after_destroy_fails() {
        let gl = RecordingGl::new();
        let mut fbo = Fbo::new(&gl, 2, 2);
        fbo.destroy(&gl);
        assert!(fbo.read_rgba(&gl).is_err());
    }

    proptest! {
        #[test]
        fn resize_then_readback_matches_dimensions(
            w in 1u32..=256,
            h in 1u32..=256,
            nw in 1u32..=256,
            nh in 1u32..=256,
        ) {
            let gl = RecordingGl::new();
            let mut fbo = Fbo::new(&gl, w, h);
            prop_assert!(fbo.is_complete());
            fbo.resize(&gl, nw, nh).unwrap();
            prop_assert!(fbo.is_complete());
            let pixels = fbo.read_rgba(&gl).unwrap();
            prop_assert_eq!(pixels.len(), (nw * nh * 4) as usize);
        }

        #[test]
        fn bind_unbind_restores_any_starting_binding(start in 0u32..1000) {
            let gl = RecordingGl::new();
            let mut fbo = Fbo::new(&gl, 4, 4);
            gl.set_bound_framebuffer(start);
            let previous = fbo.bind(&gl).unwrap();
            prop_assert_eq!(previous.map_or(0, NonZeroU32::get), start);
            prop_assert_eq!(Some(gl.bound_framebuffer()), fbo.framebuffer().map(NonZeroU32::get));
            fbo.unbind(&gl);
            prop_assert_eq!(gl.bound_framebuffer(), start);
        }
    }
}
