//! glutin provider: a winit window with a glutin context and surface.
//!
//! The only provider that owns an event loop; it implements [`Drivable`].
//! The window is shown unless `invisible` is set, so rendering goes to the
//! default framebuffer and `is_offscreen` is false.

#![allow(unsafe_code)]

use glutin::config::{Api, Config, ConfigTemplateBuilder, GlConfig};
use glutin::context::{
    ContextApi, ContextAttributesBuilder, GlProfile, NotCurrentContext, NotCurrentGlContext,
    PossiblyCurrentContext, PossiblyCurrentGlContext, Version,
};
use glutin::display::{Display, DisplayApiPreference, GlDisplay};
use glutin::surface::{GlSurface, Surface, SurfaceAttributesBuilder, WindowSurface};
use offscreen_gl_core::{
    ContextAttributes, ContextError, ContextInfo, Drivable, Profile, RenderingContext,
};
use std::ffi::{c_void, CStr};
use std::num::NonZeroU32;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawWindowHandle};
use winit::window::{Window, WindowId};

fn native(err: &glutin::error::Error) -> Option<i64> {
    err.raw_code()
}

fn version_component(v: u32) -> Result<u8, ContextError> {
    u8::try_from(v).map_err(|_| {
        ContextError::InvalidAttributes(format!("GL version component {v} out of range"))
    })
}

fn config_api(attrs: &ContextAttributes) -> Api {
    match (attrs.gles, attrs.major) {
        (false, _) => Api::OPENGL,
        (true, 0 | 1) => Api::GLES1,
        (true, 2) => Api::GLES2,
        (true, _) => Api::GLES3,
    }
}

fn display_preference(_window: RawWindowHandle) -> DisplayApiPreference {
    #[cfg(windows)]
    {
        DisplayApiPreference::Wgl(Some(_window))
    }
    #[cfg(target_os = "macos")]
    {
        DisplayApiPreference::Cgl
    }
    #[cfg(not(any(windows, target_os = "macos")))]
    {
        DisplayApiPreference::Egl
    }
}

enum ContextSlot {
    NotCurrent(NotCurrentContext),
    Current(PossiblyCurrentContext),
}

/// A window-backed glutin context.
pub struct GlutinContext {
    info: ContextInfo,
    // Drop order: context, surface, display, window, event loop.
    context: Option<ContextSlot>,
    surface: Option<Surface<WindowSurface>>,
    display: Display,
    window: Option<Window>,
    event_loop: Option<EventLoop<()>>,
}

impl std::fmt::Debug for GlutinContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlutinContext")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl GlutinContext {
    /// Creates the window, then the display, config, context, and surface.
    ///
    /// # Errors
    ///
    /// Fails if no event loop can be created (including a second creation
    /// in the same process), or at the first failing glutin step.
    pub fn create(attrs: &ContextAttributes) -> Result<Self, ContextError> {
        attrs.validate()?;
        let major = version_component(attrs.major)?;
        let minor = version_component(attrs.minor)?;
        let width = NonZeroU32::new(attrs.width)
            .ok_or_else(|| ContextError::InvalidAttributes("width must be non-zero".into()))?;
        let height = NonZeroU32::new(attrs.height)
            .ok_or_else(|| ContextError::InvalidAttributes("height must be non-zero".into()))?;

        let event_loop = EventLoop::new().map_err(|e| {
            ContextError::BackendUnavailable(format!("unable to create an event loop: {e}"))
        })?;
        let window_attributes = Window::default_attributes()
            .with_title("offscreen-gl")
            .with_inner_size(PhysicalSize::new(attrs.width, attrs.height))
            .with_visible(!attrs.invisible)
            .with_resizable(false);
        // Windows are created before the loop runs; the display needs one
        // to pick a config.
        #[allow(deprecated)]
        let window = event_loop
            .create_window(window_attributes)
            .map_err(|e| ContextError::surface(format!("window creation failed: {e}"), None))?;

        let raw_display = event_loop
            .display_handle()
            .map_err(|e| ContextError::device(format!("no display handle: {e}"), None))?
            .as_raw();
        let raw_window = window
            .window_handle()
            .map_err(|e| ContextError::surface(format!("no window handle: {e}"), None))?
            .as_raw();

        // SAFETY: both handles stay valid while `window` and `event_loop`
        // live, and both outlive the display in this struct.
        let display = unsafe { Display::new(raw_display, display_preference(raw_window)) }
            .map_err(|e| ContextError::device(format!("glutin display: {e}"), native(&e)))?;
        log::debug!("glutin display: {}", display.version_string());

        let config = choose_config(&display, attrs, raw_window)?;

        let api = if attrs.gles {
            ContextApi::Gles(Some(Version::new(major, minor)))
        } else {
            ContextApi::OpenGl(Some(Version::new(major, minor)))
        };
        let mut builder = ContextAttributesBuilder::new().with_context_api(api);
        if let Some(profile) = attrs.requested_profile() {
            builder = builder.with_profile(match profile {
                Profile::Core => GlProfile::Core,
                Profile::Compatibility => GlProfile::Compatibility,
            });
        }
        let context_attributes = builder.build(Some(raw_window));
        // SAFETY: `raw_window` is live.
        let context = unsafe { display.create_context(&config, &context_attributes) }.map_err(|e| {
            ContextError::negotiation(
                format!("glutin rejected {} {}: {e}", attrs.api().label(), attrs.version()),
                native(&e),
            )
        })?;

        let surface_attributes =
            SurfaceAttributesBuilder::<WindowSurface>::new().build(raw_window, width, height);
        // SAFETY: `raw_window` is live.
        let surface = unsafe { display.create_window_surface(&config, &surface_attributes) }
            .map_err(|e| ContextError::surface(format!("glutin window surface: {e}"), native(&e)))?;

        log::info!(
            "glutin {} window {}x{}",
            if attrs.invisible { "hidden" } else { "visible" },
            attrs.width,
            attrs.height
        );
        Ok(Self {
            info: ContextInfo::new(attrs.width, attrs.height),
            context: Some(ContextSlot::NotCurrent(context)),
            surface: Some(surface),
            display,
            window: Some(window),
            event_loop: Some(event_loop),
        })
    }

    fn surface(&self) -> Result<&Surface<WindowSurface>, ContextError> {
        self.surface
            .as_ref()
            .ok_or_else(|| ContextError::BackendUnavailable("surface already released".into()))
    }

    fn current(&self) -> Result<&PossiblyCurrentContext, ContextError> {
        match &self.context {
            Some(ContextSlot::Current(context)) => Ok(context),
            _ => Err(ContextError::negotiation("context is not current", None)),
        }
    }
}

fn choose_config(
    display: &Display,
    attrs: &ContextAttributes,
    window: RawWindowHandle,
) -> Result<Config, ContextError> {
    let template = ConfigTemplateBuilder::new()
        .with_alpha_size(8)
        .with_depth_size(24)
        .with_stencil_size(8)
        .with_api(config_api(attrs))
        .compatible_with_native_window(window)
        .build();
    // SAFETY: `window` is live.
    let mut configs = unsafe { display.find_configs(template) }
        .map_err(|e| ContextError::config(format!("glutin config query: {e}"), native(&e)))?;
    let config = configs.next().ok_or_else(|| {
        ContextError::config(
            format!(
                "no glutin config with RGBA8, depth 24, stencil 8 for {}",
                attrs.api().label()
            ),
            None,
        )
    })?;
    log::info!(
        "selected glutin config: alpha {}, depth {}, stencil {}, {} samples",
        config.alpha_size(),
        config.depth_size(),
        config.stencil_size(),
        config.num_samples()
    );
    Ok(config)
}

impl RenderingContext for GlutinContext {
    fn info(&self) -> &ContextInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ContextInfo {
        &mut self.info
    }

    fn provider(&self) -> &'static str {
        "glutin"
    }

    fn is_offscreen(&self) -> bool {
        false
    }

    fn make_current(&mut self) -> Result<(), ContextError> {
        self.info.ensure_live()?;
        let surface = self
            .surface
            .as_ref()
            .ok_or_else(|| ContextError::BackendUnavailable("surface already released".into()))?;
        let failed = |e: glutin::error::Error| {
            ContextError::negotiation(format!("make_current failed: {e}"), native(&e))
        };
        let slot = match self.context.take() {
            Some(ContextSlot::NotCurrent(context)) => {
                ContextSlot::Current(context.make_current(surface).map_err(failed)?)
            }
            Some(ContextSlot::Current(context)) => {
                let result = context.make_current(surface);
                self.context = Some(ContextSlot::Current(context));
                result.map_err(failed)?;
                self.info.mark_current();
                return Ok(());
            }
            None => {
                return Err(ContextError::BackendUnavailable(
                    "context was lost by an earlier failure".into(),
                ))
            }
        };
        self.context = Some(slot);
        self.info.mark_current();
        Ok(())
    }

    fn release_current(&mut self) -> Result<(), ContextError> {
        self.info.ensure_live()?;
        if let Some(ContextSlot::Current(context)) = self.context.take() {
            let context = context.make_not_current().map_err(|e| {
                ContextError::negotiation(format!("make_not_current failed: {e}"), native(&e))
            })?;
            self.context = Some(ContextSlot::NotCurrent(context));
        }
        self.info.mark_not_current();
        Ok(())
    }

    fn destroy(&mut self) {
        if !self.info.mark_destroyed() {
            return;
        }
        if let Some(ContextSlot::Current(context)) = self.context.take() {
            if let Err(e) = context.make_not_current() {
                log::error!("make_not_current during teardown failed: {e}");
            }
        }
        self.surface = None;
        // The display, window, and event loop go with the struct, in
        // field order.
        log::debug!("released glutin context");
    }

    fn get_proc_address(&self, name: &CStr) -> *const c_void {
        self.display.get_proc_address(name)
    }

    fn as_drivable(&mut self) -> Option<&mut dyn Drivable> {
        Some(self)
    }
}

impl Drop for GlutinContext {
    fn drop(&mut self) {
        self.destroy();
    }
}

struct LoopApp<'a> {
    window: &'a Window,
    surface: &'a Surface<WindowSurface>,
    context: &'a PossiblyCurrentContext,
    render: &'a mut dyn FnMut(),
    frames: u64,
    error: Option<ContextError>,
}

impl ApplicationHandler for LoopApp<'_> {
    fn resumed(&mut self, _event_loop: &ActiveEventLoop) {
        self.window.request_redraw();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => event_loop.exit(),
            WindowEvent::RedrawRequested => {
                (self.render)();
                if let Err(e) = self.surface.swap_buffers(self.context) {
                    let message = format!("swap_buffers failed: {e}");
                    self.error = Some(ContextError::surface(message, native(&e)));
                    event_loop.exit();
                    return;
                }
                self.frames += 1;
                self.window.request_redraw();
            }
            _ => {}
        }
    }
}

impl Drivable for GlutinContext {
    fn run_loop(&mut self, render: &mut dyn FnMut()) -> Result<(), ContextError> {
        self.info.ensure_live()?;
        let event_loop = self
            .event_loop
            .take()
            .ok_or_else(|| {
                ContextError::BackendUnavailable("the event loop has already run".into())
            })?;
        if !matches!(self.context, Some(ContextSlot::Current(_))) {
            self.make_current()?;
        }
        let window = self
            .window
            .as_ref()
            .ok_or_else(|| ContextError::BackendUnavailable("window already released".into()))?;
        let mut app = LoopApp {
            window,
            surface: self.surface()?,
            context: self.current()?,
            render,
            frames: 0,
            error: None,
        };
        event_loop
            .run_app(&mut app)
            .map_err(|e| ContextError::BackendUnavailable(format!("event loop failed: {e}")))?;
        log::info!("event loop finished after {} frames", app.frames);
        match app.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_api_follows_request() {
        let gl = ContextAttributes::default();
        assert_eq!(config_api(&gl), Api::OPENGL);
        let es2 = ContextAttributes {
            gles: true,
            major: 2,
            ..Default::default()
        };
        assert_eq!(config_api(&es2), Api::GLES2);
        let es3 = ContextAttributes {
            gles: true,
            major: 3,
            ..Default::default()
        };
        assert_eq!(config_api(&es3), Api::GLES3);
    }

    #[test]
    fn version_components_fit_in_a_byte() {
        assert_eq!(version_component(4).unwrap(), 4);
        assert!(version_component(256).is_err());
    }

    #[test]
    #[ignore = "requires GL driver"]
    fn window_context_is_drivable() {
        let attrs = ContextAttributes {
            invisible: true,
            width: 64,
            height: 64,
            ..Default::default()
        };
        let mut ctx = GlutinContext::create(&attrs).unwrap();
        assert!(!ctx.is_offscreen());
        ctx.make_current().unwrap();
        assert!(!ctx.get_proc_address(c"glGetString").is_null());
        assert!(ctx.as_drivable().is_some());
        ctx.destroy();
    }
}
