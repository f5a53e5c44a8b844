#![deny(unsafe_code)]
//! CLI binary for offscreen-gl.
//!
//! Acquires a GL context from the chosen provider, checks the granted
//! version, renders one demo frame into an offscreen framebuffer (or the
//! window for window-backed providers), and writes it as PNG.
//!
//! Subcommands:
//! - (none) -- create a context, render, write PNG, print the report
//! - `providers` -- print compiled-in context providers

mod demo;
mod error;
mod snapshot;

use clap::{Parser, Subcommand};
use demo::Scene;
use error::CliError;
use offscreen_gl_core::render::{read_rgba, FramebufferApi};
use offscreen_gl_core::{
    accept_version, Capabilities, ContextAttributes, ExtFramebuffers, Fbo,
    FramebufferEntryPoints, GlVersion, Profile, RenderMode, RenderPath, RenderingContext,
};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "offscreen-gl", about = "Acquire a GL context and render offscreen")]
struct Cli {
    /// Output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Log native handshake details (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Framebuffer width in pixels.
    #[arg(short = 'W', long, default_value_t = 512)]
    width: u32,

    /// Framebuffer height in pixels.
    #[arg(short = 'H', long, default_value_t = 512)]
    height: u32,

    /// Request desktop OpenGL M.m.
    #[arg(long, value_name = "M.m", conflicts_with = "gles")]
    opengl: Option<String>,

    /// Request OpenGL ES M.m.
    #[arg(long, value_name = "M.m")]
    gles: Option<String>,

    /// Context provider (see `providers`); defaults to the first compiled in.
    #[arg(long = "context", value_name = "PROVIDER")]
    provider: Option<String>,

    /// Desktop profile: core or compatibility.
    #[arg(long, default_value = "compatibility")]
    profile: String,

    /// Hide the window for window-backed providers.
    #[arg(long)]
    invisible: bool,

    /// Demo render path: auto, clear, or modern.
    #[arg(long, default_value = "auto")]
    mode: String,

    /// Explicit GPU device node, e.g. /dev/dri/renderD128.
    #[arg(long, value_name = "PATH")]
    gpu: Option<String>,

    /// Print every EGL device, display, and config before creating the context.
    #[arg(long)]
    dump_egl: bool,

    /// Output file path.
    #[arg(short, long, default_value = "output.png")]
    output: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List compiled-in context providers.
    Providers,
}

impl Cli {
    fn attributes(&self) -> Result<ContextAttributes, CliError> {
        let (version, gles) = match (&self.opengl, &self.gles) {
            (_, Some(v)) => (v.parse::<GlVersion>()?, true),
            (Some(v), None) => (v.parse::<GlVersion>()?, false),
            (None, None) => {
                let d = ContextAttributes::default();
                (d.version(), false)
            }
        };
        let attrs = ContextAttributes {
            width: self.width,
            height: self.height,
            major: version.major,
            minor: version.minor,
            gles,
            profile: self.profile.parse::<Profile>()?,
            invisible: self.invisible,
            gpu: self.gpu.clone(),
        };
        attrs.validate()?;
        Ok(attrs)
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

#[allow(unsafe_code)]
fn load_gl(ctx: &dyn RenderingContext) -> glow::Context {
    // SAFETY: `ctx` is current on this thread, and every pointer it hands
    // back stays valid for as long as the context lives.
    unsafe { glow::Context::from_loader_function_cstr(|name| ctx.get_proc_address(name)) }
}

#[cfg(all(
    feature = "egl",
    unix,
    not(any(target_os = "macos", target_os = "ios", target_os = "android"))
))]
fn dump_egl(gpu: Option<&str>, json: bool) -> Result<(), CliError> {
    use offscreen_gl_backends::diagnostics::{self, Probe};

    let report = diagnostics::dump_egl(gpu)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("EGL client extensions: {}", report.client_extensions.join(" "));
    let displays = report
        .devices
        .iter()
        .chain(report.default_display.iter())
        .chain(report.gbm.iter());
    for display in displays {
        println!("{}:", display.source);
        if let Some(drm) = &display.drm_file {
            println!("  DRM file: {drm}");
        }
        if let Some(err) = &display.error {
            println!("  unavailable: {err}");
            continue;
        }
        println!(
            "  EGL {} ({}, driver {})",
            display.version.as_deref().unwrap_or("?"),
            display.vendor.as_deref().unwrap_or("?"),
            display.driver.as_deref().unwrap_or("?")
        );
        for config in &display.configs {
            let probe = match &config.probe {
                Probe::Ok { version, renderer } => format!("ok: {version} / {renderer}"),
                Probe::Failed { error } => format!("failed: {error}"),
                Probe::Skipped => "skipped".to_string(),
            };
            println!(
                "  config {:>3} [{}] caveat={} -> {probe}",
                config.id,
                config.conformant.join(","),
                config.caveat
            );
        }
    }
    Ok(())
}

#[cfg(not(all(
    feature = "egl",
    unix,
    not(any(target_os = "macos", target_os = "ios", target_os = "android"))
)))]
fn dump_egl(_gpu: Option<&str>, _json: bool) -> Result<(), CliError> {
    Err(CliError::Input(
        "--dump-egl needs the egl provider, which is not built for this target".into(),
    ))
}

/// Draws into a fresh FBO driven through `fb` and reads it back.
fn offscreen_frame<G: FramebufferApi + ?Sized>(
    fb: &G,
    gl: &glow::Context,
    scene: &Scene,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, CliError> {
    let mut fbo = Fbo::new(fb, width, height);
    let pixels = fbo.bind(fb).and_then(|_| {
        scene.draw(gl, width, height);
        let pixels = fbo.read_rgba(fb);
        fbo.unbind(fb);
        pixels
    });
    fbo.destroy(fb);
    Ok(pixels?)
}

/// Renders one frame and returns the bottom-to-top RGBA rows.
fn render_frame(
    ctx: &dyn RenderingContext,
    gl: &glow::Context,
    scene: &Scene,
    caps: &Capabilities,
) -> Result<Vec<u8>, CliError> {
    let (width, height) = (ctx.width(), ctx.height());
    if !ctx.is_offscreen() {
        scene.draw(gl, width, height);
        return Ok(read_rgba(gl, width, height)?);
    }

    match caps.require_framebuffer_objects()? {
        FramebufferEntryPoints::Core => offscreen_frame(gl, gl, scene, width, height),
        FramebufferEntryPoints::Ext => {
            log::info!("using GL_EXT_framebuffer_object entry points");
            let ext = ExtFramebuffers::load(|name| ctx.get_proc_address(name))?;
            offscreen_frame(&ext, gl, scene, width, height)
        }
    }
}

fn render(cli: &Cli) -> Result<(), CliError> {
    let attrs = cli.attributes()?;
    let mode = cli.mode.parse::<RenderMode>()?;
    if cli.dump_egl {
        dump_egl(attrs.gpu_selector(), cli.json)?;
    }

    let provider = match cli.provider.as_deref() {
        Some(name) => name.to_string(),
        None => offscreen_gl_backends::default_provider()
            .ok_or_else(|| CliError::Input("no context provider compiled in".into()))?
            .to_string(),
    };
    let mut ctx = offscreen_gl_backends::create(&provider, &attrs)?;
    ctx.make_current()?;

    let gl = load_gl(&*ctx);
    let caps = Capabilities::query(&gl)?;
    accept_version(&attrs, caps.report(), ctx.info_mut())?;
    let path = RenderPath::select(caps.report(), attrs.requested_profile(), mode)?;
    let scene = Scene::prepare(&gl, path)?;

    let frame = render_frame(&*ctx, &gl, &scene, &caps);
    let written = frame.and_then(|pixels| {
        snapshot::write_png(pixels, ctx.width(), ctx.height(), &cli.output)
    });

    let looped = match (written.is_ok() && !attrs.invisible, ctx.as_drivable()) {
        (true, Some(drivable)) => {
            let (w, h) = (attrs.width, attrs.height);
            drivable
                .run_loop(&mut || scene.draw(&gl, w, h))
                .map_err(CliError::from)
        }
        _ => Ok(()),
    };

    scene.destroy(&gl);
    let offscreen = ctx.is_offscreen();
    ctx.destroy();
    written?;
    looped?;

    let report = caps.report();
    if cli.json {
        let info = serde_json::json!({
            "provider": provider,
            "offscreen": offscreen,
            "width": attrs.width,
            "height": attrs.height,
            "requested": {
                "api": attrs.api().label(),
                "version": attrs.version(),
                "profile": attrs.requested_profile(),
            },
            "granted": report,
            "framebuffer_objects": caps.framebuffer_entry_points(),
            "path": path,
            "output": cli.output.display().to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("GL_VERSION:  {}", report.version_string);
        println!("GL_VENDOR:   {}", report.vendor);
        println!("GL_RENDERER: {}", report.renderer);
        println!("GLSL:        {}", report.shading_language);
        if let Some(profile) = report.profile {
            println!("profile:     {profile}");
        }
        eprintln!(
            "rendered {mode} via {provider} ({}x{}, {} {}) -> {}",
            attrs.width,
            attrs.height,
            attrs.api().label(),
            report.version,
            cli.output.display()
        );
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Some(Command::Providers) => {
            let providers = offscreen_gl_backends::list_providers();
            let default = offscreen_gl_backends::default_provider();
            if cli.json {
                let info = serde_json::json!({
                    "providers": providers,
                    "default": default,
                });
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Providers:");
                for name in providers {
                    let marker = if Some(name) == default { " (default)" } else { "" };
                    println!("  {name}{marker}");
                }
            }
            Ok(())
        }
        None => render(&cli),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let json_mode = cli.json;
    if let Err(e) = run(cli) {
        if json_mode {
            let j = serde_json::json!({"error": e.to_string(), "exit_code": e.exit_code()});
            eprintln!("{}", serde_json::to_string_pretty(&j).unwrap_or_default());
        } else {
            eprintln!("error: {e}");
        }
        process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("offscreen-gl").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_request_gl_2_1_compatibility() {
        let attrs = parse(&[]).attributes().unwrap();
        assert_eq!(attrs, ContextAttributes::default());
    }

    #[test]
    fn gles_flag_selects_es_api() {
        let attrs = parse(&["--gles", "3.0", "-W", "64", "-H", "32"]).attributes().unwrap();
        assert!(attrs.gles);
        assert_eq!(attrs.version(), GlVersion::new(3, 0));
        assert_eq!((attrs.width, attrs.height), (64, 32));
        assert_eq!(attrs.requested_profile(), None);
    }

    #[test]
    fn opengl_and_gles_conflict() {
        let parsed = Cli::try_parse_from(["offscreen-gl", "--opengl", "3.3", "--gles", "2.0"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn core_profile_and_gpu_pass_through() {
        let attrs = parse(&["--opengl", "3.3", "--profile", "core", "--gpu", "/dev/dri/renderD128"])
            .attributes()
            .unwrap();
        assert_eq!(attrs.profile, Profile::Core);
        assert_eq!(attrs.gpu_selector(), Some("/dev/dri/renderD128"));
    }

    #[test]
    fn bad_version_is_an_input_error() {
        let err = parse(&["--opengl", "three"]).attributes().err().unwrap();
        assert_eq!(err.exit_code(), 12);
    }

    #[test]
    fn zero_width_is_rejected_before_any_provider_runs() {
        let err = parse(&["--width", "0"]).attributes().err().unwrap();
        assert_eq!(err.exit_code(), 12);
    }

    #[test]
    fn unknown_provider_fails_with_context_exit_code() {
        let cli = parse(&["--context", "cgl"]);
        let err = render(&cli).err().unwrap();
        assert_eq!(err.exit_code(), 10);
        assert!(err.to_string().contains("cgl"));
    }

    #[test]
    fn providers_subcommand_parses() {
        let cli = parse(&["providers", "--json"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Some(Command::Providers)));
    }
}
