//! The demo frame: a solid clear, or a vertex-colored triangle when the
//! context has programmable shaders.
//!
//! GLSL text is generated for the dialect [`RenderPath`] picked, so the
//! same triangle runs on desktop 110 through `330 core` and on GLES
//! `100` / `300 es`.

use glow::HasContext;
use offscreen_gl_core::render::{PathKind, RenderPath};
use thiserror::Error;

const CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.15, 1.0];

/// Interleaved `x, y, r, g, b`.
const TRIANGLE: [f32; 15] = [
    -0.6, -0.5, 1.0, 0.2, 0.2, //
    0.6, -0.5, 0.2, 1.0, 0.2, //
    0.0, 0.6, 0.2, 0.2, 1.0,
];
const FLOATS_PER_VERTEX: i32 = 5;

#[derive(Debug, Clone, Error)]
pub enum ShaderError {
    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: &'static str, log: String },
    #[error("program failed to link:\n{0}")]
    Link(String),
    /// Buffer, vertex array, or attribute lookup failed.
    #[error("demo setup failed: {0}")]
    Setup(String),
}

/// Prefixes each source line with its number so driver logs that cite
/// `0:12(3)` can be matched up.
pub fn annotate_source(source: &str, log: &str) -> String {
    let digits = source.lines().count().max(1).to_string().len();
    let mut out = String::new();
    for (i, line) in source.lines().enumerate() {
        out.push_str(&format!("{:>digits$} | {line}\n", i + 1));
    }
    if !log.trim().is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(log.trim_end());
    }
    out
}

fn is_es_dialect(glsl: &str) -> bool {
    glsl == "100" || glsl.ends_with(" es")
}

pub fn vertex_source(glsl: &str, in_out: bool) -> String {
    let (input, output) = if in_out {
        ("in", "out")
    } else {
        ("attribute", "varying")
    };
    format!(
        "#version {glsl}\n\
         {input} vec2 a_position;\n\
         {input} vec3 a_color;\n\
         {output} vec3 v_color;\n\
         void main() {{\n\
         \x20   v_color = a_color;\n\
         \x20   gl_Position = vec4(a_position, 0.0, 1.0);\n\
         }}\n"
    )
}

pub fn fragment_source(glsl: &str, in_out: bool) -> String {
    let mut src = format!("#version {glsl}\n");
    if is_es_dialect(glsl) {
        src.push_str("precision mediump float;\n");
    }
    if in_out {
        src.push_str("in vec3 v_color;\nout vec4 frag_color;\n");
        src.push_str("void main() {\n    frag_color = vec4(v_color, 1.0);\n}\n");
    } else {
        src.push_str("varying vec3 v_color;\n");
        src.push_str("void main() {\n    gl_FragColor = vec4(v_color, 1.0);\n}\n");
    }
    src
}

fn triangle_bytes() -> Vec<u8> {
    TRIANGLE.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

#[allow(unsafe_code)]
fn compile(gl: &glow::Context, stage: u32, source: &str) -> Result<glow::Shader, ShaderError> {
    let name = if stage == glow::VERTEX_SHADER {
        "vertex"
    } else {
        "fragment"
    };
    // SAFETY: the context is current on this thread; the shader handle is
    // deleted on the failure path.
    unsafe {
        let shader = gl
            .create_shader(stage)
            .map_err(|log| ShaderError::Compile { stage: name, log })?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if gl.get_shader_compile_status(shader) {
            return Ok(shader);
        }
        let log = gl.get_shader_info_log(shader);
        gl.delete_shader(shader);
        Err(ShaderError::Compile {
            stage: name,
            log: annotate_source(source, &log),
        })
    }
}

#[allow(unsafe_code)]
fn build_program(
    gl: &glow::Context,
    vertex: &str,
    fragment: &str,
) -> Result<glow::Program, ShaderError> {
    let vs = compile(gl, glow::VERTEX_SHADER, vertex)?;
    let fs = match compile(gl, glow::FRAGMENT_SHADER, fragment) {
        Ok(fs) => fs,
        Err(e) => {
            // SAFETY: `vs` came from a successful compile on this context.
            unsafe { gl.delete_shader(vs) };
            return Err(e);
        }
    };
    // SAFETY: both shader handles are live; the program keeps its own
    // copies after linking so they are released unconditionally.
    unsafe {
        let program = gl.create_program().map_err(ShaderError::Link);
        let linked = program.map(|program| {
            gl.attach_shader(program, vs);
            gl.attach_shader(program, fs);
            gl.link_program(program);
            gl.detach_shader(program, vs);
            gl.detach_shader(program, fs);
            program
        });
        gl.delete_shader(vs);
        gl.delete_shader(fs);
        let program = linked?;
        if gl.get_program_link_status(program) {
            Ok(program)
        } else {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            Err(ShaderError::Link(log))
        }
    }
}

/// GL objects for the triangle.
struct Triangle {
    program: glow::Program,
    buffer: glow::Buffer,
    vertex_array: Option<glow::VertexArray>,
}

/// Everything needed to draw one demo frame on the current context.
pub struct Scene {
    path: RenderPath,
    triangle: Option<Triangle>,
}

impl Scene {
    /// Compiles shaders and uploads the triangle when `path` is modern.
    ///
    /// # Errors
    ///
    /// Returns `ShaderError` when compiling, linking, or buffer setup fails.
    #[allow(unsafe_code)]
    pub fn prepare(gl: &glow::Context, path: RenderPath) -> Result<Self, ShaderError> {
        let glsl = match (path.kind, path.glsl) {
            (PathKind::Modern, Some(glsl)) => glsl,
            _ => {
                log::debug!("demo: clear path");
                return Ok(Self { path, triangle: None });
            }
        };
        let program = build_program(
            gl,
            &vertex_source(glsl, path.in_out),
            &fragment_source(glsl, path.in_out),
        )?;
        log::debug!("demo: triangle with GLSL {glsl}");

        // SAFETY: the context is current; every handle created here is
        // either stored in the returned scene or deleted on error.
        unsafe {
            let vertex_array = if path.needs_vertex_array {
                match gl.create_vertex_array() {
                    Ok(vao) => Some(vao),
                    Err(e) => {
                        gl.delete_program(program);
                        return Err(ShaderError::Setup(e));
                    }
                }
            } else {
                None
            };
            let buffer = match gl.create_buffer() {
                Ok(buffer) => buffer,
                Err(e) => {
                    if let Some(vao) = vertex_array {
                        gl.delete_vertex_array(vao);
                    }
                    gl.delete_program(program);
                    return Err(ShaderError::Setup(e));
                }
            };
            let triangle = Triangle {
                program,
                buffer,
                vertex_array,
            };

            if vertex_array.is_some() {
                gl.bind_vertex_array(vertex_array);
            }
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, &triangle_bytes(), glow::STATIC_DRAW);
            let stride = FLOATS_PER_VERTEX * 4;
            for (name, size, offset) in [("a_position", 2, 0), ("a_color", 3, 2 * 4)] {
                let Some(location) = gl.get_attrib_location(program, name) else {
                    Triangle::delete(gl, &triangle);
                    return Err(ShaderError::Setup(format!("attribute '{name}' not found")));
                };
                gl.enable_vertex_attrib_array(location);
                gl.vertex_attrib_pointer_f32(location, size, glow::FLOAT, false, stride, offset);
            }
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
            if vertex_array.is_some() {
                gl.bind_vertex_array(None);
            }

            Ok(Self {
                path,
                triangle: Some(triangle),
            })
        }
    }

    pub fn path(&self) -> &RenderPath {
        &self.path
    }

    /// Draws into whatever framebuffer is bound.
    #[allow(unsafe_code)]
    pub fn draw(&self, gl: &glow::Context, width: u32, height: u32) {
        let w = i32::try_from(width).unwrap_or(i32::MAX);
        let h = i32::try_from(height).unwrap_or(i32::MAX);
        let [r, g, b, a] = CLEAR_COLOR;
        // SAFETY: the context is current and the triangle handles belong to it.
        unsafe {
            gl.viewport(0, 0, w, h);
            gl.clear_color(r, g, b, a);
            gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
            let Some(triangle) = &self.triangle else {
                return;
            };
            gl.use_program(Some(triangle.program));
            // Without a VAO the attribute pointers set in `prepare` live in
            // the default vertex array state.
            if let Some(vao) = triangle.vertex_array {
                gl.bind_vertex_array(Some(vao));
            }
            gl.draw_arrays(glow::TRIANGLES, 0, 3);
            if triangle.vertex_array.is_some() {
                gl.bind_vertex_array(None);
            }
            gl.use_program(None);
        }
    }

    pub fn destroy(mut self, gl: &glow::Context) {
        if let Some(triangle) = self.triangle.take() {
            Triangle::delete(gl, &triangle);
        }
    }
}

impl Triangle {
    #[allow(unsafe_code)]
    fn delete(gl: &glow::Context, triangle: &Triangle) {
        // SAFETY: handles were created on this context and are deleted once.
        unsafe {
            gl.delete_buffer(triangle.buffer);
            if let Some(vao) = triangle.vertex_array {
                gl.delete_vertex_array(vao);
            }
            gl.delete_program(triangle.program);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotate_numbers_lines_and_appends_log() {
        let out = annotate_source("a\nb", "0:2(1): error: oops\n");
        assert_eq!(out, "1 | a\n2 | b\n\n0:2(1): error: oops");
    }

    #[test]
    fn annotate_pads_line_numbers_to_widest() {
        let source = (0..10).map(|i| format!("l{i}")).collect::<Vec<_>>().join("\n");
        let out = annotate_source(&source, "");
        assert!(out.starts_with(" 1 | l0\n"));
        assert!(out.ends_with("10 | l9\n"));
    }

    #[test]
    fn annotate_with_nothing_is_empty() {
        assert_eq!(annotate_source("", "  "), "");
    }

    #[test]
    fn legacy_dialect_uses_attribute_and_frag_color() {
        let vs = vertex_source("120", false);
        let fs = fragment_source("120", false);
        assert!(vs.starts_with("#version 120\n"));
        assert!(vs.contains("attribute vec2 a_position;"));
        assert!(vs.contains("varying vec3 v_color;"));
        assert!(fs.contains("gl_FragColor"));
        assert!(!fs.contains("precision"));
    }

    #[test]
    fn core_dialect_uses_in_out() {
        let vs = vertex_source("330 core", true);
        let fs = fragment_source("330 core", true);
        assert!(vs.contains("in vec2 a_position;"));
        assert!(vs.contains("out vec3 v_color;"));
        assert!(fs.contains("out vec4 frag_color;"));
        assert!(!fs.contains("gl_FragColor"));
    }

    #[test]
    fn es_dialects_declare_float_precision() {
        assert!(fragment_source("100", false).contains("precision mediump float;"));
        assert!(fragment_source("300 es", true).contains("precision mediump float;"));
        assert!(!vertex_source("100", false).contains("precision"));
    }

    #[test]
    fn triangle_is_three_interleaved_vertices() {
        assert_eq!(TRIANGLE.len() as i32, 3 * FLOATS_PER_VERTEX);
        assert_eq!(triangle_bytes().len(), TRIANGLE.len() * 4);
    }
}
