#[allow(unused_imports)]
use log::{debug, error, info, warn};

use crate::{shader_header, BackendError, Framebuffer};
use regex::{Captures, Regex};
use std::collections::HashMap;
use web_sys::{
    WebGl2RenderingContext as Context, WebGlBuffer, WebGlProgram, WebGlShader, WebGlTexture,
};

/// Static description of one GLSL stage.
#[derive(Debug)]
pub struct ShaderInfo {
    pub name: &'static str,
    pub code: &'static str,
    pub defines: &'static [&'static str],
    pub uniform_blocks: &'static [&'static str],
    pub texture_units: &'static [&'static str],
}

#[derive(Clone, Copy, Debug)]
pub enum BindingPoint {
    TextureUnit(u32),
    UniformBlock(u32),
}

#[derive(Debug)]
pub struct Shader {
    gl: Context,
    invalidated: bool,
    handle: Option<WebGlProgram>,
    vertex: &'static ShaderInfo,
    fragment: &'static ShaderInfo,

    binds: HashMap<&'static str, BindingPoint>,
    defines: HashMap<&'static str, String>,
}

fn merge_sort_dedup(lhs: &[&'static str], rhs: &[&'static str]) -> Vec<&'static str> {
    let mut vec = Vec::with_capacity(lhs.len() + rhs.len());

    vec.extend_from_slice(lhs);
    vec.extend_from_slice(rhs);
    vec.sort_unstable();
    vec.dedup();
    vec
}

fn shader_error(err: impl ToString) -> BackendError {
    BackendError::Shader(err.to_string())
}

impl Shader {
    pub fn new(gl: Context, vertex: &'static ShaderInfo, fragment: &'static ShaderInfo) -> Self {
        let mut defines = HashMap::new();

        for key in merge_sort_dedup(vertex.defines, fragment.defines) {
            defines.insert(key, String::new());
        }

        let mut binds = HashMap::new();

        let uniform_blocks = merge_sort_dedup(vertex.uniform_blocks, fragment.uniform_blocks);
        let texture_units = merge_sort_dedup(vertex.texture_units, fragment.texture_units);

        for (index, &key) in uniform_blocks.iter().enumerate() {
            binds.insert(key, BindingPoint::UniformBlock(index as u32));
        }

        for (index, &key) in texture_units.iter().enumerate() {
            binds.insert(key, BindingPoint::TextureUnit(index as u32));
        }

        Self {
            gl,
            handle: None,
            vertex,
            fragment,
            binds,
            defines,
            invalidated: true,
        }
    }

    pub fn set_define(&mut self, define: &'static str, value: impl ToString) {
        assert!(self.defines.contains_key(define));

        if self.defines.get(define) != Some(&value.to_string()) {
            self.defines.insert(define, value.to_string());
            self.invalidated = true;
        }
    }

    pub fn begin_draw(&self) -> DrawCommand {
        DrawCommand::new(self)
    }

    pub fn invalidate(&mut self) {
        self.invalidated = true;
        self.handle = None;
    }

    /// Rebuilds the shader with the current source.
    pub fn rebuild(&mut self) -> Result<(), BackendError> {
        if !self.invalidated {
            return Ok(());
        }

        if let Some(handle) = &self.handle {
            self.gl.delete_program(Some(handle));
        }

        self.invalidated = false;

        let vert = self.compile_shader(Context::VERTEX_SHADER, self.vertex)?;
        let frag = self.compile_shader(Context::FRAGMENT_SHADER, self.fragment)?;

        if let (Some(vert), Some(frag)) = (&vert, &frag) {
            self.handle = self.link_program(vert, frag)?;
            self.configure_binds(); // initialize shader
        } else {
            self.handle = None;
        }

        Ok(())
    }

    fn configure_binds(&self) {
        if let Some(program) = &self.handle {
            self.gl.use_program(Some(program));

            for (&name, &binding_point) in &self.binds {
                match binding_point {
                    BindingPoint::TextureUnit(slot) => {
                        let location = self.gl.get_uniform_location(program, name);

                        if let Some(location) = location {
                            self.gl.uniform1i(Some(&location), slot as i32);
                        } else {
                            warn!("no such shader binding point: {}", name);
                        }
                    }
                    BindingPoint::UniformBlock(slot) => {
                        let index = self.gl.get_uniform_block_index(program, name);

                        if index != Context::INVALID_INDEX {
                            self.gl.uniform_block_binding(program, index, slot);
                        } else {
                            warn!("no such shader binding point: {}", name);
                        }
                    }
                }
            }
        }
    }

    fn compile_shader(
        &self,
        kind: u32,
        info: &'static ShaderInfo,
    ) -> Result<Option<WebGlShader>, BackendError> {
        let shader = self.gl.create_shader(kind);

        if let Some(shader) = &shader {
            let glsl_source = Self::generate_source(info.code, &self.defines)?;

            self.gl.shader_source(shader, &glsl_source);
            self.gl.compile_shader(shader);

            if let Some(error) = self.get_shader_build_error(shader) {
                let pattern = Regex::new(r#"0:([0-9]+):"#).map_err(shader_error)?;

                let error = pattern.replace_all(&error, |caps: &Captures| {
                    let line = caps[1].parse().unwrap_or(0);
                    let (file, line) = Self::determine_real_position(&glsl_source, line);

                    format!("{}:{}:", file, line)
                });

                error!("{}", error);
                return Err(shader_error(format!("failed to compile `{}'", info.name)));
            }
        }

        Ok(shader)
    }

    fn link_program(
        &self,
        vert: &WebGlShader,
        frag: &WebGlShader,
    ) -> Result<Option<WebGlProgram>, BackendError> {
        let program = self.gl.create_program();

        if let Some(program) = &program {
            self.gl.attach_shader(program, vert);
            self.gl.attach_shader(program, frag);

            self.gl.link_program(program);

            self.gl.delete_shader(Some(vert));
            self.gl.delete_shader(Some(frag));

            if let Some(error) = self.get_program_link_error(program) {
                error!("{}", error);
                return Err(shader_error("failed to link shader program"));
            }
        }

        Ok(program)
    }

    fn get_shader_build_error(&self, shader: &WebGlShader) -> Option<String> {
        if self.gl.is_context_lost() {
            return None;
        }

        let status = self
            .gl
            .get_shader_parameter(shader, Context::COMPILE_STATUS);

        if status.as_bool().unwrap_or(false) {
            return None;
        }

        Some(
            self.gl
                .get_shader_info_log(shader)
                .unwrap_or_else(|| String::from("unknown shader building error")),
        )
    }

    fn get_program_link_error(&self, program: &WebGlProgram) -> Option<String> {
        if self.gl.is_context_lost() {
            return None;
        }

        let status = self.gl.get_program_parameter(program, Context::LINK_STATUS);

        if status.as_bool().unwrap_or(false) {
            return None;
        }

        Some(
            self.gl
                .get_program_info_log(program)
                .unwrap_or_else(|| String::from("unknown program linking error")),
        )
    }

    fn generate_source(
        glsl_source: &str,
        defines: &HashMap<&'static str, String>,
    ) -> Result<String, BackendError> {
        let pattern = Regex::new(r#"^#include <([[:graph:]]*)>$"#).map_err(shader_error)?;

        let mut source = String::from(
            r#"#version 300 es
            precision highp float;
        "#,
        );
        source.reserve(glsl_source.len());

        for (name, value) in defines {
            source += "#define ";
            source += name;
            source += " (";
            source += value;
            source += ")\n";
        }

        for line in glsl_source.lines() {
            if let Some(captures) = pattern.captures(line) {
                if let Some(code) = shader_header(&captures[1]) {
                    source += code;
                    source += "\n";
                    continue;
                }

                warn!("unknown shader header `{}'", &captures[1]);
            }

            source += line;
            source += "\n";
        }

        Ok(source)
    }

    /// Finds the position of a GLSL source line through file/line markers.
    fn determine_real_position(source: &str, line: u32) -> (String, u32) {
        let pattern = match Regex::new(r#"^// __POS__ ([^:]+):([0-9]+)$"#) {
            Ok(pattern) => pattern,
            Err(_) => return (String::from("<unknown>"), line),
        };

        let lines: Vec<&str> = source.lines().collect();

        for index in (0..(line as usize).min(lines.len())).rev() {
            if let Some(captures) = pattern.captures(lines[index]) {
                let start: usize = captures[2].parse().unwrap_or(0);

                let position = (start + line as usize).saturating_sub(index + 2);

                return (captures[1].to_owned(), position as u32);
            }
        }

        (String::from("<unknown>"), line)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            self.gl.delete_program(Some(handle));
        }
    }
}

#[derive(Debug)]
pub struct DrawCommand<'a> {
    shader: &'a Shader,
}

#[derive(Debug)]
pub enum BindTarget<'a> {
    UniformBuffer(Option<&'a WebGlBuffer>),
    Texture(Option<&'a WebGlTexture>),
}

pub trait AsBindTarget {
    fn bind_target(&self) -> BindTarget;
}

impl AsBindTarget for WebGlTexture {
    fn bind_target(&self) -> BindTarget {
        BindTarget::Texture(Some(self))
    }
}

impl<'a> DrawCommand<'a> {
    fn new(shader: &'a Shader) -> Self {
        shader.gl.use_program(shader.handle.as_ref());

        shader.gl.disable(Context::BLEND);
        shader.gl.disable(Context::DEPTH_TEST);
        shader.gl.disable(Context::SCISSOR_TEST);
        shader.gl.disable(Context::STENCIL_TEST);
        shader.gl.viewport(0, 0, 0, 0);

        Self { shader }
    }

    pub fn bind(&self, target: &dyn AsBindTarget, slot: &str) {
        match target.bind_target() {
            BindTarget::UniformBuffer(handle) => self.bind_uniform_buffer(handle, slot),
            BindTarget::Texture(handle) => self.bind_texture(handle, slot),
        }
    }

    pub fn set_viewport(&self, x: i32, y: i32, w: i32, h: i32) {
        self.shader.gl.viewport(x, y, w, h);
    }

    pub fn set_framebuffer(&self, target: &Framebuffer) {
        self.shader
            .gl
            .bind_framebuffer(Context::DRAW_FRAMEBUFFER, target.handle());
    }

    pub fn set_canvas_framebuffer(&self) {
        self.shader
            .gl
            .bind_framebuffer(Context::DRAW_FRAMEBUFFER, None);
    }

    /// Draws one triangle covering the viewport, generated from the vertex id.
    pub fn draw_fullscreen(&self) {
        self.shader.gl.bind_vertex_array(None);
        self.shader.gl.draw_arrays(Context::TRIANGLES, 0, 3);
    }

    pub fn set_uniform_float(&self, name: &str, value: f32) {
        if let Some(program) = &self.shader.handle {
            let location = self.shader.gl.get_uniform_location(program, name);
            self.shader.gl.uniform1f(location.as_ref(), value);
        }
    }

    fn bind_uniform_buffer(&self, handle: Option<&WebGlBuffer>, slot: &str) {
        if let Some(&BindingPoint::UniformBlock(slot)) = self.shader.binds.get(slot) {
            self.shader
                .gl
                .bind_buffer_base(Context::UNIFORM_BUFFER, slot, handle);
        } else {
            warn!("slot '{}' does not map to a uniform block", slot);
        }
    }

    fn bind_texture(&self, handle: Option<&WebGlTexture>, slot: &str) {
        if let Some(&BindingPoint::TextureUnit(slot)) = self.shader.binds.get(slot) {
            self.shader.gl.active_texture(Context::TEXTURE0 + slot);
            self.shader.gl.bind_texture(Context::TEXTURE_2D, handle);
        } else {
            warn!("slot '{}' does not map to a texture unit", slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_known_headers_and_defines() {
        let mut defines = HashMap::new();
        defines.insert("SAMPLES", String::from("32"));

        let source =
            Shader::generate_source("#include <equirect.glsl>\nvoid main() {}", &defines).unwrap();

        assert!(source.starts_with("#version 300 es"));
        assert!(source.contains("#define SAMPLES (32)"));
        assert!(source.contains("vec2 direction_to_equirect"));
        assert!(!source.contains("#include"));
    }

    #[test]
    fn maps_error_lines_through_markers() {
        let source = "#version 300 es\n// __POS__ prefilter.frag:1\nline one\nline two\n";

        assert_eq!(
            Shader::determine_real_position(source, 4),
            (String::from("prefilter.frag"), 2)
        );
    }
}
