//! A headless [`GlContext`] that records what it is asked to do.
//!
//! Object names are handed out from a single counter and never reused, so a
//! handle seen after deletion can always be told apart from a live one. The
//! "compiler" only checks structure (a `main` function, balanced delimiters)
//! and the "linker" matches fragment inputs against vertex outputs by name
//! and type, which is enough to exercise every failure path of a build. Like
//! a real linker it only keeps uniforms that some `main` body reads.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::context::GlContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockShader(NonZeroU32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockProgram(NonZeroU32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockBuffer(NonZeroU32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockVertexArray(NonZeroU32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockUniformLocation(u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
}

/// A draw call, resolved against the buffers bound when it was issued.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: Option<MockProgram>,
    pub mode: u32,
    pub indices: Vec<u32>,
    /// Attribute 0 of every vertex, padded to three components.
    pub positions: Vec<[f32; 3]>,
}

#[derive(Debug)]
struct ShaderObject {
    shader_type: u32,
    source: String,
    compile: Option<Result<(), String>>,
}

#[derive(Debug, Default)]
struct ProgramObject {
    attached: Vec<MockShader>,
    link: Option<Result<(), String>>,
    uniforms: Vec<(String, Option<UniformValue>)>,
}

#[derive(Debug, Clone, Copy)]
struct Attribute {
    buffer: MockBuffer,
    size: i32,
    stride: i32,
    offset: i32,
    enabled: bool,
}

#[derive(Debug, Default)]
struct VertexArrayObject {
    element_buffer: Option<MockBuffer>,
    attributes: HashMap<u32, Attribute>,
}

#[derive(Debug, Default)]
struct State {
    last_name: u32,
    /// Successful `create_*` calls left before they start failing.
    creations_left: Option<usize>,

    shaders: HashMap<MockShader, ShaderObject>,
    programs: HashMap<MockProgram, ProgramObject>,
    deleted_programs: Vec<MockProgram>,
    buffers: HashMap<MockBuffer, Vec<u8>>,
    vertex_arrays: HashMap<MockVertexArray, VertexArrayObject>,

    current_program: Option<MockProgram>,
    array_buffer: Option<MockBuffer>,
    current_vertex_array: Option<MockVertexArray>,

    uniform_uploads: usize,
    viewport: [i32; 4],
    clear_color: [f32; 4],
    clears: Vec<u32>,
    draws: Vec<DrawCall>,
}

impl State {
    fn next_name(&mut self) -> Result<NonZeroU32, String> {
        match self.creations_left.as_mut() {
            Some(0) => return Err("out of object names".to_string()),
            Some(left) => *left -= 1,
            None => {}
        }
        self.last_name += 1;
        NonZeroU32::new(self.last_name).ok_or_else(|| "object name overflow".to_string())
    }
}

#[derive(Debug, Default)]
pub struct MockContext {
    state: Mutex<State>,
}

impl MockContext {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every subsequent `create_*` call fail.
    pub fn fail_object_creation(&self, fail: bool) {
        self.state().creations_left = fail.then_some(0);
    }

    /// Lets `successes` more `create_*` calls through, then fails the rest.
    pub fn fail_object_creation_after(&self, successes: usize) {
        self.state().creations_left = Some(successes);
    }

    pub fn active_program(&self) -> Option<MockProgram> {
        self.state().current_program
    }

    pub fn live_shader_count(&self) -> usize {
        self.state().shaders.len()
    }

    pub fn live_program_count(&self) -> usize {
        self.state().programs.len()
    }

    pub fn is_program_deleted(&self, program: MockProgram) -> bool {
        self.state().deleted_programs.contains(&program)
    }

    pub fn is_program_linked(&self, program: MockProgram) -> bool {
        self.state()
            .programs
            .get(&program)
            .is_some_and(|p| matches!(p.link, Some(Ok(()))))
    }

    pub fn uniform_value(&self, program: MockProgram, name: &str) -> Option<UniformValue> {
        let state = self.state();
        let program = state.programs.get(&program)?;
        program
            .uniforms
            .iter()
            .find(|(uniform, _)| uniform == name)
            .and_then(|(_, value)| *value)
    }

    /// Number of uniform writes that landed on a program.
    pub fn uniform_upload_count(&self) -> usize {
        self.state().uniform_uploads
    }

    pub fn viewport_rect(&self) -> [i32; 4] {
        self.state().viewport
    }

    pub fn current_clear_color(&self) -> [f32; 4] {
        self.state().clear_color
    }

    pub fn clears(&self) -> Vec<u32> {
        self.state().clears.clone()
    }

    pub fn draw_calls(&self) -> Vec<DrawCall> {
        self.state().draws.clone()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.state().buffers.len()
    }

    pub fn live_vertex_array_count(&self) -> usize {
        self.state().vertex_arrays.len()
    }

    fn store_uniform(&self, location: Option<&MockUniformLocation>, value: UniformValue) {
        let Some(location) = location else {
            return;
        };
        let mut state = self.state();
        let Some(current) = state.current_program else {
            return;
        };
        let stored = state
            .programs
            .get_mut(&current)
            .and_then(|program| program.uniforms.get_mut(location.0 as usize))
            .map(|(_, slot)| *slot = Some(value))
            .is_some();
        if stored {
            state.uniform_uploads += 1;
        }
    }
}

impl GlContext for MockContext {
    type Shader = MockShader;
    type Program = MockProgram;
    type Buffer = MockBuffer;
    type VertexArray = MockVertexArray;
    type UniformLocation = MockUniformLocation;

    fn create_shader(&self, shader_type: u32) -> Result<Self::Shader, String> {
        let mut state = self.state();
        let shader = MockShader(state.next_name()?);
        state.shaders.insert(
            shader,
            ShaderObject {
                shader_type,
                source: String::new(),
                compile: None,
            },
        );
        Ok(shader)
    }

    fn shader_source(&self, shader: Self::Shader, source: &str) {
        if let Some(object) = self.state().shaders.get_mut(&shader) {
            object.source = source.to_string();
        }
    }

    fn compile_shader(&self, shader: Self::Shader) {
        if let Some(object) = self.state().shaders.get_mut(&shader) {
            object.compile = Some(check_syntax(&object.source));
        }
    }

    fn shader_compile_status(&self, shader: Self::Shader) -> bool {
        self.state()
            .shaders
            .get(&shader)
            .is_some_and(|s| matches!(s.compile, Some(Ok(()))))
    }

    fn shader_info_log(&self, shader: Self::Shader) -> String {
        match self.state().shaders.get(&shader).and_then(|s| s.compile.clone()) {
            Some(Err(log)) => log,
            _ => String::new(),
        }
    }

    fn delete_shader(&self, shader: Self::Shader) {
        self.state().shaders.remove(&shader);
    }

    fn create_program(&self) -> Result<Self::Program, String> {
        let mut state = self.state();
        let program = MockProgram(state.next_name()?);
        state.programs.insert(program, ProgramObject::default());
        Ok(program)
    }

    fn attach_shader(&self, program: Self::Program, shader: Self::Shader) {
        if let Some(object) = self.state().programs.get_mut(&program) {
            object.attached.push(shader);
        }
    }

    fn link_program(&self, program: Self::Program) {
        let mut state = self.state();
        let Some(attached) = state.programs.get(&program).map(|p| p.attached.clone()) else {
            return;
        };
        let stages: Vec<&ShaderObject> = attached
            .iter()
            .filter_map(|shader| state.shaders.get(shader))
            .collect();

        let result = link(&stages);
        let uniforms = match result {
            Ok(()) => declared_uniforms(&stages),
            Err(_) => Vec::new(),
        };

        if let Some(object) = state.programs.get_mut(&program) {
            object.link = Some(result);
            object.uniforms = uniforms;
        }
    }

    fn program_link_status(&self, program: Self::Program) -> bool {
        self.is_program_linked(program)
    }

    fn program_info_log(&self, program: Self::Program) -> String {
        match self.state().programs.get(&program).and_then(|p| p.link.clone()) {
            Some(Err(log)) => log,
            _ => String::new(),
        }
    }

    fn delete_program(&self, program: Self::Program) {
        let mut state = self.state();
        if state.programs.remove(&program).is_some() {
            state.deleted_programs.push(program);
        }
        if state.current_program == Some(program) {
            state.current_program = None;
        }
    }

    fn use_program(&self, program: Option<Self::Program>) {
        self.state().current_program = program;
    }

    fn uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::UniformLocation> {
        let state = self.state();
        let index = state
            .programs
            .get(&program)?
            .uniforms
            .iter()
            .position(|(uniform, _)| uniform == name)?;
        u32::try_from(index).ok().map(MockUniformLocation)
    }

    fn uniform_1_i32(&self, location: Option<&Self::UniformLocation>, value: i32) {
        self.store_uniform(location, UniformValue::Int(value));
    }

    fn uniform_1_f32(&self, location: Option<&Self::UniformLocation>, value: f32) {
        self.store_uniform(location, UniformValue::Float(value));
    }

    fn create_vertex_array(&self) -> Result<Self::VertexArray, String> {
        let mut state = self.state();
        let vertex_array = MockVertexArray(state.next_name()?);
        state
            .vertex_arrays
            .insert(vertex_array, VertexArrayObject::default());
        Ok(vertex_array)
    }

    fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>) {
        self.state().current_vertex_array = vertex_array;
    }

    fn delete_vertex_array(&self, vertex_array: Self::VertexArray) {
        let mut state = self.state();
        state.vertex_arrays.remove(&vertex_array);
        if state.current_vertex_array == Some(vertex_array) {
            state.current_vertex_array = None;
        }
    }

    fn create_buffer(&self) -> Result<Self::Buffer, String> {
        let mut state = self.state();
        let buffer = MockBuffer(state.next_name()?);
        state.buffers.insert(buffer, Vec::new());
        Ok(buffer)
    }

    fn bind_buffer(&self, target: u32, buffer: Option<Self::Buffer>) {
        let mut state = self.state();
        match target {
            glow::ARRAY_BUFFER => state.array_buffer = buffer,
            // The element binding lives in the vertex array.
            glow::ELEMENT_ARRAY_BUFFER => {
                if let Some(current) = state.current_vertex_array {
                    if let Some(vao) = state.vertex_arrays.get_mut(&current) {
                        vao.element_buffer = buffer;
                    }
                }
            }
            _ => {}
        }
    }

    fn buffer_data(&self, target: u32, data: &[u8], _usage: u32) {
        let mut state = self.state();
        let bound = match target {
            glow::ARRAY_BUFFER => state.array_buffer,
            glow::ELEMENT_ARRAY_BUFFER => state
                .current_vertex_array
                .and_then(|vao| state.vertex_arrays.get(&vao))
                .and_then(|vao| vao.element_buffer),
            _ => None,
        };
        if let Some(storage) = bound.and_then(|buffer| state.buffers.get_mut(&buffer)) {
            *storage = data.to_vec();
        }
    }

    fn delete_buffer(&self, buffer: Self::Buffer) {
        let mut state = self.state();
        state.buffers.remove(&buffer);
        if state.array_buffer == Some(buffer) {
            state.array_buffer = None;
        }
    }

    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        size: i32,
        _data_type: u32,
        _normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        let mut state = self.state();
        let (Some(current), Some(buffer)) = (state.current_vertex_array, state.array_buffer) else {
            return;
        };
        if let Some(vao) = state.vertex_arrays.get_mut(&current) {
            let enabled = vao.attributes.get(&index).is_some_and(|a| a.enabled);
            vao.attributes.insert(
                index,
                Attribute {
                    buffer,
                    size,
                    stride,
                    offset,
                    enabled,
                },
            );
        }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        let mut state = self.state();
        let Some(current) = state.current_vertex_array else {
            return;
        };
        if let Some(attribute) = state
            .vertex_arrays
            .get_mut(&current)
            .and_then(|vao| vao.attributes.get_mut(&index))
        {
            attribute.enabled = true;
        }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        self.state().viewport = [x, y, width, height];
    }

    fn clear_color(&self, color: [f32; 4]) {
        self.state().clear_color = color;
    }

    fn clear(&self, mask: u32) {
        self.state().clears.push(mask);
    }

    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: i32) {
        let mut state = self.state();
        let draw = resolve_draw(&state, mode, count, element_type, offset);
        state.draws.push(draw);
    }
}

fn resolve_draw(state: &State, mode: u32, count: i32, element_type: u32, offset: i32) -> DrawCall {
    let vao = state
        .current_vertex_array
        .and_then(|vao| state.vertex_arrays.get(&vao));

    let indices: Vec<u32> = match (
        element_type,
        vao.and_then(|vao| vao.element_buffer)
            .and_then(|ebo| state.buffers.get(&ebo)),
    ) {
        (glow::UNSIGNED_INT, Some(bytes)) => bytes
            .get(offset.max(0) as usize..)
            .unwrap_or_default()
            .chunks_exact(4)
            .take(count.max(0) as usize)
            .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
        _ => Vec::new(),
    };

    let positions = vao
        .and_then(|vao| vao.attributes.get(&0))
        .filter(|attribute| attribute.enabled)
        .and_then(|attribute| {
            let bytes = state.buffers.get(&attribute.buffer)?;
            Some(read_positions(bytes, attribute))
        })
        .unwrap_or_default();

    DrawCall {
        program: state.current_program,
        mode,
        indices,
        positions,
    }
}

fn read_positions(bytes: &[u8], attribute: &Attribute) -> Vec<[f32; 3]> {
    let size = attribute.size.clamp(1, 3) as usize;
    let stride = if attribute.stride > 0 {
        attribute.stride as usize
    } else {
        4 * attribute.size.max(1) as usize
    };

    let mut positions = Vec::new();
    let mut start = attribute.offset.max(0) as usize;
    while start + 4 * size <= bytes.len() {
        let mut position = [0.0; 3];
        for (component, value) in position.iter_mut().take(size).enumerate() {
            let at = start + 4 * component;
            *value = f32::from_ne_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        }
        positions.push(position);
        start += stride;
    }
    positions
}

/// What the mock accepts as a compilable stage.
fn check_syntax(source: &str) -> Result<(), String> {
    if source.trim().is_empty() {
        return Err("0:1(1): error: syntax error, unexpected end of file".to_string());
    }

    let mut depth: Vec<(char, usize)> = Vec::new();
    for (line_index, line) in source.lines().enumerate() {
        let line_number = line_index + 1;
        for c in line.chars() {
            match c {
                '{' | '(' => depth.push((c, line_number)),
                '}' | ')' => {
                    let expected = if c == '}' { '{' } else { '(' };
                    match depth.pop() {
                        Some((open, _)) if open == expected => {}
                        _ => {
                            return Err(format!(
                                "0:{line_number}(1): error: syntax error, unexpected '{c}'"
                            ))
                        }
                    }
                }
                _ => {}
            }
        }
    }
    if let Some((open, line_number)) = depth.pop() {
        return Err(format!(
            "0:{line_number}(1): error: syntax error, unmatched '{open}' before end of file"
        ));
    }

    if !source.contains("void main") {
        return Err("0:1(1): error: function `main' is not defined".to_string());
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
struct Declaration<'a> {
    qualifier: &'a str,
    ty: &'a str,
    name: &'a str,
}

/// Top-level `in`/`out`/`uniform` declarations, one per line.
fn declarations(source: &str) -> impl Iterator<Item = Declaration<'_>> {
    source.lines().filter_map(|line| {
        let mut line = line.trim();
        if !line.ends_with(';') {
            return None;
        }
        if line.starts_with("layout") {
            line = &line[line.find(')')? + 1..];
        }

        let mut tokens = line
            .trim_end_matches(';')
            .split_whitespace()
            .skip_while(|t| matches!(*t, "flat" | "smooth" | "noperspective"));
        let qualifier = tokens.next()?;
        if !matches!(qualifier, "in" | "out" | "uniform") {
            return None;
        }
        let ty = tokens.next()?;
        let name = tokens.next()?;
        let name = name.split('[').next().unwrap_or(name);
        Some(Declaration {
            qualifier,
            ty,
            name,
        })
    })
}

fn link(stages: &[&ShaderObject]) -> Result<(), String> {
    if let Some(stage) = stages.iter().find(|s| !matches!(s.compile, Some(Ok(())))) {
        let kind = stage_name(stage.shader_type);
        return Err(format!("error: linking with uncompiled {kind} shader"));
    }

    let vertex = stages
        .iter()
        .find(|s| s.shader_type == glow::VERTEX_SHADER)
        .ok_or("error: program lacks a vertex shader")?;
    let fragment = stages
        .iter()
        .find(|s| s.shader_type == glow::FRAGMENT_SHADER)
        .ok_or("error: program lacks a fragment shader")?;

    let outputs: Vec<_> = declarations(&vertex.source)
        .filter(|d| d.qualifier == "out")
        .collect();
    for input in declarations(&fragment.source).filter(|d| d.qualifier == "in") {
        match outputs.iter().find(|out| out.name == input.name) {
            None => {
                return Err(format!(
                    "error: fragment shader input `{}' has no matching vertex shader output",
                    input.name
                ))
            }
            Some(output) if output.ty != input.ty => {
                return Err(format!(
                    "error: `{}' declared as type `{}' in the vertex shader but `{}' in the fragment shader",
                    input.name, output.ty, input.ty
                ))
            }
            Some(_) => {}
        }
    }

    Ok(())
}

/// Uniforms that survive linking: declared in some stage and read by the
/// `main` of at least one stage.
fn declared_uniforms(stages: &[&ShaderObject]) -> Vec<(String, Option<UniformValue>)> {
    let mut uniforms: Vec<(String, Option<UniformValue>)> = Vec::new();
    for stage in stages {
        for declaration in declarations(&stage.source).filter(|d| d.qualifier == "uniform") {
            let used = stages
                .iter()
                .any(|s| main_body(&s.source).is_some_and(|body| uses_identifier(body, declaration.name)));
            if used && !uniforms.iter().any(|(name, _)| name == declaration.name) {
                uniforms.push((declaration.name.to_string(), None));
            }
        }
    }
    uniforms
}

fn main_body(source: &str) -> Option<&str> {
    let start = source.find("void main")?;
    let body = &source[start..];
    Some(&body[body.find('{')?..])
}

fn uses_identifier(body: &str, name: &str) -> bool {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    body.match_indices(name).any(|(at, _)| {
        let before = body[..at].chars().next_back();
        let after = body[at + name.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

fn stage_name(shader_type: u32) -> &'static str {
    match shader_type {
        glow::VERTEX_SHADER => "vertex",
        glow::FRAGMENT_SHADER => "fragment",
        _ => "unknown",
    }
}
