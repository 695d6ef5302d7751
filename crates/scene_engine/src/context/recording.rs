//! In-memory render context
//!
//! Emulates the parts of a GL context the scene graph touches and keeps a log
//! of every call. Programs expose the variables declared with `attribute` and
//! `uniform` statements in their sources; uniform values are tracked per
//! program the way GL does, and each draw snapshots the current program's
//! uniforms so callers can inspect exactly what a draw saw.

use std::collections::{HashMap, HashSet};

use super::{
    AttribLocation, BufferHandle, BufferTarget, ClearFlags, PrimitiveMode, ProgramHandle,
    RenderContext, ShaderHandle, ShaderStage, UniformLocation,
};
use crate::foundation::math::Mat4;

/// Value last written to a uniform
#[derive(Debug, Clone, PartialEq)]
pub enum UniformData {
    /// 4x4 matrix, column-major
    Mat4([f32; 16]),
    /// vec3
    Vec3([f32; 3]),
    /// vec4
    Vec4([f32; 4]),
}

/// One recorded context call
#[derive(Debug, Clone, PartialEq)]
pub enum ContextCall {
    /// A shader stage was compiled
    CompileShader(ShaderStage, ShaderHandle),
    /// A program was linked
    LinkProgram(ProgramHandle),
    /// A program was made current
    UseProgram(ProgramHandle),
    /// A shader stage was released
    DeleteShader(ShaderHandle),
    /// A program was released
    DeleteProgram(ProgramHandle),
    /// A buffer was released
    DeleteBuffer(BufferHandle),
    /// A buffer was created with the given byte length
    CreateBuffer(BufferTarget, BufferHandle, usize),
    /// A buffer was bound
    BindBuffer(BufferTarget, BufferHandle),
    /// An attribute array was enabled
    EnableVertexAttribArray(AttribLocation),
    /// An attribute pointer was set
    VertexAttribPointer {
        /// Attribute location
        location: AttribLocation,
        /// Component count
        size: u32,
    },
    /// A uniform was written
    Uniform(String, UniformData),
    /// Clear colour was set
    ClearColor([f32; 4]),
    /// Buffers were cleared
    Clear(ClearFlags),
    /// An indexed draw was issued
    DrawElements(PrimitiveMode, u32),
}

/// Snapshot of one draw call
#[derive(Debug, Clone)]
pub struct DrawCall {
    /// Program current at draw time
    pub program: Option<ProgramHandle>,
    /// Primitive mode
    pub mode: PrimitiveMode,
    /// Index count
    pub count: u32,
    /// Buffer bound to each attribute at draw time
    pub attributes: HashMap<String, BufferHandle>,
    /// Uniform values of the current program at draw time
    pub uniforms: HashMap<String, UniformData>,
}

impl DrawCall {
    /// Matrix uniform by variable name
    pub fn matrix(&self, name: &str) -> Option<Mat4> {
        match self.uniforms.get(name) {
            Some(UniformData::Mat4(values)) => Some(Mat4::from_column_slice(values)),
            _ => None,
        }
    }

    /// vec3 uniform by variable name
    pub fn vec3(&self, name: &str) -> Option<[f32; 3]> {
        match self.uniforms.get(name) {
            Some(UniformData::Vec3(values)) => Some(*values),
            _ => None,
        }
    }

    /// vec4 uniform by variable name
    pub fn vec4(&self, name: &str) -> Option<[f32; 4]> {
        match self.uniforms.get(name) {
            Some(UniformData::Vec4(values)) => Some(*values),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct ProgramInfo {
    attributes: Vec<String>,
    uniforms: Vec<String>,
    values: HashMap<String, UniformData>,
}

/// Render context that records instead of rasterising
#[derive(Debug, Default)]
pub struct RecordingContext {
    generation: u64,
    lost: bool,
    next_handle: u32,
    shaders: HashMap<ShaderHandle, String>,
    programs: HashMap<ProgramHandle, ProgramInfo>,
    current_program: Option<ProgramHandle>,
    buffers: HashSet<BufferHandle>,
    uniform_locations: HashMap<UniformLocation, (ProgramHandle, String)>,
    array_binding: Option<BufferHandle>,
    attribute_bindings: HashMap<u32, BufferHandle>,
    calls: Vec<ContextCall>,
    draws: Vec<DrawCall>,
    compilations: usize,
    location_lookups: usize,
}

impl RecordingContext {
    /// Create a fresh context
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call recorded so far
    pub fn calls(&self) -> &[ContextCall] {
        &self.calls
    }

    /// Every draw recorded so far
    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    /// Remove and return the recorded draws
    pub fn take_draws(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.draws)
    }

    /// Forget recorded calls and draws, keeping all context objects alive
    pub fn clear_log(&mut self) {
        self.calls.clear();
        self.draws.clear();
    }

    /// Number of shader stages compiled over the context's lifetime
    pub fn compile_count(&self) -> usize {
        self.compilations
    }

    /// Number of attribute/uniform location queries issued
    pub fn location_lookups(&self) -> usize {
        self.location_lookups
    }

    /// Programs linked and not yet released
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Shader stages compiled and not yet released
    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    /// Buffers created and not yet released
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Simulate losing the context; every object it owned is gone
    pub fn lose_context(&mut self) {
        log::warn!("Recording context lost");
        self.lost = true;
        self.shaders.clear();
        self.programs.clear();
        self.buffers.clear();
        self.uniform_locations.clear();
        self.current_program = None;
        self.array_binding = None;
        self.attribute_bindings.clear();
    }

    /// Simulate restoring a lost context under a new generation
    pub fn restore_context(&mut self) {
        self.lost = false;
        self.generation += 1;
        log::info!("Recording context restored (generation {})", self.generation);
    }

    fn next_handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn write_uniform(&mut self, location: UniformLocation, data: UniformData) {
        let Some((program, name)) = self.uniform_locations.get(&location).cloned() else {
            return;
        };
        if self.current_program != Some(program) {
            // GL rejects writes to a location of a program that is not current
            return;
        }
        if let Some(info) = self.programs.get_mut(&program) {
            info.values.insert(name.clone(), data.clone());
        }
        self.calls.push(ContextCall::Uniform(name, data));
    }
}

/// Collect variable names declared with `keyword` (`attribute` or `uniform`)
fn declared_variables(source: &str, keyword: &str) -> Vec<String> {
    source
        .split(|c: char| c == ';' || c == '{' || c == '}')
        .filter_map(|statement| {
            let mut tokens = statement.split_whitespace();
            if tokens.next()? != keyword {
                return None;
            }
            let _type = tokens.next()?;
            tokens.next().map(str::to_string)
        })
        .collect()
}

impl RenderContext for RecordingContext {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn is_context_lost(&self) -> bool {
        self.lost
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderHandle, String> {
        if self.lost {
            return Err("context lost".to_string());
        }
        if source.contains("#error") {
            return Err(format!("{stage:?} shader: #error directive"));
        }
        let handle = ShaderHandle(self.next_handle());
        self.shaders.insert(handle, source.to_string());
        self.compilations += 1;
        self.calls.push(ContextCall::CompileShader(stage, handle));
        Ok(handle)
    }

    fn link_program(&mut self, shaders: &[ShaderHandle]) -> Result<ProgramHandle, String> {
        if shaders.is_empty() {
            return Err("no shaders attached".to_string());
        }
        let mut info = ProgramInfo::default();
        for shader in shaders {
            let source = self
                .shaders
                .get(shader)
                .ok_or_else(|| format!("unknown shader {shader:?}"))?;
            info.attributes.extend(declared_variables(source, "attribute"));
            info.uniforms.extend(declared_variables(source, "uniform"));
        }
        let handle = ProgramHandle(self.next_handle());
        self.programs.insert(handle, info);
        self.calls.push(ContextCall::LinkProgram(handle));
        Ok(handle)
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current_program = Some(program);
        self.calls.push(ContextCall::UseProgram(program));
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        if self.shaders.remove(&shader).is_some() {
            self.calls.push(ContextCall::DeleteShader(shader));
        }
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program).is_none() {
            return;
        }
        self.uniform_locations.retain(|_, (owner, _)| *owner != program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.calls.push(ContextCall::DeleteProgram(program));
    }

    fn attrib_location(&mut self, program: ProgramHandle, name: &str) -> Option<AttribLocation> {
        self.location_lookups += 1;
        let info = self.programs.get(&program)?;
        info.attributes
            .iter()
            .position(|attribute| attribute == name)
            .and_then(|index| u32::try_from(index).ok())
            .map(AttribLocation)
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.location_lookups += 1;
        let declared = self
            .programs
            .get(&program)
            .is_some_and(|info| info.uniforms.iter().any(|uniform| uniform == name));
        if !declared {
            return None;
        }
        if let Some((location, _)) = self
            .uniform_locations
            .iter()
            .find(|(_, (p, n))| *p == program && n == name)
        {
            return Some(*location);
        }
        let location = UniformLocation(self.next_handle());
        self.uniform_locations.insert(location, (program, name.to_string()));
        Some(location)
    }

    fn create_buffer(&mut self, target: BufferTarget, data: &[u8]) -> BufferHandle {
        let handle = BufferHandle(self.next_handle());
        self.buffers.insert(handle);
        self.calls.push(ContextCall::CreateBuffer(target, handle, data.len()));
        handle
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferHandle) {
        if target == BufferTarget::Array {
            self.array_binding = Some(buffer);
        }
        self.calls.push(ContextCall::BindBuffer(target, buffer));
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        if !self.buffers.remove(&buffer) {
            return;
        }
        if self.array_binding == Some(buffer) {
            self.array_binding = None;
        }
        self.attribute_bindings.retain(|_, bound| *bound != buffer);
        self.calls.push(ContextCall::DeleteBuffer(buffer));
    }

    fn enable_vertex_attrib_array(&mut self, location: AttribLocation) {
        self.calls.push(ContextCall::EnableVertexAttribArray(location));
    }

    fn vertex_attrib_pointer(&mut self, location: AttribLocation, size: u32, _stride: u32, _offset: u32) {
        if let Some(buffer) = self.array_binding {
            self.attribute_bindings.insert(location.0, buffer);
        }
        self.calls.push(ContextCall::VertexAttribPointer { location, size });
    }

    fn uniform_matrix4fv(&mut self, location: UniformLocation, value: &[f32; 16]) {
        self.write_uniform(location, UniformData::Mat4(*value));
    }

    fn uniform3fv(&mut self, location: UniformLocation, value: [f32; 3]) {
        self.write_uniform(location, UniformData::Vec3(value));
    }

    fn uniform4fv(&mut self, location: UniformLocation, value: [f32; 4]) {
        self.write_uniform(location, UniformData::Vec4(value));
    }

    fn clear_color(&mut self, rgba: [f32; 4]) {
        self.calls.push(ContextCall::ClearColor(rgba));
    }

    fn clear(&mut self, mask: ClearFlags) {
        self.calls.push(ContextCall::Clear(mask));
    }

    fn draw_elements(&mut self, mode: PrimitiveMode, count: u32, _offset: u32) {
        let program = self.current_program;
        let info = program.and_then(|p| self.programs.get(&p));
        let uniforms = info.map(|info| info.values.clone()).unwrap_or_default();
        let attributes = info
            .map(|info| {
                info.attributes
                    .iter()
                    .enumerate()
                    .filter_map(|(index, name)| {
                        let index = u32::try_from(index).ok()?;
                        self.attribute_bindings.get(&index).map(|buffer| (name.clone(), *buffer))
                    })
                    .collect()
            })
            .unwrap_or_default();

        self.calls.push(ContextCall::DrawElements(mode, count));
        self.draws.push(DrawCall {
            program,
            mode,
            count,
            attributes,
            uniforms,
        });
    }
}
