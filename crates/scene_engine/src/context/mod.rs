//! Immediate-mode rendering context abstraction
//!
//! The scene graph never talks to a graphics API directly. Everything it needs
//! from the canvas/context collaborator goes through [`RenderContext`], a small
//! object-safe trait shaped after the WebGL/OpenGL ES call set: compile and
//! link programs, resolve variable locations, upload and bind buffers, push
//! uniforms, issue indexed draws and release what it created.
//!
//! [`RecordingContext`] is an in-memory implementation that records every call.
//! It backs the test-suite and headless tools.

mod recording;

pub use recording::{ContextCall, DrawCall, RecordingContext, UniformData};

/// Handle to a compiled shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u32);

/// Handle to a linked program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// Handle to a data buffer owned by the context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// Location of a vertex attribute within a linked program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttribLocation(pub u32);

/// Location of a uniform within a linked program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Shader pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Per-vertex stage
    Vertex,
    /// Per-fragment stage
    Fragment,
}

/// Buffer binding point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data
    Array,
    /// Index data
    ElementArray,
}

/// Primitive assembly mode for draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveMode {
    /// Independent triangles
    Triangles,
    /// Independent line segments
    Lines,
    /// Points
    Points,
}

bitflags::bitflags! {
    /// Buffers cleared by [`RenderContext::clear`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        /// Depth buffer
        const DEPTH = 0x0000_0100;
        /// Colour buffer
        const COLOR = 0x0000_4000;
    }
}

/// # Render Context Trait
///
/// The graphics context a scene renders into. Implementations wrap a real
/// API (WebGL, OpenGL ES, a software rasteriser) or record calls for tests.
///
/// ## Context loss
///
/// A context may be lost and later restored. While lost,
/// [`is_context_lost`](RenderContext::is_context_lost) returns `true`; once
/// restored, [`generation`](RenderContext::generation) must return a new
/// value so callers know every handle they cached is stale.
pub trait RenderContext {
    /// Identifies the current incarnation of the context
    fn generation(&self) -> u64;

    /// Whether the context is currently lost
    fn is_context_lost(&self) -> bool;

    /// Compile one shader stage, returning the info log on failure
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderHandle, String>;

    /// Link compiled stages into a program, returning the info log on failure
    fn link_program(&mut self, shaders: &[ShaderHandle]) -> Result<ProgramHandle, String>;

    /// Make a program current
    fn use_program(&mut self, program: ProgramHandle);

    /// Release a shader stage; programs already linked from it are unaffected
    fn delete_shader(&mut self, shader: ShaderHandle);

    /// Release a linked program
    fn delete_program(&mut self, program: ProgramHandle);

    /// Resolve a vertex attribute location, `None` if the program has no such attribute
    fn attrib_location(&mut self, program: ProgramHandle, name: &str) -> Option<AttribLocation>;

    /// Resolve a uniform location, `None` if the program has no such uniform
    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;

    /// Create a buffer initialised with `data`
    fn create_buffer(&mut self, target: BufferTarget, data: &[u8]) -> BufferHandle;

    /// Bind a buffer to a target
    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferHandle);

    /// Release a buffer
    fn delete_buffer(&mut self, buffer: BufferHandle);

    /// Enable streaming for an attribute
    fn enable_vertex_attrib_array(&mut self, location: AttribLocation);

    /// Point an attribute at the buffer bound to [`BufferTarget::Array`]
    ///
    /// `size` is the float component count per vertex; `stride` and `offset` are in bytes.
    fn vertex_attrib_pointer(&mut self, location: AttribLocation, size: u32, stride: u32, offset: u32);

    /// Upload a column-major 4x4 matrix uniform
    fn uniform_matrix4fv(&mut self, location: UniformLocation, value: &[f32; 16]);

    /// Upload a vec3 uniform
    fn uniform3fv(&mut self, location: UniformLocation, value: [f32; 3]);

    /// Upload a vec4 uniform
    fn uniform4fv(&mut self, location: UniformLocation, value: [f32; 4]);

    /// Set the colour used by colour clears
    fn clear_color(&mut self, rgba: [f32; 4]);

    /// Clear the selected buffers
    fn clear(&mut self, mask: ClearFlags);

    /// Draw `count` indices from the bound element buffer starting at byte `offset`
    fn draw_elements(&mut self, mode: PrimitiveMode, count: u32, offset: u32);
}
