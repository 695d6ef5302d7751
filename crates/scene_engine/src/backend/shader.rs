//! # Shader Backend
//!
//! Wraps a vertex/fragment program pair and the two dispatch tables that let
//! the scene graph feed it without knowing its variable names:
//!
//! - **Binders** stream a data buffer into an attribute ([`AttributeSlot`])
//! - **Setters** push a typed value into uniforms ([`UniformSlot`])
//!
//! The program is compiled and linked lazily on the first [`ShaderBackend::bind`]
//! and cached for the lifetime of the context generation it was built on. A
//! [`VariableResolver`] memoizes attribute and uniform locations per program,
//! so steady-state frames issue no location queries.
//!
//! ## Usage
//!
//! ```ignore
//! let descriptor = ShaderDescriptor::new("flat")
//!     .vertex_shader(VERTEX_SOURCE)
//!     .fragment_shader(FRAGMENT_SOURCE)
//!     .binder(AttributeSlot::Vertex, |context, resolver, buffer| { /* ... */ })
//!     .setter(UniformSlot::ModelMatrix, |context, resolver, value| { /* ... */ });
//! scene.install_backend(Box::new(ShaderBackend::new(descriptor)));
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::lights::LightSource;
use super::material::MaterialState;
use super::{Backend, BackendKind};
use crate::context::{
    AttribLocation, BufferHandle, ProgramHandle, RenderContext, ShaderHandle, ShaderStage,
    UniformLocation,
};
use crate::foundation::math::Mat4;
use crate::scene::{SceneError, SceneResult};

/// Semantic vertex attribute a binder feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeSlot {
    /// Vertex positions
    Vertex,
    /// Vertex normals
    Normal,
}

impl AttributeSlot {
    /// Every attribute slot
    pub const ALL: [AttributeSlot; 2] = [AttributeSlot::Vertex, AttributeSlot::Normal];

    /// Semantic name
    pub fn name(self) -> &'static str {
        match self {
            AttributeSlot::Vertex => "Vertex",
            AttributeSlot::Normal => "Normal",
        }
    }
}

/// Semantic uniform input a setter receives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UniformSlot {
    /// Current view transform
    ViewMatrix,
    /// Current model transform
    ModelMatrix,
    /// Current projection transform
    ProjectionMatrix,
    /// Current material
    Material,
    /// Current light sources
    Lights,
    /// State of the plugin backend installed under this kind name
    Custom(String),
}

impl UniformSlot {
    /// Slot fed by the plugin backend installed as `kind`
    pub fn custom(kind: impl Into<String>) -> Self {
        UniformSlot::Custom(kind.into())
    }

    /// Every built-in uniform slot
    pub const ALL: [UniformSlot; 5] = [
        UniformSlot::ViewMatrix,
        UniformSlot::ModelMatrix,
        UniformSlot::ProjectionMatrix,
        UniformSlot::Material,
        UniformSlot::Lights,
    ];

    /// Semantic name
    pub fn name(&self) -> &str {
        match self {
            UniformSlot::ViewMatrix => "scene_ViewMatrix",
            UniformSlot::ModelMatrix => "scene_ModelMatrix",
            UniformSlot::ProjectionMatrix => "scene_ProjectionMatrix",
            UniformSlot::Material => "scene_Material",
            UniformSlot::Lights => "scene_Lights",
            UniformSlot::Custom(kind) => kind,
        }
    }
}

impl fmt::Display for UniformSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed value handed to a setter
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// A transform matrix
    Matrix(Mat4),
    /// A material record
    Material(MaterialState),
    /// An ordered light source list
    Lights(Rc<[LightSource]>),
    /// A single float
    Float(f32),
    /// Three floats
    Vec3([f32; 3]),
    /// Four floats
    Vec4([f32; 4]),
}

impl UniformValue {
    /// The matrix, if this is one
    pub fn as_matrix(&self) -> Option<&Mat4> {
        match self {
            UniformValue::Matrix(matrix) => Some(matrix),
            _ => None,
        }
    }

    /// The material, if this is one
    pub fn as_material(&self) -> Option<&MaterialState> {
        match self {
            UniformValue::Material(material) => Some(material),
            _ => None,
        }
    }

    /// The light sources, if this is a light list
    pub fn as_lights(&self) -> Option<&[LightSource]> {
        match self {
            UniformValue::Lights(lights) => Some(lights),
            _ => None,
        }
    }

    /// The value widened to four components, if it is a plain float vector
    ///
    /// Missing components are 0.
    pub fn as_vec4(&self) -> Option<[f32; 4]> {
        match *self {
            UniformValue::Float(x) => Some([x, 0.0, 0.0, 0.0]),
            UniformValue::Vec3([x, y, z]) => Some([x, y, z, 0.0]),
            UniformValue::Vec4(values) => Some(values),
            _ => None,
        }
    }
}

/// Streams a buffer into a shader attribute
pub trait Binder {
    /// Perform the context calls binding `buffer` to this binder's attribute
    fn bind(&self, context: &mut dyn RenderContext, resolver: &mut VariableResolver, buffer: BufferHandle);
}

impl<F> Binder for F
where
    F: Fn(&mut dyn RenderContext, &mut VariableResolver, BufferHandle),
{
    fn bind(&self, context: &mut dyn RenderContext, resolver: &mut VariableResolver, buffer: BufferHandle) {
        self(context, resolver, buffer)
    }
}

/// Pushes a typed value into shader uniforms
///
/// Setters must do nothing when `value` is `None`: an absent optional input
/// (no material, no lights) is normal.
pub trait Setter {
    /// Upload `value`
    fn set(&self, context: &mut dyn RenderContext, resolver: &mut VariableResolver, value: Option<&UniformValue>);
}

impl<F> Setter for F
where
    F: Fn(&mut dyn RenderContext, &mut VariableResolver, Option<&UniformValue>),
{
    fn set(&self, context: &mut dyn RenderContext, resolver: &mut VariableResolver, value: Option<&UniformValue>) {
        self(context, resolver, value)
    }
}

/// Memoizing attribute/uniform location lookup for one program
///
/// Missing variables are memoized too, and reported once.
#[derive(Debug, Default)]
pub struct VariableResolver {
    program: Option<ProgramHandle>,
    attributes: HashMap<String, Option<AttribLocation>>,
    uniforms: HashMap<String, Option<UniformLocation>>,
}

impl VariableResolver {
    /// Create a resolver not yet tied to a program
    pub fn new() -> Self {
        Self::default()
    }

    /// Program the cached locations belong to
    pub fn program(&self) -> Option<ProgramHandle> {
        self.program
    }

    /// Drop every cached location and resolve against `program` from now on
    pub fn retarget(&mut self, program: Option<ProgramHandle>) {
        self.program = program;
        self.attributes.clear();
        self.uniforms.clear();
    }

    /// Location of attribute `name`
    pub fn attribute(&mut self, context: &mut dyn RenderContext, name: &str) -> Option<AttribLocation> {
        let program = self.program?;
        if let Some(cached) = self.attributes.get(name) {
            return *cached;
        }
        let location = context.attrib_location(program, name);
        if location.is_none() {
            log::warn!("Attribute '{}' not found in program {:?}", name, program);
        }
        self.attributes.insert(name.to_string(), location);
        location
    }

    /// Location of uniform `name`
    pub fn uniform(&mut self, context: &mut dyn RenderContext, name: &str) -> Option<UniformLocation> {
        let program = self.program?;
        if let Some(cached) = self.uniforms.get(name) {
            return *cached;
        }
        let location = context.uniform_location(program, name);
        if location.is_none() {
            log::warn!("Uniform '{}' not found in program {:?}", name, program);
        }
        self.uniforms.insert(name.to_string(), location);
        location
    }
}

/// Everything needed to build a shader backend
pub struct ShaderDescriptor {
    name: String,
    vertex_shaders: Vec<String>,
    fragment_shaders: Vec<String>,
    binders: HashMap<AttributeSlot, Box<dyn Binder>>,
    setters: HashMap<UniformSlot, Box<dyn Setter>>,
}

impl ShaderDescriptor {
    /// Create an empty descriptor
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vertex_shaders: Vec::new(),
            fragment_shaders: Vec::new(),
            binders: HashMap::new(),
            setters: HashMap::new(),
        }
    }

    /// Add a vertex shader source
    pub fn vertex_shader(mut self, source: impl Into<String>) -> Self {
        self.vertex_shaders.push(source.into());
        self
    }

    /// Add a fragment shader source
    pub fn fragment_shader(mut self, source: impl Into<String>) -> Self {
        self.fragment_shaders.push(source.into());
        self
    }

    /// Register a binder function for `slot`
    pub fn binder<F>(self, slot: AttributeSlot, binder: F) -> Self
    where
        F: Fn(&mut dyn RenderContext, &mut VariableResolver, BufferHandle) + 'static,
    {
        self.with_binder(slot, Box::new(binder))
    }

    /// Register a setter function for `slot`
    pub fn setter<F>(self, slot: UniformSlot, setter: F) -> Self
    where
        F: Fn(&mut dyn RenderContext, &mut VariableResolver, Option<&UniformValue>) + 'static,
    {
        self.with_setter(slot, Box::new(setter))
    }

    /// Register a binder object for `slot`, replacing any earlier one
    pub fn with_binder(mut self, slot: AttributeSlot, binder: Box<dyn Binder>) -> Self {
        self.binders.insert(slot, binder);
        self
    }

    /// Register a setter object for `slot`, replacing any earlier one
    pub fn with_setter(mut self, slot: UniformSlot, setter: Box<dyn Setter>) -> Self {
        self.setters.insert(slot, setter);
        self
    }

    /// Shader name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ShaderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderDescriptor")
            .field("name", &self.name)
            .field("vertex_shaders", &self.vertex_shaders.len())
            .field("fragment_shaders", &self.fragment_shaders.len())
            .field("binders", &self.binders.keys().collect::<Vec<_>>())
            .field("setters", &self.setters.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
struct CompiledProgram {
    handle: ProgramHandle,
    generation: u64,
}

/// Shader backend: a lazily compiled program plus its binders and setters
#[derive(Debug)]
pub struct ShaderBackend {
    descriptor: ShaderDescriptor,
    program: Option<CompiledProgram>,
    resolver: VariableResolver,
}

impl ShaderBackend {
    /// Create a backend; nothing is compiled until the first bind
    pub fn new(descriptor: ShaderDescriptor) -> Self {
        Self {
            descriptor,
            program: None,
            resolver: VariableResolver::new(),
        }
    }

    /// Shader name
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Whether a program is compiled for the context generation `generation`
    pub fn is_compiled_for(&self, generation: u64) -> bool {
        self.program.is_some_and(|program| program.generation == generation)
    }

    /// Handle of the compiled program, if any
    pub fn program(&self) -> Option<ProgramHandle> {
        self.program.map(|program| program.handle)
    }

    /// Make the program current, compiling and linking it first if needed
    pub fn bind(&mut self, context: &mut dyn RenderContext) -> SceneResult<ProgramHandle> {
        if context.is_context_lost() {
            return Err(SceneError::ContextLost);
        }
        let generation = context.generation();
        let handle = match self.program {
            Some(program) if program.generation == generation => program.handle,
            _ => {
                let handle = self.compile(context)?;
                self.program = Some(CompiledProgram { handle, generation });
                self.resolver.retarget(Some(handle));
                handle
            }
        };
        context.use_program(handle);
        Ok(handle)
    }

    /// Delete the compiled program, then forget it
    ///
    /// A program built on an earlier generation, or on a context that is
    /// currently lost, went away with that context and is only forgotten.
    pub fn release_program(&mut self, context: &mut dyn RenderContext) {
        if let Some(program) = self.program {
            if !context.is_context_lost() && program.generation == context.generation() {
                context.delete_program(program.handle);
                log::debug!("Shader '{}' released program {:?}", self.descriptor.name, program.handle);
            }
        }
        self.invalidate();
    }

    /// Forget the compiled program so the next bind rebuilds it
    pub fn invalidate(&mut self) {
        if self.program.take().is_some() {
            log::debug!("Shader '{}' invalidated", self.descriptor.name);
        }
        self.resolver.retarget(None);
    }

    /// Stream `buffer` into the attribute behind `slot`
    ///
    /// A slot without a registered binder is skipped.
    pub fn bind_attribute(
        &mut self,
        context: &mut dyn RenderContext,
        slot: AttributeSlot,
        buffer: BufferHandle,
    ) -> SceneResult<()> {
        self.ensure_bound(context)?;
        match self.descriptor.binders.get(&slot) {
            Some(binder) => binder.bind(context, &mut self.resolver, buffer),
            None => log::trace!("Shader '{}' has no binder for {:?}", self.descriptor.name, slot),
        }
        Ok(())
    }

    /// Push `value` through the setter behind `slot`
    ///
    /// A slot without a registered setter is skipped.
    pub fn set_uniform(
        &mut self,
        context: &mut dyn RenderContext,
        slot: UniformSlot,
        value: Option<&UniformValue>,
    ) -> SceneResult<()> {
        self.ensure_bound(context)?;
        match self.descriptor.setters.get(&slot) {
            Some(setter) => setter.set(context, &mut self.resolver, value),
            None => log::trace!("Shader '{}' has no setter for {}", self.descriptor.name, slot),
        }
        Ok(())
    }

    fn ensure_bound(&self, context: &dyn RenderContext) -> SceneResult<()> {
        if context.is_context_lost() {
            return Err(SceneError::ContextLost);
        }
        if self.is_compiled_for(context.generation()) {
            Ok(())
        } else {
            Err(SceneError::ShaderNotBound(self.descriptor.name.clone()))
        }
    }

    fn compile(&self, context: &mut dyn RenderContext) -> SceneResult<ProgramHandle> {
        let name = &self.descriptor.name;
        let stages = self
            .descriptor
            .vertex_shaders
            .iter()
            .map(|source| (ShaderStage::Vertex, source))
            .chain(
                self.descriptor
                    .fragment_shaders
                    .iter()
                    .map(|source| (ShaderStage::Fragment, source)),
            );

        let mut shaders: Vec<ShaderHandle> = Vec::new();
        for (stage, source) in stages {
            match context.compile_shader(stage, source) {
                Ok(shader) => shaders.push(shader),
                Err(log) => {
                    for shader in shaders {
                        context.delete_shader(shader);
                    }
                    return Err(SceneError::ShaderCompile {
                        name: name.clone(),
                        log,
                    });
                }
            }
        }

        let linked = context.link_program(&shaders);
        for shader in shaders.iter().copied() {
            context.delete_shader(shader);
        }
        let program = linked.map_err(|log| SceneError::ShaderLink {
            name: name.clone(),
            log,
        })?;
        log::info!(
            "Shader '{}' compiled and linked ({} stages, generation {})",
            name,
            shaders.len(),
            context.generation()
        );
        Ok(program)
    }
}

impl Backend for ShaderBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Shader
    }

    fn reset(&mut self) {
        // The compiled program is a long-lived resource, not traversal state
    }

    fn release(&mut self, context: &mut dyn RenderContext) {
        self.release_program(context);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
