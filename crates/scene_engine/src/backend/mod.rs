//! # Backend Module
//!
//! Backends hold the rendering state a traversal accumulates and turn it into
//! calls against the render context. Nodes never touch the context for state
//! themselves: a transform node asks the model-transform backend for the
//! current matrix, pushes a composed one, visits its children and puts the
//! old value back.
//!
//! ## Organization
//!
//! - **Transform**: model, view and projection matrices ([`TransformBackend`])
//! - **Material**: current surface description ([`MaterialBackend`])
//! - **Lights**: current light source list ([`LightsBackend`])
//! - **Shader**: compiled program plus binder/setter dispatch ([`ShaderBackend`])
//!
//! ## Registry
//!
//! A [`BackendRegistry`] maps each [`BackendKind`] to exactly one installed
//! backend. Every scene owns its own registry, so independent scenes never
//! share state. Plugins add new kinds by implementing [`Backend`] and
//! installing an instance under [`BackendKind::Custom`]. A plugin that
//! overrides [`Backend::state`] has its value handed to the shader setter
//! registered for [`UniformSlot::Custom`] under the same name on every draw.

pub mod transform;
pub mod material;
pub mod lights;
pub mod shader;

pub use transform::{TransformBackend, TransformState};
pub use material::{MaterialBackend, MaterialState, Rgb};
pub use lights::{LightSource, LightType, LightsBackend};
pub use shader::{
    AttributeSlot, Binder, Setter, ShaderBackend, ShaderDescriptor, UniformSlot, UniformValue,
    VariableResolver,
};

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::context::RenderContext;
use crate::scene::{SceneError, SceneResult};

/// Identifies the concern a backend is responsible for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Accumulated modelling transform
    ModelTransform,
    /// Accumulated viewing transform
    ViewTransform,
    /// Projection transform
    Projection,
    /// Surface material
    Material,
    /// Light sources
    Lights,
    /// Shader program and its binders/setters
    Shader,
    /// Kind contributed by a plugin
    Custom(String),
}

impl BackendKind {
    /// Registry name of this kind
    pub fn name(&self) -> &str {
        match self {
            BackendKind::ModelTransform => "modeltransform",
            BackendKind::ViewTransform => "viewtransform",
            BackendKind::Projection => "projection",
            BackendKind::Material => "material",
            BackendKind::Lights => "lights",
            BackendKind::Shader => "shader",
            BackendKind::Custom(name) => name,
        }
    }

    /// Parse a registry name; unknown names become [`BackendKind::Custom`]
    pub fn from_name(name: &str) -> Self {
        match name {
            "modeltransform" => BackendKind::ModelTransform,
            "viewtransform" => BackendKind::ViewTransform,
            "projection" => BackendKind::Projection,
            "material" => BackendKind::Material,
            "lights" => BackendKind::Lights,
            "shader" => BackendKind::Shader,
            other => BackendKind::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// # Backend Trait
///
/// Implemented by every component that can be installed in a
/// [`BackendRegistry`].
///
/// ## Implementation Notes
///
/// - `reset` returns per-traversal state to its initial value. It runs at the
///   start of every render call, so state left behind by an aborted traversal
///   never reaches the next one. Long-lived resources (compiled programs) are
///   not part of that state and survive a reset.
/// - `as_any`/`as_any_mut` give typed access through
///   [`BackendRegistry::get`]/[`BackendRegistry::get_mut`].
/// - `state`/`set_state` are the hooks a state node saves, overrides and
///   restores. The built-in backends keep them at their defaults; nodes
///   reach them through dedicated node kinds instead.
/// - `release` runs once when the scene hands its context back.
pub trait Backend: Any {
    /// Kind this backend is installed under
    fn kind(&self) -> BackendKind;

    /// Return per-traversal state to its initial value
    fn reset(&mut self);

    /// Value fed to the shader on every draw
    fn state(&self) -> Option<UniformValue> {
        None
    }

    /// Replace the value [`Backend::state`] reports
    fn set_state(&mut self, _value: Option<UniformValue>) -> SceneResult<()> {
        Err(SceneError::StateNotAccepted(self.kind()))
    }

    /// Delete the context objects this backend created
    fn release(&mut self, _context: &mut dyn RenderContext) {}

    /// Downcast support
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Scene-scoped mapping from backend kind to the installed backend
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<BackendKind, Box<dyn Backend>>,
}

impl BackendRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the five state backends
    ///
    /// The shader backend is not included; it needs a [`ShaderDescriptor`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.install_backend(Box::new(TransformBackend::model()));
        registry.install_backend(Box::new(TransformBackend::view()));
        registry.install_backend(Box::new(TransformBackend::projection()));
        registry.install_backend(Box::new(MaterialBackend::new()));
        registry.install_backend(Box::new(LightsBackend::new()));
        registry
    }

    /// Install a backend under its kind
    ///
    /// Last registration wins: an existing backend of the same kind is
    /// replaced and returned.
    pub fn install_backend(&mut self, backend: Box<dyn Backend>) -> Option<Box<dyn Backend>> {
        let kind = backend.kind();
        let previous = self.backends.insert(kind.clone(), backend);
        if previous.is_some() {
            log::warn!("Backend '{}' replaced by a new installation", kind);
        } else {
            log::debug!("Backend '{}' installed", kind);
        }
        previous
    }

    /// Remove the backend installed for `kind`
    pub fn remove(&mut self, kind: &BackendKind) -> Option<Box<dyn Backend>> {
        self.backends.remove(kind)
    }

    /// Whether a backend is installed for `kind`
    pub fn contains(&self, kind: &BackendKind) -> bool {
        self.backends.contains_key(kind)
    }

    /// Number of installed backends
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Whether no backend is installed
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Installed kinds, in no particular order
    pub fn kinds(&self) -> impl Iterator<Item = &BackendKind> {
        self.backends.keys()
    }

    /// Look up the backend installed for `kind`
    pub fn get_backend(&self, kind: &BackendKind) -> SceneResult<&dyn Backend> {
        self.backends
            .get(kind)
            .map(Box::as_ref)
            .ok_or_else(|| SceneError::BackendNotFound(kind.clone()))
    }

    /// Look up the backend installed for `kind`, mutably
    pub fn get_backend_mut(&mut self, kind: &BackendKind) -> SceneResult<&mut dyn Backend> {
        self.backends
            .get_mut(kind)
            .map(Box::as_mut)
            .ok_or_else(|| SceneError::BackendNotFound(kind.clone()))
    }

    /// Typed lookup of the backend installed for `kind`
    pub fn get<T: Backend>(&self, kind: &BackendKind) -> SceneResult<&T> {
        self.get_backend(kind)?
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| SceneError::BackendTypeMismatch {
                kind: kind.clone(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Typed mutable lookup of the backend installed for `kind`
    pub fn get_mut<T: Backend>(&mut self, kind: &BackendKind) -> SceneResult<&mut T> {
        self.get_backend_mut(kind)?
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| SceneError::BackendTypeMismatch {
                kind: kind.clone(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Reset the per-traversal state of every backend
    pub fn reset(&mut self) {
        for backend in self.backends.values_mut() {
            backend.reset();
        }
    }

    /// State of every plugin backend, ordered by kind name
    pub fn custom_states(&self) -> Vec<(String, Option<UniformValue>)> {
        let mut states: Vec<_> = self
            .backends
            .iter()
            .filter_map(|(kind, backend)| match kind {
                BackendKind::Custom(name) => Some((name.clone(), backend.state())),
                _ => None,
            })
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Let every backend delete the context objects it created
    pub fn release(&mut self, context: &mut dyn RenderContext) {
        for backend in self.backends.values_mut() {
            backend.release(context);
        }
    }

    /// Remove every backend
    pub fn clear(&mut self) {
        self.backends.clear();
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.backends.keys().map(BackendKind::name).collect();
        kinds.sort_unstable();
        f.debug_struct("BackendRegistry").field("kinds", &kinds).finish()
    }
}
