//! Transform-state backends
//!
//! One [`TransformBackend`] type serves the model, view and projection kinds.
//! Each holds the currently accumulated matrix and whether that matrix is
//! fixed, i.e. derived only from literal node configuration and therefore
//! safe to memoize against.

use std::any::Any;

use super::{Backend, BackendKind};
use crate::foundation::math::Mat4;

/// Accumulated transform plus its cacheability
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformState {
    /// Composed matrix
    pub matrix: Mat4,
    /// Whether every contribution to `matrix` was literal configuration
    pub fixed: bool,
}

impl TransformState {
    /// Create a transform state
    pub fn new(matrix: Mat4, fixed: bool) -> Self {
        Self { matrix, fixed }
    }

    /// The identity, which is trivially fixed
    pub fn identity() -> Self {
        Self::new(Mat4::identity(), true)
    }
}

impl Default for TransformState {
    fn default() -> Self {
        Self::identity()
    }
}

/// Holds the current transform for one transform kind
#[derive(Debug)]
pub struct TransformBackend {
    kind: BackendKind,
    current: TransformState,
}

impl TransformBackend {
    /// Create a backend for `kind`, starting at the identity
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            current: TransformState::identity(),
        }
    }

    /// Model-transform backend
    pub fn model() -> Self {
        Self::new(BackendKind::ModelTransform)
    }

    /// View-transform backend
    pub fn view() -> Self {
        Self::new(BackendKind::ViewTransform)
    }

    /// Projection backend
    pub fn projection() -> Self {
        Self::new(BackendKind::Projection)
    }

    /// Current transform
    pub fn transform(&self) -> TransformState {
        self.current
    }

    /// Replace the current transform
    pub fn set_transform(&mut self, value: TransformState) {
        self.current = value;
    }
}

impl Backend for TransformBackend {
    fn kind(&self) -> BackendKind {
        self.kind.clone()
    }

    fn reset(&mut self) {
        self.current = TransformState::identity();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
