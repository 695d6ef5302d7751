//! Lights-state backend
//!
//! Holds the ordered light source list of the innermost enclosing lights node.
//! The list is shared (`Rc`) so saving and restoring it around a subtree never
//! copies the sources.

use std::any::Any;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::material::Rgb;
use super::{Backend, BackendKind};
use crate::foundation::math::Vec3;

/// How a light source emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightType {
    /// Parallel rays along `dir`
    Dir,
    /// Omnidirectional from `pos`
    Point,
}

/// One light source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightSource {
    /// Emission model
    #[serde(rename = "type")]
    pub light_type: LightType,
    /// Emitted colour
    pub color: Rgb,
    /// Contributes to diffuse shading
    pub diffuse: bool,
    /// Contributes to specular highlights
    pub specular: bool,
    /// Direction for [`LightType::Dir`]
    #[serde(default = "zero_vector")]
    pub dir: Vec3,
    /// Position for [`LightType::Point`]
    #[serde(default = "zero_vector")]
    pub pos: Vec3,
}

fn zero_vector() -> Vec3 {
    Vec3::zeros()
}

impl LightSource {
    /// Directional light
    pub fn directional(color: Rgb, dir: Vec3) -> Self {
        Self {
            light_type: LightType::Dir,
            color,
            diffuse: true,
            specular: true,
            dir,
            pos: Vec3::zeros(),
        }
    }

    /// Point light
    pub fn point(color: Rgb, pos: Vec3) -> Self {
        Self {
            light_type: LightType::Point,
            color,
            diffuse: true,
            specular: true,
            dir: Vec3::zeros(),
            pos,
        }
    }

    /// Homogeneous vector for a `vec4` light uniform
    ///
    /// Directions get `w = 0`, positions `w = 1`.
    pub fn shader_vector(&self) -> [f32; 4] {
        match self.light_type {
            LightType::Dir => [self.dir.x, self.dir.y, self.dir.z, 0.0],
            LightType::Point => [self.pos.x, self.pos.y, self.pos.z, 1.0],
        }
    }
}

/// Holds the current light source list
#[derive(Debug)]
pub struct LightsBackend {
    current: Rc<[LightSource]>,
    fixed: bool,
}

impl Default for LightsBackend {
    fn default() -> Self {
        Self {
            current: Rc::from(Vec::new()),
            fixed: true,
        }
    }
}

impl LightsBackend {
    /// Create a backend with no lights
    pub fn new() -> Self {
        Self::default()
    }

    /// Current light sources, in declaration order
    pub fn lights(&self) -> Rc<[LightSource]> {
        Rc::clone(&self.current)
    }

    /// Whether the current lights came from literal configuration
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Replace the current light sources
    pub fn set_lights(&mut self, lights: Rc<[LightSource]>, fixed: bool) {
        self.current = lights;
        self.fixed = fixed;
    }
}

impl Backend for LightsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Lights
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
