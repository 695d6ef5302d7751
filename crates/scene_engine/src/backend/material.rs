//! Material-state backend
//!
//! Materials are opaque records: a material node overrides the current value
//! for its subtree and puts the previous one back afterwards. Nothing is
//! composed.

use std::any::Any;

use serde::{Deserialize, Serialize};

use super::{Backend, BackendKind};

/// Linear RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb {
    /// Red
    pub r: f32,
    /// Green
    pub g: f32,
    /// Blue
    pub b: f32,
}

impl Rgb {
    /// Create a colour
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Black
    pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);

    /// White
    pub const WHITE: Rgb = Rgb::new(1.0, 1.0, 1.0);

    /// Components as an array, ready for a vec3 upload
    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    /// Every component multiplied by `factor`
    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.r * factor, self.g * factor, self.b * factor)
    }
}

impl From<[f32; 3]> for Rgb {
    fn from([r, g, b]: [f32; 3]) -> Self {
        Self::new(r, g, b)
    }
}

/// Surface description pushed to the shader's material setter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialState {
    /// Diffuse colour
    pub base_color: Rgb,
    /// Colour of specular highlights
    pub specular_color: Rgb,
    /// Specular intensity, scales `specular_color`
    pub specular: f32,
    /// Specular exponent
    pub shine: f32,
    /// Colour contributed regardless of lighting
    pub ambient_color: Rgb,
}

impl Default for MaterialState {
    fn default() -> Self {
        Self {
            base_color: Rgb::WHITE,
            specular_color: Rgb::WHITE,
            specular: 0.0,
            shine: 0.0,
            ambient_color: Rgb::BLACK,
        }
    }
}

impl MaterialState {
    /// Material with the given base colour and default everything else
    pub fn new(base_color: Rgb) -> Self {
        Self {
            base_color,
            ..Self::default()
        }
    }

    /// Set the specular colour
    pub fn with_specular_color(mut self, color: Rgb) -> Self {
        self.specular_color = color;
        self
    }

    /// Set the specular intensity
    pub fn with_specular(mut self, specular: f32) -> Self {
        self.specular = specular;
        self
    }

    /// Set the specular exponent
    pub fn with_shine(mut self, shine: f32) -> Self {
        self.shine = shine;
        self
    }

    /// Set the ambient colour
    pub fn with_ambient_color(mut self, color: Rgb) -> Self {
        self.ambient_color = color;
        self
    }

    /// Effective specular reflectance
    pub fn specular_reflectance(&self) -> Rgb {
        self.specular_color.scaled(self.specular)
    }
}

/// Holds the current material, absent outside any material node
///
/// `fixed` is false while a material node with dynamic configuration is in
/// effect.
#[derive(Debug)]
pub struct MaterialBackend {
    current: Option<MaterialState>,
    fixed: bool,
}

impl Default for MaterialBackend {
    fn default() -> Self {
        Self {
            current: None,
            fixed: true,
        }
    }
}

impl MaterialBackend {
    /// Create a backend with no current material
    pub fn new() -> Self {
        Self::default()
    }

    /// Current material
    pub fn material(&self) -> Option<MaterialState> {
        self.current
    }

    /// Whether the current material came from literal configuration
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Replace the current material
    pub fn set_material(&mut self, material: Option<MaterialState>, fixed: bool) {
        self.current = material;
        self.fixed = fixed;
    }
}

impl Backend for MaterialBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Material
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

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_specular_reflectance_scales_color() {
        let material = MaterialState::new(Rgb::new(0.6, 0.9, 0.6))
            .with_specular_color(Rgb::new(0.5, 1.0, 0.2))
            .with_specular(0.5);
        let reflectance = material.specular_reflectance();
        assert_relative_eq!(reflectance.r, 0.25);
        assert_relative_eq!(reflectance.g, 0.5);
        assert_relative_eq!(reflectance.b, 0.1);
    }

    #[test]
    fn test_override_and_restore() {
        let mut backend = MaterialBackend::new();
        assert!(backend.material().is_none());

        let saved = (backend.material(), backend.is_fixed());
        backend.set_material(Some(MaterialState::new(Rgb::new(1.0, 0.0, 0.0))), false);
        assert_eq!(backend.material().map(|m| m.base_color), Some(Rgb::new(1.0, 0.0, 0.0)));
        assert!(!backend.is_fixed());

        backend.set_material(saved.0, saved.1);
        assert!(backend.material().is_none());
        assert!(backend.is_fixed());
    }

    #[test]
    fn test_reset_clears_dynamic_material() {
        let mut backend = MaterialBackend::new();
        backend.set_material(Some(MaterialState::default()), false);
        backend.reset();
        assert!(backend.material().is_none());
        assert!(backend.is_fixed());
    }

    #[test]
    fn test_material_from_partial_toml() {
        let material: MaterialState = toml::from_str(
            r#"
            specular = 0.9
            shine = 6.0
            [base_color]
            r = 0.6
            g = 0.9
            b = 0.6
            "#,
        )
        .expect("valid material");
        assert_eq!(material.base_color, Rgb::new(0.6, 0.9, 0.6));
        assert_eq!(material.ambient_color, Rgb::BLACK);
        assert_relative_eq!(material.shine, 6.0);
    }
}
