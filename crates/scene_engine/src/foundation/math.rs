//! Math utilities and types
//!
//! Provides the matrix and vector types the scene graph composes, plus the
//! constructors used by transform, camera and look-at nodes.
//!
//! Matrices follow the column-vector convention of OpenGL/WebGL: a point is
//! transformed as `M * p`, and composing a parent transform `P` with a child's
//! local transform `L` yields `P * L` (the local transform is applied first).

pub use nalgebra::{Matrix4, Unit, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Math utility functions
pub mod utils {
    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = std::f32::consts::PI / 180.0;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * DEG_TO_RAD
    }
}

/// Extension trait for Mat4 with the constructors scene nodes need
///
/// None of these constructors validate their inputs: a zero scale factor,
/// a zero-width frustum or a degenerate look-at produce whatever matrix the
/// formula yields, exactly as a literal evaluation would.
pub trait Mat4Ext {
    /// Create a scaling matrix
    fn scaling(x: f32, y: f32, z: f32) -> Mat4;

    /// Create a translation matrix
    fn translation(x: f32, y: f32, z: f32) -> Mat4;

    /// Create a rotation of `angle_degrees` around `axis`
    ///
    /// A zero-length axis yields the identity.
    fn rotation(angle_degrees: f32, axis: Vec3) -> Mat4;

    /// Compose `self × other` without mutating either operand
    fn multiply_right(&self, other: &Mat4) -> Mat4;

    /// Flatten to 16 floats in column-major order, as uniform uploads expect
    fn to_flat_array(&self) -> [f32; 16];

    /// Create an OpenGL-style perspective projection (`fovy` in degrees)
    fn perspective(fovy_degrees: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create an OpenGL-style orthographic projection
    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4;

    /// Create a right-handed look-at view matrix
    fn look_at(eye: Vec3, look: Vec3, up: Vec3) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn scaling(x: f32, y: f32, z: f32) -> Mat4 {
        Mat4::new_nonuniform_scaling(&Vec3::new(x, y, z))
    }

    fn translation(x: f32, y: f32, z: f32) -> Mat4 {
        Mat4::new_translation(&Vec3::new(x, y, z))
    }

    fn rotation(angle_degrees: f32, axis: Vec3) -> Mat4 {
        match Unit::try_new(axis, f32::EPSILON) {
            Some(axis) => Mat4::from_axis_angle(&axis, utils::deg_to_rad(angle_degrees)),
            None => Mat4::identity(),
        }
    }

    fn multiply_right(&self, other: &Mat4) -> Mat4 {
        self * other
    }

    fn to_flat_array(&self) -> [f32; 16] {
        let mut flat = [0.0; 16];
        flat.copy_from_slice(self.as_slice());
        flat
    }

    fn perspective(fovy_degrees: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        // Classic gluPerspective layout, depth mapped to [-1, 1]:
        // [f/a  0   0            0          ]
        // [0    f   0            0          ]
        // [0    0   (f+n)/(n-f)  2fn/(n-f)  ]
        // [0    0   -1           0          ]
        let f = 1.0 / (utils::deg_to_rad(fovy_degrees) * 0.5).tan();
        let depth = near - far;

        let mut result = Mat4::zeros();
        result[(0, 0)] = f / aspect;
        result[(1, 1)] = f;
        result[(2, 2)] = (far + near) / depth;
        result[(2, 3)] = 2.0 * far * near / depth;
        result[(3, 2)] = -1.0;
        result
    }

    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
        let width = right - left;
        let height = top - bottom;
        let depth = far - near;

        let mut result = Mat4::identity();
        result[(0, 0)] = 2.0 / width;
        result[(1, 1)] = 2.0 / height;
        result[(2, 2)] = -2.0 / depth;
        result[(0, 3)] = -(right + left) / width;
        result[(1, 3)] = -(top + bottom) / height;
        result[(2, 3)] = -(far + near) / depth;
        result
    }

    fn look_at(eye: Vec3, look: Vec3, up: Vec3) -> Mat4 {
        Mat4::look_at_rh(&Point3::from(eye), &Point3::from(look), &up)
    }
}
