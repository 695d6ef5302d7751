//! Geometry and stock primitives
//!
//! A [`Geometry`] is an indexed triangle mesh with per-vertex positions and
//! normals. Its buffers are uploaded to the render context the first time a
//! geometry node draws it and re-uploaded only after the context changes
//! generation.

use std::f32::consts::PI;

use crate::context::PrimitiveMode;

/// Indexed mesh drawn by geometry nodes
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// Name used in logs
    pub name: String,
    /// Vertex positions
    pub positions: Vec<[f32; 3]>,
    /// Vertex normals, one per position
    pub normals: Vec<[f32; 3]>,
    /// Vertex indices, three per triangle
    pub indices: Vec<u16>,
    /// Primitive assembly mode
    pub mode: PrimitiveMode,
}

impl Geometry {
    /// Create a triangle mesh
    pub fn new(
        name: impl Into<String>,
        positions: Vec<[f32; 3]>,
        normals: Vec<[f32; 3]>,
        indices: Vec<u16>,
    ) -> Self {
        Self {
            name: name.into(),
            positions,
            normals,
            indices,
            mode: PrimitiveMode::Triangles,
        }
    }

    /// Number of indices a draw consumes
    pub fn index_count(&self) -> u32 {
        u32::try_from(self.indices.len()).unwrap_or(u32::MAX)
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Position data as raw bytes
    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    /// Normal data as raw bytes
    pub fn normal_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.normals)
    }

    /// Index data as raw bytes
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// Cube spanning -1..1 on each axis, with flat per-face normals
///
/// 24 vertices (4 per face) and 36 indices.
pub fn cube() -> Geometry {
    // (normal, tangent u, tangent v) per face; u x v points along the normal
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
    ];

    let mut positions = Vec::with_capacity(24);
    let mut normals = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (face, (normal, u, v)) in faces.iter().enumerate() {
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            positions.push([
                normal[0] + su * u[0] + sv * v[0],
                normal[1] + su * u[1] + sv * v[1],
                normal[2] + su * u[2] + sv * v[2],
            ]);
            normals.push(*normal);
        }
        let base = (face * 4) as u16;
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }

    Geometry::new("cube", positions, normals, indices)
}

/// Vertices addressable by 16-bit indices
const MAX_VERTICES: u32 = 1 << 16;

/// Unit sphere centred on the origin
///
/// `rings` latitude bands and `segments` longitude slices, each clamped to
/// at least 3. The resolution is reduced until every vertex fits a 16-bit
/// index: segments first to 16383, then rings. Normals equal positions.
pub fn sphere(rings: u16, segments: u16) -> Geometry {
    let requested = (rings, segments);
    let segments = u32::from(segments).clamp(3, MAX_VERTICES / 4 - 1);
    let stride = segments + 1;
    let rings = u32::from(rings).clamp(3, MAX_VERTICES / stride - 1);
    if rings < u32::from(requested.0) || segments < u32::from(requested.1) {
        log::warn!(
            "Sphere resolution {}x{} exceeds 16-bit indices, using {}x{}",
            requested.0,
            requested.1,
            rings,
            segments
        );
    }

    let mut positions = Vec::with_capacity(((rings + 1) * stride) as usize);
    for ring in 0..=rings {
        let theta = ring as f32 * PI / rings as f32;
        let (sin_theta, cos_theta) = theta.sin_cos();
        for segment in 0..=segments {
            let phi = segment as f32 * 2.0 * PI / segments as f32;
            let (sin_phi, cos_phi) = phi.sin_cos();
            positions.push([cos_phi * sin_theta, cos_theta, sin_phi * sin_theta]);
        }
    }

    let index = |value: u32| u16::try_from(value).unwrap_or(u16::MAX);
    let mut indices = Vec::with_capacity((rings * segments * 6) as usize);
    for ring in 0..rings {
        for segment in 0..segments {
            let first = ring * stride + segment;
            let second = first + stride;
            indices.extend(
                [first, second, first + 1, second, second + 1, first + 1]
                    .into_iter()
                    .map(index),
            );
        }
    }

    let normals = positions.clone();
    Geometry::new("sphere", positions, normals, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_structure() {
        let cube = cube();
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.index_count(), 36);
        assert_eq!(cube.position_bytes().len(), 24 * 12);
        assert_eq!(cube.index_bytes().len(), 36 * 2);
        assert!(cube.indices.iter().all(|&index| usize::from(index) < cube.vertex_count()));
    }

    #[test]
    fn test_cube_vertices_lie_on_their_face() {
        let cube = cube();
        for (position, normal) in cube.positions.iter().zip(&cube.normals) {
            let along_normal: f32 = position.iter().zip(normal).map(|(p, n)| p * n).sum();
            assert_relative_eq!(along_normal, 1.0);
        }
    }

    #[test]
    fn test_sphere_is_unit_radius() {
        let sphere = sphere(8, 12);
        assert_eq!(sphere.vertex_count(), 9 * 13);
        assert_eq!(sphere.index_count(), 8 * 12 * 6);
        for [x, y, z] in &sphere.positions {
            assert_relative_eq!((x * x + y * y + z * z).sqrt(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_sphere_resolution_fits_16_bit_indices() {
        let sphere = sphere(300, 300);
        let vertices = sphere.vertex_count();

        assert!(vertices <= 1 << 16);
        assert_eq!(sphere.index_count() % 6, 0);
        assert!(sphere.indices.iter().all(|&index| usize::from(index) < vertices));
        assert_eq!(sphere.positions.len(), sphere.normals.len());
    }

    #[test]
    fn test_sphere_keeps_resolution_that_fits() {
        let sphere = sphere(16, 2000);
        assert_eq!(sphere.vertex_count(), 17 * 2001);
        assert_eq!(sphere.index_count(), 16 * 2000 * 6);
    }

    #[test]
    fn test_sphere_clamps_degenerate_resolution() {
        let sphere = sphere(0, 1);
        assert_eq!(sphere.vertex_count(), 4 * 4);
    }
}
